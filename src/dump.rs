//! Diagnostic dumps — model and rollout files for offline inspection
//!
//! Files written under `DumpOptions::out_dir`:
//!
//! | file                 | written by            | detail |
//! |----------------------|-----------------------|--------|
//! | `model_summary.json` | [`dump_model`]        | 0+     |
//! | `splats.csv`         | [`dump_model`]        | 1+     |
//! | `gen_init.json`      | [`TraceDump`]         | 0+     |
//! | `gen_trace.csv`      | [`TraceDump`]         | 0+     |
//! | `keyframes.jsonl`    | [`TraceDump`]         | 1+     |
//!
//! Dumps never affect results: rollout-side failures are logged and dropped.
//!
//! License: MIT
//! Author: Moroya Sakamoto

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::GsError;
use crate::joint::Vec3k;
use crate::keyframe::KeyframeMotion;
use crate::model::MotionModel;
use crate::options::DumpOptions;
use crate::pose::{BodyDescriptor, Pose};
use crate::trace::{InitRecord, RolloutObserver, StepRecord, Termination};

pub const MODEL_SUMMARY_FILE: &str = "model_summary.json";
pub const SPLATS_FILE: &str = "splats.csv";
pub const GEN_INIT_FILE: &str = "gen_init.json";
pub const GEN_TRACE_FILE: &str = "gen_trace.csv";
pub const KEYFRAMES_FILE: &str = "keyframes.jsonl";

const TRACE_HEADER: &str =
    "step,t_sec,dist_goal,delta_goal,alpha,alpha_mode,step_norm,dt,splat_id,v_ref,v_min,v_max,used_speed,v_floor,events";

/// min / mean / max of one splat statistic
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Range {
    pub min: f32,
    pub mean: f32,
    pub max: f32,
}

impl Range {
    fn of(values: impl Iterator<Item = f32>) -> Option<Self> {
        let mut n = 0usize;
        let (mut min, mut max, mut sum) = (f32::INFINITY, f32::NEG_INFINITY, 0.0f64);
        for v in values {
            n += 1;
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
        }
        (n > 0).then(|| Self { min, mean: (sum / n as f64) as f32, max })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub body: BodyDescriptor,
    pub splat_count: usize,
    pub source_motions: Vec<String>,
    pub stopability: Option<Range>,
    pub v_norm_ref: Option<Range>,
}

impl ModelSummary {
    pub fn of<P: Pose>(model: &MotionModel<P>) -> Self {
        let splats = model.splats();
        let mut source_motions: Vec<String> = Vec::new();
        for s in splats.iter() {
            if !source_motions.contains(&s.source_motion) {
                source_motions.push(s.source_motion.clone());
            }
        }
        Self {
            body: model.body().clone(),
            splat_count: splats.len(),
            source_motions,
            stopability: Range::of(splats.iter().map(|s| s.stopability)),
            v_norm_ref: Range::of(splats.iter().map(|s| s.v_norm_ref)),
        }
    }
}

/// Write `model_summary.json` and (detail ≥ 1) `splats.csv`
///
/// # Errors
///
/// `DumpIo` / `DumpJson` if the directory or a file cannot be written.
pub fn dump_model<P: Pose>(model: &MotionModel<P>, opts: &DumpOptions) -> Result<(), GsError> {
    let dir = opts.out_dir.as_path();
    fs::create_dir_all(dir)?;

    let summary = ModelSummary::of(model);
    let mut w = BufWriter::new(File::create(dir.join(MODEL_SUMMARY_FILE))?);
    serde_json::to_writer_pretty(&mut w, &summary)?;
    w.flush()?;

    if opts.detail >= 1 {
        let mut w = BufWriter::new(File::create(dir.join(SPLATS_FILE))?);
        writeln!(w, "id,source_motion,source_frame,has_next,occ_sigma_m,stopability,v_norm_ref,v_norm_min,v_norm_max")?;
        for s in model.splats().iter() {
            writeln!(
                w,
                "{},{},{},{},{},{},{},{},{}",
                s.id,
                csv_field(&s.source_motion),
                s.source_frame,
                u8::from(s.has_next),
                s.occ_sigma_m,
                s.stopability,
                s.v_norm_ref,
                s.v_norm_min,
                s.v_norm_max
            )?;
        }
        w.flush()?;
    }
    debug!(dir = %dir.display(), splats = summary.splat_count, "model dump written");
    Ok(())
}

/// RFC 4180 quoting for free-text columns
fn csv_field(s: &str) -> Cow<'_, str> {
    if s.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(s)
    }
}

/// Rollout observer that writes generation dumps when the rollout finishes
#[derive(Debug)]
pub struct TraceDump {
    opts: DumpOptions,
    init: Option<InitRecord>,
    steps: Vec<StepRecord>,
}

impl TraceDump {
    pub fn new(opts: DumpOptions) -> Self {
        Self { opts, init: None, steps: Vec::new() }
    }

    fn write_all<P: Pose>(&self, keyframes: &KeyframeMotion<P>, termination: Termination) -> Result<(), GsError> {
        let dir = self.opts.out_dir.as_path();
        fs::create_dir_all(dir)?;

        let init = json!({ "init": self.init, "termination": termination });
        fs::write(dir.join(GEN_INIT_FILE), serde_json::to_vec_pretty(&init)?)?;

        write_trace_csv(&dir.join(GEN_TRACE_FILE), &self.steps)?;
        if self.opts.detail >= 1 {
            write_keyframes(&dir.join(KEYFRAMES_FILE), keyframes)?;
        }
        debug!(dir = %dir.display(), steps = self.steps.len(), "rollout dump written");
        Ok(())
    }
}

impl<P: Pose> RolloutObserver<P> for TraceDump {
    fn on_init(&mut self, init: &InitRecord) {
        self.init = Some(*init);
    }

    fn on_step(&mut self, step: &StepRecord) {
        self.steps.push(step.clone());
    }

    fn on_finish(&mut self, keyframes: &KeyframeMotion<P>, termination: Termination) {
        if let Err(err) = self.write_all(keyframes, termination) {
            warn!(%err, dir = %self.opts.out_dir.display(), "rollout dump failed");
        }
    }
}

fn write_trace_csv(path: &Path, steps: &[StepRecord]) -> Result<(), GsError> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "{TRACE_HEADER}")?;
    for s in steps {
        writeln!(
            w,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            s.step,
            s.t_sec,
            s.dist_goal,
            s.delta_goal,
            s.alpha,
            s.mode.as_str(),
            s.step_norm,
            s.dt,
            s.splat_id,
            s.v_ref,
            s.v_min,
            s.v_max,
            s.used_speed,
            s.v_floor,
            s.events_joined()
        )?;
    }
    w.flush()?;
    Ok(())
}

/// One JSON object per key: `{"i":…,"t":…,"joints":[[x,y,z],…]}` in world space
fn write_keyframes<P: Pose>(path: &Path, keyframes: &KeyframeMotion<P>) -> Result<(), GsError> {
    let mut w = BufWriter::new(File::create(path)?);
    let mut joints: Vec<Vec3k> = Vec::new();
    for (i, (t, pose)) in keyframes.iter().enumerate() {
        pose.forward_kinematics(&mut joints);
        let positions: Vec<[f32; 3]> = joints.iter().map(|j| j.to_array()).collect();
        serde_json::to_writer(&mut w, &json!({ "i": i, "t": t, "joints": positions }))?;
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}
