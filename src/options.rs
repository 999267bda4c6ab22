//! Training and generation options
//!
//! Every struct deserializes with per-field defaults, so a JSON config
//! only needs the knobs it changes.
//!
//! License: MIT
//! Author: Moroya Sakamoto

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::GsError;

/// Diagnostic dump settings, threaded explicitly through build/generate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpOptions {
    pub enabled: bool,
    pub out_dir: PathBuf,
    /// 0: summary only, 1: normal, 2: detailed
    pub detail: u8,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self { enabled: false, out_dir: PathBuf::from("gs_dump"), detail: 1 }
    }
}

impl DumpOptions {
    pub fn to_dir(out_dir: impl Into<PathBuf>) -> Self {
        Self { enabled: true, out_dir: out_dir.into(), ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainOptions {
    /// Frame stride when sampling transitions (values below 1 act as 1)
    pub sample_stride: usize,
    /// Occupancy radius copied onto every splat (FK meters)
    pub occ_sigma_m: f32,
    /// Representatives closer than this are merged (FK meters)
    pub merge_radius_m: f32,
    pub enable_merge: bool,
    /// Transition speed at which stopability reaches 0 (FK meters / s)
    pub stop_v_threshold: f32,
    pub dump: DumpOptions,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            sample_stride: 1,
            occ_sigma_m: 0.05,
            merge_radius_m: 0.03,
            enable_merge: true,
            stop_v_threshold: 0.15,
            dump: DumpOptions::default(),
        }
    }
}

impl TrainOptions {
    pub fn from_json_str(s: &str) -> Result<Self, GsError> {
        let opt: Self = serde_json::from_str(s).map_err(|e| GsError::InvalidOption {
            name: "TrainOptions",
            reason: e.to_string(),
        })?;
        opt.validate()?;
        Ok(opt)
    }

    pub fn validate(&self) -> Result<(), GsError> {
        finite("occ_sigma_m", self.occ_sigma_m)?;
        finite("merge_radius_m", self.merge_radius_m)?;
        finite("stop_v_threshold", self.stop_v_threshold)?;
        Ok(())
    }

    pub(crate) fn stride(&self) -> usize {
        self.sample_stride.max(1)
    }
}

/// What to do when steps keep needing backoff or the fallback blend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagnationPolicy {
    /// Counter is tracked but never escalates
    #[default]
    Inert,
    /// After `after` consecutive strained steps, force pure goal blending
    /// for the next `force_steps` steps
    Escalate { after: u32, force_steps: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// Speed multiplier (1.0 = training tempo)
    pub tempo: f32,
    /// Nominal step (non-positive falls back to 1/30 s)
    pub dt_seconds: f32,
    /// Goal reached within this FK distance (floored at 1e-4)
    pub goal_tolerance_m: f32,
    /// Stopability at or above this counts as stoppable
    pub stopability_th: f32,
    pub max_steps: usize,
    /// Keep following the model past a non-stoppable goal until stable
    pub extend_to_stable: bool,
    /// Minimum speed (FK meters / s) so slow splats still make headway
    pub v_floor_mps: f32,
    pub stagnation: StagnationPolicy,
    pub dump: DumpOptions,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            tempo: 1.0,
            dt_seconds: DEFAULT_DT,
            goal_tolerance_m: 0.02,
            stopability_th: 0.6,
            max_steps: 600, // 20 s at 30 Hz
            extend_to_stable: true,
            v_floor_mps: 0.20,
            stagnation: StagnationPolicy::Inert,
            dump: DumpOptions::default(),
        }
    }
}

pub(crate) const DEFAULT_DT: f32 = 1.0 / 30.0;

impl GenerateOptions {
    pub fn with_tempo(tempo: f32) -> Self {
        Self { tempo, ..Self::default() }
    }

    pub fn from_json_str(s: &str) -> Result<Self, GsError> {
        let opt: Self = serde_json::from_str(s).map_err(|e| GsError::InvalidOption {
            name: "GenerateOptions",
            reason: e.to_string(),
        })?;
        opt.validate()?;
        Ok(opt)
    }

    pub fn validate(&self) -> Result<(), GsError> {
        finite("tempo", self.tempo)?;
        finite("dt_seconds", self.dt_seconds)?;
        finite("goal_tolerance_m", self.goal_tolerance_m)?;
        finite("stopability_th", self.stopability_th)?;
        finite("v_floor_mps", self.v_floor_mps)?;
        Ok(())
    }

    pub(crate) fn step_dt(&self) -> f32 {
        if self.dt_seconds > 0.0 { self.dt_seconds } else { DEFAULT_DT }
    }

    pub(crate) fn tolerance(&self) -> f32 {
        self.goal_tolerance_m.max(1e-4)
    }
}

fn finite(name: &'static str, v: f32) -> Result<(), GsError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(GsError::InvalidOption { name, reason: format!("must be finite, got {v}") })
    }
}
