//! Model builder — example motions → splat store
//!
//! Two deterministic phases:
//! 1. Sampling: every `stride`-th consecutive frame pair (i, i+1) becomes a
//!    splat with `mean_pose = frame[i]`, `next_pose = frame[i+1]`. Speed is
//!    FK distance over the frame interval; stopability falls linearly from
//!    1 at rest to 0 at `stop_v_threshold`.
//! 2. Merging (optional): representatives within `merge_radius_m` of an
//!    earlier surviving splat are absorbed into it, then survivors are
//!    renumbered densely. O(n²) in the sampled count; offline cost only.
//!
//! Output depends on motion insertion order and stride.
//!
//! License: MIT
//! Author: Moroya Sakamoto

use tracing::{debug, info};

use crate::error::GsError;
use crate::metric::RootRelative;
use crate::model::MotionModel;
use crate::options::TrainOptions;
use crate::pose::{BodyDescriptor, Motion, Pose};
use crate::splat::{Splat, SplatStore};

/// Reference speeds never drop below this (FK meters / s)
pub const MIN_REFERENCE_SPEED: f32 = 0.001;

/// Sequential accumulator: add motions, then build once
///
/// Motions are borrowed, not copied; they must outlive the builder.
pub struct ModelBuilder<'a, M: Motion> {
    body: BodyDescriptor,
    options: TrainOptions,
    motions: Vec<&'a M>,
}

impl<'a, M: Motion> ModelBuilder<'a, M> {
    pub fn new(body: BodyDescriptor, options: TrainOptions) -> Self {
        Self { body, options, motions: Vec::new() }
    }

    pub fn options(&self) -> &TrainOptions {
        &self.options
    }

    pub fn motion_count(&self) -> usize {
        self.motions.len()
    }

    /// Register a training motion; its skeleton must match the body
    pub fn add_motion(&mut self, motion: &'a M) -> Result<(), GsError> {
        if !self.body.accepts(motion.skeleton_id()) {
            return Err(GsError::mismatch("ModelBuilder::add_motion", self.body.skeleton, motion.skeleton_id()));
        }
        self.motions.push(motion);
        Ok(())
    }

    /// Sample, merge and finalize a model
    pub fn build(&self) -> Result<MotionModel<M::Pose>, GsError> {
        self.options.validate()?;

        let mut splats = Vec::new();
        for m in &self.motions {
            self.append_motion_splats(*m, &mut splats);
        }
        let sampled = splats.len();
        let splats = if self.options.enable_merge {
            self.merge_nearby(splats)
        } else {
            splats
        };
        debug!(sampled, merged = splats.len(), "splat sampling complete");

        let model = MotionModel::from_store(self.body.clone(), SplatStore::from_splats(splats))?;

        #[cfg(feature = "dump")]
        if self.options.dump.enabled {
            if let Err(err) = crate::dump::dump_model(&model, &self.options.dump) {
                tracing::warn!(%err, dir = %self.options.dump.out_dir.display(), "model dump failed");
            }
        }

        if model.splats().is_empty() {
            return Err(GsError::NoSplatsProduced { motions: self.motions.len() });
        }
        info!(
            motions = self.motions.len(),
            splats = model.splats().len(),
            body = %self.body.name,
            "motion model built"
        );
        Ok(model)
    }

    /// One splat per sampled frame pair; the last frame has no successor
    fn append_motion_splats(&self, m: &M, out: &mut Vec<Splat<M::Pose>>) {
        let n = m.frame_count();
        if n <= 1 {
            debug!(motion = m.name(), frames = n, "motion too short to sample");
            return;
        }
        let interval = m.sample_interval();
        let stop_th = self.options.stop_v_threshold.max(1e-4);

        for i in (0..n - 1).step_by(self.options.stride()) {
            let cur = m.frame(i);
            let nxt = m.frame(i + 1);

            let dist = RootRelative::of(cur).distance(&RootRelative::of(nxt));
            let v = if interval > 0.0 { dist / interval } else { dist };
            let v_ref = v.max(MIN_REFERENCE_SPEED);

            out.push(Splat {
                id: out.len(),
                mean_pose: cur.clone(),
                next_pose: nxt.clone(),
                has_next: true,
                occ_sigma_m: self.options.occ_sigma_m,
                stopability: (1.0 - v_ref / stop_th).clamp(0.0, 1.0),
                v_norm_ref: v_ref,
                v_norm_min: 0.5 * v_ref,
                v_norm_max: 2.0 * v_ref,
                source_motion: m.name().to_owned(),
                source_frame: i,
                source_interval: interval,
            });
        }
    }

    /// Absorb later near-duplicates into earlier survivors
    fn merge_nearby(&self, mut splats: Vec<Splat<M::Pose>>) -> Vec<Splat<M::Pose>> {
        if splats.is_empty() {
            return splats;
        }
        let radius = self.options.merge_radius_m;
        // Centers follow the representative pose, which can change on absorption
        let mut centers: Vec<RootRelative> = splats.iter().map(|s| RootRelative::of(&s.mean_pose)).collect();
        let mut removed = vec![false; splats.len()];

        for i in 0..splats.len() {
            if removed[i] {
                continue;
            }
            for j in (i + 1)..splats.len() {
                if removed[j] {
                    continue;
                }
                if centers[i].distance(&centers[j]) <= radius {
                    let (head, tail) = splats.split_at_mut(j);
                    if absorb(&mut head[i], &tail[0]) {
                        centers[i] = centers[j].clone();
                    }
                    removed[j] = true;
                }
            }
        }

        splats
            .into_iter()
            .zip(removed)
            .filter_map(|(s, gone)| (!gone).then_some(s))
            .collect()
    }
}

/// Fold `other` into `keep`; returns true if `keep` took over `other`'s poses
///
/// The more stoppable representative's pose pair wins. Reference speed and
/// stopability are averaged, the speed range widened to cover both.
fn absorb<P: Pose>(keep: &mut Splat<P>, other: &Splat<P>) -> bool {
    let replaced = other.stopability > keep.stopability;
    if replaced {
        keep.mean_pose = other.mean_pose.clone();
        keep.next_pose = other.next_pose.clone();
        keep.has_next = other.has_next;
    }
    keep.v_norm_ref = 0.5 * (keep.v_norm_ref + other.v_norm_ref);
    keep.v_norm_min = keep.v_norm_min.min(other.v_norm_min);
    keep.v_norm_max = keep.v_norm_max.max(other.v_norm_max);
    keep.stopability = 0.5 * (keep.stopability + other.stopability);
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{Clip, Skeleton, SkeletonPose};

    fn splat(pose: SkeletonPose, stopability: f32, v: f32) -> Splat<SkeletonPose> {
        Splat {
            id: 0,
            next_pose: pose.clone(),
            mean_pose: pose,
            has_next: true,
            occ_sigma_m: 0.05,
            stopability,
            v_norm_ref: v,
            v_norm_min: 0.5 * v,
            v_norm_max: 2.0 * v,
            source_motion: "t".into(),
            source_frame: 0,
            source_interval: 1.0 / 30.0,
        }
    }

    #[test]
    fn test_absorb_prefers_more_stoppable_pose() {
        let arm = Skeleton::right_arm();
        let mut keep = splat(SkeletonPose::rest(&arm), 0.2, 1.0);
        let other = splat(SkeletonPose::rest(&arm).with_angle(3, 0.1), 0.8, 0.2);
        assert!(absorb(&mut keep, &other));
        assert_eq!(keep.mean_pose.angle(3), 0.1);
        assert!((keep.stopability - 0.5).abs() < 1e-6);
        assert!((keep.v_norm_ref - 0.6).abs() < 1e-6);
        assert!((keep.v_norm_min - 0.1).abs() < 1e-6);
        assert!((keep.v_norm_max - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_absorb_keeps_pose_when_less_stoppable() {
        let arm = Skeleton::right_arm();
        let mut keep = splat(SkeletonPose::rest(&arm), 0.8, 1.0);
        let other = splat(SkeletonPose::rest(&arm).with_angle(3, 0.1), 0.8, 1.0);
        assert!(!absorb(&mut keep, &other));
        assert_eq!(keep.mean_pose.angle(3), 0.0);
    }

    #[test]
    fn test_stopability_from_speed() {
        let arm = Skeleton::right_arm();
        // A still clip: zero speed, floored reference, fully stoppable
        let rest = SkeletonPose::rest(&arm);
        let clip = Clip::between("still", &rest, &rest, 3, 1.0 / 30.0).unwrap();
        let options = TrainOptions { enable_merge: false, ..TrainOptions::default() };
        let mut b = ModelBuilder::new(arm.body(), options);
        b.add_motion(&clip).unwrap();
        let model = b.build().unwrap();
        assert_eq!(model.splats().len(), 2);
        for s in model.splats().iter() {
            assert_eq!(s.v_norm_ref, MIN_REFERENCE_SPEED);
            assert!(s.stopability > 0.99);
        }
    }

    #[test]
    fn test_non_positive_interval_uses_raw_distance() {
        let arm = Skeleton::right_arm();
        let a = SkeletonPose::rest(&arm);
        let b = SkeletonPose::rest(&arm).with_angle(0, 1.0);
        let clip = Clip::between("raw", &a, &b, 2, 0.0).unwrap();
        let mut builder = ModelBuilder::new(arm.body(), TrainOptions::default());
        builder.add_motion(&clip).unwrap();
        let model = builder.build().unwrap();
        let d = crate::metric::fk_distance(&a, &b);
        assert!((model.splats().as_slice()[0].v_norm_ref - d).abs() < 1e-6);
    }
}
