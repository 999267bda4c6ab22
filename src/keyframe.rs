//! Keyframe motion — time-stamped pose sequence produced by generation
//!
//! Steps may have different lengths (backoff shortens them), so the
//! sequence keeps explicit times rather than a fixed interval.
//!
//! License: MIT
//! Author: Moroya Sakamoto

use crate::pose::{Pose, SkeletonId};

#[derive(Debug, Clone)]
pub struct KeyframeMotion<P> {
    skeleton: SkeletonId,
    key_times: Vec<f32>,
    key_poses: Vec<P>,
}

impl<P: Pose> KeyframeMotion<P> {
    pub fn new(skeleton: SkeletonId) -> Self {
        Self { skeleton, key_times: Vec::new(), key_poses: Vec::new() }
    }

    pub(crate) fn push(&mut self, t: f32, pose: P) {
        self.key_times.push(t);
        self.key_poses.push(pose);
    }

    pub fn skeleton(&self) -> SkeletonId {
        self.skeleton
    }

    pub fn len(&self) -> usize {
        self.key_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_times.is_empty()
    }

    pub fn times(&self) -> &[f32] {
        &self.key_times
    }

    pub fn poses(&self) -> &[P] {
        &self.key_poses
    }

    pub fn iter(&self) -> impl Iterator<Item = (f32, &P)> {
        self.key_times.iter().copied().zip(self.key_poses.iter())
    }

    pub fn first_pose(&self) -> Option<&P> {
        self.key_poses.first()
    }

    pub fn last_pose(&self) -> Option<&P> {
        self.key_poses.last()
    }

    /// Time of the last key
    pub fn duration(&self) -> f32 {
        self.key_times.last().copied().unwrap_or(0.0)
    }

    /// Pose at time `t`, interpolated between the surrounding keys
    ///
    /// Times before the first key or after the last clamp to the ends.
    /// `None` for an empty motion or a non-finite `t`.
    pub fn pose_at(&self, t: f32) -> Option<P> {
        if !t.is_finite() {
            return None;
        }
        let first = self.key_times.first()?;
        if t <= *first {
            return self.key_poses.first().cloned();
        }
        // Index of the first key strictly after t
        let hi = self.key_times.partition_point(|&k| k <= t);
        if hi >= self.key_times.len() {
            return self.key_poses.last().cloned();
        }
        let lo = hi.checked_sub(1)?;
        let span = self.key_times[hi] - self.key_times[lo];
        let frac = if span > 0.0 { (t - self.key_times[lo]) / span } else { 1.0 };
        Some(self.key_poses[lo].interpolate(&self.key_poses[hi], frac))
    }

    /// Fixed-rate resampling from 0 to [`duration`](Self::duration) inclusive
    pub fn resample(&self, interval: f32) -> Vec<P> {
        if self.is_empty() || interval <= 0.0 {
            return Vec::new();
        }
        let count = (self.duration() / interval).floor() as usize + 1;
        (0..count).filter_map(|i| self.pose_at(i as f32 * interval)).collect()
    }
}
