//! FK distance — root-relative RMS joint-position distance
//!
//! Both poses are run through forward kinematics, each pose's own root
//! position is subtracted from its joints (whole-body translation drops
//! out), and the RMS of the per-joint Euclidean differences is taken.
//! Accumulation is f64; the result is f32 meters.
//!
//! Poses of different skeletons are infinitely far apart. That is a
//! signal, not an error: entry points reject mismatches before it matters.
//!
//! License: MIT
//! Author: Moroya Sakamoto

use crate::joint::Vec3k;
use crate::pose::{Pose, SkeletonId};

/// Root-relative joint positions of one pose
///
/// Computing this once per pose lets a pose be compared against many
/// others without re-running FK.
#[derive(Debug, Clone, PartialEq)]
pub struct RootRelative {
    skeleton: SkeletonId,
    joints: Vec<Vec3k>,
}

impl RootRelative {
    pub fn of<P: Pose>(pose: &P) -> Self {
        let mut joints = Vec::new();
        pose.forward_kinematics(&mut joints);
        let root = pose.root_position();
        for j in joints.iter_mut() {
            *j = *j - root;
        }
        Self { skeleton: pose.skeleton_id(), joints }
    }

    pub fn skeleton(&self) -> SkeletonId {
        self.skeleton
    }

    pub fn joints(&self) -> &[Vec3k] {
        &self.joints
    }

    /// RMS distance; +inf across skeletons or on joint-count mismatch
    pub fn distance(&self, other: &RootRelative) -> f32 {
        if self.skeleton != other.skeleton
            || self.joints.is_empty()
            || self.joints.len() != other.joints.len()
        {
            return f32::INFINITY;
        }
        let mut acc = 0.0f64;
        for (a, b) in self.joints.iter().zip(&other.joints) {
            let dx = f64::from(a.x) - f64::from(b.x);
            let dy = f64::from(a.y) - f64::from(b.y);
            let dz = f64::from(a.z) - f64::from(b.z);
            acc += dx * dx + dy * dy + dz * dz;
        }
        (acc / self.joints.len() as f64).sqrt() as f32
    }
}

/// FK distance between two poses
pub fn fk_distance<P: Pose>(a: &P, b: &P) -> f32 {
    if a.skeleton_id() != b.skeleton_id() {
        return f32::INFINITY;
    }
    RootRelative::of(a).distance(&RootRelative::of(b))
}
