//! Pose contract — what the motion model needs from a skeleton library
//!
//! The model never looks inside a pose. It asks for forward kinematics,
//! interpolation, and the identity of the skeleton the pose belongs to.
//! Any skeleton/pose representation implementing [`Pose`] and [`Motion`]
//! can be trained on and generated with.
//!
//! License: MIT
//! Author: Moroya Sakamoto

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::joint::Vec3k;

static NEXT_SKELETON_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque skeleton handle, compared by value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SkeletonId(pub u64);

impl SkeletonId {
    /// Allocate a process-unique id
    pub fn fresh() -> Self {
        Self(NEXT_SKELETON_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SkeletonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skeleton#{}", self.0)
    }
}

/// Body the model is trained for
///
/// Owned by the model; the underlying skeleton stays with whoever built it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyDescriptor {
    pub skeleton: SkeletonId,
    pub name: String,
    pub joint_count: usize,
    /// Standing height (meters), informational
    pub body_height: f32,
}

impl BodyDescriptor {
    pub fn accepts(&self, skeleton: SkeletonId) -> bool {
        self.skeleton == skeleton
    }
}

/// A full skeleton configuration at one instant
pub trait Pose: Clone {
    fn skeleton_id(&self) -> SkeletonId;

    /// World position of the root
    fn root_position(&self) -> Vec3k;

    /// World positions of every joint, written into `joints` (cleared first)
    fn forward_kinematics(&self, joints: &mut Vec<Vec3k>);

    /// Pose-space interpolation; `t <= 0` yields `self`, `t >= 1` yields `other`
    fn interpolate(&self, other: &Self, t: f32) -> Self;
}

/// Fixed-rate sequence of poses
pub trait Motion {
    type Pose: Pose;

    fn name(&self) -> &str;
    fn skeleton_id(&self) -> SkeletonId;
    fn frame_count(&self) -> usize;
    fn frame(&self, index: usize) -> &Self::Pose;
    /// Seconds between consecutive frames
    fn sample_interval(&self) -> f32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids_are_distinct() {
        let a = SkeletonId::fresh();
        let b = SkeletonId::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn test_descriptor_accepts_by_value() {
        let id = SkeletonId::fresh();
        let body = BodyDescriptor {
            skeleton: id,
            name: "test".into(),
            joint_count: 3,
            body_height: 1.7,
        };
        assert!(body.accepts(SkeletonId(id.0)));
        assert!(!body.accepts(SkeletonId::fresh()));
    }

    #[test]
    fn test_display() {
        assert_eq!(SkeletonId(7).to_string(), "skeleton#7");
    }
}
