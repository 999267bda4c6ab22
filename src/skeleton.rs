//! Skeleton — joint tree, forward kinematics, poses and clips
//!
//! Reference implementation of the [`Pose`] / [`Motion`] contract.
//! Joints are listed parents-first, so FK is a single forward pass:
//! each joint sits at `parent_pos + parent_frame * offset` and its own
//! frame is the parent frame rotated about the joint axis.
//!
//! Frame convention: +Y up, +Z forward, root yaw about +Y.
//!
//! License: MIT
//! Author: Moroya Sakamoto

use std::sync::Arc;

use crate::error::GsError;
use crate::joint::{Frame3k, Joint, JointConstraint, Vec3k};
use crate::pose::{BodyDescriptor, Motion, Pose, SkeletonId};

/// Joint tree with a process-unique identity
#[derive(Debug)]
pub struct Skeleton {
    id: SkeletonId,
    name: String,
    joints: Vec<Joint>,
}

impl Skeleton {
    /// Build a skeleton; joint 0 must be the only root and every parent
    /// index must precede its child.
    pub fn new(name: &str, joints: Vec<Joint>) -> Result<Self, GsError> {
        if joints.is_empty() {
            return Err(GsError::InvalidSkeleton(format!("{name}: no joints")));
        }
        for (i, j) in joints.iter().enumerate() {
            match (i, j.parent) {
                (0, None) => {}
                (0, Some(_)) => {
                    return Err(GsError::InvalidSkeleton(format!(
                        "{name}: joint 0 `{}` must be the root",
                        j.name
                    )));
                }
                (_, None) => {
                    return Err(GsError::InvalidSkeleton(format!(
                        "{name}: joint {i} `{}` is a second root",
                        j.name
                    )));
                }
                (_, Some(p)) if p >= i => {
                    return Err(GsError::InvalidSkeleton(format!(
                        "{name}: joint {i} `{}` precedes its parent {p}",
                        j.name
                    )));
                }
                _ => {}
            }
        }
        Ok(Self { id: SkeletonId::fresh(), name: name.to_owned(), joints })
    }

    /// 7-DoF right arm with a hand tip site
    ///
    /// Shoulder: flexion/extension, abduction/adduction, rotation (3-DoF)
    /// Elbow: flexion/extension (1-DoF)
    /// Wrist: flexion/extension, deviation, pronation/supination (3-DoF)
    pub fn right_arm() -> Arc<Self> {
        let joints = vec![
            Joint::new("sh_flex", None, Vec3k::X, Vec3k::ZERO, JointConstraint::new(-60.0, 180.0)),
            Joint::new("sh_abd", Some(0), Vec3k::Z, Vec3k::ZERO, JointConstraint::new(-50.0, 180.0)),
            Joint::new("sh_rot", Some(1), -Vec3k::Y, Vec3k::ZERO, JointConstraint::new(-90.0, 90.0)),
            // Upper arm ~0.30m
            Joint::new("el_flex", Some(2), Vec3k::X, Vec3k::new(0.0, -0.30, 0.0),
                JointConstraint::new(0.0, 145.0)),
            // Forearm ~0.28m
            Joint::new("wr_flex", Some(3), Vec3k::X, Vec3k::new(0.0, -0.28, 0.0),
                JointConstraint::new(-80.0, 80.0)),
            Joint::new("wr_dev", Some(4), Vec3k::Z, Vec3k::ZERO, JointConstraint::new(-20.0, 30.0)),
            Joint::new("wr_pro", Some(5), -Vec3k::Y, Vec3k::ZERO, JointConstraint::new(-80.0, 80.0)),
            // Hand ~0.20m
            Joint::site("hand_tip", 6, Vec3k::new(0.0, -0.20, 0.0)),
        ];
        Arc::new(Self {
            id: SkeletonId::fresh(),
            name: "right_arm".to_owned(),
            joints,
        })
    }

    /// Full-body humanoid rooted at the pelvis (25 joints, ~1.8m)
    pub fn humanoid() -> Arc<Self> {
        let mut joints = vec![
            Joint::new("pelvis", None, Vec3k::X, Vec3k::ZERO, JointConstraint::new(-30.0, 30.0)),
            Joint::new("spine", Some(0), Vec3k::X, Vec3k::new(0.0, 0.10, 0.0),
                JointConstraint::new(-30.0, 90.0)),
            Joint::new("chest", Some(1), Vec3k::Z, Vec3k::new(0.0, 0.25, 0.0),
                JointConstraint::new(-30.0, 30.0)),
            Joint::new("neck", Some(2), Vec3k::X, Vec3k::new(0.0, 0.25, 0.0),
                JointConstraint::new(-45.0, 60.0)),
            Joint::site("head", 3, Vec3k::new(0.0, 0.20, 0.0)),
        ];
        for (side, sx) in [("r", -1.0f32), ("l", 1.0f32)] {
            let base = joints.len();
            // Abduction mirrors across the sagittal plane
            let abd = if sx < 0.0 {
                JointConstraint::new(-50.0, 180.0)
            } else {
                JointConstraint::new(-180.0, 50.0)
            };
            joints.push(Joint::new(&format!("{side}_sh_flex"), Some(2), Vec3k::X,
                Vec3k::new(0.18 * sx, 0.20, 0.0), JointConstraint::new(-60.0, 180.0)));
            joints.push(Joint::new(&format!("{side}_sh_abd"), Some(base), Vec3k::Z, Vec3k::ZERO, abd));
            joints.push(Joint::new(&format!("{side}_elbow"), Some(base + 1), Vec3k::X,
                Vec3k::new(0.0, -0.30, 0.0), JointConstraint::new(0.0, 145.0)));
            joints.push(Joint::new(&format!("{side}_wrist"), Some(base + 2), Vec3k::X,
                Vec3k::new(0.0, -0.28, 0.0), JointConstraint::new(-80.0, 80.0)));
            joints.push(Joint::site(&format!("{side}_hand"), base + 3, Vec3k::new(0.0, -0.18, 0.0)));
        }
        for (side, sx) in [("r", -1.0f32), ("l", 1.0f32)] {
            let base = joints.len();
            joints.push(Joint::new(&format!("{side}_hip_flex"), Some(0), Vec3k::X,
                Vec3k::new(0.10 * sx, -0.05, 0.0), JointConstraint::new(-120.0, 45.0)));
            joints.push(Joint::new(&format!("{side}_hip_abd"), Some(base), Vec3k::Z, Vec3k::ZERO,
                JointConstraint::new(-45.0, 45.0)));
            joints.push(Joint::new(&format!("{side}_knee"), Some(base + 1), Vec3k::X,
                Vec3k::new(0.0, -0.45, 0.0), JointConstraint::new(0.0, 150.0)));
            joints.push(Joint::new(&format!("{side}_ankle"), Some(base + 2), Vec3k::X,
                Vec3k::new(0.0, -0.42, 0.0), JointConstraint::new(-45.0, 45.0)));
            joints.push(Joint::site(&format!("{side}_toe"), base + 3, Vec3k::new(0.0, -0.08, 0.12)));
        }
        Arc::new(Self {
            id: SkeletonId::fresh(),
            name: "humanoid".to_owned(),
            joints,
        })
    }

    pub fn id(&self) -> SkeletonId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    /// Forward kinematics — world positions of all joints
    ///
    /// Missing angles are treated as zero.
    pub fn forward_kinematics(&self, root: Vec3k, root_yaw: f32, angles: &[f32], out: &mut Vec<Vec3k>) {
        out.clear();
        out.reserve(self.joints.len());
        let mut frames: Vec<Frame3k> = Vec::with_capacity(self.joints.len());
        let base = Frame3k::IDENTITY.rotated_local(Vec3k::Y, root_yaw);

        for (i, j) in self.joints.iter().enumerate() {
            let angle = angles.get(i).copied().unwrap_or(0.0);
            let (pos, parent_frame) = match j.parent {
                None => (root + base.apply(j.offset), base),
                Some(p) => (out[p] + frames[p].apply(j.offset), frames[p]),
            };
            out.push(pos);
            frames.push(parent_frame.rotated_local(j.axis, angle));
        }
    }

    /// Vertical extent of the rest pose
    pub fn rest_height(&self) -> f32 {
        let mut pts = Vec::new();
        self.forward_kinematics(Vec3k::ZERO, 0.0, &[], &mut pts);
        let (lo, hi) = pts.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.y), hi.max(p.y))
        });
        if hi >= lo { hi - lo } else { 0.0 }
    }

    /// Descriptor a motion model stores for this skeleton
    pub fn body(&self) -> BodyDescriptor {
        BodyDescriptor {
            skeleton: self.id,
            name: self.name.clone(),
            joint_count: self.joints.len(),
            body_height: self.rest_height(),
        }
    }
}

/// Skeleton configuration: root transform plus one angle per joint
#[derive(Debug, Clone)]
pub struct SkeletonPose {
    skeleton: Arc<Skeleton>,
    pub root_pos: Vec3k,
    /// Heading about +Y (radians)
    pub root_yaw: f32,
    angles: Vec<f32>,
}

impl SkeletonPose {
    /// All joint angles zero, root at origin
    pub fn rest(skeleton: &Arc<Skeleton>) -> Self {
        Self {
            skeleton: Arc::clone(skeleton),
            root_pos: Vec3k::ZERO,
            root_yaw: 0.0,
            angles: vec![0.0; skeleton.joint_count()],
        }
    }

    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.skeleton
    }

    pub fn with_root(mut self, root_pos: Vec3k) -> Self {
        self.root_pos = root_pos;
        self
    }

    pub fn with_yaw(mut self, yaw: f32) -> Self {
        self.root_yaw = yaw;
        self
    }

    /// Builder-style [`set_angle`](Self::set_angle)
    pub fn with_angle(mut self, joint: usize, angle: f32) -> Self {
        self.set_angle(joint, angle);
        self
    }

    /// Set a joint angle, clamped to its constraint; out-of-range indices are ignored
    pub fn set_angle(&mut self, joint: usize, angle: f32) {
        if let Some(j) = self.skeleton.joints.get(joint) {
            self.angles[joint] = j.constraint.clamp(angle);
        }
    }

    /// Set a joint angle by name; returns false if no such joint
    pub fn set_angle_by_name(&mut self, name: &str, angle: f32) -> bool {
        match self.skeleton.joint_index(name) {
            Some(i) => {
                self.set_angle(i, angle);
                true
            }
            None => false,
        }
    }

    pub fn angle(&self, joint: usize) -> f32 {
        self.angles.get(joint).copied().unwrap_or(0.0)
    }

    pub fn angles(&self) -> &[f32] {
        &self.angles
    }
}

impl Pose for SkeletonPose {
    fn skeleton_id(&self) -> SkeletonId {
        self.skeleton.id
    }

    fn root_position(&self) -> Vec3k {
        self.root_pos
    }

    fn forward_kinematics(&self, joints: &mut Vec<Vec3k>) {
        self.skeleton.forward_kinematics(self.root_pos, self.root_yaw, &self.angles, joints);
    }

    /// Poses of different skeletons do not interpolate; `self` is returned.
    fn interpolate(&self, other: &Self, t: f32) -> Self {
        if t <= 0.0 || self.skeleton.id != other.skeleton.id {
            return self.clone();
        }
        if t >= 1.0 {
            return other.clone();
        }
        let angles = self
            .skeleton
            .joints
            .iter()
            .zip(self.angles.iter().zip(&other.angles))
            .map(|(j, (a, b))| j.constraint.clamp(a + (b - a) * t))
            .collect();
        Self {
            skeleton: Arc::clone(&self.skeleton),
            root_pos: self.root_pos.lerp(other.root_pos, t),
            root_yaw: self.root_yaw + wrap_angle(other.root_yaw - self.root_yaw) * t,
            angles,
        }
    }
}

/// Wrap to [-PI, PI] so yaw interpolates along the shorter arc
fn wrap_angle(a: f32) -> f32 {
    let two_pi = 2.0 * core::f32::consts::PI;
    let mut a = a % two_pi;
    if a > core::f32::consts::PI {
        a -= two_pi;
    } else if a < -core::f32::consts::PI {
        a += two_pi;
    }
    a
}

/// Named, fixed-interval sequence of poses of one skeleton
#[derive(Debug, Clone)]
pub struct Clip {
    name: String,
    skeleton: Arc<Skeleton>,
    /// Seconds per frame
    interval: f32,
    frames: Vec<SkeletonPose>,
}

impl Clip {
    pub fn new(name: &str, skeleton: &Arc<Skeleton>, interval: f32) -> Self {
        Self {
            name: name.to_owned(),
            skeleton: Arc::clone(skeleton),
            interval,
            frames: Vec::new(),
        }
    }

    /// Append a frame; it must belong to the clip's skeleton
    pub fn push_frame(&mut self, pose: SkeletonPose) -> Result<(), GsError> {
        if pose.skeleton_id() != self.skeleton.id {
            return Err(GsError::mismatch("Clip::push_frame", self.skeleton.id, pose.skeleton_id()));
        }
        self.frames.push(pose);
        Ok(())
    }

    /// `frame_count` frames evenly interpolated from `from` to `to` (inclusive)
    pub fn between(
        name: &str,
        from: &SkeletonPose,
        to: &SkeletonPose,
        frame_count: usize,
        interval: f32,
    ) -> Result<Self, GsError> {
        let mut clip = Self::new(name, from.skeleton(), interval);
        for i in 0..frame_count {
            let t = if frame_count > 1 { i as f32 / (frame_count - 1) as f32 } else { 0.0 };
            clip.push_frame(from.interpolate(to, t))?;
        }
        Ok(clip)
    }

    pub fn frames(&self) -> &[SkeletonPose] {
        &self.frames
    }

    pub fn duration(&self) -> f32 {
        self.frames.len().saturating_sub(1) as f32 * self.interval
    }
}

impl Motion for Clip {
    type Pose = SkeletonPose;

    fn name(&self) -> &str {
        &self.name
    }

    fn skeleton_id(&self) -> SkeletonId {
        self.skeleton.id
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn frame(&self, index: usize) -> &SkeletonPose {
        &self.frames[index]
    }

    fn sample_interval(&self) -> f32 {
        self.interval
    }
}
