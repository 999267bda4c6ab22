//! Joint model — single-axis joints, anatomical limits, vector math
//!
//! A skeleton is a tree of 1-DoF joints. Multi-DoF articulations
//! (shoulder, wrist) are stacked joints with zero offset between them,
//! the same way a 7-DoF arm is 3 + 1 + 3 single-axis joints.
//!
//! License: MIT
//! Author: Moroya Sakamoto

use core::ops::{Add, Mul, Neg, Sub};

/// 3D vector for kinematics (12 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3k {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3k {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };
    pub const X: Self = Self { x: 1.0, y: 0.0, z: 0.0 };
    pub const Y: Self = Self { x: 0.0, y: 1.0, z: 0.0 };
    pub const Z: Self = Self { x: 0.0, y: 0.0, z: 1.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length_sq(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn length(self) -> f32 {
        self.length_sq().sqrt()
    }

    pub fn normalize(self) -> Self {
        let len = self.length();
        if len < 1e-10 {
            return Self::ZERO;
        }
        let inv = 1.0 / len;
        Self { x: self.x * inv, y: self.y * inv, z: self.z * inv }
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    pub fn lerp(self, other: Self, t: f32) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    pub fn scale(self, s: f32) -> Self {
        Self { x: self.x * s, y: self.y * s, z: self.z * s }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl Add for Vec3k {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self { x: self.x + rhs.x, y: self.y + rhs.y, z: self.z + rhs.z }
    }
}

impl Sub for Vec3k {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self { x: self.x - rhs.x, y: self.y - rhs.y, z: self.z - rhs.z }
    }
}

impl Mul<f32> for Vec3k {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self { x: self.x * rhs, y: self.y * rhs, z: self.z * rhs }
    }
}

impl Neg for Vec3k {
    type Output = Self;
    fn neg(self) -> Self {
        Self { x: -self.x, y: -self.y, z: -self.z }
    }
}

/// Orthonormal frame (world-space basis of a joint)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame3k {
    pub x: Vec3k,
    pub y: Vec3k,
    pub z: Vec3k,
}

impl Frame3k {
    pub const IDENTITY: Self = Self { x: Vec3k::X, y: Vec3k::Y, z: Vec3k::Z };

    /// Express a local-space vector in world space
    pub fn apply(&self, v: Vec3k) -> Vec3k {
        self.x.scale(v.x) + self.y.scale(v.y) + self.z.scale(v.z)
    }

    /// Rotate this frame about its own local `axis` by `theta`
    ///
    /// Equivalent to right-multiplying by the local rotation R(axis, theta).
    pub fn rotated_local(&self, axis: Vec3k, theta: f32) -> Self {
        if theta == 0.0 {
            return *self;
        }
        let world_axis = self.apply(axis);
        Self {
            x: rotate_vec(self.x, world_axis, theta),
            y: rotate_vec(self.y, world_axis, theta),
            z: rotate_vec(self.z, world_axis, theta),
        }
    }
}

/// Rotation constraint for a joint axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointConstraint {
    /// Minimum angle in radians
    pub min_rad: f32,
    /// Maximum angle in radians
    pub max_rad: f32,
}

impl JointConstraint {
    pub const fn new(min_deg: f32, max_deg: f32) -> Self {
        Self {
            min_rad: min_deg * (core::f32::consts::PI / 180.0),
            max_rad: max_deg * (core::f32::consts::PI / 180.0),
        }
    }

    pub const fn free() -> Self {
        Self { min_rad: -core::f32::consts::PI, max_rad: core::f32::consts::PI }
    }

    /// Zero-range constraint for end sites
    pub const fn locked() -> Self {
        Self { min_rad: 0.0, max_rad: 0.0 }
    }

    pub fn clamp(&self, angle: f32) -> f32 {
        if angle < self.min_rad { self.min_rad }
        else if angle > self.max_rad { self.max_rad }
        else { angle }
    }

    pub fn range(&self) -> f32 {
        self.max_rad - self.min_rad
    }
}

/// Single-axis joint in a skeleton tree
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    /// Parent joint index; `None` for the root. Parents precede children.
    pub parent: Option<usize>,
    /// Rotation axis (local frame)
    pub axis: Vec3k,
    /// Offset from the parent joint, in the parent's frame (meters)
    pub offset: Vec3k,
    pub constraint: JointConstraint,
}

impl Joint {
    pub fn new(
        name: &str,
        parent: Option<usize>,
        axis: Vec3k,
        offset: Vec3k,
        constraint: JointConstraint,
    ) -> Self {
        Self { name: name.to_owned(), parent, axis: axis.normalize(), offset, constraint }
    }

    /// End site: carries position only, no rotational freedom
    pub fn site(name: &str, parent: usize, offset: Vec3k) -> Self {
        Self::new(name, Some(parent), Vec3k::X, offset, JointConstraint::locked())
    }

    pub fn is_site(&self) -> bool {
        self.constraint.range() == 0.0
    }
}

/// Rotate vector `v` around axis `axis` by angle `theta` (Rodrigues' formula)
pub(crate) fn rotate_vec(v: Vec3k, axis: Vec3k, theta: f32) -> Vec3k {
    let (sin_t, cos_t) = theta.sin_cos();
    let k = axis.normalize();
    let term1 = v.scale(cos_t);
    let term2 = k.cross(v).scale(sin_t);
    let term3 = k.scale(k.dot(v) * (1.0 - cos_t));
    term1 + term2 + term3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3k_basic() {
        let a = Vec3k::new(1.0, 2.0, 3.0);
        let b = Vec3k::new(4.0, 5.0, 6.0);
        let c = a + b;
        assert!((c.x - 5.0).abs() < 0.001);
        assert!((c.y - 7.0).abs() < 0.001);
    }

    #[test]
    fn test_vec3k_length() {
        let v = Vec3k::new(3.0, 4.0, 0.0);
        assert!((v.length() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_vec3k_normalize() {
        let v = Vec3k::new(3.0, 4.0, 0.0);
        let n = v.normalize();
        assert!((n.length() - 1.0).abs() < 1e-6);
        assert_eq!(Vec3k::ZERO.normalize(), Vec3k::ZERO);
    }

    #[test]
    fn test_vec3k_cross() {
        let z = Vec3k::X.cross(Vec3k::Y);
        assert!((z.z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_joint_constraint_clamp() {
        let c = JointConstraint::new(0.0, 90.0);
        assert!((c.clamp(2.0) - c.max_rad).abs() < 1e-6);
        assert!((c.clamp(-1.0) - c.min_rad).abs() < 1e-6);
        assert!((c.clamp(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_locked_constraint() {
        let c = JointConstraint::locked();
        assert_eq!(c.clamp(1.0), 0.0);
        assert_eq!(c.range(), 0.0);
    }

    #[test]
    fn test_site_is_site() {
        let j = Joint::site("tip", 0, Vec3k::new(0.0, -0.2, 0.0));
        assert!(j.is_site());
        assert_eq!(j.parent, Some(0));
    }

    #[test]
    fn test_rotate_vec_identity() {
        let r = rotate_vec(Vec3k::X, Vec3k::Y, 0.0);
        assert!((r.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rotate_vec_90deg() {
        let r = rotate_vec(Vec3k::X, Vec3k::Z, core::f32::consts::FRAC_PI_2);
        assert!(r.x.abs() < 1e-6);
        assert!((r.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_frame_rotated_local_composes() {
        // Yaw the frame 90 degrees, then rotate about local x:
        // local x now points along world -z.
        let yawed = Frame3k::IDENTITY.rotated_local(Vec3k::Y, core::f32::consts::FRAC_PI_2);
        assert!((yawed.x.z + 1.0).abs() < 1e-6);
        let pitched = yawed.rotated_local(Vec3k::X, core::f32::consts::FRAC_PI_2);
        // Rotation axis is preserved
        assert!((pitched.x.z + 1.0).abs() < 1e-6);
        // Local y is carried onto world +x
        assert!((pitched.y.x - 1.0).abs() < 1e-5);
    }
}
