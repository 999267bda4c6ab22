//! splat-kinematics — Pose-space splat motion model
//!
//! Learns a sparse set of "splats" from example motion clips (each splat a
//! pose plus its learned one-step transition, speed range and stopability)
//! and rolls out new motions from an arbitrary start pose to a goal pose by
//! blending the nearest splat's transition with a pull toward the goal.
//!
//! ```text
//! clips ──ModelBuilder──▶ MotionModel ──generate(start, goal)──▶ keyframes
//!            │ sample + merge      │ nearest splat, α-blend, backoff
//! ```
//!
//! The [`Pose`]/[`Motion`] traits are the only contract with the skeleton
//! side; [`Skeleton`], [`SkeletonPose`] and [`Clip`] are a reference
//! joint-chain implementation of them.
//!
//! License: MIT
//! Author: Moroya Sakamoto

pub mod builder;
pub mod error;
pub mod generate;
pub mod joint;
pub mod keyframe;
pub mod metric;
pub mod model;
pub mod options;
pub mod pose;
pub mod skeleton;
pub mod splat;
pub mod trace;

#[cfg(feature = "dump")]
pub mod dump;

pub use builder::ModelBuilder;
pub use error::GsError;
pub use generate::GeneratedMotion;
pub use joint::{Joint, JointConstraint, Vec3k};
pub use keyframe::KeyframeMotion;
pub use metric::{fk_distance, RootRelative};
pub use model::MotionModel;
pub use options::{DumpOptions, GenerateOptions, StagnationPolicy, TrainOptions};
pub use pose::{BodyDescriptor, Motion, Pose, SkeletonId};
pub use skeleton::{Clip, Skeleton, SkeletonPose};
pub use splat::{Nearest, Splat, SplatStore};
pub use trace::{
    BlendMode, InitRecord, NoopObserver, RolloutObserver, StepEvent, StepRecord, Termination, TraceRecorder,
    TraceSummary,
};
