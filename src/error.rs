//! Error kinds for training, generation and dumps
//!
//! License: MIT
//! Author: Moroya Sakamoto

use thiserror::Error;

use crate::pose::SkeletonId;

/// Errors surfaced by model building and generation
///
/// Running out of progress during a rollout is not an error; it ends the
/// rollout early with [`crate::Termination::Stuck`].
#[derive(Debug, Error)]
pub enum GsError {
    /// A pose or motion belongs to a different skeleton than the model/builder.
    #[error("skeleton mismatch in {context}: expected {expected}, found {found}")]
    SkeletonMismatch {
        context: &'static str,
        expected: SkeletonId,
        found: SkeletonId,
    },

    /// Generation attempted against a model with no splats.
    #[error("model has no splats")]
    EmptyModel,

    /// Training yielded zero splats from the supplied motions and options.
    #[error("no splats produced from {motions} motion(s)")]
    NoSplatsProduced { motions: usize },

    /// An option value is unusable (non-finite, out of range).
    #[error("invalid option `{name}`: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    /// Joint tree is malformed.
    #[error("invalid skeleton: {0}")]
    InvalidSkeleton(String),

    #[error("dump i/o: {0}")]
    DumpIo(#[from] std::io::Error),

    #[error("dump encoding: {0}")]
    DumpJson(#[from] serde_json::Error),
}

impl GsError {
    pub(crate) fn mismatch(context: &'static str, expected: SkeletonId, found: SkeletonId) -> Self {
        Self::SkeletonMismatch { context, expected, found }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_message_names_both_skeletons() {
        let err = GsError::mismatch("generate(start)", SkeletonId(1), SkeletonId(2));
        let msg = err.to_string();
        assert!(msg.contains("generate(start)"));
        assert!(msg.contains("skeleton#1"));
        assert!(msg.contains("skeleton#2"));
    }

    #[test]
    fn test_no_splats_message() {
        let err = GsError::NoSplatsProduced { motions: 2 };
        assert_eq!(err.to_string(), "no splats produced from 2 motion(s)");
    }
}
