//! Motion model — body descriptor plus an immutable splat store
//!
//! Built once (by [`ModelBuilder`] or [`MotionModel::fit`]) and read-only
//! afterwards. Generation allocates only call-local state, so a model can
//! serve concurrent `generate` calls from several threads.
//!
//! License: MIT
//! Author: Moroya Sakamoto

use crate::builder::ModelBuilder;
use crate::error::GsError;
use crate::generate::{rollout, GeneratedMotion};
use crate::options::{DumpOptions, GenerateOptions, TrainOptions};
use crate::pose::{BodyDescriptor, Motion, Pose};
use crate::splat::{Nearest, SplatStore};
use crate::trace::{NoopObserver, RolloutObserver};

#[derive(Debug, Clone)]
pub struct MotionModel<P> {
    body: BodyDescriptor,
    splats: SplatStore<P>,
    /// Used by `generate` when the call's own dump settings are disabled
    default_dump: Option<DumpOptions>,
}

impl<P: Pose> MotionModel<P> {
    /// Assemble a model from a finished store
    ///
    /// Every splat pose must belong to the body's skeleton. An empty store is
    /// accepted here but refused by `generate`.
    pub fn from_store(body: BodyDescriptor, splats: SplatStore<P>) -> Result<Self, GsError> {
        for s in splats.iter() {
            for pose in [&s.mean_pose, &s.next_pose] {
                if !body.accepts(pose.skeleton_id()) {
                    return Err(GsError::mismatch("MotionModel::from_store", body.skeleton, pose.skeleton_id()));
                }
            }
        }
        Ok(Self { body, splats, default_dump: None })
    }

    /// Train on `motions` in one go
    pub fn fit<'a, M, I>(body: BodyDescriptor, motions: I, options: TrainOptions) -> Result<Self, GsError>
    where
        M: Motion<Pose = P> + 'a,
        I: IntoIterator<Item = &'a M>,
    {
        let mut builder = ModelBuilder::new(body, options);
        for m in motions {
            builder.add_motion(m)?;
        }
        builder.build()
    }

    pub fn with_default_dump(mut self, dump: DumpOptions) -> Self {
        self.default_dump = Some(dump);
        self
    }

    pub fn default_dump(&self) -> Option<&DumpOptions> {
        self.default_dump.as_ref()
    }

    pub fn body(&self) -> &BodyDescriptor {
        &self.body
    }

    pub fn splats(&self) -> &SplatStore<P> {
        &self.splats
    }

    /// Pose belongs to the skeleton this model was trained for
    pub fn is_compatible(&self, pose: &P) -> bool {
        self.body.accepts(pose.skeleton_id())
    }

    pub fn nearest(&self, pose: &P) -> Option<Nearest> {
        self.splats.nearest(pose)
    }

    /// Roll out a motion from `start` toward `goal`
    pub fn generate(&self, start: &P, goal: &P, options: &GenerateOptions) -> Result<GeneratedMotion<P>, GsError> {
        self.generate_observed(start, goal, options, &mut NoopObserver)
    }

    /// [`generate`](Self::generate) with default options at the given tempo
    pub fn generate_with_tempo(&self, start: &P, goal: &P, tempo: f32) -> Result<GeneratedMotion<P>, GsError> {
        self.generate(start, goal, &GenerateOptions::with_tempo(tempo))
    }

    /// [`generate`](Self::generate), reporting every step to `observer`
    pub fn generate_observed(
        &self,
        start: &P,
        goal: &P,
        options: &GenerateOptions,
        observer: &mut dyn RolloutObserver<P>,
    ) -> Result<GeneratedMotion<P>, GsError> {
        #[cfg(feature = "dump")]
        {
            let dump = if options.dump.enabled {
                Some(&options.dump)
            } else {
                self.default_dump.as_ref().filter(|d| d.enabled)
            };
            if let Some(dump) = dump {
                let mut writer = crate::dump::TraceDump::new(dump.clone());
                let mut tee = crate::trace::Tee { first: observer, second: &mut writer };
                return rollout(self, start, goal, options, &mut tee);
            }
        }
        rollout(self, start, goal, options, observer)
    }
}
