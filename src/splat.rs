//! Splats — local representatives of pose space
//!
//! A splat is a pose (`mean_pose`) with the pose observed one sample step
//! later (`next_pose`), an isotropic occupancy radius, a stopability
//! score and a learned speed range. The store is the ordered, immutable
//! set a model owns; it also serves as the nearest-splat index.
//!
//! License: MIT
//! Author: Moroya Sakamoto

use crate::metric::RootRelative;
use crate::pose::Pose;

/// Learned local representative
#[derive(Debug, Clone)]
pub struct Splat<P> {
    /// Dense 0..N-1 within a store
    pub id: usize,
    /// Occupancy center
    pub mean_pose: P,
    /// One sample step after `mean_pose` in training data
    pub next_pose: P,
    /// False for samples without a successor
    pub has_next: bool,

    /// Isotropic occupancy radius (FK meters), informational
    pub occ_sigma_m: f32,

    /// [0..1]; 1 = easy to hold (balanced stance), 0 = transient (mid-air)
    pub stopability: f32,
    /// Reference transition speed (FK meters / s)
    pub v_norm_ref: f32,
    pub v_norm_min: f32,
    pub v_norm_max: f32,

    // Provenance, diagnostics only
    pub source_motion: String,
    pub source_frame: usize,
    pub source_interval: f32,
}

impl<P: Pose> Splat<P> {
    /// Pose the model recommends moving toward from this splat
    pub fn model_target(&self) -> &P {
        if self.has_next { &self.next_pose } else { &self.mean_pose }
    }
}

/// Result of a nearest-splat query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    pub index: usize,
    pub distance: f32,
}

/// Ordered, immutable splat collection with a linear nearest-splat index
#[derive(Debug, Clone)]
pub struct SplatStore<P> {
    splats: Vec<Splat<P>>,
    /// Root-relative joints of each `mean_pose`, same order as `splats`
    centers: Vec<RootRelative>,
}

impl<P: Pose> SplatStore<P> {
    /// Finalize a store; ids are reassigned 0..N-1 in order
    pub fn from_splats(mut splats: Vec<Splat<P>>) -> Self {
        for (i, s) in splats.iter_mut().enumerate() {
            s.id = i;
        }
        let centers = splats.iter().map(|s| RootRelative::of(&s.mean_pose)).collect();
        Self { splats, centers }
    }

    pub fn empty() -> Self {
        Self { splats: Vec::new(), centers: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.splats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splats.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Splat<P>> {
        self.splats.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Splat<P>> {
        self.splats.iter()
    }

    pub fn as_slice(&self) -> &[Splat<P>] {
        &self.splats
    }

    /// Nearest splat to `pose` by FK distance to `mean_pose`
    pub fn nearest(&self, pose: &P) -> Option<Nearest> {
        self.nearest_to(&RootRelative::of(pose))
    }

    /// Nearest splat to precomputed root-relative joints
    ///
    /// Ties resolve to the lowest index. `None` when the store is empty or
    /// nothing is at finite distance.
    pub fn nearest_to(&self, query: &RootRelative) -> Option<Nearest> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            self.centers
                .par_iter()
                .enumerate()
                .map(|(index, c)| Nearest { index, distance: c.distance(query) })
                .filter(|n| n.distance < f32::INFINITY)
                .reduce_with(|a, b| {
                    if b.distance < a.distance || (b.distance == a.distance && b.index < a.index) {
                        b
                    } else {
                        a
                    }
                })
        }
        #[cfg(not(feature = "parallel"))]
        {
            let mut best: Option<Nearest> = None;
            let mut best_d = f32::INFINITY;
            for (index, c) in self.centers.iter().enumerate() {
                let d = c.distance(query);
                if d < best_d {
                    best_d = d;
                    best = Some(Nearest { index, distance: d });
                }
            }
            best
        }
    }
}

impl<P> Default for SplatStore<P> {
    fn default() -> Self {
        Self { splats: Vec::new(), centers: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{Skeleton, SkeletonPose};

    fn splat(mean: SkeletonPose) -> Splat<SkeletonPose> {
        Splat {
            id: 99,
            next_pose: mean.clone(),
            mean_pose: mean,
            has_next: true,
            occ_sigma_m: 0.05,
            stopability: 0.5,
            v_norm_ref: 0.5,
            v_norm_min: 0.25,
            v_norm_max: 1.0,
            source_motion: "test".into(),
            source_frame: 0,
            source_interval: 1.0 / 30.0,
        }
    }

    #[test]
    fn test_ids_renumbered_dense() {
        let arm = Skeleton::right_arm();
        let store = SplatStore::from_splats(vec![
            splat(SkeletonPose::rest(&arm)),
            splat(SkeletonPose::rest(&arm).with_angle(0, 1.0)),
            splat(SkeletonPose::rest(&arm).with_angle(0, 2.0)),
        ]);
        let ids: Vec<usize> = store.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_nearest_picks_minimum() {
        let arm = Skeleton::right_arm();
        let store = SplatStore::from_splats(vec![
            splat(SkeletonPose::rest(&arm)),
            splat(SkeletonPose::rest(&arm).with_angle(0, 1.0)),
            splat(SkeletonPose::rest(&arm).with_angle(0, 2.0)),
        ]);
        let q = SkeletonPose::rest(&arm).with_angle(0, 0.9);
        let n = store.nearest(&q).unwrap();
        assert_eq!(n.index, 1);
        assert!(n.distance > 0.0);
    }

    #[test]
    fn test_nearest_tie_breaks_lowest_index() {
        let arm = Skeleton::right_arm();
        let p = SkeletonPose::rest(&arm).with_angle(3, 0.5);
        let store = SplatStore::from_splats(vec![
            splat(SkeletonPose::rest(&arm).with_angle(0, 2.0)),
            splat(p.clone()),
            splat(p.clone()),
            splat(p.clone()),
        ]);
        let n = store.nearest(&p).unwrap();
        assert_eq!(n.index, 1);
        assert_eq!(n.distance, 0.0);
    }

    #[test]
    fn test_empty_store_has_no_nearest() {
        let arm = Skeleton::right_arm();
        let store: SplatStore<SkeletonPose> = SplatStore::empty();
        assert!(store.is_empty());
        assert!(store.nearest(&SkeletonPose::rest(&arm)).is_none());
    }

    #[test]
    fn test_foreign_skeleton_has_no_nearest() {
        let arm = Skeleton::right_arm();
        let store = SplatStore::from_splats(vec![splat(SkeletonPose::rest(&arm))]);
        let stranger = SkeletonPose::rest(&Skeleton::right_arm());
        assert!(store.nearest(&stranger).is_none());
    }

    #[test]
    fn test_model_target_falls_back_to_mean() {
        let arm = Skeleton::right_arm();
        let mut s = splat(SkeletonPose::rest(&arm));
        s.next_pose = SkeletonPose::rest(&arm).with_angle(0, 1.0);
        assert_eq!(s.model_target().angle(0), 1.0);
        s.has_next = false;
        assert_eq!(s.model_target().angle(0), 0.0);
    }
}
