//! Start-to-goal generation against a trained arm model

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use splat_kinematics::generate::{EXTENSION_CAP, PROGRESS_EPSILON};
use splat_kinematics::{
    fk_distance, BlendMode, BodyDescriptor, Clip, GenerateOptions, Motion, MotionModel, Pose, Skeleton, SkeletonId,
    SkeletonPose, Splat, SplatStore, StagnationPolicy, StepEvent, Termination, TraceRecorder, TrainOptions, Vec3k,
};

const FRAMES: usize = 31;

struct Fixture {
    clip: Clip,
    model: MotionModel<SkeletonPose>,
}

impl Fixture {
    /// 1 s shoulder sweep of 1.5 rad at 30 Hz; every splat is transient
    fn sweep(train: TrainOptions) -> Self {
        let arm = Skeleton::right_arm();
        let a = SkeletonPose::rest(&arm);
        let b = SkeletonPose::rest(&arm).with_angle(0, 1.5);
        let clip = Clip::between("sweep", &a, &b, FRAMES, 1.0 / 30.0).unwrap();
        let model = MotionModel::fit(arm.body(), [&clip], train).unwrap();
        Self { clip, model }
    }

    fn first(&self) -> &SkeletonPose {
        self.clip.frame(0)
    }

    fn last(&self) -> &SkeletonPose {
        self.clip.frame(FRAMES - 1)
    }
}

fn stop_at_goal() -> GenerateOptions {
    GenerateOptions { extend_to_stable: false, ..GenerateOptions::default() }
}

#[test]
fn test_round_trip_reaches_goal_within_frame_count() {
    let fx = Fixture::sweep(TrainOptions::default());
    let out = fx.model.generate(fx.first(), fx.last(), &stop_at_goal()).unwrap();

    assert_eq!(out.termination, Termination::GoalReached);
    assert_eq!(out.extension_steps, 0);
    let steps = out.keyframes.len() - 1;
    assert!(steps >= 1);
    assert!(steps <= fx.clip.frame_count(), "took {steps} steps");
    let last = out.keyframes.last_pose().unwrap();
    assert!(fk_distance(last, fx.last()) <= 0.02);
}

#[test]
fn test_sequence_starts_at_start_with_ordered_times() {
    let fx = Fixture::sweep(TrainOptions::default());
    let out = fx.model.generate(fx.first(), fx.last(), &stop_at_goal()).unwrap();

    assert_eq!(out.keyframes.times()[0], 0.0);
    assert_eq!(fk_distance(out.keyframes.first_pose().unwrap(), fx.first()), 0.0);
    for w in out.keyframes.times().windows(2) {
        assert!(w[1] >= w[0]);
    }
}

#[test]
fn test_every_step_makes_progress() {
    let fx = Fixture::sweep(TrainOptions::default());
    let mut rec = TraceRecorder::new();
    let out = fx.model.generate_observed(fx.first(), fx.last(), &stop_at_goal(), &mut rec).unwrap();

    let init = rec.init.unwrap();
    assert_abs_diff_eq!(init.d_goal0, fk_distance(fx.first(), fx.last()), epsilon = 1e-6);
    assert_eq!(init.start_sid, Some(0));
    assert_eq!(rec.termination, Some(out.termination));
    assert_eq!(rec.steps.len(), out.keyframes.len() - 1);

    let mut prev = init.d_goal0;
    for (s, pose) in rec.steps.iter().zip(out.keyframes.poses().iter().skip(1)) {
        assert!(s.delta_goal > PROGRESS_EPSILON);
        assert!(s.dist_goal < prev);
        assert_abs_diff_eq!(s.dist_goal, fk_distance(pose, fx.last()), epsilon = 1e-5);
        assert!(s.used_speed >= s.v_floor);
        prev = s.dist_goal;
    }
    assert!(rec.summary().unwrap().passes_smoke());
}

#[test]
fn test_start_equals_stoppable_goal_needs_no_steps() {
    // A huge stop threshold makes every splat stoppable
    let fx = Fixture::sweep(TrainOptions { stop_v_threshold: 100.0, ..TrainOptions::default() });
    let out = fx.model.generate(fx.first(), fx.first(), &GenerateOptions::default()).unwrap();
    assert_eq!(out.keyframes.len(), 1);
    assert_eq!(out.termination, Termination::GoalReached);
    assert_eq!(out.extension_steps, 0);
}

#[test]
fn test_extension_is_capped() {
    let fx = Fixture::sweep(TrainOptions { enable_merge: false, ..TrainOptions::default() });
    // Goal already reached but never stoppable: the main loop cannot
    // improve on zero distance, then extension follows the model
    let opts = GenerateOptions { stopability_th: 2.0, ..GenerateOptions::default() };
    let mut rec = TraceRecorder::new();
    let out = fx.model.generate_observed(fx.first(), fx.first(), &opts, &mut rec).unwrap();

    assert_eq!(out.termination, Termination::Stuck);
    assert_eq!(out.extension_steps, EXTENSION_CAP);
    assert_eq!(out.keyframes.len(), 1 + EXTENSION_CAP);
    assert!(rec.steps.iter().all(|s| s.mode == BlendMode::Extend));
    // Model following carries the arm to the end of the sweep
    let last = out.keyframes.last_pose().unwrap();
    assert!(fk_distance(last, fx.last()) < 1e-4);
    assert_abs_diff_eq!(out.keyframes.duration(), EXTENSION_CAP as f32 / 30.0, epsilon = 1e-3);
}

#[test]
fn test_extension_follows_goal_reach() {
    let fx = Fixture::sweep(TrainOptions { enable_merge: false, ..TrainOptions::default() });
    let out = fx.model.generate_with_tempo(fx.first(), fx.last(), 1.0).unwrap();
    // The sweep's end is transient, so the rollout keeps going after reaching it
    assert!(out.extension_steps > 0);
    assert!(out.keyframes.len() <= 1 + GenerateOptions::default().max_steps + EXTENSION_CAP);
    let last = out.keyframes.last_pose().unwrap();
    assert!(fk_distance(last, fx.last()) <= 0.02);
}

#[test]
fn test_step_limit_still_returns_motion() {
    let fx = Fixture::sweep(TrainOptions::default());
    let opts = GenerateOptions { max_steps: 3, ..GenerateOptions::default() };
    let out = fx.model.generate(fx.first(), fx.last(), &opts).unwrap();
    assert_eq!(out.termination, Termination::StepLimit);
    assert_eq!(out.keyframes.len(), 4);
    assert_eq!(out.extension_steps, 0);
}

#[test]
fn test_faster_tempo_takes_fewer_steps() {
    let fx = Fixture::sweep(TrainOptions::default());
    let slow = fx.model.generate(fx.first(), fx.last(), &stop_at_goal()).unwrap();
    let fast = fx
        .model
        .generate(fx.first(), fx.last(), &GenerateOptions { tempo: 2.0, ..stop_at_goal() })
        .unwrap();
    assert_eq!(fast.termination, Termination::GoalReached);
    assert!(fast.keyframes.len() < slow.keyframes.len());
}

#[test]
fn test_root_translation_does_not_matter() {
    let fx = Fixture::sweep(TrainOptions::default());
    let start = fx.first().clone().with_root(Vec3k::new(3.0, 0.0, -2.0));
    let out = fx.model.generate(&start, fx.last(), &stop_at_goal()).unwrap();
    assert_eq!(out.termination, Termination::GoalReached);
}

#[test]
fn test_escalation_keeps_progress_invariant() {
    let fx = Fixture::sweep(TrainOptions::default());
    let opts = GenerateOptions {
        stagnation: StagnationPolicy::Escalate { after: 1, force_steps: 2 },
        ..stop_at_goal()
    };
    let mut rec = TraceRecorder::new();
    let out = fx.model.generate_observed(fx.first(), fx.last(), &opts, &mut rec).unwrap();
    assert_eq!(out.termination, Termination::GoalReached);
    for s in &rec.steps {
        assert!(s.delta_goal > PROGRESS_EPSILON);
        if s.mode == BlendMode::ForceGoal {
            assert_eq!(s.alpha, 1.0);
        }
    }
}

#[test]
fn test_models_are_shareable_across_threads() {
    let fx = Arc::new(Fixture::sweep(TrainOptions::default()));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let fx = Arc::clone(&fx);
            std::thread::spawn(move || fx.model.generate(fx.first(), fx.last(), &stop_at_goal()).map(|m| m.len()))
        })
        .collect();
    let lens: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();
    assert!(lens.windows(2).all(|w| w[0] == w[1]));
}

/// One-parameter body whose hand jumps far away while `x` is in (0.3, 0.95)
#[derive(Debug, Clone)]
struct Detour {
    skeleton: SkeletonId,
    x: f32,
}

impl Pose for Detour {
    fn skeleton_id(&self) -> SkeletonId {
        self.skeleton
    }

    fn root_position(&self) -> Vec3k {
        Vec3k::ZERO
    }

    fn forward_kinematics(&self, joints: &mut Vec<Vec3k>) {
        let hand = if self.x > 0.3 && self.x < 0.95 { -5.0 } else { self.x };
        joints.clear();
        joints.push(Vec3k::ZERO);
        joints.push(Vec3k::new(hand, 0.0, 0.0));
    }

    fn interpolate(&self, other: &Self, t: f32) -> Self {
        if t <= 0.0 {
            return self.clone();
        }
        if t >= 1.0 {
            return other.clone();
        }
        Self { skeleton: self.skeleton, x: self.x + (other.x - self.x) * t }
    }
}

#[test]
fn test_blocked_full_step_halves_dt() {
    let skeleton = SkeletonId::fresh();
    let at = |x: f32| Detour { skeleton, x };
    // 0.8 of the start-goal gap per second: every full-length blend lands in the detour
    let v_ref = 0.8 * core::f32::consts::FRAC_1_SQRT_2;
    let splat = Splat {
        id: 0,
        mean_pose: at(0.0),
        next_pose: at(1.0),
        has_next: true,
        occ_sigma_m: 0.05,
        stopability: 1.0,
        v_norm_ref: v_ref,
        v_norm_min: 0.5 * v_ref,
        v_norm_max: 2.0 * v_ref,
        source_motion: "detour".into(),
        source_frame: 0,
        source_interval: 1.0,
    };
    let body = BodyDescriptor { skeleton, name: "detour".into(), joint_count: 2, body_height: 0.0 };
    let model = MotionModel::from_store(body, SplatStore::from_splats(vec![splat])).unwrap();

    let opts = GenerateOptions { dt_seconds: 1.0, ..stop_at_goal() };
    let mut rec = TraceRecorder::new();
    let out = model.generate_observed(&at(0.0), &at(1.0), &opts, &mut rec).unwrap();

    assert_eq!(out.termination, Termination::GoalReached);
    let halved = rec
        .steps
        .iter()
        .find(|s| s.events.contains(&StepEvent::Backoff { dt: 0.5 }))
        .expect("a step needed a shorter dt");
    assert!(halved.dt < opts.dt_seconds);
    assert!(rec.steps.iter().all(|s| s.delta_goal > PROGRESS_EPSILON));

    let times = out.keyframes.times();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(times.len(), 3);
    for (t, want) in times.iter().zip([0.0f32, 0.5, 1.5]) {
        assert_abs_diff_eq!(*t, want, epsilon = 1e-6);
    }
}
