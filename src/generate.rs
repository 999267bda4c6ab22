//! Generator — receding-horizon rollout from a start pose toward a goal
//!
//! Each step looks up the splat nearest to the current pose and searches a
//! small grid of blends between "follow the learned transition" (α = 0)
//! and "interpolate straight at the goal" (α = 1). A step is only accepted
//! if it brings the pose measurably closer to the goal; otherwise the step
//! duration is halved and the search repeated, up to three attempts.
//!
//! ```text
//! cur ──(1-α)·r_model──▶ p_model ┐
//!                                ├─ blend(α) ─▶ candidate
//! cur ────α·r_goal─────▶ p_goal  ┘
//! ```
//!
//! When the goal is reached but its neighbourhood is not stoppable, an
//! optional extension keeps following the model (goal ignored) until a
//! stoppable splat is nearest or [`EXTENSION_CAP`] steps have been added.
//!
//! License: MIT
//! Author: Moroya Sakamoto

use tracing::{debug, info, trace};

use crate::error::GsError;
use crate::keyframe::KeyframeMotion;
use crate::metric::RootRelative;
use crate::model::MotionModel;
use crate::options::{GenerateOptions, StagnationPolicy};
use crate::pose::Pose;
use crate::splat::{Splat, SplatStore};
use crate::trace::{BlendMode, InitRecord, RolloutObserver, StepEvent, StepRecord, Termination};

/// Minimum goal-distance reduction for a step to count as progress
pub const PROGRESS_EPSILON: f32 = 1e-6;
/// Step attempts at dt, dt/2, dt/4
pub const BACKOFF_ATTEMPTS: usize = 3;
/// Blend weights evaluated per attempt (0 = model, 1 = goal)
pub const ALPHA_GRID: [f32; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];
/// Upper bound on goal-stability extension steps
pub const EXTENSION_CAP: usize = 120;

const DIST_FLOOR: f32 = 1e-6;
/// Consecutive non-progressing steps before the inert policy would fire
const INERT_TRIGGER: u32 = 3;
const INERT_FORCE_STEPS: u32 = 3;

/// Output of one rollout
#[derive(Debug, Clone)]
pub struct GeneratedMotion<P> {
    /// Always starts with `(0, start)`
    pub keyframes: KeyframeMotion<P>,
    /// How the main loop ended
    pub termination: Termination,
    /// Model-following steps appended after the main loop
    pub extension_steps: usize,
}

impl<P: Pose> GeneratedMotion<P> {
    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn into_keyframes(self) -> KeyframeMotion<P> {
        self.keyframes
    }
}

#[inline]
fn safe_div(a: f32, b: f32) -> f32 {
    if b > 1e-8 { a / b } else { 0.0 }
}

/// `max(lo, min(hi, x))`; never panics on inverted bounds
#[inline]
fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    lo.max(hi.min(x))
}

/// Interpolation fraction that covers `speed · dt` of `dist`
#[inline]
fn advance_fraction(speed: f32, dt: f32, dist: f32) -> f32 {
    clamp(safe_div(speed * dt, dist.max(DIST_FLOOR)), 0.0, 1.0)
}

/// Tempo-scaled speed bounds of a splat: (v_ref, v_min, v_max)
#[inline]
fn scaled_speeds<P>(s: &Splat<P>, tempo: f32) -> (f32, f32, f32) {
    (s.v_norm_ref * tempo, s.v_norm_min * tempo, s.v_norm_max * tempo)
}

struct Candidate<P> {
    pose: P,
    cloud: RootRelative,
    dist_goal: f32,
    delta: f32,
    alpha: f32,
    mode: BlendMode,
    dt: f32,
    r_model: f32,
    r_goal: f32,
}

/// Best-candidate search for a single step
///
/// The best candidate persists across backoff attempts; a later candidate
/// replaces it only when it beats it by more than [`PROGRESS_EPSILON`].
struct StepSearch<'a, P> {
    cur: &'a P,
    goal: &'a P,
    goal_cloud: &'a RootRelative,
    target: &'a P,
    d_goal: f32,
    best: Option<Candidate<P>>,
}

impl<P: Pose> StepSearch<'_, P> {
    fn best_delta(&self) -> f32 {
        self.best.as_ref().map_or(f32::NEG_INFINITY, |c| c.delta)
    }

    fn made_progress(&self) -> bool {
        self.best_delta() > PROGRESS_EPSILON
    }

    fn evaluate(&mut self, alpha: f32, mode: BlendMode, dt: f32, model_frac: f32, goal_frac: f32) {
        let r_model = (1.0 - alpha) * model_frac;
        let r_goal = alpha * goal_frac;
        let p_model = self.cur.interpolate(self.target, r_model);
        let p_goal = self.cur.interpolate(self.goal, r_goal);
        let pose = p_model.interpolate(&p_goal, alpha);

        let cloud = RootRelative::of(&pose);
        let dist_goal = cloud.distance(self.goal_cloud);
        let delta = self.d_goal - dist_goal;
        if delta > self.best_delta() + PROGRESS_EPSILON {
            self.best = Some(Candidate { pose, cloud, dist_goal, delta, alpha, mode, dt, r_model, r_goal });
        }
    }
}

/// Stagnation bookkeeping across steps
struct Stagnation {
    policy: StagnationPolicy,
    counter: u32,
    force_remaining: u32,
}

impl Stagnation {
    fn new(policy: StagnationPolicy) -> Self {
        Self { policy, counter: 0, force_remaining: 0 }
    }

    /// Whether this step runs in forced-goal mode; consumes one forced step
    fn begin_step(&mut self) -> bool {
        if self.force_remaining > 0 {
            self.force_remaining -= 1;
            true
        } else {
            false
        }
    }

    /// Record an accepted step; returns true when forced-goal mode triggers
    fn end_step(&mut self, delta: f32, strained: bool) -> bool {
        let (next, fire, force_steps) = match self.policy {
            // Accepted steps always progress, so this counter never climbs
            StagnationPolicy::Inert => {
                let next = if delta > PROGRESS_EPSILON { 0 } else { self.counter + 1 };
                (next, next >= INERT_TRIGGER, INERT_FORCE_STEPS)
            }
            StagnationPolicy::Escalate { after, force_steps } => {
                let next = if strained { self.counter + 1 } else { 0 };
                (next, after > 0 && next >= after, force_steps)
            }
        };
        if fire {
            self.counter = 0;
            self.force_remaining = force_steps;
        } else {
            self.counter = next;
        }
        fire
    }
}

fn init_record<P: Pose>(
    store: &SplatStore<P>,
    start_cloud: &RootRelative,
    goal_cloud: &RootRelative,
    goal_stopability: Option<f32>,
    goal_sid: Option<usize>,
) -> InitRecord {
    let start_near = store.nearest_to(start_cloud);
    let d_start_next = start_near
        .and_then(|n| store.get(n.index))
        .map(|s| start_cloud.distance(&RootRelative::of(&s.next_pose)));
    InitRecord {
        d_goal0: start_cloud.distance(goal_cloud),
        start_sid: start_near.map(|n| n.index),
        d_start_splat: start_near.map_or(f32::INFINITY, |n| n.distance),
        d_start_next,
        goal_sid,
        goal_stopability,
    }
}

/// Full rollout; see module docs
///
/// # Errors
///
/// `InvalidOption` for non-finite options, `SkeletonMismatch` if `start` or
/// `goal` belong to another skeleton, `EmptyModel` if the model has no
/// splats. A stuck or step-limited rollout is not an error.
pub(crate) fn rollout<P: Pose>(
    model: &MotionModel<P>,
    start: &P,
    goal: &P,
    opts: &GenerateOptions,
    observer: &mut dyn RolloutObserver<P>,
) -> Result<GeneratedMotion<P>, GsError> {
    opts.validate()?;
    let body = model.body();
    if !model.is_compatible(start) {
        return Err(GsError::mismatch("generate: start", body.skeleton, start.skeleton_id()));
    }
    if !model.is_compatible(goal) {
        return Err(GsError::mismatch("generate: goal", body.skeleton, goal.skeleton_id()));
    }
    let store = model.splats();
    if store.is_empty() {
        return Err(GsError::EmptyModel);
    }

    let dt = opts.step_dt();
    let tolerance = opts.tolerance();
    let tempo = opts.tempo;
    let stop_th = opts.stopability_th;

    let goal_cloud = RootRelative::of(goal);
    let goal_splat = store.nearest_to(&goal_cloud).and_then(|n| store.get(n.index));
    let goal_stoppable = goal_splat.is_some_and(|s| s.stopability >= stop_th);
    let may_stop = goal_stoppable || !opts.extend_to_stable;

    let mut cur = start.clone();
    let mut cur_cloud = RootRelative::of(&cur);

    let init = init_record(store, &cur_cloud, &goal_cloud, goal_splat.map(|s| s.stopability), goal_splat.map(|s| s.id));
    debug!(
        d_goal0 = init.d_goal0,
        start_sid = ?init.start_sid,
        goal_sid = ?init.goal_sid,
        goal_stoppable,
        "rollout init"
    );
    observer.on_init(&init);

    let mut keyframes = KeyframeMotion::new(body.skeleton);
    keyframes.push(0.0, cur.clone());
    let mut t = 0.0f32;
    let mut stagnation = Stagnation::new(opts.stagnation);
    let mut termination = Termination::StepLimit;
    let mut steps = 0usize;

    for step in 0..opts.max_steps {
        let d_goal = cur_cloud.distance(&goal_cloud);
        if d_goal <= tolerance && may_stop {
            termination = Termination::GoalReached;
            break;
        }

        let Some(splat) = store.nearest_to(&cur_cloud).and_then(|n| store.get(n.index)) else {
            termination = Termination::Stuck;
            break;
        };
        let target = splat.model_target();
        let (v_ref, v_min, v_max) = scaled_speeds(splat, tempo);
        let used_speed = clamp(v_ref, v_min, v_max).max(opts.v_floor_mps);
        let d_model = cur_cloud.distance(&RootRelative::of(target));

        let forced = stagnation.begin_step();
        let mut search = StepSearch { cur: &cur, goal, goal_cloud: &goal_cloud, target, d_goal, best: None };

        let mut step_dt = dt;
        let mut backoffs = 0usize;
        let mut fell_back = false;
        while backoffs < BACKOFF_ATTEMPTS {
            let model_frac = advance_fraction(used_speed, step_dt, d_model);
            let goal_frac = advance_fraction(used_speed, step_dt, d_goal);

            if forced {
                search.evaluate(1.0, BlendMode::ForceGoal, step_dt, model_frac, goal_frac);
            } else {
                for alpha in ALPHA_GRID {
                    search.evaluate(alpha, BlendMode::Grid, step_dt, model_frac, goal_frac);
                }
            }
            if search.made_progress() {
                break;
            }

            let mode = if forced { BlendMode::ForceGoal } else { BlendMode::FallbackGoal };
            search.evaluate(1.0, mode, step_dt, model_frac, goal_frac);
            if search.made_progress() {
                fell_back = !forced;
                break;
            }

            step_dt *= 0.5;
            backoffs += 1;
        }

        let best = match search.best {
            Some(best) if best.delta > PROGRESS_EPSILON => best,
            _ => {
                debug!(step, d_goal, "no progressing candidate; rollout stuck");
                termination = Termination::Stuck;
                break;
            }
        };
        let mode = if fell_back { BlendMode::FallbackGoal } else { best.mode };

        let mut events = Vec::new();
        if backoffs > 0 {
            events.push(StepEvent::Backoff { dt: best.dt });
        }
        if forced {
            events.push(StepEvent::ForceGoal);
        } else if mode == BlendMode::FallbackGoal {
            events.push(StepEvent::FallbackGoal);
        }
        if stagnation.end_step(best.delta, backoffs > 0 || fell_back) {
            events.push(StepEvent::TriggerForceGoal);
        }

        let step_norm = best.cloud.distance(&cur_cloud);
        t += best.dt;
        cur = best.pose;
        cur_cloud = best.cloud;
        keyframes.push(t, cur.clone());
        steps += 1;

        let record = StepRecord {
            step,
            splat_id: splat.id,
            t_sec: t,
            dist_goal: best.dist_goal,
            delta_goal: best.delta,
            alpha: best.alpha,
            mode,
            step_norm,
            dt: best.dt,
            v_ref,
            v_min,
            v_max,
            used_speed,
            v_floor: opts.v_floor_mps,
            stopability: splat.stopability,
            r_model: best.r_model,
            r_goal: best.r_goal,
            events,
        };
        trace!(
            step,
            splat = splat.id,
            dist_goal = record.dist_goal,
            alpha = record.alpha,
            dt = record.dt,
            events = %record.events_joined(),
            "rollout step"
        );
        observer.on_step(&record);
    }

    let goal_reached = cur_cloud.distance(&goal_cloud) <= tolerance;
    // Step budget ran out (or was zero) with the goal already satisfied
    if termination == Termination::StepLimit && goal_reached && may_stop {
        termination = Termination::GoalReached;
    }
    let mut extension_steps = 0;
    if opts.extend_to_stable && !goal_stoppable && goal_reached {
        extension_steps = extend_to_stable(
            store,
            opts,
            &goal_cloud,
            steps,
            &mut t,
            &mut cur,
            &mut cur_cloud,
            &mut keyframes,
            observer,
        );
    }

    observer.on_finish(&keyframes, termination);
    info!(
        ?termination,
        keyframes = keyframes.len(),
        extension_steps,
        duration = keyframes.duration(),
        dist_goal = cur_cloud.distance(&goal_cloud),
        "rollout finished"
    );
    Ok(GeneratedMotion { keyframes, termination, extension_steps })
}

/// Pure model following at the nominal step until a stoppable splat is
/// nearest; returns the number of steps appended
#[allow(clippy::too_many_arguments)]
fn extend_to_stable<P: Pose>(
    store: &SplatStore<P>,
    opts: &GenerateOptions,
    goal_cloud: &RootRelative,
    first_step: usize,
    t: &mut f32,
    cur: &mut P,
    cur_cloud: &mut RootRelative,
    keyframes: &mut KeyframeMotion<P>,
    observer: &mut dyn RolloutObserver<P>,
) -> usize {
    let dt = opts.step_dt();
    let mut added = 0;
    while added < EXTENSION_CAP {
        let Some(splat) = store.nearest_to(cur_cloud).and_then(|n| store.get(n.index)) else {
            break;
        };
        if splat.stopability >= opts.stopability_th {
            break;
        }
        let target = splat.model_target();
        let (v_ref, v_min, v_max) = scaled_speeds(splat, opts.tempo);
        let r = advance_fraction(v_ref, dt, cur_cloud.distance(&RootRelative::of(target)));

        let next = cur.interpolate(target, r);
        let next_cloud = RootRelative::of(&next);
        let before = cur_cloud.distance(goal_cloud);
        let after = next_cloud.distance(goal_cloud);
        let step_norm = next_cloud.distance(cur_cloud);

        *t += dt;
        *cur = next;
        *cur_cloud = next_cloud;
        keyframes.push(*t, cur.clone());

        observer.on_step(&StepRecord {
            step: first_step + added,
            splat_id: splat.id,
            t_sec: *t,
            dist_goal: after,
            delta_goal: before - after,
            alpha: 0.0,
            mode: BlendMode::Extend,
            step_norm,
            dt,
            v_ref,
            v_min,
            v_max,
            used_speed: v_ref,
            v_floor: 0.0,
            stopability: splat.stopability,
            r_model: r,
            r_goal: 0.0,
            events: Vec::new(),
        });
        added += 1;
    }
    debug!(added, "goal-stability extension done");
    added
}
