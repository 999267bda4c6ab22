//! Rollout trace — per-step records and observer hooks
//!
//! Generation reports what it did through [`RolloutObserver`]. Nothing in
//! the rollout depends on an observer being present or reading anything.
//!
//! License: MIT
//! Author: Moroya Sakamoto

use serde::{Deserialize, Serialize};

use crate::keyframe::KeyframeMotion;

/// Diagnostics captured once, before the first step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitRecord {
    /// Start-to-goal FK distance
    pub d_goal0: f32,
    pub start_sid: Option<usize>,
    /// Start to its nearest splat center
    pub d_start_splat: f32,
    /// Start to that splat's `next_pose`
    pub d_start_next: Option<f32>,
    pub goal_sid: Option<usize>,
    pub goal_stopability: Option<f32>,
}

/// How the accepted candidate was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Best of the alpha grid
    Grid,
    /// Pure goal interpolation after the grid made no progress
    FallbackGoal,
    /// Forced pure goal interpolation
    ForceGoal,
    /// Post-rollout model following toward a stoppable pose
    Extend,
}

impl BlendMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grid => "grid",
            Self::FallbackGoal => "fallback_goal",
            Self::ForceGoal => "force_goal",
            Self::Extend => "extend",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StepEvent {
    /// Step duration was halved at least once; `dt` is what got used
    Backoff { dt: f32 },
    FallbackGoal,
    ForceGoal,
    /// Stagnation policy switched on forced-goal steps
    TriggerForceGoal,
}

impl StepEvent {
    /// Compact tag used in CSV traces
    pub fn tag(&self) -> String {
        match self {
            Self::Backoff { dt } => format!("dt={dt:.4}"),
            Self::FallbackGoal => "fallback_goal".to_owned(),
            Self::ForceGoal => "force_goal".to_owned(),
            Self::TriggerForceGoal => "trigger_force_goal".to_owned(),
        }
    }
}

/// One accepted step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub splat_id: usize,
    /// Time after the step
    pub t_sec: f32,
    /// Goal distance after the step
    pub dist_goal: f32,
    /// Goal distance reduction achieved by the step
    pub delta_goal: f32,
    pub alpha: f32,
    pub mode: BlendMode,
    /// FK distance covered by the step
    pub step_norm: f32,
    pub dt: f32,
    pub v_ref: f32,
    pub v_min: f32,
    pub v_max: f32,
    pub used_speed: f32,
    pub v_floor: f32,
    pub stopability: f32,
    pub r_model: f32,
    pub r_goal: f32,
    pub events: Vec<StepEvent>,
}

impl StepRecord {
    pub fn events_joined(&self) -> String {
        self.events.iter().map(StepEvent::tag).collect::<Vec<_>>().join(";")
    }
}

/// How the main rollout loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Within tolerance and allowed to stop
    GoalReached,
    /// No nearest splat, or no step made progress within the backoff budget
    Stuck,
    /// `max_steps` exhausted
    StepLimit,
}

/// Receives rollout diagnostics; every hook defaults to doing nothing
pub trait RolloutObserver<P> {
    fn on_init(&mut self, _init: &InitRecord) {}
    fn on_step(&mut self, _step: &StepRecord) {}
    fn on_finish(&mut self, _keyframes: &KeyframeMotion<P>, _termination: Termination) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl<P> RolloutObserver<P> for NoopObserver {}

/// Observer that keeps every record in memory
#[derive(Debug, Default, Clone)]
pub struct TraceRecorder {
    pub init: Option<InitRecord>,
    pub steps: Vec<StepRecord>,
    pub termination: Option<Termination>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Goal-distance summary over recorded steps
    pub fn summary(&self) -> Option<TraceSummary> {
        TraceSummary::from_steps(&self.steps)
    }
}

impl<P> RolloutObserver<P> for TraceRecorder {
    fn on_init(&mut self, init: &InitRecord) {
        self.init = Some(*init);
    }

    fn on_step(&mut self, step: &StepRecord) {
        self.steps.push(step.clone());
    }

    fn on_finish(&mut self, _keyframes: &KeyframeMotion<P>, termination: Termination) {
        self.termination = Some(termination);
    }
}

/// Fans records out to two observers
pub struct Tee<'a, A: ?Sized, B: ?Sized> {
    pub first: &'a mut A,
    pub second: &'a mut B,
}

impl<P, A, B> RolloutObserver<P> for Tee<'_, A, B>
where
    A: RolloutObserver<P> + ?Sized,
    B: RolloutObserver<P> + ?Sized,
{
    fn on_init(&mut self, init: &InitRecord) {
        self.first.on_init(init);
        self.second.on_init(init);
    }

    fn on_step(&mut self, step: &StepRecord) {
        self.first.on_step(step);
        self.second.on_step(step);
    }

    fn on_finish(&mut self, keyframes: &KeyframeMotion<P>, termination: Termination) {
        self.first.on_finish(keyframes, termination);
        self.second.on_finish(keyframes, termination);
    }
}

/// Smoke-level quality figures of a rollout
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub start: f32,
    pub min: f32,
    pub last: f32,
    pub improvement_abs: f32,
    pub improvement_rel: f32,
}

/// Final goal distance below this passes the smoke check outright
pub const SMOKE_LAST_TOLERANCE: f32 = 0.02;

impl TraceSummary {
    /// `None` for an empty trace or non-finite goal distances
    pub fn from_steps(steps: &[StepRecord]) -> Option<Self> {
        let first = steps.first()?;
        if steps.iter().any(|s| !s.dist_goal.is_finite()) {
            return None;
        }
        let start = first.dist_goal;
        let last = steps.last().map_or(start, |s| s.dist_goal);
        let min = steps.iter().map(|s| s.dist_goal).fold(f32::INFINITY, f32::min);
        let improvement_abs = start - last;
        let improvement_rel = if start > 0.0 { improvement_abs / start.max(1e-9) } else { 0.0 };
        Some(Self { start, min, last, improvement_abs, improvement_rel })
    }

    /// Moved toward the goal, or ended close to it
    pub fn passes_smoke(&self) -> bool {
        self.improvement_abs > 0.0 || self.last < SMOKE_LAST_TOLERANCE
    }
}
