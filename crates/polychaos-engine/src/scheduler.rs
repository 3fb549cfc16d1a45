//! Run-state machine and cadence bookkeeping for cooperative quanta.
//!
//! The scheduler does no work itself. The engine asks it whether a
//! stability check or a render request is due, and it tracks the
//! `Idle -> Running -> Idle` lifecycle and the run's start time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{Clock, duration_serde};

/// Whether the engine is currently producing points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Waiting for `play`.
    #[default]
    Idle,
    /// Quanta produce points until stopped or converged.
    Running,
}

/// Outcome of one quantum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantumStatus {
    /// More work remains; schedule another quantum.
    Continue,
    /// The run is over (stopped, converged, or never started).
    Done,
}

/// Payload of a stability check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityEvent {
    /// Smoothed new-pixel count.
    pub ema: f64,
    /// Percentage of filled pixels that were already filled.
    pub fill_ratio: f64,
}

/// Payload of an auto-stop convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedEvent {
    /// Wall-clock time from `play` to convergence.
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
}

/// Something the host should hear about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    /// A stability check ran.
    Stability(StabilityEvent),
    /// Auto-stop detected convergence and the run ended.
    Finished(FinishedEvent),
}

/// Everything one quantum produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantum {
    /// Whether to schedule another quantum.
    pub status: QuantumStatus,
    /// Whether the host should take a render snapshot now.
    pub render_requested: bool,
    /// Batches executed in this quantum.
    pub batches: u32,
    /// Events raised in order.
    pub events: Vec<EngineEvent>,
}

impl Quantum {
    /// A quantum that did nothing and ends the run.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            status: QuantumStatus::Done,
            render_requested: false,
            batches: 0,
            events: Vec::new(),
        }
    }

    /// Whether another quantum should be scheduled.
    #[must_use]
    pub fn should_continue(&self) -> bool {
        self.status == QuantumStatus::Continue
    }
}

/// Lifecycle and cadence state.
pub struct Scheduler<C: Clock> {
    state: RunState,
    since_check: u64,
    run_started: Option<C::Instant>,
    last_render: Option<C::Instant>,
    last_elapsed: Duration,
}

impl<C: Clock> std::fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state)
            .field("since_check", &self.since_check)
            .field("running_timer", &self.run_started.is_some())
            .field("last_elapsed", &self.last_elapsed)
            .finish()
    }
}

impl<C: Clock> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Scheduler<C> {
    /// An idle scheduler.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RunState::Idle,
            since_check: 0,
            run_started: None,
            last_render: None,
            last_elapsed: Duration::ZERO,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Whether quanta should do work.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    /// Enter `Running`. Returns `false` if already running.
    pub fn start(&mut self, clock: &C) -> bool {
        if self.is_running() {
            return false;
        }
        self.state = RunState::Running;
        self.run_started = Some(clock.now());
        self.last_render = Some(clock.now());
        self.last_elapsed = Duration::ZERO;
        true
    }

    /// Enter `Idle`, returning the run's wall-clock time.
    pub fn finish(&mut self, clock: &C) -> Duration {
        if let Some(started) = self.run_started.take() {
            self.last_elapsed = clock.elapsed(&started);
        }
        self.last_render = None;
        self.state = RunState::Idle;
        self.last_elapsed
    }

    /// Wall-clock time of the current run, or of the last one when idle.
    #[must_use]
    pub fn elapsed(&self, clock: &C) -> Duration {
        self.run_started
            .as_ref()
            .map_or(self.last_elapsed, |started| clock.elapsed(started))
    }

    /// Count plotted points toward the next stability check.
    pub const fn record_plotted(&mut self, points: u64) {
        self.since_check = self.since_check.saturating_add(points);
    }

    /// Whether `interval` points have accumulated; if so the counter
    /// restarts from zero.
    pub const fn take_stability_due(&mut self, interval: u64) -> bool {
        if self.since_check >= interval {
            self.since_check = 0;
            true
        } else {
            false
        }
    }

    /// Points counted toward the next stability check.
    #[must_use]
    pub const fn since_check(&self) -> u64 {
        self.since_check
    }

    /// Whether `interval` has passed since the last render request; if
    /// so the render timer restarts.
    pub fn take_render_due(&mut self, clock: &C, interval: Duration) -> bool {
        let due = self
            .last_render
            .as_ref()
            .is_none_or(|last| clock.elapsed(last) >= interval);
        if due {
            self.last_render = Some(clock.now());
        }
        due
    }

    /// Start a fresh stability interval without touching run timing.
    pub const fn restart_interval(&mut self) {
        self.since_check = 0;
    }

    /// Forget cadence counters, e.g. after an erase.
    pub fn reset_counters(&mut self) {
        self.since_check = 0;
        self.last_elapsed = Duration::ZERO;
    }
}
