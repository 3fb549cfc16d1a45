//! The simulation engine: one explicit state struct driven by commands
//! and resumable quanta.
//!
//! All state (geometry, walker, density, pixels, stability, scheduler,
//! random source) is owned by a single [`Engine`]. The host calls
//! [`Engine::run_quantum`] repeatedly while it returns
//! [`QuantumStatus::Continue`], yielding to its event loop in between.

use std::time::Duration;

use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::color::{ColorMap, PixelBuffer};
use crate::density::DensityMatrix;
use crate::diagnostics::{Clock, RunDiagnostics, WebClock};
use crate::geometry::Geometry;
use crate::restriction::RestrictionTable;
use crate::scheduler::{
    EngineEvent, FinishedEvent, Quantum, QuantumStatus, RunState, Scheduler, StabilityEvent,
};
use crate::stability::StabilityDetector;
use crate::types::{EngineError, Point, Settings, Tuning};
use crate::walk::{WalkRules, Walker};

/// How much work a settings change required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reconfigured {
    /// Geometry, restriction table and walker were rebuilt, the density
    /// erased, and burn-in rerun.
    GeometryRebuilt,
    /// Existing density was re-normalized with new colors.
    ColorOnly,
    /// Nothing was recomputed.
    CosmeticOnly,
}

impl Reconfigured {
    /// Classify the change from `old` to `new` by the most expensive
    /// field that differs.
    #[must_use]
    pub fn classify(old: &Settings, new: &Settings) -> Self {
        #[allow(clippy::float_cmp)]
        let geometry_changed = old.canvas_size != new.canvas_size
            || old.sides != new.sides
            || old.padding != new.padding
            || old.midpoint_vertex != new.midpoint_vertex
            || old.center_vertex != new.center_vertex
            || old.restriction != new.restriction
            || old.jump_distance != new.jump_distance
            || old.symmetrical != new.symmetrical;
        if geometry_changed {
            return Self::GeometryRebuilt;
        }
        #[allow(clippy::float_cmp)]
        let color_changed = old.foreground != new.foreground
            || old.background != new.background
            || old.solid_bg != new.solid_bg
            || old.gamma_exponent != new.gamma_exponent;
        if color_changed {
            Self::ColorOnly
        } else {
            Self::CosmeticOnly
        }
    }
}

/// A chaos-game simulation.
#[derive(Debug)]
pub struct Engine<C: Clock = WebClock> {
    settings: Settings,
    tuning: Tuning,
    colors: ColorMap,
    geometry: Geometry,
    table: RestrictionTable,
    walker: Walker,
    density: DensityMatrix,
    pixels: PixelBuffer,
    stability: StabilityDetector,
    scheduler: Scheduler<C>,
    iterations: u64,
    rng: Pcg32,
    clock: C,
}

impl Engine<WebClock> {
    /// Create an engine seeded from system entropy.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if `settings` is invalid.
    pub fn new(settings: Settings) -> Result<Self, EngineError> {
        Self::with_parts(settings, Tuning::default(), Pcg32::from_entropy(), WebClock)
    }

    /// Create an engine with a fixed seed, for reproducible runs.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if `settings` is invalid.
    pub fn with_seed(settings: Settings, seed: u64) -> Result<Self, EngineError> {
        Self::with_tuning(settings, Tuning::default(), seed)
    }

    /// Create an engine with custom tuning and a fixed seed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if `settings` or `tuning`
    /// is invalid.
    pub fn with_tuning(settings: Settings, tuning: Tuning, seed: u64) -> Result<Self, EngineError> {
        Self::with_parts(settings, tuning, Pcg32::seed_from_u64(seed), WebClock)
    }
}

impl<C: Clock> Engine<C> {
    /// Create an engine from explicit parts.
    ///
    /// The returned engine is initialized: geometry built, burn-in done,
    /// density all zero, and the pixel buffer filled with the background.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if `settings` or `tuning`
    /// is invalid.
    pub fn with_parts(
        settings: Settings,
        tuning: Tuning,
        mut rng: Pcg32,
        clock: C,
    ) -> Result<Self, EngineError> {
        settings.validate()?;
        tuning.validate()?;
        let geometry = Geometry::build(&settings)?;
        let table = RestrictionTable::build(&geometry, settings.restriction);
        let walker = spawn_walker(&geometry, &table, &settings, &tuning, &mut rng);
        let colors = ColorMap::from_settings(&settings);
        let density = DensityMatrix::new(settings.canvas_size);
        let mut pixels = PixelBuffer::new(settings.canvas_size);
        colors.apply(&density, &mut pixels);
        let stability = StabilityDetector::new(
            settings.stability_new_pixels_threshold,
            tuning.ema_alpha,
            tuning.quiet_window,
        );
        log::debug!(
            "engine ready: {}px canvas, {} vertices (ring {}), rule {}",
            settings.canvas_size,
            geometry.len(),
            geometry.ring_size(),
            settings.restriction,
        );
        Ok(Self {
            settings,
            tuning,
            colors,
            geometry,
            table,
            walker,
            density,
            pixels,
            stability,
            scheduler: Scheduler::new(),
            iterations: 0,
            rng,
            clock,
        })
    }

    /// Replace every setting and start over from an empty canvas.
    ///
    /// Any run in progress is stopped.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] and keeps the current
    /// state if `settings` is invalid.
    pub fn initialize(&mut self, settings: Settings) -> Result<(), EngineError> {
        let geometry = Self::checked_geometry(&settings)?;
        self.scheduler.finish(&self.clock);
        self.settings = settings;
        self.install_geometry(geometry);
        Ok(())
    }

    /// Apply new settings, doing only as much work as the change needs.
    ///
    /// A run in progress keeps running; after a geometry rebuild it
    /// continues on the fresh, erased canvas.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] and keeps the current
    /// state if `settings` is invalid.
    pub fn reconfigure(&mut self, settings: Settings) -> Result<Reconfigured, EngineError> {
        let kind = Reconfigured::classify(&self.settings, &settings);
        let geometry = match kind {
            Reconfigured::GeometryRebuilt => Some(Self::checked_geometry(&settings)?),
            Reconfigured::ColorOnly | Reconfigured::CosmeticOnly => {
                Self::checked_settings(&settings)?;
                None
            }
        };
        self.stability
            .set_threshold(settings.stability_new_pixels_threshold);
        let auto_stop_enabled = settings.auto_stop && !self.settings.auto_stop;
        self.settings = settings;
        if auto_stop_enabled {
            self.restart_stability_interval();
        }
        match geometry {
            Some(geometry) => self.install_geometry(geometry),
            None if kind == Reconfigured::ColorOnly => {
                self.colors = ColorMap::from_settings(&self.settings);
                self.colors.apply(&self.density, &mut self.pixels);
            }
            None => {}
        }
        log::debug!("reconfigure: {kind:?}");
        Ok(kind)
    }

    /// Start a run. Returns `false` if one is already in progress.
    pub fn play(&mut self) -> bool {
        let started = self.scheduler.start(&self.clock);
        if started {
            self.restart_stability_interval();
            log::debug!("run started at {} iterations", self.iterations);
        }
        started
    }

    /// End the run (if any) and render a final snapshot.
    pub fn stop(&mut self) -> &PixelBuffer {
        if self.scheduler.is_running() {
            let elapsed = self.scheduler.finish(&self.clock);
            log::debug!(
                "run stopped after {:.3}s, {} iterations",
                elapsed.as_secs_f64(),
                self.iterations,
            );
        }
        self.render_snapshot()
    }

    /// Clear density, pixels and stability state. Geometry, walker
    /// position and run state are kept.
    pub fn erase(&mut self) {
        self.density.clear();
        self.stability.reset();
        self.scheduler.reset_counters();
        self.iterations = 0;
        self.colors.apply(&self.density, &mut self.pixels);
    }

    /// Run batches until the time budget is spent, the run converges,
    /// or the engine is idle.
    ///
    /// At least one batch runs per call while running, so a zero budget
    /// still makes progress.
    pub fn run_quantum(&mut self, budget: Duration) -> Quantum {
        if !self.scheduler.is_running() {
            return Quantum::idle();
        }
        let started = self.clock.now();
        let mut quantum = Quantum {
            status: QuantumStatus::Continue,
            render_requested: false,
            batches: 0,
            events: Vec::new(),
        };

        loop {
            let plotted = self.run_steps(self.tuning.batch_size);
            quantum.batches += 1;

            if self.settings.auto_stop {
                self.scheduler.record_plotted(plotted);
                if self
                    .scheduler
                    .take_stability_due(self.tuning.stability_interval)
                {
                    let check = self.stability.record(self.density.take_new_pixels());
                    quantum.events.push(EngineEvent::Stability(StabilityEvent {
                        ema: check.ema,
                        fill_ratio: check.fill_ratio,
                    }));
                    if check.converged {
                        let elapsed = self.scheduler.finish(&self.clock);
                        log::info!(
                            "converged after {} iterations in {:.3}s ({} checks)",
                            self.iterations,
                            elapsed.as_secs_f64(),
                            self.stability.checks(),
                        );
                        quantum
                            .events
                            .push(EngineEvent::Finished(FinishedEvent { elapsed }));
                        quantum.render_requested = true;
                        quantum.status = QuantumStatus::Done;
                        return quantum;
                    }
                }
            }

            if self.clock.elapsed(&started) >= budget {
                break;
            }
        }

        if self.settings.live_rendering
            && self
                .scheduler
                .take_render_due(&self.clock, self.tuning.render_interval)
        {
            quantum.render_requested = true;
        }
        quantum
    }

    /// Recompute the pixel buffer from the current density.
    pub fn render_snapshot(&mut self) -> &PixelBuffer {
        self.colors.apply(&self.density, &mut self.pixels);
        &self.pixels
    }

    /// Take `steps` walk steps immediately, outside the scheduler.
    ///
    /// Pixels filled here never count toward a stability interval.
    pub fn advance(&mut self, steps: usize) {
        self.run_steps(steps);
        self.density.take_new_pixels();
    }

    /// Take one walk step and return the new point.
    pub fn step(&mut self) -> Point {
        let point = self.walker.step(
            &WalkRules {
                geometry: &self.geometry,
                table: &self.table,
                restriction: self.settings.restriction,
                jump_distance: self.settings.jump_distance,
            },
            &mut self.rng,
        );
        self.density
            .accumulate(point, &self.geometry, self.settings.symmetrical);
        self.iterations += 1;
        point
    }

    /// Current settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Scheduler and detector constants.
    #[must_use]
    pub const fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// Current polygon geometry.
    #[must_use]
    pub const fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Legal successors per vertex under the current rule.
    #[must_use]
    pub const fn restriction_table(&self) -> &RestrictionTable {
        &self.table
    }

    /// Walker position and history.
    #[must_use]
    pub const fn walker(&self) -> &Walker {
        &self.walker
    }

    /// Hit counts.
    #[must_use]
    pub const fn density(&self) -> &DensityMatrix {
        &self.density
    }

    /// The most recently rendered pixels.
    #[must_use]
    pub const fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    /// Convergence state.
    #[must_use]
    pub const fn stability(&self) -> &StabilityDetector {
        &self.stability
    }

    /// Whether a run is in progress.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.scheduler.state()
    }

    /// Walk steps taken since the last erase.
    #[must_use]
    pub const fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Snapshot of every counter.
    #[must_use]
    pub fn diagnostics(&self) -> RunDiagnostics {
        RunDiagnostics {
            canvas_size: self.settings.canvas_size,
            vertex_count: self.geometry.len(),
            ring_size: self.geometry.ring_size(),
            restriction: self.settings.restriction.to_string(),
            iterations: self.iterations,
            plotted_points: self.density.plotted(),
            discarded_points: self.density.discarded(),
            max_value: self.density.max_value(),
            filled_pixels: self.density.filled_pixels(),
            ema: self.stability.ema(),
            quiet_intervals: self.stability.quiet_intervals(),
            stability_checks: self.stability.checks(),
            elapsed: self.scheduler.elapsed(&self.clock),
        }
    }

    /// Run `steps` steps and return how many points were plotted.
    fn run_steps(&mut self, steps: usize) -> u64 {
        let before = self.density.plotted();
        for _ in 0..steps {
            self.step();
        }
        self.density.plotted() - before
    }

    /// Begin a stability interval that only counts pixels from now on.
    fn restart_stability_interval(&mut self) {
        self.density.take_new_pixels();
        self.scheduler.restart_interval();
    }

    /// Validate settings, logging rejections.
    fn checked_settings(settings: &Settings) -> Result<(), EngineError> {
        settings.validate().inspect_err(|err| {
            log::warn!("rejected settings: {err}");
        })
    }

    /// Validate settings and build their geometry without touching state.
    fn checked_geometry(settings: &Settings) -> Result<Geometry, EngineError> {
        Self::checked_settings(settings)?;
        Geometry::build(settings).inspect_err(|err| {
            log::warn!("rejected geometry: {err}");
        })
    }

    /// Swap in a new geometry, rebuild everything derived from it, and
    /// erase.
    fn install_geometry(&mut self, geometry: Geometry) {
        self.table = RestrictionTable::build(&geometry, self.settings.restriction);
        self.walker = spawn_walker(
            &geometry,
            &self.table,
            &self.settings,
            &self.tuning,
            &mut self.rng,
        );
        self.geometry = geometry;
        if self.density.size() != self.settings.canvas_size {
            self.density = DensityMatrix::new(self.settings.canvas_size);
            self.pixels = PixelBuffer::new(self.settings.canvas_size);
        }
        self.colors = ColorMap::from_settings(&self.settings);
        self.stability
            .set_threshold(self.settings.stability_new_pixels_threshold);
        log::debug!(
            "geometry rebuilt: {} vertices (ring {}), rule {}",
            self.geometry.len(),
            self.geometry.ring_size(),
            self.settings.restriction,
        );
        self.erase();
    }
}

/// Place a walker inside the polygon and run burn-in.
fn spawn_walker(
    geometry: &Geometry,
    table: &RestrictionTable,
    settings: &Settings,
    tuning: &Tuning,
    rng: &mut Pcg32,
) -> Walker {
    let rules = WalkRules {
        geometry,
        table,
        restriction: settings.restriction,
        jump_distance: settings.jump_distance,
    };
    Walker::spawn(&rules, tuning.history_capacity, tuning.burn_in_steps, rng)
}
