//! polychaos-engine: Chaos-game fractal simulation engine (sans-IO).
//!
//! Repeatedly picks a polygon vertex under a selection rule, moves a
//! point part of the way toward it, and counts where the point lands:
//!
//! geometry -> restriction table -> walk -> density -> color
//!
//! This crate has **no I/O dependencies**. It never sleeps, spawns, or
//! touches a canvas; hosts drive it with [`Engine::run_quantum`] and
//! copy pixels out of the returned [`PixelBuffer`]. The browser worker
//! lives in `polychaos-worker` and the headless CLI in
//! `polychaos-bench`.

pub mod color;
pub mod density;
pub mod diagnostics;
pub mod engine;
pub mod geometry;
pub mod protocol;
pub mod restriction;
pub mod scheduler;
pub mod stability;
pub mod types;
pub mod walk;

pub use color::{ColorMap, PixelBuffer};
pub use diagnostics::{Clock, RunDiagnostics, WebClock};
pub use engine::{Engine, Reconfigured};
pub use geometry::Geometry;
pub use protocol::{HostMessage, WorkerMessage};
pub use restriction::{Restriction, RestrictionTable};
pub use scheduler::{EngineEvent, Quantum, QuantumStatus, RunState};
pub use types::{Color, EngineError, Point, Settings, Tuning};

/// Run `steps` walk steps with a fixed seed and render the result.
///
/// No scheduler, time budget, or stability detection is involved, so
/// the output depends only on the arguments.
///
/// # Errors
///
/// Returns [`EngineError::InvalidConfig`] if `settings` is invalid.
pub fn simulate(settings: &Settings, seed: u64, steps: usize) -> Result<PixelBuffer, EngineError> {
    let mut engine = Engine::with_seed(settings.clone(), seed)?;
    engine.advance(steps);
    Ok(engine.render_snapshot().clone())
}
