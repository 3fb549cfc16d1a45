//! Messages exchanged between a host and an engine running in another
//! execution context.
//!
//! Both directions are internally tagged JSON objects
//! (`{"type": "play"}`). Pixel data never travels inside the JSON: a
//! [`WorkerMessage::Frame`] is accompanied by the raw RGBA bytes as a
//! separate transferable buffer.

use serde::{Deserialize, Serialize};

use crate::diagnostics::RunDiagnostics;
use crate::engine::Reconfigured;
use crate::scheduler::EngineEvent;
use crate::types::{EngineError, Point, Settings};

/// Host to engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Create (or recreate) the engine.
    Initialize {
        /// Full settings.
        settings: Settings,
        /// Fixed seed; entropy when absent.
        #[serde(default)]
        seed: Option<u64>,
    },
    /// Apply changed settings.
    Reconfigure {
        /// Full settings, not a diff.
        settings: Settings,
    },
    /// Start a run.
    Play,
    /// Stop the run and send a final frame.
    Stop,
    /// Clear the canvas.
    Erase,
    /// Send the current frame.
    RenderSnapshot,
    /// Send run diagnostics.
    Diagnostics,
}

/// Engine to host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// The engine is initialized.
    Ready {
        /// Canvas width and height.
        canvas_size: u32,
        /// Every selectable vertex, for outline and vertex markers.
        vertices: Vec<Point>,
        /// How many leading vertices form the outline ring.
        ring_size: usize,
    },
    /// Settings were applied.
    Reconfigured {
        /// How much was recomputed.
        kind: Reconfigured,
        /// Vertices after the change.
        vertices: Vec<Point>,
        /// Ring size after the change.
        ring_size: usize,
    },
    /// A rendered frame; the pixels follow as raw RGBA bytes.
    Frame {
        /// Canvas width and height of the frame.
        size: u32,
    },
    /// A stability check ran.
    Stability {
        /// Smoothed new-pixel count.
        ema: f64,
        /// Percentage of filled pixels that were already filled.
        fill_ratio: f64,
    },
    /// Auto-stop converged.
    Finished {
        /// Run time in seconds.
        elapsed_time: f64,
    },
    /// The run was stopped on request.
    Stopped,
    /// Counters snapshot.
    Diagnostics {
        /// The counters.
        diagnostics: RunDiagnostics,
    },
    /// A command failed; engine state is unchanged.
    Error {
        /// What went wrong.
        error: EngineError,
    },
}

impl From<EngineEvent> for WorkerMessage {
    fn from(event: EngineEvent) -> Self {
        match event {
            EngineEvent::Stability(s) => Self::Stability {
                ema: s.ema,
                fill_ratio: s.fill_ratio,
            },
            EngineEvent::Finished(f) => Self::Finished {
                elapsed_time: f.elapsed.as_secs_f64(),
            },
        }
    }
}

impl From<EngineError> for WorkerMessage {
    fn from(error: EngineError) -> Self {
        Self::Error { error }
    }
}
