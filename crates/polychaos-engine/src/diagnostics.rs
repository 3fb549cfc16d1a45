//! Run diagnostics: counters and timing for a simulation run.
//!
//! Diagnostics are cheap to collect and are intended for parameter
//! experimentation (see the `polychaos-bench` tool) and for hosts that
//! want to display progress.
//!
//! Wall-clock time is read through the [`Clock`] trait. [`WebClock`] is
//! backed by the `web-time` crate, which uses `performance.now()` on WASM
//! and `std::time::Instant` on native. Tests inject their own clock.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde support for `std::time::Duration` as fractional seconds.
pub(crate) mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of wall-clock time for budgets and elapsed-time reporting.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by `web_time::Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebClock;

impl Clock for WebClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> Duration {
        since.elapsed()
    }
}

/// Snapshot of an engine's counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Canvas width and height in pixels.
    pub canvas_size: u32,
    /// Total vertices, including midpoints and the center.
    pub vertex_count: usize,
    /// Vertices participating in neighbor semantics.
    pub ring_size: usize,
    /// Active restriction rule name.
    pub restriction: String,
    /// Walk steps taken since the last erase.
    pub iterations: u64,
    /// Points written into the density matrix (symmetry orbit included).
    pub plotted_points: u64,
    /// Points that rounded outside the canvas and were dropped.
    pub discarded_points: u64,
    /// Largest hit count in the density matrix.
    pub max_value: u32,
    /// Number of cells with at least one hit.
    pub filled_pixels: u64,
    /// Smoothed new-pixel count from the last stability check.
    pub ema: f64,
    /// Consecutive quiet stability checks.
    pub quiet_intervals: u32,
    /// Stability checks performed since the last erase.
    pub stability_checks: u64,
    /// Wall-clock time since the current (or last) run started.
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
}

impl RunDiagnostics {
    /// Fraction of the canvas covered, in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coverage_percent(&self) -> f64 {
        let total = u64::from(self.canvas_size) * u64::from(self.canvas_size);
        if total == 0 {
            0.0
        } else {
            self.filled_pixels as f64 / total as f64 * 100.0
        }
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Run Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Canvas: {0}x{0}  |  Vertices: {1} (ring {2})  |  Rule: {3}",
            self.canvas_size, self.vertex_count, self.ring_size, self.restriction,
        ));
        lines.push(format!("Elapsed: {:.3}ms", duration_ms(self.elapsed)));
        lines.push(String::new());
        lines.push(format!("{:<24} {:>16}", "Counter", "Value"));
        lines.push("-".repeat(42));

        let rows = [
            ("Iterations", self.iterations.to_string()),
            ("Plotted points", self.plotted_points.to_string()),
            ("Discarded points", self.discarded_points.to_string()),
            ("Max hit count", self.max_value.to_string()),
            (
                "Filled pixels",
                format!("{} ({:.1}%)", self.filled_pixels, self.coverage_percent()),
            ),
            ("New-pixel EMA", format!("{:.2}", self.ema)),
            ("Quiet intervals", self.quiet_intervals.to_string()),
            ("Stability checks", self.stability_checks.to_string()),
        ];
        for (name, value) in rows {
            lines.push(format!("{name:<24} {value:>16}"));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
