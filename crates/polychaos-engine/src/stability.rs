//! Convergence detection from the rate of newly lit pixels.

/// Result of one stability check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityCheck {
    /// Smoothed new-pixel count after this check.
    pub ema: f64,
    /// Percentage of filled pixels that were already filled before this
    /// interval.
    pub fill_ratio: f64,
    /// New pixels reported for this interval.
    pub new_pixels: u64,
    /// Consecutive quiet intervals, this one included.
    pub quiet_intervals: u32,
    /// Whether the quiet window has been reached.
    pub converged: bool,
}

/// Exponential moving average of new pixels per interval, with a quiet
/// window.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityDetector {
    threshold: f64,
    alpha: f64,
    window: u32,
    ema: f64,
    quiet_intervals: u32,
    filled_pixels: u64,
    checks: u64,
}

impl StabilityDetector {
    /// Create a detector.
    ///
    /// `threshold` is the EMA below which an interval is quiet, `alpha`
    /// the smoothing factor, and `window` the number of consecutive
    /// quiet intervals that signal convergence.
    #[must_use]
    pub const fn new(threshold: f64, alpha: f64, window: u32) -> Self {
        Self {
            threshold,
            alpha,
            window,
            ema: 0.0,
            quiet_intervals: 0,
            filled_pixels: 0,
            checks: 0,
        }
    }

    /// Fold in the new-pixel count of one interval.
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&mut self, new_pixels: u64) -> StabilityCheck {
        let new = new_pixels as f64;
        self.ema = self.alpha.mul_add(new, (1.0 - self.alpha) * self.ema);
        self.filled_pixels += new_pixels;
        self.checks += 1;

        let fill_ratio = if self.filled_pixels == 0 {
            0.0
        } else {
            (1.0 - new / self.filled_pixels as f64).max(0.0) * 100.0
        };

        if self.ema < self.threshold {
            self.quiet_intervals += 1;
        } else {
            self.quiet_intervals = 0;
        }

        let check = StabilityCheck {
            ema: self.ema,
            fill_ratio,
            new_pixels,
            quiet_intervals: self.quiet_intervals,
            converged: self.quiet_intervals >= self.window,
        };
        log::trace!(
            "stability check #{}: new={new_pixels} ema={:.2} fill={fill_ratio:.2}% quiet={}/{}",
            self.checks,
            self.ema,
            self.quiet_intervals,
            self.window,
        );
        check
    }

    /// Change the quiet threshold without touching accumulated state.
    pub const fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    /// Quiet threshold.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Current smoothed new-pixel count.
    #[must_use]
    pub const fn ema(&self) -> f64 {
        self.ema
    }

    /// Current run of quiet intervals.
    #[must_use]
    pub const fn quiet_intervals(&self) -> u32 {
        self.quiet_intervals
    }

    /// Cumulative new pixels reported so far.
    #[must_use]
    pub const fn filled_pixels(&self) -> u64 {
        self.filled_pixels
    }

    /// Checks performed so far.
    #[must_use]
    pub const fn checks(&self) -> u64 {
        self.checks
    }

    /// Forget all accumulated state, keeping the parameters.
    pub const fn reset(&mut self) {
        self.ema = 0.0;
        self.quiet_intervals = 0;
        self.filled_pixels = 0;
        self.checks = 0;
    }
}
