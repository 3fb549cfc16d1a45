//! Shared types for the polychaos simulation engine.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::duration_serde;
use crate::restriction::Restriction;

/// A 2D point in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Move a fraction `t` of the way from `self` toward `target`.
    #[must_use]
    pub fn lerp(self, target: Self, t: f64) -> Self {
        Self {
            x: (target.x - self.x).mul_add(t, self.x),
            y: (target.y - self.y).mul_add(t, self.y),
        }
    }

    /// The point halfway between `self` and `other`.
    #[must_use]
    pub fn midpoint(self, other: Self) -> Self {
        self.lerp(other, 0.5)
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// An opaque RGB color.
///
/// Serialized as a `#rrggbb` string so settings stay readable in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color {
    /// Pure black.
    pub const BLACK: Self = Self::new(0, 0, 0);
    /// Pure white.
    pub const WHITE: Self = Self::new(255, 255, 255);

    /// Create a color from its channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` or `#rgb` (the leading `#` is optional).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MalformedColor`] for anything else.
    pub fn parse(input: &str) -> Result<Self, EngineError> {
        let malformed = || EngineError::MalformedColor(input.to_string());
        let hex = input.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(malformed());
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| malformed());
        match hex.len() {
            6 => Ok(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => {
                // Short form: each digit is doubled (#abc == #aabbcc).
                let r = channel(&hex[0..1])?;
                let g = channel(&hex[1..2])?;
                let b = channel(&hex[2..3])?;
                Ok(Self::new(r * 17, g * 17, b * 17))
            }
            _ => Err(malformed()),
        }
    }

    /// Format as a lowercase `#rrggbb` string.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Color {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Color {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// User-facing simulation settings.
///
/// Changing a field through [`Engine::reconfigure`](crate::Engine::reconfigure)
/// triggers a geometry rebuild, a color-only re-normalization, or nothing
/// at all depending on which field changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Width and height of the square canvas in pixels.
    pub canvas_size: u32,

    /// Number of main polygon vertices. Must be at least 3.
    pub sides: u32,

    /// Fraction of the distance to the chosen vertex covered by each
    /// jump, in `[0, 1]`.
    pub jump_distance: f64,

    /// Gap between the polygon's circumcircle and the canvas edge, in
    /// pixels.
    pub padding: f64,

    /// Insert the midpoint of every polygon edge as an extra vertex.
    pub midpoint_vertex: bool,

    /// Append the polygon's center as an extra vertex.
    pub center_vertex: bool,

    /// Plot the full rotation/reflection orbit of every point.
    pub symmetrical: bool,

    /// Stop automatically once the image stops gaining new pixels.
    pub auto_stop: bool,

    /// Request render snapshots while running.
    pub live_rendering: bool,

    /// Blend over an opaque background instead of rendering with alpha.
    pub solid_bg: bool,

    /// Which vertices may be chosen next.
    pub restriction: Restriction,

    /// Exponent applied after log normalization. Larger values darken
    /// midtones.
    pub gamma_exponent: f64,

    /// Smoothed new-pixel count per check interval below which an
    /// interval counts as quiet.
    pub stability_new_pixels_threshold: f64,

    /// Color of fully saturated cells.
    pub foreground: Color,

    /// Color of untouched cells when `solid_bg` is set.
    pub background: Color,

    /// Host hint: stroke the polygon outline. No engine effect.
    pub show_outline: bool,

    /// Host hint: mark vertex positions. No engine effect.
    pub show_vertices: bool,
}

impl Settings {
    /// Default canvas size in pixels.
    pub const DEFAULT_CANVAS_SIZE: u32 = 800;
    /// Default number of polygon sides.
    pub const DEFAULT_SIDES: u32 = 3;
    /// Default jump fraction.
    pub const DEFAULT_JUMP_DISTANCE: f64 = 0.5;
    /// Default padding in pixels.
    pub const DEFAULT_PADDING: f64 = 20.0;
    /// Default gamma exponent.
    pub const DEFAULT_GAMMA_EXPONENT: f64 = 1.0;
    /// Default vertex selection rule.
    pub const DEFAULT_RESTRICTION: Restriction = Restriction::None;
    /// Default quiet threshold for the stability detector.
    pub const DEFAULT_STABILITY_THRESHOLD: f64 = 10.0;
    /// Largest accepted canvas size. Keeps `canvas_size^2` allocations sane.
    pub const MAX_CANVAS_SIZE: u32 = 8192;

    /// Center of the canvas.
    #[must_use]
    pub fn center(&self) -> Point {
        let half = f64::from(self.canvas_size) / 2.0;
        Point::new(half, half)
    }

    /// Circumradius of the polygon.
    #[must_use]
    pub fn radius(&self) -> f64 {
        f64::from(self.canvas_size) / 2.0 - self.padding
    }

    /// Check every field against its documented range.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.canvas_size == 0 || self.canvas_size > Self::MAX_CANVAS_SIZE {
            return Err(EngineError::InvalidConfig(format!(
                "canvas_size must be in 1..={}, got {}",
                Self::MAX_CANVAS_SIZE,
                self.canvas_size,
            )));
        }
        if self.sides < 3 {
            return Err(EngineError::InvalidConfig(format!(
                "sides must be at least 3, got {}",
                self.sides,
            )));
        }
        if !self.padding.is_finite() || self.padding < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "padding must be finite and non-negative, got {}",
                self.padding,
            )));
        }
        if self.radius() <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "padding {} leaves no room on a {}px canvas",
                self.padding, self.canvas_size,
            )));
        }
        if !(0.0..=1.0).contains(&self.jump_distance) {
            return Err(EngineError::InvalidConfig(format!(
                "jump_distance must be in [0, 1], got {}",
                self.jump_distance,
            )));
        }
        if !self.gamma_exponent.is_finite() || self.gamma_exponent <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "gamma_exponent must be positive, got {}",
                self.gamma_exponent,
            )));
        }
        if !self.stability_new_pixels_threshold.is_finite()
            || self.stability_new_pixels_threshold <= 0.0
        {
            return Err(EngineError::InvalidConfig(format!(
                "stability_new_pixels_threshold must be positive, got {}",
                self.stability_new_pixels_threshold,
            )));
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            canvas_size: Self::DEFAULT_CANVAS_SIZE,
            sides: Self::DEFAULT_SIDES,
            jump_distance: Self::DEFAULT_JUMP_DISTANCE,
            padding: Self::DEFAULT_PADDING,
            midpoint_vertex: false,
            center_vertex: false,
            symmetrical: false,
            auto_stop: true,
            live_rendering: true,
            solid_bg: true,
            restriction: Self::DEFAULT_RESTRICTION,
            gamma_exponent: Self::DEFAULT_GAMMA_EXPONENT,
            stability_new_pixels_threshold: Self::DEFAULT_STABILITY_THRESHOLD,
            foreground: Color::WHITE,
            background: Color::BLACK,
            show_outline: false,
            show_vertices: false,
        }
    }
}

/// Scheduler and detector constants.
///
/// These are not user settings; the defaults are the reference values
/// and only tests and the bench tool normally override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Walk steps per batch.
    pub batch_size: usize,

    /// Wall-clock budget of a single quantum.
    #[serde(with = "duration_serde")]
    pub time_budget: Duration,

    /// Minimum time between live render requests.
    #[serde(with = "duration_serde")]
    pub render_interval: Duration,

    /// Plotted points between stability checks.
    pub stability_interval: u64,

    /// Discarded steps after every geometry (re)build.
    pub burn_in_steps: usize,

    /// EMA smoothing factor in `(0, 1]`.
    pub ema_alpha: f64,

    /// Consecutive quiet intervals required for convergence.
    pub quiet_window: u32,

    /// Number of past vertex choices remembered by the walker.
    pub history_capacity: usize,
}

impl Tuning {
    /// Reference batch size.
    pub const DEFAULT_BATCH_SIZE: usize = 10_000;
    /// Reference quantum budget.
    pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_millis(50);
    /// Reference live render interval.
    pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(100);
    /// Reference stability check interval in plotted points.
    pub const DEFAULT_STABILITY_INTERVAL: u64 = 1_000_000;
    /// Reference burn-in length.
    pub const DEFAULT_BURN_IN_STEPS: usize = 300;
    /// Reference EMA factor.
    pub const DEFAULT_EMA_ALPHA: f64 = 0.2;
    /// Reference quiet window.
    pub const DEFAULT_QUIET_WINDOW: u32 = 10;
    /// Reference history capacity.
    pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

    /// Check every field against its documented range.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.batch_size == 0 {
            return Err(EngineError::InvalidConfig(
                "batch_size must be positive".to_string(),
            ));
        }
        if self.stability_interval == 0 {
            return Err(EngineError::InvalidConfig(
                "stability_interval must be positive".to_string(),
            ));
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "ema_alpha must be in (0, 1], got {}",
                self.ema_alpha,
            )));
        }
        if self.quiet_window == 0 {
            return Err(EngineError::InvalidConfig(
                "quiet_window must be positive".to_string(),
            ));
        }
        // Two entries are needed for the no-return and double-repeat rules.
        if self.history_capacity < 2 {
            return Err(EngineError::InvalidConfig(format!(
                "history_capacity must be at least 2, got {}",
                self.history_capacity,
            )));
        }
        Ok(())
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            batch_size: Self::DEFAULT_BATCH_SIZE,
            time_budget: Self::DEFAULT_TIME_BUDGET,
            render_interval: Self::DEFAULT_RENDER_INTERVAL,
            stability_interval: Self::DEFAULT_STABILITY_INTERVAL,
            burn_in_steps: Self::DEFAULT_BURN_IN_STEPS,
            ema_alpha: Self::DEFAULT_EMA_ALPHA,
            quiet_window: Self::DEFAULT_QUIET_WINDOW,
            history_capacity: Self::DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Errors surfaced by the engine.
///
/// None of these are fatal: a rejected configuration leaves the
/// previous engine state untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum EngineError {
    /// A settings or tuning value is out of range.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// A color string could not be parsed.
    #[error("malformed color {0:?}, expected #rrggbb or #rgb")]
    MalformedColor(String),

    /// A host message could not be decoded.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A command arrived before the engine was initialized.
    #[error("engine has not been initialized")]
    NotInitialized,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Point tests ---

    #[test]
    fn point_lerp_halfway() {
        let p = Point::new(0.0, 0.0).lerp(Point::new(10.0, -4.0), 0.5);
        assert!((p.x - 5.0).abs() < f64::EPSILON);
        assert!((p.y + 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn point_lerp_endpoints() {
        let a = Point::new(1.0, 2.0);
        let b = Point::new(7.0, 11.0);
        assert_eq!(a.lerp(b, 0.0), a);
        assert!(a.lerp(b, 1.0).distance(b) < 1e-12);
    }

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
    }

    // --- Color tests ---

    #[test]
    fn color_parses_long_form() {
        assert_eq!(Color::parse("#ff8000").unwrap(), Color::new(255, 128, 0));
        assert_eq!(Color::parse("0A0b0C").unwrap(), Color::new(10, 11, 12));
    }

    #[test]
    fn color_parses_short_form() {
        assert_eq!(Color::parse("#fff").unwrap(), Color::WHITE);
        assert_eq!(Color::parse("#a1c").unwrap(), Color::new(0xaa, 0x11, 0xcc));
    }

    #[test]
    fn color_rejects_malformed() {
        for bad in ["", "#", "#12345", "#1234567", "#gg0000", "red", "#ff 000"] {
            assert!(
                matches!(Color::parse(bad), Err(EngineError::MalformedColor(_))),
                "expected {bad:?} to be rejected",
            );
        }
    }

    #[test]
    fn color_hex_round_trip() {
        let c = Color::new(1, 2, 254);
        assert_eq!(c.to_hex(), "#0102fe");
        assert_eq!(c.to_string().parse::<Color>().unwrap(), c);
    }

    #[test]
    fn color_serializes_as_string() {
        let json = serde_json::to_string(&Color::new(255, 0, 16)).unwrap();
        assert_eq!(json, "\"#ff0010\"");
        let err = serde_json::from_str::<Color>("\"#zzzzzz\"");
        assert!(err.is_err());
    }

    // --- Settings tests ---

    #[test]
    fn settings_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.sides, 3);
        assert_eq!(settings.restriction, Restriction::None);
        assert!((settings.radius() - 380.0).abs() < f64::EPSILON);
    }

    #[test]
    fn settings_reject_too_few_sides() {
        let settings = Settings {
            sides: 2,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(EngineError::InvalidConfig(ref msg)) if msg.contains("sides"),
        ));
    }

    #[test]
    fn settings_reject_non_positive_radius() {
        let settings = Settings {
            canvas_size: 100,
            padding: 50.0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn settings_reject_bad_gamma() {
        for gamma in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let settings = Settings {
                gamma_exponent: gamma,
                ..Settings::default()
            };
            assert!(settings.validate().is_err(), "gamma {gamma} accepted");
        }
    }

    #[test]
    fn settings_reject_jump_out_of_range() {
        for jump in [-0.1, 1.5, f64::NAN] {
            let settings = Settings {
                jump_distance: jump,
                ..Settings::default()
            };
            assert!(settings.validate().is_err(), "jump {jump} accepted");
        }
    }

    #[test]
    fn settings_reject_zero_threshold() {
        let settings = Settings {
            stability_new_pixels_threshold: 0.0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn settings_serde_round_trip() {
        let settings = Settings {
            sides: 5,
            restriction: Restriction::NoNeighborAfterRepeat,
            foreground: Color::new(200, 100, 50),
            symmetrical: true,
            ..Settings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"no-neighbor-after-repeat\""));
        assert!(json.contains("\"#c86432\""));
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, back);
    }

    #[test]
    fn settings_partial_json_fills_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"sides": 6}"#).unwrap();
        assert_eq!(settings.sides, 6);
        assert_eq!(settings.canvas_size, Settings::DEFAULT_CANVAS_SIZE);
    }

    #[test]
    fn settings_reject_malformed_color_json() {
        let result = serde_json::from_str::<Settings>(r##"{"foreground": "#12"}"##);
        assert!(result.is_err());
    }

    // --- Tuning tests ---

    #[test]
    fn tuning_defaults_match_reference_values() {
        let tuning = Tuning::default();
        assert_eq!(tuning.batch_size, 10_000);
        assert_eq!(tuning.time_budget, Duration::from_millis(50));
        assert_eq!(tuning.render_interval, Duration::from_millis(100));
        assert_eq!(tuning.stability_interval, 1_000_000);
        assert_eq!(tuning.burn_in_steps, 300);
        assert!((tuning.ema_alpha - 0.2).abs() < f64::EPSILON);
        assert_eq!(tuning.quiet_window, 10);
        assert_eq!(tuning.history_capacity, 10);
        assert!(tuning.validate().is_ok());
    }

    #[test]
    fn tuning_rejects_short_history() {
        let tuning = Tuning {
            history_capacity: 1,
            ..Tuning::default()
        };
        assert!(tuning.validate().is_err());
    }

    #[test]
    fn tuning_serde_round_trip() {
        let tuning = Tuning {
            time_budget: Duration::from_millis(250),
            ..Tuning::default()
        };
        let json = serde_json::to_string(&tuning).unwrap();
        let back: Tuning = serde_json::from_str(&json).unwrap();
        assert_eq!(tuning, back);
    }

    // --- EngineError tests ---

    #[test]
    fn error_display() {
        let err = EngineError::InvalidConfig("sides must be at least 3, got 2".to_string());
        assert_eq!(
            err.to_string(),
            "invalid engine configuration: sides must be at least 3, got 2",
        );
        assert_eq!(
            EngineError::MalformedColor("#12".to_string()).to_string(),
            "malformed color \"#12\", expected #rrggbb or #rgb",
        );
        assert_eq!(
            EngineError::MalformedMessage("missing type".to_string()).to_string(),
            "malformed message: missing type",
        );
    }

    #[test]
    fn error_serde_round_trip() {
        let err = EngineError::MalformedColor("nope".to_string());
        let json = serde_json::to_string(&err).unwrap();
        let back: EngineError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
