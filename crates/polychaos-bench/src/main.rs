//! polychaos-bench: CLI tool for running the chaos-game engine headless.
//!
//! Runs the simulation with configurable settings and prints run
//! diagnostics. Useful for:
//!
//! - Comparing restriction rules and vertex layouts
//! - Measuring how long auto-stop takes to converge
//! - Rendering a PNG without a browser
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin polychaos-bench -- [OPTIONS]
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use polychaos_engine::{
    Color, Engine, PixelBuffer, Restriction, RunDiagnostics, Settings, Tuning,
};

/// Headless chaos-game runs and diagnostics for polychaos.
///
/// Either takes a fixed number of steps (`--steps`) or plays the engine
/// through its cooperative scheduler until auto-stop converges.
#[derive(Parser)]
#[command(name = "polychaos-bench", version)]
struct Cli {
    /// Canvas width and height in pixels.
    #[arg(long, default_value_t = Settings::DEFAULT_CANVAS_SIZE)]
    canvas_size: u32,

    /// Number of polygon sides.
    #[arg(long, default_value_t = Settings::DEFAULT_SIDES)]
    sides: u32,

    /// Fraction of the distance to the chosen vertex covered per jump.
    #[arg(long, default_value_t = Settings::DEFAULT_JUMP_DISTANCE)]
    jump_distance: f64,

    /// Gap between the polygon and the canvas edge, in pixels.
    #[arg(long, default_value_t = Settings::DEFAULT_PADDING)]
    padding: f64,

    /// Add edge midpoints as vertices.
    #[arg(long)]
    midpoint_vertex: bool,

    /// Add the polygon center as a vertex.
    #[arg(long)]
    center_vertex: bool,

    /// Plot every point's full rotation/reflection orbit.
    #[arg(long)]
    symmetrical: bool,

    /// Vertex selection rule.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_RULE)]
    restriction: Rule,

    /// Gamma exponent applied after log normalization.
    #[arg(long, default_value_t = Settings::DEFAULT_GAMMA_EXPONENT)]
    gamma: f64,

    /// Smoothed new-pixel count below which an interval is quiet.
    #[arg(long, default_value_t = Settings::DEFAULT_STABILITY_THRESHOLD)]
    stability_threshold: f64,

    /// Foreground color (#rrggbb or #rgb).
    #[arg(long, default_value_t = Color::WHITE)]
    foreground: Color,

    /// Background color (#rrggbb or #rgb).
    #[arg(long, default_value_t = Color::BLACK)]
    background: Color,

    /// Render with alpha instead of over an opaque background.
    #[arg(long)]
    transparent: bool,

    /// Take exactly this many steps instead of playing until auto-stop.
    #[arg(long)]
    steps: Option<usize>,

    /// Give up on auto-stop after this many quanta.
    #[arg(long, default_value_t = 10_000)]
    max_quanta: u32,

    /// Random seed of the first run; later runs use consecutive seeds.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Write the final frame of the first run to a PNG file.
    #[arg(long)]
    png: Option<PathBuf>,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full settings as a JSON string.
    ///
    /// When provided, all other settings flags are ignored. Missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Scheduler and detector constants as a JSON string.
    ///
    /// Missing fields take their reference values.
    #[arg(long)]
    tuning_json: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Vertex selection rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Rule {
    /// Any vertex may follow any vertex.
    None,
    /// No vertex twice in a row.
    NoRepeat,
    /// No vertex three times in a row.
    NoDoubleRepeat,
    /// Not the vertex chosen two steps ago.
    NoReturn,
    /// Not a ring neighbor of the previous vertex.
    NoNeighbor,
    /// Not a ring neighbor after a repeated vertex.
    NoNeighborAfterRepeat,
}

/// Maps a [`Restriction`] to the local CLI [`Rule`] enum.
const fn rule_from_engine(r: Restriction) -> Rule {
    match r {
        Restriction::None => Rule::None,
        Restriction::NoRepeat => Rule::NoRepeat,
        Restriction::NoDoubleRepeat => Rule::NoDoubleRepeat,
        Restriction::NoReturn => Rule::NoReturn,
        Restriction::NoNeighbor => Rule::NoNeighbor,
        Restriction::NoNeighborAfterRepeat => Rule::NoNeighborAfterRepeat,
    }
}

/// The CLI default rule, derived from the engine default so the two
/// cannot silently diverge.
const CLI_DEFAULT_RULE: Rule = rule_from_engine(Settings::DEFAULT_RESTRICTION);

impl From<Rule> for Restriction {
    fn from(rule: Rule) -> Self {
        match rule {
            Rule::None => Self::None,
            Rule::NoRepeat => Self::NoRepeat,
            Rule::NoDoubleRepeat => Self::NoDoubleRepeat,
            Rule::NoReturn => Self::NoReturn,
            Rule::NoNeighbor => Self::NoNeighbor,
            Rule::NoNeighborAfterRepeat => Self::NoNeighborAfterRepeat,
        }
    }
}

/// Build [`Settings`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual settings flags are ignored.
fn settings_from_cli(cli: &Cli) -> Result<Settings, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(Settings {
        canvas_size: cli.canvas_size,
        sides: cli.sides,
        jump_distance: cli.jump_distance,
        padding: cli.padding,
        midpoint_vertex: cli.midpoint_vertex,
        center_vertex: cli.center_vertex,
        symmetrical: cli.symmetrical,
        restriction: cli.restriction.into(),
        gamma_exponent: cli.gamma,
        stability_new_pixels_threshold: cli.stability_threshold,
        foreground: cli.foreground,
        background: cli.background,
        solid_bg: !cli.transparent,
        auto_stop: cli.steps.is_none(),
        live_rendering: false,
        ..Settings::default()
    })
}

/// Build [`Tuning`] from `--tuning-json`, or the reference values.
fn tuning_from_cli(cli: &Cli) -> Result<Tuning, String> {
    cli.tuning_json.as_ref().map_or_else(
        || Ok(Tuning::default()),
        |json| serde_json::from_str(json).map_err(|e| format!("Error parsing --tuning-json: {e}")),
    )
}

/// Outcome of one run.
struct RunResult {
    diagnostics: RunDiagnostics,
    converged: bool,
    frame: PixelBuffer,
}

/// Run the engine once, either for a fixed step count or through the
/// scheduler until it stops.
fn run_once(
    cli: &Cli,
    settings: &Settings,
    tuning: &Tuning,
    seed: u64,
) -> Result<RunResult, String> {
    let mut engine = Engine::with_tuning(settings.clone(), tuning.clone(), seed)
        .map_err(|e| format!("Engine error: {e}"))?;

    let converged = if let Some(steps) = cli.steps {
        engine.advance(steps);
        false
    } else {
        engine.play();
        let budget = engine.tuning().time_budget;
        let mut converged = false;
        for _ in 0..cli.max_quanta {
            let quantum = engine.run_quantum(budget);
            if !quantum.should_continue() {
                converged = true;
                break;
            }
        }
        if !converged {
            log::warn!("gave up after {} quanta without converging", cli.max_quanta);
        }
        converged
    };

    let frame = engine.stop().clone();
    Ok(RunResult {
        diagnostics: engine.diagnostics(),
        converged,
        frame,
    })
}

/// Write a frame as an RGBA PNG.
fn write_png(path: &Path, frame: &PixelBuffer) -> Result<(), String> {
    let image = image::RgbaImage::from_raw(frame.size(), frame.size(), frame.to_rgba_bytes())
        .ok_or_else(|| "frame buffer does not match its size".to_string())?;
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| format!("Error writing PNG to {}: {e}", path.display()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = match settings_from_cli(&cli) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let tuning = match tuning_from_cli(&cli) {
        Ok(t) => t,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!("Settings: {settings:#?}");
    eprintln!("Tuning: {tuning:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let seed = cli.seed.wrapping_add(run as u64);
        let result = match run_once(&cli, &settings, &tuning, seed) {
            Ok(result) => result,
            Err(msg) => {
                eprintln!("{msg}");
                return ExitCode::FAILURE;
            }
        };

        if cli.json {
            match serde_json::to_string_pretty(&result.diagnostics) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            println!("{}", result.diagnostics.report());
            if cli.steps.is_none() {
                println!(
                    "Converged: {}",
                    if result.converged { "yes" } else { "no" },
                );
            }
        }

        // Write PNG on the first run only.
        if run == 0
            && let Some(ref png_path) = cli.png
        {
            match write_png(png_path, &result.frame) {
                Ok(()) => eprintln!("PNG written to {}", png_path.display()),
                Err(msg) => eprintln!("{msg}"),
            }
        }

        all_diagnostics.push(result.diagnostics);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[RunDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.elapsed.as_secs_f64() * 1000.0)
        .collect();
    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;
    println!("Elapsed: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    let runs = all_diagnostics.len() as f64;
    let mean_of = |f: fn(&RunDiagnostics) -> f64| all_diagnostics.iter().map(f).sum::<f64>() / runs;
    println!(
        "Iterations: mean={:.0}",
        mean_of(|d| d.iterations as f64),
    );
    println!(
        "Coverage: mean={:.2}%",
        mean_of(RunDiagnostics::coverage_percent),
    );
    println!("Max hit count: mean={:.1}", mean_of(|d| f64::from(d.max_value)));
}

/// `log` backend writing to stderr.
struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Install the stderr logger at a level chosen by `-v` count.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("polychaos-bench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_engine_defaults() {
        let settings = settings_from_cli(&parse(&[])).unwrap();
        let defaults = Settings::default();
        assert_eq!(settings.canvas_size, defaults.canvas_size);
        assert_eq!(settings.sides, defaults.sides);
        assert_eq!(settings.restriction, defaults.restriction);
        assert_eq!(settings.foreground, defaults.foreground);
        assert!(settings.solid_bg);
        assert!(settings.auto_stop);
    }

    #[test]
    fn cli_default_rule_matches_engine() {
        assert_eq!(
            Restriction::from(CLI_DEFAULT_RULE),
            Settings::default().restriction,
        );
    }

    #[test]
    fn flags_map_to_settings() {
        let cli = parse(&[
            "--sides",
            "5",
            "--restriction",
            "no-neighbor-after-repeat",
            "--foreground",
            "#f00",
            "--transparent",
            "--steps",
            "1000",
        ]);
        let settings = settings_from_cli(&cli).unwrap();
        assert_eq!(settings.sides, 5);
        assert_eq!(settings.restriction, Restriction::NoNeighborAfterRepeat);
        assert_eq!(settings.foreground, Color::new(255, 0, 0));
        assert!(!settings.solid_bg);
        assert!(!settings.auto_stop);
    }

    #[test]
    fn malformed_color_is_rejected() {
        let args = ["polychaos-bench", "--background", "blue"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = parse(&["--sides", "9", "--config-json", r#"{"sides": 4}"#]);
        assert_eq!(settings_from_cli(&cli).unwrap().sides, 4);
    }

    #[test]
    fn tuning_json_fills_defaults() {
        let cli = parse(&["--tuning-json", r#"{"batch_size": 500}"#]);
        let tuning = tuning_from_cli(&cli).unwrap();
        assert_eq!(tuning.batch_size, 500);
        assert_eq!(tuning.quiet_window, Tuning::DEFAULT_QUIET_WINDOW);
    }

    #[test]
    fn scheduled_run_converges_on_small_canvas() {
        let cli = parse(&["--canvas-size", "24", "--padding", "1", "--sides", "4"]);
        let settings = settings_from_cli(&cli).unwrap();
        let tuning = Tuning {
            stability_interval: 2_000,
            ..Tuning::default()
        };
        let result = run_once(&cli, &settings, &tuning, 5).unwrap();
        assert!(result.converged);
        assert_eq!(result.diagnostics.quiet_intervals, Tuning::DEFAULT_QUIET_WINDOW);
    }

    #[test]
    fn fixed_step_run_reports_iterations() {
        let cli = parse(&["--canvas-size", "40", "--padding", "1", "--steps", "2000"]);
        let settings = settings_from_cli(&cli).unwrap();
        let result = run_once(&cli, &settings, &Tuning::default(), 3).unwrap();
        assert_eq!(result.diagnostics.iterations, 2000);
        assert!(!result.converged);
        assert_eq!(result.frame.size(), 40);
    }
}
