//! `visreg` command line: image comparison, recording replay, and full
//! test-suite runs.
//!
//! Exit codes: 0 success/pass, 1 failure or error, 130 interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use visreg_input::{InputPlayer, LoggingBackend, PlaybackOptions, Recording};
use visreg_runner::{Runner, RunnerConfig};

const EXIT_FAILURE: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "visreg",
    about = "Visual-regression and input-replay test harness"
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compare two images against a similarity threshold
    Compare {
        /// Expected/reference image
        expected: PathBuf,
        /// Actual/test image
        actual: PathBuf,
        /// Similarity threshold (0-1)
        #[arg(long, default_value_t = 0.95)]
        threshold: f64,
        /// Output path for the diff composite
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Only print the result
        #[arg(short, long)]
        quiet: bool,
    },
    /// Replay an input recording (dry run: events are logged, real
    /// injection backends plug in via the visreg-input traits)
    Replay {
        /// Input recording file (CSV)
        recording: PathBuf,
        /// Playback speed multiplier
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        /// Window name to target
        #[arg(long, default_value = "")]
        window: String,
        /// Initial delay before playback, in seconds
        #[arg(long, default_value_t = 1.0)]
        delay: f64,
    },
    /// Run all test cases in a directory against a target binary
    Run {
        /// Application-under-test binary
        #[arg(long)]
        target: PathBuf,
        /// Directory containing test_*.json files
        #[arg(long, default_value = "tests")]
        tests: PathBuf,
        /// Output directory for screenshots and reports
        #[arg(long, default_value = "test_output")]
        output: PathBuf,
        /// Run the application under test in headless mode
        #[arg(long)]
        headless: bool,
        /// Window name to target for input playback
        #[arg(long, default_value = "")]
        window: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed)) {
            warn!("failed to install Ctrl-C handler: {e}");
        }
    }

    match dispatch(cli.command, &stop) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn dispatch(command: Command, stop: &Arc<AtomicBool>) -> Result<ExitCode> {
    match command {
        Command::Compare {
            expected,
            actual,
            threshold,
            output,
            quiet,
        } => {
            if !quiet {
                println!("Comparing images:");
                println!("  Expected:  {}", expected.display());
                println!("  Actual:    {}", actual.display());
                println!("  Threshold: {:.2}%", threshold * 100.0);
            }
            let result =
                visreg_compare::compare_images(&expected, &actual, threshold, output.as_deref())?;
            if let Some(output) = &output {
                println!("Comparison saved to: {}", output.display());
            }
            println!("Similarity: {:.2}%", result.similarity * 100.0);
            println!("Result: {}", if result.passed { "PASS" } else { "FAIL" });
            Ok(if result.passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_FAILURE)
            })
        }
        Command::Replay {
            recording,
            speed,
            window,
            delay,
        } => {
            let rec = Recording::load(&recording)?;
            info!(
                "playing {} ({} samples, speed {speed}x)",
                recording.display(),
                rec.len()
            );
            if delay > 0.0 {
                info!("starting playback in {delay} seconds");
                if sleep_interruptible(Duration::from_secs_f64(delay), stop) {
                    return Ok(ExitCode::from(EXIT_INTERRUPTED));
                }
            }
            let mut player = InputPlayer::new(LoggingBackend);
            let options = PlaybackOptions {
                speed,
                window_name: window,
            };
            let summary = player.play(&rec, &options, stop);
            info!(
                "playback complete: {} samples, {} presses, {} releases",
                summary.samples_applied, summary.presses, summary.releases
            );
            Ok(if summary.interrupted {
                ExitCode::from(EXIT_INTERRUPTED)
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::Run {
            target,
            tests,
            output,
            headless,
            window,
        } => {
            let mut config = RunnerConfig::new(&target, &tests, &output);
            config.headless = headless;
            config.window_name = window;
            let mut runner = Runner::new(config, LoggingBackend, Arc::clone(stop));
            let outcome = runner.run_all()?;
            Ok(if outcome.interrupted {
                ExitCode::from(EXIT_INTERRUPTED)
            } else if outcome.report.all_passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_FAILURE)
            })
        }
    }
}

/// Sleep, waking early on the stop flag. Returns `true` when interrupted.
fn sleep_interruptible(total: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::Relaxed) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(50)));
    }
}
