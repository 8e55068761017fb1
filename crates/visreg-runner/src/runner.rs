//! Sequential test execution: one process lifecycle around an ordered list
//! of test cases, each producing exactly one result.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result, bail};
use log::{debug, error, info, warn};
use visreg_compare::compare_images;
use visreg_input::{InputPlayer, KeyInjector, PlaybackOptions, Recording, WindowLocator};

use crate::process::{AppProcess, ProcessConfig};
use crate::report::{Report, TestResult};
use crate::testcase::{Step, TestCase, discover};

/// How long a `screenshot` step waits for the application under test to
/// produce a file. There is no ready-handshake with the application, so
/// this is a bounded poll, not a guarantee.
const SCREENSHOT_POLL: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Application-under-test binary.
    pub target: PathBuf,
    /// Directory holding `test_*.json` files, recordings, and references.
    pub tests_dir: PathBuf,
    /// Output directory for screenshots, diffs, and reports.
    pub output_dir: PathBuf,
    pub headless: bool,
    /// Window name the input player targets.
    pub window_name: String,
    pub settle: Duration,
    pub stop_timeout: Duration,
}

impl RunnerConfig {
    pub fn new(target: &Path, tests_dir: &Path, output_dir: &Path) -> Self {
        Self {
            target: target.to_path_buf(),
            tests_dir: tests_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            headless: false,
            window_name: String::new(),
            settle: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(5),
        }
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.output_dir.join("screenshots")
    }
}

/// Result of a whole run.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: Report,
    pub interrupted: bool,
}

enum StepVerdict {
    Passed,
    Failed(String),
}

/// Owns the process lifecycle and the result log for one run.
pub struct Runner<B> {
    config: RunnerConfig,
    player: InputPlayer<B>,
    results: Vec<TestResult>,
    stop: Arc<AtomicBool>,
}

impl<B: WindowLocator + KeyInjector> Runner<B> {
    /// `stop` is the shared interrupt flag; when it flips, the run winds
    /// down at the next step boundary but still stops the process and
    /// writes reports.
    pub fn new(config: RunnerConfig, backend: B, stop: Arc<AtomicBool>) -> Self {
        Self {
            config,
            player: InputPlayer::new(backend),
            results: Vec::new(),
            stop,
        }
    }

    /// Discover and execute every test case, with guaranteed process
    /// shutdown and a final report on completed cases.
    pub fn run_all(&mut self) -> Result<RunOutcome> {
        let files = discover(&self.config.tests_dir)?;
        if files.is_empty() {
            bail!("no test files found in {}", self.config.tests_dir.display());
        }
        info!("found {} test(s)", files.len());

        let screenshots_dir = self.config.screenshots_dir();
        fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!("failed to create {}", self.config.output_dir.display())
        })?;
        fs::create_dir_all(&screenshots_dir)
            .with_context(|| format!("failed to create {}", screenshots_dir.display()))?;

        let mut process_config = ProcessConfig::new(&self.config.target, &screenshots_dir);
        process_config.headless = self.config.headless;
        process_config.settle = self.config.settle;
        process_config.stop_timeout = self.config.stop_timeout;

        let mut app = AppProcess::start(&process_config)?;
        let executed = self.execute_cases(&files);
        // stop runs on every path, fatal execution errors included
        let stopped = app.stop();
        let interrupted = executed?;
        stopped?;

        let report = Report::build(std::mem::take(&mut self.results));
        let json_path = self.config.output_dir.join("test_report.json");
        let html_path = self.config.output_dir.join("test_report.html");
        report.write_json(&json_path)?;
        report.write_html(&html_path)?;
        info!("report saved to {}", json_path.display());
        info!("HTML report saved to {}", html_path.display());

        report.print_summary();
        if interrupted {
            warn!("run was interrupted");
        }
        Ok(RunOutcome {
            report,
            interrupted,
        })
    }

    fn execute_cases(&mut self, files: &[PathBuf]) -> Result<bool> {
        for file in files {
            if self.interrupted() {
                return Ok(true);
            }
            let case = TestCase::load(file)?;
            info!("running test: {}", case.name);
            let result = self.run_case(&case);
            info!(
                "test result: {}",
                if result.passed { "PASS" } else { "FAIL" }
            );
            self.results.push(result);
        }
        Ok(self.interrupted())
    }

    /// Execute one case. A failed step records an error and execution
    /// continues; an error from step execution aborts the remaining steps
    /// of this case only.
    fn run_case(&mut self, case: &TestCase) -> TestResult {
        let mut result = TestResult::new(&case.name, &case.file);
        for (index, step) in case.steps.iter().enumerate() {
            if self.interrupted() {
                result.passed = false;
                result.errors.push("run interrupted".to_string());
                break;
            }
            info!("  step {}: {}", index + 1, step.describe());
            match self.run_step(step, index) {
                Ok(StepVerdict::Passed) => {}
                Ok(StepVerdict::Failed(message)) => {
                    warn!("{message}");
                    result.passed = false;
                    result.errors.push(message);
                }
                Err(e) => {
                    let message = format!("step {} raised: {e:#}", index + 1);
                    error!("{message}");
                    result.passed = false;
                    result.errors.push(message);
                    break;
                }
            }
        }
        result.finish();
        result
    }

    fn run_step(&mut self, step: &Step, index: usize) -> Result<StepVerdict> {
        match step {
            Step::Wait { duration } => {
                wait_interruptible(Duration::from_millis(*duration), &self.stop);
                Ok(StepVerdict::Passed)
            }
            Step::PlayInput { recording, speed } => {
                let path = self.config.tests_dir.join(recording);
                let recording = Recording::load(&path)?;
                let options = PlaybackOptions {
                    speed: *speed,
                    window_name: self.config.window_name.clone(),
                };
                let summary = self.player.play(&recording, &options, &self.stop);
                debug!(
                    "    applied {} samples ({} presses, {} releases)",
                    summary.samples_applied, summary.presses, summary.releases
                );
                Ok(StepVerdict::Passed)
            }
            Step::Screenshot { name } => {
                let screenshots_dir = self.config.screenshots_dir();
                let Some(latest) =
                    wait_for_screenshot(&screenshots_dir, SCREENSHOT_POLL, &self.stop)
                else {
                    return Ok(StepVerdict::Failed(format!(
                        "no screenshot available for step {}",
                        index + 1
                    )));
                };
                let name = name.clone().unwrap_or_else(|| format!("step_{index}"));
                let dest = screenshots_dir.join(format!("{name}.png"));
                if latest != dest {
                    fs::copy(&latest, &dest).with_context(|| {
                        format!("failed to copy screenshot to {}", dest.display())
                    })?;
                }
                debug!("    screenshot saved as {}", dest.display());
                Ok(StepVerdict::Passed)
            }
            Step::Compare {
                expected,
                actual,
                threshold,
            } => {
                let expected_path = self.config.tests_dir.join(expected);
                if !expected_path.exists() {
                    return Ok(StepVerdict::Failed(format!(
                        "expected image not found: {}",
                        expected_path.display()
                    )));
                }
                let Some(actual_path) = self.resolve_actual(actual) else {
                    return Ok(StepVerdict::Failed(format!(
                        "screenshot '{actual}' not found in {}",
                        self.config.screenshots_dir().display()
                    )));
                };

                let stem = expected_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "compare".to_string());
                let diff_path = self.config.output_dir.join(format!("diff_{stem}.png"));

                let outcome =
                    compare_images(&expected_path, &actual_path, *threshold, Some(&diff_path))?;
                info!("    similarity {:.2}%", outcome.similarity * 100.0);
                if outcome.passed {
                    Ok(StepVerdict::Passed)
                } else {
                    Ok(StepVerdict::Failed(format!(
                        "comparison failed at step {}: similarity {:.2}% < {:.2}%",
                        index + 1,
                        outcome.similarity * 100.0,
                        threshold * 100.0
                    )))
                }
            }
        }
    }

    fn resolve_actual(&self, actual: &str) -> Option<PathBuf> {
        let dir = self.config.screenshots_dir();
        if actual == "latest" {
            latest_screenshot(&dir)
        } else {
            let path = dir.join(actual);
            path.exists().then_some(path)
        }
    }

    fn interrupted(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

/// Newest file in the screenshots directory, by mtime with the path as
/// tiebreak. The application under test writes this directory without any
/// synchronization; see DESIGN.md.
fn latest_screenshot(dir: &Path) -> Option<PathBuf> {
    let mut entries: Vec<(SystemTime, PathBuf)> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, entry.path()))
        })
        .collect();
    entries.sort();
    entries.pop().map(|(_, path)| path)
}

fn wait_for_screenshot(dir: &Path, timeout: Duration, stop: &AtomicBool) -> Option<PathBuf> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(path) = latest_screenshot(dir) {
            return Some(path);
        }
        if stop.load(Ordering::Relaxed) || Instant::now() >= deadline {
            return None;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Block for `total`, waking early when `stop` flips.
fn wait_interruptible(total: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
