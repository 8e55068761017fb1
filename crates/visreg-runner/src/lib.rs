//! Test orchestration: drives the application under test through declared
//! test cases, delegating input playback to `visreg-input` and screenshot
//! scoring to `visreg-compare`, and aggregates results into a report.

pub mod process;
pub mod report;
pub mod runner;
pub mod testcase;

pub use process::{AppProcess, HEADLESS_ENV, ProcessConfig, ProcessState, SCREENSHOTS_DIR_ENV};
pub use report::{Report, TestResult};
pub use runner::{RunOutcome, Runner, RunnerConfig};
pub use testcase::{Step, TestCase, discover};
