//! Declarative test case files: `test_*.json` with a name and an ordered
//! step list. The step set is a closed enum; unknown actions are rejected
//! at load time.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// One declarative unit of test behavior.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Wait {
        /// Milliseconds to block.
        #[serde(default = "default_wait_ms")]
        duration: u64,
    },
    PlayInput {
        /// Recording path, relative to the test directory.
        recording: String,
        #[serde(default = "default_speed")]
        speed: f64,
    },
    Screenshot {
        /// Name for the captured file; defaults to `step_<index>`.
        #[serde(default)]
        name: Option<String>,
    },
    Compare {
        /// Reference image, relative to the test directory.
        expected: String,
        /// Screenshot filename, or `latest` for the newest capture.
        #[serde(default = "default_actual")]
        actual: String,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
}

fn default_wait_ms() -> u64 {
    1000
}

fn default_speed() -> f64 {
    1.0
}

fn default_actual() -> String {
    "latest".to_string()
}

fn default_threshold() -> f64 {
    0.95
}

impl Step {
    /// Short human-readable description for progress logging.
    pub fn describe(&self) -> String {
        match self {
            Step::Wait { duration } => format!("wait {duration}ms"),
            Step::PlayInput { recording, speed } => {
                format!("play_input {recording} (speed {speed}x)")
            }
            Step::Screenshot { name } => match name {
                Some(name) => format!("screenshot {name}"),
                None => "screenshot".to_string(),
            },
            Step::Compare {
                expected,
                actual,
                threshold,
            } => format!("compare {expected} vs {actual} (threshold {threshold})"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TestCaseFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    steps: Vec<Step>,
}

/// A named, immutable list of steps loaded from one file.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub file: PathBuf,
    pub steps: Vec<Step>,
}

impl TestCase {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read test case {}", path.display()))?;
        let parsed: TestCaseFile = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse test case {}", path.display()))?;
        let name = parsed.name.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string())
        });
        Ok(Self {
            name,
            file: path.to_path_buf(),
            steps: parsed.steps,
        })
    }
}

/// Find all `test_*.json` files in a directory, sorted by name.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read test directory {}", dir.display()))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("test_") && n.ends_with(".json"))
        })
        .collect();
    files.sort();
    Ok(files)
}
