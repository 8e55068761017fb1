//! Input recording parser.
//!
//! Line-oriented text: `timestamp_ms,button_bitmask` per line, both decimal.
//! Lines starting with `#` and blank lines are skipped; malformed lines are
//! skipped with a warning rather than failing the whole recording.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::warn;

/// One timestamped button-state sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub timestamp_ms: u64,
    pub buttons: u32,
}

/// An ordered sequence of samples, read once and never mutated.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    pub samples: Vec<Sample>,
}

impl Recording {
    /// Load a recording from disk. An unreadable file is an error; bad
    /// lines inside a readable file are not.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read recording {}", path.display()))?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut samples = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line) {
                Some(sample) => samples.push(sample),
                None => warn!("skipping invalid recording line {}: {line:?}", lineno + 1),
            }
        }
        Self { samples }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

fn parse_line(line: &str) -> Option<Sample> {
    let (ts, mask) = line.split_once(',')?;
    let timestamp_ms = ts.trim().parse().ok()?;
    let buttons = mask.trim().parse().ok()?;
    Some(Sample {
        timestamp_ms,
        buttons,
    })
}
