//! Run results and report generation (JSON + HTML mirror).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;

/// Outcome of one test case. Append-only once created; never mutated after
/// the case finishes.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: String,
    pub file: String,
    pub passed: bool,
    pub errors: Vec<String>,
    pub timestamp: String,
}

impl TestResult {
    pub fn new(name: &str, file: &Path) -> Self {
        Self {
            name: name.to_string(),
            file: file.display().to_string(),
            passed: true,
            errors: Vec::new(),
            timestamp: String::new(),
        }
    }

    /// Record the completion timestamp.
    pub fn finish(&mut self) {
        self.timestamp = Local::now().to_rfc3339();
    }
}

/// Aggregated run report, serialized as-is to JSON.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub timestamp: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<TestResult>,
}

impl Report {
    pub fn build(results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        let failed = results.len() - passed;
        Self {
            timestamp: Local::now().to_rfc3339(),
            total: results.len(),
            passed,
            failed,
            results,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("failed to write JSON report {}", path.display()))
    }

    pub fn write_html(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_html())
            .with_context(|| format!("failed to write HTML report {}", path.display()))
    }

    /// Print the final counts. Called on every exit path, interruption
    /// included.
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("TEST SUMMARY");
        println!("{}", "=".repeat(60));
        println!("Total:  {}", self.total);
        println!("Passed: {}", self.passed);
        println!("Failed: {}", self.failed);
        println!("{}", "=".repeat(60));
    }

    fn to_html(&self) -> String {
        let mut html = format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <title>visreg Test Report</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        h1 {{ color: #333; }}
        .summary {{ background: #f0f0f0; padding: 15px; border-radius: 5px; margin: 20px 0; }}
        .passed {{ color: green; font-weight: bold; }}
        .failed {{ color: red; font-weight: bold; }}
        .test {{ border: 1px solid #ddd; padding: 10px; margin: 10px 0; border-radius: 5px; }}
        .test.pass {{ border-left: 5px solid green; }}
        .test.fail {{ border-left: 5px solid red; }}
        .errors {{ color: red; margin: 10px 0; }}
    </style>
</head>
<body>
    <h1>visreg Test Report</h1>
    <div class="summary">
        <h2>Summary</h2>
        <p>Total: {total}</p>
        <p class="passed">Passed: {passed}</p>
        <p class="failed">Failed: {failed}</p>
        <p>Timestamp: {timestamp}</p>
    </div>
    <h2>Test Results</h2>
"#,
            total = self.total,
            passed = self.passed,
            failed = self.failed,
            timestamp = escape(&self.timestamp),
        );

        for result in &self.results {
            let class = if result.passed { "pass" } else { "fail" };
            let verdict = if result.passed { "PASS" } else { "FAIL" };
            html.push_str(&format!(
                r#"
    <div class="test {class}">
        <h3>{name} - <span class="{class}">{verdict}</span></h3>
        <p><strong>File:</strong> {file}</p>
        <p><strong>Time:</strong> {time}</p>
"#,
                name = escape(&result.name),
                file = escape(&result.file),
                time = escape(&result.timestamp),
            ));
            if !result.errors.is_empty() {
                html.push_str("        <div class=\"errors\"><strong>Errors:</strong><ul>");
                for error in &result.errors {
                    html.push_str(&format!("<li>{}</li>", escape(error)));
                }
                html.push_str("</ul></div>\n");
            }
            html.push_str("    </div>\n");
        }

        html.push_str("</body>\n</html>\n");
        html
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_results() -> Vec<TestResult> {
        let mut ok = TestResult::new("boot", Path::new("tests/test_boot.json"));
        ok.finish();
        let mut bad = TestResult::new("menu", Path::new("tests/test_menu.json"));
        bad.passed = false;
        bad.errors
            .push("comparison failed at step 2: similarity 80.00% < 95.00%".to_string());
        bad.finish();
        vec![ok, bad]
    }

    #[test]
    fn report_counts() {
        let report = Report::build(sample_results());
        assert_eq!(report.total, 2);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 1);
        assert!(!report.all_passed());
    }

    #[test]
    fn json_report_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_report.json");
        Report::build(sample_results()).write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["total"], 2);
        assert_eq!(value["passed"], 1);
        assert_eq!(value["failed"], 1);
        assert_eq!(value["results"][0]["name"], "boot");
        assert_eq!(value["results"][1]["passed"], false);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn html_report_mirrors_results() {
        let report = Report::build(sample_results());
        let html = report.to_html();
        assert!(html.contains("Total: 2"));
        assert!(html.contains("boot"));
        assert!(html.contains("FAIL"));
        assert!(html.contains("similarity 80.00% &lt; 95.00%"));
    }

    #[test]
    fn html_escapes_markup_in_errors() {
        let mut result = TestResult::new("<evil>", Path::new("x"));
        result.passed = false;
        result.errors.push("a < b & c".to_string());
        result.finish();
        let html = Report::build(vec![result]).to_html();
        assert!(html.contains("&lt;evil&gt;"));
        assert!(html.contains("a &lt; b &amp; c"));
        assert!(!html.contains("<evil>"));
    }
}
