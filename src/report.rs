//! Plain-text rendering of an [`ExecutionResult`].

use std::fmt::Write;

use chrono::{DateTime, Local};

use crate::pipeline::ExecutionResult;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn time(at: DateTime<Local>) -> String {
    at.format(TIME_FORMAT).to_string()
}

fn status(success: bool) -> &'static str {
    if success { "ok" } else { "FAILED" }
}

/// Renders `result` as a human-readable report.
pub fn render(result: &ExecutionResult) -> String {
    let mut out = String::new();
    let arguments = if result.arguments.is_empty() {
        "*".to_string()
    } else {
        result.arguments.join(" ")
    };
    // Writing to a String cannot fail.
    let _ = writeln!(out, "{} {arguments}: {}", result.command, status(result.success()));
    let _ = writeln!(
        out,
        "  started {}, took {:.1}s",
        time(result.started),
        result.elapsed().as_secs_f64()
    );
    for (key, value) in &result.config {
        let _ = writeln!(out, "  {key} = {value}");
    }
    for action in &result.actions {
        let _ = writeln!(
            out,
            "\n[{}] {} in {:.1}s",
            action.name(),
            status(action.success()),
            action.elapsed().as_secs_f64()
        );
        for line in action.lines() {
            let _ = writeln!(out, "  {line}");
        }
    }
    out
}
