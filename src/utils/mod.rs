//! Shared helpers: errors, logging, metrics and the diagnostic chart

pub mod charts;
pub mod error;
pub mod logging;
pub mod metrics;

use std::time::Duration;

// Re-export main types for convenience
pub use error::{MamonetError, Result};
pub use logging::init_logging;
pub use metrics::MetricAccumulator;

/// Compact wall-clock rendering: `850ms`, `42.3s`, `3m 07s`, `2h 05m`
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    match secs {
        0 => format!("{}ms", elapsed.as_millis()),
        1..=59 => format!("{:.1}s", elapsed.as_secs_f64()),
        60..=3599 => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60),
    }
}

/// Digits grouped by thousands, e.g. `1,234,567`
pub fn format_number(n: usize) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;

    let mut groups: Vec<&str> = Vec::new();
    if head > 0 {
        groups.push(&digits[..head]);
    }
    groups.extend(
        digits.as_bytes()[head..]
            .chunks(3)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok()),
    );
    groups.join(",")
}
