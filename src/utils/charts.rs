//! SVG line chart generator for training diagnostics
//!
//! Renders loss/accuracy curves over epoch index as a standalone SVG file.
//! Styling follows the grey-panel, white-grid look of the ggplot theme.

use std::fs;
use std::path::Path;

use crate::utils::error::{MamonetError, Result};

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 600.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 70.0;
const MARGIN_LEFT: f64 = 80.0;
const GRID_LINES: usize = 5;

const COLOR_PANEL: &str = "#ebebeb";
const COLOR_GRID: &str = "#ffffff";
const COLOR_TEXT: &str = "#4d4d4d";

/// Series palette (ggplot default cycle)
pub const PALETTE: [&str; 4] = ["#e24a33", "#348abd", "#988ed5", "#777777"];

/// A data point for a line chart
#[derive(Debug, Clone, Copy)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
}

/// A named data series
#[derive(Debug, Clone)]
pub struct DataSeries {
    pub name: String,
    pub points: Vec<DataPoint>,
    pub color: String,
}

impl DataSeries {
    /// Series whose x values are the indices of `values`
    pub fn from_values(name: &str, values: &[f64], color: &str) -> Self {
        Self {
            name: name.to_string(),
            points: values
                .iter()
                .enumerate()
                .map(|(i, &y)| DataPoint { x: i as f64, y })
                .collect(),
            color: color.to_string(),
        }
    }
}

/// Render a line chart to an SVG string
pub fn render_line_chart(title: &str, x_label: &str, y_label: &str, series: &[DataSeries]) -> String {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let (x_min, x_max, y_min, y_max) = find_ranges(series);
    // loss and accuracy are both non-negative; keep 0 and 1 in view
    let y_min = y_min.min(0.0);
    let y_max = y_max.max(1.0);
    let x_span = if x_max > x_min { x_max - x_min } else { 1.0 };
    let y_span = y_max - y_min;

    let to_x = |x: f64| MARGIN_LEFT + ((x - x_min) / x_span) * plot_width;
    let to_y = |y: f64| MARGIN_TOP + plot_height - ((y - y_min) / y_span) * plot_height;

    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        CHART_WIDTH, CHART_HEIGHT, CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}"/>"#,
        MARGIN_LEFT, MARGIN_TOP, plot_width, plot_height, COLOR_PANEL
    ));

    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" fill="{}">{}</text>"#,
        CHART_WIDTH / 2.0,
        COLOR_TEXT,
        escape_xml(title)
    ));

    // Horizontal grid + y ticks
    for i in 0..=GRID_LINES {
        let value = y_min + (i as f64 / GRID_LINES as f64) * y_span;
        let y = to_y(value);

        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT,
            y,
            MARGIN_LEFT + plot_width,
            y,
            COLOR_GRID
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{:.2}</text>"#,
            MARGIN_LEFT - 8.0,
            y + 4.0,
            COLOR_TEXT,
            value
        ));
    }

    // Vertical grid + x ticks, taken from the first series
    if let Some(first) = series.first() {
        let stride = (first.points.len() / 10).max(1);
        for point in first.points.iter().step_by(stride) {
            let x = to_x(point.x);
            svg.push_str(&format!(
                r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
                x,
                MARGIN_TOP,
                x,
                MARGIN_TOP + plot_height,
                COLOR_GRID
            ));
            svg.push_str(&format!(
                r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="12" fill="{}">{:.0}</text>"#,
                x,
                MARGIN_TOP + plot_height + 20.0,
                COLOR_TEXT,
                point.x
            ));
        }
    }

    // Axis labels
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0,
        CHART_HEIGHT - 20.0,
        COLOR_TEXT,
        escape_xml(x_label)
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {})">{}</text>"#,
        CHART_HEIGHT / 2.0,
        COLOR_TEXT,
        CHART_HEIGHT / 2.0,
        escape_xml(y_label)
    ));

    for series_data in series {
        if series_data.points.is_empty() {
            continue;
        }

        let path = series_data
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let cmd = if i == 0 { "M" } else { "L" };
                format!("{} {:.2} {:.2}", cmd, to_x(p.x), to_y(p.y))
            })
            .collect::<Vec<_>>()
            .join(" ");

        svg.push_str(&format!(
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="2"/>"#,
            path, series_data.color
        ));

        for point in &series_data.points {
            svg.push_str(&format!(
                r#"<circle cx="{:.2}" cy="{:.2}" r="3" fill="{}" data-series="{}"/>"#,
                to_x(point.x),
                to_y(point.y),
                series_data.color,
                escape_xml(&series_data.name)
            ));
        }
    }

    // Legend, upper left of the panel
    let legend_x = MARGIN_LEFT + 12.0;
    let mut legend_y = MARGIN_TOP + 12.0;
    svg.push_str(&format!(
        r#"<rect x="{}" y="{}" width="130" height="{}" fill="white" fill-opacity="0.8" stroke="{}"/>"#,
        legend_x - 6.0,
        legend_y - 6.0,
        series.len() as f64 * 22.0 + 6.0,
        COLOR_PANEL
    ));
    for series_data in series {
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="3"/>"#,
            legend_x,
            legend_y + 7.0,
            legend_x + 20.0,
            legend_y + 7.0,
            series_data.color
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            legend_x + 28.0,
            legend_y + 11.0,
            COLOR_TEXT,
            escape_xml(&series_data.name)
        ));
        legend_y += 22.0;
    }

    svg.push_str("</svg>");
    svg
}

/// Render and write a line chart; write failures are persistence errors
pub fn generate_line_chart(
    title: &str,
    x_label: &str,
    y_label: &str,
    series: &[DataSeries],
    output_path: &Path,
) -> Result<()> {
    let svg = render_line_chart(title, x_label, y_label, series);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| MamonetError::persist(output_path, e))?;
    }
    fs::write(output_path, svg).map_err(|e| MamonetError::persist(output_path, e))
}

fn find_ranges(series: &[DataSeries]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;

    for s in series {
        for p in &s.points {
            x_min = x_min.min(p.x);
            x_max = x_max.max(p.x);
            y_min = y_min.min(p.y);
            y_max = y_max.max(p.y);
        }
    }

    if !x_min.is_finite() {
        return (0.0, 1.0, 0.0, 1.0);
    }

    (x_min, x_max, y_min, y_max)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> Vec<DataSeries> {
        vec![
            DataSeries::from_values("train_loss", &[0.9, 0.5], PALETTE[0]),
            DataSeries::from_values("val_acc", &[0.4, 0.7], PALETTE[1]),
        ]
    }

    #[test]
    fn test_render_contains_legend_and_points() {
        let svg = render_line_chart("Training Loss and Accuracy", "Epoch #", "Loss/Accuracy", &series());
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains(">train_loss</text>"));
        assert!(svg.contains(">Epoch #</text>"));
        assert_eq!(svg.matches(r#"data-series="val_acc""#).count(), 2);
    }

    #[test]
    fn test_single_point_series_renders() {
        let single = vec![DataSeries::from_values("loss", &[0.3], PALETTE[0])];
        let svg = render_line_chart("t", "x", "y", &single);
        assert!(!svg.contains("NaN"));
        assert_eq!(svg.matches(r#"data-series="loss""#).count(), 1);
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b & c>"), "a&lt;b &amp; c&gt;");
    }

    #[test]
    fn test_line_chart_generation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("plot.svg");
        generate_line_chart("Test Chart", "X Axis", "Y Axis", &series(), &path).unwrap();
        assert!(path.exists());
    }
}
