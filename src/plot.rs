//! Rendering of aggregated PUT/GET latencies as an error-bar chart.
//!
//! Node counts are placed at evenly spaced positions along the x axis and labelled with their
//! value, since cluster sizes usually grow geometrically (1, 2, 4, 8, ...).
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::{BenchError, Result};
use crate::stats::Statistics;

/// Something that can persist a PUT/GET latency chart.
pub trait PlotRenderer {
    /// renders `put` and `get` into the file at `output`
    ///
    /// # Errors
    /// returns [`BenchError::EmptyDataset`] without creating `output` if either mapping is empty
    fn render(&self, put: &Statistics, get: &Statistics, output: &Path) -> Result<()>;
}

/// checks that both series have something to draw
pub fn ensure_plottable(put: &Statistics, get: &Statistics) -> Result<()> {
    if put.is_empty() {
        return Err(BenchError::EmptyDataset("the PUT log holds no samples".into()));
    }
    if get.is_empty() {
        return Err(BenchError::EmptyDataset("the GET log holds no samples".into()));
    }
    Ok(())
}

/// Writes the chart as a standalone SVG document.
#[derive(Debug, Clone)]
pub struct SvgPlotRenderer {
    /// canvas width in pixels
    pub width: f64,
    /// canvas height in pixels
    pub height: f64,
    /// chart title
    pub title: String,
}

impl Default for SvgPlotRenderer {
    fn default() -> Self {
        SvgPlotRenderer {
            width: 720.0,
            height: 480.0,
            title: "Average time for PUT and GET requests".to_string(),
        }
    }
}

const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 60.0;
const CAP_HALF_WIDTH: f64 = 6.0;
const Y_TICKS: usize = 5;

struct Series<'a> {
    label: &'a str,
    color: &'a str,
    stats: &'a Statistics,
}

impl SvgPlotRenderer {
    /// builds the SVG document text
    pub fn to_svg(&self, put: &Statistics, get: &Statistics) -> Result<String> {
        ensure_plottable(put, get)?;

        let node_counts: Vec<u32> = put
            .keys()
            .chain(get.keys())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let y_max = put
            .values()
            .chain(get.values())
            .map(|s| s.average + s.stddev)
            .fold(0.0_f64, f64::max);
        let y_max = if y_max > 0.0 { y_max * 1.1 } else { 1.0 };

        let plot_w = self.width - MARGIN_LEFT - MARGIN_RIGHT;
        let plot_h = self.height - MARGIN_TOP - MARGIN_BOTTOM;
        let x_of = |node_count: u32| -> f64 {
            let idx = node_counts.iter().position(|&n| n == node_count).unwrap_or(0);
            let step = plot_w / node_counts.len() as f64;
            MARGIN_LEFT + step * (idx as f64 + 0.5)
        };
        let y_of = |ms: f64| -> f64 { MARGIN_TOP + plot_h - (ms.max(0.0) / y_max) * plot_h };

        let mut svg = String::new();
        let bottom = MARGIN_TOP + plot_h;
        writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif" font-size="12">"#,
            w = self.width,
            h = self.height
        )?;
        writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
        writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle" font-size="16">{}</text>"#,
            self.width / 2.0,
            MARGIN_TOP / 2.0,
            escape(&self.title)
        )?;

        // grid and y ticks
        for i in 0..=Y_TICKS {
            let value = y_max * i as f64 / Y_TICKS as f64;
            let y = y_of(value);
            writeln!(
                svg,
                r##"<line x1="{l}" y1="{y:.2}" x2="{r}" y2="{y:.2}" stroke="#dddddd"/>"##,
                l = MARGIN_LEFT,
                r = MARGIN_LEFT + plot_w,
                y = y
            )?;
            writeln!(
                svg,
                r#"<text x="{}" y="{:.2}" text-anchor="end" dominant-baseline="middle">{:.2}</text>"#,
                MARGIN_LEFT - 8.0,
                y,
                value
            )?;
        }

        // x ticks
        for &n in &node_counts {
            let x = x_of(n);
            writeln!(
                svg,
                r##"<line x1="{x:.2}" y1="{t}" x2="{x:.2}" y2="{b}" stroke="#dddddd"/>"##,
                x = x,
                t = MARGIN_TOP,
                b = bottom
            )?;
            writeln!(
                svg,
                r#"<text x="{:.2}" y="{}" text-anchor="middle">{}</text>"#,
                x,
                bottom + 18.0,
                n
            )?;
        }

        // axes
        writeln!(
            svg,
            r#"<line x1="{l}" y1="{b}" x2="{r}" y2="{b}" stroke="black"/><line x1="{l}" y1="{t}" x2="{l}" y2="{b}" stroke="black"/>"#,
            l = MARGIN_LEFT,
            r = MARGIN_LEFT + plot_w,
            t = MARGIN_TOP,
            b = bottom
        )?;
        writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle">Number of nodes</text>"#,
            MARGIN_LEFT + plot_w / 2.0,
            self.height - 15.0
        )?;
        writeln!(
            svg,
            r#"<text x="20" y="{y}" text-anchor="middle" transform="rotate(-90 20 {y})">Average time (ms)</text>"#,
            y = MARGIN_TOP + plot_h / 2.0
        )?;

        let series = [
            Series {
                label: "PUT",
                color: "orange",
                stats: put,
            },
            Series {
                label: "GET",
                color: "blue",
                stats: get,
            },
        ];
        for (i, s) in series.iter().enumerate() {
            let points: Vec<String> = s
                .stats
                .values()
                .map(|stat| format!("{:.2},{:.2}", x_of(stat.node_count), y_of(stat.average)))
                .collect();
            writeln!(
                svg,
                r#"<g class="series" data-label="{label}" stroke="{c}" fill="{c}">"#,
                label = s.label,
                c = s.color
            )?;
            writeln!(
                svg,
                r#"<polyline points="{}" fill="none" stroke-width="2"/>"#,
                points.join(" ")
            )?;
            for stat in s.stats.values() {
                let x = x_of(stat.node_count);
                let y_lo = y_of(stat.average - stat.stddev);
                let y_hi = y_of(stat.average + stat.stddev);
                writeln!(
                    svg,
                    r#"<line x1="{x:.2}" y1="{lo:.2}" x2="{x:.2}" y2="{hi:.2}"/><line x1="{a:.2}" y1="{lo:.2}" x2="{b:.2}" y2="{lo:.2}"/><line x1="{a:.2}" y1="{hi:.2}" x2="{b:.2}" y2="{hi:.2}"/>"#,
                    x = x,
                    lo = y_lo,
                    hi = y_hi,
                    a = x - CAP_HALF_WIDTH,
                    b = x + CAP_HALF_WIDTH
                )?;
                writeln!(
                    svg,
                    r#"<circle cx="{:.2}" cy="{:.2}" r="4"/>"#,
                    x,
                    y_of(stat.average)
                )?;
            }
            writeln!(svg, "</g>")?;

            // legend
            let ly = MARGIN_TOP + 10.0 + 18.0 * i as f64;
            let lx = MARGIN_LEFT + plot_w - 70.0;
            writeln!(
                svg,
                r#"<line x1="{a}" y1="{y}" x2="{b}" y2="{y}" stroke="{c}" stroke-width="2"/><text x="{t}" y="{y}" dominant-baseline="middle">{label}</text>"#,
                a = lx,
                b = lx + 20.0,
                t = lx + 26.0,
                y = ly,
                c = s.color,
                label = s.label
            )?;
        }

        writeln!(svg, "</svg>")?;
        Ok(svg)
    }
}

impl PlotRenderer for SvgPlotRenderer {
    fn render(&self, put: &Statistics, get: &Statistics, output: &Path) -> Result<()> {
        let svg = self.to_svg(put, get)?;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(output, svg)?;
        info!("wrote plot to {:?}", output);
        Ok(())
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
