//! Report rendering.
//!
//! The renderer receives only validated reports, plus a handle that starts the
//! session over. Empty chart series are shown as "insufficient data", never
//! as an empty chart.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::session::ResetHandle;

use super::model::{ChartPoint, SimulationReport};

pub trait ReportRenderer: Send + Sync {
    fn render(&self, report: Arc<SimulationReport>, reset: ResetHandle);
}

const INSUFFICIENT_DATA: &str = "insufficient data: no values found in the workbook";

/// Plain-text executive report for terminals.
#[derive(Debug, Clone, Copy)]
pub struct TextRenderer {
    bar_width: usize,
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self { bar_width: 30 }
    }
}

impl TextRenderer {
    pub fn new(bar_width: usize) -> Self {
        Self { bar_width }
    }

    pub fn format(&self, report: &SimulationReport) -> String {
        let mut out = String::new();
        // fmt::Write for String never errors
        let _ = self.write_report(&mut out, report);
        out
    }

    fn write_report(&self, out: &mut String, report: &SimulationReport) -> std::fmt::Result {
        writeln!(out, "=== Simulation Executive Report ===")?;
        writeln!(out, "{}", report.summary.overview)?;
        writeln!(out)?;
        writeln!(
            out,
            "Sheets analyzed: {}",
            list_or_none(&report.summary.detected_sheets)
        )?;
        writeln!(
            out,
            "Sheets missing:  {}",
            list_or_none(&report.summary.missing_sheets)
        )?;

        writeln!(out, "\n--- KPIs ---")?;
        if report.kpis.is_empty() {
            writeln!(out, "  ({})", INSUFFICIENT_DATA)?;
        }
        for kpi in &report.kpis {
            let unit = if kpi.unit.is_empty() {
                String::new()
            } else {
                format!(" {}", kpi.unit)
            };
            writeln!(
                out,
                "  {} {:<32} {}{}",
                kpi.trend.arrow(),
                kpi.label,
                kpi.value,
                unit
            )?;
        }

        writeln!(out, "\n--- Resource Utilization ---")?;
        if report.charts.resource_utilization.is_empty() {
            writeln!(out, "  ({})", INSUFFICIENT_DATA)?;
        } else {
            for p in &report.charts.resource_utilization {
                writeln!(
                    out,
                    "  {:<20} {} {:>5.1}%{}",
                    p.name,
                    self.bar(p.value),
                    p.value * 100.0,
                    estimate_mark(p.estimated)
                )?;
            }
        }

        writeln!(out, "\n--- Queue Times ---")?;
        self.write_series(out, &report.charts.queue_times)?;

        if let Some(throughput) = &report.charts.throughput {
            writeln!(out, "\n--- Throughput ---")?;
            self.write_series(out, throughput)?;
        }

        writeln!(out, "\n--- Insights ---")?;
        if report.insights.is_empty() {
            writeln!(out, "  (none)")?;
        }
        for insight in &report.insights {
            writeln!(out, "  [{}] {}", insight.kind.label(), insight.title)?;
            writeln!(out, "      {}", insight.description)?;
        }

        writeln!(out, "\n--- Recommendations ---")?;
        if report.recommendations.is_empty() {
            writeln!(out, "  (none)")?;
        }
        for rec in report.recommendations_by_priority() {
            writeln!(out, "  ({}) {}", rec.priority, rec.title)?;
            writeln!(out, "      {}", rec.action)?;
        }

        Ok(())
    }

    /// Bars scaled to the largest value in the series.
    fn write_series(&self, out: &mut String, points: &[ChartPoint]) -> std::fmt::Result {
        if points.is_empty() {
            return writeln!(out, "  ({})", INSUFFICIENT_DATA);
        }
        let max = points.iter().map(|p| p.value).fold(0.0_f64, f64::max);
        for p in points {
            let fraction = if max > 0.0 { p.value / max } else { 0.0 };
            writeln!(
                out,
                "  {:<20} {} {:>10.2}{}",
                p.name,
                self.bar(fraction),
                p.value,
                estimate_mark(p.estimated)
            )?;
        }
        Ok(())
    }

    fn bar(&self, fraction: f64) -> String {
        let filled = ((fraction.clamp(0.0, 1.0) * self.bar_width as f64).round()) as usize;
        let mut bar = "█".repeat(filled);
        bar.push_str(&"░".repeat(self.bar_width - filled));
        bar
    }
}

impl ReportRenderer for TextRenderer {
    fn render(&self, report: Arc<SimulationReport>, _reset: ResetHandle) {
        println!("{}", self.format(&report));
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

fn estimate_mark(estimated: bool) -> &'static str {
    if estimated {
        "  (estimated)"
    } else {
        ""
    }
}
