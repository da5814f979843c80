//! Report Validator
//!
//! The output schema is sent with every request, but the engine is a black
//! box, so its text is checked again here before anything renders it:
//! - well-formed JSON object (one surrounding markdown code fence is tolerated)
//! - every required section and field present with the right type
//! - enumerated fields hold one of their declared values
//! - `summary.detectedSheets` only names sheets that exist in the workbook
//! - chart values are finite numbers in range, coerced from strings if needed
//!
//! Failures carry the path of the offending field, e.g. `charts.queueTimes[2].value`.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::error::{AnalysisError, AnalysisResult};

use super::model::{
    ChartPoint, Charts, Insight, InsightKind, Kpi, Priority, Recommendation, ReportSummary,
    SimulationReport, Trend,
};
use super::request::ChartPolicy;

/// Upper bound for utilization given on the percent scale.
const MAX_UTILIZATION: f64 = 100.0;

/// Rewrite a utilization series as fractions in [0, 1].
///
/// `"41%"` strings were already divided by 100 while parsing and are final.
/// Bare numbers share one scale per series: any bare value above 1 puts the
/// series on the percent scale, and a bare value strictly between 0 and 1 in
/// such a series is a scale mix (`0.92` next to `41`), which is rejected.
fn normalize_utilization(
    points: Vec<(ChartPoint, bool)>,
    path: &str,
) -> AnalysisResult<Vec<ChartPoint>> {
    let value_path = |idx: usize| format!("{}[{}].value", path, idx);

    let percent_scale = points
        .iter()
        .any(|(point, explicit)| !explicit && point.value > 1.0);

    points
        .into_iter()
        .enumerate()
        .map(|(idx, (mut point, explicit))| {
            if explicit {
                if point.value > 1.0 {
                    return Err(AnalysisError::malformed(
                        value_path(idx),
                        format!("utilization {}% is above 100%", point.value * 100.0),
                    ));
                }
                return Ok(point);
            }
            if percent_scale {
                if point.value > MAX_UTILIZATION {
                    return Err(AnalysisError::malformed(
                        value_path(idx),
                        format!("utilization {} is above {}", point.value, MAX_UTILIZATION),
                    ));
                }
                if point.value > 0.0 && point.value < 1.0 {
                    return Err(AnalysisError::malformed(
                        value_path(idx),
                        format!(
                            "{} reads as a fraction but the series is on the 0-100 scale",
                            point.value
                        ),
                    ));
                }
                point.value /= 100.0;
            }
            Ok(point)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ReportValidator {
    known_sheets: HashSet<String>,
    chart_policy: ChartPolicy,
}

impl ReportValidator {
    pub fn new<I, S>(sheet_names: I, chart_policy: ChartPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_sheets: sheet_names.into_iter().map(Into::into).collect(),
            chart_policy,
        }
    }

    pub fn validate(&self, raw: &str) -> AnalysisResult<SimulationReport> {
        let body = strip_code_fence(raw);
        let root: Value = serde_json::from_str(body)
            .map_err(|e| AnalysisError::malformed("$", format!("not valid JSON: {}", e)))?;
        let root = as_object(&root, "$")?;

        Ok(SimulationReport {
            summary: self.summary(required(root, "summary", "")?, "summary")?,
            kpis: indexed(required(root, "kpis", "")?, "kpis", kpi)?,
            charts: self.charts(required(root, "charts", "")?, "charts")?,
            insights: indexed(required(root, "insights", "")?, "insights", insight)?,
            recommendations: indexed(
                required(root, "recommendations", "")?,
                "recommendations",
                recommendation,
            )?,
        })
    }

    fn summary(&self, value: &Value, path: &str) -> AnalysisResult<ReportSummary> {
        let obj = as_object(value, path)?;

        let detected_path = join(path, "detectedSheets");
        let detected_sheets = indexed(
            required(obj, "detectedSheets", path)?,
            &detected_path,
            |v, p| {
                let name = as_string(v, p)?;
                if !self.known_sheets.contains(&name) {
                    return Err(AnalysisError::malformed(
                        p,
                        format!("sheet '{}' is not in the workbook", name),
                    ));
                }
                Ok(name)
            },
        )?;

        let missing_path = join(path, "missingSheets");
        let missing_sheets = indexed(required(obj, "missingSheets", path)?, &missing_path, as_string)?;

        Ok(ReportSummary {
            detected_sheets,
            missing_sheets,
            overview: as_string(required(obj, "overview", path)?, &join(path, "overview"))?,
        })
    }

    fn charts(&self, value: &Value, path: &str) -> AnalysisResult<Charts> {
        let obj = as_object(value, path)?;

        let util_path = join(path, "resourceUtilization");
        let raw_utilization = indexed(
            required(obj, "resourceUtilization", path)?,
            &util_path,
            |v, p| {
                let explicit_percent = matches!(
                    v.get("value"),
                    Some(Value::String(s)) if s.trim_end().ends_with('%')
                );
                Ok((self.point(v, p, true)?, explicit_percent))
            },
        )?;
        let resource_utilization = normalize_utilization(raw_utilization, &util_path)?;

        let queue_path = join(path, "queueTimes");
        let queue_times = indexed(required(obj, "queueTimes", path)?, &queue_path, |v, p| {
            self.point(v, p, false)
        })?;

        let throughput = match optional(obj, "throughput") {
            Some(v) => {
                let tp_path = join(path, "throughput");
                Some(indexed(v, &tp_path, |v, p| self.point(v, p, false))?)
            }
            None => None,
        };

        Ok(Charts {
            resource_utilization,
            queue_times,
            throughput,
        })
    }

    /// Chart point with a finite, non-negative value.
    fn point(&self, value: &Value, path: &str, allow_percent: bool) -> AnalysisResult<ChartPoint> {
        let obj = as_object(value, path)?;
        let name = as_string(required(obj, "name", path)?, &join(path, "name"))?;

        let value_path = join(path, "value");
        let number = as_number(required(obj, "value", path)?, &value_path, allow_percent)?;
        if number < 0.0 {
            return Err(AnalysisError::malformed(
                value_path,
                format!("{} is negative", number),
            ));
        }

        let estimated = match optional(obj, "estimated") {
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                return Err(AnalysisError::malformed(
                    join(path, "estimated"),
                    "expected a boolean",
                ))
            }
            None => false,
        };
        if estimated && self.chart_policy == ChartPolicy::LiteralOnly {
            return Err(AnalysisError::malformed(
                join(path, "estimated"),
                "estimated values are not allowed for this analysis",
            ));
        }

        Ok(ChartPoint {
            name,
            value: number,
            estimated,
        })
    }
}

fn kpi(value: &Value, path: &str) -> AnalysisResult<Kpi> {
    let obj = as_object(value, path)?;

    let value_path = join(path, "value");
    let display = match required(obj, "value", path)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => {
            return Err(AnalysisError::malformed(
                value_path,
                "expected a string or number",
            ))
        }
    };

    let trend = match optional(obj, "trend") {
        None => Trend::Absent,
        Some(v) => {
            let trend_path = join(path, "trend");
            let s = as_string(v, &trend_path)?;
            Trend::parse(&s).ok_or_else(|| not_declared(&trend_path, &s, &Trend::DECLARED))?
        }
    };

    Ok(Kpi {
        label: as_string(required(obj, "label", path)?, &join(path, "label"))?,
        value: display,
        unit: as_string(required(obj, "unit", path)?, &join(path, "unit"))?,
        trend,
    })
}

fn insight(value: &Value, path: &str) -> AnalysisResult<Insight> {
    let obj = as_object(value, path)?;
    let kind_path = join(path, "type");
    let kind_raw = as_string(required(obj, "type", path)?, &kind_path)?;
    let kind = InsightKind::parse(&kind_raw)
        .ok_or_else(|| not_declared(&kind_path, &kind_raw, &InsightKind::DECLARED))?;

    Ok(Insight {
        kind,
        title: as_string(required(obj, "title", path)?, &join(path, "title"))?,
        description: as_string(required(obj, "description", path)?, &join(path, "description"))?,
    })
}

fn recommendation(value: &Value, path: &str) -> AnalysisResult<Recommendation> {
    let obj = as_object(value, path)?;
    let priority_path = join(path, "priority");
    let priority_raw = as_string(required(obj, "priority", path)?, &priority_path)?;
    let priority = Priority::parse(&priority_raw)
        .ok_or_else(|| not_declared(&priority_path, &priority_raw, &Priority::DECLARED))?;

    Ok(Recommendation {
        title: as_string(required(obj, "title", path)?, &join(path, "title"))?,
        action: as_string(required(obj, "action", path)?, &join(path, "action"))?,
        priority,
    })
}

/// Read a number from a loosely formatted string.
///
/// Accepts surrounding whitespace, `,` thousands separators in well-formed
/// groups of three (`1,234,567.8`), and, when `allow_percent` is set, a
/// trailing `%` that divides by 100. Decimal commas (`12,4`), units and
/// non-finite values are rejected.
pub fn parse_lenient_number(raw: &str, allow_percent: bool) -> Option<f64> {
    let mut s = raw.trim();
    let mut divisor = 1.0;
    if let Some(stripped) = s.strip_suffix('%') {
        if !allow_percent {
            return None;
        }
        s = stripped.trim_end();
        divisor = 100.0;
    }
    if s.is_empty() {
        return None;
    }

    let cleaned = if s.contains(',') {
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (s, None),
        };
        let digits = int_part.trim_start_matches(&['-', '+'][..]);
        let mut groups = digits.split(',');
        let head_ok = groups
            .next()
            .map(|g| !g.is_empty() && g.len() <= 3)
            .unwrap_or(false);
        if !head_ok || !groups.all(|g| g.len() == 3) {
            return None;
        }
        let mut out = int_part.replace(',', "");
        if let Some(f) = frac_part {
            out.push('.');
            out.push_str(f);
        }
        out
    } else {
        s.to_string()
    };

    cleaned
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map(|n| n / divisor)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop an info string such as `json` on the opening fence line
    match rest.split_once('\n') {
        Some((info, body)) if !info.trim_start().starts_with('{') => body.trim(),
        _ => rest.trim(),
    }
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn required<'v>(obj: &'v Map<String, Value>, key: &str, parent: &str) -> AnalysisResult<&'v Value> {
    match obj.get(key) {
        Some(Value::Null) | None => Err(AnalysisError::malformed(
            join(parent, key),
            "missing required field",
        )),
        Some(v) => Ok(v),
    }
}

/// Absent and `null` both read as "not given".
fn optional<'v>(obj: &'v Map<String, Value>, key: &str) -> Option<&'v Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn as_object<'v>(value: &'v Value, path: &str) -> AnalysisResult<&'v Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| AnalysisError::malformed(path, "expected an object"))
}

fn as_string(value: &Value, path: &str) -> AnalysisResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AnalysisError::malformed(path, "expected a string"))
}

fn as_number(value: &Value, path: &str, allow_percent: bool) -> AnalysisResult<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|n| n.is_finite())
            .ok_or_else(|| AnalysisError::malformed(path, "not a finite number")),
        Value::String(s) => parse_lenient_number(s, allow_percent).ok_or_else(|| {
            AnalysisError::malformed(path, format!("cannot read '{}' as a number", s))
        }),
        _ => Err(AnalysisError::malformed(path, "expected a number")),
    }
}

fn indexed<T, F>(value: &Value, path: &str, mut item: F) -> AnalysisResult<Vec<T>>
where
    F: FnMut(&Value, &str) -> AnalysisResult<T>,
{
    let items = value
        .as_array()
        .ok_or_else(|| AnalysisError::malformed(path, "expected an array"))?;
    items
        .iter()
        .enumerate()
        .map(|(idx, v)| item(v, &format!("{}[{}]", path, idx)))
        .collect()
}

fn not_declared(path: &str, got: &str, declared: &[&str]) -> AnalysisError {
    AnalysisError::malformed(
        path,
        format!("unknown value \"{}\" (expected one of {})", got, declared.join(", ")),
    )
}
