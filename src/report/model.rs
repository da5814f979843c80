//! Normalized simulation report.
//!
//! Built in one piece by the validator from a single engine response and
//! shared read-only afterwards. Serializes back to the same camelCase wire
//! shape the engine is asked to produce.

use serde::Serialize;

use super::validator::parse_lenient_number;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub summary: ReportSummary,
    pub kpis: Vec<Kpi>,
    pub charts: Charts,
    pub insights: Vec<Insight>,
    pub recommendations: Vec<Recommendation>,
}

impl SimulationReport {
    pub fn insights_of(&self, kind: InsightKind) -> impl Iterator<Item = &Insight> {
        self.insights.iter().filter(move |i| i.kind == kind)
    }

    /// Recommendations ordered High, Medium, Low; stable within a priority.
    pub fn recommendations_by_priority(&self) -> Vec<&Recommendation> {
        let mut recs: Vec<&Recommendation> = self.recommendations.iter().collect();
        recs.sort_by_key(|r| r.priority);
        recs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub detected_sheets: Vec<String>,
    pub missing_sheets: Vec<String>,
    pub overview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpi {
    pub label: String,
    /// Display string; engines format numbers inconsistently
    pub value: String,
    pub unit: String,
    #[serde(skip_serializing_if = "Trend::is_absent")]
    pub trend: Trend,
}

impl Kpi {
    /// Numeric reading of `value`: plain numbers, thousands separators, and
    /// percentages (`"85%"` reads as 0.85). Anything else is `None`.
    pub fn numeric_value(&self) -> Option<f64> {
        parse_lenient_number(&self.value, true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
    Absent,
}

impl Trend {
    /// Values the engine may emit; `Absent` is expressed by omitting the field.
    pub const DECLARED: [&'static str; 3] = ["up", "down", "stable"];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "stable" => Some(Self::Stable),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        *self == Self::Absent
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            Self::Up => "↑",
            Self::Down => "↓",
            Self::Stable => "→",
            Self::Absent => " ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Charts {
    /// Fractions in [0, 1], whatever scale the engine answered in
    pub resource_utilization: Vec<ChartPoint>,
    pub queue_times: Vec<ChartPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput: Option<Vec<ChartPoint>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub name: String,
    pub value: f64,
    /// Set only by an engine running with estimates allowed
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub estimated: bool,
}

impl ChartPoint {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            estimated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Bottleneck,
    Risk,
    Opportunity,
}

impl InsightKind {
    pub const DECLARED: [&'static str; 3] = ["bottleneck", "risk", "opportunity"];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bottleneck" => Some(Self::Bottleneck),
            "risk" => Some(Self::Risk),
            "opportunity" => Some(Self::Opportunity),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Bottleneck => "BOTTLENECK",
            Self::Risk => "RISK",
            Self::Opportunity => "OPPORTUNITY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub title: String,
    pub action: String,
    pub priority: Priority,
}

/// Declaration order is sort order: High first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const DECLARED: [&'static str; 3] = ["High", "Medium", "Low"];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "High"),
            Self::Medium => write!(f, "Medium"),
            Self::Low => write!(f, "Low"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_sort_high_first() {
        let mut ps = vec![Priority::Low, Priority::High, Priority::Medium];
        ps.sort();
        assert_eq!(ps, vec![Priority::High, Priority::Medium, Priority::Low]);
    }

    #[test]
    fn kpi_numeric_value_reads_formatted_strings() {
        let kpi = |v: &str| Kpi {
            label: "x".into(),
            value: v.into(),
            unit: String::new(),
            trend: Trend::Absent,
        };
        assert_eq!(kpi("12.4").numeric_value(), Some(12.4));
        assert_eq!(kpi("1,234.5").numeric_value(), Some(1234.5));
        assert_eq!(kpi("85%").numeric_value(), Some(0.85));
        assert_eq!(kpi("n/a").numeric_value(), None);
    }

    #[test]
    fn serializes_in_wire_shape() {
        let insight = Insight {
            kind: InsightKind::Bottleneck,
            title: "t".into(),
            description: "d".into(),
        };
        let json = serde_json::to_value(&insight).unwrap();
        assert_eq!(json["type"], "bottleneck");

        let kpi = Kpi {
            label: "Wait".into(),
            value: "3".into(),
            unit: "min".into(),
            trend: Trend::Absent,
        };
        let json = serde_json::to_value(&kpi).unwrap();
        assert!(json.get("trend").is_none());
    }
}
