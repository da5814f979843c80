//! Report Request Builder
//!
//! Composes what the generative engine receives: a fixed analyst instruction,
//! a prompt describing this workbook plus its budgeted payload, and an output
//! schema that forces the response into the `SimulationReport` shape.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::ingest::{BudgetedPayload, Classification, Selection};
use crate::models::SheetStore;

use super::model::{InsightKind, Priority, Trend};

/// Utilization above this fraction marks a resource as a bottleneck.
pub const BOTTLENECK_UTILIZATION: f64 = 0.85;

/// Whether chart series may be estimated when the data has no literal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartPolicy {
    /// Series come only from literal values; otherwise they are empty
    #[default]
    LiteralOnly,
    /// Engine may estimate, and must flag every estimated point
    AllowEstimates,
}

/// Everything one gateway call needs. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub id: Uuid,
    pub instruction: String,
    pub prompt: String,
    /// Every sheet name in the workbook, in workbook order, without repeats
    pub sheet_names_detected: Vec<String>,
    /// Sheets serialized into the payload
    pub selected_sheets: Vec<String>,
    pub payload_chars: usize,
    pub payload_truncated: bool,
    pub chart_policy: ChartPolicy,
    pub schema: Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportRequestBuilder {
    chart_policy: ChartPolicy,
}

impl ReportRequestBuilder {
    pub fn new(chart_policy: ChartPolicy) -> Self {
        Self { chart_policy }
    }

    pub fn chart_policy(&self) -> ChartPolicy {
        self.chart_policy
    }

    pub fn build(
        &self,
        store: &SheetStore,
        classification: &Classification<'_>,
        selection: &Selection<'_>,
        payload: BudgetedPayload,
    ) -> AnalysisRequest {
        let mut sheet_names_detected: Vec<String> = Vec::with_capacity(store.len());
        for name in store.names() {
            if !sheet_names_detected.iter().any(|n| n == name) {
                sheet_names_detected.push(name.to_string());
            }
        }
        let selected_sheets: Vec<String> =
            selection.sheets.iter().map(|s| s.name.clone()).collect();

        let prompt = build_prompt(
            &sheet_names_detected,
            &selected_sheets,
            selection.fallback,
            classification,
            &payload,
        );

        AnalysisRequest {
            id: Uuid::new_v4(),
            instruction: system_instruction(self.chart_policy),
            prompt,
            sheet_names_detected,
            selected_sheets,
            payload_chars: payload.chars(),
            payload_truncated: payload.truncated(),
            chart_policy: self.chart_policy,
            schema: report_schema(self.chart_policy),
        }
    }
}

pub fn system_instruction(policy: ChartPolicy) -> String {
    let charts_rule = match policy {
        ChartPolicy::LiteralOnly => {
            "5. Chart series must be taken from literal values in the data. If a series has no \
             literal values, return it as an empty array. Never invent or estimate chart values."
        }
        ChartPolicy::AllowEstimates => {
            "5. Chart series should be taken from literal values in the data. If a series has no \
             literal values you may give a best-effort estimate, and every estimated point must \
             have \"estimated\": true. Points read directly from the data have \"estimated\": false."
        }
    };

    format!(
        "You are an operations analyst and discrete-event simulation consultant \
(Arena, Simio and similar tools). You turn raw simulation spreadsheet exports into an \
executive JSON report.

Analysis rules:
1. Sheet priority: treat the across-replication summary sheet (AcrossReplicationsSummary), \
when present, as ground truth. Use per-replication sheets (DiscreteTimeStatsByRep, \
CounterStatsByRep, FrequencyStatsByRep, OutputStatByStep) only to refine it.
2. KPIs: extract wait time, total time in system, resource utilization and number in queue.
3. Insights: classify as \"bottleneck\" when a resource's utilization exceeds {threshold} \
({threshold_pct:.0}%) or a queue is materially long; as \"risk\" when results vary strongly \
across replications; otherwise as \"opportunity\" where capacity headroom exists.
4. Recommendations: give actionable operational levers (add or remove capacity, change \
dispatching or scheduling rules), each with a priority of High, Medium or Low.
{charts_rule}

Output format:
Return only JSON matching the provided schema.
- summary.detectedSheets: names of workbook sheets you used, spelled exactly as given.
- summary.missingSheets: expected simulation sheets that are absent.
- charts.resourceUtilization: resource names and their average utilization (0-1 or 0-100).
- charts.queueTimes: queue names and their average waiting time.
- charts.throughput: optional; entity or output names and their throughput.
",
        threshold = BOTTLENECK_UTILIZATION,
        threshold_pct = BOTTLENECK_UTILIZATION * 100.0,
        charts_rule = charts_rule,
    )
}

fn build_prompt(
    all_sheets: &[String],
    selected: &[String],
    fallback: bool,
    classification: &Classification<'_>,
    payload: &BudgetedPayload,
) -> String {
    let mut prompt = String::new();
    prompt.push_str("Analyze this simulation output file (JSON derived from a spreadsheet).\n");
    prompt.push_str(&format!("Sheets in workbook: {}.\n", all_sheets.join(", ")));

    if fallback {
        prompt.push_str(
            "No known simulation report sheets were recognized; all sheets are included.\n",
        );
    } else {
        prompt.push_str(&format!("Sheets included in data: {}.\n", selected.join(", ")));
    }

    match classification.ground_truth() {
        Some(name) => prompt.push_str(&format!("Ground-truth summary sheet: {}.\n", name)),
        None => prompt.push_str("No across-replication summary sheet is present.\n"),
    }

    if !classification.missing_ids.is_empty() {
        prompt.push_str(&format!(
            "Expected sheets not found: {}.\n",
            classification.missing_ids.join(", ")
        ));
    }

    if payload.truncated() {
        prompt.push_str(&format!(
            "Note: the data below was cut to {} of {} characters; the last record may be incomplete.\n",
            payload.max_chars, payload.full_chars
        ));
    }

    prompt.push_str("\nProduce a consulting report.\nData: ");
    prompt.push_str(&payload.text);
    prompt.push('\n');
    prompt
}

fn chart_series_schema(policy: ChartPolicy) -> Value {
    let mut properties = json!({
        "name": { "type": "STRING" },
        "value": { "type": "NUMBER" },
    });
    let mut required = vec!["name", "value"];
    if policy == ChartPolicy::AllowEstimates {
        properties["estimated"] = json!({ "type": "BOOLEAN" });
        required.push("estimated");
    }

    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": properties,
            "required": required,
        }
    })
}

/// Output schema in the engine's OpenAPI subset.
pub fn report_schema(policy: ChartPolicy) -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "summary": {
                "type": "OBJECT",
                "properties": {
                    "detectedSheets": { "type": "ARRAY", "items": { "type": "STRING" } },
                    "missingSheets": { "type": "ARRAY", "items": { "type": "STRING" } },
                    "overview": { "type": "STRING" },
                },
                "required": ["detectedSheets", "missingSheets", "overview"],
            },
            "kpis": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "label": { "type": "STRING" },
                        // string so the engine can keep its own number formatting
                        "value": { "type": "STRING" },
                        "unit": { "type": "STRING" },
                        "trend": { "type": "STRING", "enum": Trend::DECLARED },
                    },
                    "required": ["label", "value", "unit"],
                }
            },
            "charts": {
                "type": "OBJECT",
                "properties": {
                    "resourceUtilization": chart_series_schema(policy),
                    "queueTimes": chart_series_schema(policy),
                    "throughput": chart_series_schema(policy),
                },
                "required": ["resourceUtilization", "queueTimes"],
            },
            "insights": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "type": { "type": "STRING", "enum": InsightKind::DECLARED },
                        "title": { "type": "STRING" },
                        "description": { "type": "STRING" },
                    },
                    "required": ["type", "title", "description"],
                }
            },
            "recommendations": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING" },
                        "action": { "type": "STRING" },
                        "priority": { "type": "STRING", "enum": Priority::DECLARED },
                    },
                    "required": ["title", "action", "priority"],
                }
            },
        },
        "required": ["summary", "kpis", "charts", "insights", "recommendations"],
    })
}
