use adrecon_core::types::{month_start, CampaignType, MediaPlanEntry};
use adrecon_core::{DiagnosticKind, RunDiagnostics};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// A media-plan line as imported from the planning sheet, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaPlanRow {
    pub id: Option<u64>,
    pub month: Option<String>,
    pub campaign_type: Option<String>,
    pub goal: Option<String>,
    pub restaurant: Option<String>,
    pub country: Option<String>,
    pub source: Option<String>,
    pub targeting: Option<String>,
    pub planned_budget: Option<f64>,
    pub planned_impressions: Option<f64>,
    pub planned_clicks: Option<f64>,
    pub planned_orders: Option<f64>,
    pub planned_revenue: Option<f64>,
    pub planned_installs: Option<f64>,
}

/// Accepts `YYYY-MM`, `YYYY-MM-DD`, `MM/YYYY` and `DD/MM/YYYY`; always
/// returns the first of the month.
pub fn parse_plan_month(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(month_start(date));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%d/%m/%Y") {
        return Some(month_start(date));
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d") {
        return Some(date);
    }
    NaiveDate::parse_from_str(&format!("01/{raw}"), "%d/%m/%Y").ok()
}

fn required<'a>(value: &'a Option<String>, field: &str, missing: &mut Vec<String>) -> &'a str {
    match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v,
        None => {
            missing.push(field.to_string());
            ""
        }
    }
}

/// Validate one row. The error names every missing or unreadable key field.
pub fn validate_plan_row(row: &MediaPlanRow) -> Result<MediaPlanEntry, String> {
    let mut problems = Vec::new();
    let month_raw = required(&row.month, "month", &mut problems);
    let type_raw = required(&row.campaign_type, "campaign_type", &mut problems);
    let goal = required(&row.goal, "goal", &mut problems);
    let restaurant = required(&row.restaurant, "restaurant", &mut problems);
    let country = required(&row.country, "country", &mut problems);
    let source = required(&row.source, "source", &mut problems);
    if row.id.is_none() {
        problems.push("id".to_string());
    }

    let month = if month_raw.is_empty() {
        None
    } else {
        let parsed = parse_plan_month(month_raw);
        if parsed.is_none() {
            problems.push(format!("month '{month_raw}'"));
        }
        parsed
    };
    let campaign_type = if type_raw.is_empty() {
        None
    } else {
        let parsed = type_raw.parse::<CampaignType>().ok();
        if parsed.is_none() {
            problems.push(format!("campaign_type '{type_raw}'"));
        }
        parsed
    };

    match (row.id, month, campaign_type) {
        (Some(id), Some(month), Some(campaign_type)) if problems.is_empty() => Ok(MediaPlanEntry {
            id,
            month,
            campaign_type,
            goal: goal.to_string(),
            restaurant: restaurant.to_string(),
            country: country.to_string(),
            source: source.to_string(),
            targeting: row
                .targeting
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            planned_budget: row.planned_budget.unwrap_or(0.0),
            planned_impressions: row.planned_impressions.unwrap_or(0.0),
            planned_clicks: row.planned_clicks.unwrap_or(0.0),
            planned_orders: row.planned_orders.unwrap_or(0.0),
            planned_revenue: row.planned_revenue.unwrap_or(0.0),
            planned_installs: row.planned_installs.unwrap_or(0.0),
        }),
        _ => Err(format!("invalid or missing: {}", problems.join(", "))),
    }
}

/// Read-only media plan indexed by month and id.
#[derive(Debug, Clone, Default)]
pub struct MediaPlan {
    entries: Vec<MediaPlanEntry>,
    by_month: BTreeMap<NaiveDate, Vec<usize>>,
    by_id: HashMap<u64, usize>,
}

impl MediaPlan {
    /// Entries with an id already seen are dropped as malformed.
    pub fn new(entries: Vec<MediaPlanEntry>, diagnostics: &RunDiagnostics) -> Self {
        let mut plan = Self::default();
        for mut entry in entries {
            if plan.by_id.contains_key(&entry.id) {
                diagnostics.record(
                    DiagnosticKind::MalformedPlanEntry,
                    format!("duplicate plan id {}", entry.id),
                );
                continue;
            }
            entry.month = month_start(entry.month);
            let idx = plan.entries.len();
            plan.by_id.insert(entry.id, idx);
            plan.by_month.entry(entry.month).or_default().push(idx);
            plan.entries.push(entry);
        }
        plan
    }

    /// Validate raw rows, skipping malformed ones.
    pub fn from_rows(rows: &[MediaPlanRow], diagnostics: &RunDiagnostics) -> Self {
        let entries: Vec<MediaPlanEntry> = rows
            .iter()
            .filter_map(|row| match validate_plan_row(row) {
                Ok(entry) => Some(entry),
                Err(reason) => {
                    let id = row.id.map(|id| id.to_string()).unwrap_or_else(|| "?".into());
                    diagnostics.record(
                        DiagnosticKind::MalformedPlanEntry,
                        format!("plan row {id}: {reason}"),
                    );
                    None
                }
            })
            .collect();
        let plan = Self::new(entries, diagnostics);
        info!(
            rows = rows.len(),
            entries = plan.len(),
            months = plan.by_month.len(),
            "Loaded media plan"
        );
        plan
    }

    pub fn get(&self, id: u64) -> Option<&MediaPlanEntry> {
        self.by_id.get(&id).map(|&idx| &self.entries[idx])
    }

    pub fn for_month(&self, month: NaiveDate) -> impl Iterator<Item = &MediaPlanEntry> {
        self.by_month
            .get(&month_start(month))
            .into_iter()
            .flatten()
            .map(move |&idx| &self.entries[idx])
    }

    pub fn has_month(&self, month: NaiveDate) -> bool {
        self.by_month.contains_key(&month_start(month))
    }

    pub fn entries(&self) -> &[MediaPlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
