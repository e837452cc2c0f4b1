//! Operator-maintained overrides pinning a campaign to a plan line.

use crate::plan::parse_plan_month;
use adrecon_core::types::{CampaignType, UnifiedCampaignRecord};
use adrecon_core::{DiagnosticKind, RunDiagnostics};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One line of the manual mapping file. `campaign` holds either the
/// campaign name or the campaign id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualMappingEntry {
    pub month: String,
    pub restaurant: String,
    pub country: String,
    pub campaign_type: CampaignType,
    pub goal: String,
    pub source: String,
    pub campaign: String,
    pub media_plan_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ManualKey {
    month: NaiveDate,
    restaurant: String,
    country: String,
    campaign_type: CampaignType,
    goal: String,
    source: String,
    campaign: String,
}

impl ManualKey {
    fn for_record(record: &UnifiedCampaignRecord, campaign: &str) -> Self {
        Self {
            month: record.month(),
            restaurant: record.restaurant_display.clone(),
            country: record.country.clone(),
            campaign_type: record.campaign_type,
            goal: record.goal.clone(),
            source: record.source.clone(),
            campaign: campaign.to_string(),
        }
    }
}

/// Immutable for the duration of a run; reload between runs.
#[derive(Debug, Clone, Default)]
pub struct ManualMappingTable {
    mappings: HashMap<ManualKey, u64>,
}

impl ManualMappingTable {
    pub fn from_entries(entries: &[ManualMappingEntry], diagnostics: &RunDiagnostics) -> Self {
        let mut mappings = HashMap::with_capacity(entries.len());
        for entry in entries {
            let Some(month) = parse_plan_month(&entry.month) else {
                diagnostics.record(
                    DiagnosticKind::MalformedPlanEntry,
                    format!("manual mapping month '{}'", entry.month),
                );
                continue;
            };
            let key = ManualKey {
                month,
                restaurant: entry.restaurant.trim().to_string(),
                country: entry.country.trim().to_string(),
                campaign_type: entry.campaign_type,
                goal: entry.goal.trim().to_string(),
                source: entry.source.trim().to_string(),
                campaign: entry.campaign.trim().to_string(),
            };
            // Later lines replace earlier ones for the same key.
            mappings.insert(key, entry.media_plan_id);
        }
        Self { mappings }
    }

    /// Plan id pinned for this campaign-day, by campaign name first, then id.
    pub fn lookup(&self, record: &UnifiedCampaignRecord) -> Option<u64> {
        self.mappings
            .get(&ManualKey::for_record(record, record.campaign_name.trim()))
            .or_else(|| {
                self.mappings
                    .get(&ManualKey::for_record(record, record.campaign_id.trim()))
            })
            .copied()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
