use crate::mapper::AttributionMapper;
use crate::parser::CampaignNameParser;
use adrecon_core::types::{SourceCampaignRecord, UnifiedCampaignRecord};
use adrecon_core::{DiagnosticKind, RunDiagnostics};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::info;

/// Builds one attributed record per `(campaign_id, date)` from the
/// normalized rows the source pollers deliver.
pub struct UnifiedRecordBuilder<'a> {
    parser: &'a CampaignNameParser,
    mapper: &'a AttributionMapper,
}

impl<'a> UnifiedRecordBuilder<'a> {
    pub fn new(parser: &'a CampaignNameParser, mapper: &'a AttributionMapper) -> Self {
        Self { parser, mapper }
    }

    /// Output follows the first appearance of each campaign-day in `records`.
    pub fn build(
        &self,
        records: &[SourceCampaignRecord],
        diagnostics: &RunDiagnostics,
    ) -> Vec<UnifiedCampaignRecord> {
        let merged = merge_campaign_days(records, diagnostics);

        let unified: Vec<UnifiedCampaignRecord> = merged
            .par_iter()
            .map(|record| self.build_one(record, diagnostics))
            .collect();

        info!(
            input = records.len(),
            unified = unified.len(),
            tables_version = self.mapper.tables_version(),
            "Built unified campaign records"
        );
        unified
    }

    fn build_one(
        &self,
        record: &SourceCampaignRecord,
        diagnostics: &RunDiagnostics,
    ) -> UnifiedCampaignRecord {
        let parsed = self.parser.parse_recorded(&record.campaign_name, diagnostics);
        let attribution =
            self.mapper
                .map_recorded(&parsed, record.objective.as_deref(), diagnostics);

        UnifiedCampaignRecord {
            date: record.date,
            campaign_id: record.campaign_id.clone(),
            campaign_name: record.campaign_name.clone(),
            source_system: record.source_system,
            parsed,
            campaign_type: attribution.campaign_type,
            goal: attribution.goal,
            source: attribution.source,
            country: attribution.country,
            restaurant_display: attribution.restaurant_display,
            city_display: attribution.city_display,
            metrics: record.metrics.clone(),
        }
    }
}

/// Sum metrics of rows sharing a campaign-day. The first row's name and
/// objective are kept.
fn merge_campaign_days(
    records: &[SourceCampaignRecord],
    diagnostics: &RunDiagnostics,
) -> Vec<SourceCampaignRecord> {
    let mut index: HashMap<(&str, NaiveDate), usize> = HashMap::with_capacity(records.len());
    let mut merged: Vec<SourceCampaignRecord> = Vec::with_capacity(records.len());

    for record in records {
        let key = (record.campaign_id.as_str(), record.date);
        match index.get(&key) {
            Some(&pos) => {
                diagnostics.record(
                    DiagnosticKind::DuplicateCampaignDay,
                    format!("{}@{}", record.campaign_id, record.date),
                );
                merged[pos].metrics.merge(&record.metrics);
            }
            None => {
                index.insert(key, merged.len());
                merged.push(record.clone());
            }
        }
    }
    merged
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use adrecon_core::tables::LookupTables;
    use adrecon_core::types::{CampaignMetrics, CampaignType, SourceSystem};

    fn row(id: &str, name: &str, day: u32, spend: f64) -> SourceCampaignRecord {
        SourceCampaignRecord {
            source_system: SourceSystem::Meta,
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            campaign_id: id.into(),
            campaign_name: name.into(),
            objective: None,
            metrics: CampaignMetrics {
                impressions: 1000,
                clicks: 10,
                spend,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_build_attributes_and_merges_duplicates() {
        let parser = CampaignNameParser::default();
        let mapper = AttributionMapper::new(&LookupTables::builtin()).unwrap();
        let builder = UnifiedRecordBuilder::new(&parser, &mapper);
        let diagnostics = RunDiagnostics::default();

        let name = "Instagram|CPM|Almaty|Bella|Interests|Birthday";
        let records = vec![
            row("c1", name, 1, 100.0),
            row("c2", "Search|CPC|Astana|Tanuki|Broad|x", 1, 50.0),
            row("c1", name, 1, 25.0),
            row("c1", name, 2, 10.0),
        ];

        let unified = builder.build(&records, &diagnostics);
        assert_eq!(unified.len(), 3);
        assert_eq!(unified[0].campaign_id, "c1");
        assert!((unified[0].metrics.spend - 125.0).abs() < 1e-9);
        assert_eq!(unified[0].metrics.impressions, 2000);
        assert_eq!(unified[0].campaign_type, CampaignType::Awareness);
        assert_eq!(unified[0].restaurant_display, "Белла");
        assert_eq!(unified[1].source, "Google Search");
        assert_eq!(unified[2].date.to_string(), "2025-03-02");
        assert_eq!(diagnostics.count(DiagnosticKind::DuplicateCampaignDay), 1);
    }
}
