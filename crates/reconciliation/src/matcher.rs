//! Resolution of realized campaign-days to media-plan lines.
//!
//! Strategies run in strict priority order and the first hit ends
//! resolution: manual mapping, exact key match, fuzzy scoring. Several
//! equally good candidates are settled by the planned budget closest to
//! actual spend, then by the lowest plan id, and the result is always
//! flagged ambiguous.

use crate::manual::ManualMappingTable;
use crate::plan::MediaPlan;
use crate::variance::{compare_all, undefined_relative};
use adrecon_core::config::MatcherConfig;
use adrecon_core::types::{CampaignRef, MatchResult, MediaPlanEntry, UnifiedCampaignRecord};
use adrecon_core::{DiagnosticKind, RunDiagnostics};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

const SCORE_EPSILON: f64 = 1e-9;
const KEY_FIELDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchKind {
    Manual,
    Exact,
    Fuzzy,
    NoPlanForMonth,
    NoMatch,
}

impl MatchKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Exact => "exact",
            Self::Fuzzy => "fuzzy",
            Self::NoPlanForMonth | Self::NoMatch => "none",
        }
    }
}

struct Resolution<'p> {
    kind: MatchKind,
    entry: Option<&'p MediaPlanEntry>,
    score: Option<f64>,
    candidates: Vec<u64>,
}

impl<'p> Resolution<'p> {
    fn unmatched(kind: MatchKind) -> Self {
        Self {
            kind,
            entry: None,
            score: None,
            candidates: Vec::new(),
        }
    }

    fn single(kind: MatchKind, entry: &'p MediaPlanEntry, score: Option<f64>) -> Self {
        Self {
            kind,
            entry: Some(entry),
            score,
            candidates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStats {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub manual: usize,
    pub exact: usize,
    pub fuzzy: usize,
    pub ambiguous: usize,
    pub no_plan_for_month: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub results: Vec<MatchResult>,
    pub stats: MatchStats,
}

pub struct MediaPlanMatcher<'a> {
    plan: &'a MediaPlan,
    manual: &'a ManualMappingTable,
    config: &'a MatcherConfig,
}

impl<'a> MediaPlanMatcher<'a> {
    pub fn new(
        plan: &'a MediaPlan,
        manual: &'a ManualMappingTable,
        config: &'a MatcherConfig,
    ) -> Self {
        Self {
            plan,
            manual,
            config,
        }
    }

    /// Match every record in parallel. Results keep input order.
    pub fn match_all(
        &self,
        records: &[UnifiedCampaignRecord],
        diagnostics: &RunDiagnostics,
    ) -> MatchOutcome {
        let resolved: Vec<(MatchResult, MatchKind)> = records
            .par_iter()
            .map(|record| self.resolve_and_build(record, diagnostics))
            .collect();

        let mut stats = MatchStats {
            total: resolved.len(),
            ..Default::default()
        };
        for (result, kind) in &resolved {
            match kind {
                MatchKind::Manual => stats.manual += 1,
                MatchKind::Exact => stats.exact += 1,
                MatchKind::Fuzzy => stats.fuzzy += 1,
                MatchKind::NoPlanForMonth => stats.no_plan_for_month += 1,
                MatchKind::NoMatch => {}
            }
            if result.matched {
                stats.matched += 1;
            } else {
                stats.unmatched += 1;
            }
            if result.is_ambiguous {
                stats.ambiguous += 1;
            }
        }

        info!(
            total = stats.total,
            matched = stats.matched,
            manual = stats.manual,
            exact = stats.exact,
            fuzzy = stats.fuzzy,
            ambiguous = stats.ambiguous,
            unmatched = stats.unmatched,
            "Matched campaign records to media plan"
        );

        MatchOutcome {
            results: resolved.into_iter().map(|(result, _)| result).collect(),
            stats,
        }
    }

    pub fn match_record(
        &self,
        record: &UnifiedCampaignRecord,
        diagnostics: &RunDiagnostics,
    ) -> MatchResult {
        self.resolve_and_build(record, diagnostics).0
    }

    fn resolve_and_build(
        &self,
        record: &UnifiedCampaignRecord,
        diagnostics: &RunDiagnostics,
    ) -> (MatchResult, MatchKind) {
        let resolution = self.resolve(record, diagnostics);
        metrics::counter!("matcher.results", "kind" => resolution.kind.as_str()).increment(1);

        let label = format!("{}@{}", record.campaign_id, record.date);
        match resolution.kind {
            MatchKind::NoPlanForMonth => {
                diagnostics.record(DiagnosticKind::NoPlanForMonth, label.clone())
            }
            MatchKind::NoMatch => diagnostics.record(DiagnosticKind::NoMatchFound, label.clone()),
            _ => {}
        }
        if !resolution.candidates.is_empty() {
            diagnostics.record(
                DiagnosticKind::AmbiguousMatch,
                format!("{label} candidates={:?}", resolution.candidates),
            );
        }

        let fact = record.metrics.totals();
        let plan = resolution.entry.map(MediaPlanEntry::planned_totals);
        let variances = match &plan {
            Some(plan) => {
                let variances = compare_all(&fact, plan);
                for metric in undefined_relative(&variances) {
                    diagnostics.record(DiagnosticKind::DivisionUndefined, format!("{label} {metric}"));
                }
                variances
            }
            None => BTreeMap::new(),
        };

        let result = MatchResult {
            campaign: CampaignRef::from(record),
            matched: resolution.entry.is_some(),
            media_plan_id: resolution.entry.map(|e| e.id),
            is_manual: resolution.kind == MatchKind::Manual,
            is_fuzzy: resolution.kind == MatchKind::Fuzzy,
            is_ambiguous: !resolution.candidates.is_empty(),
            match_score: resolution.score,
            ambiguous_candidates: resolution.candidates,
            fact,
            plan,
            variances,
        };
        (result, resolution.kind)
    }

    fn resolve(
        &self,
        record: &UnifiedCampaignRecord,
        diagnostics: &RunDiagnostics,
    ) -> Resolution<'a> {
        if let Some(id) = self.manual.lookup(record) {
            match self.plan.get(id) {
                Some(entry) => {
                    debug!(campaign_id = %record.campaign_id, plan_id = id, "manual mapping");
                    return Resolution::single(MatchKind::Manual, entry, None);
                }
                None => diagnostics.record(
                    DiagnosticKind::DanglingManualMapping,
                    format!("{} -> {}", record.campaign_id, id),
                ),
            }
        }

        let month: Vec<&'a MediaPlanEntry> = self.plan.for_month(record.month()).collect();
        if month.is_empty() {
            return Resolution::unmatched(MatchKind::NoPlanForMonth);
        }

        let exact: Vec<&'a MediaPlanEntry> = month
            .iter()
            .copied()
            .filter(|entry| matching_key_fields(record, entry) == KEY_FIELDS)
            .collect();
        match exact.len() {
            0 => {}
            1 => return Resolution::single(MatchKind::Exact, exact[0], None),
            _ => return self.resolve_ambiguous(record, &exact, MatchKind::Exact, None),
        }

        let targeting = record.parsed.targeting_text();
        let scored: Vec<(&'a MediaPlanEntry, f64)> = month
            .iter()
            .map(|entry| (*entry, self.fuzzy_score(record, &targeting, entry)))
            .filter(|(_, score)| *score + SCORE_EPSILON >= self.config.min_fuzzy_score)
            .collect();
        let Some(best) = scored.iter().map(|(_, s)| *s).reduce(f64::max) else {
            return Resolution::unmatched(MatchKind::NoMatch);
        };

        let top: Vec<&'a MediaPlanEntry> = scored
            .iter()
            .filter(|(_, score)| (best - score).abs() < SCORE_EPSILON)
            .map(|(entry, _)| *entry)
            .collect();
        if top.len() == 1 {
            debug!(campaign_id = %record.campaign_id, plan_id = top[0].id, score = best, "fuzzy match");
            return Resolution::single(MatchKind::Fuzzy, top[0], Some(best));
        }
        self.resolve_ambiguous(record, &top, MatchKind::Fuzzy, Some(best))
    }

    /// Closest planned budget to actual spend wins; equal distances go to
    /// the lowest plan id.
    fn resolve_ambiguous(
        &self,
        record: &UnifiedCampaignRecord,
        candidates: &[&'a MediaPlanEntry],
        kind: MatchKind,
        score: Option<f64>,
    ) -> Resolution<'a> {
        let spend = record.metrics.spend;
        let chosen = candidates.iter().copied().min_by(|a, b| {
            let da = (a.planned_budget - spend).abs();
            let db = (b.planned_budget - spend).abs();
            da.total_cmp(&db).then(a.id.cmp(&b.id))
        });

        let mut ids: Vec<u64> = candidates.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids.dedup();

        Resolution {
            kind,
            entry: chosen,
            score,
            candidates: ids,
        }
    }

    fn fuzzy_score(&self, record: &UnifiedCampaignRecord, targeting: &str, entry: &MediaPlanEntry) -> f64 {
        let fields = matching_key_fields(record, entry) as f64;
        let overlap = text_overlap(targeting, entry.targeting.as_deref().unwrap_or(""));
        self.config.field_weight * fields + self.config.text_overlap_weight * overlap
    }
}

fn matching_key_fields(record: &UnifiedCampaignRecord, entry: &MediaPlanEntry) -> usize {
    [
        record.restaurant_display == entry.restaurant,
        record.country == entry.country,
        record.campaign_type == entry.campaign_type,
        record.goal == entry.goal,
        record.source == entry.source,
    ]
    .iter()
    .filter(|eq| **eq)
    .count()
}

/// Partial credit in `[0, 1]` for free-text agreement: 1 when one text
/// contains the other, otherwise the Jaccard index of their word sets.
pub fn text_overlap(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 1.0;
    }
    let tokens = |s: &str| -> HashSet<String> {
        s.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    };
    let (ta, tb) = (tokens(&a), tokens(&b));
    let union = ta.union(&tb).count();
    if union == 0 {
        return 0.0;
    }
    ta.intersection(&tb).count() as f64 / union as f64
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::manual::ManualMappingEntry;
    use adrecon_core::types::{CampaignMetrics, CampaignType, Metric, ParsedCampaign, SourceSystem};
    use chrono::NaiveDate;

    fn record(id: &str, spend: f64) -> UnifiedCampaignRecord {
        UnifiedCampaignRecord {
            date: NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(),
            campaign_id: id.into(),
            campaign_name: format!("Instagram|CPM|Almaty|Bella|Interests|{id}"),
            source_system: SourceSystem::Meta,
            parsed: ParsedCampaign {
                platform: "Instagram".into(),
                channel: "CPM".into(),
                city: "Almaty".into(),
                restaurant: "Bella".into(),
                audience_type: "Interests".into(),
                additional: "Birthday".into(),
            },
            campaign_type: CampaignType::Awareness,
            goal: "Охват/Узнаваемость".into(),
            source: "Мета".into(),
            country: "Казахстан".into(),
            restaurant_display: "Белла".into(),
            city_display: "Almaty".into(),
            metrics: CampaignMetrics {
                impressions: 100_000,
                clicks: 800,
                spend,
                orders: 20,
                revenue: 50_000.0,
                ..Default::default()
            },
        }
    }

    fn entry(id: u64, budget: f64) -> MediaPlanEntry {
        MediaPlanEntry {
            id,
            month: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            campaign_type: CampaignType::Awareness,
            goal: "Охват/Узнаваемость".into(),
            restaurant: "Белла".into(),
            country: "Казахстан".into(),
            source: "Мета".into(),
            targeting: None,
            planned_budget: budget,
            planned_impressions: 120_000.0,
            planned_clicks: 1000.0,
            planned_orders: 25.0,
            planned_revenue: 60_000.0,
            planned_installs: 0.0,
        }
    }

    fn plan(entries: Vec<MediaPlanEntry>) -> MediaPlan {
        MediaPlan::new(entries, &RunDiagnostics::default())
    }

    fn manual_to(record: &UnifiedCampaignRecord, plan_id: u64) -> ManualMappingTable {
        let entry = ManualMappingEntry {
            month: "2025-03".into(),
            restaurant: record.restaurant_display.clone(),
            country: record.country.clone(),
            campaign_type: record.campaign_type,
            goal: record.goal.clone(),
            source: record.source.clone(),
            campaign: record.campaign_id.clone(),
            media_plan_id: plan_id,
        };
        ManualMappingTable::from_entries(&[entry], &RunDiagnostics::default())
    }

    #[test]
    fn test_single_exact_match_with_variances() {
        let plan = plan(vec![entry(1, 10_000.0)]);
        let manual = ManualMappingTable::default();
        let config = MatcherConfig::default();
        let matcher = MediaPlanMatcher::new(&plan, &manual, &config);

        let result = matcher.match_record(&record("c1", 9500.0), &RunDiagnostics::default());
        assert!(result.matched);
        assert_eq!(result.media_plan_id, Some(1));
        assert!(!result.is_fuzzy && !result.is_manual && !result.is_ambiguous);
        let spend = &result.variances[&Metric::Spend];
        assert!((spend.absolute_variance + 500.0).abs() < 1e-9);
        assert!((spend.relative_variance_percent.unwrap() + 5.0).abs() < 1e-9);
        assert!(result.variances.contains_key(&Metric::Cpm));
    }

    #[test]
    fn test_manual_overrides_exact() {
        let mut other = entry(2, 500.0);
        other.goal = "Заказы".into();
        let plan = plan(vec![entry(1, 10_000.0), other]);
        let rec = record("c1", 9500.0);
        let manual = manual_to(&rec, 2);
        let config = MatcherConfig::default();
        let matcher = MediaPlanMatcher::new(&plan, &manual, &config);

        let result = matcher.match_record(&rec, &RunDiagnostics::default());
        assert!(result.is_manual);
        assert_eq!(result.media_plan_id, Some(2));
    }

    #[test]
    fn test_dangling_manual_mapping_falls_through() {
        let plan = plan(vec![entry(1, 10_000.0)]);
        let rec = record("c1", 9500.0);
        let manual = manual_to(&rec, 99);
        let config = MatcherConfig::default();
        let matcher = MediaPlanMatcher::new(&plan, &manual, &config);
        let diagnostics = RunDiagnostics::default();

        let result = matcher.match_record(&rec, &diagnostics);
        assert!(!result.is_manual);
        assert_eq!(result.media_plan_id, Some(1));
        assert_eq!(diagnostics.count(DiagnosticKind::DanglingManualMapping), 1);
    }

    #[test]
    fn test_exact_tie_resolved_by_closest_budget() {
        let plan = plan(vec![entry(1, 20_000.0), entry(2, 9_000.0), entry(3, 3_000.0)]);
        let manual = ManualMappingTable::default();
        let config = MatcherConfig::default();
        let matcher = MediaPlanMatcher::new(&plan, &manual, &config);
        let diagnostics = RunDiagnostics::default();

        let result = matcher.match_record(&record("c1", 9500.0), &diagnostics);
        assert!(result.is_ambiguous);
        assert!(!result.is_fuzzy);
        assert_eq!(result.media_plan_id, Some(2));
        assert_eq!(result.ambiguous_candidates, vec![1, 2, 3]);
        assert_eq!(diagnostics.count(DiagnosticKind::AmbiguousMatch), 1);
    }

    #[test]
    fn test_equal_budget_distance_picks_lowest_id() {
        let plan = plan(vec![entry(7, 11_000.0), entry(4, 9_000.0)]);
        let manual = ManualMappingTable::default();
        let config = MatcherConfig::default();
        let matcher = MediaPlanMatcher::new(&plan, &manual, &config);

        let result = matcher.match_record(&record("c1", 10_000.0), &RunDiagnostics::default());
        assert_eq!(result.media_plan_id, Some(4));
        assert!(result.is_ambiguous);
    }

    #[test]
    fn test_fuzzy_match_on_partial_key() {
        let mut partial = entry(5, 8_000.0);
        partial.source = "Google Display".into();
        let mut weak = entry(6, 8_000.0);
        weak.source = "Google Display".into();
        weak.goal = "Заказы".into();
        weak.country = "Узбекистан".into();
        let plan = plan(vec![partial, weak]);
        let manual = ManualMappingTable::default();
        let config = MatcherConfig::default();
        let matcher = MediaPlanMatcher::new(&plan, &manual, &config);

        let result = matcher.match_record(&record("c1", 9500.0), &RunDiagnostics::default());
        assert!(result.matched && result.is_fuzzy && !result.is_ambiguous);
        assert_eq!(result.media_plan_id, Some(5));
        assert!((result.match_score.unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_targeting_overlap_breaks_fuzzy_tie() {
        let mut a = entry(1, 9_500.0);
        a.source = "Google Display".into();
        a.targeting = Some("Lookalike".into());
        let mut b = entry(2, 1_000.0);
        b.source = "Google Display".into();
        b.targeting = Some("interests birthday".into());
        let plan = plan(vec![a, b]);
        let manual = ManualMappingTable::default();
        let config = MatcherConfig::default();
        let matcher = MediaPlanMatcher::new(&plan, &manual, &config);

        let result = matcher.match_record(&record("c1", 9500.0), &RunDiagnostics::default());
        assert_eq!(result.media_plan_id, Some(2));
        assert!(!result.is_ambiguous);
        assert!((result.match_score.unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_fuzzy_tie_is_ambiguous() {
        let mut low = entry(1, 2_000.0);
        low.source = "Google Display".into();
        let mut close = entry(2, 9_000.0);
        close.source = "Google Display".into();
        let plan = plan(vec![low, close]);
        let manual = ManualMappingTable::default();
        let config = MatcherConfig::default();
        let matcher = MediaPlanMatcher::new(&plan, &manual, &config);
        let diagnostics = RunDiagnostics::default();

        let result = matcher.match_record(&record("c1", 9500.0), &diagnostics);
        assert!(result.matched && result.is_fuzzy && result.is_ambiguous);
        assert_eq!(result.media_plan_id, Some(2));
        assert_eq!(result.ambiguous_candidates, vec![1, 2]);
        assert_eq!(diagnostics.count(DiagnosticKind::AmbiguousMatch), 1);
    }

    #[test]
    fn test_below_threshold_and_missing_month_are_unmatched() {
        let mut far = entry(1, 10_000.0);
        far.goal = "Заказы".into();
        far.source = "Google Search".into();
        far.country = "Узбекистан".into();
        let plan = plan(vec![far]);
        let manual = ManualMappingTable::default();
        let config = MatcherConfig::default();
        let matcher = MediaPlanMatcher::new(&plan, &manual, &config);
        let diagnostics = RunDiagnostics::default();

        let result = matcher.match_record(&record("c1", 9500.0), &diagnostics);
        assert!(!result.matched);
        assert_eq!(result.media_plan_id, None);
        assert!(result.variances.is_empty());
        assert_eq!(diagnostics.count(DiagnosticKind::NoMatchFound), 1);

        let mut april = record("c2", 100.0);
        april.date = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let result = matcher.match_record(&april, &diagnostics);
        assert!(!result.matched);
        assert_eq!(diagnostics.count(DiagnosticKind::NoPlanForMonth), 1);
    }

    #[test]
    fn test_match_all_keeps_order_and_counts() {
        let plan = plan(vec![entry(1, 10_000.0)]);
        let manual = ManualMappingTable::default();
        let config = MatcherConfig::default();
        let matcher = MediaPlanMatcher::new(&plan, &manual, &config);

        let mut april = record("c3", 100.0);
        april.date = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let records = vec![record("c1", 1.0), record("c2", 2.0), april];
        let outcome = matcher.match_all(&records, &RunDiagnostics::default());

        let ids: Vec<&str> = outcome
            .results
            .iter()
            .map(|r| r.campaign.campaign_id.as_str())
            .collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert_eq!(outcome.stats.total, 3);
        assert_eq!(outcome.stats.exact, 2);
        assert_eq!(outcome.stats.unmatched, 1);
        assert_eq!(outcome.stats.no_plan_for_month, 1);
    }

    #[test]
    fn test_text_overlap() {
        assert_eq!(text_overlap("Interests Birthday", ""), 0.0);
        assert_eq!(text_overlap("Interests Birthday", "birthday"), 1.0);
        assert!((text_overlap("app install ios", "install android") - 0.25).abs() < 1e-9);
    }
}
