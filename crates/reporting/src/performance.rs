//! Period-over-period comparison with significance testing.
//!
//! Groups are keyed by the ordered values of the requested dimensions.
//! Derived metrics are recomputed from each group's summed totals, and the
//! significance test runs over the group's daily values within each period.

use crate::stats::welch_t_test;
use adrecon_core::config::PerformanceConfig;
use adrecon_core::types::{
    CampaignRef, Dimension, Metric, MetricTotals, Polarity, UnifiedCampaignRecord,
};
use adrecon_reconciliation::variance::variance;
use chrono::{Datelike, Months, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

const CHANGE_EPSILON: f64 = 1e-9;

/// One campaign-day contributing to a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub campaign: CampaignRef,
    pub totals: MetricTotals,
}

impl From<&UnifiedCampaignRecord> for Observation {
    fn from(record: &UnifiedCampaignRecord) -> Self {
        Self {
            campaign: CampaignRef::from(record),
            totals: record.metrics.totals(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodData {
    pub label: String,
    pub observations: Vec<Observation>,
}

impl PeriodData {
    pub fn new(label: impl Into<String>, observations: Vec<Observation>) -> Self {
        Self {
            label: label.into(),
            observations,
        }
    }

    pub fn from_records(label: impl Into<String>, records: &[UnifiedCampaignRecord]) -> Self {
        Self::new(label, records.iter().map(Observation::from).collect())
    }
}

/// First day of the calendar month before `month`.
pub fn previous_month(month: NaiveDate) -> NaiveDate {
    let start = NaiveDate::from_ymd_opt(month.year(), month.month(), 1).unwrap_or(month);
    start.checked_sub_months(Months::new(1)).unwrap_or(start)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increased,
    Decreased,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    Improved,
    Worsened,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub metric: Metric,
    /// Absent when the group has no data in the period or the derived
    /// value is undefined there.
    pub current: Option<f64>,
    pub previous: Option<f64>,
    pub absolute_change: Option<f64>,
    pub relative_change_percent: Option<f64>,
    pub trend: Option<Trend>,
    pub assessment: Option<Assessment>,
    pub p_value: Option<f64>,
    pub t_statistic: Option<f64>,
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupComparison {
    /// Values in the order of `PeriodComparison::dimensions`.
    pub group: Vec<String>,
    pub current: Option<MetricTotals>,
    pub previous: Option<MetricTotals>,
    pub current_days: usize,
    pub previous_days: usize,
    pub metrics: BTreeMap<Metric, MetricComparison>,
}

impl GroupComparison {
    pub fn label(&self) -> String {
        self.group.join(" / ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub increased: usize,
    pub decreased: usize,
    pub unchanged: usize,
    pub improved: usize,
    pub worsened: usize,
    pub significant: usize,
    /// Mean of the per-group values in each period.
    pub current_average: Option<f64>,
    pub previous_average: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub total_groups: usize,
    pub groups_in_both: usize,
    pub only_current: usize,
    pub only_previous: usize,
    pub metrics: BTreeMap<Metric, MetricSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodComparison {
    pub current_period: String,
    pub previous_period: String,
    pub dimensions: Vec<Dimension>,
    pub metrics: Vec<Metric>,
    pub groups: Vec<GroupComparison>,
    pub summary: ComparisonSummary,
}

#[derive(Default)]
struct GroupSide {
    totals: MetricTotals,
    daily: BTreeMap<NaiveDate, MetricTotals>,
}

impl GroupSide {
    fn series(&self, metric: Metric) -> Vec<f64> {
        self.daily.values().filter_map(|t| t.value(metric)).collect()
    }
}

fn group_period(
    observations: &[Observation],
    dimensions: &[Dimension],
) -> BTreeMap<Vec<String>, GroupSide> {
    let mut groups: BTreeMap<Vec<String>, GroupSide> = BTreeMap::new();
    for obs in observations {
        let key: Vec<String> = dimensions.iter().map(|d| d.value_of(&obs.campaign)).collect();
        let side = groups.entry(key).or_default();
        side.totals.add(&obs.totals);
        side.daily.entry(obs.campaign.date).or_default().add(&obs.totals);
    }
    groups
}

pub struct PerformanceAnalyzer<'a> {
    config: &'a PerformanceConfig,
}

impl<'a> PerformanceAnalyzer<'a> {
    pub fn new(config: &'a PerformanceConfig) -> Self {
        Self { config }
    }

    pub fn compare(
        &self,
        current: &PeriodData,
        previous: &PeriodData,
        dimensions: &[Dimension],
        metrics: &[Metric],
    ) -> PeriodComparison {
        let current_groups = group_period(&current.observations, dimensions);
        let previous_groups = group_period(&previous.observations, dimensions);

        let mut keys: Vec<&Vec<String>> =
            current_groups.keys().chain(previous_groups.keys()).collect();
        keys.sort();
        keys.dedup();

        let groups: Vec<GroupComparison> = keys
            .par_iter()
            .map(|key| {
                self.compare_group(
                    key,
                    current_groups.get(*key),
                    previous_groups.get(*key),
                    metrics,
                )
            })
            .collect();

        let summary = summarize(&groups, metrics);
        info!(
            current = %current.label,
            previous = %previous.label,
            groups = summary.total_groups,
            in_both = summary.groups_in_both,
            "Compared periods"
        );

        PeriodComparison {
            current_period: current.label.clone(),
            previous_period: previous.label.clone(),
            dimensions: dimensions.to_vec(),
            metrics: metrics.to_vec(),
            groups,
            summary,
        }
    }

    fn compare_group(
        &self,
        key: &[String],
        current: Option<&GroupSide>,
        previous: Option<&GroupSide>,
        metrics: &[Metric],
    ) -> GroupComparison {
        let metrics = metrics
            .iter()
            .map(|&metric| (metric, self.compare_metric(metric, current, previous)))
            .collect();

        GroupComparison {
            group: key.to_vec(),
            current: current.map(|s| s.totals),
            previous: previous.map(|s| s.totals),
            current_days: current.map(|s| s.daily.len()).unwrap_or(0),
            previous_days: previous.map(|s| s.daily.len()).unwrap_or(0),
            metrics,
        }
    }

    fn compare_metric(
        &self,
        metric: Metric,
        current: Option<&GroupSide>,
        previous: Option<&GroupSide>,
    ) -> MetricComparison {
        let current_value = current.and_then(|s| s.totals.value(metric));
        let previous_value = previous.and_then(|s| s.totals.value(metric));

        let mut comparison = MetricComparison {
            metric,
            current: current_value,
            previous: previous_value,
            absolute_change: None,
            relative_change_percent: None,
            trend: None,
            assessment: None,
            p_value: None,
            t_statistic: None,
            significant: false,
        };

        let (Some(cur), Some(prev)) = (current_value, previous_value) else {
            return comparison;
        };
        let change = variance(metric, cur, prev);
        let trend = if change.absolute_variance.abs() < CHANGE_EPSILON {
            Trend::Unchanged
        } else if change.absolute_variance > 0.0 {
            Trend::Increased
        } else {
            Trend::Decreased
        };
        comparison.absolute_change = Some(change.absolute_variance);
        comparison.relative_change_percent = change.relative_variance_percent;
        comparison.trend = Some(trend);
        comparison.assessment = Some(assess(metric.polarity(), trend));

        if let (Some(cur_side), Some(prev_side)) = (current, previous) {
            let a = cur_side.series(metric);
            let b = prev_side.series(metric);
            let min = self.config.min_samples.max(2);
            if a.len() >= min && b.len() >= min {
                if let Some(test) = welch_t_test(&a, &b) {
                    comparison.p_value = Some(test.p_value);
                    comparison.t_statistic = test.t_statistic;
                    comparison.significant = test.p_value < self.config.significance_level;
                }
            }
        }
        comparison
    }
}

fn assess(polarity: Polarity, trend: Trend) -> Assessment {
    match (polarity, trend) {
        (_, Trend::Unchanged) | (Polarity::Neutral, _) => Assessment::Neutral,
        (Polarity::HigherIsBetter, Trend::Increased) | (Polarity::LowerIsBetter, Trend::Decreased) => {
            Assessment::Improved
        }
        _ => Assessment::Worsened,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn summarize(groups: &[GroupComparison], metrics: &[Metric]) -> ComparisonSummary {
    let mut summary = ComparisonSummary {
        total_groups: groups.len(),
        ..Default::default()
    };
    for group in groups {
        match (group.current.is_some(), group.previous.is_some()) {
            (true, true) => summary.groups_in_both += 1,
            (true, false) => summary.only_current += 1,
            (false, true) => summary.only_previous += 1,
            (false, false) => {}
        }
    }

    for &metric in metrics {
        let mut entry = MetricSummary::default();
        let mut current_values = Vec::new();
        let mut previous_values = Vec::new();
        for cmp in groups.iter().filter_map(|g| g.metrics.get(&metric)) {
            current_values.extend(cmp.current);
            previous_values.extend(cmp.previous);
            match cmp.trend {
                Some(Trend::Increased) => entry.increased += 1,
                Some(Trend::Decreased) => entry.decreased += 1,
                Some(Trend::Unchanged) => entry.unchanged += 1,
                None => {}
            }
            match cmp.assessment {
                Some(Assessment::Improved) => entry.improved += 1,
                Some(Assessment::Worsened) => entry.worsened += 1,
                _ => {}
            }
            if cmp.significant {
                entry.significant += 1;
            }
        }
        entry.current_average = mean(&current_values);
        entry.previous_average = mean(&previous_values);
        summary.metrics.insert(metric, entry);
    }
    summary
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use adrecon_core::types::CampaignType;

    fn obs(day: NaiveDate, source: &str, spend: f64, orders: f64) -> Observation {
        Observation {
            campaign: CampaignRef {
                campaign_id: format!("{source}-1"),
                campaign_name: String::new(),
                date: day,
                restaurant: "Белла".into(),
                country: "Казахстан".into(),
                city: "Almaty".into(),
                campaign_type: CampaignType::Performance,
                goal: "Заказы".into(),
                source: source.into(),
            },
            totals: MetricTotals {
                spend,
                impressions: spend * 100.0,
                clicks: spend / 5.0,
                orders,
                revenue: orders * 2500.0,
                installs: 0.0,
            },
        }
    }

    fn month(year: i32, month: u32, source: &str, spend: impl Fn(u32) -> f64, orders: f64) -> Vec<Observation> {
        (1..=14)
            .map(|d| {
                let day = NaiveDate::from_ymd_opt(year, month, d).unwrap();
                obs(day, source, spend(d), orders)
            })
            .collect()
    }

    #[test]
    fn test_consistent_shift_is_significant() {
        let config = PerformanceConfig::default();
        let analyzer = PerformanceAnalyzer::new(&config);
        let wobble = |d: u32| (d % 3) as f64;
        let previous = PeriodData::new("2025-02", month(2025, 2, "Мета", |d| 1000.0 + wobble(d), 10.0));
        let current = PeriodData::new("2025-03", month(2025, 3, "Мета", |d| 1500.0 + wobble(d), 10.0));

        let cmp = analyzer.compare(&current, &previous, &[Dimension::Source], &[Metric::Spend, Metric::Cpo]);
        assert_eq!(cmp.groups.len(), 1);
        let spend = &cmp.groups[0].metrics[&Metric::Spend];
        assert!(spend.significant);
        assert!(spend.p_value.unwrap() < 0.001);
        assert_eq!(spend.trend, Some(Trend::Increased));
        assert_eq!(spend.assessment, Some(Assessment::Neutral));

        let cpo = &cmp.groups[0].metrics[&Metric::Cpo];
        assert_eq!(cpo.assessment, Some(Assessment::Worsened));
        assert_eq!(cmp.summary.metrics[&Metric::Cpo].worsened, 1);
    }

    #[test]
    fn test_near_identical_periods_not_significant() {
        let config = PerformanceConfig::default();
        let analyzer = PerformanceAnalyzer::new(&config);
        let previous = PeriodData::new("2025-02", month(2025, 2, "Мета", |d| 1000.0 + (d % 4) as f64, 10.0));
        let current = PeriodData::new("2025-03", month(2025, 3, "Мета", |d| 1000.0 + ((d + 2) % 4) as f64, 10.0));

        let cmp = analyzer.compare(&current, &previous, &[Dimension::Source], &[Metric::Spend]);
        let spend = &cmp.groups[0].metrics[&Metric::Spend];
        assert!(!spend.significant);
        assert!(spend.p_value.unwrap() > 0.05);
    }

    #[test]
    fn test_group_in_one_period_has_absent_side() {
        let config = PerformanceConfig::default();
        let analyzer = PerformanceAnalyzer::new(&config);
        let previous = PeriodData::new("2025-02", month(2025, 2, "Мета", |_| 1000.0, 10.0));
        let mut current_obs = month(2025, 3, "Мета", |_| 1000.0, 10.0);
        current_obs.extend(month(2025, 3, "Google Search", |_| 300.0, 3.0));
        let current = PeriodData::new("2025-03", current_obs);

        let cmp = analyzer.compare(&current, &previous, &[Dimension::Source], &[Metric::Orders]);
        let search = cmp.groups.iter().find(|g| g.group == vec!["Google Search".to_string()]).unwrap();
        assert!(search.previous.is_none());
        let orders = &search.metrics[&Metric::Orders];
        assert_eq!(orders.previous, None);
        assert_eq!(orders.absolute_change, None);
        assert_eq!(orders.p_value, None);
        assert!(!orders.significant);

        assert_eq!(cmp.summary.total_groups, 2);
        assert_eq!(cmp.summary.groups_in_both, 1);
        assert_eq!(cmp.summary.only_current, 1);
        let orders_summary = &cmp.summary.metrics[&Metric::Orders];
        assert_eq!(orders_summary.unchanged, 1);
        // (140 + 42) / 2 groups
        assert!((orders_summary.current_average.unwrap() - 91.0).abs() < 1e-9);
        assert!((orders_summary.previous_average.unwrap() - 140.0).abs() < 1e-9);
    }

    #[test]
    fn test_multi_dimension_keys_are_ordered() {
        let config = PerformanceConfig::default();
        let analyzer = PerformanceAnalyzer::new(&config);
        let previous = PeriodData::new("2025-02", month(2025, 2, "Мета", |_| 1.0, 1.0));
        let current = PeriodData::new("2025-03", month(2025, 3, "Мета", |_| 1.0, 1.0));
        let cmp = analyzer.compare(
            &current,
            &previous,
            &[Dimension::Country, Dimension::Source],
            &[Metric::Spend],
        );
        assert_eq!(cmp.groups[0].label(), "Казахстан / Мета");
        assert_eq!(cmp.groups[0].current_days, 14);
    }

    #[test]
    fn test_previous_month() {
        let march = NaiveDate::from_ymd_opt(2025, 3, 17).unwrap();
        assert_eq!(previous_month(march), NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        let january = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(previous_month(january), NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
    }
}
