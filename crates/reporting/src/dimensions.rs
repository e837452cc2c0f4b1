//! Plan-versus-fact roll-ups per reporting dimension.

use adrecon_core::types::{Dimension, MatchResult, Metric, MetricTotals, VarianceRecord};
use adrecon_reconciliation::variance::compare_all;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// `fact` sums every matched record in the group. `plan` counts each distinct
/// plan line once per group, so campaign-days sharing a monthly line do not
/// multiply its budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionAggregate {
    pub dimension: Dimension,
    pub dimension_value: String,
    pub period: NaiveDate,
    pub record_count: usize,
    pub fact: MetricTotals,
    pub plan: MetricTotals,
    pub aggregated_variances: BTreeMap<Metric, VarianceRecord>,
}

/// Unmatched records are kept out of every aggregate and reported here so
/// totals stay auditable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedSummary {
    pub record_count: usize,
    pub fact: MetricTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionAnalysis {
    pub period: NaiveDate,
    pub dimensions: Vec<Dimension>,
    /// Sorted by dimension, then value.
    pub aggregates: Vec<DimensionAggregate>,
    pub unmatched: UnmatchedSummary,
}

impl DimensionAnalysis {
    pub fn for_dimension(&self, dimension: Dimension) -> impl Iterator<Item = &DimensionAggregate> {
        self.aggregates
            .iter()
            .filter(move |a| a.dimension == dimension)
    }
}

#[derive(Default)]
struct GroupAccumulator {
    record_count: usize,
    fact: MetricTotals,
    plan: MetricTotals,
    plan_ids: HashSet<u64>,
}

impl GroupAccumulator {
    fn add(&mut self, result: &MatchResult) {
        self.record_count += 1;
        self.fact.add(&result.fact);
        // A monthly plan line matched by many campaign-days counts once.
        if let (Some(id), Some(plan)) = (result.media_plan_id, &result.plan) {
            if self.plan_ids.insert(id) {
                self.plan.add(plan);
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MultiDimensionalAnalyzer;

impl MultiDimensionalAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(
        &self,
        results: &[MatchResult],
        dimensions: &[Dimension],
        period: NaiveDate,
    ) -> DimensionAnalysis {
        let mut unmatched = UnmatchedSummary::default();
        for result in results.iter().filter(|r| !r.matched) {
            unmatched.record_count += 1;
            unmatched.fact.add(&result.fact);
        }

        let mut aggregates: Vec<DimensionAggregate> = dimensions
            .par_iter()
            .flat_map_iter(|&dimension| Self::aggregate_dimension(results, dimension, period))
            .collect();
        aggregates.sort_by(|a, b| {
            a.dimension
                .cmp(&b.dimension)
                .then_with(|| a.dimension_value.cmp(&b.dimension_value))
        });

        info!(
            period = %period,
            dimensions = dimensions.len(),
            aggregates = aggregates.len(),
            unmatched = unmatched.record_count,
            "Aggregated match results by dimension"
        );

        DimensionAnalysis {
            period,
            dimensions: dimensions.to_vec(),
            aggregates,
            unmatched,
        }
    }

    fn aggregate_dimension(
        results: &[MatchResult],
        dimension: Dimension,
        period: NaiveDate,
    ) -> Vec<DimensionAggregate> {
        let mut groups: BTreeMap<String, GroupAccumulator> = BTreeMap::new();
        for result in results.iter().filter(|r| r.matched) {
            groups
                .entry(dimension.value_of(&result.campaign))
                .or_default()
                .add(result);
        }

        groups
            .into_iter()
            .map(|(value, group)| DimensionAggregate {
                dimension,
                dimension_value: value,
                period,
                record_count: group.record_count,
                aggregated_variances: compare_all(&group.fact, &group.plan),
                fact: group.fact,
                plan: group.plan,
            })
            .collect()
    }
}
