//! Fact-versus-plan deviation arithmetic.
//!
//! A relative variance against a zero plan is undefined and stays `None`;
//! it is never reported as 0 or infinity. Derived metrics are compared on
//! their own values, computed from each side's totals.

use adrecon_core::types::{Metric, MetricTotals, VarianceRecord};
use std::collections::BTreeMap;

pub fn variance(metric: Metric, fact: f64, plan: f64) -> VarianceRecord {
    let absolute_variance = fact - plan;
    VarianceRecord {
        metric,
        fact,
        plan,
        absolute_variance,
        relative_variance_percent: if plan == 0.0 {
            None
        } else {
            Some(absolute_variance / plan * 100.0)
        },
    }
}

/// Variances for every metric in `metrics` that is defined on both sides.
pub fn compare_totals(
    fact: &MetricTotals,
    plan: &MetricTotals,
    metrics: &[Metric],
) -> BTreeMap<Metric, VarianceRecord> {
    metrics
        .iter()
        .filter_map(|&metric| match (fact.value(metric), plan.value(metric)) {
            (Some(f), Some(p)) => Some((metric, variance(metric, f, p))),
            _ => None,
        })
        .collect()
}

/// Base and derived metric variances.
pub fn compare_all(fact: &MetricTotals, plan: &MetricTotals) -> BTreeMap<Metric, VarianceRecord> {
    compare_totals(fact, plan, &Metric::ALL)
}

/// Metrics whose relative variance is undefined because the plan is zero.
pub fn undefined_relative(variances: &BTreeMap<Metric, VarianceRecord>) -> Vec<Metric> {
    variances
        .values()
        .filter(|v| v.relative_variance_percent.is_none())
        .map(|v| v.metric)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_under_plan_spend() {
        let v = variance(Metric::Spend, 9500.0, 10000.0);
        assert!((v.absolute_variance + 500.0).abs() < EPS);
        assert!((v.relative_variance_percent.unwrap() + 5.0).abs() < EPS);
    }

    #[test]
    fn test_zero_plan_relative_is_undefined() {
        let v = variance(Metric::Orders, 12.0, 0.0);
        assert!((v.absolute_variance - 12.0).abs() < EPS);
        assert_eq!(v.relative_variance_percent, None);
    }

    #[test]
    fn test_derived_compared_on_own_values() {
        let fact = MetricTotals {
            spend: 1200.0,
            impressions: 200_000.0,
            clicks: 400.0,
            orders: 30.0,
            revenue: 24_000.0,
            installs: 0.0,
        };
        let plan = MetricTotals {
            spend: 1000.0,
            impressions: 250_000.0,
            clicks: 500.0,
            orders: 25.0,
            revenue: 0.0,
            installs: 0.0,
        };
        let variances = compare_all(&fact, &plan);

        // fact CPM 6.0 vs plan CPM 4.0
        let cpm = &variances[&Metric::Cpm];
        assert!((cpm.fact - 6.0).abs() < EPS);
        assert!((cpm.plan - 4.0).abs() < EPS);
        assert!((cpm.relative_variance_percent.unwrap() - 50.0).abs() < EPS);

        // plan revenue 0 leaves plan DRR undefined
        assert!(!variances.contains_key(&Metric::Drr));
        assert_eq!(undefined_relative(&variances), vec![Metric::Revenue]);
        assert_eq!(variances.len(), 9);
    }
}
