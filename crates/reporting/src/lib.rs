#![warn(clippy::unwrap_used)]

//! Reconciliation reporting: plan-versus-fact aggregates per dimension and
//! period-over-period performance comparison with significance tests.

pub mod dimensions;
pub mod performance;
pub mod stats;

pub use dimensions::{DimensionAggregate, DimensionAnalysis, MultiDimensionalAnalyzer, UnmatchedSummary};
pub use performance::{
    previous_month, ComparisonSummary, GroupComparison, MetricComparison, Observation,
    PerformanceAnalyzer, PeriodComparison, PeriodData,
};
