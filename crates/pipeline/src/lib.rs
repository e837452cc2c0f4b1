#![warn(clippy::unwrap_used)]

//! Run orchestration: loads inputs from a [`RecordStore`], drives the
//! attribution and reconciliation stages, and persists the reports.

pub mod run;
pub mod store;

pub use run::{DailyRun, DailyRunReport, Engine, MonthlyComparison, MonthlyComparisonReport};
pub use store::{JsonDirStore, MemoryStore, RecordStore};
