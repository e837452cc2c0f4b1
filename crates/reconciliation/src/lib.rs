#![warn(clippy::unwrap_used)]

//! Plan-versus-actual reconciliation: media-plan loading, manual
//! overrides, campaign-to-plan matching and variance arithmetic.

pub mod manual;
pub mod matcher;
pub mod plan;
pub mod variance;

pub use manual::{ManualMappingEntry, ManualMappingTable};
pub use matcher::{MatchOutcome, MatchStats, MediaPlanMatcher};
pub use plan::{MediaPlan, MediaPlanRow};
