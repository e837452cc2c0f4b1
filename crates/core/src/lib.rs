#![warn(clippy::unwrap_used)]

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod tables;
pub mod types;

pub use config::AppConfig;
pub use diagnostics::{DiagnosticKind, DiagnosticsSummary, RunDiagnostics};
pub use error::{EngineError, EngineResult};
pub use tables::{GoalRule, LookupTables};
