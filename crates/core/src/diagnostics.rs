//! Run-level collector for per-record problems.
//!
//! Nothing a single record does may abort a batch. Components report what
//! they had to degrade, default or skip here instead, and the run report
//! carries a [`DiagnosticsSummary`] so operators can see counts per kind and
//! a bounded sample of offending raw values.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    ParseDegraded,
    UnmappedValue,
    NoPlanForMonth,
    NoMatchFound,
    AmbiguousMatch,
    MalformedPlanEntry,
    DivisionUndefined,
    DanglingManualMapping,
    DuplicateCampaignDay,
    DuplicateTransaction,
    MissingTransactionId,
    InvalidPromoRow,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseDegraded => "parse_degraded",
            Self::UnmappedValue => "unmapped_value",
            Self::NoPlanForMonth => "no_plan_for_month",
            Self::NoMatchFound => "no_match_found",
            Self::AmbiguousMatch => "ambiguous_match",
            Self::MalformedPlanEntry => "malformed_plan_entry",
            Self::DivisionUndefined => "division_undefined",
            Self::DanglingManualMapping => "dangling_manual_mapping",
            Self::DuplicateCampaignDay => "duplicate_campaign_day",
            Self::DuplicateTransaction => "duplicate_transaction",
            Self::MissingTransactionId => "missing_transaction_id",
            Self::InvalidPromoRow => "invalid_promo_row",
        }
    }

    /// Expected outcomes that are logged at debug rather than warn.
    fn is_routine(&self) -> bool {
        matches!(
            self,
            Self::NoPlanForMonth
                | Self::NoMatchFound
                | Self::DivisionUndefined
                | Self::MissingTransactionId
        )
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct KindEntry {
    count: u64,
    samples: Vec<String>,
}

/// Concurrent diagnostics collector shared by reference across workers.
#[derive(Debug)]
pub struct RunDiagnostics {
    entries: DashMap<DiagnosticKind, KindEntry>,
    sample_limit: usize,
}

impl RunDiagnostics {
    pub fn new(sample_limit: usize) -> Self {
        Self {
            entries: DashMap::new(),
            sample_limit,
        }
    }

    /// Record one occurrence of `kind` with the offending raw value.
    pub fn record(&self, kind: DiagnosticKind, detail: impl Into<String>) {
        let detail = detail.into();
        if kind.is_routine() {
            tracing::debug!(kind = %kind, detail = %detail, "diagnostic");
        } else {
            warn!(kind = %kind, detail = %detail, "diagnostic");
        }
        metrics::counter!("diagnostics.recorded", "kind" => kind.as_str()).increment(1);

        let mut entry = self.entries.entry(kind).or_default();
        entry.count += 1;
        if entry.samples.len() < self.sample_limit && !entry.samples.contains(&detail) {
            entry.samples.push(detail);
        }
    }

    pub fn count(&self, kind: DiagnosticKind) -> u64 {
        self.entries.get(&kind).map(|e| e.count).unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|e| e.value().count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ordered, serializable snapshot of everything recorded so far.
    pub fn summary(&self) -> DiagnosticsSummary {
        let kinds: BTreeMap<DiagnosticKind, KindSummary> = self
            .entries
            .iter()
            .map(|e| {
                let mut samples = e.value().samples.clone();
                samples.sort();
                (
                    *e.key(),
                    KindSummary {
                        count: e.value().count,
                        samples,
                    },
                )
            })
            .collect();
        DiagnosticsSummary {
            total: kinds.values().map(|k| k.count).sum(),
            kinds,
        }
    }
}

impl Default for RunDiagnostics {
    fn default() -> Self {
        Self::new(20)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSummary {
    pub count: u64,
    pub samples: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsSummary {
    pub total: u64,
    pub kinds: BTreeMap<DiagnosticKind, KindSummary>,
}

impl DiagnosticsSummary {
    pub fn count(&self, kind: DiagnosticKind) -> u64 {
        self.kinds.get(&kind).map(|k| k.count).unwrap_or(0)
    }
}
