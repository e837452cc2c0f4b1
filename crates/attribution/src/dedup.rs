use adrecon_core::tables::LookupTables;
use adrecon_core::types::{
    AttributedOrder, AttributionSource, ConversionRecord, PromoOrderRecord,
};
use adrecon_core::{DiagnosticKind, RunDiagnostics};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::info;

const DIRECT: &str = "direct";

/// Anything that can be (re-)attributed: raw analytics conversions and
/// already annotated orders alike, so a second pass over the output is a
/// no-op.
pub trait ConversionLike {
    fn order_id(&self) -> &str;
    fn transaction_id(&self) -> Option<&str>;
    fn date(&self) -> NaiveDate;
    fn revenue(&self) -> f64;
    fn source_medium(&self) -> Option<&str>;
}

impl ConversionLike for ConversionRecord {
    fn order_id(&self) -> &str {
        &self.order_id
    }
    fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }
    fn date(&self) -> NaiveDate {
        self.date
    }
    fn revenue(&self) -> f64 {
        self.revenue
    }
    fn source_medium(&self) -> Option<&str> {
        self.source_medium.as_deref()
    }
}

impl ConversionLike for AttributedOrder {
    fn order_id(&self) -> &str {
        &self.order_id
    }
    fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }
    fn date(&self) -> NaiveDate {
        self.date
    }
    fn revenue(&self) -> f64 {
        self.revenue
    }
    fn source_medium(&self) -> Option<&str> {
        self.source_medium.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupStats {
    pub total_conversions: usize,
    pub total_promo_orders: usize,
    pub promo_attributed: usize,
    pub utm_attributed: usize,
    pub missing_transaction_id: usize,
    pub duplicate_transactions: usize,
    pub promo_revenue: f64,
    pub utm_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupOutcome {
    pub orders: Vec<AttributedOrder>,
    pub stats: DedupStats,
}

/// Assigns every conversion exactly one attribution source: the promo code
/// when its transaction id appears in the promo sheet, UTM otherwise.
pub struct OrderDeduplicator<'a> {
    channels: &'a BTreeMap<String, String>,
}

impl<'a> OrderDeduplicator<'a> {
    pub fn new(tables: &'a LookupTables) -> Self {
        Self {
            channels: &tables.source_medium_channels,
        }
    }

    pub fn deduplicate<C: ConversionLike>(
        &self,
        conversions: &[C],
        promo_orders: &[PromoOrderRecord],
        diagnostics: &RunDiagnostics,
    ) -> DedupOutcome {
        // Transaction id -> promo code; the first sheet row for an id wins.
        let mut promo_codes: HashMap<&str, &str> = HashMap::with_capacity(promo_orders.len());
        for promo in promo_orders {
            if let Some(tx) = normalize_id(promo.transaction_id.as_deref()) {
                promo_codes.entry(tx).or_insert(promo.promo_code.as_str());
            }
        }

        let mut stats = DedupStats {
            total_conversions: conversions.len(),
            total_promo_orders: promo_orders.len(),
            ..Default::default()
        };
        let mut seen: HashSet<&str> = HashSet::with_capacity(conversions.len());
        let mut orders = Vec::with_capacity(conversions.len());

        for conversion in conversions {
            let transaction_id = normalize_id(conversion.transaction_id());
            match transaction_id {
                None => {
                    stats.missing_transaction_id += 1;
                    diagnostics.record(
                        DiagnosticKind::MissingTransactionId,
                        conversion.order_id().to_string(),
                    );
                }
                Some(tx) if !seen.insert(tx) => {
                    stats.duplicate_transactions += 1;
                    diagnostics.record(DiagnosticKind::DuplicateTransaction, tx.to_string());
                    continue;
                }
                Some(_) => {}
            }

            let promo_code = transaction_id.and_then(|tx| promo_codes.get(tx)).copied();
            let order = match promo_code {
                Some(code) => {
                    stats.promo_attributed += 1;
                    stats.promo_revenue += conversion.revenue();
                    self.annotate(conversion, transaction_id, Some(code))
                }
                None => {
                    stats.utm_attributed += 1;
                    stats.utm_revenue += conversion.revenue();
                    self.annotate(conversion, transaction_id, None)
                }
            };
            orders.push(order);
        }

        metrics::counter!("dedup.promo_attributed").increment(stats.promo_attributed as u64);
        metrics::counter!("dedup.utm_attributed").increment(stats.utm_attributed as u64);
        info!(
            conversions = stats.total_conversions,
            promo_orders = stats.total_promo_orders,
            promo_attributed = stats.promo_attributed,
            utm_attributed = stats.utm_attributed,
            "Deduplicated orders"
        );

        DedupOutcome { orders, stats }
    }

    fn annotate<C: ConversionLike>(
        &self,
        conversion: &C,
        transaction_id: Option<&str>,
        promo_code: Option<&str>,
    ) -> AttributedOrder {
        let is_promo_order = promo_code.is_some();
        AttributedOrder {
            order_id: conversion.order_id().to_string(),
            transaction_id: transaction_id.map(str::to_string),
            date: conversion.date(),
            revenue: conversion.revenue(),
            source_medium: conversion.source_medium().map(str::to_string),
            is_promo_order,
            attribution_source: if is_promo_order {
                AttributionSource::PromoCode
            } else {
                AttributionSource::UtmAttribution
            },
            promo_code: promo_code.map(str::to_string),
            utm_channel: if is_promo_order {
                None
            } else {
                Some(self.utm_channel(conversion.source_medium()))
            },
        }
    }

    /// Standardized channel for a GA-style `source / medium` pair.
    pub fn utm_channel(&self, source_medium: Option<&str>) -> String {
        let Some(raw) = source_medium.map(str::trim).filter(|s| !s.is_empty()) else {
            return DIRECT.to_string();
        };
        let parts: Vec<String> = raw.split('/').map(|p| p.trim().to_lowercase()).collect();
        let key = parts.join(" / ");
        if let Some(channel) = self.channels.get(&key) {
            return channel.clone();
        }
        match parts.first().filter(|s| !s.is_empty()) {
            Some(source) => source.clone(),
            None => DIRECT.to_string(),
        }
    }
}

fn normalize_id(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|id| !id.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn conversion(order: &str, tx: Option<&str>, source_medium: Option<&str>) -> ConversionRecord {
        ConversionRecord {
            order_id: order.into(),
            transaction_id: tx.map(str::to_string),
            date: date(),
            revenue: 1000.0,
            source_medium: source_medium.map(str::to_string),
            campaign: None,
        }
    }

    fn promo(tx: &str, code: &str) -> PromoOrderRecord {
        PromoOrderRecord {
            order_id: tx.into(),
            transaction_id: Some(tx.into()),
            promo_code: code.into(),
            order_date: date(),
            order_amount: 1000.0,
            restaurant: None,
            country: None,
        }
    }

    #[test]
    fn test_matching_transaction_is_promo_attributed() {
        let tables = LookupTables::builtin();
        let dedup = OrderDeduplicator::new(&tables);
        let diagnostics = RunDiagnostics::default();
        let conversions = vec![
            conversion("O1", Some("T1"), Some("google / cpc")),
            conversion("O2", Some("T2"), Some("Instagram/Paid")),
        ];
        let outcome = dedup.deduplicate(&conversions, &[promo("T1", "SPRING25")], &diagnostics);

        let first = &outcome.orders[0];
        assert!(first.is_promo_order);
        assert_eq!(first.attribution_source, AttributionSource::PromoCode);
        assert_eq!(first.promo_code.as_deref(), Some("SPRING25"));
        assert_eq!(first.utm_channel, None);

        let second = &outcome.orders[1];
        assert!(!second.is_promo_order);
        assert_eq!(second.attribution_source, AttributionSource::UtmAttribution);
        assert_eq!(second.utm_channel.as_deref(), Some("instagram"));
        assert_eq!(outcome.stats.promo_attributed, 1);
        assert_eq!(outcome.stats.utm_attributed, 1);
    }

    #[test]
    fn test_missing_transaction_never_promo() {
        let tables = LookupTables::builtin();
        let dedup = OrderDeduplicator::new(&tables);
        let diagnostics = RunDiagnostics::default();
        let conversions = vec![conversion("O1", None, None), conversion("O2", Some("  "), None)];
        let mut blank_promo = promo("T9", "X1");
        blank_promo.transaction_id = Some(" ".into());

        let outcome = dedup.deduplicate(&conversions, &[blank_promo], &diagnostics);
        assert!(outcome.orders.iter().all(|o| !o.is_promo_order));
        assert_eq!(outcome.orders[1].transaction_id, None);
        assert_eq!(outcome.orders[0].utm_channel.as_deref(), Some("direct"));
        assert_eq!(diagnostics.count(DiagnosticKind::MissingTransactionId), 2);
    }

    #[test]
    fn test_duplicate_transactions_keep_first() {
        let tables = LookupTables::builtin();
        let dedup = OrderDeduplicator::new(&tables);
        let diagnostics = RunDiagnostics::default();
        let conversions = vec![
            conversion("O1", Some("T1"), None),
            conversion("O1-retry", Some(" T1 "), None),
        ];
        let outcome = dedup.deduplicate(&conversions, &[], &diagnostics);
        assert_eq!(outcome.orders.len(), 1);
        assert_eq!(outcome.orders[0].order_id, "O1");
        assert_eq!(outcome.stats.duplicate_transactions, 1);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let tables = LookupTables::builtin();
        let dedup = OrderDeduplicator::new(&tables);
        let diagnostics = RunDiagnostics::default();
        let conversions = vec![
            conversion("O1", Some("T1"), Some("google / cpc")),
            conversion("O2", Some("T2"), Some("newsletter / email")),
            conversion("O3", None, None),
        ];
        let promos = vec![promo("T2", "WELCOME")];

        let first = dedup.deduplicate(&conversions, &promos, &diagnostics);
        let second = dedup.deduplicate(&conversions, &promos, &diagnostics);
        let reapplied = dedup.deduplicate(&first.orders, &promos, &diagnostics);

        let bytes = |orders: &[AttributedOrder]| serde_json::to_vec(orders).unwrap();
        assert_eq!(bytes(&first.orders), bytes(&second.orders));
        assert_eq!(bytes(&first.orders), bytes(&reapplied.orders));
    }

    #[test]
    fn test_utm_channel_fallbacks() {
        let tables = LookupTables::builtin();
        let dedup = OrderDeduplicator::new(&tables);
        assert_eq!(dedup.utm_channel(Some("google / cpc")), "google_ads");
        assert_eq!(dedup.utm_channel(Some("(direct) / (none)")), "direct");
        assert_eq!(dedup.utm_channel(Some("yandex / cpc")), "yandex");
        assert_eq!(dedup.utm_channel(Some("")), "direct");
        assert_eq!(dedup.utm_channel(None), "direct");
    }
}
