#![allow(clippy::unwrap_used)]

use adrecon_attribution::{
    validate_rows, AttributionMapper, CampaignNameParser, OrderDeduplicator, PromoRow,
    UnifiedRecordBuilder,
};
use adrecon_core::config::ParserConfig;
use adrecon_core::types::{
    AttributionSource, CampaignMetrics, CampaignType, ConversionRecord, SourceCampaignRecord,
    SourceSystem,
};
use adrecon_core::{DiagnosticKind, LookupTables, RunDiagnostics};
use chrono::NaiveDate;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 2).unwrap()
}

fn record(id: &str, name: &str, objective: Option<&str>, spend: f64) -> SourceCampaignRecord {
    SourceCampaignRecord {
        source_system: SourceSystem::Meta,
        date: day(),
        campaign_id: id.into(),
        campaign_name: name.into(),
        objective: objective.map(str::to_string),
        metrics: CampaignMetrics {
            spend,
            impressions: 10_000,
            clicks: 50,
            ..Default::default()
        },
    }
}

#[test]
fn unified_records_carry_attribution_from_names_and_objectives() {
    let tables = LookupTables::builtin();
    let parser = CampaignNameParser::new(&ParserConfig::default());
    let mapper = AttributionMapper::new(&tables).unwrap();
    let diagnostics = RunDiagnostics::default();

    let records = vec![
        record("1", "Instagram | CPC | Astana | Tanuki | app install", None, 10.0),
        // dash-delimited name, objective forces awareness
        record("2", "Facebook - CPC - Almaty - Bella - broad", Some("OUTCOME_AWARENESS"), 20.0),
        record("1", "Instagram | CPC | Astana | Tanuki | app install", None, 5.0),
        record("3", "Snapchat | CPM | Bishkek | Pizza", None, 1.0),
    ];

    let unified = UnifiedRecordBuilder::new(&parser, &mapper).build(&records, &diagnostics);
    assert_eq!(unified.len(), 3);

    let install = &unified[0];
    assert_eq!(install.campaign_id, "1");
    assert!((install.metrics.spend - 15.0).abs() < 1e-9);
    assert_eq!(install.goal, "Установки приложения");
    assert_eq!(install.country, "Казахстан");
    assert_eq!(install.restaurant_display, "Тануки");

    let dashed = &unified[1];
    assert_eq!(dashed.parsed.city, "Almaty");
    assert_eq!(dashed.campaign_type, CampaignType::Awareness);
    assert_eq!(dashed.goal, "Охват/Узнаваемость");
    assert_eq!(dashed.source, "Мета");

    let unknown = &unified[2];
    assert_eq!(unknown.source, "Unknown");
    assert_eq!(unknown.country, "Unknown");
    assert_eq!(unknown.restaurant_display, "Pizza");

    assert_eq!(diagnostics.count(DiagnosticKind::DuplicateCampaignDay), 1);
    // none of the names carries all six fields
    assert_eq!(diagnostics.count(DiagnosticKind::ParseDegraded), 3);
    // platform, city and restaurant of the last name
    assert_eq!(diagnostics.count(DiagnosticKind::UnmappedValue), 3);
}

#[test]
fn promo_sheet_rows_take_precedence_over_utm() {
    let tables = LookupTables::builtin();
    let diagnostics = RunDiagnostics::default();
    let rows = vec![
        PromoRow {
            promo_code: Some("TANUKI_APR".into()),
            order_id: Some("A-1".into()),
            order_date: Some("2025/04/02".into()),
            order_amount: Some("2,500.00".into()),
            ..Default::default()
        },
        PromoRow {
            promo_code: Some("x".into()),
            order_id: Some("A-2".into()),
            order_date: Some("02.04.2025".into()),
            order_amount: Some("-3".into()),
            ..Default::default()
        },
    ];
    let promo_orders = validate_rows(&rows, &diagnostics);
    assert_eq!(promo_orders.len(), 1);
    assert!((promo_orders[0].order_amount - 2500.0).abs() < 1e-9);
    assert_eq!(diagnostics.count(DiagnosticKind::InvalidPromoRow), 1);

    let conversion = |order: &str, tx: &str, source_medium: &str| ConversionRecord {
        order_id: order.into(),
        transaction_id: Some(tx.into()),
        date: day(),
        revenue: 100.0,
        source_medium: Some(source_medium.into()),
        campaign: None,
    };
    let conversions = vec![
        // transaction id defaults to the sheet's order id
        conversion("A-1", "A-1", "google / cpc"),
        conversion("A-3", "A-3", "email / email"),
        conversion("A-4", "A-4", "tiktok / paid"),
    ];

    let outcome =
        OrderDeduplicator::new(&tables).deduplicate(&conversions, &promo_orders, &diagnostics);
    let sources: Vec<(AttributionSource, Option<&str>)> = outcome
        .orders
        .iter()
        .map(|o| (o.attribution_source, o.utm_channel.as_deref()))
        .collect();
    assert_eq!(
        sources,
        vec![
            (AttributionSource::PromoCode, None),
            (AttributionSource::UtmAttribution, Some("email")),
            (AttributionSource::UtmAttribution, Some("tiktok")),
        ]
    );
    assert_eq!(outcome.stats.promo_attributed, 1);
    assert!((outcome.stats.utm_revenue - 200.0).abs() < 1e-9);
}
