use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ─── Campaign dimensions ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CampaignType {
    Awareness,
    Performance,
}

impl CampaignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Awareness => "Awareness",
            Self::Performance => "Performance",
        }
    }
}

impl fmt::Display for CampaignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "awareness" => Ok(Self::Awareness),
            "performance" => Ok(Self::Performance),
            other => Err(format!("unknown campaign type '{other}'")),
        }
    }
}

/// External platform a normalized record was fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSystem {
    Meta,
    GoogleAds,
    Ga4,
    AppsFlyer,
    PromoSheet,
}

impl SourceSystem {
    /// Platforms that deliver per-day campaign metrics.
    pub const CAMPAIGN_SOURCES: [SourceSystem; 3] =
        [SourceSystem::Meta, SourceSystem::GoogleAds, SourceSystem::AppsFlyer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::GoogleAds => "google_ads",
            Self::Ga4 => "ga4",
            Self::AppsFlyer => "apps_flyer",
            Self::PromoSheet => "promo_sheet",
        }
    }
}

impl fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive first and last day of the month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = month_start(date);
    let end = start
        .checked_add_months(chrono::Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(start);
    (start, end)
}

/// Positional fields of a `Platform|Channel|City|Restaurant|AudienceType|Additional` name.
/// Absent fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedCampaign {
    pub platform: String,
    pub channel: String,
    pub city: String,
    pub restaurant: String,
    pub audience_type: String,
    pub additional: String,
}

impl ParsedCampaign {
    /// Free text used by goal patterns and fuzzy plan matching.
    pub fn targeting_text(&self) -> String {
        format!("{} {}", self.audience_type, self.additional)
            .trim()
            .to_string()
    }

    pub fn is_empty(&self) -> bool {
        self.platform.is_empty()
            && self.channel.is_empty()
            && self.city.is_empty()
            && self.restaurant.is_empty()
            && self.audience_type.is_empty()
            && self.additional.is_empty()
    }
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

// ─── Campaign records ───────────────────────────────────────────────────────

/// Raw per-day platform metrics as delivered by a source poller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignMetrics {
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub reach: u64,
    pub orders: u64,
    pub installs: u64,
    pub messages: u64,
    pub revenue: f64,
}

impl CampaignMetrics {
    pub fn merge(&mut self, other: &CampaignMetrics) {
        self.impressions += other.impressions;
        self.clicks += other.clicks;
        self.spend += other.spend;
        self.reach += other.reach;
        self.orders += other.orders;
        self.installs += other.installs;
        self.messages += other.messages;
        self.revenue += other.revenue;
    }

    pub fn totals(&self) -> MetricTotals {
        MetricTotals {
            spend: self.spend,
            impressions: self.impressions as f64,
            clicks: self.clicks as f64,
            orders: self.orders as f64,
            revenue: self.revenue,
            installs: self.installs as f64,
        }
    }
}

/// Normalized record handed over by a source poller for one campaign-day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCampaignRecord {
    pub source_system: SourceSystem,
    pub date: NaiveDate,
    pub campaign_id: String,
    pub campaign_name: String,
    /// Platform-native objective code, e.g. `OUTCOME_AWARENESS`.
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub metrics: CampaignMetrics,
}

/// One attributed campaign-day. Unique per `(campaign_id, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedCampaignRecord {
    pub date: NaiveDate,
    pub campaign_id: String,
    pub campaign_name: String,
    pub source_system: SourceSystem,
    pub parsed: ParsedCampaign,
    pub campaign_type: CampaignType,
    pub goal: String,
    pub source: String,
    pub country: String,
    pub restaurant_display: String,
    pub city_display: String,
    pub metrics: CampaignMetrics,
}

impl UnifiedCampaignRecord {
    pub fn month(&self) -> NaiveDate {
        month_start(self.date)
    }
}

// ─── Metrics and variances ──────────────────────────────────────────────────

/// Base and derived metrics compared between fact and plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Spend,
    Impressions,
    Clicks,
    Orders,
    Revenue,
    Cpm,
    Cpc,
    Cpa,
    Cpo,
    Drr,
}

/// Which direction of change counts as an improvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    HigherIsBetter,
    LowerIsBetter,
    Neutral,
}

impl Metric {
    pub const BASE: [Metric; 5] = [
        Metric::Spend,
        Metric::Impressions,
        Metric::Clicks,
        Metric::Orders,
        Metric::Revenue,
    ];

    pub const DERIVED: [Metric; 5] = [
        Metric::Cpm,
        Metric::Cpc,
        Metric::Cpa,
        Metric::Cpo,
        Metric::Drr,
    ];

    pub const ALL: [Metric; 10] = [
        Metric::Spend,
        Metric::Impressions,
        Metric::Clicks,
        Metric::Orders,
        Metric::Revenue,
        Metric::Cpm,
        Metric::Cpc,
        Metric::Cpa,
        Metric::Cpo,
        Metric::Drr,
    ];

    pub fn is_derived(&self) -> bool {
        Self::DERIVED.contains(self)
    }

    pub fn polarity(&self) -> Polarity {
        match self {
            Self::Spend => Polarity::Neutral,
            Self::Impressions | Self::Clicks | Self::Orders | Self::Revenue => {
                Polarity::HigherIsBetter
            }
            Self::Cpm | Self::Cpc | Self::Cpa | Self::Cpo | Self::Drr => Polarity::LowerIsBetter,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spend => "spend",
            Self::Impressions => "impressions",
            Self::Clicks => "clicks",
            Self::Orders => "orders",
            Self::Revenue => "revenue",
            Self::Cpm => "cpm",
            Self::Cpc => "cpc",
            Self::Cpa => "cpa",
            Self::Cpo => "cpo",
            Self::Drr => "drr",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| format!("unknown metric '{s}'"))
    }
}

/// Additive quantities from which every `Metric` value is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricTotals {
    pub spend: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub orders: f64,
    pub revenue: f64,
    pub installs: f64,
}

impl MetricTotals {
    pub fn add(&mut self, other: &MetricTotals) {
        self.spend += other.spend;
        self.impressions += other.impressions;
        self.clicks += other.clicks;
        self.orders += other.orders;
        self.revenue += other.revenue;
        self.installs += other.installs;
    }

    /// Value of `metric`; `None` for a derived metric whose denominator is zero.
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Spend => Some(self.spend),
            Metric::Impressions => Some(self.impressions),
            Metric::Clicks => Some(self.clicks),
            Metric::Orders => Some(self.orders),
            Metric::Revenue => Some(self.revenue),
            Metric::Cpm => ratio(self.spend * 1000.0, self.impressions),
            Metric::Cpc => ratio(self.spend, self.clicks),
            Metric::Cpa => ratio(self.spend, self.orders + self.installs),
            Metric::Cpo => ratio(self.spend, self.orders),
            Metric::Drr => ratio(self.spend * 100.0, self.revenue),
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator)
    }
}

/// Fact-vs-plan deviation for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceRecord {
    pub metric: Metric,
    pub fact: f64,
    pub plan: f64,
    pub absolute_variance: f64,
    /// `None` when the plan value is zero.
    pub relative_variance_percent: Option<f64>,
}

// ─── Media plan ─────────────────────────────────────────────────────────────

/// A validated media-plan line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPlanEntry {
    pub id: u64,
    /// Always the first day of the planned month.
    pub month: NaiveDate,
    pub campaign_type: CampaignType,
    pub goal: String,
    pub restaurant: String,
    pub country: String,
    pub source: String,
    #[serde(default)]
    pub targeting: Option<String>,
    #[serde(default)]
    pub planned_budget: f64,
    #[serde(default)]
    pub planned_impressions: f64,
    #[serde(default)]
    pub planned_clicks: f64,
    #[serde(default)]
    pub planned_orders: f64,
    #[serde(default)]
    pub planned_revenue: f64,
    #[serde(default)]
    pub planned_installs: f64,
}

impl MediaPlanEntry {
    pub fn planned_totals(&self) -> MetricTotals {
        MetricTotals {
            spend: self.planned_budget,
            impressions: self.planned_impressions,
            clicks: self.planned_clicks,
            orders: self.planned_orders,
            revenue: self.planned_revenue,
            installs: self.planned_installs,
        }
    }
}

// ─── Match results ──────────────────────────────────────────────────────────

/// The campaign-day a match result refers to, with the dimension values
/// reporting groups by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignRef {
    pub campaign_id: String,
    pub campaign_name: String,
    pub date: NaiveDate,
    pub restaurant: String,
    pub country: String,
    pub city: String,
    pub campaign_type: CampaignType,
    pub goal: String,
    pub source: String,
}

impl From<&UnifiedCampaignRecord> for CampaignRef {
    fn from(record: &UnifiedCampaignRecord) -> Self {
        Self {
            campaign_id: record.campaign_id.clone(),
            campaign_name: record.campaign_name.clone(),
            date: record.date,
            restaurant: record.restaurant_display.clone(),
            country: record.country.clone(),
            city: record.city_display.clone(),
            campaign_type: record.campaign_type,
            goal: record.goal.clone(),
            source: record.source.clone(),
        }
    }
}

/// Outcome of resolving one campaign-day against the media plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub campaign: CampaignRef,
    pub matched: bool,
    pub media_plan_id: Option<u64>,
    pub is_manual: bool,
    pub is_fuzzy: bool,
    pub is_ambiguous: bool,
    pub match_score: Option<f64>,
    /// Every plan id that tied for the match when `is_ambiguous`.
    #[serde(default)]
    pub ambiguous_candidates: Vec<u64>,
    pub fact: MetricTotals,
    pub plan: Option<MetricTotals>,
    pub variances: BTreeMap<Metric, VarianceRecord>,
}

// ─── Reporting dimensions ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Source,
    CampaignType,
    Country,
    Restaurant,
    Goal,
    City,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::CampaignType => "campaign_type",
            Self::Country => "country",
            Self::Restaurant => "restaurant",
            Self::Goal => "goal",
            Self::City => "city",
        }
    }

    /// Value of this dimension for a campaign; blank values group under `N/A`.
    pub fn value_of(&self, campaign: &CampaignRef) -> String {
        let raw = match self {
            Self::Source => campaign.source.as_str(),
            Self::CampaignType => campaign.campaign_type.as_str(),
            Self::Country => campaign.country.as_str(),
            Self::Restaurant => campaign.restaurant.as_str(),
            Self::Goal => campaign.goal.as_str(),
            Self::City => campaign.city.as_str(),
        };
        if raw.trim().is_empty() {
            "N/A".to_string()
        } else {
            raw.to_string()
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "source" => Ok(Self::Source),
            "campaign_type" | "type" => Ok(Self::CampaignType),
            "country" => Ok(Self::Country),
            "restaurant" => Ok(Self::Restaurant),
            "goal" => Ok(Self::Goal),
            "city" => Ok(Self::City),
            other => Err(format!("unknown dimension '{other}'")),
        }
    }
}

// ─── Orders ─────────────────────────────────────────────────────────────────

/// Mechanism credited with an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionSource {
    PromoCode,
    UtmAttribution,
}

/// A session-tracked conversion from analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub order_id: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub date: NaiveDate,
    #[serde(default)]
    pub revenue: f64,
    /// GA-style `source / medium`, e.g. `google / cpc`.
    #[serde(default)]
    pub source_medium: Option<String>,
    #[serde(default)]
    pub campaign: Option<String>,
}

/// An order placed with a promo code, as recorded in the promo sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoOrderRecord {
    pub order_id: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub promo_code: String,
    pub order_date: NaiveDate,
    #[serde(default)]
    pub order_amount: f64,
    #[serde(default)]
    pub restaurant: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// A conversion annotated with a single attribution source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributedOrder {
    pub order_id: String,
    pub transaction_id: Option<String>,
    pub date: NaiveDate,
    pub revenue: f64,
    pub source_medium: Option<String>,
    pub is_promo_order: bool,
    pub attribution_source: AttributionSource,
    pub promo_code: Option<String>,
    /// Standardized utm channel; set only for `UtmAttribution`.
    pub utm_channel: Option<String>,
}
