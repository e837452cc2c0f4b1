use crate::store::RecordStore;
use adrecon_attribution::{
    validate_rows, AttributionMapper, CampaignNameParser, DedupStats, OrderDeduplicator,
    UnifiedRecordBuilder,
};
use adrecon_core::types::{
    month_bounds, AttributedOrder, MatchResult, Metric, SourceCampaignRecord, SourceSystem,
    UnifiedCampaignRecord,
};
use adrecon_core::{
    AppConfig, DiagnosticsSummary, EngineError, EngineResult, LookupTables, RunDiagnostics,
};
use adrecon_reconciliation::{ManualMappingTable, MatchStats, MediaPlan, MediaPlanMatcher};
use adrecon_reporting::{
    previous_month, DimensionAnalysis, MultiDimensionalAnalyzer, PerformanceAnalyzer,
    PeriodComparison, PeriodData,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Run-scoped snapshot of configuration and compiled lookup tables. Built
/// once and shared read-only by every stage.
pub struct Engine {
    config: AppConfig,
    parser: CampaignNameParser,
    mapper: AttributionMapper,
    tables: LookupTables,
}

impl Engine {
    /// Loads the lookup tables the configuration points at.
    pub fn new(config: AppConfig) -> EngineResult<Self> {
        let tables = config.lookup_tables()?;
        Self::with_tables(config, tables)
    }

    pub fn with_tables(config: AppConfig, tables: LookupTables) -> EngineResult<Self> {
        config.validate()?;
        let mapper = AttributionMapper::new(&tables)?;
        let parser = CampaignNameParser::new(&config.parser);
        Ok(Self {
            config,
            parser,
            mapper,
            tables,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn tables(&self) -> &LookupTables {
        &self.tables
    }

    fn diagnostics(&self) -> RunDiagnostics {
        RunDiagnostics::new(self.config.diagnostics.sample_limit)
    }

    fn unify(
        &self,
        records: &[SourceCampaignRecord],
        diagnostics: &RunDiagnostics,
    ) -> Vec<UnifiedCampaignRecord> {
        UnifiedRecordBuilder::new(&self.parser, &self.mapper).build(records, diagnostics)
    }
}

async fn load_campaign_sources<S: RecordStore>(
    store: &S,
    from: NaiveDate,
    to: NaiveDate,
) -> EngineResult<Vec<SourceCampaignRecord>> {
    let [meta, google, appsflyer] = SourceSystem::CAMPAIGN_SOURCES;
    let (meta, google, appsflyer) = tokio::try_join!(
        store.load_campaign_records(meta, from, to),
        store.load_campaign_records(google, from, to),
        store.load_campaign_records(appsflyer, from, to),
    )?;
    Ok(meta.into_iter().chain(google).chain(appsflyer).collect())
}

// ─── Daily run ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRunReport {
    pub run_id: Uuid,
    pub date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub tables_version: String,
    pub unified_records: usize,
    pub match_results: Vec<MatchResult>,
    pub match_stats: MatchStats,
    pub attributed_orders: Vec<AttributedOrder>,
    pub dedup_stats: DedupStats,
    pub dimension_analysis: DimensionAnalysis,
    pub diagnostics: DiagnosticsSummary,
}

/// parse → attribute → dedup → match → aggregate for one day.
pub struct DailyRun<'a, S: RecordStore> {
    engine: &'a Engine,
    store: &'a S,
}

impl<'a, S: RecordStore> DailyRun<'a, S> {
    pub fn new(engine: &'a Engine, store: &'a S) -> Self {
        Self { engine, store }
    }

    pub async fn execute(&self, date: NaiveDate) -> EngineResult<DailyRunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let diagnostics = self.engine.diagnostics();
        info!(%run_id, %date, "Daily run starting");

        let (campaign_records, conversions, promo_rows, plan_rows, manual_entries) = tokio::try_join!(
            load_campaign_sources(self.store, date, date),
            self.store.load_conversions(date, date),
            self.store.load_promo_rows(),
            self.store.load_media_plan(),
            self.store.load_manual_mappings(),
        )?;

        let unified = self.engine.unify(&campaign_records, &diagnostics);

        let promo_orders = validate_rows(&promo_rows, &diagnostics);
        let dedup = OrderDeduplicator::new(&self.engine.tables).deduplicate(
            &conversions,
            &promo_orders,
            &diagnostics,
        );

        let plan = MediaPlan::from_rows(&plan_rows, &diagnostics);
        let manual = ManualMappingTable::from_entries(&manual_entries, &diagnostics);
        let matched = MediaPlanMatcher::new(&plan, &manual, &self.engine.config.matcher)
            .match_all(&unified, &diagnostics);

        let dimension_analysis = MultiDimensionalAnalyzer::new().analyze(
            &matched.results,
            &self.engine.config.analysis.dimensions,
            date,
        );

        let report = DailyRunReport {
            run_id,
            date,
            started_at,
            tables_version: self.engine.mapper.tables_version().to_string(),
            unified_records: unified.len(),
            match_results: matched.results,
            match_stats: matched.stats,
            attributed_orders: dedup.orders,
            dedup_stats: dedup.stats,
            dimension_analysis,
            diagnostics: diagnostics.summary(),
        };

        self.store.save_daily_report(&report).await?;
        info!(
            %run_id,
            %date,
            matched = report.match_stats.matched,
            unmatched = report.match_stats.unmatched,
            orders = report.attributed_orders.len(),
            diagnostics = report.diagnostics.total,
            "Daily run complete"
        );
        Ok(report)
    }
}

// ─── Monthly comparison ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyComparisonReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub comparison: PeriodComparison,
    pub diagnostics: DiagnosticsSummary,
}

/// Compares two calendar months of unified campaign records.
pub struct MonthlyComparison<'a, S: RecordStore> {
    engine: &'a Engine,
    store: &'a S,
}

impl<'a, S: RecordStore> MonthlyComparison<'a, S> {
    pub fn new(engine: &'a Engine, store: &'a S) -> Self {
        Self { engine, store }
    }

    /// `previous` defaults to the calendar month before `current`; `metrics`
    /// defaults to every metric.
    pub async fn execute(
        &self,
        current: NaiveDate,
        previous: Option<NaiveDate>,
        metrics: Option<&[Metric]>,
    ) -> EngineResult<MonthlyComparisonReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let diagnostics = self.engine.diagnostics();

        let (current_start, current_end) = month_bounds(current);
        let previous = previous.unwrap_or_else(|| previous_month(current_start));
        let (previous_start, previous_end) = month_bounds(previous);
        if previous_start >= current_start {
            return Err(EngineError::InvalidInput(format!(
                "previous month {previous_start} is not before {current_start}"
            )));
        }
        info!(%run_id, current = %current_start, previous = %previous_start, "Monthly comparison starting");

        let (current_records, previous_records) = tokio::try_join!(
            load_campaign_sources(self.store, current_start, current_end),
            load_campaign_sources(self.store, previous_start, previous_end),
        )?;

        let current_data = PeriodData::from_records(
            current_start.format("%Y-%m").to_string(),
            &self.engine.unify(&current_records, &diagnostics),
        );
        let previous_data = PeriodData::from_records(
            previous_start.format("%Y-%m").to_string(),
            &self.engine.unify(&previous_records, &diagnostics),
        );

        let comparison = PerformanceAnalyzer::new(&self.engine.config.performance).compare(
            &current_data,
            &previous_data,
            &self.engine.config.analysis.dimensions,
            metrics.unwrap_or(&Metric::ALL),
        );

        let report = MonthlyComparisonReport {
            run_id,
            started_at,
            comparison,
            diagnostics: diagnostics.summary(),
        };
        self.store.save_comparison(&report).await?;
        Ok(report)
    }
}
