//! Abstract record collections the engine reads from and writes to.
//!
//! The engine never talks to vendor APIs or databases; collaborators fill a
//! [`RecordStore`] and the engine consumes it. Two implementations ship:
//! an in-memory store for embedding and tests, and a JSON directory store
//! for the command-line tool.

use crate::run::{DailyRunReport, MonthlyComparisonReport};
use adrecon_attribution::PromoRow;
use adrecon_core::types::{ConversionRecord, SourceCampaignRecord, SourceSystem};
use adrecon_core::{EngineError, EngineResult};
use adrecon_reconciliation::{ManualMappingEntry, MediaPlanRow};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Date filters are inclusive on both ends.
#[allow(async_fn_in_trait)]
pub trait RecordStore: Send + Sync {
    async fn load_campaign_records(
        &self,
        source: SourceSystem,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<SourceCampaignRecord>>;

    async fn load_conversions(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<ConversionRecord>>;

    /// Raw promo sheet rows; the engine validates them.
    async fn load_promo_rows(&self) -> EngineResult<Vec<PromoRow>>;

    async fn load_media_plan(&self) -> EngineResult<Vec<MediaPlanRow>>;

    async fn load_manual_mappings(&self) -> EngineResult<Vec<ManualMappingEntry>>;

    async fn save_daily_report(&self, report: &DailyRunReport) -> EngineResult<()>;

    async fn save_comparison(&self, report: &MonthlyComparisonReport) -> EngineResult<()>;
}

fn in_range(date: NaiveDate, from: NaiveDate, to: NaiveDate) -> bool {
    date >= from && date <= to
}

// ─── In-memory store ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    campaign_records: RwLock<Vec<SourceCampaignRecord>>,
    conversions: RwLock<Vec<ConversionRecord>>,
    promo_rows: RwLock<Vec<PromoRow>>,
    media_plan: RwLock<Vec<MediaPlanRow>>,
    manual_mappings: RwLock<Vec<ManualMappingEntry>>,
    daily_reports: RwLock<Vec<DailyRunReport>>,
    comparisons: RwLock<Vec<MonthlyComparisonReport>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_campaign_records(&self, records: impl IntoIterator<Item = SourceCampaignRecord>) {
        self.campaign_records.write().await.extend(records);
    }

    pub async fn add_conversions(&self, records: impl IntoIterator<Item = ConversionRecord>) {
        self.conversions.write().await.extend(records);
    }

    pub async fn add_promo_rows(&self, rows: impl IntoIterator<Item = PromoRow>) {
        self.promo_rows.write().await.extend(rows);
    }

    pub async fn set_media_plan(&self, rows: Vec<MediaPlanRow>) {
        *self.media_plan.write().await = rows;
    }

    pub async fn set_manual_mappings(&self, entries: Vec<ManualMappingEntry>) {
        *self.manual_mappings.write().await = entries;
    }

    pub async fn daily_reports(&self) -> Vec<DailyRunReport> {
        self.daily_reports.read().await.clone()
    }

    pub async fn comparisons(&self) -> Vec<MonthlyComparisonReport> {
        self.comparisons.read().await.clone()
    }
}

impl RecordStore for MemoryStore {
    async fn load_campaign_records(
        &self,
        source: SourceSystem,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<SourceCampaignRecord>> {
        Ok(self
            .campaign_records
            .read()
            .await
            .iter()
            .filter(|r| r.source_system == source && in_range(r.date, from, to))
            .cloned()
            .collect())
    }

    async fn load_conversions(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<ConversionRecord>> {
        Ok(self
            .conversions
            .read()
            .await
            .iter()
            .filter(|c| in_range(c.date, from, to))
            .cloned()
            .collect())
    }

    async fn load_promo_rows(&self) -> EngineResult<Vec<PromoRow>> {
        Ok(self.promo_rows.read().await.clone())
    }

    async fn load_media_plan(&self) -> EngineResult<Vec<MediaPlanRow>> {
        Ok(self.media_plan.read().await.clone())
    }

    async fn load_manual_mappings(&self) -> EngineResult<Vec<ManualMappingEntry>> {
        Ok(self.manual_mappings.read().await.clone())
    }

    async fn save_daily_report(&self, report: &DailyRunReport) -> EngineResult<()> {
        self.daily_reports.write().await.push(report.clone());
        Ok(())
    }

    async fn save_comparison(&self, report: &MonthlyComparisonReport) -> EngineResult<()> {
        self.comparisons.write().await.push(report.clone());
        Ok(())
    }
}

// ─── JSON directory store ───────────────────────────────────────────────────

/// Layout under `root`:
///
/// ```text
/// campaigns/<source>.json   Vec<SourceCampaignRecord>
/// conversions.json          Vec<ConversionRecord>
/// promo_rows.json           Vec<PromoRow>
/// media_plan.json           Vec<MediaPlanRow>
/// manual_mappings.json      Vec<ManualMappingEntry>
/// output/daily/<date>.json
/// output/comparisons/<current>_vs_<previous>.json
/// ```
///
/// A missing input file reads as an empty collection.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn daily_report_path(&self, date: NaiveDate) -> PathBuf {
        self.root.join("output").join("daily").join(format!("{date}.json"))
    }

    pub fn comparison_path(&self, current: &str, previous: &str) -> PathBuf {
        self.root
            .join("output")
            .join("comparisons")
            .join(format!("{current}_vs_{previous}.json"))
    }

    async fn read_collection<T: DeserializeOwned>(&self, relative: &str) -> EngineResult<Vec<T>> {
        let path = self.root.join(relative);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "input file absent, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(EngineError::Store(format!("read {}: {e}", path.display())));
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| EngineError::Store(format!("parse {}: {e}", path.display())))
    }

    async fn write_json<T: Serialize>(&self, path: PathBuf, value: &T) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| EngineError::Store(format!("write {}: {e}", path.display())))
    }
}

impl RecordStore for JsonDirStore {
    async fn load_campaign_records(
        &self,
        source: SourceSystem,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<SourceCampaignRecord>> {
        let records: Vec<SourceCampaignRecord> = self
            .read_collection(&format!("campaigns/{}.json", source.as_str()))
            .await?;
        Ok(records
            .into_iter()
            .filter(|r| in_range(r.date, from, to))
            .map(|mut r| {
                r.source_system = source;
                r
            })
            .collect())
    }

    async fn load_conversions(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<ConversionRecord>> {
        let records: Vec<ConversionRecord> = self.read_collection("conversions.json").await?;
        Ok(records
            .into_iter()
            .filter(|c| in_range(c.date, from, to))
            .collect())
    }

    async fn load_promo_rows(&self) -> EngineResult<Vec<PromoRow>> {
        self.read_collection("promo_rows.json").await
    }

    async fn load_media_plan(&self) -> EngineResult<Vec<MediaPlanRow>> {
        self.read_collection("media_plan.json").await
    }

    async fn load_manual_mappings(&self) -> EngineResult<Vec<ManualMappingEntry>> {
        self.read_collection("manual_mappings.json").await
    }

    async fn save_daily_report(&self, report: &DailyRunReport) -> EngineResult<()> {
        self.write_json(self.daily_report_path(report.date), report).await
    }

    async fn save_comparison(&self, report: &MonthlyComparisonReport) -> EngineResult<()> {
        let path = self.comparison_path(
            &report.comparison.current_period,
            &report.comparison.previous_period,
        );
        self.write_json(path, report).await
    }
}
