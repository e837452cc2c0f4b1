//! Versioned lookup tables that drive campaign attribution.
//!
//! Tables are plain data loaded once at run start and never mutated; the
//! attribution crate compiles them into an immutable mapper that parallel
//! workers share by reference.

use crate::error::EngineResult;
use crate::types::CampaignType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One ordered `(pattern, goal)` override. Patterns are case-insensitive regexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalRule {
    pub pattern: String,
    pub goal: String,
}

impl GoalRule {
    pub fn new(pattern: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            goal: goal.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupTables {
    pub version: String,
    pub channel_to_type: BTreeMap<String, CampaignType>,
    pub type_to_goal: BTreeMap<CampaignType, String>,
    /// Platform objective codes that unambiguously fix the campaign type.
    pub objective_to_type: BTreeMap<String, CampaignType>,
    pub platform_to_source: BTreeMap<String, String>,
    pub city_to_country: BTreeMap<String, String>,
    pub restaurant_display: BTreeMap<String, String>,
    pub city_display: BTreeMap<String, String>,
    /// Evaluated in declaration order; the first match wins.
    pub goal_patterns: Vec<GoalRule>,
    /// Lower-cased `source / medium` pairs to a standardized channel.
    pub source_medium_channels: BTreeMap<String, String>,
}

fn table<V: Clone>(pairs: &[(&str, V)]) -> BTreeMap<String, V> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

impl LookupTables {
    /// Tables shipped with the engine.
    pub fn builtin() -> Self {
        Self {
            version: "2025.01".to_string(),
            channel_to_type: table(&[
                ("CPM", CampaignType::Awareness),
                ("CPC", CampaignType::Performance),
                // Cyrillic "С" typed by operators in some names.
                ("CPС", CampaignType::Performance),
            ]),
            type_to_goal: [
                (CampaignType::Awareness, "Охват/Узнаваемость".to_string()),
                (CampaignType::Performance, "Заказы".to_string()),
            ]
            .into_iter()
            .collect(),
            objective_to_type: table(&[
                ("OUTCOME_AWARENESS", CampaignType::Awareness),
                ("OUTCOME_SALES", CampaignType::Performance),
            ]),
            platform_to_source: table(&[
                ("Instagram", "Мета".to_string()),
                ("Facebook", "Мета".to_string()),
                ("Search", "Google Search".to_string()),
                ("Network", "Google Display".to_string()),
            ]),
            city_to_country: table(&[
                ("Almaty", "Казахстан".to_string()),
                ("Astana", "Казахстан".to_string()),
                ("Tashkent", "Узбекистан".to_string()),
            ]),
            restaurant_display: table(&[
                ("Bella", "Белла".to_string()),
                ("Tanuki", "Тануки".to_string()),
            ]),
            city_display: BTreeMap::new(),
            goal_patterns: vec![GoalRule::new("install", "Установки приложения")],
            source_medium_channels: table(&[
                ("google / cpc", "google_ads".to_string()),
                ("google / organic", "google_organic".to_string()),
                ("facebook / paid", "facebook".to_string()),
                ("instagram / paid", "instagram".to_string()),
                ("facebook / referral", "facebook".to_string()),
                ("instagram / referral", "instagram".to_string()),
                ("email / email", "email".to_string()),
                ("push / notification", "push".to_string()),
                ("(direct) / (none)", "direct".to_string()),
                ("qr / offline", "qr".to_string()),
            ]),
        }
    }

    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

impl Default for LookupTables {
    fn default() -> Self {
        Self::builtin()
    }
}
