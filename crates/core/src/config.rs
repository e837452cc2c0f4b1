use crate::error::{EngineError, EngineResult};
use crate::tables::LookupTables;
use crate::types::Dimension;
use serde::Deserialize;

/// Root engine configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `ADRECON__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    /// JSON lookup-table file; the built-in tables are used when unset.
    #[serde(default)]
    pub tables_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Tried in order only when `delimiter` does not occur in the name.
    #[serde(default = "default_fallback_delimiters")]
    pub fallback_delimiters: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatcherConfig {
    /// Points per equal key field in fuzzy scoring.
    #[serde(default = "default_field_weight")]
    pub field_weight: f64,
    /// Points for a full free-text overlap with the plan's targeting.
    #[serde(default = "default_text_overlap_weight")]
    pub text_overlap_weight: f64,
    /// Inclusive minimum score for a fuzzy candidate.
    #[serde(default = "default_min_fuzzy_score")]
    pub min_fuzzy_score: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_significance_level")]
    pub significance_level: f64,
    /// Minimum daily observations per period for a significance test.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_dimensions")]
    pub dimensions: Vec<Dimension>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosticsConfig {
    /// Offending raw values kept per diagnostic kind.
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
}

// Default functions
fn default_delimiter() -> String {
    "|".to_string()
}
fn default_fallback_delimiters() -> Vec<String> {
    vec!["-".to_string(), ",".to_string()]
}
fn default_field_weight() -> f64 {
    1.0
}
fn default_text_overlap_weight() -> f64 {
    1.0
}
fn default_min_fuzzy_score() -> f64 {
    3.0
}
fn default_significance_level() -> f64 {
    0.05
}
fn default_min_samples() -> usize {
    2
}
fn default_dimensions() -> Vec<Dimension> {
    vec![
        Dimension::Source,
        Dimension::CampaignType,
        Dimension::Country,
        Dimension::Restaurant,
    ]
}
fn default_sample_limit() -> usize {
    20
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            fallback_delimiters: default_fallback_delimiters(),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            field_weight: default_field_weight(),
            text_overlap_weight: default_text_overlap_weight(),
            min_fuzzy_score: default_min_fuzzy_score(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            significance_level: default_significance_level(),
            min_samples: default_min_samples(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            sample_limit: default_sample_limit(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            parser: ParserConfig::default(),
            matcher: MatcherConfig::default(),
            performance: PerformanceConfig::default(),
            analysis: AnalysisConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            tables_path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file and environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("ADRECON")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("analysis.dimensions")
                .with_list_parse_key("parser.fallback_delimiters"),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Reject settings no run could use.
    pub fn validate(&self) -> EngineResult<()> {
        if self.parser.delimiter.is_empty() {
            return Err(EngineError::Config("parser.delimiter must not be empty".into()));
        }
        let alpha = self.performance.significance_level;
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(EngineError::Config(format!(
                "performance.significance_level must be in (0, 1), got {alpha}"
            )));
        }
        if self.analysis.dimensions.is_empty() {
            return Err(EngineError::Config("analysis.dimensions must not be empty".into()));
        }
        if self.matcher.field_weight < 0.0 || self.matcher.text_overlap_weight < 0.0 {
            return Err(EngineError::Config("matcher weights must be non-negative".into()));
        }
        Ok(())
    }

    /// Lookup tables for this run: the configured file, or the built-in set.
    pub fn lookup_tables(&self) -> EngineResult<LookupTables> {
        match &self.tables_path {
            Some(path) => LookupTables::from_json_path(path),
            None => Ok(LookupTables::builtin()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.parser.delimiter, "|");
        assert_eq!(config.parser.fallback_delimiters, vec!["-", ","]);
        assert!((config.matcher.min_fuzzy_score - 3.0).abs() < f64::EPSILON);
        assert!((config.performance.significance_level - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.analysis.dimensions.len(), 4);
        assert!(config.tables_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unusable_settings() {
        let mut config = AppConfig::default();
        config.parser.delimiter.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.performance.significance_level = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.analysis.dimensions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(
            &path,
            "[matcher]\nmin_fuzzy_score = 4.0\n\n[analysis]\ndimensions = [\"goal\", \"city\"]\n",
        )
        .unwrap();

        let config = AppConfig::load(path.to_str()).unwrap();
        assert!((config.matcher.min_fuzzy_score - 4.0).abs() < f64::EPSILON);
        assert!((config.matcher.field_weight - 1.0).abs() < f64::EPSILON);
        assert_eq!(
            config.analysis.dimensions,
            vec![Dimension::Goal, Dimension::City]
        );
    }
}
