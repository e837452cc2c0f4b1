//! Campaign-name parser for the
//! `Platform|Channel|City|Restaurant|AudienceType|Additional` convention.

use adrecon_core::config::ParserConfig;
use adrecon_core::types::ParsedCampaign;
use adrecon_core::{DiagnosticKind, RunDiagnostics};
use serde::{Deserialize, Serialize};

const FIELD_COUNT: usize = 6;

/// How well a raw name fit the naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseQuality {
    /// All six positions present.
    Complete,
    /// A delimiter was found but trailing positions are missing.
    Partial,
    /// Empty name or no known delimiter; every field is empty.
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    pub parsed: ParsedCampaign,
    pub quality: ParseQuality,
}

#[derive(Debug, Clone)]
pub struct CampaignNameParser {
    delimiters: Vec<String>,
}

impl CampaignNameParser {
    pub fn new(config: &ParserConfig) -> Self {
        let delimiters = std::iter::once(&config.delimiter)
            .chain(config.fallback_delimiters.iter())
            .filter(|d| !d.is_empty())
            .cloned()
            .collect();
        Self { delimiters }
    }

    /// Parse `raw` into positional fields. Never fails.
    pub fn parse(&self, raw: &str) -> ParseOutcome {
        let raw = raw.trim();
        let Some(delimiter) = self.delimiters.iter().find(|d| raw.contains(d.as_str())) else {
            return ParseOutcome {
                parsed: ParsedCampaign::default(),
                quality: ParseQuality::Malformed,
            };
        };

        let parts: Vec<&str> = raw.split(delimiter.as_str()).map(str::trim).collect();
        let field = |idx: usize| parts.get(idx).map(|s| s.to_string()).unwrap_or_default();
        let additional = if parts.len() > FIELD_COUNT - 1 {
            parts[FIELD_COUNT - 1..].join(delimiter)
        } else {
            String::new()
        };

        ParseOutcome {
            parsed: ParsedCampaign {
                platform: field(0),
                channel: field(1),
                city: field(2),
                restaurant: field(3),
                audience_type: field(4),
                additional,
            },
            quality: if parts.len() >= FIELD_COUNT {
                ParseQuality::Complete
            } else {
                ParseQuality::Partial
            },
        }
    }

    /// Parse and report a degraded name to the run diagnostics.
    pub fn parse_recorded(&self, raw: &str, diagnostics: &RunDiagnostics) -> ParsedCampaign {
        let outcome = self.parse(raw);
        if outcome.quality != ParseQuality::Complete {
            diagnostics.record(DiagnosticKind::ParseDegraded, raw);
        }
        outcome.parsed
    }
}

impl Default for CampaignNameParser {
    fn default() -> Self {
        Self::new(&ParserConfig::default())
    }
}
