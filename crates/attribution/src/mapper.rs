use adrecon_core::tables::LookupTables;
use adrecon_core::types::{CampaignType, ParsedCampaign};
use adrecon_core::{DiagnosticKind, EngineError, EngineResult, RunDiagnostics};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

const UNKNOWN: &str = "Unknown";

/// Semantic dimensions derived from a parsed campaign name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub campaign_type: CampaignType,
    pub goal: String,
    pub source: String,
    pub country: String,
    pub restaurant_display: String,
    pub city_display: String,
}

/// A raw value that fell back to a default because no table covered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmappedValue {
    pub field: &'static str,
    pub value: String,
}

impl std::fmt::Display for UnmappedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.field, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingOutcome {
    pub attribution: Attribution,
    pub unmapped: Vec<UnmappedValue>,
}

/// Immutable snapshot of the lookup tables with goal patterns compiled.
/// Shared by reference across workers.
#[derive(Debug, Clone)]
pub struct AttributionMapper {
    tables: LookupTables,
    goal_rules: Vec<(Regex, String)>,
}

impl AttributionMapper {
    pub fn new(tables: &LookupTables) -> EngineResult<Self> {
        let goal_rules = tables
            .goal_patterns
            .iter()
            .map(|rule| {
                RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (re, rule.goal.clone()))
                    .map_err(|source| EngineError::InvalidPattern {
                        pattern: rule.pattern.clone(),
                        source,
                    })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(Self {
            tables: tables.clone(),
            goal_rules,
        })
    }

    pub fn tables_version(&self) -> &str {
        &self.tables.version
    }

    /// Map a parsed name, with an optional platform objective code, to its
    /// attribution dimensions. Unknown values degrade to defaults.
    pub fn map(&self, parsed: &ParsedCampaign, objective: Option<&str>) -> MappingOutcome {
        let mut unmapped = Vec::new();

        let mut campaign_type = match self.tables.channel_to_type.get(&parsed.channel) {
            Some(ct) => *ct,
            None => {
                unmapped.push(UnmappedValue {
                    field: "channel",
                    value: parsed.channel.clone(),
                });
                CampaignType::Performance
            }
        };
        if let Some(ct) = objective
            .map(str::trim)
            .and_then(|code| self.tables.objective_to_type.get(code))
        {
            if *ct != campaign_type {
                debug!(objective = ?objective, channel = %parsed.channel, "objective overrides channel type");
            }
            campaign_type = *ct;
        }

        let goal = self.goal_for(campaign_type, &parsed.targeting_text());

        let source = self.lookup_or_unknown(
            &self.tables.platform_to_source,
            "platform",
            &parsed.platform,
            &mut unmapped,
        );
        let country =
            self.lookup_or_unknown(&self.tables.city_to_country, "city", &parsed.city, &mut unmapped);

        let restaurant_display = match self.tables.restaurant_display.get(&parsed.restaurant) {
            Some(display) => display.clone(),
            None => {
                unmapped.push(UnmappedValue {
                    field: "restaurant",
                    value: parsed.restaurant.clone(),
                });
                parsed.restaurant.clone()
            }
        };
        let city_display = self
            .tables
            .city_display
            .get(&parsed.city)
            .cloned()
            .unwrap_or_else(|| parsed.city.clone());

        MappingOutcome {
            attribution: Attribution {
                campaign_type,
                goal,
                source,
                country,
                restaurant_display,
                city_display,
            },
            unmapped,
        }
    }

    /// Map and report every defaulted value to the run diagnostics.
    pub fn map_recorded(
        &self,
        parsed: &ParsedCampaign,
        objective: Option<&str>,
        diagnostics: &RunDiagnostics,
    ) -> Attribution {
        let outcome = self.map(parsed, objective);
        for value in &outcome.unmapped {
            diagnostics.record(DiagnosticKind::UnmappedValue, value.to_string());
        }
        outcome.attribution
    }

    fn goal_for(&self, campaign_type: CampaignType, targeting: &str) -> String {
        if let Some((_, goal)) = self.goal_rules.iter().find(|(re, _)| re.is_match(targeting)) {
            return goal.clone();
        }
        self.tables
            .type_to_goal
            .get(&campaign_type)
            .cloned()
            .unwrap_or_else(|| campaign_type.as_str().to_string())
    }

    fn lookup_or_unknown(
        &self,
        table: &std::collections::BTreeMap<String, String>,
        field: &'static str,
        key: &str,
        unmapped: &mut Vec<UnmappedValue>,
    ) -> String {
        match table.get(key) {
            Some(value) => value.clone(),
            None => {
                unmapped.push(UnmappedValue {
                    field,
                    value: key.to_string(),
                });
                UNKNOWN.to_string()
            }
        }
    }
}
