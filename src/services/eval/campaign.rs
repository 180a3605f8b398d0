//! Campaign configuration and matrix expansion.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::errors::{DomainError, DomainResult};

/// One chaos entry in a campaign config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaosSpec {
    #[serde(rename = "type")]
    pub chaos_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// YAML campaign configuration.
///
/// Expands to `subjects x chaos_types x trials_per_combination` trials,
/// optionally with a baseline variant per combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub subjects: Vec<String>,
    pub chaos_types: Vec<ChaosSpec>,
    #[serde(default = "default_trials")]
    pub trials_per_combination: usize,
    #[serde(default)]
    pub include_baseline: bool,
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    #[serde(default)]
    pub cooldown_seconds: u64,
    #[serde(default)]
    pub variant: Option<String>,
}

fn default_trials() -> usize {
    1
}

fn default_parallel() -> usize {
    1
}

impl CampaignConfig {
    pub fn from_yaml(raw: &str) -> DomainResult<Self> {
        let config: Self = serde_yaml::from_str(raw)
            .map_err(|e| DomainError::Configuration(format!("invalid campaign config: {e}")))?;
        if config.subjects.is_empty() {
            return Err(DomainError::Configuration(
                "campaign config needs at least one subject".to_string(),
            ));
        }
        if config.chaos_types.is_empty() {
            return Err(DomainError::Configuration(
                "campaign config needs at least one chaos type".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<std::path::Path>) -> DomainResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            DomainError::Configuration(format!(
                "cannot read campaign config {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_yaml(&raw)
    }
}

/// One expanded trial to run.
#[derive(Debug, Clone)]
pub struct TrialSpec {
    pub subject: String,
    pub chaos_type: String,
    pub chaos_params: Map<String, Value>,
    pub baseline: bool,
}

/// Expand the campaign matrix into individual trial specs.
pub fn expand_campaign_matrix(config: &CampaignConfig) -> Vec<TrialSpec> {
    let mut specs = Vec::new();
    for subject in &config.subjects {
        for chaos in &config.chaos_types {
            for _ in 0..config.trials_per_combination {
                specs.push(TrialSpec {
                    subject: subject.clone(),
                    chaos_type: chaos.chaos_type.clone(),
                    chaos_params: chaos.params.clone(),
                    baseline: false,
                });
            }
            if config.include_baseline {
                for _ in 0..config.trials_per_combination {
                    specs.push(TrialSpec {
                        subject: subject.clone(),
                        chaos_type: chaos.chaos_type.clone(),
                        chaos_params: chaos.params.clone(),
                        baseline: true,
                    });
                }
            }
        }
    }
    specs
}
