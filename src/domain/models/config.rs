//! Operator configuration model.
//!
//! Loaded hierarchically (defaults, YAML file, environment) by
//! `infrastructure::config::ConfigLoader`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            monitor: MonitorConfig::default(),
            agent: AgentConfig::default(),
            llm: LlmConfig::default(),
            safety: SafetyConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the operator database (tickets, actions, audit log).
    pub path: String,
    /// Path to the eval database (campaigns, trials).
    pub eval_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ".warden/operator.db".to_string(),
            eval_path: ".warden/eval.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between check cycles.
    pub interval_secs: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_secs: 30.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Seconds between polling cycles.
    pub poll_interval_secs: f64,
    /// Model used for diagnosis.
    pub model: String,
    pub max_tokens: u32,
    /// Seconds to wait after an executed action before re-observing.
    pub verify_delay_secs: f64,
    /// How many similar past tickets to include in diagnosis context.
    pub similar_ticket_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10.0,
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 4096,
            verify_delay_secs: 5.0,
            similar_ticket_limit: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            timeout_secs: 300,
            max_retries: 3,
            initial_backoff_ms: 10_000,
            max_backoff_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// When true, every execution requires explicit approval.
    /// Overridden by the OPERATOR_APPROVAL_MODE environment variable.
    pub approval_mode: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self { approval_mode: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: i64,
    pub base_delay_secs: f64,
    pub factor: f64,
    pub max_delay_secs: f64,
    /// Jitter as a fraction of the computed delay (0.2 = +/-20%).
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 5.0,
            factor: 2.0,
            max_delay_secs: 300.0,
            jitter_ratio: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
