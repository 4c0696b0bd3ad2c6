//! Analyst configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::refine::Severity;

/// Main analyst configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model provider
    pub llm: LlmConfig,

    /// Reasoning-loop limits and retry policy
    pub driver: DriverConfig,

    /// Context budget and pruning
    pub context: ContextConfig,

    /// Stage planning thresholds
    pub planner: PlannerConfig,

    /// Validator-refiner settings
    pub refine: RefineConfig,

    /// Tool collaborator settings
    pub tools: ToolsConfig,

    /// Report output settings
    pub output: OutputConfig,

    /// Independent requests the CLI may run at once
    #[serde(rename = "max-concurrent-requests")]
    pub max_concurrent_requests: usize,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            driver: DriverConfig::default(),
            context: ContextConfig::default(),
            planner: PlannerConfig::default(),
            refine: RefineConfig::default(),
            tools: ToolsConfig::default(),
            output: OutputConfig::default(),
            max_concurrent_requests: 2,
            log_level: None,
        }
    }
}

impl Config {
    /// Reject a configuration that cannot reach the provider
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        self.validate_limits()
    }

    /// Check numeric settings for consistency (no environment access)
    pub fn validate_limits(&self) -> Result<()> {
        if self.driver.max_iterations == 0 {
            return Err(eyre::eyre!("driver.max-iterations must be at least 1"));
        }
        if self.driver.max_retries == 0 || self.driver.max_retries > 3 {
            return Err(eyre::eyre!(
                "driver.max-retries is {}, must be between 1 and 3 attempts",
                self.driver.max_retries
            ));
        }
        if self.context.min_recent_turns == 0 {
            return Err(eyre::eyre!("context.min-recent-turns must be at least 1"));
        }
        if self.planner.summary_ceiling == 0 {
            return Err(eyre::eyre!("planner.summary-ceiling must be greater than 0"));
        }
        if self.refine.max_cycles > 3 {
            return Err(eyre::eyre!(
                "refine.max-cycles is {}, at most 3 correction cycles are supported",
                self.refine.max_cycles
            ));
        }
        if self.refine.acceptance_score > 100 {
            return Err(eyre::eyre!("refine.acceptance-score must be within 0-100"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(eyre::eyre!("max-concurrent-requests must be at least 1"));
        }
        Ok(())
    }

    /// Explicit path, then `.analyst.yml`, then the user config dir, then defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .analyst.yml
        let local_config = PathBuf::from(".analyst.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/analyst/analyst.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("analyst").join("analyst.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// `[llm]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Only `anthropic` is implemented
    pub provider: String,

    pub model: String,

    /// Env var the key is read from
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Output ceiling per completion
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Per-request HTTP timeout
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Extended-thinking budget; omit to disable reasoning mode
    #[serde(rename = "reasoning-budget")]
    pub reasoning_budget: Option<u32>,
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).map_err(|_| eyre::eyre!("Environment variable {} is not set", self.api_key_env))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 16000,
            timeout_ms: 600_000,
            reasoning_budget: Some(8000),
        }
    }
}

/// Reasoning-loop limits and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Provider round-trips allowed per invocation
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    /// Attempts per provider call, including the first
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Backoff before the second attempt; doubles each attempt
    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on any single backoff
    #[serde(rename = "max-backoff-ms")]
    pub max_backoff_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}

/// Context budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Estimated tokens above which the conversation is pruned
    #[serde(rename = "threshold-tokens")]
    pub threshold_tokens: usize,

    /// Most recent turns always retained
    #[serde(rename = "min-recent-turns")]
    pub min_recent_turns: usize,

    /// Backward expansions tried before giving up
    #[serde(rename = "max-prune-attempts")]
    pub max_prune_attempts: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            threshold_tokens: 150_000,
            min_recent_turns: 6,
            max_prune_attempts: 5,
        }
    }
}

/// Stage planning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Source size in bytes above which a period is compressed
    #[serde(rename = "large-document-threshold")]
    pub large_document_threshold: usize,

    /// Maximum characters of any retained summary
    #[serde(rename = "summary-ceiling")]
    pub summary_ceiling: usize,

    /// Document type measured to choose the strategy
    #[serde(rename = "primary-document")]
    pub primary_document: String,

    /// Iteration budget for each prior-period pass
    #[serde(rename = "prior-max-iterations")]
    pub prior_max_iterations: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            large_document_threshold: 200_000,
            summary_ceiling: 15_000,
            primary_document: "annual-report".to_string(),
            prior_max_iterations: 15,
        }
    }
}

/// Validator-refiner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    /// Correction cycles allowed (0 disables refinement)
    #[serde(rename = "max-cycles")]
    pub max_cycles: u32,

    /// Critique score at or above which no correction is needed
    #[serde(rename = "acceptance-score")]
    pub acceptance_score: u8,

    /// Lowest issue severity handed to the fix pass
    #[serde(rename = "min-fix-severity")]
    pub min_fix_severity: Severity,

    /// Iteration budget for critique and fix passes
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            max_cycles: 2,
            acceptance_score: 80,
            min_fix_severity: Severity::Important,
            max_iterations: 12,
        }
    }
}

/// Tool collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Directory of pre-fetched filings and metrics
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,

    /// Tool output beyond this many characters is cut
    #[serde(rename = "max-output-chars")]
    pub max_output_chars: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".analyst/data"),
            max_output_chars: 100_000,
        }
    }
}

/// Report output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory reports are written to
    #[serde(rename = "report-dir")]
    pub report_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        // XDG data directory (~/.local/share/analyst/reports on Linux)
        let report_dir = dirs::data_dir()
            .map(|d| d.join("analyst").join("reports"))
            .unwrap_or_else(|| PathBuf::from(".analyst/reports"));

        Self { report_dir }
    }
}
