//! Configuration types for Inquest
//!
//! A single [`InquestConfig`] is loaded at startup and shared read-only for the
//! lifetime of a run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{InquestError, Result};
use crate::llm::{CallPolicy, RetryConfig};
use crate::tools::MAX_SEARCH_RESULTS;

/// Hard upper bound on clarification rounds
pub const MAX_CLARIFICATION_ROUNDS: usize = 3;

const REDACTED: &str = "********";

/// Main configuration for Inquest
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InquestConfig {
    /// Budgets and caps of the orchestration engine
    pub research: ResearchConfig,

    /// Timeout and retry policy for every capability call
    pub capabilities: CapabilityConfig,

    /// Reasoning provider
    pub llm: LLMProviderConfig,

    /// Search provider
    pub search: SearchConfig,

    /// Report storage
    pub storage: StorageConfig,
}

/// Budgets and caps of the orchestration engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Clarifying questions asked before research starts (0..=3)
    pub max_clarification_rounds: usize,

    /// Researchers running at the same time
    pub max_concurrent_researchers: usize,

    /// Search/reflect iterations per researcher
    pub max_researcher_iterations: usize,

    /// Supervisor planning passes per run
    pub max_planning_passes: usize,

    /// Token-set similarity at which a new topic counts as already covered
    pub overlap_threshold: f64,

    /// Report size budget in estimated tokens (chars / 4)
    pub report_token_budget: usize,

    /// Longest finding kept verbatim, in characters
    pub max_note_chars: usize,

    /// Hits requested per search
    pub search_results: usize,

    /// Summarize sources longer than `max_note_chars` with the reasoning
    /// capability; truncation is the fallback
    pub summarize_sources: bool,

    /// Rewrite the merged report with the reasoning capability; the merged
    /// report is kept when the rewrite is unusable
    pub synthesize_report: bool,

    /// Wall-clock limit for research; researchers stop at their next iteration
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub run_deadline: Option<Duration>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_clarification_rounds: MAX_CLARIFICATION_ROUNDS,
            max_concurrent_researchers: 3,
            max_researcher_iterations: 5,
            max_planning_passes: 4,
            overlap_threshold: 0.8,
            report_token_budget: 32_000,
            max_note_chars: 2_000,
            search_results: 3,
            summarize_sources: false,
            synthesize_report: false,
            run_deadline: None,
        }
    }
}

/// Timeout and retry policy for capability calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    /// Upper bound on a single call attempt
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,

    /// Attempts per call, including the first
    pub max_attempts: usize,

    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,

    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl CapabilityConfig {
    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy::new(
            self.call_timeout,
            RetryConfig::default()
                .with_max_attempts(self.max_attempts)
                .with_initial_delay(self.initial_backoff)
                .with_max_delay(self.max_backoff),
        )
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMProviderConfig {
    /// Provider type
    pub provider: LLMProvider,

    /// Model name
    pub model: String,

    /// API key (if unset, read from the provider's env var)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL (for compatible endpoints)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for LLMProviderConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::OpenAI,
            model: "gpt-4o".to_string(),
            api_key: None,
            base_url: None,
            temperature: None,
        }
    }
}

/// Reasoning provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    OpenAI,
}

/// Search provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub provider: SearchProviderKind,

    /// API key (if unset, read from `TAVILY_API_KEY`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Search topic passed to the provider
    pub topic: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProviderKind::Tavily,
            api_key: None,
            base_url: None,
            topic: "general".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    Tavily,
}

/// Report storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory reports are written under
    pub local_dir: PathBuf,

    /// Base URL reports are PUT to, if remote storage is wanted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_token: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_dir: PathBuf::from("."),
            remote_base_url: None,
            remote_token: None,
        }
    }
}

impl InquestConfig {
    /// Load configuration from files and environment.
    ///
    /// Sources, later ones winning: built-in defaults, `inquest.toml`, the file
    /// named by `INQUEST_CONFIG_PATH`, then `INQUEST_`-prefixed environment
    /// variables with `__` separating sections (e.g.
    /// `INQUEST_RESEARCH__MAX_PLANNING_PASSES=6`).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration file is invalid or fails validation.
    pub fn load() -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(InquestConfig::default()))
            .merge(Toml::file("inquest.toml"));

        // Check for custom config path
        if let Ok(path) = std::env::var("INQUEST_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: InquestConfig = figment
            .merge(Env::prefixed("INQUEST_").split("__"))
            .extract()
            .map_err(|e| {
                InquestError::Configuration(format!("Failed to load configuration: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let path = path.as_ref();
        if !path.exists() {
            return Err(InquestError::Configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let config: InquestConfig = Figment::from(Serialized::defaults(InquestConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("INQUEST_").split("__"))
            .extract()
            .map_err(|e| {
                InquestError::Configuration(format!("Failed to load configuration file: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let r = &self.research;
        let invalid = |msg: String| Err(InquestError::Configuration(msg));

        if r.max_clarification_rounds > MAX_CLARIFICATION_ROUNDS {
            return invalid(format!(
                "research.max_clarification_rounds must be at most {}, got {}",
                MAX_CLARIFICATION_ROUNDS, r.max_clarification_rounds
            ));
        }
        for (name, value) in [
            ("research.max_concurrent_researchers", r.max_concurrent_researchers),
            ("research.max_researcher_iterations", r.max_researcher_iterations),
            ("research.max_planning_passes", r.max_planning_passes),
            ("research.report_token_budget", r.report_token_budget),
            ("research.max_note_chars", r.max_note_chars),
            ("capabilities.max_attempts", self.capabilities.max_attempts),
        ] {
            if value == 0 {
                return invalid(format!("{} must be greater than zero", name));
            }
        }
        if !(r.overlap_threshold > 0.0 && r.overlap_threshold <= 1.0) {
            return invalid(format!(
                "research.overlap_threshold must be in (0, 1], got {}",
                r.overlap_threshold
            ));
        }
        if r.search_results == 0 || r.search_results > MAX_SEARCH_RESULTS {
            return invalid(format!(
                "research.search_results must be between 1 and {}",
                MAX_SEARCH_RESULTS
            ));
        }
        if self.capabilities.call_timeout.is_zero() {
            return invalid("capabilities.call_timeout must be non-zero".to_string());
        }
        if let Some(temperature) = self.llm.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return invalid(format!("llm.temperature must be in [0, 2], got {}", temperature));
            }
        }

        Ok(())
    }

    /// Copy with every secret replaced, for display
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        let hide = |secret: &mut Option<String>| {
            if secret.is_some() {
                *secret = Some(REDACTED.to_string());
            }
        };
        hide(&mut config.llm.api_key);
        hide(&mut config.search.api_key);
        hide(&mut config.storage.remote_token);
        config
    }
}
