//! Application configuration.
//!
//! Defaults, then an optional TOML file, then environment overrides.
//! Reasoning-service credentials are never read from the file; they come
//! from the environment when the adapter is built.
//!
//! ```toml
//! [ssh]
//! host = "nasty"
//! username = "pi"
//! private_key = "~/.ssh/id_rsa"
//!
//! [ssh.algorithms]
//! cipher = ["aes256-gcm@openssh.com"]
//!
//! [session]
//! command_timeout_secs = 300
//!
//! [translator]
//! phrase_file = "/etc/cmdc/phrases.toml"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cmdc_analyzer::AnalyzerOptions;
use cmdc_core::DEFAULT_BUS_CAPACITY;
use cmdc_llm::{LlmAdapter, LlmOptions, ReasoningService, RetryPolicy};
use cmdc_runner::{SessionOptions, SshConfig};
use cmdc_translate::{builtin_table, PhraseTable, TranslatorOptions};

use crate::error::{PipelineError, PipelineResult};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CMDC_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub connect_timeout_secs: u64,
    /// Total runtime ceiling; `None` disables it
    pub command_timeout_secs: Option<u64>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 20,
            command_timeout_secs: Some(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorSection {
    /// Replaces the built-in phrase table
    pub phrase_file: Option<PathBuf>,
    pub passthrough: bool,
    /// Consult the reasoning service for unmatched input
    pub use_service: bool,
    pub service_timeout_secs: u64,
    pub min_service_confidence: f64,
}

impl Default for TranslatorSection {
    fn default() -> Self {
        Self {
            phrase_file: None,
            passthrough: true,
            use_service: true,
            service_timeout_secs: 15,
            min_service_confidence: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSection {
    /// Run the analysis after every completed command
    pub enabled: bool,
    /// Consult the reasoning service before the rules
    pub use_service: bool,
    pub max_attempts: u32,
    pub base_timeout_secs: u64,
    pub backoff_ms: u64,
    pub max_output_chars: usize,
}

impl Default for AnalyzerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            use_service: true,
            max_attempts: 2,
            base_timeout_secs: 10,
            backoff_ms: 500,
            max_output_chars: cmdc_analyzer::DEFAULT_MAX_OUTPUT_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        let options = LlmOptions::default();
        Self {
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSection {
    pub capacity: usize,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    /// Accepted inputs kept as translation context
    pub limit: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self { limit: 10 }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ssh: SshConfig,
    pub session: SessionSection,
    pub translator: TranslatorSection,
    pub analyzer: AnalyzerSection,
    pub llm: LlmSection,
    pub bus: BusSection,
    pub history: HistorySection,
}

impl AppConfig {
    /// Load from `path`, or from `$CMDC_CONFIG`, or defaults; then apply the
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let config = match path {
            Some(path) => {
                debug!(path = %path.display(), "loading config file");
                let content = std::fs::read_to_string(&path)
                    .map_err(|source| PipelineError::ConfigFile { path, source })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };

        config.apply_env().validated()
    }

    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `SSH_HOST`, `SSH_PORT`, `SSH_USERNAME` and `SSH_PRIVATE_KEY`.
    pub fn apply_env(mut self) -> Self {
        self.ssh = self.ssh.apply_env();
        self
    }

    fn validated(self) -> PipelineResult<Self> {
        if self.ssh.host.trim().is_empty() {
            return Err(PipelineError::Config("ssh.host is empty".to_string()));
        }
        if self.ssh.username.trim().is_empty() {
            return Err(PipelineError::Config("ssh.username is empty".to_string()));
        }
        if self.bus.capacity == 0 {
            return Err(PipelineError::Config("bus.capacity must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.translator.min_service_confidence) {
            return Err(PipelineError::Config(
                "translator.min_service_confidence must be within 0.0..=1.0".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::default()
            .connect_timeout(Duration::from_secs(self.session.connect_timeout_secs))
            .max_runtime(self.session.command_timeout_secs.map(Duration::from_secs))
    }

    pub fn translator_options(&self) -> TranslatorOptions {
        TranslatorOptions {
            service_timeout: Duration::from_secs(self.translator.service_timeout_secs),
            min_service_confidence: self.translator.min_service_confidence,
            passthrough: self.translator.passthrough,
        }
    }

    pub fn analyzer_options(&self) -> AnalyzerOptions {
        AnalyzerOptions {
            retry: RetryPolicy::new(
                self.analyzer.max_attempts,
                Duration::from_secs(self.analyzer.base_timeout_secs),
            )
            .with_backoff(Duration::from_millis(self.analyzer.backoff_ms)),
            max_output_chars: self.analyzer.max_output_chars,
        }
    }

    pub fn llm_options(&self) -> LlmOptions {
        LlmOptions {
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
        }
    }

    /// The configured phrase file, or the built-in catalog.
    pub fn phrase_table(&self) -> PipelineResult<PhraseTable> {
        match &self.translator.phrase_file {
            Some(path) => Ok(PhraseTable::load(path)?),
            None => Ok(builtin_table()),
        }
    }

    /// Reasoning service from the environment credentials, if any.
    pub fn reasoning_service(&self) -> Option<Arc<dyn ReasoningService>> {
        match LlmAdapter::from_env() {
            Ok(adapter) => {
                info!(model = adapter.model(), "reasoning service configured");
                let service: Arc<dyn ReasoningService> =
                    Arc::new(adapter.with_options(self.llm_options()));
                Some(service)
            }
            Err(e) => {
                info!(reason = %e, "running without reasoning service");
                None
            }
        }
    }
}
