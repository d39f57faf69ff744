use crate::error::{Result, SequentialThinkingError};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MAX_THOUGHT_LENGTH: usize = 20_000;
pub const DEFAULT_MAX_THOUGHTS: usize = 20;
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Sequential thinking service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequentialThinkingConfig {
    /// Bounds applied to every session
    pub limits: LimitsConfig,
    /// Server identity and diagnostics
    pub server: ServerConfig,
    /// Prompt argument persistence
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// Per-session bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum characters in a single thought
    pub max_thought_length: usize,
    /// Maximum accepted thoughts per session
    pub max_thoughts: usize,
    /// Advisory wall-clock budget for a session, enforced by the transport
    pub timeout_ms: u64,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server name/identifier
    pub name: String,
    /// Server version
    pub version: String,
    /// Verbose diagnostic logging
    pub debug: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// JSON file holding persisted prompt argument values; in-memory only when unset
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

/// Values supplied on the command line; each one wins over every other source
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub debug: bool,
    pub max_thoughts: Option<usize>,
    pub max_thought_length: Option<usize>,
    pub timeout_ms: Option<u64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_thought_length: DEFAULT_MAX_THOUGHT_LENGTH,
            max_thoughts: DEFAULT_MAX_THOUGHTS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl LimitsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "sequential-thinking".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            debug: false,
        }
    }
}

impl SequentialThinkingConfig {
    /// Load configuration from defaults, an optional TOML file and the environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Config::builder()
            .set_default("limits.max_thought_length", DEFAULT_MAX_THOUGHT_LENGTH as i64)?
            .set_default("limits.max_thoughts", DEFAULT_MAX_THOUGHTS as i64)?
            .set_default("limits.timeout_ms", DEFAULT_TIMEOUT_MS as i64)?
            .set_default("server.name", "sequential-thinking")?
            .set_default("server.version", env!("CARGO_PKG_VERSION"))?
            .set_default("server.debug", false)?;

        // An explicit path must exist; the conventional one is optional
        if let Some(path) = config_path {
            tracing::info!("Using configuration file: {}", path.display());
            config = config.add_source(File::from(path).required(true));
        } else if let Ok(config_file) = std::env::var("SEQUENTIAL_THINKING_CONFIG") {
            config = config.add_source(File::with_name(&config_file).required(false));
        } else {
            config = config.add_source(File::with_name("sequential-thinking.toml").required(false));
        }

        config = config.add_source(
            Environment::with_prefix("SEQUENTIAL_THINKING")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = config.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if overrides.debug {
            self.server.debug = true;
        }
        if let Some(max_thoughts) = overrides.max_thoughts {
            self.limits.max_thoughts = max_thoughts;
        }
        if let Some(max_thought_length) = overrides.max_thought_length {
            self.limits.max_thought_length = max_thought_length;
        }
        if let Some(timeout_ms) = overrides.timeout_ms {
            self.limits.timeout_ms = timeout_ms;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_thought_length == 0 {
            return Err(SequentialThinkingError::InvalidConfig {
                field: "limits.max_thought_length".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.limits.max_thoughts == 0 {
            return Err(SequentialThinkingError::InvalidConfig {
                field: "limits.max_thoughts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.limits.timeout_ms == 0 {
            return Err(SequentialThinkingError::InvalidConfig {
                field: "limits.timeout_ms".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Log filter used when RUST_LOG is not set
    pub fn default_log_filter(&self) -> &'static str {
        if self.server.debug {
            "sequential_thinking=debug,rmcp=info"
        } else {
            "sequential_thinking=info,rmcp=warn"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = SequentialThinkingConfig::default();
        assert_eq!(config.limits.max_thought_length, 20_000);
        assert_eq!(config.limits.max_thoughts, 20);
        assert_eq!(config.limits.timeout_ms, 60_000);
        assert!(!config.server.debug);
        assert!(config.prompts.store_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[limits]\nmax_thoughts = 5\nmax_thought_length = 100\n\n[server]\ndebug = true\n"
        )
        .unwrap();

        let config = SequentialThinkingConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.limits.max_thoughts, 5);
        assert_eq!(config.limits.max_thought_length, 100);
        assert_eq!(config.limits.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(config.server.debug);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(SequentialThinkingConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = SequentialThinkingConfig::default();
        config.limits.max_thoughts = 0;
        assert!(matches!(
            config.validate(),
            Err(SequentialThinkingError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_overrides_win() {
        let mut config = SequentialThinkingConfig::default();
        config.apply_overrides(&ConfigOverrides {
            debug: true,
            max_thoughts: Some(3),
            max_thought_length: None,
            timeout_ms: Some(500),
        });
        assert!(config.server.debug);
        assert_eq!(config.limits.max_thoughts, 3);
        assert_eq!(config.limits.max_thought_length, DEFAULT_MAX_THOUGHT_LENGTH);
        assert_eq!(config.limits.timeout(), Duration::from_millis(500));
        assert_eq!(config.default_log_filter(), "sequential_thinking=debug,rmcp=info");
    }
}
