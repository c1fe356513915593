use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DocentError, Result};

/// Top-level configuration for the Docent application.
///
/// Loaded from `~/.docent/config.toml` by default. Each section corresponds
/// to one collaborator of the chat engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocentConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl DocentConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DocentConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.generation.endpoint.trim().is_empty() {
            return Err(DocentError::Config(
                "generation.endpoint must not be empty".to_string(),
            ));
        }
        if self.generation.model.trim().is_empty() {
            return Err(DocentError::Config(
                "generation.model must not be empty".to_string(),
            ));
        }
        if self.generation.connect_timeout_secs == 0 || self.generation.idle_timeout_secs == 0 {
            return Err(DocentError::Config(
                "generation timeouts must be greater than zero".to_string(),
            ));
        }
        if self.generation.max_tool_rounds == 0 {
            return Err(DocentError::Config(
                "generation.max_tool_rounds must be at least 1".to_string(),
            ));
        }
        if self.retrieval.max_passage_chars < MIN_PASSAGE_CHARS {
            return Err(DocentError::Config(format!(
                "retrieval.max_passage_chars must be at least {}",
                MIN_PASSAGE_CHARS
            )));
        }
        Ok(())
    }
}

/// Smallest passage size accepted by `validate`.
pub const MIN_PASSAGE_CHARS: usize = 200;

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the passage database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP API port.
    pub port: u16,
    /// Address the HTTP API binds to.
    pub bind_address: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.docent/data".to_string(),
            log_level: "info".to_string(),
            port: 3040,
            bind_address: "127.0.0.1".to_string(),
        }
    }
}

/// Settings for the OpenAI-compatible generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base URL; `/chat/completions` is appended.
    pub endpoint: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Environment variable holding the API key. The key itself is never
    /// written to the config file.
    pub api_key_env: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Maximum silence between two stream events, in seconds.
    pub idle_timeout_secs: u64,
    /// Tool-call rounds allowed within one turn.
    pub max_tool_rounds: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1".to_string(),
            model: "llama3.1".to_string(),
            api_key_env: "DOCENT_API_KEY".to_string(),
            temperature: 0.2,
            connect_timeout_secs: 10,
            idle_timeout_secs: 120,
            max_tool_rounds: 8,
        }
    }
}

impl GenerationConfig {
    /// Read the API key from the configured environment variable, if set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

/// Knowledge store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Directory ingested on start-up, if any.
    pub documents_dir: Option<String>,
    /// Upper bound on a single passage, in characters.
    pub max_passage_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            documents_dir: None,
            max_passage_chars: 1200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = DocentConfig::default();
        assert_eq!(config.general.data_dir, "~/.docent/data");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.port, 3040);
        assert_eq!(config.generation.model, "llama3.1");
        assert_eq!(config.generation.max_tool_rounds, 8);
        assert_eq!(config.retrieval.max_passage_chars, 1200);
        assert!(config.retrieval.documents_dir.is_none());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
data_dir = "/srv/docent"
log_level = "debug"
port = 8080

[generation]
endpoint = "https://api.example.com/v1"
model = "gpt-4o-mini"
temperature = 0.0

[retrieval]
documents_dir = "/srv/collection"
max_passage_chars = 800
"#;
        let file = create_temp_config(content);
        let config = DocentConfig::load(file.path()).unwrap();
        assert_eq!(config.general.data_dir, "/srv/docent");
        assert_eq!(config.general.port, 8080);
        assert_eq!(config.generation.endpoint, "https://api.example.com/v1");
        assert_eq!(config.generation.model, "gpt-4o-mini");
        assert_eq!(config.generation.temperature, 0.0);
        assert_eq!(
            config.retrieval.documents_dir.as_deref(),
            Some("/srv/collection")
        );
        assert_eq!(config.retrieval.max_passage_chars, 800);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config("[general]\nport = 9000\n");
        let config = DocentConfig::load(file.path()).unwrap();
        assert_eq!(config.general.port, 9000);
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.generation.idle_timeout_secs, 120);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is [not valid");
        let result = DocentConfig::load(file.path());
        assert!(matches!(result, Err(DocentError::Config(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = DocentConfig::load_or_default(Path::new("/nonexistent/docent.toml"));
        assert_eq!(config.general.port, 3040);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = DocentConfig::default();
        config.generation.model = "mistral".to_string();
        config.save(&path).unwrap();

        let reloaded = DocentConfig::load(&path).unwrap();
        assert_eq!(reloaded.generation.model, "mistral");
    }

    // ---- Validation ----

    #[test]
    fn test_default_config_is_valid() {
        assert!(DocentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_endpoint() {
        let mut config = DocentConfig::default();
        config.generation.endpoint = "  ".to_string();
        assert!(matches!(config.validate(), Err(DocentError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_model() {
        let mut config = DocentConfig::default();
        config.generation.model = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let mut config = DocentConfig::default();
        config.generation.idle_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_tool_rounds() {
        let mut config = DocentConfig::default();
        config.generation.max_tool_rounds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_tiny_passages() {
        let mut config = DocentConfig::default();
        config.retrieval.max_passage_chars = MIN_PASSAGE_CHARS - 1;
        assert!(config.validate().is_err());
        config.retrieval.max_passage_chars = MIN_PASSAGE_CHARS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_key_missing_env() {
        let mut config = GenerationConfig::default();
        config.api_key_env = "DOCENT_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        assert!(config.api_key().is_none());
    }
}
