//! Configuration file management for folio.
//!
//! Provides a TOML-based config file at `~/.config/folio/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use folio_core::config::EngineConfig;
use folio_core::generator::{GeneratorConfig, Provider};
use folio_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub generator: GeneratorSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub notifications: NotificationSection,
    #[serde(default)]
    pub engine: EngineSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: DbConfig::DEFAULT_URL.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeneratorSection {
    /// One of: anthropic, openai, ollama.
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Usually left unset; the provider's environment variable is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: None,
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutputSection {
    pub directory: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            directory: "output".to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NotificationSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_generations: usize,
}

fn default_backend_timeout_secs() -> u64 {
    300
}

fn default_max_concurrent() -> usize {
    2
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            backend_timeout_secs: default_backend_timeout_secs(),
            max_concurrent_generations: default_max_concurrent(),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the folio config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/folio` or `~/.config/folio`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("folio");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("folio")
}

/// Return the path to the folio config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix (the file may hold an API key).
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct FolioConfig {
    pub db_config: DbConfig,
    pub generator: GeneratorConfig,
    pub engine: EngineConfig,
    pub output_dir: PathBuf,
    pub webhook_url: Option<String>,
}

impl FolioConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config
    /// file > default.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().unwrap_or_default();

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var("FOLIO_DATABASE_URL") {
            url
        } else {
            file_config.database.url.clone()
        };

        let provider: Provider = file_config
            .generator
            .provider
            .parse()
            .with_context(|| format!("invalid provider {:?}", file_config.generator.provider))?;

        let generator = GeneratorConfig {
            provider,
            model: file_config.generator.model.clone(),
            api_key: file_config.generator.api_key.clone(),
            base_url: file_config.generator.base_url.clone(),
            temperature: file_config.generator.temperature,
        };

        let engine = EngineConfig {
            backend_deadline: Duration::from_secs(file_config.engine.backend_timeout_secs),
            max_concurrent_generations: file_config.engine.max_concurrent_generations,
            ..EngineConfig::default()
        };

        Ok(Self {
            db_config: DbConfig::new(db_url),
            generator,
            engine,
            output_dir: PathBuf::from(&file_config.output.directory),
            webhook_url: file_config.notifications.webhook_url.clone(),
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
