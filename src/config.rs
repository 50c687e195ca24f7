use crate::error::{Error, Result};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Credentials and optional model override for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// The persisted configuration record.
///
/// One global record lives under the home directory; a project may carry its
/// own record which, when present, replaces the global one wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub active: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default = "default_true")]
    pub history: bool,
    #[serde(default)]
    pub cache_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            active: "openai".to_string(),
            providers: HashMap::new(),
            history: true,
            cache_enabled: false,
        }
    }
}

/// Thin source of truth over the two configuration scopes.
///
/// Every operation re-reads persisted state; nothing is cached in memory, so
/// concurrent CLI invocations only race at the filesystem level.
pub struct ConfigManager {
    global_path: PathBuf,
    project_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let home = home_dir().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not find home directory",
            ))
        })?;
        let cwd = env::current_dir()?;
        Ok(Self::with_paths(
            home.join(".promptsmith").join("config.json"),
            cwd.join(".promptsmith").join("config.json"),
        ))
    }

    /// Build a manager over explicit paths. Used by tests to point both
    /// scopes into a temporary directory.
    pub fn with_paths(global_path: PathBuf, project_path: PathBuf) -> Self {
        Self {
            global_path,
            project_path,
        }
    }

    /// Create the global record with built-in defaults if it does not exist.
    pub fn init(&self) -> Result<()> {
        if let Some(parent) = self.global_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if !self.global_path.exists() {
            self.save_global(&Config::default())?;
            info!("Created default config at {}", self.global_path.display());
        }
        Ok(())
    }

    /// The effective configuration: project record if present, else global.
    pub fn load(&self) -> Result<Config> {
        if self.project_path.exists() {
            debug!("Using project config at {}", self.project_path.display());
            return self.read(&self.project_path);
        }
        if self.global_path.exists() {
            return self.read(&self.global_path);
        }
        Err(Error::ConfigurationMissing)
    }

    fn read(&self, path: &PathBuf) -> Result<Config> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_global(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.global_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.global_path, serde_json::to_string_pretty(config)?)?;
        Ok(())
    }

    pub fn save_project(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.project_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.project_path, serde_json::to_string_pretty(config)?)?;
        Ok(())
    }

    /// Upsert credentials for a provider. Persists at global scope.
    pub fn set_provider(&self, provider: &str, provider_config: ProviderConfig) -> Result<()> {
        let mut config = self.load()?;
        config
            .providers
            .insert(provider.to_string(), provider_config);
        self.save_global(&config)?;
        info!("Stored credentials for provider {provider}");
        Ok(())
    }

    /// Switch the active provider. Fails if the provider has no stored
    /// credentials, leaving the previous selection untouched.
    pub fn set_active(&self, provider: &str) -> Result<()> {
        let mut config = self.load()?;
        if !config.providers.contains_key(provider) {
            return Err(Error::ProviderNotConfigured(provider.to_string()));
        }
        config.active = provider.to_string();
        self.save_global(&config)?;
        info!("Active provider is now {provider}");
        Ok(())
    }

    /// Directory holding the global record, for sibling state files.
    pub fn global_dir(&self) -> Option<PathBuf> {
        self.global_path.parent().map(|p| p.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> ConfigManager {
        ConfigManager::with_paths(
            dir.path().join("global").join("config.json"),
            dir.path().join("project").join("config.json"),
        )
    }

    #[test]
    fn load_fails_before_init() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        assert!(matches!(mgr.load(), Err(Error::ConfigurationMissing)));
    }

    #[test]
    fn init_creates_default_global_config() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        mgr.init().unwrap();

        let config = mgr.load().unwrap();
        assert_eq!(config.active, "openai");
        assert!(config.providers.is_empty());
        assert!(config.history);
        assert!(!config.cache_enabled);
    }

    #[test]
    fn init_does_not_clobber_existing_config() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        mgr.init().unwrap();
        mgr.set_provider(
            "anthropic",
            ProviderConfig {
                api_key: "sk-test".to_string(),
                model: None,
            },
        )
        .unwrap();
        mgr.set_active("anthropic").unwrap();

        mgr.init().unwrap();
        assert_eq!(mgr.load().unwrap().active, "anthropic");
    }

    #[test]
    fn project_config_replaces_global_wholesale() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        mgr.init().unwrap();
        mgr.set_provider(
            "openai",
            ProviderConfig {
                api_key: "global-key".to_string(),
                model: None,
            },
        )
        .unwrap();

        let project = Config {
            active: "gemini".to_string(),
            ..Config::default()
        };
        mgr.save_project(&project).unwrap();

        let effective = mgr.load().unwrap();
        assert_eq!(effective.active, "gemini");
        // Replacement, not merge: the global provider entry is not visible.
        assert!(effective.providers.is_empty());
    }

    #[test]
    fn set_active_rejects_unconfigured_provider() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        mgr.init().unwrap();

        let err = mgr.set_active("anthropic").unwrap_err();
        assert!(matches!(err, Error::ProviderNotConfigured(p) if p == "anthropic"));
        assert_eq!(mgr.load().unwrap().active, "openai");
    }

    #[test]
    fn set_provider_then_set_active_round_trips() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        mgr.init().unwrap();
        mgr.set_provider(
            "gemini",
            ProviderConfig {
                api_key: "g-key".to_string(),
                model: Some("gemini-2.5-pro".to_string()),
            },
        )
        .unwrap();
        mgr.set_active("gemini").unwrap();

        let config = mgr.load().unwrap();
        assert_eq!(config.active, "gemini");
        assert_eq!(
            config.providers["gemini"].model.as_deref(),
            Some("gemini-2.5-pro")
        );
    }

    #[test]
    fn config_serializes_with_camel_case_keys() {
        let mut config = Config::default();
        config.providers.insert(
            "openai".to_string(),
            ProviderConfig {
                api_key: "k".to_string(),
                model: None,
            },
        );
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"cacheEnabled\""));
        assert!(json.contains("\"apiKey\""));
    }
}
