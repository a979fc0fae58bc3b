// Runtime configuration: environment settings plus the language registry
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::types::Language;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_SANDBOX_URL: &str = "http://127.0.0.1:2000/api/v2/execute";
pub const DEFAULT_SANDBOX_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PROBLEMS_PATH: &str = "data/problems.json";
pub const DEFAULT_PROBLEM_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_LANGUAGES_CONFIG: &str = "config/languages.json";

/// Service settings, read once at boot
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub sandbox_url: String,
    pub sandbox_timeout_ms: u64,
    pub problems_path: PathBuf,
    pub problem_cache_ttl_secs: u64,
    pub languages_config: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("BIND_ADDR", DEFAULT_BIND_ADDR),
            sandbox_url: env_or("SANDBOX_URL", DEFAULT_SANDBOX_URL),
            sandbox_timeout_ms: env_parsed("SANDBOX_TIMEOUT_MS", DEFAULT_SANDBOX_TIMEOUT_MS),
            problems_path: PathBuf::from(env_or("PROBLEMS_PATH", DEFAULT_PROBLEMS_PATH)),
            problem_cache_ttl_secs: env_parsed(
                "PROBLEM_CACHE_TTL_SECS",
                DEFAULT_PROBLEM_CACHE_TTL_SECS,
            ),
            languages_config: PathBuf::from(env_or("LANGUAGES_CONFIG", DEFAULT_LANGUAGES_CONFIG)),
        }
    }

    pub fn sandbox_timeout(&self) -> Duration {
        Duration::from_millis(self.sandbox_timeout_ms)
    }

    pub fn problem_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.problem_cache_ttl_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            sandbox_url: DEFAULT_SANDBOX_URL.to_string(),
            sandbox_timeout_ms: DEFAULT_SANDBOX_TIMEOUT_MS,
            problems_path: PathBuf::from(DEFAULT_PROBLEMS_PATH),
            problem_cache_ttl_secs: DEFAULT_PROBLEM_CACHE_TTL_SECS,
            languages_config: PathBuf::from(DEFAULT_LANGUAGES_CONFIG),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

/// How a submission language is addressed on the sandbox service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: Language,
    /// Language id understood by the sandbox (e.g. "python")
    pub sandbox_language: String,
    pub version: String,
    pub file_extension: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageConfig>,
}

/// Language configuration manager
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    configs: BTreeMap<Language, LanguageConfig>,
}

impl LanguageConfigManager {
    /// Load language configurations from languages.json
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        Self::from_json(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let languages_json: LanguagesJson = serde_json::from_str(content)?;
        if languages_json.languages.is_empty() {
            bail!("No languages configured");
        }
        Ok(Self::from_configs(languages_json.languages))
    }

    pub fn from_configs(languages: Vec<LanguageConfig>) -> Self {
        let configs = languages.into_iter().map(|lang| (lang.name, lang)).collect();
        Self { configs }
    }

    /// Defaults matching a stock Piston installation
    pub fn builtin() -> Self {
        Self::from_configs(vec![
            LanguageConfig {
                name: Language::Python,
                sandbox_language: "python".to_string(),
                version: "3.10.0".to_string(),
                file_extension: "py".to_string(),
            },
            LanguageConfig {
                name: Language::JavaScript,
                sandbox_language: "javascript".to_string(),
                version: "18.15.0".to_string(),
                file_extension: "js".to_string(),
            },
        ])
    }

    /// Load from `path`, or fall back to [`LanguageConfigManager::builtin`] when absent
    pub fn load_or_builtin(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::builtin())
        }
    }

    /// Get configuration for a specific language
    pub fn get_config(&self, language: Language) -> Option<&LanguageConfig> {
        self.configs.get(&language)
    }

    /// List all configured languages
    pub fn list_languages(&self) -> Vec<Language> {
        self.configs.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_languages_json() {
        let manager = LanguageConfigManager::from_json(
            r#"{"languages": [
                {"name": "python", "sandbox_language": "python", "version": "3.12.0", "file_extension": "py"}
            ]}"#,
        )
        .unwrap();

        let python = manager.get_config(Language::Python).unwrap();
        assert_eq!(python.version, "3.12.0");
        assert!(manager.get_config(Language::JavaScript).is_none());
        assert_eq!(manager.list_languages(), vec![Language::Python]);
    }

    #[test]
    fn test_empty_languages_rejected() {
        assert!(LanguageConfigManager::from_json(r#"{"languages": []}"#).is_err());
        assert!(LanguageConfigManager::from_json("not json").is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_builtin() {
        let manager =
            LanguageConfigManager::load_or_builtin(Path::new("does/not/exist.json")).unwrap();
        assert_eq!(manager.list_languages(), Language::ALL.to_vec());
        assert!(LanguageConfigManager::load(Path::new("does/not/exist.json")).is_err());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sandbox_timeout(), Duration::from_secs(10));
        assert_eq!(config.problem_cache_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_shipped_languages_json_matches_builtin() {
        let shipped = LanguageConfigManager::from_json(include_str!("../../../config/languages.json")).unwrap();
        let builtin = LanguageConfigManager::builtin();
        for language in Language::ALL {
            assert_eq!(shipped.get_config(language), builtin.get_config(language));
        }
    }
}
