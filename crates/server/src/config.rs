//! Server configuration.
//!
//! Read from `$CATEGORIZER_CONFIG`, else `./categorizer.toml` when present,
//! else defaults. `CATEGORIZER_BIND`, `CATEGORIZER_DATABASE` and
//! `CATEGORIZER_LOG_FORMAT` override the file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "categorizer.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("Unknown log format '{other}', expected 'pretty' or 'json'"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// SQLite file, or `:memory:` for a throwaway database.
    pub database_path: PathBuf,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub import_session_ttl_secs: u64,
    pub log_format: LogFormat,
    pub seed_categories: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5001)),
            database_path: PathBuf::from("categorizer.db"),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            max_upload_bytes: 10 * 1024 * 1024,
            import_session_ttl_secs: 3600,
            log_format: LogFormat::Pretty,
            seed_categories: true,
        }
    }
}

impl ServerConfig {
    pub fn load() -> Result<Self> {
        let explicit = std::env::var_os("CATEGORIZER_CONFIG").map(PathBuf::from);
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(bind) = var("CATEGORIZER_BIND") {
            self.bind = bind
                .parse()
                .with_context(|| format!("Invalid CATEGORIZER_BIND '{bind}'"))?;
        }
        if let Some(path) = var("CATEGORIZER_DATABASE") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(format) = var("CATEGORIZER_LOG_FORMAT") {
            self.log_format = format.parse()?;
        }
        Ok(())
    }

    pub fn in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }

    pub fn import_session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.import_session_ttl_secs.min(u32::MAX as u64) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config.bind.port(), 5001);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.seed_categories);
        assert!(!config.in_memory());
    }

    #[test]
    fn file_values_then_env_overrides() {
        let mut config = ServerConfig::from_toml(
            r#"
            bind = "0.0.0.0:8080"
            database_path = "/var/lib/categorizer/data.db"
            log_format = "json"
            seed_categories = false
            "#,
        )
        .unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.log_format, LogFormat::Json);

        let env: HashMap<&str, &str> = HashMap::from([
            ("CATEGORIZER_DATABASE", ":memory:"),
            ("CATEGORIZER_LOG_FORMAT", "Pretty"),
        ]);
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert!(config.in_memory());
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.bind.port(), 8080);
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(ServerConfig::from_toml("log_format = \"xml\"").is_err());
        let mut config = ServerConfig::default();
        assert!(config
            .apply_env(|k| (k == "CATEGORIZER_BIND").then(|| "nope".to_string()))
            .is_err());
    }
}
