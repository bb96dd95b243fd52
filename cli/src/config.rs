use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tidesnap_backends::RetryConfig;
use tidesnap_core::walker::DEFAULT_MAX_DEPTH;

/// Settings read from `config.toml`. Flags and environment variables take precedence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub repo: Option<String>,
    pub password_file: Option<PathBuf>,
    pub max_depth: Option<usize>,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_backoff_ms: defaults.initial_backoff.as_millis() as u64,
            max_backoff_ms: defaults.max_backoff.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            ..RetryConfig::default()
        }
    }
}

impl CliConfig {
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "tidesnap").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads `explicit` if given, otherwise the per-user config file when it exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH)
    }

    pub fn read_password_file(&self) -> Result<Option<String>> {
        let Some(path) = &self.password_file else {
            return Ok(None);
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read password file {}", path.display()))?;
        Ok(Some(contents.trim_end_matches(['\r', '\n']).to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_values() {
        let config = CliConfig::default();
        assert!(config.repo.is_none());
        assert_eq!(config.max_depth(), DEFAULT_MAX_DEPTH);
        assert_eq!(config.retry.max_attempts, RetryConfig::default().max_attempts);
    }

    #[test]
    fn test_from_file_toml() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(
            file,
            r#"
repo = "/srv/backup"
max_depth = 64

[retry]
max_attempts = 2
initial_backoff_ms = 10
"#
        )
        .unwrap();

        let config = CliConfig::from_file(file.path()).unwrap();
        assert_eq!(config.repo.as_deref(), Some("/srv/backup"));
        assert_eq!(config.max_depth(), 64);

        let retry = config.retry.to_retry_config();
        assert_eq!(retry.max_attempts, 2);
        assert_eq!(retry.initial_backoff, Duration::from_millis(10));
        assert_eq!(retry.max_backoff, RetryConfig::default().max_backoff);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(file, "repository = \"/srv\"\n").unwrap();
        assert!(CliConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_password_file_drops_trailing_newline() {
        let mut secret = NamedTempFile::new().unwrap();
        write!(secret, "hunter2\n").unwrap();

        let config = CliConfig {
            password_file: Some(secret.path().to_path_buf()),
            ..CliConfig::default()
        };
        assert_eq!(config.read_password_file().unwrap().as_deref(), Some("hunter2"));
    }
}
