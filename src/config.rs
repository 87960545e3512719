use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::ResponseLength;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub remote: RemoteConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Per-request timeout. Absent means calls may hang indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

pub const DEFAULT_NAMESPACE: &str = "docshelf-store";

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_response_length")]
    pub response_length: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            response_length: default_response_length(),
        }
    }
}

fn default_response_length() -> String {
    "medium".to_string()
}

impl ChatConfig {
    pub fn length(&self) -> ResponseLength {
        ResponseLength::parse(&self.response_length).unwrap_or_default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate remote
    let base_url = config.remote.base_url.trim();
    if base_url.is_empty() {
        anyhow::bail!("remote.base_url must not be empty");
    }
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        anyhow::bail!(
            "remote.base_url must start with http:// or https://, got '{}'",
            base_url
        );
    }
    if config.remote.timeout_secs == Some(0) {
        anyhow::bail!("remote.timeout_secs must be > 0 when set");
    }

    // Validate storage
    if config.storage.namespace.trim().is_empty() {
        anyhow::bail!("storage.namespace must not be empty");
    }

    // Validate chat
    if ResponseLength::parse(&config.chat.response_length).is_none() {
        anyhow::bail!(
            "Unknown chat.response_length: '{}'. Must be short, medium, or long.",
            config.chat.response_length
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[remote]
base_url = "http://localhost:8000"

[storage]
path = "./data/docshelf.sqlite"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.storage.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.remote.timeout_secs, None);
        assert_eq!(config.chat.length(), ResponseLength::Medium);
    }

    #[test]
    fn test_full_config() {
        let config = parse_config(
            r#"
[remote]
base_url = "https://rag.example.com/"
timeout_secs = 30

[storage]
path = "/tmp/shelf.sqlite"
namespace = "custom"

[chat]
response_length = "long"
"#,
        )
        .unwrap();
        assert_eq!(config.remote.timeout_secs, Some(30));
        assert_eq!(config.storage.namespace, "custom");
        assert_eq!(config.chat.length(), ResponseLength::Long);
    }

    #[test]
    fn test_rejects_bad_scheme() {
        let err = parse_config(&MINIMAL.replace("http://", "ftp://")).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let content = MINIMAL.replace(
            "base_url = \"http://localhost:8000\"",
            "base_url = \"http://localhost:8000\"\ntimeout_secs = 0",
        );
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn test_rejects_unknown_response_length() {
        let content = format!("{}\n[chat]\nresponse_length = \"epic\"\n", MINIMAL);
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("response_length"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/docshelf.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/docshelf.toml"));
    }
}
