// Settings file: `servers`, `logging`, schema version.
//
// Produced by an external loader per spec.md §1; this module is that
// loader's concrete, in-tree implementation — it is the only piece of
// "configuration file persistence" MCPMan ships, reading from
// `$MCP_CONFIG_DIR/config.{toml,json}`.

use crate::config::{CONFIG_DIR_ENV, SUPPORTED_VERSIONS};
use crate::error::{McpManError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Top-level settings structure, per spec.md §3 and the configuration
/// file shape in §6.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub version: String,
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A single upstream server entry. Tagged by `transport`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum ServerConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default)]
        disabled: bool,
        #[serde(default = "ServerConfig::default_timeout_ms")]
        timeout_ms: u64,
    },
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        disabled: bool,
        #[serde(default = "ServerConfig::default_timeout_ms")]
        timeout_ms: u64,
        #[serde(default)]
        oauth: Option<OAuthConfig>,
    },
}

impl ServerConfig {
    fn default_timeout_ms() -> u64 {
        30_000
    }

    pub fn disabled(&self) -> bool {
        match self {
            ServerConfig::Stdio { disabled, .. } => *disabled,
            ServerConfig::Http { disabled, .. } => *disabled,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        match self {
            ServerConfig::Stdio { timeout_ms, .. } => *timeout_ms,
            ServerConfig::Http { timeout_ms, .. } => *timeout_ms,
        }
    }

    /// Used by the name normalizer's caller and the `install` handler to
    /// enforce `[A-Za-z0-9_-]+` server names (spec.md §3).
    pub fn valid_name(name: &str) -> bool {
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

/// OAuth 2.1 provider configuration for an `http` server (spec.md §3/§6).
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub client_name: String,
    pub redirect_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// The `logging` block of the settings file.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            file: None,
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Settings {
    /// Load settings from `$MCP_CONFIG_DIR/config.toml` (preferred) or
    /// `config.json`. Missing file or directory is not an error — MCPMan
    /// can run with an empty fleet and gain servers via `install`.
    pub fn load() -> Result<Self> {
        let dir = Self::config_dir();
        let toml_path = dir.join("config.toml");
        let json_path = dir.join("config.json");

        let settings = if toml_path.is_file() {
            Self::load_toml(&toml_path)?
        } else if json_path.is_file() {
            Self::load_json(&json_path)?
        } else {
            debug!(dir = %dir.display(), "no config file found, starting with an empty fleet");
            Self::empty()
        };

        settings.validate()?;
        Ok(settings)
    }

    fn load_toml(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&contents)?;
        debug!(path = %path.display(), "loaded settings from file");
        Ok(settings)
    }

    fn load_json(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), "loaded settings from file");
        Ok(settings)
    }

    fn empty() -> Self {
        Self {
            version: SUPPORTED_VERSIONS[0].to_string(),
            servers: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }

    fn validate(&self) -> Result<()> {
        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            return Err(McpManError::ConfigInvalid(format!(
                "unsupported config version '{}' (supported: {})",
                self.version,
                SUPPORTED_VERSIONS.join(", ")
            )));
        }
        for name in self.servers.keys() {
            if !ServerConfig::valid_name(name) {
                return Err(McpManError::ConfigInvalid(format!(
                    "invalid server name '{name}': must match [A-Za-z0-9_-]+"
                )));
            }
        }
        Ok(())
    }

    /// `$MCP_CONFIG_DIR`, falling back to `~/.mcpman` when unset.
    pub fn config_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return PathBuf::from(dir);
        }
        dirs::home_dir()
            .map(|h| h.join(".mcpman"))
            .unwrap_or_else(|| {
                warn!("HOME not set and {CONFIG_DIR_ENV} not set; using current directory");
                PathBuf::from(".")
            })
    }

    pub fn enabled_servers(&self) -> impl Iterator<Item = (&String, &ServerConfig)> {
        self.servers.iter().filter(|(_, cfg)| !cfg.disabled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stdio_server() {
        let toml_str = r#"
            version = "1.0"
            [servers.filesystem]
            transport = "stdio"
            command = "mcp-server-filesystem"
            args = ["/tmp"]
        "#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        settings.validate().unwrap();
        match settings.servers.get("filesystem").unwrap() {
            ServerConfig::Stdio {
                command,
                args,
                timeout_ms,
                disabled,
                ..
            } => {
                assert_eq!(command, "mcp-server-filesystem");
                assert_eq!(args, &["/tmp"]);
                assert_eq!(*timeout_ms, 30_000);
                assert!(!disabled);
            }
            ServerConfig::Http { .. } => panic!("expected stdio"),
        }
    }

    #[test]
    fn parses_http_server_with_oauth() {
        let toml_str = r#"
            version = "1.0"
            [servers.remote]
            transport = "http"
            url = "https://example.com/mcp"
            [servers.remote.oauth]
            client_name = "mcpman"
            redirect_url = "http://localhost:8090/callback"
            scopes = ["read", "write"]
        "#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        settings.validate().unwrap();
        match settings.servers.get("remote").unwrap() {
            ServerConfig::Http { url, oauth, .. } => {
                assert_eq!(url, "https://example.com/mcp");
                let oauth = oauth.as_ref().unwrap();
                assert_eq!(oauth.scopes, vec!["read", "write"]);
            }
            ServerConfig::Stdio { .. } => panic!("expected http"),
        }
    }

    #[test]
    fn rejects_unsupported_version() {
        let toml_str = r#"version = "99.0""#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_invalid_server_name() {
        let toml_str = r#"
            version = "1.0"
            [servers."bad name!"]
            transport = "stdio"
            command = "x"
        "#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn empty_settings_is_valid() {
        Settings::empty().validate().unwrap();
    }
}
