//! Configuration structures and loading logic

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub api_port: u16,
    pub bind_address: IpAddr,
    /// Items per page for list actions
    pub page_size: usize,
    /// Where users and snippets are persisted; in-memory only when unset
    pub state_file: Option<PathBuf>,
    pub session_cookie_name: String,
    /// argon2 memory cost in KiB
    pub password_memory_kib: u32,
    /// argon2 time cost
    pub password_iterations: u32,
    pub snippet_defaults: SnippetDefaults,
    /// Users created at startup when missing
    pub users: Vec<UserSeed>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            page_size: default_page_size(),
            state_file: None,
            session_cookie_name: default_session_cookie_name(),
            password_memory_kib: default_password_memory_kib(),
            password_iterations: default_password_iterations(),
            snippet_defaults: SnippetDefaults::default(),
            users: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Ok(port) = std::env::var("SNIPPETS_API_PORT") {
            config.api_port = port.parse().context("Invalid SNIPPETS_API_PORT value")?;
        }
        if let Ok(state_file) = std::env::var("SNIPPETS_API_STATE_FILE") {
            config.state_file = Some(PathBuf::from(state_file));
        }
        if let Ok(page_size) = std::env::var("SNIPPETS_API_PAGE_SIZE") {
            config.page_size = page_size
                .parse()
                .context("Invalid SNIPPETS_API_PAGE_SIZE value")?;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_port < 1024 {
            anyhow::bail!("API port must be >= 1024 (got {})", self.api_port);
        }

        if self.page_size == 0 || self.page_size > 1000 {
            anyhow::bail!("page_size must be within 1..=1000 (got {})", self.page_size);
        }

        if self.session_cookie_name.is_empty()
            || !self
                .session_cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            anyhow::bail!(
                "Invalid session cookie name '{}'",
                self.session_cookie_name
            );
        }

        if self.password_memory_kib < 8 {
            anyhow::bail!(
                "password_memory_kib must be >= 8 (got {})",
                self.password_memory_kib
            );
        }
        if self.password_iterations == 0 {
            anyhow::bail!("password_iterations must be >= 1");
        }

        if !crate::highlight::is_known_language(&self.snippet_defaults.language) {
            anyhow::bail!(
                "Unknown default snippet language '{}'",
                self.snippet_defaults.language
            );
        }
        if !crate::highlight::is_known_style(&self.snippet_defaults.style) {
            anyhow::bail!(
                "Unknown default snippet style '{}'",
                self.snippet_defaults.style
            );
        }

        let mut usernames = HashSet::new();
        for user in &self.users {
            if user.username.is_empty() {
                anyhow::bail!("User name cannot be empty");
            }
            if user.username.contains(':') {
                anyhow::bail!("User name '{}' cannot contain ':'", user.username);
            }
            if user.password.is_empty() {
                anyhow::bail!("User '{}' has an empty password", user.username);
            }
            if !usernames.insert(&user.username) {
                anyhow::bail!("Duplicate user name: {}", user.username);
            }
        }

        // Ensure state file directory exists or can be created
        if let Some(state_file) = &self.state_file
            && let Some(parent) = state_file.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create state file directory: {:?}", parent))?;
        }

        Ok(())
    }
}

/// Values applied to snippet fields the client leaves out
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SnippetDefaults {
    pub language: String,
    pub style: String,
}

impl Default for SnippetDefaults {
    fn default() -> Self {
        Self {
            language: default_language(),
            style: default_style(),
        }
    }
}

/// A user to create at startup
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct UserSeed {
    pub username: String,
    pub password: String,
}

// Default functions
fn default_api_port() -> u16 {
    8000
}
fn default_page_size() -> usize {
    10
}
fn default_session_cookie_name() -> String {
    "sessionid".to_string()
}
fn default_password_memory_kib() -> u32 {
    19 * 1024
}
fn default_password_iterations() -> u32 {
    2
}
fn default_language() -> String {
    "python".to_string()
}
fn default_style() -> String {
    "InspiredGitHub".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(username: &str, password: &str) -> UserSeed {
        UserSeed {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.api_port, 8000);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.snippet_defaults.language, "python");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_validation() {
        let config = ServerConfig {
            api_port: 80,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_page_size_validation() {
        for page_size in [0, 1001] {
            let config = ServerConfig {
                page_size,
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_duplicate_user_detection() {
        let config = ServerConfig {
            users: vec![seed("alice", "a"), seed("alice", "b")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_user_name_validation() {
        let config = ServerConfig {
            users: vec![seed("ali:ce", "secret")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_default_style() {
        let config = ServerConfig {
            snippet_defaults: SnippetDefaults {
                style: "friendly".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            api_port = 9100
            page_size = 5

            [snippet_defaults]
            style = "base16-ocean.dark"

            [[users]]
            username = "alice"
            password = "wonderland"
            "#,
        )
        .unwrap();

        assert_eq!(config.api_port, 9100);
        assert_eq!(config.page_size, 5);
        assert_eq!(config.snippet_defaults.language, "python");
        assert_eq!(config.snippet_defaults.style, "base16-ocean.dark");
        assert_eq!(config.users, vec![seed("alice", "wonderland")]);
        assert!(config.validate().is_ok());
    }
}
