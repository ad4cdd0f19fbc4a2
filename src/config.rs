//! Configuration loading and validation.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::bouncer::{Identity, Settings};
use crate::message::DEFAULT_LINE_LIMIT;
use crate::transport::DEFAULT_BUFFER_CAPACITY;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Bouncer configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where clients connect.
    pub listen: ListenConfig,
    /// The IRC server to bounce and the identity to register with.
    pub upstream: UpstreamConfig,
    /// Identity of locally generated replies.
    pub server: ServerConfig,
    /// Buffer sizes and timeouts.
    pub limits: LimitsConfig,
}

/// Client listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "127.0.0.1:16667").
    #[serde(default = "default_listen_address")]
    pub address: SocketAddr,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
        }
    }
}

/// Upstream server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// `host:port` of the IRC server; resolved at startup.
    #[serde(default = "default_upstream_address")]
    pub address: String,
    /// Nickname to register with. Falls back to `$USER`.
    pub nick: Option<String>,
    /// Username to register with. Falls back to the nickname.
    pub user: Option<String>,
    /// Real name to register with. Falls back to the nickname.
    pub realname: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: default_upstream_address(),
            nick: None,
            user: None,
            realname: None,
        }
    }
}

/// Server identity presented to clients.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Source of locally generated replies (e.g., "example.com").
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Network name used until the upstream advertises `NETWORK`.
    #[serde(default = "default_network")]
    pub network: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            network: default_network(),
        }
    }
}

/// Buffer and timeout limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Receive buffer per connection in bytes (default: 4096).
    #[serde(default = "default_buffer")]
    pub recv_buffer: usize,
    /// Send buffer per connection in bytes (default: 4096).
    #[serde(default = "default_buffer")]
    pub send_buffer: usize,
    /// Longest line the bouncer will serialize, CRLF excluded (default: 2046).
    #[serde(default = "default_line_length")]
    pub line_length: usize,
    /// Seconds of client silence before disconnect; 0 disables (default: 0).
    #[serde(default)]
    pub client_idle_timeout: u64,
    /// Readiness events fetched per poll (default: 128).
    #[serde(default = "default_events_capacity")]
    pub events_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            recv_buffer: default_buffer(),
            send_buffer: default_buffer(),
            line_length: default_line_length(),
            client_idle_timeout: 0,
            events_capacity: default_events_capacity(),
        }
    }
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 16667))
}

fn default_upstream_address() -> String {
    "127.0.0.1:6667".to_string()
}

fn default_server_name() -> String {
    "example.com".to_string()
}

fn default_network() -> String {
    "slirc-bnc".to_string()
}

fn default_buffer() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

fn default_line_length() -> usize {
    DEFAULT_LINE_LIMIT
}

fn default_events_capacity() -> usize {
    128
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check limits for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;
        if limits.line_length == 0 {
            return Err(ConfigError::Invalid("limits.line_length must be positive".into()));
        }
        if limits.events_capacity == 0 {
            return Err(ConfigError::Invalid("limits.events_capacity must be positive".into()));
        }
        // A full line plus CRLF must fit in either buffer.
        let Some(framed) = limits.line_length.checked_add(2) else {
            return Err(ConfigError::Invalid(format!(
                "limits.line_length ({}) is too large",
                limits.line_length
            )));
        };
        for (name, size) in [("recv_buffer", limits.recv_buffer), ("send_buffer", limits.send_buffer)] {
            if size < framed {
                return Err(ConfigError::Invalid(format!(
                    "limits.{name} ({size}) must hold a line of limits.line_length ({}) plus CRLF",
                    limits.line_length
                )));
            }
        }
        if self.upstream.address.trim().is_empty() {
            return Err(ConfigError::Invalid("upstream.address must not be empty".into()));
        }
        Ok(())
    }

    /// Runtime settings for the event loop.
    pub fn settings(&self) -> Settings {
        Settings {
            server_name: self.server.name.clone(),
            network: self.server.network.clone(),
            line_limit: self.limits.line_length,
            recv_capacity: self.limits.recv_buffer,
            send_capacity: self.limits.send_buffer,
            idle_timeout: match self.limits.client_idle_timeout {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            events_capacity: self.limits.events_capacity,
        }
    }

    /// Upstream identity, filling gaps from `$USER`.
    pub fn identity(&self) -> Identity {
        self.identity_with_fallback(std::env::var("USER").ok())
    }

    fn identity_with_fallback(&self, login: Option<String>) -> Identity {
        let upstream = &self.upstream;
        let nick = upstream
            .nick
            .clone()
            .or(login)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "slirc".to_string());
        Identity {
            user: upstream.user.clone().unwrap_or_else(|| nick.clone()),
            realname: upstream.realname.clone().unwrap_or_else(|| nick.clone()),
            nick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.listen.address, "127.0.0.1:16667".parse().unwrap());
        assert_eq!(config.upstream.address, "127.0.0.1:6667");
        assert_eq!(config.server.name, "example.com");
        assert_eq!(config.limits.recv_buffer, 4096);
        assert_eq!(config.limits.send_buffer, 4096);
        assert_eq!(config.limits.line_length, 2046);
        assert_eq!(config.limits.client_idle_timeout, 0);
        assert_eq!(config.settings(), Settings::default());
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
            [listen]
            address = "0.0.0.0:7000"

            [upstream]
            address = "irc.libera.chat:6667"
            nick = "bob"
            realname = "Bob the Bouncer"

            [server]
            name = "bnc.local"
            network = "Home"

            [limits]
            recv_buffer = 8192
            send_buffer = 65536
            client_idle_timeout = 300
            "#,
        )
        .unwrap();

        let settings = config.settings();
        assert_eq!(settings.server_name, "bnc.local");
        assert_eq!(settings.network, "Home");
        assert_eq!(settings.recv_capacity, 8192);
        assert_eq!(settings.send_capacity, 65536);
        assert_eq!(settings.idle_timeout, Some(Duration::from_secs(300)));

        let identity = config.identity_with_fallback(None);
        assert_eq!(identity.nick, "bob");
        assert_eq!(identity.user, "bob");
        assert_eq!(identity.realname, "Bob the Bouncer");
    }

    #[test]
    fn test_identity_fallbacks() {
        let config = Config::default();
        assert_eq!(config.identity_with_fallback(Some("alice".into())).nick, "alice");
        assert_eq!(config.identity_with_fallback(None).nick, "slirc");
        assert_eq!(config.identity_with_fallback(Some(String::new())).user, "slirc");
    }

    #[test]
    fn test_rejects_small_buffers() {
        let err = Config::from_toml("[limits]\nrecv_buffer = 1024\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("recv_buffer"));

        let err = Config::from_toml("[limits]\nline_length = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_line_length_near_usize_max() {
        let mut config = Config::default();
        config.limits.line_length = usize::MAX - 1;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_parse_error() {
        let err = Config::from_toml("[listen]\naddress = \"not an address\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nname = \"file.test\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.name, "file.test");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
