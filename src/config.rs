//! Configuration loading and constants.
//!
//! `ServerConfig` is the node identity handed to [`crate::Server`] and is
//! checked by [`ServerConfig::validate`] before any network action happens.
//! `AppConfig` is the root of the TOML file read by the binary.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use const_format::formatcp;
use serde::Deserialize;

use crate::error::ServerError;
use crate::retry::BringUpPolicy;

// =============================================================================
// Listener Addresses
// =============================================================================

/// Address of the plaintext listener opened alongside the canonical HTTPS port
pub const HTTP_ADDRESS: &str = ":80";

/// Network passed to the overlay provider for every listener
pub const PROTOCOL: &str = "tcp";

/// Requesting this port also provisions the HTTP->HTTPS redirect listener
pub const HTTPS_PORT: u16 = 443;

// =============================================================================
// Strict Transport Security
// =============================================================================

/// One year, in seconds
pub const HSTS_MAX_AGE_SECS: u32 = 31536000;

/// Pre-formatted Strict-Transport-Security header value
pub const STRICT_TRANSPORT_SECURITY: &str = formatcp!("max-age={}", HSTS_MAX_AGE_SECS);

// =============================================================================
// Bring-up Timeouts
// =============================================================================

/// Per-attempt timeout while waiting for the node to come up
pub const BRING_UP_ATTEMPT_TIMEOUT_SECS: u64 = 10;

/// Timeout for the status query that resolves the node's FQDN
pub const STATUS_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variable consulted when `[node] auth_key` is empty
pub const AUTH_KEY_ENV: &str = "TAILSERVE_AUTH_KEY";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "tailserve=debug,tower_http=debug";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Characters that may not appear in a node hostname
const HOSTNAME_FORBIDDEN: &[char] = &[' ', '.', '/'];

/// Identity of this node on the overlay network.
#[derive(Clone, Deserialize)]
pub struct ServerConfig {
    /// Pre-authorized key used to join the network
    #[serde(default)]
    pub auth_key: String,
    /// Single DNS label; the provider derives the FQDN from it
    pub hostname: String,
    /// Directory holding persisted node state
    pub state_dir: PathBuf,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("auth_key", &"<redacted>")
            .field("hostname", &self.hostname)
            .field("state_dir", &self.state_dir)
            .finish()
    }
}

impl ServerConfig {
    pub fn new(
        auth_key: impl Into<String>,
        hostname: impl Into<String>,
        state_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            auth_key: auth_key.into(),
            hostname: hostname.into(),
            state_dir: state_dir.into(),
        }
    }

    /// Checks the configuration before the node is brought up.
    ///
    /// The hostname must be a bare label: dotted names are rejected even though
    /// they are valid DNS, because the qualified name comes from the network.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.auth_key.is_empty() {
            return Err(ServerError::InvalidConfig(
                "auth key cannot be empty".to_string(),
            ));
        }
        if self.hostname.is_empty() {
            return Err(ServerError::InvalidConfig(
                "hostname cannot be empty".to_string(),
            ));
        }
        if self.hostname.contains(HOSTNAME_FORBIDDEN) {
            return Err(ServerError::InvalidConfig(
                "hostname cannot contain space, dot, or slash".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Overlay node identity
    pub node: ServerConfig,
    /// Listener settings
    #[serde(default)]
    pub http: HttpConfig,
    /// Retry and timeout settings for node bring-up
    #[serde(default)]
    pub bring_up: BringUpConfig,
    /// Settings for the bundled local provider
    #[serde(default)]
    pub local: LocalConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Ports served over TLS (default: [443])
    #[serde(default = "HttpConfig::default_https_ports")]
    pub https_ports: Vec<u16>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            https_ports: Self::default_https_ports(),
        }
    }
}

impl HttpConfig {
    fn default_https_ports() -> Vec<u16> {
        vec![HTTPS_PORT]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BringUpConfig {
    /// Timeout for a single bring-up attempt (default: 10)
    #[serde(default = "BringUpConfig::default_attempt_timeout")]
    pub attempt_timeout_seconds: u64,
    /// Give up after this many attempts (default: retry forever)
    pub max_attempts: Option<u32>,
    /// Timeout for the FQDN status query (default: 10)
    #[serde(default = "BringUpConfig::default_status_timeout")]
    pub status_timeout_seconds: u64,
}

impl Default for BringUpConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_seconds: Self::default_attempt_timeout(),
            max_attempts: None,
            status_timeout_seconds: Self::default_status_timeout(),
        }
    }
}

impl BringUpConfig {
    fn default_attempt_timeout() -> u64 {
        BRING_UP_ATTEMPT_TIMEOUT_SECS
    }

    fn default_status_timeout() -> u64 {
        STATUS_TIMEOUT_SECS
    }

    pub fn policy(&self) -> BringUpPolicy {
        BringUpPolicy {
            attempt_timeout: Duration::from_secs(self.attempt_timeout_seconds),
            max_attempts: self.max_attempts,
            status_timeout: Duration::from_secs(self.status_timeout_seconds),
        }
    }
}

/// Settings for [`crate::local::LocalProvider`]
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    /// Interface listeners bind to (default: 0.0.0.0)
    #[serde(default = "LocalConfig::default_bind_host")]
    pub bind_host: IpAddr,
    /// Domain appended to the hostname to form the node's DNS name
    pub domain: Option<String>,
    /// PEM certificate chain for TLS listeners
    pub cert_path: Option<PathBuf>,
    /// PEM private key for TLS listeners
    pub key_path: Option<PathBuf>,
    /// Known peers, resolved by remote IP for caller identity lookups
    #[serde(default)]
    pub peers: Vec<LocalPeer>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            bind_host: Self::default_bind_host(),
            domain: None,
            cert_path: None,
            key_path: None,
            peers: Vec::new(),
        }
    }
}

impl LocalConfig {
    fn default_bind_host() -> IpAddr {
        IpAddr::from([0, 0, 0, 0])
    }
}

/// A statically known peer
#[derive(Debug, Clone, Deserialize)]
pub struct LocalPeer {
    pub ip: IpAddr,
    pub login_name: String,
    #[serde(default)]
    pub display_name: String,
    pub node_name: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let auth_key_env = std::env::var(AUTH_KEY_ENV).ok();
        Self::parse(&contents, auth_key_env)
    }

    fn parse(contents: &str, auth_key_env: Option<String>) -> Result<Self, ConfigError> {
        let mut config: AppConfig = toml::from_str(contents)?;

        if config.node.auth_key.is_empty() {
            if let Some(key) = auth_key_env {
                config.node.auth_key = key;
            }
        }

        if config.http.https_ports.is_empty() {
            return Err(ConfigError::Validation(
                "No HTTPS ports configured. Set [http] https_ports".to_string(),
            ));
        }

        if config.local.cert_path.is_some() != config.local.key_path.is_some() {
            return Err(ConfigError::Validation(
                "[local] cert_path and key_path must be set together".to_string(),
            ));
        }

        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(auth_key: &str, hostname: &str) -> ServerConfig {
        ServerConfig::new(auth_key, hostname, "/tmp/tailserve")
    }

    #[test]
    fn test_validate_accepts_single_label() {
        assert!(config("tskey-test", "test-hostname").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_auth_key() {
        let err = config("", "test-hostname").validate().unwrap_err();
        assert!(matches!(err, ServerError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_empty_hostname() {
        let err = config("tskey-test", "").validate().unwrap_err();
        assert!(matches!(err, ServerError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_forbidden_characters() {
        for hostname in ["test hostname", "test.hostname", "test/hostname", "a.b"] {
            let err = config("tskey-test", hostname).validate().unwrap_err();
            assert!(
                matches!(err, ServerError::InvalidConfig(_)),
                "hostname {hostname:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_debug_redacts_auth_key() {
        let rendered = format!("{:?}", config("tskey-secret", "svc"));
        assert!(!rendered.contains("tskey-secret"));
        assert!(rendered.contains("svc"));
    }

    #[test]
    fn test_hsts_header_value() {
        assert_eq!(STRICT_TRANSPORT_SECURITY, "max-age=31536000");
    }

    #[test]
    fn test_parse_minimal_uses_defaults() {
        let config = AppConfig::parse(
            r#"
            [node]
            auth_key = "tskey-test"
            hostname = "svc"
            state_dir = "/var/lib/tailserve"
            "#,
            None,
        )
        .unwrap();

        assert_eq!(config.http.https_ports, vec![443]);
        assert_eq!(config.bring_up.attempt_timeout_seconds, 10);
        assert_eq!(config.bring_up.max_attempts, None);
        assert_eq!(config.logging.format, "text");
        assert!(config.local.peers.is_empty());
    }

    #[test]
    fn test_parse_falls_back_to_env_auth_key() {
        let config = AppConfig::parse(
            r#"
            [node]
            hostname = "svc"
            state_dir = "/var/lib/tailserve"
            "#,
            Some("tskey-from-env".to_string()),
        )
        .unwrap();

        assert_eq!(config.node.auth_key, "tskey-from-env");
    }

    #[test]
    fn test_parse_file_key_wins_over_env() {
        let config = AppConfig::parse(
            r#"
            [node]
            auth_key = "tskey-file"
            hostname = "svc"
            state_dir = "/var/lib/tailserve"
            "#,
            Some("tskey-from-env".to_string()),
        )
        .unwrap();

        assert_eq!(config.node.auth_key, "tskey-file");
    }

    #[test]
    fn test_parse_rejects_empty_ports() {
        let err = AppConfig::parse(
            r#"
            [node]
            auth_key = "k"
            hostname = "svc"
            state_dir = "/tmp"

            [http]
            https_ports = []
            "#,
            None,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_parse_rejects_half_tls_config() {
        let err = AppConfig::parse(
            r#"
            [node]
            auth_key = "k"
            hostname = "svc"
            state_dir = "/tmp"

            [local]
            cert_path = "/etc/tailserve/cert.pem"
            "#,
            None,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_parse_local_peers() {
        let config = AppConfig::parse(
            r#"
            [node]
            auth_key = "k"
            hostname = "svc"
            state_dir = "/tmp"

            [bring_up]
            max_attempts = 3

            [local]
            bind_host = "127.0.0.1"
            domain = "example.ts.net"

            [[local.peers]]
            ip = "100.64.0.2"
            login_name = "alice@example.com"
            node_name = "laptop"
            "#,
            None,
        )
        .unwrap();

        assert_eq!(config.bring_up.policy().max_attempts, Some(3));
        assert_eq!(config.local.domain.as_deref(), Some("example.ts.net"));
        assert_eq!(config.local.peers.len(), 1);
        assert_eq!(config.local.peers[0].login_name, "alice@example.com");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
