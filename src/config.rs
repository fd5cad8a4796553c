//! Provider configuration
//!
//! The declared provider block, environment overrides and defaults, resolved
//! into the settings the connection bootstrap uses.

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_HOST: &str = "AEROSPIKE_HOST";
pub const ENV_PORT: &str = "AEROSPIKE_PORT";
pub const ENV_USER: &str = "AEROSPIKE_USER";
pub const ENV_PASSWORD: &str = "AEROSPIKE_PASSWORD";
pub const ENV_CONNECT_TIMEOUT: &str = "AEROSPIKE_CONNECT_TIMEOUT";

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_USER: &str = "admin";
const DEFAULT_PASSWORD: &str = "admin";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const MAX_CONNECT_TIMEOUT_SECS: i64 = 60;

// =============================================================================
// Declared Provider Block
// =============================================================================

/// Provider block as declared by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProviderConfig {
    /// Seed host to connect to. Defaults to the environment variable AEROSPIKE_HOST
    #[serde(default)]
    pub host: Option<String>,

    /// Port to connect to. Defaults to the environment variable AEROSPIKE_PORT
    #[serde(default)]
    pub port: Option<i64>,

    /// Admin username. Defaults to the environment variable AEROSPIKE_USER
    #[serde(default)]
    pub user_name: Option<String>,

    /// Admin password. Defaults to the environment variable AEROSPIKE_PASSWORD
    #[serde(default)]
    pub password: Option<String>,

    /// Connect timeout in seconds, 1-60. Defaults to the environment variable
    /// AEROSPIKE_CONNECT_TIMEOUT
    #[serde(default)]
    pub connect_timeout: Option<i64>,

    /// TLS settings; TLS is enabled when the block is present
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

/// TLS block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TlsConfig {
    /// TLS name to verify the server certificate against
    #[serde(default)]
    pub tls_name: Option<String>,

    /// Root CA certificate file (PEM)
    #[serde(default)]
    pub root_ca_file: Option<PathBuf>,
}

// =============================================================================
// Resolved Settings
// =============================================================================

/// Fully resolved connection settings
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub connect_timeout: Duration,
    pub tls: Option<TlsConfig>,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .field("tls", &self.tls)
            .finish()
    }
}

impl ConnectionSettings {
    /// `host:port` address of the seed node
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Name the TLS certificate is verified against
    pub fn tls_server_name(&self) -> Option<&str> {
        self.tls
            .as_ref()
            .map(|tls| tls.tls_name.as_deref().unwrap_or(&self.host))
    }
}

impl ProviderConfig {
    /// Resolve against the process environment
    pub fn resolve(&self) -> Result<ConnectionSettings> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup.
    ///
    /// Precedence: environment, then declared value, then default. An
    /// environment value that does not parse as a number is ignored.
    pub fn resolve_with<F>(&self, env: F) -> Result<ConnectionSettings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = env(ENV_HOST)
            .or_else(|| self.host.clone())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let user = env(ENV_USER)
            .or_else(|| self.user_name.clone())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_USER.to_string());
        let password = env(ENV_PASSWORD)
            .or_else(|| self.password.clone())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PASSWORD.to_string());

        let port = env_int(&env, ENV_PORT).or(self.port);
        let port = match port {
            None => DEFAULT_PORT,
            Some(p) if (0..=i64::from(u16::MAX)).contains(&p) => p as u16,
            Some(p) => {
                return Err(Error::Configuration(format!(
                    "port {} is outside 0-65535",
                    p
                )))
            }
        };

        let timeout = env_int(&env, ENV_CONNECT_TIMEOUT).or(self.connect_timeout);
        let connect_timeout = match timeout {
            None | Some(0) => Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            Some(t) if (1..=MAX_CONNECT_TIMEOUT_SECS).contains(&t) => Duration::from_secs(t as u64),
            Some(t) => {
                return Err(Error::Configuration(format!(
                    "connect_timeout {} is outside 0-{} seconds",
                    t, MAX_CONNECT_TIMEOUT_SECS
                )))
            }
        };

        Ok(ConnectionSettings {
            host,
            port,
            user,
            password,
            connect_timeout,
            tls: self.tls.clone(),
        })
    }
}

fn env_int<F>(env: &F, key: &str) -> Option<i64>
where
    F: Fn(&str) -> Option<String>,
{
    env(key).and_then(|v| v.trim().parse().ok())
}
