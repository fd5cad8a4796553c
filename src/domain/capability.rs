//! Capability probe: version-gated feature checks against the cluster

use crate::domain::info::send_info_command;
use crate::domain::ports::ClusterClient;
use crate::error::{Error, Result};
use std::fmt;
use tracing::debug;

/// Server features gated by major version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// `default-ttl` settable per set
    SetLevelTtl,
}

impl Capability {
    /// Lowest server major version supporting the capability
    pub fn minimum_major_version(&self) -> u32 {
        match self {
            Capability::SetLevelTtl => 7,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::SetLevelTtl => write!(f, "set level ttl"),
        }
    }
}

/// Parse the leading digit run of a build string as the major version
pub fn parse_major_version(build: &str) -> Option<u32> {
    let digits: String = build
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Query the server major version with the `build` info command
pub async fn server_major_version(client: &dyn ClusterClient) -> Result<u32> {
    let response = send_info_command(client, "build").await?;
    let build = response
        .get("build")
        .ok_or_else(|| Error::Protocol("build info response is missing".into()))?;

    parse_major_version(build)
        .ok_or_else(|| Error::Protocol(format!("unparsable server build '{}'", build)))
}

/// Whether the connected server supports `capability`
pub async fn supports_capability(client: &dyn ClusterClient, capability: Capability) -> Result<bool> {
    let major = server_major_version(client).await?;
    let supported = major >= capability.minimum_major_version();
    debug!(%capability, major, supported, "capability probe");
    Ok(supported)
}

/// Fail with an unsupported-version error unless `capability` is available
pub async fn require_capability(client: &dyn ClusterClient, capability: Capability) -> Result<()> {
    let major = server_major_version(client).await?;
    let required = capability.minimum_major_version();
    if major < required {
        return Err(Error::UnsupportedServerVersion {
            capability: capability.to_string(),
            required,
            found: major,
        });
    }
    Ok(())
}
