//! Runtime configuration commands shared by the config reconcilers
//!
//! Builds the literal `set-config` info commands and issues them in order,
//! keeping the list of commands that succeeded for the `info_commands`
//! attribute.

use crate::domain::capability::{require_capability, Capability};
use crate::domain::info::send_info_command;
use crate::domain::ports::ClusterClient;
use crate::error::Result;
use crate::provider::{Diagnostic, Diagnostics};
use std::collections::BTreeMap;
use tracing::trace;

/// Attribute holding the issued commands
pub const INFO_COMMANDS: &str = "info_commands";

pub fn set_ttl_command(namespace: &str, set: &str, ttl: &str) -> String {
    format!(
        "set-config:context=namespace;id={};set={};default-ttl={}",
        namespace, set, ttl
    )
}

pub fn xdr_command(datacenter: &str, namespace: &str, setting: &str) -> String {
    format!(
        "set-config:context=xdr;dc={};namespace={};{}",
        datacenter, namespace, setting
    )
}

pub fn migrate_threads_command(threads: u32) -> String {
    format!("set-config:context=service;migrate-threads={}", threads)
}

/// Sequential issuer of info commands
pub struct CommandLog<'a> {
    client: &'a dyn ClusterClient,
    issued: Vec<String>,
}

impl<'a> CommandLog<'a> {
    pub fn new(client: &'a dyn ClusterClient) -> Self {
        Self {
            client,
            issued: Vec::new(),
        }
    }

    /// Send one command; it is recorded only when the server accepted it
    pub async fn send(&mut self, command: String) -> Result<()> {
        send_info_command(self.client, &command).await?;
        trace!(%command, "applied");
        self.issued.push(command);
        Ok(())
    }

    /// Per-set default TTLs, after confirming the server supports them
    pub async fn default_set_ttls(
        &mut self,
        namespace: &str,
        ttls: &BTreeMap<String, String>,
    ) -> Result<()> {
        require_capability(self.client, Capability::SetLevelTtl).await?;
        for (set, ttl) in ttls {
            self.send(set_ttl_command(namespace, set, ttl)).await?;
        }
        Ok(())
    }

    /// Ship-only toggle followed by the set list it applies to.
    ///
    /// The list command is skipped when there are no sets.
    pub async fn xdr_sets(
        &mut self,
        datacenter: &str,
        namespace: &str,
        ship_only_specified_sets: bool,
        sets: &[String],
    ) -> Result<()> {
        self.send(xdr_command(
            datacenter,
            namespace,
            &format!("ship-only-specified-sets={}", ship_only_specified_sets),
        ))
        .await?;

        if sets.is_empty() {
            return Ok(());
        }
        let key = if ship_only_specified_sets {
            "ship-set"
        } else {
            "ignore-set"
        };
        self.send(xdr_command(
            datacenter,
            namespace,
            &format!("{}={}", key, sets.join(",")),
        ))
        .await
    }

    pub fn into_commands(self) -> Vec<String> {
        self.issued
    }
}

// =============================================================================
// Validation helpers
// =============================================================================

/// Whether `value` can be embedded in an info command parameter
fn is_command_token(value: &str) -> bool {
    !value.is_empty()
        && !value
            .chars()
            .any(|c| matches!(c, ';' | ':' | '=' | ',') || c.is_whitespace())
}

pub fn check_token(diags: &mut Diagnostics, attribute: &str, value: &str) {
    if !is_command_token(value) {
        diags.push(
            Diagnostic::error(
                "Invalid resource configuration",
                format!(
                    "'{}' must be non-empty and free of whitespace and ; : = , characters",
                    value
                ),
            )
            .at(attribute),
        );
    }
}

pub fn check_ttls(diags: &mut Diagnostics, ttls: &BTreeMap<String, String>) {
    for (set, ttl) in ttls {
        check_token(diags, "default_set_ttl", set);
        check_token(diags, "default_set_ttl", ttl);
    }
}
