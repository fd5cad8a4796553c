//! Error types for the Aerospike provider
//!
//! Provides structured error types for connection bootstrap, the cluster
//! client, the reconcilers and the orchestrator, and maps each of them to
//! a user-visible diagnostic.

use crate::domain::model::ResultCode;
use crate::provider::Diagnostic;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the provider
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Provider has not been configured")]
    NotConfigured,

    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    // =========================================================================
    // Connection Errors
    // =========================================================================
    #[error("Error reading root ca file {path}: {reason}")]
    RootCaFile { path: String, reason: String },

    #[error("Timeout connecting to Aerospike cluster {host} after {timeout:?}")]
    ConnectTimeout { host: String, timeout: Duration },

    #[error("Connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Authentication failed for user {user}: {code}")]
    Authentication { user: String, code: ResultCode },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server returned {code} for {operation}")]
    Server { code: ResultCode, operation: String },

    #[error("Error in request: {response} error was: {message} (command: {command})")]
    InfoCommand {
        command: String,
        response: String,
        message: String,
    },

    // =========================================================================
    // Reconciler Errors
    // =========================================================================
    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Namespace {namespace} does not exist (referenced by {privilege})")]
    NamespaceNotFound { namespace: String, privilege: String },

    #[error("Quotas are not enabled on the server, cannot apply quotas to role {role}")]
    QuotasNotEnabled { role: String },

    #[error("Aerospike server version {found} does not support {capability}. Version {required} or later is required")]
    UnsupportedServerVersion {
        capability: String,
        required: u32,
        found: u32,
    },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this is a server error carrying `code`
    pub fn matches(&self, code: ResultCode) -> bool {
        matches!(self, Error::Server { code: c, .. } if *c == code)
    }

    /// Build a server error for `operation`
    pub fn server(code: ResultCode, operation: impl Into<String>) -> Self {
        Error::Server {
            code,
            operation: operation.into(),
        }
    }

    /// Summary line shown with the error
    fn summary(&self) -> &'static str {
        match self {
            Error::RootCaFile { .. } => "Error reading root ca file",
            Error::ConnectTimeout { .. } => "Timeout connecting to Aerospike",
            Error::Connection { .. } | Error::Tls(_) => "Error connecting to Aerospike",
            Error::Authentication { .. } => "Authentication failed",
            Error::Configuration(_) => "Invalid provider configuration",
            Error::Validation(_) => "Invalid resource configuration",
            Error::NotConfigured => "Unconfigured provider",
            Error::UnknownResourceType(_) => "Unknown resource type",
            Error::InfoCommand { .. } => "Error in request",
            Error::ResourceExists { .. } => "Resource already exists",
            Error::ResourceNotFound { .. } => "Resource not found",
            Error::NamespaceNotFound { .. } => "Namespace does not exist",
            Error::QuotasNotEnabled { .. } => "Quotas not enabled",
            Error::UnsupportedServerVersion { .. } => "Invalid server version",
            Error::Server { .. } | Error::Protocol(_) => "Aerospike request failed",
            Error::JsonParse(_) | Error::YamlParse(_) => "Malformed data",
            Error::Io(_) | Error::Internal(_) => "Unexpected error",
        }
    }

    /// User-visible diagnostic for this error
    pub fn diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.summary(), self.to_string())
    }
}

/// Result type alias for the provider
pub type Result<T> = std::result::Result<T, Error>;
