//! Administrative object model
//!
//! Server-side shapes of users, roles and privileges, plus the result codes
//! the security and message protocols report.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Result Codes
// =============================================================================

/// Server result codes relevant to administrative commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok,
    KeyNotFound,
    Timeout,
    InvalidNamespace,
    SecurityNotSupported,
    SecurityNotEnabled,
    QueryEnd,
    InvalidUser,
    UserAlreadyExists,
    InvalidPassword,
    InvalidCredential,
    InvalidRole,
    RoleAlreadyExists,
    InvalidPrivilege,
    InvalidWhitelist,
    QuotasNotEnabled,
    InvalidQuota,
    NotAuthenticated,
    RoleViolation,
    Other(u8),
}

impl ResultCode {
    /// Map a raw wire byte to a result code
    pub fn from_u8(code: u8) -> Self {
        match code {
            0 => ResultCode::Ok,
            2 => ResultCode::KeyNotFound,
            9 => ResultCode::Timeout,
            20 => ResultCode::InvalidNamespace,
            51 => ResultCode::SecurityNotSupported,
            52 => ResultCode::SecurityNotEnabled,
            50 => ResultCode::QueryEnd,
            60 => ResultCode::InvalidUser,
            61 => ResultCode::UserAlreadyExists,
            62 => ResultCode::InvalidPassword,
            65 => ResultCode::InvalidCredential,
            70 => ResultCode::InvalidRole,
            71 => ResultCode::RoleAlreadyExists,
            72 => ResultCode::InvalidPrivilege,
            73 => ResultCode::InvalidWhitelist,
            74 => ResultCode::QuotasNotEnabled,
            75 => ResultCode::InvalidQuota,
            80 => ResultCode::NotAuthenticated,
            81 => ResultCode::RoleViolation,
            other => ResultCode::Other(other),
        }
    }

    /// Raw wire value
    pub fn as_u8(&self) -> u8 {
        match self {
            ResultCode::Ok => 0,
            ResultCode::KeyNotFound => 2,
            ResultCode::Timeout => 9,
            ResultCode::InvalidNamespace => 20,
            ResultCode::SecurityNotSupported => 51,
            ResultCode::SecurityNotEnabled => 52,
            ResultCode::QueryEnd => 50,
            ResultCode::InvalidUser => 60,
            ResultCode::UserAlreadyExists => 61,
            ResultCode::InvalidPassword => 62,
            ResultCode::InvalidCredential => 65,
            ResultCode::InvalidRole => 70,
            ResultCode::RoleAlreadyExists => 71,
            ResultCode::InvalidPrivilege => 72,
            ResultCode::InvalidWhitelist => 73,
            ResultCode::QuotasNotEnabled => 74,
            ResultCode::InvalidQuota => 75,
            ResultCode::NotAuthenticated => 80,
            ResultCode::RoleViolation => 81,
            ResultCode::Other(code) => *code,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ResultCode::Ok => "ok",
            ResultCode::KeyNotFound => "key not found",
            ResultCode::Timeout => "timeout",
            ResultCode::InvalidNamespace => "namespace not found",
            ResultCode::SecurityNotSupported => "security not supported",
            ResultCode::SecurityNotEnabled => "security not enabled",
            ResultCode::QueryEnd => "query end",
            ResultCode::InvalidUser => "invalid user",
            ResultCode::UserAlreadyExists => "user already exists",
            ResultCode::InvalidPassword => "invalid password",
            ResultCode::InvalidCredential => "invalid credential",
            ResultCode::InvalidRole => "invalid role",
            ResultCode::RoleAlreadyExists => "role already exists",
            ResultCode::InvalidPrivilege => "invalid privilege",
            ResultCode::InvalidWhitelist => "invalid whitelist",
            ResultCode::QuotasNotEnabled => "quotas not enabled",
            ResultCode::InvalidQuota => "invalid quota",
            ResultCode::NotAuthenticated => "not authenticated",
            ResultCode::RoleViolation => "role violation",
            ResultCode::Other(code) => return write!(f, "server error {}", code),
        };
        write!(f, "{} ({})", text, self.as_u8())
    }
}

// =============================================================================
// Privileges
// =============================================================================

/// Privilege kinds understood by the server
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum PrivilegeCode {
    UserAdmin,
    SysAdmin,
    DataAdmin,
    UdfAdmin,
    SindexAdmin,
    Read,
    ReadWrite,
    ReadWriteUdf,
    Write,
    Truncate,
}

impl PrivilegeCode {
    pub const ALL: [PrivilegeCode; 10] = [
        PrivilegeCode::UserAdmin,
        PrivilegeCode::SysAdmin,
        PrivilegeCode::DataAdmin,
        PrivilegeCode::UdfAdmin,
        PrivilegeCode::SindexAdmin,
        PrivilegeCode::Read,
        PrivilegeCode::ReadWrite,
        PrivilegeCode::ReadWriteUdf,
        PrivilegeCode::Write,
        PrivilegeCode::Truncate,
    ];

    /// Wire code
    pub fn code(&self) -> u8 {
        match self {
            PrivilegeCode::UserAdmin => 0,
            PrivilegeCode::SysAdmin => 1,
            PrivilegeCode::DataAdmin => 2,
            PrivilegeCode::UdfAdmin => 3,
            PrivilegeCode::SindexAdmin => 4,
            PrivilegeCode::Read => 10,
            PrivilegeCode::ReadWrite => 11,
            PrivilegeCode::ReadWriteUdf => 12,
            PrivilegeCode::Write => 13,
            PrivilegeCode::Truncate => 14,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }

    /// Data privileges may be restricted to a namespace and set.
    pub fn can_scope(&self) -> bool {
        self.code() >= 10
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrivilegeCode::UserAdmin => "user-admin",
            PrivilegeCode::SysAdmin => "sys-admin",
            PrivilegeCode::DataAdmin => "data-admin",
            PrivilegeCode::UdfAdmin => "udf-admin",
            PrivilegeCode::SindexAdmin => "sindex-admin",
            PrivilegeCode::Read => "read",
            PrivilegeCode::ReadWrite => "read-write",
            PrivilegeCode::ReadWriteUdf => "read-write-udf",
            PrivilegeCode::Write => "write",
            PrivilegeCode::Truncate => "truncate",
        }
    }
}

impl fmt::Display for PrivilegeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivilegeCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown privilege '{}'", s))
    }
}

/// A privilege grant, optionally scoped to a namespace and set
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub struct Privilege {
    /// Privilege name
    pub privilege: PrivilegeCode,
    /// Namespace. If empty the privilege applies to all namespaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Set. If empty the privilege applies to all sets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<String>,
}

impl Privilege {
    pub fn global(privilege: PrivilegeCode) -> Self {
        Self {
            privilege,
            namespace: None,
            set: None,
        }
    }

    pub fn scoped(privilege: PrivilegeCode, namespace: &str, set: Option<&str>) -> Self {
        Self {
            privilege,
            namespace: Some(namespace.to_string()),
            set: set.map(str::to_string),
        }
    }

    /// Treat empty strings as absent, the way the server reports them
    pub fn normalized(mut self) -> Self {
        if self.namespace.as_deref() == Some("") {
            self.namespace = None;
        }
        if self.set.as_deref() == Some("") {
            self.set = None;
        }
        self
    }

    /// Check the namespace/set combination is encodable
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.set.is_some() && self.namespace.is_none() {
            return Err(format!(
                "privilege '{}' names set '{}' without a namespace",
                self.privilege,
                self.set.as_deref().unwrap_or_default()
            ));
        }
        if !self.privilege.can_scope() && (self.namespace.is_some() || self.set.is_some()) {
            return Err(format!(
                "privilege '{}' is global and cannot be scoped to a namespace or set",
                self.privilege
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.namespace, &self.set) {
            (Some(ns), Some(set)) => write!(f, "{}@{}.{}", self.privilege, ns, set),
            (Some(ns), None) => write!(f, "{}@{}", self.privilege, ns),
            _ => write!(f, "{}", self.privilege),
        }
    }
}

// =============================================================================
// Users and Roles
// =============================================================================

/// User as reported by a user query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub user: String,
    pub roles: Vec<String>,
    pub conns_in_use: u32,
}

/// Role definition sent on create and returned by a role query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleInfo {
    pub name: String,
    pub privileges: Vec<Privilege>,
    pub whitelist: Vec<String>,
    pub read_quota: u32,
    pub write_quota: u32,
}
