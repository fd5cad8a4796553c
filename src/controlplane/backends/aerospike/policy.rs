//! Client policy and error translation
//!
//! Turns resolved connection settings into the client's connection policy
//! (credentials, timeout, TLS roots) and maps client errors and result codes
//! onto the provider's own.

use crate::config::{ConnectionSettings, TlsConfig};
use crate::domain::model::{Privilege, PrivilegeCode, ResultCode};
use crate::error::{Error, Result};
use ::aerospike::{AdminPolicy, AuthMode, ClientPolicy, Host};
use rustls::RootCertStore;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// TLS
// =============================================================================

/// Build the TLS client config: roots from the CA file when given, otherwise
/// the bundled web PKI roots.
pub fn tls_config(tls: &TlsConfig) -> Result<rustls::ClientConfig> {
    let mut roots = RootCertStore::empty();

    match &tls.root_ca_file {
        Some(path) => {
            let ca_error = |reason: String| Error::RootCaFile {
                path: path.display().to_string(),
                reason,
            };
            let pem = std::fs::read(path).map_err(|e| ca_error(e.to_string()))?;
            let certs = rustls_pemfile::certs(&mut pem.as_slice())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| ca_error(e.to_string()))?;
            let (added, ignored) = roots.add_parsable_certificates(certs);
            if added == 0 {
                return Err(ca_error("no certificates found in file".into()));
            }
            debug!(added, ignored, "loaded root certificates");
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| Error::Tls(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(config)
}

// =============================================================================
// Policies
// =============================================================================

fn timeout_ms(settings: &ConnectionSettings) -> u32 {
    u32::try_from(settings.connect_timeout.as_millis()).unwrap_or(u32::MAX)
}

/// Connection policy for the cluster. An empty user connects without
/// authenticating.
pub fn client_policy(settings: &ConnectionSettings) -> Result<ClientPolicy> {
    let mut policy = ClientPolicy {
        timeout: timeout_ms(settings),
        ..Default::default()
    };
    if !settings.user.is_empty() {
        policy.auth_mode = AuthMode::Internal(settings.user.clone(), settings.password.clone());
    }
    if let Some(tls) = &settings.tls {
        policy.tls_config = Some(tls_config(tls)?);
    }
    Ok(policy)
}

/// Admin and info commands share the connect timeout
pub fn admin_policy(settings: &ConnectionSettings) -> AdminPolicy {
    AdminPolicy {
        timeout: timeout_ms(settings),
    }
}

/// Seed host, carrying the TLS name when TLS is configured
pub fn seed_host(settings: &ConnectionSettings) -> Host {
    match settings.tls_server_name() {
        Some(name) => Host::new_tls(&settings.host, name, settings.port),
        None => Host::new(&settings.host, settings.port),
    }
}

// =============================================================================
// Translation
// =============================================================================

/// Map a client result code onto the provider's, by wire value
pub fn result_code(code: ::aerospike::ResultCode) -> ResultCode {
    (0..=u8::MAX)
        .find(|raw| ::aerospike::ResultCode::from(*raw) == code)
        .map(ResultCode::from_u8)
        .unwrap_or(ResultCode::Other(1))
}

/// Innermost error of a chain
fn root_cause(err: ::aerospike::Error) -> ::aerospike::Error {
    match err {
        ::aerospike::Error::Chain(_, source) => root_cause(*source),
        other => other,
    }
}

/// Translate an error raised while bootstrapping the client
pub fn connect_error(settings: &ConnectionSettings, err: ::aerospike::Error) -> Error {
    match root_cause(err) {
        ::aerospike::Error::ServerError(code, ..) => Error::Authentication {
            user: settings.user.clone(),
            code: result_code(code),
        },
        ::aerospike::Error::Timeout(_) => Error::ConnectTimeout {
            host: settings.host.clone(),
            timeout: settings.connect_timeout,
        },
        other => Error::Connection {
            host: settings.address(),
            reason: other.to_string(),
        },
    }
}

/// Translate an error raised by a command against an established client
pub fn request_error(endpoint: &str, operation: &str, err: ::aerospike::Error) -> Error {
    match root_cause(err) {
        ::aerospike::Error::ServerError(code, ..) => Error::server(result_code(code), operation),
        other @ (::aerospike::Error::Timeout(_)
        | ::aerospike::Error::Connection(_)
        | ::aerospike::Error::Io(_)
        | ::aerospike::Error::NoMoreConnections
        | ::aerospike::Error::InvalidNode(_)) => Error::Connection {
            host: endpoint.to_string(),
            reason: other.to_string(),
        },
        other => Error::Protocol(format!("{} failed: {}", operation, other)),
    }
}

/// Whether a namespace probe failed because the namespace is unknown. The
/// client rejects reads for namespaces missing from its partition map before
/// they reach a node.
pub fn is_unknown_namespace(err: &::aerospike::Error) -> bool {
    match err {
        ::aerospike::Error::ServerError(::aerospike::ResultCode::InvalidNamespace, ..) => true,
        ::aerospike::Error::InvalidNode(message) => message.contains("namespace"),
        ::aerospike::Error::Chain(_, source) => is_unknown_namespace(source),
        _ => false,
    }
}

pub fn to_client_privilege(privilege: &Privilege) -> Result<::aerospike::Privilege> {
    let code = ::aerospike::PrivilegeCode::try_from(privilege.privilege.code())
        .map_err(|e| Error::Internal(e.to_string()))?;
    Ok(::aerospike::Privilege::new(
        code,
        privilege.namespace.clone(),
        privilege.set.clone(),
    ))
}

pub fn from_client_privilege(privilege: ::aerospike::Privilege) -> Result<Privilege> {
    let raw = u8::from(&privilege.code);
    let code = PrivilegeCode::from_code(raw)
        .ok_or_else(|| Error::Protocol(format!("unsupported privilege code {}", raw)))?;
    Ok(Privilege {
        privilege: code,
        namespace: privilege.namespace,
        set: privilege.set_name,
    }
    .normalized())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use assert_matches::assert_matches;
    use std::io::Write;
    use std::time::Duration;

    fn settings() -> ConnectionSettings {
        ProviderConfig::default().resolve_with(|_| None).unwrap()
    }

    #[test]
    fn test_result_codes_follow_wire_values() {
        assert_eq!(
            result_code(::aerospike::ResultCode::InvalidRole),
            ResultCode::InvalidRole
        );
        assert_eq!(
            result_code(::aerospike::ResultCode::QuotasNotEnabled),
            ResultCode::QuotasNotEnabled
        );
        assert_eq!(
            result_code(::aerospike::ResultCode::InvalidAllowlist),
            ResultCode::InvalidWhitelist
        );
        assert_eq!(
            result_code(::aerospike::ResultCode::Unknown(250)),
            ResultCode::Other(250)
        );
    }

    #[test]
    fn test_server_errors_keep_result_code() {
        let err = request_error(
            "db1:3000",
            "drop role",
            ::aerospike::Error::ServerError(
                ::aerospike::ResultCode::InvalidRole,
                false,
                "db1".into(),
            ),
        );
        assert!(err.matches(ResultCode::InvalidRole));

        let chained = ::aerospike::Error::ServerError(
            ::aerospike::ResultCode::UserAlreadyExists,
            false,
            "db1".into(),
        )
        .chain_error("create user");
        let err = request_error("db1:3000", "create user", chained);
        assert!(err.matches(ResultCode::UserAlreadyExists));

        let err = request_error(
            "db1:3000",
            "query role",
            ::aerospike::Error::Timeout("socket".into()),
        );
        assert_matches!(err, Error::Connection { ref host, .. } if host == "db1:3000");
    }

    #[test]
    fn test_connect_errors() {
        let s = settings();
        let err = connect_error(&s, ::aerospike::Error::Timeout("tend".into()));
        assert_eq!(err.diagnostic().summary, "Timeout connecting to Aerospike");

        let err = connect_error(
            &s,
            ::aerospike::Error::ServerError(
                ::aerospike::ResultCode::NotAuthenticated,
                false,
                "db1".into(),
            ),
        );
        assert_matches!(err, Error::Authentication { code: ResultCode::NotAuthenticated, .. });
    }

    #[test]
    fn test_unknown_namespace_detection() {
        assert!(is_unknown_namespace(&::aerospike::Error::InvalidNode(
            "Cannot get appropriate node for namespace: nosuchns".into()
        )));
        assert!(is_unknown_namespace(&::aerospike::Error::ServerError(
            ::aerospike::ResultCode::InvalidNamespace,
            false,
            "db1".into(),
        )));
        assert!(!is_unknown_namespace(&::aerospike::Error::ServerError(
            ::aerospike::ResultCode::KeyNotFoundError,
            false,
            "db1".into(),
        )));
    }

    #[test]
    fn test_privilege_conversion() {
        let scoped = Privilege::scoped(PrivilegeCode::ReadWriteUdf, "test", Some("demo"));
        let client = to_client_privilege(&scoped).unwrap();
        assert_eq!(client.code, ::aerospike::PrivilegeCode::ReadWriteUDF);
        assert_eq!(client.set_name.as_deref(), Some("demo"));
        assert_eq!(from_client_privilege(client).unwrap(), scoped);

        let masked = ::aerospike::Privilege::new(::aerospike::PrivilegeCode::ReadMasked, None, None);
        assert_matches!(from_client_privilege(masked), Err(Error::Protocol(_)));
    }

    #[test]
    fn test_client_policy() {
        let mut s = settings();
        s.user = "admin".into();
        s.password = "secret".into();
        s.connect_timeout = Duration::from_secs(5);
        let policy = client_policy(&s).unwrap();
        assert_eq!(policy.timeout, 5000);
        assert_eq!(policy.auth_mode, AuthMode::Internal("admin".into(), "secret".into()));
        assert!(policy.tls_config.is_none());
        assert_eq!(admin_policy(&s).timeout, 5000);

        s.user.clear();
        assert_eq!(client_policy(&s).unwrap().auth_mode, AuthMode::None);
    }

    #[test]
    fn test_seed_host_carries_tls_name() {
        let mut s = settings();
        s.host = "10.0.0.5".into();
        assert_eq!(seed_host(&s).tls_name, None);

        s.tls = Some(TlsConfig {
            tls_name: Some("cluster-a".into()),
            root_ca_file: None,
        });
        let host = seed_host(&s);
        assert_eq!(host.tls_name.as_deref(), Some("cluster-a"));
        assert_eq!(host.address(), format!("10.0.0.5:{}", s.port));
    }

    #[test]
    fn test_unreadable_root_ca_file() {
        let err = tls_config(&TlsConfig {
            tls_name: None,
            root_ca_file: Some("/nonexistent/ca.pem".into()),
        })
        .err()
        .unwrap();
        assert_matches!(err, Error::RootCaFile { .. });
        assert_eq!(err.diagnostic().summary, "Error reading root ca file");
    }

    #[test]
    fn test_root_ca_file_without_certificates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();

        let err = tls_config(&TlsConfig {
            tls_name: Some("cluster".into()),
            root_ca_file: Some(file.path().to_path_buf()),
        })
        .err()
        .unwrap();
        assert_matches!(err, Error::RootCaFile { ref reason, .. } if reason.contains("no certificates"));
    }
}
