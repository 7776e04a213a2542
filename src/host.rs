//! Host manager (§4.5): maps SNI server-name to TLS credentials via
//! find-with-fallback.

use crate::config::HostRecord;
use crate::error::{ConfigError, CoreError, CoreResult};
use crate::path_key::PathKey;
use crate::tree_map::TreeMap;
use std::any::Any;
use std::sync::{Arc, RwLock};

/// Resolved TLS credentials for one host entry.
#[derive(Debug, Clone)]
pub struct HostCredentials {
    pub certificate_chain_pem: String,
    pub private_key_pem: String,
    pub self_signed: bool,
}

struct HostEntry {
    record: HostRecord,
    credentials: HostCredentials,
}

/// Generates a self-signed credential pair. Certificate generation itself is
/// an external utility (§1); this is the seam the host manager calls at
/// start for entries marked `selfSigned`.
pub trait SelfSignedIssuer: Send + Sync {
    fn issue(&self, hostnames: &[String]) -> CoreResult<HostCredentials>;
}

pub struct HostManager {
    tree: RwLock<TreeMap<HostEntry>>,
}

impl HostManager {
    pub fn new() -> Self {
        Self { tree: RwLock::new(TreeMap::new()) }
    }

    /// Adds a host record under each of its hostnames, generating
    /// credentials for `selfSigned` entries via `issuer`.
    pub fn add(&self, record: HostRecord, issuer: &dyn SelfSignedIssuer) -> CoreResult<()> {
        record.validate().map_err(CoreError::Config)?;

        let credentials = if record.self_signed {
            issuer.issue(&record.hostnames)?
        } else {
            let cert = record
                .certificate
                .clone()
                .ok_or_else(|| CoreError::Config(ConfigError::HostRecordConflict))?;
            let key = record
                .private_key
                .clone()
                .ok_or_else(|| CoreError::Config(ConfigError::HostRecordConflict))?;
            HostCredentials { certificate_chain_pem: cert, private_key_pem: key, self_signed: false }
        };

        let mut tree = self.tree.write().unwrap();
        for hostname in &record.hostnames {
            let key = PathKey::from_hostname(hostname);
            tree.add(&key, HostEntry { record: record.clone(), credentials: credentials.clone() })
                .map_err(|_| CoreError::Invariant(format!("duplicate hostname {hostname:?}")))?;
        }
        Ok(())
    }

    /// Resolves credentials for an SNI server name via find-with-fallback
    /// (§4.5). Returns the most-specific match, if any.
    pub fn resolve(&self, server_name: &str) -> Option<HostCredentials> {
        let key = PathKey::from_hostname(server_name);
        let tree = self.tree.read().unwrap();
        tree.find_with_fallback(&key).into_iter().next().map(|m| m.value.credentials.clone())
    }

    /// Hands out a rustls certificate resolver backed by this manager's
    /// find-with-fallback lookup, for use by the TLS acceptor (§4.2, §4.5).
    pub fn cert_resolver(self: &Arc<Self>) -> Arc<dyn rustls::server::ResolvesServerCert> {
        Arc::new(RustlsCertResolver { hosts: self.clone() })
    }
}

struct RustlsCertResolver {
    hosts: Arc<HostManager>,
}

impl std::fmt::Debug for RustlsCertResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RustlsCertResolver").finish()
    }
}

impl rustls::server::ResolvesServerCert for RustlsCertResolver {
    fn resolve(&self, client_hello: rustls::server::ClientHello) -> Option<Arc<rustls::sign::CertifiedKey>> {
        let server_name = client_hello.server_name()?;
        let credentials = self.hosts.resolve(server_name)?;

        let key = rustls_pemfile::private_key(&mut credentials.private_key_pem.as_bytes()).ok()??;
        let signing_key = rustls::crypto::ring::sign::any_supported_type(&key).ok()?;
        let chain: Vec<_> = rustls_pemfile::certs(&mut credentials.certificate_chain_pem.as_bytes())
            .filter_map(Result::ok)
            .collect();
        Some(Arc::new(rustls::sign::CertifiedKey::new(chain, signing_key)))
    }
}

impl Default for HostManager {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::component::ComponentBehavior for HostManager {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedIssuer;
    impl SelfSignedIssuer for FixedIssuer {
        fn issue(&self, _hostnames: &[String]) -> CoreResult<HostCredentials> {
            Ok(HostCredentials {
                certificate_chain_pem: "generated-cert".into(),
                private_key_pem: "generated-key".into(),
                self_signed: true,
            })
        }
    }

    #[test]
    fn resolves_most_specific_host() {
        let mgr = HostManager::new();
        mgr.add(
            HostRecord {
                hostnames: vec!["*.example.com".into()],
                certificate: Some("wild-cert".into()),
                private_key: Some("wild-key".into()),
                self_signed: false,
            },
            &FixedIssuer,
        )
        .unwrap();
        mgr.add(
            HostRecord {
                hostnames: vec!["a.example.com".into()],
                certificate: Some("a-cert".into()),
                private_key: Some("a-key".into()),
                self_signed: false,
            },
            &FixedIssuer,
        )
        .unwrap();

        assert_eq!(mgr.resolve("a.example.com").unwrap().certificate_chain_pem, "a-cert");
        assert_eq!(mgr.resolve("b.example.com").unwrap().certificate_chain_pem, "wild-cert");
        assert!(mgr.resolve("other.net").is_none());
    }

    #[test]
    fn self_signed_excludes_explicit_cert() {
        let record = HostRecord {
            hostnames: vec!["x".into()],
            certificate: Some("c".into()),
            private_key: None,
            self_signed: true,
        };
        assert!(record.validate().is_err());
    }
}
