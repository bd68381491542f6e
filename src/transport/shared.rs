use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use reqwest::Certificate;

use super::dns::DnsCache;
use crate::{ErrorKind, Result, Target};

/// Environment variable pointing at a PEM bundle, honoured by OpenSSL and curl.
const SSL_CERT_FILE: &str = "SSL_CERT_FILE";

/// Well-known locations of the system CA bundle, probed in order.
const WELL_KNOWN_TRUST_STORES: [&str; 6] = [
    "/etc/ssl/certs/ca-certificates.crt",
    "/etc/pki/tls/certs/ca-bundle.crt",
    "/etc/ssl/ca-bundle.pem",
    "/etc/pki/ca-trust/extracted/pem/tls-ca-bundle.pem",
    "/etc/ssl/cert.pem",
    "/usr/local/etc/openssl/cert.pem",
];

/// Run-scoped transport state shared by every [`ConnectionContext`].
///
/// Everything in here is computed once, before any worker exists, and is
/// read-only afterwards except for the [`DnsCache`], which synchronises
/// itself.
///
/// [`ConnectionContext`]: super::ConnectionContext
#[derive(Debug, Clone, Default)]
pub struct SharedTransport {
    dns: DnsCache,
    pinned: Option<(String, Arc<[SocketAddr]>)>,
    trust_store: Option<PathBuf>,
    root_certificates: Vec<Certificate>,
}

impl SharedTransport {
    /// Prepares the shared state for a run over `targets`.
    ///
    /// The host of the first target is resolved once and pinned for all
    /// connections. A resolution failure is not fatal here: workers fall back
    /// to the shared cache and report the failure per target.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly configured trust store cannot be loaded.
    pub async fn prepare(targets: &[Target], trust_store: Option<&str>) -> Result<Self> {
        let dns = DnsCache::new();

        let pinned = match targets.first().and_then(Target::host) {
            Some(host) => match dns.lookup(host).await {
                Ok(addrs) => Some((host.to_string(), addrs)),
                Err(e) => {
                    log::warn!("Cannot pre-resolve upstream host: {e}");
                    None
                }
            },
            None => None,
        };

        let (trust_store, root_certificates) = match trust_store {
            Some(configured) => {
                let path = expand_path(configured);
                let certs = load_certificates(&path)?;
                (Some(path), certs)
            }
            None => match locate_trust_store() {
                Some(path) => match load_certificates(&path) {
                    Ok(certs) => (Some(path), certs),
                    Err(e) => {
                        log::warn!("Ignoring unusable trust store: {e}");
                        (None, Vec::new())
                    }
                },
                None => (None, Vec::new()),
            },
        };

        if let Some(path) = &trust_store {
            log::debug!(
                "Using trust store {} with {} certificate(s)",
                path.display(),
                root_certificates.len()
            );
        }

        Ok(Self {
            dns,
            pinned,
            trust_store,
            root_certificates,
        })
    }

    /// The DNS cache shared by all connections.
    #[must_use]
    pub const fn dns(&self) -> &DnsCache {
        &self.dns
    }

    /// The pre-resolved upstream host and its addresses, if resolution succeeded.
    #[must_use]
    pub fn pinned_host(&self) -> Option<(&str, &[SocketAddr])> {
        self.pinned
            .as_ref()
            .map(|(host, addrs)| (host.as_str(), &addrs[..]))
    }

    /// Path of the trust store in use, if any.
    #[must_use]
    pub fn trust_store(&self) -> Option<&Path> {
        self.trust_store.as_deref()
    }

    /// Root certificates loaded from the trust store.
    #[must_use]
    pub fn root_certificates(&self) -> &[Certificate] {
        &self.root_certificates
    }
}

/// Expands `~` and environment variables in a configured path.
fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            log::warn!("Cannot expand path `{path}`: {e}");
            PathBuf::from(path)
        }
    }
}

/// Looks for a CA bundle in the environment and at well-known locations.
fn locate_trust_store() -> Option<PathBuf> {
    std::env::var_os(SSL_CERT_FILE)
        .map(PathBuf::from)
        .into_iter()
        .chain(WELL_KNOWN_TRUST_STORES.iter().map(PathBuf::from))
        .find(|path| path.is_file())
}

fn load_certificates(path: &Path) -> Result<Vec<Certificate>> {
    let pem = std::fs::read(path).map_err(|e| (path.to_path_buf(), e))?;
    Certificate::from_pem_bundle(&pem)
        .map_err(|e| ErrorKind::TrustStore(path.to_path_buf(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::SharedTransport;
    use crate::{ErrorKind, Target};

    fn targets(urls: &[&str]) -> Vec<Target> {
        urls.iter().map(|u| u.parse().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_pins_first_target_host() {
        let shared = SharedTransport::prepare(&targets(&["http://localhost:1234/a"]), None)
            .await
            .unwrap();

        let (host, addrs) = shared.pinned_host().unwrap();
        assert_eq!(host, "localhost");
        assert!(!addrs.is_empty());
        assert_eq!(shared.dns().len(), 1);
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_not_fatal() {
        let shared =
            SharedTransport::prepare(&targets(&["https://does-not-exist.invalid/x"]), None)
                .await
                .unwrap();
        assert!(shared.pinned_host().is_none());
    }

    #[tokio::test]
    async fn test_missing_configured_trust_store_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.pem");
        let err = SharedTransport::prepare(&[], Some(missing.to_str().unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, ErrorKind::IoError(Some(path), _) if path == missing));
    }

    #[tokio::test]
    async fn test_garbage_trust_store_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.pem");
        std::fs::write(
            &path,
            "-----BEGIN CERTIFICATE-----\nnot base64!\n-----END CERTIFICATE-----\n",
        )
        .unwrap();

        let err = SharedTransport::prepare(&[], Some(path.to_str().unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, ErrorKind::TrustStore(..)));
    }
}
