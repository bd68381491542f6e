//! A DNS cache shared by every connection of a run.
//!
//! Each worker owns its own `reqwest` client, and by default every client
//! would resolve the upstream host on its own. With many workers starting at
//! once this stampedes the system resolver. [`DnsCache`] is handed to every
//! client instead, so each name is looked up once and the answer reused.

use std::{net::SocketAddr, sync::Arc};

use dashmap::DashMap;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};

/// Resolution of a host name failed.
#[derive(Debug, thiserror::Error)]
#[error("failed to resolve `{host}`: {source}")]
pub struct ResolveError {
    /// The host that could not be resolved
    pub host: String,
    /// The underlying resolver error
    #[source]
    pub source: std::io::Error,
}

/// A thread-safe, run-scoped cache of resolved host addresses.
#[derive(Debug, Clone, Default)]
pub struct DnsCache {
    entries: Arc<DashMap<String, Arc<[SocketAddr]>>>,
}

impl DnsCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `host`, consulting the cache first.
    ///
    /// Ports of the returned addresses are `0`, meaning "use the port of the URL".
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be resolved or has no addresses.
    pub async fn lookup(&self, host: &str) -> Result<Arc<[SocketAddr]>, ResolveError> {
        lookup_cached(&self.entries, host).await
    }

    /// Number of cached host names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been resolved yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

async fn lookup_cached(
    entries: &DashMap<String, Arc<[SocketAddr]>>,
    host: &str,
) -> Result<Arc<[SocketAddr]>, ResolveError> {
    if let Some(addrs) = entries.get(host) {
        return Ok(Arc::clone(&addrs));
    }

    let resolved: Vec<SocketAddr> = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|source| ResolveError {
            host: host.to_string(),
            source,
        })?
        .collect();

    if resolved.is_empty() {
        return Err(ResolveError {
            host: host.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses returned"),
        });
    }

    log::debug!("Resolved {host} to {resolved:?}");
    let addrs: Arc<[SocketAddr]> = resolved.into();
    entries.insert(host.to_string(), Arc::clone(&addrs));
    Ok(addrs)
}

impl Resolve for DnsCache {
    fn resolve(&self, name: Name) -> Resolving {
        let entries = Arc::clone(&self.entries);
        Box::pin(async move {
            let addrs = lookup_cached(&entries, name.as_str()).await?;
            let addrs: Addrs = Box::new(addrs.to_vec().into_iter());
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}
