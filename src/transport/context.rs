use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use http::StatusCode;

use super::{Connector, Fetch, SharedTransport, TransportError};
use crate::{ErrorKind, FetchConfig, Result, Target};

// Constants currently not configurable by the user.
/// TCP keepalive
/// See <https://tldp.org/HOWTO/TCP-Keepalive-HOWTO/overview.html> for more info
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);
/// Idle connections kept per host. A worker issues one request at a time,
/// so a single warm connection is all it can ever reuse.
const MAX_IDLE_PER_HOST: usize = 1;
/// How long an idle connection may stay in the pool between two fetches.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// A worker's persistent transport handle.
///
/// The underlying `reqwest` client is configured once (identity headers,
/// keep-alive, compression, protocol version, timeouts) and then reused for
/// every fetch the worker performs, so the TCP/TLS connection to the
/// upstream host stays warm between requests.
#[derive(Debug)]
pub struct ConnectionContext {
    worker: usize,
    client: reqwest::Client,
    shared: Arc<SharedTransport>,
}

impl ConnectionContext {
    /// Creates the transport handle for `worker`.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - One of the identity headers is invalid.
    /// - The request client cannot be created.
    ///   See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn new(worker: usize, config: &FetchConfig, shared: Arc<SharedTransport>) -> Result<Self> {
        let headers = config.identity.header_map()?;

        let mut builder = reqwest::ClientBuilder::new()
            .gzip(true)
            .default_headers(headers)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .tcp_keepalive(TCP_KEEPALIVE)
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .dns_resolver(Arc::new(shared.dns().clone()));

        if config.http1_only {
            builder = builder.http1_only();
        }

        if let Some((host, addrs)) = shared.pinned_host() {
            builder = builder.resolve_to_addrs(host, addrs);
        }

        for certificate in shared.root_certificates() {
            builder = builder.add_root_certificate(certificate.clone());
        }

        let client = builder.build().map_err(ErrorKind::BuildRequestClient)?;

        Ok(Self {
            worker,
            client,
            shared,
        })
    }

    /// Index of the worker owning this context.
    #[must_use]
    pub const fn worker(&self) -> usize {
        self.worker
    }

    /// The run-scoped state this context was built from.
    #[must_use]
    pub fn shared(&self) -> &SharedTransport {
        &self.shared
    }
}

#[async_trait]
impl Fetch for ConnectionContext {
    async fn fetch(
        &mut self,
        target: &Target,
        buf: &mut Vec<u8>,
    ) -> std::result::Result<StatusCode, TransportError> {
        let mut response = self.client.get(target.url().clone()).send().await?;
        let status = response.status();

        // Stream the body so a transfer that breaks halfway leaves what was
        // received in `buf`; the caller decides whether to discard it.
        while let Some(chunk) = response.chunk().await? {
            buf.extend_from_slice(&chunk);
        }

        Ok(status)
    }
}

/// Provisions a [`ConnectionContext`] per worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

impl Connector for HttpConnector {
    type Connection = ConnectionContext;

    fn connect(
        &self,
        worker: usize,
        config: &FetchConfig,
        shared: &Arc<SharedTransport>,
    ) -> Result<Self::Connection> {
        ConnectionContext::new(worker, config, Arc::clone(shared))
    }
}
