//! Transport layer: per-worker connections and the state they share.
//!
//! # Architecture
//!
//! - [`Fetch`]: one persistent connection able to GET a [`Target`]
//! - [`Connector`]: provisions one [`Fetch`] connection per worker
//! - [`ConnectionContext`]: the `reqwest`-backed connection used in production
//! - [`SharedTransport`]: run-scoped DNS cache, pinned upstream address and
//!   trust store, shared by reference with every connection
//! - [`TransportError`]: a failed transport call, classified for retrying

mod context;
mod dns;
mod error;
mod shared;

use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;

pub use context::{ConnectionContext, HttpConnector};
pub use dns::{DnsCache, ResolveError};
pub use error::{TransportError, TransportErrorKind};
pub use shared::SharedTransport;

use crate::{FetchConfig, Result, Target};

/// A persistent connection owned by exactly one worker.
#[async_trait]
pub trait Fetch: Send {
    /// Requests `target` and appends the response body to `buf`.
    ///
    /// Returns the HTTP status on transport success, regardless of its value.
    /// On failure, `buf` may hold a partial body.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if no complete response was received.
    async fn fetch(
        &mut self,
        target: &Target,
        buf: &mut Vec<u8>,
    ) -> std::result::Result<StatusCode, TransportError>;
}

/// Creates the connections of a run, one per worker.
pub trait Connector: Send + Sync {
    /// The connection type handed to each worker.
    type Connection: Fetch + 'static;

    /// Provisions the connection for `worker`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be set up. The engine then
    /// rolls back the whole run.
    fn connect(
        &self,
        worker: usize,
        config: &FetchConfig,
        shared: &Arc<SharedTransport>,
    ) -> Result<Self::Connection>;
}
