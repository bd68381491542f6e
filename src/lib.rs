//! `fetchpool` fetches large numbers of JSON documents from a rate-limited
//! upstream API.
//!
//! A fixed pool of workers, each owning one persistent connection, drains a
//! shared queue of targets. All workers share a single token bucket, so the
//! configured request rate is a ceiling for the whole run. Transient network
//! failures are retried with exponential backoff, and every target ends up
//! with exactly one [`RawResult`], successful or not, in a slot reserved for
//! it when it was dequeued.
//!
//! "Hello world" example:
//! ```no_run
//! use fetchpool::{Engine, FetchConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let mut engine = Engine::new(FetchConfig::default())?;
//!   engine.load_targets(["https://api.example.org/Reports/1/SummaryCards"])?;
//!   let summary = engine.run().await?;
//!   assert_eq!(summary.dispatched, 1);
//!   Ok(())
//! }
//! ```
//!
//! Connections are provisioned through the [`transport::Connector`] trait;
//! [`transport::HttpConnector`] is used unless another one is supplied with
//! [`Engine::with_connector`].

mod config;
mod engine;
mod fetch;
mod parser;
mod progress;
mod queue;
mod ratelimit;
mod retry;
mod sink;
mod types;
mod worker;

pub mod transport;

#[cfg(test)]
#[macro_use]
pub(crate) mod test_utils;

pub use config::{
    DEFAULT_ACCEPT, DEFAULT_ACCEPT_LANGUAGE, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_REQUESTS_PER_SEC,
    DEFAULT_MAX_RETRIES, DEFAULT_POOL_SIZE, DEFAULT_RETRY_WAIT_TIME, DEFAULT_TIMEOUT,
    DEFAULT_USER_AGENT, FetchConfig, Identity,
};
pub use engine::{Engine, EngineState, RunSummary};
pub use fetch::fetch_with_retry;
pub use parser::{JsonParser, PayloadParser, looks_like_json};
pub use progress::Progress;
pub use queue::WorkQueue;
pub use ratelimit::{TokenBucket, UNLIMITED_RATE};
pub use retry::{FailureClass, RetryPolicy};
pub use sink::{ResultSink, Slot};
pub use types::*;
