use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use http::StatusCode;
use tokio::time::Instant;

use crate::{
    ErrorKind, FetchConfig, Result, Target,
    transport::{Connector, Fetch, SharedTransport, TransportError, TransportErrorKind},
};

#[macro_export]
/// Creates a mock web server, which responds with a predefined status when
/// handling a matching request
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(template)
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Helper method to convert a string into a target
///
/// # Panic
///
/// This panics on error, so it should only be used for testing
pub(crate) fn target(url: &str) -> Target {
    url.parse().expect("Expected valid target URL")
}

/// `count` distinct targets on a host that needs no name resolution.
pub(crate) fn local_targets(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("http://127.0.0.1:9/Reports/{i}/SummaryCards"))
        .collect()
}

/// One scripted answer of a fake connection.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Respond(StatusCode, Vec<u8>),
    Fail(TransportErrorKind),
}

impl Step {
    pub(crate) fn respond(status: u16, body: &str) -> Self {
        Self::Respond(
            StatusCode::from_u16(status).expect("Expected valid status code"),
            body.as_bytes().to_vec(),
        )
    }

    pub(crate) const fn fail(kind: TransportErrorKind) -> Self {
        Self::Fail(kind)
    }

    fn play(&self, buf: &mut Vec<u8>) -> std::result::Result<StatusCode, TransportError> {
        match self {
            Self::Respond(status, body) => {
                buf.extend_from_slice(body);
                Ok(*status)
            }
            Self::Fail(kind) => {
                // Leave some garbage behind like a transfer cut halfway would.
                buf.extend_from_slice(b"{\"partial");
                Err(TransportError::new(*kind, "scripted failure"))
            }
        }
    }
}

/// A connection answering from a fixed script.
#[derive(Debug)]
pub(crate) struct ScriptedConnection {
    steps: VecDeque<Step>,
    fallback: Option<Step>,
    started: Vec<Instant>,
}

impl ScriptedConnection {
    /// Plays `steps` in order, then fails every further call.
    pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            fallback: None,
            started: Vec::new(),
        }
    }

    /// Answers every call with `step`.
    pub(crate) fn repeat(step: Step) -> Self {
        Self {
            steps: VecDeque::new(),
            fallback: Some(step),
            started: Vec::new(),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.started.len()
    }

    /// When each call was made.
    pub(crate) fn started(&self) -> &[Instant] {
        &self.started
    }
}

#[async_trait]
impl Fetch for ScriptedConnection {
    async fn fetch(
        &mut self,
        _target: &Target,
        buf: &mut Vec<u8>,
    ) -> std::result::Result<StatusCode, TransportError> {
        self.started.push(Instant::now());
        let step = self
            .steps
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or(Step::Fail(TransportErrorKind::Other));
        step.play(buf)
    }
}

/// What a [`MockConnector`] and its connections observed.
#[derive(Debug, Default)]
pub(crate) struct MockStats {
    pub(crate) connected: AtomicUsize,
    pub(crate) released: AtomicUsize,
    pub(crate) in_flight: AtomicUsize,
    pub(crate) peak_in_flight: AtomicUsize,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockStats {
    /// Number of fetches issued for `url`.
    pub(crate) fn calls(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

type Responder = Arc<dyn Fn(&Target) -> Step + Send + Sync>;

/// Provisions instrumented connections answering through a closure.
#[derive(Clone)]
pub(crate) struct MockConnector {
    respond: Responder,
    latency: Duration,
    fail_worker: Option<usize>,
    pub(crate) stats: Arc<MockStats>,
}

impl MockConnector {
    pub(crate) fn new(respond: impl Fn(&Target) -> Step + Send + Sync + 'static) -> Self {
        Self {
            respond: Arc::new(respond),
            latency: Duration::ZERO,
            fail_worker: None,
            stats: Arc::default(),
        }
    }

    /// Every fetch takes `latency` before answering.
    pub(crate) const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Provisioning fails for `worker`.
    pub(crate) const fn failing_at(mut self, worker: usize) -> Self {
        self.fail_worker = Some(worker);
        self
    }
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    fn connect(
        &self,
        worker: usize,
        _config: &FetchConfig,
        _shared: &Arc<SharedTransport>,
    ) -> Result<Self::Connection> {
        if self.fail_worker == Some(worker) {
            return Err(ErrorKind::InvalidConfig(format!(
                "worker {worker} refused to start"
            )));
        }
        self.stats.connected.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            respond: Arc::clone(&self.respond),
            latency: self.latency,
            stats: Arc::clone(&self.stats),
        })
    }
}

pub(crate) struct MockConnection {
    respond: Responder,
    latency: Duration,
    stats: Arc<MockStats>,
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetch for MockConnection {
    async fn fetch(
        &mut self,
        target: &Target,
        buf: &mut Vec<u8>,
    ) -> std::result::Result<StatusCode, TransportError> {
        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        *self
            .stats
            .calls
            .lock()
            .unwrap()
            .entry(target.to_string())
            .or_default() += 1;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let outcome = (self.respond)(target).play(buf);

        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}
