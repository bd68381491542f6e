//! Run orchestration.
//!
//! An [`Engine`] takes a list of targets through one run:
//!
//! ```text
//! Idle -> Queued -> Dispatching -> Draining -> Joined -> Released
//! ```
//!
//! Targets are loaded (`Queued`), one connection per worker is provisioned
//! and the workers are spawned against a shared queue (`Dispatching`).
//! Once every target is enqueued the queue is closed (`Draining`), the
//! workers are joined (`Joined`) and all transport state is dropped
//! (`Released`). Every exit path, including failures, ends in `Released`.

use std::{fmt::Display, sync::Arc, time::Duration};

use futures::future::join_all;
use log::{error, info, warn};
use tokio::{task::JoinHandle, time::Instant};

use crate::{
    ErrorKind, FetchConfig, JsonParser, PayloadParser, RawResult, Result, ResultSink, Target,
    TokenBucket, WorkQueue,
    progress::Progress,
    retry::RetryPolicy,
    transport::{Connector, HttpConnector, SharedTransport},
    worker::{Dispatch, Worker},
};

/// The lifecycle of an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EngineState {
    /// No targets loaded
    #[default]
    Idle,
    /// Targets are loaded and waiting for [`Engine::run`]
    Queued,
    /// Workers are being provisioned and fed
    Dispatching,
    /// The queue is closed; workers finish what is left
    Draining,
    /// All workers have exited
    Joined,
    /// Transport resources are released and results are available
    Released,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of targets dispatched, equal to the number of new results
    pub dispatched: usize,
    /// Results with a validated payload
    pub succeeded: usize,
    /// Results carrying a [`FetchError`](crate::FetchError)
    pub failed: usize,
    /// Number of workers used
    pub workers: usize,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} target(s) fetched by {} worker(s) in {:.1?}: {} succeeded, {} failed",
            self.dispatched, self.workers, self.elapsed, self.succeeded, self.failed
        )
    }
}

/// Fetches many JSON targets concurrently over a bounded pool of
/// persistent connections.
///
/// ```no_run
/// use fetchpool::{Engine, FetchConfig, Result};
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let mut engine = Engine::new(FetchConfig::default())?;
///     engine.load_targets([
///         "https://api.example.org/Reports/1/SummaryCards",
///         "https://api.example.org/Reports/2/SummaryCards",
///     ])?;
///     let summary = engine.run().await?;
///     println!("{summary}");
///     for result in engine.results() {
///         println!("{result}");
///     }
///     Ok(())
/// }
/// ```
pub struct Engine<C: Connector = HttpConnector> {
    config: FetchConfig,
    connector: C,
    parser: Arc<dyn PayloadParser>,
    targets: Vec<Target>,
    results: Vec<RawResult>,
    state: EngineState,
}

impl Engine<HttpConnector> {
    /// Creates an engine fetching over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not pass [`FetchConfig::validate`].
    pub fn new(config: FetchConfig) -> Result<Self> {
        Self::with_connector(config, HttpConnector)
    }
}

impl<C: Connector> Engine<C> {
    /// Creates an engine whose worker connections are provisioned by `connector`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not pass [`FetchConfig::validate`].
    pub fn with_connector(config: FetchConfig, connector: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connector,
            parser: Arc::new(JsonParser),
            targets: Vec::new(),
            results: Vec::new(),
            state: EngineState::Idle,
        })
    }

    /// Replaces the default [`JsonParser`].
    #[must_use]
    pub fn with_parser(mut self, parser: impl PayloadParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    /// The configuration of this engine.
    #[must_use]
    pub const fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Targets waiting for the next run.
    #[must_use]
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Results of all completed runs, oldest first.
    #[must_use]
    pub fn results(&self) -> &[RawResult] {
        &self.results
    }

    /// Takes all results out of the engine.
    pub fn take_results(&mut self) -> Vec<RawResult> {
        std::mem::take(&mut self.results)
    }

    /// Adds `urls` to the targets of the next run.
    ///
    /// Entries that are not absolute `http` or `https` URLs are skipped with
    /// a warning. Repeated calls accumulate; duplicates are kept.
    ///
    /// Returns the number of targets added.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::EmptyInput`] if `urls` is empty and
    /// [`ErrorKind::NoValidTargets`] if none of them can be used.
    pub fn load_targets<I, S>(&mut self, urls: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut supplied = 0usize;
        let mut loaded = Vec::new();
        for url in urls {
            supplied += 1;
            match url.as_ref().parse::<Target>() {
                Ok(target) => loaded.push(target),
                Err(e) => warn!("Skipping target: {e}"),
            }
        }

        if supplied == 0 {
            return Err(ErrorKind::EmptyInput);
        }
        if loaded.is_empty() {
            return Err(ErrorKind::NoValidTargets);
        }
        if loaded.len() < supplied {
            warn!(
                "Loaded {} of {supplied} target(s), skipped {}",
                loaded.len(),
                supplied - loaded.len()
            );
        }

        let added = loaded.len();
        self.targets.extend(loaded);
        self.state = EngineState::Queued;
        Ok(added)
    }

    /// Fetches every loaded target and appends one result per target to
    /// [`Engine::results`].
    ///
    /// Per-target failures are recorded in the results and never fail the
    /// run. On error no results are added and the loaded targets are kept
    /// for another attempt.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - No targets are loaded.
    /// - A configured trust store cannot be loaded.
    /// - A worker connection cannot be provisioned. Workers spawned before
    ///   it are drained and joined first.
    /// - A worker task panics.
    pub async fn run(&mut self) -> Result<RunSummary> {
        if self.targets.is_empty() {
            return Err(ErrorKind::NoTargets);
        }

        let started = Instant::now();
        let total = self.targets.len();
        let workers = self.config.pool_size.min(total);
        self.state = EngineState::Dispatching;

        let shared = match SharedTransport::prepare(
            &self.targets,
            self.config.trust_store.as_deref(),
        )
        .await
        {
            Ok(shared) => Arc::new(shared),
            Err(e) => {
                error!("Cannot prepare transport: {e}");
                self.state = EngineState::Released;
                return Err(e);
            }
        };

        let dispatch = Arc::new(Dispatch {
            queue: WorkQueue::new(),
            limiter: TokenBucket::new(self.config.max_requests_per_sec),
            sink: ResultSink::new(total),
            progress: Progress::new(total, self.config.show_progress),
            policy: RetryPolicy::from_config(&self.config),
            parser: Arc::clone(&self.parser),
        });

        let mut handles: Vec<JoinHandle<C::Connection>> = Vec::with_capacity(workers);
        for id in 0..workers {
            match self.connector.connect(id, &self.config, &shared) {
                Ok(connection) => {
                    let worker = Worker::new(id, Arc::clone(&dispatch), connection);
                    handles.push(tokio::spawn(worker.listen()));
                }
                Err(e) => {
                    error!("Cannot provision worker {id} of {workers}: {e}");
                    self.state = EngineState::Draining;
                    dispatch.queue.mark_no_more_work();
                    // Nothing is enqueued yet, so the workers exit right away.
                    for joined in join_all(handles).await {
                        if let Err(e) = joined {
                            warn!("Worker failed during rollback: {e}");
                        }
                    }
                    drop(shared);
                    self.state = EngineState::Released;
                    return Err(ErrorKind::provision(id, e));
                }
            }
        }
        info!("Fetching {total} target(s) with {workers} worker(s)");

        for target in self.targets.drain(..) {
            if let Err(target) = dispatch.queue.enqueue(target) {
                error!("Queue closed early, dropping {target}");
            }
        }
        dispatch.queue.mark_no_more_work();
        self.state = EngineState::Draining;

        let mut connections = Vec::with_capacity(workers);
        let mut failure = None;
        for joined in join_all(handles).await {
            match joined {
                Ok(connection) => connections.push(connection),
                Err(e) => {
                    error!("Worker failed: {e}");
                    failure.get_or_insert(ErrorKind::WorkerJoin(e));
                }
            }
        }
        self.state = EngineState::Joined;

        drop(connections);
        drop(shared);
        self.state = EngineState::Released;

        if let Some(e) = failure {
            return Err(e);
        }
        let dispatch = Arc::try_unwrap(dispatch).map_err(|_| ErrorKind::SinkInUse)?;
        let results = dispatch.sink.into_results()?;

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let summary = RunSummary {
            dispatched: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            workers,
            elapsed: started.elapsed(),
        };
        info!("{summary}");

        self.results.extend(results);
        Ok(summary)
    }
}
