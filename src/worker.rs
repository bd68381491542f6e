use std::sync::Arc;

use log::{debug, error};

use crate::{
    PayloadParser, ResultSink, TokenBucket, WorkQueue, fetch::fetch_with_retry, progress::Progress,
    retry::RetryPolicy, transport::Fetch,
};

/// Everything the workers of one run share.
pub(crate) struct Dispatch {
    pub(crate) queue: WorkQueue,
    pub(crate) limiter: TokenBucket,
    pub(crate) sink: ResultSink,
    pub(crate) progress: Progress,
    pub(crate) policy: RetryPolicy,
    pub(crate) parser: Arc<dyn PayloadParser>,
}

/// A single consumer of the work queue, owning one persistent connection.
pub(crate) struct Worker<F> {
    id: usize,
    dispatch: Arc<Dispatch>,
    connection: F,
}

impl<F: Fetch> Worker<F> {
    pub(crate) const fn new(id: usize, dispatch: Arc<Dispatch>, connection: F) -> Self {
        Self {
            id,
            dispatch,
            connection,
        }
    }

    /// Processes targets until the queue is marked done and drained.
    ///
    /// Gives the connection back so the engine can release it only after all
    /// workers have been joined.
    pub(crate) async fn listen(mut self) -> F {
        let dispatch = Arc::clone(&self.dispatch);
        let mut handled = 0usize;

        while let Some(target) = dispatch.queue.dequeue().await {
            // Claim before waiting on the limiter: slot order follows
            // dequeue order.
            let Some(slot) = dispatch.sink.claim() else {
                error!("Worker {}: no result slot left for {target}", self.id);
                continue;
            };

            dispatch.limiter.acquire().await;
            let result = fetch_with_retry(
                &mut self.connection,
                &target,
                &dispatch.policy,
                dispatch.parser.as_ref(),
            )
            .await;
            debug!("Worker {}: {result}", self.id);

            dispatch.sink.write(slot, result);
            dispatch.progress.advance();
            handled += 1;
        }

        debug!("Worker {} finished after {handled} target(s)", self.id);
        self.connection
    }
}
