use log::{error, warn};

use crate::{
    FetchError, Payload, PayloadParser, RawResult, Target,
    parser::looks_like_json,
    retry::{FailureClass, RetryPolicy},
    transport::Fetch,
};

/// Fetches `target` over `conn`, retrying transient transport failures.
///
/// Every attempt starts with an empty buffer. Only transport failures
/// classified as [`FailureClass::Retryable`] are retried; a response with
/// a non-success status, an empty body or a body that does not look like
/// JSON is final. A body that passes validation is handed to `parser`.
///
/// Never fails: every outcome, good or bad, is returned as a [`RawResult`].
pub async fn fetch_with_retry<F>(
    conn: &mut F,
    target: &Target,
    policy: &RetryPolicy,
    parser: &dyn PayloadParser,
) -> RawResult
where
    F: Fetch + ?Sized,
{
    let mut buf = Vec::new();
    let mut attempt: u32 = 0;

    loop {
        buf.clear();
        match conn.fetch(target, &mut buf).await {
            Ok(status) => return validate(target, status, buf, attempt + 1, parser),
            Err(error) => {
                let class = policy.classify(&error);
                if class == FailureClass::Fatal || attempt >= policy.max_retries() {
                    error!(
                        "Giving up on {target} after {} attempt(s): {error}",
                        attempt + 1
                    );
                    return RawResult::failure(
                        target.clone(),
                        FetchError::Transport(error),
                        buf,
                        attempt + 1,
                    );
                }

                attempt += 1;
                let delay = policy.backoff_delay(attempt);
                warn!(
                    "Attempt {attempt}/{} for {target} failed: {error}, retrying in {delay:?}",
                    policy.max_attempts()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Checks a complete response and parses its payload.
fn validate(
    target: &Target,
    status: http::StatusCode,
    body: Vec<u8>,
    attempts: u32,
    parser: &dyn PayloadParser,
) -> RawResult {
    if !status.is_success() {
        warn!("{target} answered with {status}");
        return RawResult::failure(
            target.clone(),
            FetchError::HttpStatus(status),
            body,
            attempts,
        );
    }

    if body.is_empty() {
        warn!("{target} answered with an empty body");
        return RawResult::failure(target.clone(), FetchError::EmptyResponse, body, attempts);
    }

    if !looks_like_json(&body) {
        let first = body.iter().copied().find(|b| !b.is_ascii_whitespace());
        warn!("{target} did not answer with JSON");
        return RawResult::failure(
            target.clone(),
            FetchError::UnexpectedPayload(first),
            body,
            attempts,
        );
    }

    let payload = match parser.parse(&body) {
        Ok(value) => Payload::Parsed(value),
        Err(reason) => {
            warn!("Cannot parse payload of {target}: {reason}");
            Payload::ParseFailed(reason)
        }
    };
    RawResult::success(target.clone(), status, body, payload, attempts)
}
