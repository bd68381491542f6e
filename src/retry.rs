use std::time::Duration;

use crate::{
    FetchConfig,
    transport::{TransportError, TransportErrorKind},
};

/// An extension trait to help determine if a failed transport call
/// is worth repeating.
pub(crate) trait RetryExt {
    fn should_retry(&self) -> bool;
}

impl RetryExt for TransportErrorKind {
    #[allow(clippy::match_same_arms)]
    fn should_retry(&self) -> bool {
        match self {
            // Transient network conditions
            Self::Timeout | Self::Dns | Self::Connect => true,
            // The connection broke mid-transfer or the server hung up
            // before answering.
            Self::Io | Self::NoResponse => true,
            // Sending the same request again will fail the same way
            Self::Tls | Self::InvalidRequest => false,
            Self::Other => false,
        }
    }
}

impl RetryExt for TransportError {
    fn should_retry(&self) -> bool {
        self.kind.should_retry()
    }
}

/// How a failed transport call is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Try again after a backoff delay, unless attempts are exhausted
    Retryable,
    /// Give up on the target right away
    Fatal,
}

/// Bounded retries with exponential backoff.
///
/// A target gets at most `max_retries + 1` attempts. There is no delay
/// before the first attempt; the first retry waits `base_delay` and every
/// further retry waits twice as long as the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

impl RetryPolicy {
    /// Creates a policy allowing `max_retries` retries after the first attempt.
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// The policy described by `config`.
    #[must_use]
    pub const fn from_config(config: &FetchConfig) -> Self {
        Self::new(config.max_retries, config.retry_wait_time)
    }

    /// Maximum number of retries after the first attempt.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Maximum number of attempts per target.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Decides whether `error` is worth another attempt.
    #[must_use]
    pub fn classify(&self, error: &TransportError) -> FailureClass {
        if error.should_retry() {
            FailureClass::Retryable
        } else {
            FailureClass::Fatal
        }
    }

    /// Delay to wait before the zero-based `attempt`.
    ///
    /// Attempt 0 starts right away, attempt `n` waits
    /// `base_delay * 2^(n - 1)`. Saturates instead of overflowing.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        match attempt {
            0 => Duration::ZERO,
            n => {
                let factor = 1u32.checked_shl(n - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::{FailureClass, RetryPolicy};
    use crate::{
        FetchConfig,
        transport::{TransportError, TransportErrorKind},
    };

    #[rstest]
    #[case(TransportErrorKind::Timeout, FailureClass::Retryable)]
    #[case(TransportErrorKind::Dns, FailureClass::Retryable)]
    #[case(TransportErrorKind::Connect, FailureClass::Retryable)]
    #[case(TransportErrorKind::Io, FailureClass::Retryable)]
    #[case(TransportErrorKind::NoResponse, FailureClass::Retryable)]
    #[case(TransportErrorKind::Tls, FailureClass::Fatal)]
    #[case(TransportErrorKind::InvalidRequest, FailureClass::Fatal)]
    #[case(TransportErrorKind::Other, FailureClass::Fatal)]
    fn test_classify(#[case] kind: TransportErrorKind, #[case] expected: FailureClass) {
        let policy = RetryPolicy::default();
        assert_eq!(policy.classify(&TransportError::new(kind, "x")), expected);
    }

    #[test]
    fn test_backoff_doubles_from_base() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        let delays: Vec<_> = (0..=4).map(|a| policy.backoff_delay(a)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ]
        );
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(200), Duration::from_secs(u64::from(u32::MAX)));
        assert_eq!(policy.max_attempts(), u32::MAX);
    }

    #[test]
    fn test_from_config() {
        let config = FetchConfig::builder()
            .max_retries(2u32)
            .retry_wait_time(Duration::from_millis(50))
            .build();
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retries(), 2);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(50));
    }
}
