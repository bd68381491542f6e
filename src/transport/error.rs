use std::{error::Error, fmt::Display, io};

use serde::Serialize;

use super::dns::ResolveError;

/// Broad category of a failed transport call.
///
/// The retry policy decides on these categories alone, so every transport
/// implementation only needs to map its own failures onto them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransportErrorKind {
    /// The request or connection timed out
    Timeout,
    /// The host name could not be resolved
    Dns,
    /// The TCP connection could not be established
    Connect,
    /// Reading or writing failed after the connection was established
    Io,
    /// The server closed the connection without sending a response
    NoResponse,
    /// The server certificate could not be verified
    Tls,
    /// The request itself is malformed and can never succeed
    InvalidRequest,
    /// Anything we cannot classify
    Other,
}

impl Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Dns => "DNS resolution failure",
            Self::Connect => "connection failure",
            Self::Io => "transfer failure",
            Self::NoResponse => "empty reply from server",
            Self::Tls => "TLS failure",
            Self::InvalidRequest => "invalid request",
            Self::Other => "transport error",
        };
        f.write_str(name)
    }
}

/// A failed transport call: its category plus a human-readable description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    /// What went wrong
    pub kind: TransportErrorKind,
    /// Details from the underlying transport
    pub message: String,
}

impl TransportError {
    /// Creates a new transport error.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = classify_reqwest(&err);
        // `reqwest` only prints the outermost layer; include the source chain
        // so logs show what actually failed.
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        Self { kind, message }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::new(classify_io(&err), err.to_string())
    }
}

/// Maps a `reqwest` error onto a [`TransportErrorKind`].
#[allow(clippy::if_same_then_else)]
fn classify_reqwest(err: &reqwest::Error) -> TransportErrorKind {
    if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_builder() {
        TransportErrorKind::InvalidRequest
    } else if err.is_redirect() {
        TransportErrorKind::Other
    } else if err.is_connect() {
        if get_source_error_type::<ResolveError>(err).is_some() {
            TransportErrorKind::Dns
        } else if is_certificate_failure(err) {
            TransportErrorKind::Tls
        } else {
            TransportErrorKind::Connect
        }
    } else if err.is_body() || err.is_decode() {
        // The response started but the body could not be read to the end.
        TransportErrorKind::Io
    } else if err.is_request() {
        // It seems that hyper::Error(IncompleteMessage) is not correctly handled by reqwest.
        // Here we check if the Reqwest error was originated by hyper and map it consistently.
        if let Some(hyper_error) = get_source_error_type::<hyper::Error>(err) {
            // IncompleteMessage: the connection was closed before a complete
            // response arrived, i.e. the server sent nothing usable.
            // Canceled: the connection was closed while the request was in flight.
            if hyper_error.is_incomplete_message() {
                TransportErrorKind::NoResponse
            } else if hyper_error.is_canceled() {
                TransportErrorKind::Io
            } else if let Some(io_error) = get_source_error_type::<io::Error>(hyper_error) {
                classify_io(io_error)
            } else {
                TransportErrorKind::Other
            }
        } else if let Some(io_error) = get_source_error_type::<io::Error>(err) {
            classify_io(io_error)
        } else {
            TransportErrorKind::Other
        }
    } else {
        TransportErrorKind::Other
    }
}

/// Classifies an `io::Error` by its kind.
fn classify_io(error: &io::Error) -> TransportErrorKind {
    match error.kind() {
        io::ErrorKind::TimedOut => TransportErrorKind::Timeout,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrNotAvailable => {
            TransportErrorKind::Connect
        }
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => TransportErrorKind::Io,
        _ => TransportErrorKind::Other,
    }
}

/// TLS backends do not expose a common error type, so we look for
/// certificate failures in the rendered source chain.
///
/// Only certificate messages count: a handshake cut short by the peer is an
/// ordinary connection failure and stays retryable.
fn is_certificate_failure(err: &dyn Error) -> bool {
    let mut source = err.source();
    while let Some(inner) = source {
        if inner.to_string().to_lowercase().contains("certificate") {
            return true;
        }
        source = inner.source();
    }
    false
}

/// Downcasts the given err source into T.
fn get_source_error_type<T: Error + 'static>(err: &dyn Error) -> Option<&T> {
    let mut source = err.source();

    while let Some(err) = source {
        if let Some(typed) = err.downcast_ref::<T>() {
            return Some(typed);
        }

        source = err.source();
    }
    None
}
