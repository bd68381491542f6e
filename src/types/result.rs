use std::{fmt::Display, io::Write, path::Path};

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::{ErrorKind, PayloadParser, Result, Target, transport::TransportError};

/// Why a single target could not be fetched.
///
/// These failures are recorded in the target's [`RawResult`] and never
/// abort a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum FetchError {
    /// The transport failed and retrying did not help or was not possible
    #[error("{0}")]
    Transport(TransportError),

    /// The server answered with a status outside the success range
    #[error("HTTP error {0}")]
    HttpStatus(StatusCode),

    /// The server answered with an empty body
    #[error("Empty response")]
    EmptyResponse,

    /// The body does not start like a JSON object or array
    #[error("Unexpected payload, starts with {}", describe_start(.0))]
    UnexpectedPayload(Option<u8>),
}

fn describe_start(byte: &Option<u8>) -> String {
    match byte {
        Some(b) if b.is_ascii_graphic() => format!("`{}`", char::from(*b)),
        Some(b) => format!("byte {b:#04x}"),
        None => "nothing".to_string(),
    }
}

impl Serialize for FetchError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// The structured form of a payload, as produced by the [`PayloadParser`].
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub enum Payload {
    /// The payload was decoded
    Parsed(Value),
    /// The payload looked like JSON but could not be decoded
    ParseFailed(String),
    /// There is no payload because the fetch failed
    #[default]
    Absent,
}

impl Payload {
    /// The decoded value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        match self {
            Self::Parsed(value) => Some(value),
            _ => None,
        }
    }
}

/// The raw response for one target together with its parsed form.
///
/// Created once per dispatched target, written by exactly one worker and
/// immutable once handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawResult {
    target: Target,
    #[serde(skip)]
    body: Vec<u8>,
    payload: Payload,
    #[serde(serialize_with = "serialize_outcome")]
    outcome: std::result::Result<StatusCode, FetchError>,
    attempts: u32,
}

fn serialize_outcome<S>(
    outcome: &std::result::Result<StatusCode, FetchError>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match outcome {
        Ok(status) => serializer.serialize_u16(status.as_u16()),
        Err(e) => e.serialize(serializer),
    }
}

impl RawResult {
    /// A successful fetch of `target`.
    #[must_use]
    pub fn success(
        target: Target,
        status: StatusCode,
        body: Vec<u8>,
        payload: Payload,
        attempts: u32,
    ) -> Self {
        Self {
            target,
            body,
            payload,
            outcome: Ok(status),
            attempts,
        }
    }

    /// A failed fetch of `target`. Whatever body was received is kept for
    /// diagnostics.
    #[must_use]
    pub fn failure(target: Target, error: FetchError, body: Vec<u8>, attempts: u32) -> Self {
        Self {
            target,
            body,
            payload: Payload::Absent,
            outcome: Err(error),
            attempts,
        }
    }

    /// Rebuilds a result from a payload stored on disk, e.g. by
    /// [`RawResult::save_to_file`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read. A file that is not
    /// valid JSON still loads, with a [`Payload::ParseFailed`] payload.
    pub fn load_from_file(target: Target, path: &Path, parser: &dyn PayloadParser) -> Result<Self> {
        let body = std::fs::read(path).map_err(|e| (path.to_path_buf(), e))?;
        let payload = match parser.parse(&body) {
            Ok(value) => Payload::Parsed(value),
            Err(reason) => Payload::ParseFailed(reason),
        };
        Ok(Self::success(target, StatusCode::OK, body, payload, 0))
    }

    /// The target this result belongs to.
    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// The raw response body.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.body
    }

    /// The structured payload.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns `true` if the target was fetched and validated.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The HTTP status of a successful fetch, or of a rejected one.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match &self.outcome {
            Ok(status) | Err(FetchError::HttpStatus(status)) => Some(*status),
            Err(_) => None,
        }
    }

    /// Why the fetch failed, if it did.
    #[must_use]
    pub const fn error(&self) -> Option<&FetchError> {
        match &self.outcome {
            Ok(_) => None,
            Err(e) => Some(e),
        }
    }

    /// Number of transport attempts made for this target.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Writes the parsed payload as JSON to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no parsed payload or the file cannot be
    /// written.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let value = self.payload.value().ok_or_else(|| {
            ErrorKind::IoError(
                Some(path.to_path_buf()),
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("no parsed payload for {}", self.target),
                ),
            )
        })?;
        let file = std::fs::File::create(path).map_err(|e| (path.to_path_buf(), e))?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush().map_err(|e| (path.to_path_buf(), e))?;
        Ok(())
    }

    /// Writes the raw body followed by a newline.
    ///
    /// Returns `false` without writing anything if the body is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_raw(&self, out: &mut dyn Write) -> Result<bool> {
        if self.body.is_empty() {
            return Ok(false);
        }
        out.write_all(&self.body)?;
        writeln!(out)?;
        Ok(true)
    }
}

impl Display for RawResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.outcome {
            Ok(status) => write!(f, "[{}] {}", status.as_u16(), self.target),
            Err(e) => write!(f, "[ERR] {} | {e}", self.target),
        }
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{FetchError, Payload, RawResult};
    use crate::{
        JsonParser, Target,
        transport::{TransportError, TransportErrorKind},
    };

    fn target() -> Target {
        "https://api.example.org/Reports/1/SummaryCards".parse().unwrap()
    }

    #[test]
    fn test_success_accessors() {
        let result = RawResult::success(
            target(),
            StatusCode::OK,
            b"[1]".to_vec(),
            Payload::Parsed(json!([1])),
            2,
        );
        assert!(result.is_success());
        assert_eq!(result.status(), Some(StatusCode::OK));
        assert_eq!(result.error(), None);
        assert_eq!(result.attempts(), 2);
        assert_eq!(result.payload().value(), Some(&json!([1])));
        assert_eq!(
            result.to_string(),
            "[200] https://api.example.org/Reports/1/SummaryCards"
        );
    }

    #[test]
    fn test_failure_accessors() {
        let result = RawResult::failure(
            target(),
            FetchError::HttpStatus(StatusCode::FORBIDDEN),
            Vec::new(),
            1,
        );
        assert!(!result.is_success());
        assert_eq!(result.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(result.payload(), &Payload::Absent);

        let result = RawResult::failure(
            target(),
            FetchError::Transport(TransportError::new(TransportErrorKind::Timeout, "30s")),
            Vec::new(),
            4,
        );
        assert_eq!(result.status(), None);
        assert_eq!(
            result.to_string(),
            "[ERR] https://api.example.org/Reports/1/SummaryCards | timeout: 30s"
        );
    }

    #[test]
    fn test_unexpected_payload_message() {
        assert_eq!(
            FetchError::UnexpectedPayload(Some(b'<')).to_string(),
            "Unexpected payload, starts with `<`"
        );
        assert_eq!(
            FetchError::UnexpectedPayload(None).to_string(),
            "Unexpected payload, starts with nothing"
        );
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("card.json");

        let original = RawResult::success(
            target(),
            StatusCode::OK,
            br#"{"cards":[{"id":7}]}"#.to_vec(),
            Payload::Parsed(json!({"cards": [{"id": 7}]})),
            1,
        );
        original.save_to_file(&path).unwrap();

        let loaded = RawResult::load_from_file(target(), &path, &JsonParser).unwrap();
        assert_eq!(loaded.payload(), original.payload());
    }

    #[test]
    fn test_save_without_payload_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = RawResult::failure(target(), FetchError::EmptyResponse, Vec::new(), 1);
        assert!(result.save_to_file(&dir.path().join("x.json")).is_err());
    }

    #[test]
    fn test_load_invalid_file_marks_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let loaded = RawResult::load_from_file(target(), &path, &JsonParser).unwrap();
        assert!(matches!(loaded.payload(), Payload::ParseFailed(_)));
        assert_eq!(loaded.raw(), b"{ not json");
    }

    #[test]
    fn test_write_raw() {
        let mut out = Vec::new();
        let empty = RawResult::failure(target(), FetchError::EmptyResponse, Vec::new(), 1);
        assert!(!empty.write_raw(&mut out).unwrap());
        assert!(out.is_empty());

        let full = RawResult::success(
            target(),
            StatusCode::OK,
            b"[]".to_vec(),
            Payload::Parsed(json!([])),
            1,
        );
        assert!(full.write_raw(&mut out).unwrap());
        assert_eq!(out, b"[]\n");
    }
}
