use serde_json::Value;

/// Decodes a validated raw payload into its structured form.
///
/// The engine only checks that a body *looks* like JSON. Full decoding is
/// left to the parser, which is called once per successful fetch.
pub trait PayloadParser: Send + Sync {
    /// Decodes `raw`.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `raw` cannot be decoded.
    fn parse(&self, raw: &[u8]) -> Result<Value, String>;
}

/// Parses payloads with `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl PayloadParser for JsonParser {
    fn parse(&self, raw: &[u8]) -> Result<Value, String> {
        serde_json::from_slice(raw).map_err(|e| e.to_string())
    }
}

/// Returns `true` if the first non-whitespace byte opens a JSON object or array.
#[must_use]
pub fn looks_like_json(raw: &[u8]) -> bool {
    matches!(
        raw.iter().find(|b| !b.is_ascii_whitespace()),
        Some(b'{' | b'[')
    )
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::{JsonParser, PayloadParser, looks_like_json};

    #[rstest]
    #[case(b"{}", true)]
    #[case(b"[1,2]", true)]
    #[case(b"  \n\t{\"a\":1}", true)]
    #[case(b"{ truncated", true)]
    #[case(b"<html><body>Access denied</body></html>", false)]
    #[case(b"null", false)]
    #[case(b"42", false)]
    #[case(b"   ", false)]
    #[case(b"", false)]
    fn test_looks_like_json(#[case] raw: &[u8], #[case] expected: bool) {
        assert_eq!(looks_like_json(raw), expected);
    }

    #[test]
    fn test_json_parser() {
        let value = JsonParser.parse(br#"[{"id":1}]"#).unwrap();
        assert_eq!(value, json!([{"id": 1}]));

        assert!(JsonParser.parse(b"{ truncated").is_err());
    }
}
