//! Response body decoding: content-encoding and error summaries.

use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::TransportError;
use crate::models::{describe_error, ApiResponse};

/// Placeholder used instead of dumping unprintable bytes into an error message.
pub const BINARY_PLACEHOLDER: &str = "[binary/compressed response]";

/// Error bodies are cut to this many characters.
pub const ERROR_BODY_LIMIT: usize = 200;

/// Only characters starting within this many bytes are inspected.
const TEXT_SAMPLE_BYTES: usize = 1000;

const BROTLI_BUFFER: usize = 4096;

/// Decode `body` according to its `Content-Encoding` header value.
///
/// gzip and Brotli are decoded; anything else is returned unchanged.
pub fn decompress(encoding: &str, body: &[u8]) -> Result<Vec<u8>, TransportError> {
    let encoding = encoding.to_ascii_lowercase();
    let mut out = Vec::new();

    let result = if encoding.contains("gzip") {
        GzDecoder::new(body).read_to_end(&mut out)
    } else if encoding.contains("br") {
        brotli::Decompressor::new(body, BROTLI_BUFFER).read_to_end(&mut out)
    } else {
        return Ok(body.to_vec());
    };

    result.map_err(|source| TransportError::Decompress { encoding, source })?;
    Ok(out)
}

/// Whether `body` is printable enough to show to a human.
///
/// Invalid UTF-8 is binary. Otherwise control characters (other than
/// newline, carriage return and tab) among the characters that start in the
/// first 1000 bytes must make up less than 10% of the whole body.
pub fn is_text_content(body: &[u8]) -> bool {
    if body.is_empty() {
        return true;
    }
    let Ok(text) = std::str::from_utf8(body) else {
        return false;
    };

    let control = text
        .char_indices()
        .take_while(|(i, _)| *i < TEXT_SAMPLE_BYTES)
        .filter(|(_, c)| *c < ' ' && !matches!(c, '\n' | '\r' | '\t'))
        .count();

    control * 10 < body.len()
}

/// Best-effort message for a failed response.
pub fn summarize_error_body(body: &[u8]) -> String {
    if let Ok(envelope) = serde_json::from_slice::<ApiResponse<serde_json::Value>>(body) {
        if let Some(error) = envelope.error {
            return describe_error(&error);
        }
    }

    if !is_text_content(body) {
        return BINARY_PLACEHOLDER.to_string();
    }

    truncate_chars(&String::from_utf8_lossy(body), ERROR_BODY_LIMIT)
}

/// First `limit` characters of `text`, with `...` appended when anything was cut.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn brotli_encode(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
            writer.write_all(data).unwrap();
        }
        out
    }

    #[test]
    fn test_decompress_gzip() {
        let body = gzip(br#"{"data":1}"#);
        assert_eq!(decompress("gzip", &body).unwrap(), br#"{"data":1}"#);
    }

    #[test]
    fn test_decompress_brotli() {
        let body = brotli_encode(b"hello brotli");
        assert_eq!(decompress("br", &body).unwrap(), b"hello brotli");
    }

    #[test]
    fn test_decompress_passthrough() {
        assert_eq!(decompress("", b"plain").unwrap(), b"plain");
        assert_eq!(decompress("identity", b"plain").unwrap(), b"plain");
        assert_eq!(decompress("deflate", b"plain").unwrap(), b"plain");
    }

    #[test]
    fn test_decompress_corrupt_gzip() {
        let err = decompress("gzip", b"definitely not gzip").unwrap_err();
        assert!(matches!(err, TransportError::Decompress { .. }));
    }

    #[test]
    fn test_is_text_content() {
        assert!(is_text_content(b""));
        assert!(is_text_content(b"hello\nworld\t!\r\n"));
        assert!(!is_text_content(&[0xff, 0xfe, 0x00, 0x01]));
        assert!(!is_text_content(&[0x01; 20]));

        // 1 control char in 20 bytes is 5%.
        let mut mostly_text = vec![b'a'; 19];
        mostly_text.push(0x02);
        assert!(is_text_content(&mostly_text));
    }

    #[test]
    fn test_control_chars_past_sample_are_ignored() {
        let mut body = vec![b'a'; 1000];
        body.extend(std::iter::repeat_n(0x01, 500));
        assert!(is_text_content(&body));
    }

    #[test]
    fn test_long_body_is_truncated() {
        let body = "x".repeat(5000);
        let message = summarize_error_body(body.as_bytes());
        assert_eq!(message, format!("{}...", "x".repeat(200)));
    }

    #[test]
    fn test_short_body_is_kept() {
        assert_eq!(summarize_error_body(b"bad gateway"), "bad gateway");
    }

    #[test]
    fn test_binary_body_is_replaced() {
        let body = gzip(&[0u8; 64]);
        assert_eq!(summarize_error_body(&body), BINARY_PLACEHOLDER);
    }

    #[test]
    fn test_envelope_error_is_surfaced() {
        let body = br#"{"meta":{},"data":null,"error":"invalid refresh token"}"#;
        assert_eq!(summarize_error_body(body), "invalid refresh token");
    }

    #[test]
    fn test_envelope_without_error_falls_back_to_body() {
        let body = br#"{"data":null,"error":null}"#;
        assert_eq!(
            summarize_error_body(body),
            r#"{"data":null,"error":null}"#
        );
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé...");
        assert_eq!(truncate_chars("héllo", 5), "héllo");
    }
}
