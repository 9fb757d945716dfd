use anyhow::{Context, Result};
use blake3::Hasher;
use serde::Serialize;

/// Emit a value as JCS-canonical JSON (RFC 8785).
///
/// This is the standard way to emit JSON for run summaries and manifests.
/// JCS keeps output byte-identical regardless of field ordering in the source
/// struct.
///
/// ```rust
/// use appforge_utils::canonicalization::emit_jcs;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Output {
///     name: String,
///     value: i32,
/// }
///
/// let json = emit_jcs(&Output { name: "x".into(), value: 1 }).unwrap();
/// assert_eq!(json, r#"{"name":"x","value":1}"#);
/// ```
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON using JCS")?;
    String::from_utf8(json_bytes).with_context(|| "JCS output contained invalid UTF-8")
}

/// BLAKE3 hex digest of content after line-ending normalization.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(normalize_line_endings(content).as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Normalize CRLF and lone CR to LF.
#[must_use]
pub fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}
