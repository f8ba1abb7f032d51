//! Credential document model and parsing.
//!
//! Documents originate in a CouchDB-style key store and arrive either as a
//! JSON array or as JSON lines. Unknown fields are preserved so a document
//! emitted whole round-trips without loss.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Basic-auth credentials: a single API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicCreds {
    pub api_key: String,
}

/// MAC credentials. Only the key identifier participates in bucketing;
/// the key material and algorithm ride along for whole-document emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacCreds {
    pub mac_key_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_algorithm: Option<String>,
}

/// A single credential record as stored in the key store.
///
/// A record carries either a `basic` or a `mac` sub-object. `type` is the
/// version tag (e.g. `"creds_v1.0"`); records without one never match the
/// bucketing views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredsDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(rename = "type", default)]
    pub doc_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic: Option<BasicCreds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<MacCreds>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CredsDocument {
    /// Best-effort identifier for log lines: `_id` if set, else the principal.
    pub fn log_id(&self) -> &str {
        self.id
            .as_deref()
            .or(self.principal.as_deref())
            .unwrap_or("<no id>")
    }
}

/// Parses a document collection from raw bytes.
///
/// Accepts either a JSON array of documents or newline-delimited JSON
/// (one document per line, blank lines ignored).
///
/// # Errors
///
/// Returns an error if the bytes are neither a valid JSON array nor valid
/// JSON lines of credential documents.
pub fn parse_documents(bytes: &[u8]) -> Result<Vec<CredsDocument>> {
    let text = std::str::from_utf8(bytes)?;

    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    let mut docs = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        docs.push(serde_json::from_str(line)?);
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_array() {
        let bytes = br#"[
            {"type": "creds_v1.0", "basic": {"api_key": "abcd1234"}},
            {"type": "creds_v1.0", "mac": {"mac_key_identifier": "9f3a"}}
        ]"#;

        let docs = parse_documents(bytes).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].basic.as_ref().unwrap().api_key, "abcd1234");
        assert_eq!(docs[1].mac.as_ref().unwrap().mac_key_identifier, "9f3a");
    }

    #[test]
    fn test_parse_json_lines() {
        let bytes = b"{\"type\": \"creds_v1.0\", \"basic\": {\"api_key\": \"aa\"}}\n\n{\"type\": \"other\"}\n";

        let docs = parse_documents(bytes).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].doc_type, "other");
    }

    #[test]
    fn test_parse_invalid_bytes() {
        let result = parse_documents(b"not json at all");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_type_defaults_to_empty() {
        let docs = parse_documents(b"{\"basic\": {\"api_key\": \"aa\"}}").unwrap();
        assert_eq!(docs[0].doc_type, "");
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let raw = r#"{"_id":"creds-1","type":"creds_v1.0","principal":"dave@example.com","basic":{"api_key":"ab12cd34"},"custom_tag":"blue"}"#;
        let doc: CredsDocument = serde_json::from_str(raw).unwrap();

        assert_eq!(doc.extra["custom_tag"], "blue");

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["custom_tag"], "blue");
        assert_eq!(back["_id"], "creds-1");
    }

    #[test]
    fn test_log_id_fallbacks() {
        let doc: CredsDocument =
            serde_json::from_str(r#"{"type":"creds_v1.0","principal":"p@x.com"}"#).unwrap();
        assert_eq!(doc.log_id(), "p@x.com");

        let doc: CredsDocument = serde_json::from_str(r#"{"type":"creds_v1.0"}"#).unwrap();
        assert_eq!(doc.log_id(), "<no id>");
    }
}
