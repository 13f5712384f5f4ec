//! Structured document (notebook) codec.
//!
//! The contents manager treats documents as opaque JSON values. Everything it
//! needs from the document format goes through [`DocumentCodec`]; the default
//! [`NotebookCodec`] understands nbformat 4 notebooks.

use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// nbformat major version written and validated by [`NotebookCodec`].
const NBFORMAT_VERSION: u64 = 4;
const NBFORMAT_MINOR: u64 = 5;

/// Signature scheme prefix stored in `metadata.signature`.
const SIGNATURE_SCHEME: &str = "sha256";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document is not valid JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("failed to serialize document: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Parsing, serialization, validation and trust handling of documents.
pub trait DocumentCodec: Send + Sync {
    /// Parse stored bytes into a document value.
    fn parse(&self, bytes: &[u8]) -> Result<Value, DocumentError>;

    /// Serialize a document into the bytes to store.
    fn serialize(&self, document: &Value) -> Result<Vec<u8>, DocumentError>;

    /// Validate a document. Returns a message describing the problem, if any.
    fn validate(&self, document: &Value) -> Option<String>;

    /// Flag the document's cells as trusted or untrusted according to its signature.
    fn mark_trusted(&self, document: &mut Value);

    /// Sign the document if every cell is trusted. Returns whether it was signed.
    fn check_and_sign(&self, document: &mut Value) -> bool;

    /// Sign the document unconditionally.
    fn sign(&self, document: &mut Value);

    /// An empty document.
    fn new_document(&self) -> Value;
}

/// nbformat 4 notebook codec.
///
/// Signatures are SHA-256 digests of the secret followed by the serialized
/// notebook (without its signature), kept in `metadata.signature`. A codec
/// without a secret never signs, so notebooks round-trip unchanged and their
/// code cells always read back untrusted.
#[derive(Debug, Clone, Default)]
pub struct NotebookCodec {
    secret: Vec<u8>,
}

impl NotebookCodec {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn code_cells_mut(document: &mut Value) -> impl Iterator<Item = &mut Map<String, Value>> {
        document
            .get_mut("cells")
            .and_then(Value::as_array_mut)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object_mut)
            .filter(|cell| cell.get("cell_type").and_then(Value::as_str) == Some("code"))
    }

    /// Remove per-cell `trusted` flags, which only live in memory.
    fn strip_transient(document: &mut Value) {
        for cell in Self::code_cells_mut(document) {
            if let Some(metadata) = cell.get_mut("metadata").and_then(Value::as_object_mut) {
                metadata.remove("trusted");
            }
        }
    }

    fn compute_signature(&self, document: &Value) -> Result<String, DocumentError> {
        let mut unsigned = document.clone();
        if let Some(metadata) = unsigned.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.remove("signature");
        }
        let bytes = self.serialize(&unsigned)?;

        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(&bytes);
        Ok(format!(
            "{}:{}",
            SIGNATURE_SCHEME,
            hex::encode(hasher.finalize())
        ))
    }

    fn signature_matches(&self, document: &Value) -> bool {
        let stored = document
            .get("metadata")
            .and_then(|m| m.get("signature"))
            .and_then(Value::as_str);
        match (stored, self.compute_signature(document)) {
            (Some(stored), Ok(computed)) => stored == computed,
            _ => false,
        }
    }
}

impl DocumentCodec for NotebookCodec {
    fn parse(&self, bytes: &[u8]) -> Result<Value, DocumentError> {
        serde_json::from_slice(bytes).map_err(DocumentError::Parse)
    }

    fn serialize(&self, document: &Value) -> Result<Vec<u8>, DocumentError> {
        let mut document = document.clone();
        Self::strip_transient(&mut document);

        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        document
            .serialize(&mut serializer)
            .map_err(DocumentError::Serialize)?;
        out.push(b'\n');
        Ok(out)
    }

    fn validate(&self, document: &Value) -> Option<String> {
        let Some(root) = document.as_object() else {
            return Some("Notebook validation failed: notebook must be a JSON object".to_string());
        };

        match root.get("nbformat").and_then(Value::as_u64) {
            Some(NBFORMAT_VERSION) => {}
            Some(other) => {
                return Some(format!(
                    "Notebook validation failed: unsupported nbformat {}",
                    other
                ))
            }
            None => return Some("Notebook validation failed: missing nbformat".to_string()),
        }

        if !root.get("metadata").is_some_and(Value::is_object) {
            return Some("Notebook validation failed: 'metadata' must be an object".to_string());
        }

        let Some(cells) = root.get("cells").and_then(Value::as_array) else {
            return Some("Notebook validation failed: 'cells' must be an array".to_string());
        };

        for (index, cell) in cells.iter().enumerate() {
            let cell_type = cell.get("cell_type").and_then(Value::as_str);
            if !matches!(cell_type, Some("code" | "markdown" | "raw")) {
                return Some(format!(
                    "Notebook validation failed: cell {} has unknown cell_type",
                    index
                ));
            }
            if cell.get("source").is_none() {
                return Some(format!(
                    "Notebook validation failed: cell {} has no source",
                    index
                ));
            }
        }

        None
    }

    fn mark_trusted(&self, document: &mut Value) {
        let trusted = self.signature_matches(document);
        for cell in Self::code_cells_mut(document) {
            let metadata = cell
                .entry("metadata")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(metadata) = metadata.as_object_mut() {
                metadata.insert("trusted".to_string(), Value::Bool(trusted));
            }
        }
    }

    fn check_and_sign(&self, document: &mut Value) -> bool {
        let all_trusted = Self::code_cells_mut(document).all(|cell| {
            cell.get("metadata")
                .and_then(|m| m.get("trusted"))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        });
        if all_trusted {
            self.sign(document);
        }
        all_trusted
    }

    fn sign(&self, document: &mut Value) {
        if self.secret.is_empty() {
            return;
        }
        let Ok(signature) = self.compute_signature(document) else {
            return;
        };
        if let Some(root) = document.as_object_mut() {
            let metadata = root
                .entry("metadata")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(metadata) = metadata.as_object_mut() {
                metadata.insert("signature".to_string(), Value::String(signature));
            }
        }
    }

    fn new_document(&self) -> Value {
        json!({
            "cells": [],
            "metadata": {},
            "nbformat": NBFORMAT_VERSION,
            "nbformat_minor": NBFORMAT_MINOR,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notebook() -> Value {
        json!({
            "cells": [
                {"cell_type": "markdown", "metadata": {}, "source": "# Title"},
                {"cell_type": "code", "metadata": {}, "source": "1 + 1",
                 "outputs": [], "execution_count": null}
            ],
            "metadata": {"kernelspec": {"name": "python3"}},
            "nbformat": 4,
            "nbformat_minor": 5
        })
    }

    #[test]
    fn test_serialize_layout() {
        let codec = NotebookCodec::default();
        let bytes = codec
            .serialize(&json!({"b": 1, "a": [true]}))
            .unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "{\n \"a\": [\n  true\n ],\n \"b\": 1\n}\n"
        );
    }

    #[test]
    fn test_parse_serialize_round_trip() {
        let codec = NotebookCodec::default();
        let bytes = codec.serialize(&notebook()).unwrap();
        let parsed = codec.parse(&bytes).unwrap();
        assert_eq!(parsed, notebook());
        assert_eq!(codec.serialize(&parsed).unwrap(), bytes);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let codec = NotebookCodec::default();
        assert!(matches!(
            codec.parse(b"{not json"),
            Err(DocumentError::Parse(_))
        ));
    }

    #[test]
    fn test_validate() {
        let codec = NotebookCodec::default();
        assert_eq!(codec.validate(&notebook()), None);
        assert_eq!(codec.validate(&codec.new_document()), None);

        let mut old = notebook();
        old["nbformat"] = json!(3);
        assert!(codec.validate(&old).unwrap().contains("unsupported nbformat"));

        let mut bad_cell = notebook();
        bad_cell["cells"][0]["cell_type"] = json!("widget");
        assert!(codec.validate(&bad_cell).unwrap().contains("cell 0"));

        assert!(codec.validate(&json!([1, 2])).is_some());
    }

    #[test]
    fn test_unsigned_notebook_is_untrusted() {
        let codec = NotebookCodec::new("secret");
        let mut nb = notebook();
        codec.mark_trusted(&mut nb);
        assert_eq!(nb["cells"][1]["metadata"]["trusted"], json!(false));
        assert!(nb["cells"][0]["metadata"].get("trusted").is_none());
    }

    #[test]
    fn test_sign_then_trust() {
        let codec = NotebookCodec::new("secret");
        let mut nb = notebook();
        codec.sign(&mut nb);
        assert!(nb["metadata"]["signature"]
            .as_str()
            .unwrap()
            .starts_with("sha256:"));

        codec.mark_trusted(&mut nb);
        assert_eq!(nb["cells"][1]["metadata"]["trusted"], json!(true));

        let other = NotebookCodec::new("other secret");
        let mut copy = nb.clone();
        other.mark_trusted(&mut copy);
        assert_eq!(copy["cells"][1]["metadata"]["trusted"], json!(false));
    }

    #[test]
    fn test_tampering_breaks_trust() {
        let codec = NotebookCodec::new("secret");
        let mut nb = notebook();
        codec.sign(&mut nb);
        nb["cells"][1]["source"] = json!("import os");
        codec.mark_trusted(&mut nb);
        assert_eq!(nb["cells"][1]["metadata"]["trusted"], json!(false));
    }

    #[test]
    fn test_check_and_sign_requires_trusted_cells() {
        let codec = NotebookCodec::new("secret");
        let mut nb = notebook();
        assert!(!codec.check_and_sign(&mut nb));
        assert!(nb["metadata"].get("signature").is_none());

        nb["cells"][1]["metadata"]["trusted"] = json!(true);
        assert!(codec.check_and_sign(&mut nb));
        assert!(nb["metadata"].get("signature").is_some());
    }

    #[test]
    fn test_no_secret_never_signs() {
        let codec = NotebookCodec::default();
        let mut nb = notebook();
        nb["cells"][1]["metadata"]["trusted"] = json!(true);
        assert!(codec.check_and_sign(&mut nb));
        assert!(nb["metadata"].get("signature").is_none());
    }

    #[test]
    fn test_trusted_flag_not_serialized() {
        let codec = NotebookCodec::default();
        let mut nb = notebook();
        nb["cells"][1]["metadata"]["trusted"] = json!(true);
        let text = String::from_utf8(codec.serialize(&nb).unwrap()).unwrap();
        assert!(!text.contains("trusted"));
    }
}
