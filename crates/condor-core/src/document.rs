//! The unit of work passed between pipeline stages.

use bytes::Bytes;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Per-processor analysis record attached to a document.
///
/// The payload is the raw result of the producing module and is never
/// interpreted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedData {
    /// Name of the processor module that produced this record.
    pub module: String,
    /// Raw result payload.
    pub data: serde_json::Value,
}

/// One discovered item passing through the pipeline.
///
/// Created by a lister, mutated by the scraper (`content`) and by
/// processors (`score`, `processed`), and destroyed by output workers once
/// every configured output has accepted it. The `id` is unique within the
/// originating input module's namespace and is never mutated after
/// creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier within the originating input module's namespace.
    pub id: String,
    /// Item title as reported by the source.
    #[serde(default)]
    pub title: String,
    /// Publishing user, when the source exposes one.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    /// Canonical URL of the item.
    #[serde(default)]
    pub url: String,
    /// Item size in bytes as reported by the source.
    #[serde(default)]
    pub size: u64,
    /// Raw content; empty until the scrape stage has run.
    #[serde(default)]
    pub content: Bytes,
    /// Publication time, when known.
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    /// Source-side expiry time, when known.
    #[serde(default)]
    pub expire_at: Option<Timestamp>,
    /// Highest score assigned by any processor so far.
    #[serde(default)]
    pub score: u32,
    /// Per-processor results, in the order the processors ran.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processed: Vec<ProcessedData>,
    /// Handle name of the input module that discovered this document.
    /// Stamped by the lister; the scraper uses it to find the module again.
    #[serde(default)]
    pub input_module_name: String,
}

impl Document {
    /// Creates an empty document with the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Serializes to the canonical wire form used for queue transport.
    ///
    /// Serialization is deterministic for an unmodified document, so the
    /// returned bytes identify this enqueue instance byte-for-byte.
    pub fn to_wire(&self) -> Result<Bytes> {
        Ok(serde_json::to_vec(self)?.into())
    }

    /// Deserializes a document from its wire form.
    pub fn from_wire(record: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(record)?)
    }

    /// Raises the score to `score` if it is higher than the current one.
    /// The score never decreases.
    pub fn raise_score(&mut self, score: u32) {
        self.score = self.score.max(score);
    }

    /// Appends one processor result record.
    pub fn append_result(&mut self, module: impl Into<String>, data: serde_json::Value) {
        self.processed.push(ProcessedData {
            module: module.into(),
            data,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document {
            id: "a1".into(),
            title: "leaked creds".into(),
            url: "https://paste.example/a1".into(),
            size: 5,
            content: Bytes::from_static(b"hello"),
            input_module_name: "my-pastebin".into(),
            ..Document::default()
        }
    }

    #[test]
    fn wire_form_round_trips() {
        let doc = sample();
        let wire = doc.to_wire().unwrap();
        let restored = Document::from_wire(&wire).unwrap();
        assert_eq!(doc, restored);
    }

    #[test]
    fn wire_form_is_deterministic() {
        let doc = sample();
        assert_eq!(doc.to_wire().unwrap(), doc.to_wire().unwrap());
        let reserialized = Document::from_wire(&doc.to_wire().unwrap())
            .unwrap()
            .to_wire()
            .unwrap();
        assert_eq!(doc.to_wire().unwrap(), reserialized);
    }

    #[test]
    fn empty_user_and_processed_are_omitted() {
        let wire = sample().to_wire().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&wire).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("user"));
        assert!(!object.contains_key("processed"));
    }

    #[test]
    fn score_never_decreases() {
        let mut doc = sample();
        doc.raise_score(50);
        assert_eq!(doc.score, 50);
        doc.raise_score(10);
        assert_eq!(doc.score, 50);
        doc.raise_score(80);
        assert_eq!(doc.score, 80);
    }

    #[test]
    fn append_result_preserves_order() {
        let mut doc = sample();
        doc.append_result("rules", serde_json::json!({"rule": "aws-key"}));
        doc.append_result("entropy", serde_json::json!({"bits": 7.2}));
        let modules: Vec<_> = doc.processed.iter().map(|p| p.module.as_str()).collect();
        assert_eq!(modules, ["rules", "entropy"]);
    }
}
