//! Canonical document schema
//!
//! A `Document` is what every index is built from: a stable id, an ordered
//! list of named text fields holding the original (display) text, and a
//! monotonic version bumped on every content change.

use crate::error::{CtseError, CtseResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

/// Stable identifier of a trial record (e.g. an NCT number)
///
/// Ordering is lexicographic on the identifier text and is the tie-break
/// order for every ranked list in the system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create an id, rejecting empty or whitespace-only identifiers
    pub fn new(id: impl Into<String>) -> CtseResult<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(CtseError::MalformedRecord(
                "document identifier is empty".to_string(),
            ));
        }
        if trimmed.len() == id.len() {
            Ok(DocumentId(id))
        } else {
            Ok(DocumentId(trimmed.to_string()))
        }
    }

    /// Identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Document version (monotonic per id, starts at 1)
pub type Version = u64;

/// One named text field of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Canonical field name (title, condition, eligibility, ...)
    pub name: String,
    /// Original text, whitespace-normalized but otherwise untouched
    pub text: String,
}

/// A normalized trial record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable id
    pub id: DocumentId,
    /// Ordered fields
    pub fields: Vec<Field>,
    /// Content version; `0` means "not yet assigned"
    pub version: Version,
}

impl Document {
    /// Create an empty, unversioned document
    pub fn new(id: DocumentId) -> Self {
        Document {
            id,
            fields: Vec::new(),
            version: 0,
        }
    }

    /// Builder-style field append
    pub fn with_field(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.push_field(name, text);
        self
    }

    /// Builder-style version
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Append a field, merging text into an existing field of the same name
    pub fn push_field(&mut self, name: impl Into<String>, text: impl Into<String>) {
        let name = name.into();
        let text = text.into();
        if text.is_empty() {
            return;
        }
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => {
                existing.text.push_str("; ");
                existing.text.push_str(&text);
            }
            None => self.fields.push(Field { name, text }),
        }
    }

    /// Text of a named field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.text.as_str())
    }

    /// All field text joined in field order (the encoder input)
    pub fn full_text(&self) -> String {
        let mut out = String::new();
        for field in &self.fields {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&field.text);
        }
        out
    }

    /// Whether the document carries any text at all
    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(|f| f.text.trim().is_empty())
    }

    /// Content fingerprint over field names and text (version excluded)
    ///
    /// Two documents with equal fingerprints index identically.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::new();
        for field in &self.fields {
            hasher.update(field.name.as_bytes());
            hasher.update(&[0]);
            hasher.update(field.text.as_bytes());
            hasher.update(&[0xff]);
        }
        hasher.digest()
    }
}

/// A raw, loosely-typed trial record as delivered by a source (one JSON object)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(serde_json::Value);

impl RawRecord {
    /// Wrap a JSON value
    pub fn new(value: serde_json::Value) -> Self {
        RawRecord(value)
    }

    /// Parse one JSON object from text
    pub fn from_json(text: &str) -> CtseResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| CtseError::MalformedRecord(format!("invalid JSON: {}", e)))?;
        Ok(RawRecord(value))
    }

    /// Underlying JSON value
    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<serde_json::Value> for RawRecord {
    fn from(value: serde_json::Value) -> Self {
        RawRecord(value)
    }
}
