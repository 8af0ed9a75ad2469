//! Document Normalizer
//!
//! Turns raw trial records (JSON objects) into canonical `Document`s and
//! derives the lexical view of a document. Pure: no I/O, no shared state.
//!
//! Known clinical-trial keys are mapped onto canonical field names in a
//! fixed order; remaining text-valued keys are appended in key order so no
//! text is dropped.

use crate::tokenizer::tokenize_with_positions;
use ctse_core::{CtseError, CtseResult, Document, DocumentId, RawRecord, Version};
use serde_json::{Map, Value};

/// Canonical field fed from one or more source keys
#[derive(Debug, Clone)]
pub struct FieldMapping {
    /// Canonical name
    pub name: String,
    /// Source keys, merged in order
    pub sources: Vec<String>,
}

impl FieldMapping {
    fn new(name: &str, sources: &[&str]) -> Self {
        FieldMapping {
            name: name.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Raw record → `Document`
#[derive(Debug, Clone)]
pub struct Normalizer {
    id_keys: Vec<String>,
    version_key: String,
    mappings: Vec<FieldMapping>,
    include_unmapped: bool,
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer {
            id_keys: vec!["nct_id".into(), "id".into(), "docno".into()],
            version_key: "version".into(),
            mappings: vec![
                FieldMapping::new("title", &["brief_title", "title"]),
                FieldMapping::new("official_title", &["official_title"]),
                FieldMapping::new("condition", &["condition", "conditions"]),
                FieldMapping::new("summary", &["brief_summary", "summary"]),
                FieldMapping::new("description", &["detailed_description", "description"]),
                FieldMapping::new(
                    "eligibility",
                    &["eligibility", "eligibility_criteria", "criteria"],
                ),
                FieldMapping::new(
                    "intervention",
                    &["intervention", "interventions", "intervention_name"],
                ),
                FieldMapping::new("keywords", &["keyword", "keywords"]),
            ],
            include_unmapped: true,
        }
    }
}

impl Normalizer {
    /// Normalizer with the default trial-record mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop keys that are not part of any mapping
    pub fn mapped_fields_only(mut self) -> Self {
        self.include_unmapped = false;
        self
    }

    /// Normalize one record.
    ///
    /// # Errors
    ///
    /// `MalformedRecord` if the record is not an object, has no usable
    /// identifier, carries a non-integer version, or holds no text.
    pub fn normalize(&self, raw: &RawRecord) -> CtseResult<Document> {
        let obj = raw.value().as_object().ok_or_else(|| {
            CtseError::MalformedRecord("record is not a JSON object".to_string())
        })?;

        let id = self.extract_id(obj)?;
        let version = self.extract_version(obj, &id)?;
        let mut doc = Document::new(id).with_version(version);

        let mut consumed: Vec<&str> = self.id_keys.iter().map(String::as_str).collect();
        consumed.push(&self.version_key);

        for mapping in &self.mappings {
            for source in &mapping.sources {
                consumed.push(source);
                if let Some(value) = obj.get(source) {
                    let text = flatten_text(value);
                    doc.push_field(mapping.name.clone(), text);
                }
            }
        }

        if self.include_unmapped {
            for (key, value) in obj {
                if consumed.contains(&key.as_str()) {
                    continue;
                }
                if matches!(value, Value::String(_) | Value::Array(_) | Value::Object(_)) {
                    doc.push_field(key.to_lowercase(), flatten_text(value));
                }
            }
        }

        if doc.is_empty() {
            return Err(CtseError::MalformedRecord(format!(
                "record {} has no text fields",
                doc.id
            )));
        }
        Ok(doc)
    }

    fn extract_id(&self, obj: &Map<String, Value>) -> CtseResult<DocumentId> {
        for key in &self.id_keys {
            match obj.get(key) {
                Some(Value::String(s)) => return DocumentId::new(s.as_str()),
                Some(Value::Number(n)) if n.is_u64() || n.is_i64() => {
                    return DocumentId::new(n.to_string())
                }
                Some(Value::Null) | None => continue,
                Some(other) => {
                    return Err(CtseError::MalformedRecord(format!(
                        "identifier '{}' has unsupported type: {}",
                        key, other
                    )))
                }
            }
        }
        Err(CtseError::MalformedRecord(format!(
            "record has no identifier (tried {})",
            self.id_keys.join(", ")
        )))
    }

    fn extract_version(&self, obj: &Map<String, Value>, id: &DocumentId) -> CtseResult<Version> {
        match obj.get(&self.version_key) {
            None | Some(Value::Null) => Ok(0),
            Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
                CtseError::MalformedRecord(format!(
                    "record {} has a non-integer version {}",
                    id, n
                ))
            }),
            Some(other) => Err(CtseError::MalformedRecord(format!(
                "record {} has an invalid version {}",
                id, other
            ))),
        }
    }
}

/// Flatten a JSON value into cleaned text.
///
/// Arrays join their items with "; ", objects their values in key order.
fn flatten_text(value: &Value) -> String {
    let mut parts = Vec::new();
    collect_text(value, &mut parts);
    parts.join("; ")
}

fn collect_text(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            let cleaned = clean_text(s);
            if !cleaned.is_empty() {
                out.push(cleaned);
            }
        }
        Value::Number(n) => out.push(n.to_string()),
        Value::Array(items) => items.iter().for_each(|v| collect_text(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_text(v, out)),
        Value::Bool(_) | Value::Null => {}
    }
}

/// Unescape common HTML entities and collapse whitespace runs.
pub fn clean_text(text: &str) -> String {
    let unescaped = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");
    unescaped.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// Lexical view
// ============================================================================

/// One field's terms with their positions inside the field
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedField {
    /// Field name
    pub name: String,
    /// `(term, position)` in token order
    pub terms: Vec<(String, u32)>,
}

/// Tokenized form of a document, as the lexical index consumes it
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedDocument {
    /// Document id
    pub id: DocumentId,
    /// Version being indexed
    pub version: Version,
    /// Content fingerprint of the source document
    pub fingerprint: u64,
    /// Fields with at least one term
    pub fields: Vec<AnalyzedField>,
}

impl AnalyzedDocument {
    /// Total term count (document length for BM25)
    pub fn length(&self) -> u32 {
        self.fields.iter().map(|f| f.terms.len() as u32).sum()
    }
}

/// Tokenize every field of a document (lower-cased terms, original text untouched).
pub fn analyze(doc: &Document) -> AnalyzedDocument {
    let fields = doc
        .fields
        .iter()
        .map(|field| AnalyzedField {
            name: field.name.clone(),
            terms: tokenize_with_positions(&field.text),
        })
        .filter(|field| !field.terms.is_empty())
        .collect();
    AnalyzedDocument {
        id: doc.id.clone(),
        version: doc.version,
        fingerprint: doc.fingerprint(),
        fields,
    }
}
