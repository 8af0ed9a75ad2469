//! ClinicalTrials.gov XML records
//!
//! A study file (`NCT00000102.xml`) becomes a `RawRecord` the `Normalizer`
//! understands:
//!
//! - `docno`: the file name without `.xml`, else the `<id_info><nct_id>` text
//! - `brief_title`: text of the first `<brief_title>`
//! - `brief_summary`: flattened text of the first `<brief_summary>`
//! - `text`: every text node of the study, in document order
//!
//! Text nodes are entity-unescaped and their whitespace collapsed.

use ctse_core::{CtseError, CtseResult, RawRecord};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Default)]
struct Extracted {
    nct_id: Option<String>,
    title: Option<String>,
    summary: Vec<String>,
    summary_done: bool,
    text: Vec<String>,
}

/// Parse one study document.
///
/// `file_name` (with or without directories and the `.xml` suffix) names the
/// record when given.
///
/// # Errors
///
/// `MalformedRecord` on invalid or truncated XML, or when neither the file
/// name nor the document carries an identifier.
pub fn record_from_xml(xml: &str, file_name: Option<&str>) -> CtseResult<RawRecord> {
    let extracted = extract(xml)?;

    let docno = file_name
        .and_then(|name| Path::new(name).file_stem())
        .and_then(|stem| stem.to_str())
        .map(str::trim)
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .or(extracted.nct_id)
        .ok_or_else(|| {
            CtseError::MalformedRecord("XML study has no NCT identifier".to_string())
        })?;

    let mut obj = Map::new();
    obj.insert("docno".into(), Value::String(docno));
    obj.insert(
        "brief_title".into(),
        Value::String(extracted.title.unwrap_or_default()),
    );
    obj.insert(
        "brief_summary".into(),
        Value::String(extracted.summary.join(" ")),
    );
    obj.insert("text".into(), Value::String(extracted.text.join(" ")));
    Ok(RawRecord::new(Value::Object(obj)))
}

/// Read and parse a study file; the file name is the record id.
pub fn record_from_xml_file(path: &Path) -> CtseResult<RawRecord> {
    let xml = std::fs::read_to_string(path)?;
    record_from_xml(&xml, path.file_name().and_then(|n| n.to_str()))
}

fn extract(xml: &str) -> CtseResult<Extracted> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut out = Extracted::default();
    loop {
        let event = reader.read_event().map_err(|e| {
            CtseError::MalformedRecord(format!(
                "invalid XML at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;
        match event {
            Event::Start(start) => stack.push(start.local_name().as_ref().to_vec()),
            Event::End(_) => {
                if stack.pop().as_deref() == Some(b"brief_summary".as_slice()) {
                    out.summary_done = true;
                }
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| {
                    CtseError::MalformedRecord(format!("invalid XML text: {}", e))
                })?;
                out.push_text(&stack, &text);
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                out.push_text(&stack, &text);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(CtseError::MalformedRecord(
            "XML study ends inside an element".to_string(),
        ));
    }
    Ok(out)
}

impl Extracted {
    fn push_text(&mut self, stack: &[Vec<u8>], raw: &str) {
        let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if cleaned.is_empty() {
            return;
        }
        let inside = |name: &[u8]| stack.iter().any(|s| s.as_slice() == name);
        let parent = stack.last().map(Vec::as_slice);

        if parent == Some(b"brief_title".as_slice()) && self.title.is_none() {
            self.title = Some(cleaned.clone());
        }
        if parent == Some(b"nct_id".as_slice()) && inside(b"id_info") && self.nct_id.is_none() {
            self.nct_id = Some(cleaned.clone());
        }
        if inside(b"brief_summary") && !self.summary_done {
            self.summary.push(cleaned.clone());
        }
        self.text.push(cleaned);
    }
}
