//! Delimited record-stream parser (§4.2): decodes the raw bytes of the
//! Altium `FileHeader` stream into a flat, positionally indexed list of
//! records.
//!
//! The stream is a heuristic format: skip 5 leading bytes and 1 trailing
//! byte, then split the remainder on a 5-byte delimiter pattern
//! `X X X 00 00 |` (three arbitrary length-indicator bytes, two nulls, a
//! pipe). Each resulting segment is `KEY=VALUE|KEY=VALUE|...` text. A record
//! with a `HEADER` key segregates to the header list; one with a `RECORD`
//! key segregates to the body list, whose positions become the `index`
//! hierarchy-building keys off of in §4.3.

use std::collections::BTreeMap;

/// One decoded record: its attributes plus the position it held in the body
/// list at parse time (used as the `OwnerIndex` target for hierarchy
/// building, §4.3.1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub index: usize,
    pub attrs: BTreeMap<String, String>,
}

impl Record {
    /// Case-sensitive attribute lookup matching the key as written in the
    /// stream (callers that need to handle both `Text` and `TEXT` probe
    /// both casings explicitly, per §4.2).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(|s| s.as_str())
    }

    /// Look up `key` trying the exact casing first, then its upper-case
    /// form — the common `Location.X` / `LOCATION.X` aliasing seen
    /// throughout Altium attribute names (§4.3.2).
    pub fn get_ci(&self, key: &str) -> Option<&str> {
        self.get(key).or_else(|| self.get(&key.to_ascii_uppercase()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordStream {
    pub header: Vec<Record>,
    pub body: Vec<Record>,
}

#[derive(Debug)]
pub enum RecordStreamError {
    TooShort,
}

impl std::fmt::Display for RecordStreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStreamError::TooShort => {
                write!(f, "record stream shorter than the 6-byte leading/trailing heuristic")
            }
        }
    }
}

impl std::error::Error for RecordStreamError {}

pub type RecordStreamResult<T> = Result<T, RecordStreamError>;

const LEADING_SKIP: usize = 5;
const TRAILING_SKIP: usize = 1;

/// Parse the raw `FileHeader` stream bytes into header/body record lists.
pub fn parse(data: &[u8]) -> RecordStreamResult<RecordStream> {
    if data.len() < LEADING_SKIP + TRAILING_SKIP {
        return Err(RecordStreamError::TooShort);
    }

    let body_bytes = &data[LEADING_SKIP..data.len() - TRAILING_SKIP];
    let segments = split_on_delimiter(body_bytes);

    let mut header = Vec::new();
    let mut body = Vec::new();

    for segment in segments {
        let text = String::from_utf8_lossy(segment);
        if text.trim().is_empty() {
            continue;
        }
        let attrs = tokenize(&text);
        if attrs.is_empty() {
            continue;
        }
        if attrs.contains_key("HEADER") {
            header.push(Record {
                index: header.len(),
                attrs,
            });
        } else if attrs.contains_key("RECORD") {
            body.push(Record {
                index: body.len(),
                attrs,
            });
        }
    }

    Ok(RecordStream { header, body })
}

/// Split on the 5-byte pattern `X X X 00 00 |`: three arbitrary bytes, two
/// nulls, a pipe. The three preceding bytes and the two nulls and the pipe
/// are all discarded; only the text between delimiters is kept.
fn split_on_delimiter(data: &[u8]) -> Vec<&[u8]> {
    let mut segments = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i + 5 <= data.len() {
        if data[i + 3] == 0x00 && data[i + 4] == 0x00 {
            // The pipe is expected immediately after the two nulls; if it's
            // not there this isn't the delimiter, keep scanning.
            if i + 5 < data.len() && data[i + 5] == b'|' {
                // the "length indicator" bytes at data[i..i+3] belong to the
                // delimiter, not to the preceding segment's text, so the
                // segment ends exactly where the 3 arbitrary bytes begin.
                segments.push(&data[start..i]);
                i += 6; // 3 arbitrary + 2 nulls + pipe
                start = i;
                continue;
            }
        }
        i += 1;
    }

    if start <= data.len() {
        segments.push(&data[start..]);
    }

    segments
}

/// `KEY=VALUE|KEY=VALUE|...` — split on `|`, then on the first `=` per
/// token. Empty tokens are dropped.
fn tokenize(text: &str) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    for token in text.split('|') {
        if token.is_empty() {
            continue;
        }
        if let Some(eq) = token.find('=') {
            let key = token[..eq].to_string();
            let value = token[eq + 1..].to_string();
            attrs.insert(key, value);
        }
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delimiter() -> Vec<u8> {
        vec![b'L', b'E', b'N', 0x00, 0x00, b'|']
    }

    fn wrap(segments: &[&str]) -> Vec<u8> {
        let mut out = vec![0u8; LEADING_SKIP];
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                out.extend_from_slice(&delimiter());
            }
            out.extend_from_slice(segment.as_bytes());
        }
        out.push(0x00); // trailing byte
        out
    }

    #[test]
    fn too_short_is_an_error() {
        assert!(matches!(parse(b"abcde"), Err(RecordStreamError::TooShort)));
        assert!(parse(b"abcdef").is_ok());
    }

    #[test]
    fn splits_segments_and_segregates_header_body() {
        let data = wrap(&["HEADER=Schematic|WEIGHT=1", "RECORD=1|DESIGNATOR=R1"]);
        let stream = parse(&data).unwrap();
        assert_eq!(stream.header.len(), 1);
        assert_eq!(stream.header[0].get("HEADER"), Some("Schematic"));
        assert_eq!(stream.body.len(), 1);
        assert_eq!(stream.body[0].get("RECORD"), Some("1"));
        assert_eq!(stream.body[0].get("DESIGNATOR"), Some("R1"));
    }

    #[test]
    fn body_indices_are_positional() {
        let data = wrap(&[
            "RECORD=1|DESIGNATOR=R1",
            "RECORD=2|OWNERINDEX=0",
            "RECORD=2|OWNERINDEX=0",
        ]);
        let stream = parse(&data).unwrap();
        assert_eq!(stream.body[0].index, 0);
        assert_eq!(stream.body[1].index, 1);
        assert_eq!(stream.body[2].index, 2);
    }

    #[test]
    fn empty_segments_are_dropped() {
        let data = wrap(&["RECORD=1|DESIGNATOR=R1", "", "RECORD=2|OWNERINDEX=0"]);
        let stream = parse(&data).unwrap();
        assert_eq!(stream.body.len(), 2);
    }

    #[test]
    fn record_without_keys_beyond_synthetic_index_is_dropped() {
        // A segment with only pipes and no '=' tokens yields no attrs at all.
        let data = wrap(&["RECORD=1|DESIGNATOR=R1", "|||", "RECORD=2|OWNERINDEX=0"]);
        let stream = parse(&data).unwrap();
        assert_eq!(stream.body.len(), 2);
    }

    #[test]
    fn get_ci_falls_back_to_uppercase() {
        let mut attrs = BTreeMap::new();
        attrs.insert("LOCATION.X".to_string(), "100000".to_string());
        let record = Record { index: 0, attrs };
        assert_eq!(record.get_ci("Location.X"), Some("100000"));
    }
}
