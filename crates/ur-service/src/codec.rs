//! Compact chunked rule encoding
//!
//! Sync storage caps each item at a few kilobytes, so the rule list is
//! stored as a JSON array of positional records, serialized to a string and
//! split across numbered keys:
//!
//! ```text
//! rules_meta = {"chunks": 2}
//! rules_0    = "[[1,\"a.com\",\"b.com\",3,1],[2,\"c.com\",\"d.com\",0,0,1700000000000]"
//! rules_1    = ",[3,\"e.com\",\":shuffle:\",7,1]]"
//! ```
//!
//! A record is `[id, source, target, count, active, pausedUntil,
//! overrideUntil, lastCountMessage]`. Absent trailing fields are dropped and
//! absent middle fields are written as `null`. Data written before chunking
//! existed, a plain array of rule objects under the bare key, is still read.

use std::collections::HashMap;

use serde_json::{json, Value};

use ur_core::Rule;

use crate::error::CodecError;

/// Key holding the chunk count.
pub fn meta_key(storage_key: &str) -> String {
    format!("{}_meta", storage_key)
}

/// Key holding chunk `index`.
pub fn chunk_key(storage_key: &str, index: usize) -> String {
    format!("{}_{}", storage_key, index)
}

/// Keys for chunks `0..count`.
pub fn chunk_keys(storage_key: &str, count: usize) -> Vec<String> {
    (0..count).map(|index| chunk_key(storage_key, index)).collect()
}

// =============================================================================
// Records
// =============================================================================

/// Encode one rule as a positional record.
pub fn encode_rule(rule: &Rule) -> Value {
    let mut record = vec![
        json!(rule.id),
        json!(rule.source),
        json!(rule.target),
        json!(rule.count),
        json!(if rule.active { 1 } else { 0 }),
    ];

    let optional = [
        rule.paused_until.map(Value::from),
        rule.override_until.map(Value::from),
        rule.last_count_message.as_deref().map(Value::from),
    ];
    let present = optional.iter().rposition(Option::is_some).map_or(0, |pos| pos + 1);
    record.extend(optional.into_iter().take(present).map(|field| field.unwrap_or(Value::Null)));

    Value::Array(record)
}

/// Decode one positional record. `index` is only used for error messages.
pub fn decode_rule(value: &Value, index: usize) -> Result<Rule, CodecError> {
    let malformed = |reason: &str| CodecError::MalformedRecord {
        index,
        reason: reason.to_string(),
    };

    let fields = value.as_array().ok_or_else(|| malformed("not an array"))?;
    let field = |pos: usize| fields.get(pos).filter(|v| !v.is_null());

    let id = field(0).and_then(Value::as_i64).ok_or_else(|| malformed("id"))?;
    let source = field(1).and_then(Value::as_str).ok_or_else(|| malformed("source"))?;
    let target = field(2).and_then(Value::as_str).ok_or_else(|| malformed("target"))?;

    let count = match field(3) {
        None => 0,
        Some(v) => v.as_u64().ok_or_else(|| malformed("count"))?,
    };
    let active = match field(4) {
        None => true,
        Some(Value::Bool(flag)) => *flag,
        Some(v) => v.as_i64().ok_or_else(|| malformed("active"))? != 0,
    };
    let timestamp = |pos: usize, name: &str| match field(pos) {
        None => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| malformed(name)),
    };
    let paused_until = timestamp(5, "pausedUntil")?;
    let override_until = timestamp(6, "overrideUntil")?;
    let last_count_message = match field(7) {
        None => None,
        Some(v) => Some(v.as_str().ok_or_else(|| malformed("lastCountMessage"))?.to_string()),
    };

    Ok(Rule {
        id,
        source: source.to_string(),
        target: target.to_string(),
        count,
        active,
        paused_until,
        override_until,
        last_count_message,
    })
}

/// Serialize the whole list into its compact string form.
pub fn compress(rules: &[Rule]) -> String {
    Value::Array(rules.iter().map(encode_rule).collect()).to_string()
}

/// Parse the compact string form.
pub fn decompress(text: &str) -> Result<Vec<Rule>, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    decode_list(&value)
}

/// Decode an array whose elements are compact records or legacy objects.
fn decode_list(value: &Value) -> Result<Vec<Rule>, CodecError> {
    let items = value.as_array().ok_or(CodecError::MalformedRecord {
        index: 0,
        reason: "rule list is not an array".to_string(),
    })?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| -> Result<Rule, CodecError> {
            match item {
                Value::Object(_) => Ok(serde_json::from_value(item.clone())?),
                _ => decode_rule(item, index),
            }
        })
        .collect()
}

// =============================================================================
// Chunking
// =============================================================================

/// Bytes a character occupies once the chunk is stored as a JSON string.
fn escaped_len(c: char) -> usize {
    match c {
        '"' | '\\' | '\n' | '\r' | '\t' | '\u{8}' | '\u{c}' => 2,
        c if (c as u32) < 0x20 => 6,
        c => c.len_utf8(),
    }
}

/// Split `text` into pieces whose stored JSON form fits in `max_bytes`.
///
/// Splits only on character boundaries. `max_bytes` below the minimum that
/// fits one escaped character is raised to it.
pub fn split_chunks(text: &str, max_bytes: usize) -> Vec<String> {
    // Two bytes for the surrounding quotes, six for the widest escape
    let budget = max_bytes.saturating_sub(2).max(6);

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut used = 0;
    for c in text.chars() {
        let len = escaped_len(c);
        if used + len > budget && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(c);
        used += len;
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Storage items for a full rule list: metadata plus every chunk.
pub fn to_storage_items(rules: &[Rule], storage_key: &str, chunk_size: usize) -> HashMap<String, Value> {
    let chunks = split_chunks(&compress(rules), chunk_size);

    let mut items = HashMap::with_capacity(chunks.len() + 1);
    items.insert(meta_key(storage_key), json!({ "chunks": chunks.len() }));
    for (index, chunk) in chunks.into_iter().enumerate() {
        items.insert(chunk_key(storage_key, index), Value::String(chunk));
    }
    items
}

/// Chunk count recorded in a metadata value.
pub fn chunk_count(meta: &Value) -> Option<usize> {
    meta.get("chunks").and_then(Value::as_u64).map(|n| n as usize)
}

/// Reassemble chunks `0..count` from fetched items.
pub fn from_chunks(items: &HashMap<String, Value>, storage_key: &str, count: usize) -> Result<Vec<Rule>, CodecError> {
    let mut text = String::new();
    for key in chunk_keys(storage_key, count) {
        match items.get(&key) {
            Some(Value::String(chunk)) => text.push_str(chunk),
            Some(_) => return Err(CodecError::NotAString(key)),
            None => return Err(CodecError::MissingChunk(key)),
        }
    }

    if text.is_empty() {
        return Ok(Vec::new());
    }
    decompress(&text)
}

/// Read the pre-chunking layout stored under the bare key.
///
/// Accepts an array value or a string holding one.
pub fn from_legacy(value: &Value) -> Result<Vec<Rule>, CodecError> {
    match value {
        Value::String(text) => decompress(text),
        Value::Null => Ok(Vec::new()),
        other => decode_list(other),
    }
}
