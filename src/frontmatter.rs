//! Metadata blocks prefixed to planning documents.
//!
//! A block is delimited by `---` lines at the top of a document and holds `key: value`
//! pairs. Values are a small tagged union ([`MetaValue`]): scalars, lists (inline `[a, b]`
//! or one `- item` per line), and nested objects. List items may themselves be objects
//! (`- path: x` followed by deeper keys), which is how must-have artifacts are declared.
//!
//! Parsing is line based and deliberately forgiving: lines that do not fit the grammar are
//! skipped and reported in [`ParsedBlock::skipped_lines`], so one damaged document never
//! blocks extraction from its siblings. Serialization is format stable: re-parsing the
//! output of [`serialize`] yields the same keys and equivalent values.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{ser::SerializeMap, Serialize, Serializer};
use std::fmt::Write;

const DELIMITER: &str = "---";
const INLINE_LIST_MAX_ITEMS: usize = 3;
const INLINE_LIST_MAX_WIDTH: usize = 60;

static KEY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_][A-Za-z0-9_.\- ]*?)\s*:(?:\s+(.*)|\s*)$").expect("static regex")
});
// List items open an object only on a single-word key; `- Chose X: because Y` is prose.
static ITEM_KEY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_][A-Za-z0-9_.\-]*)\s*:(?:\s+(.*)|\s*)$").expect("static regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue {
    Scalar(String),
    List(Vec<MetaValue>),
    Object(Metadata),
}

impl MetaValue {
    pub fn scalar(value: impl Into<String>) -> Self {
        MetaValue::Scalar(value.into())
    }

    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MetaValue::List(items.into_iter().map(|s| MetaValue::Scalar(s.into())).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Scalar(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Metadata> {
        match self {
            MetaValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MetaValue]> {
        match self {
            MetaValue::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }

    /// Scalar items of a list, or a single non-empty scalar as a one-item list.
    pub fn to_string_list(&self) -> Vec<String> {
        match self {
            MetaValue::Scalar(s) if s.trim().is_empty() => Vec::new(),
            MetaValue::Scalar(s) => vec![s.clone()],
            MetaValue::List(items) => items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect(),
            MetaValue::Object(_) => Vec::new(),
        }
    }

    /// Structural equivalence used by the round-trip invariant. Empty scalars, empty lists
    /// and empty objects are all "nothing" and compare equal.
    pub fn equivalent(&self, other: &MetaValue) -> bool {
        match (self, other) {
            (MetaValue::Scalar(a), MetaValue::Scalar(b)) => a == b,
            (MetaValue::List(a), MetaValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent(y))
            }
            (MetaValue::Object(a), MetaValue::Object(b)) => a.equivalent(b),
            (a, b) => a.is_empty() && b.is_empty(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MetaValue::Scalar(s) => s.is_empty(),
            MetaValue::List(l) => l.is_empty(),
            MetaValue::Object(o) => o.is_empty(),
        }
    }

    /// Interpret a command-line value: JSON when it parses as JSON, otherwise a scalar.
    pub fn from_cli(raw: &str) -> MetaValue {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(json) => MetaValue::from_json(&json),
            Err(_) => MetaValue::Scalar(raw.to_string()),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> MetaValue {
        match json {
            serde_json::Value::Null => MetaValue::Scalar(String::new()),
            serde_json::Value::String(s) => MetaValue::Scalar(s.clone()),
            serde_json::Value::Array(items) => {
                MetaValue::List(items.iter().map(MetaValue::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                let mut meta = Metadata::default();
                for (k, v) in map {
                    meta.set(k, MetaValue::from_json(v));
                }
                MetaValue::Object(meta)
            }
            other => MetaValue::Scalar(other.to_string()),
        }
    }
}

impl Serialize for MetaValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetaValue::Scalar(s) => serializer.serialize_str(s),
            MetaValue::List(items) => items.serialize(serializer),
            MetaValue::Object(meta) => meta.serialize(serializer),
        }
    }
}

/// Ordered key/value mapping. Insertion order is preserved so rewritten documents keep
/// their field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, MetaValue)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Lookup through nested objects with a dotted path, e.g. `must_haves.artifacts`.
    pub fn get_path(&self, dotted: &str) -> Option<&MetaValue> {
        let mut parts = dotted.split('.');
        let mut current = self.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MetaValue::as_str)
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key).map(MetaValue::to_string_list).unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get_str(key)?.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set `key`, keeping its position when it already exists.
    pub fn set(&mut self, key: &str, value: MetaValue) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key.to_string(), value));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shallow merge: keys of `other` overwrite keys of `self`.
    pub fn merge(&mut self, other: Metadata) {
        for (k, v) in other.entries {
            self.set(&k, v);
        }
    }

    pub fn equivalent(&self, other: &Metadata) -> bool {
        self.len() == other.len()
            && self.iter().all(|(k, v)| {
                other
                    .get(k)
                    .map(|ov| v.equivalent(ov))
                    .unwrap_or(false)
            })
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in self.entries.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Outcome of parsing a document's metadata block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBlock {
    pub metadata: Metadata,
    /// Whether the document opens with a block delimiter at all.
    pub present: bool,
    /// The closing delimiter was missing; the block was read up to the first blank line.
    pub truncated: bool,
    /// 1-based document line numbers that were ignored as unparseable.
    pub skipped_lines: Vec<usize>,
    /// Byte offset where the document body starts.
    pub body_start: usize,
}

#[derive(Debug, Clone)]
struct Line<'a> {
    number: usize,
    indent: usize,
    text: &'a str,
}

/// Parse the metadata block of `content`. Never fails.
pub fn parse(content: &str) -> ParsedBlock {
    let Some(first_end) = content.find('\n') else {
        return ParsedBlock::default();
    };
    if content[..first_end].trim_end() != DELIMITER {
        return ParsedBlock::default();
    }

    let mut block_lines = Vec::new();
    let mut offset = first_end + 1;
    let mut closed = false;
    let mut body_start = content.len();
    for (idx, raw) in content[offset..].split_inclusive('\n').enumerate() {
        let line = raw.trim_end_matches(['\n', '\r']);
        if line.trim_end() == DELIMITER {
            closed = true;
            body_start = offset + raw.len();
            break;
        }
        block_lines.push((idx + 2, line));
        offset += raw.len();
    }

    let mut truncated = false;
    if !closed {
        truncated = true;
        let mut kept = Vec::new();
        let mut consumed = first_end + 1;
        for (number, line) in block_lines {
            if line.trim().is_empty() {
                consumed += line.len() + 1;
                break;
            }
            consumed += line.len() + 1;
            kept.push((number, line));
        }
        block_lines = kept;
        body_start = consumed.min(content.len());
        tracing::debug!(
            "Metadata block has no closing delimiter; parsed {} line(s) before first blank line",
            block_lines.len()
        );
    }

    let lines: Vec<Line<'_>> = block_lines
        .into_iter()
        .filter_map(|(number, raw)| {
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                return None;
            }
            Some(Line {
                number,
                indent: raw.len() - raw.trim_start().len(),
                text,
            })
        })
        .collect();

    let mut parser = BlockParser {
        lines,
        pos: 0,
        skipped: Vec::new(),
    };
    let metadata = parser.parse_object(0);
    let mut skipped = parser.skipped;
    // Anything left over sits outside every container.
    while parser.pos < parser.lines.len() {
        skipped.push(parser.lines[parser.pos].number);
        parser.pos += 1;
    }
    skipped.sort_unstable();
    skipped.dedup();

    ParsedBlock {
        metadata,
        present: true,
        truncated,
        skipped_lines: skipped,
        body_start,
    }
}

/// Convenience accessor for the metadata of `content`.
pub fn extract(content: &str) -> Metadata {
    parse(content).metadata
}

/// The document text after the metadata block (the whole text when there is none).
pub fn body(content: &str) -> &str {
    let parsed = parse(content);
    if parsed.present {
        &content[parsed.body_start.min(content.len())..]
    } else {
        content
    }
}

/// Replace the metadata block of `content` with `metadata`, or prepend one. The body is
/// preserved byte for byte.
pub fn splice(content: &str, metadata: &Metadata) -> String {
    let parsed = parse(content);
    let rest = if parsed.present {
        &content[parsed.body_start.min(content.len())..]
    } else {
        content
    };
    let mut out = String::with_capacity(content.len() + 64);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&serialize(metadata));
    out.push_str(DELIMITER);
    out.push('\n');
    if !parsed.present && !rest.is_empty() && !rest.starts_with('\n') {
        out.push('\n');
    }
    out.push_str(rest);
    out
}

struct BlockParser<'a> {
    lines: Vec<Line<'a>>,
    pos: usize,
    skipped: Vec<usize>,
}

impl<'a> BlockParser<'a> {
    fn peek(&self) -> Option<&Line<'a>> {
        self.lines.get(self.pos)
    }

    /// Parse `key: value` lines belonging to one object. The object's indentation is set
    /// by its first line; deeper lines that no container claims are skipped.
    fn parse_object(&mut self, min_indent: usize) -> Metadata {
        let mut meta = Metadata::default();
        let mut object_indent: Option<usize> = None;
        while let Some(line) = self.peek().cloned() {
            if line.indent < min_indent {
                break;
            }
            let indent = *object_indent.get_or_insert(line.indent);
            if line.indent < indent {
                break;
            }
            if line.indent > indent || is_list_item(line.text) {
                self.skipped.push(line.number);
                self.pos += 1;
                continue;
            }
            let Some(caps) = KEY_LINE.captures(line.text) else {
                self.skipped.push(line.number);
                self.pos += 1;
                continue;
            };
            let key = caps[1].to_string();
            let raw_value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            self.pos += 1;
            let value = if raw_value.is_empty() {
                self.parse_nested(indent)
            } else {
                parse_inline_value(raw_value)
            };
            meta.set(&key, value);
        }
        meta
    }

    /// Value of a `key:` line with nothing after the colon.
    fn parse_nested(&mut self, key_indent: usize) -> MetaValue {
        match self.peek() {
            Some(next) if is_list_item(next.text) && next.indent >= key_indent => {
                let list_indent = next.indent;
                self.parse_list(list_indent)
            }
            Some(next) if next.indent > key_indent => {
                let child_indent = next.indent;
                MetaValue::Object(self.parse_object(child_indent))
            }
            _ => MetaValue::Scalar(String::new()),
        }
    }

    fn parse_list(&mut self, list_indent: usize) -> MetaValue {
        let mut items = Vec::new();
        while let Some(line) = self.peek().cloned() {
            if line.indent < list_indent {
                break;
            }
            if line.indent == list_indent && !is_list_item(line.text) {
                break;
            }
            if line.indent > list_indent {
                self.skipped.push(line.number);
                self.pos += 1;
                continue;
            }
            let item_text = line.text[1..].trim_start();
            let item_indent = list_indent + (line.text.len() - item_text.len());
            if !item_text.is_empty() && !is_quoted(item_text) && ITEM_KEY_LINE.is_match(item_text) {
                // `- key: value` opens an object item. Re-read this line as the first key
                // of an object indented to the item text.
                self.lines[self.pos] = Line {
                    number: line.number,
                    indent: item_indent,
                    text: item_text,
                };
                items.push(MetaValue::Object(self.parse_object(item_indent)));
            } else {
                self.pos += 1;
                items.push(MetaValue::Scalar(unquote(item_text)));
            }
        }
        MetaValue::List(items)
    }
}

fn is_list_item(text: &str) -> bool {
    text == "-" || text.starts_with("- ")
}

fn is_quoted(text: &str) -> bool {
    text.len() >= 2
        && ((text.starts_with('"') && text.ends_with('"'))
            || (text.starts_with('\'') && text.ends_with('\'')))
}

fn parse_inline_value(raw: &str) -> MetaValue {
    if raw.starts_with('[') && raw.ends_with(']') {
        let inner = raw[1..raw.len() - 1].trim();
        if inner.is_empty() {
            return MetaValue::List(Vec::new());
        }
        return MetaValue::List(
            split_inline(inner)
                .into_iter()
                .map(|item| MetaValue::Scalar(unquote(item.trim())))
                .filter(|item| !item.is_empty())
                .collect(),
        );
    }
    if raw == "{}" {
        return MetaValue::Object(Metadata::default());
    }
    MetaValue::Scalar(unquote(raw))
}

/// Split an inline list on commas outside of quotes.
fn split_inline(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (idx, ch) in inner.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, ch) {
            (Some('"'), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, ',') => {
                parts.push(&inner[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&inner[start..]);
    parts
}

fn unquote(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        let inner = &raw[1..raw.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some(other) => out.push(other),
                    None => out.push('\\'),
                }
            } else {
                out.push(c);
            }
        }
        out
    } else if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        raw[1..raw.len() - 1].replace("''", "'")
    } else {
        raw.to_string()
    }
}

fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value.contains(':')
        || value.contains('#')
        || value.contains('\n')
        || value.starts_with(['[', '{', '"', '\'', '&', '*', '!', '|', '>', '%', '@', '`'])
        || value == "-"
        || value.starts_with("- ")
        || value.trim() != value
}

fn render_scalar(value: &str) -> String {
    if needs_quotes(value) {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n");
        format!("\"{escaped}\"")
    } else {
        value.to_string()
    }
}

fn renders_inline(items: &[MetaValue]) -> bool {
    if items.len() > INLINE_LIST_MAX_ITEMS {
        return false;
    }
    let mut width = 0;
    for item in items {
        let MetaValue::Scalar(s) = item else {
            return false;
        };
        if s.is_empty() || s.contains(',') || s.contains(']') || needs_quotes(s) {
            return false;
        }
        width += s.len() + 2;
    }
    width <= INLINE_LIST_MAX_WIDTH
}

/// Render `metadata` as block lines (without delimiters), each terminated by `\n`.
pub fn serialize(metadata: &Metadata) -> String {
    let mut out = String::new();
    write_object(&mut out, metadata, 0);
    out
}

fn write_object(out: &mut String, meta: &Metadata, indent: usize) {
    for (key, value) in meta.iter() {
        write_entry(out, key, value, indent);
    }
}

fn write_entry(out: &mut String, key: &str, value: &MetaValue, indent: usize) {
    let pad = " ".repeat(indent);
    // Writing to a String cannot fail.
    match value {
        MetaValue::Scalar(s) => {
            let _ = writeln!(out, "{pad}{key}: {}", render_scalar(s));
        }
        MetaValue::List(items) if items.is_empty() => {
            let _ = writeln!(out, "{pad}{key}: []");
        }
        MetaValue::List(items) if renders_inline(items) => {
            let rendered: Vec<&str> = items.iter().filter_map(MetaValue::as_str).collect();
            let _ = writeln!(out, "{pad}{key}: [{}]", rendered.join(", "));
        }
        MetaValue::List(items) => {
            let _ = writeln!(out, "{pad}{key}:");
            write_list_items(out, items, indent + 2);
        }
        MetaValue::Object(child) if child.is_empty() => {
            let _ = writeln!(out, "{pad}{key}: {{}}");
        }
        MetaValue::Object(child) => {
            let _ = writeln!(out, "{pad}{key}:");
            write_object(out, child, indent + 2);
        }
    }
}

fn write_list_items(out: &mut String, items: &[MetaValue], indent: usize) {
    let pad = " ".repeat(indent);
    for item in items {
        match item {
            MetaValue::Scalar(s) => {
                let _ = writeln!(out, "{pad}- {}", render_scalar(s));
            }
            MetaValue::Object(obj) if !obj.is_empty() => {
                // First key shares the dash line; the rest align under it.
                let mut rendered = String::new();
                write_object(&mut rendered, obj, indent + 2);
                let first_line_trimmed = rendered.trim_start();
                let _ = write!(out, "{pad}- {first_line_trimmed}");
            }
            MetaValue::Object(_) => {
                let _ = writeln!(out, "{pad}- {{}}");
            }
            MetaValue::List(nested) => {
                // Nested lists are flattened into scalars; the grammar has no syntax for
                // them.
                for inner in nested {
                    if let Some(s) = inner.as_str() {
                        let _ = writeln!(out, "{pad}- {}", render_scalar(s));
                    }
                }
            }
        }
    }
}

/// Object items of a list at `dotted`, e.g. `must_haves.artifacts`. Scalar items are
/// returned as objects with a single `value` key so callers can still report them.
pub fn object_items(meta: &Metadata, dotted: &str) -> Vec<Metadata> {
    let Some(list) = meta.get_path(dotted).and_then(MetaValue::as_list) else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|item| match item {
            MetaValue::Object(obj) => Some(obj.clone()),
            MetaValue::Scalar(s) if !s.trim().is_empty() => {
                let mut obj = Metadata::default();
                obj.set("value", MetaValue::Scalar(s.clone()));
                Some(obj)
            }
            _ => None,
        })
        .collect()
}
