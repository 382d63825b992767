//! The tiddler record and its structured (JSON) encoding.
//!
//! A tiddler is an open map of field names to values. Almost every value is a
//! string; `tags` may arrive as an array from TiddlyWeb clients, and the
//! `text` of a binary tiddler read from a `.meta` pair holds raw bytes.
//!
//! ```
//! use tiddly_storage::Tiddler;
//!
//! let tiddler = Tiddler::from_json(br#"{"title":"HelloThere","tags":["Intro","Getting Started"]}"#)?;
//! assert_eq!(tiddler.title(), Some("HelloThere"));
//! assert_eq!(tiddler.field("tags").as_deref(), Some("Intro [[Getting Started]]"));
//! # Ok::<(), tiddly_storage::StoreError>(())
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use regex::Regex;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::error::Result;

/// Content types whose body is stored as raw bytes beside a `.meta` file.
static BINARY_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(pdf|gif|jpeg|png|x-icon)$").expect("binary type pattern"));

pub const TITLE: &str = "title";
pub const TEXT: &str = "text";
pub const TYPE: &str = "type";
pub const TAGS: &str = "tags";
pub const REVISION: &str = "revision";
pub const CREATED: &str = "created";
pub const MODIFIED: &str = "modified";

/// Tag marking tiddlers whose text must stay in skinny listings.
pub const MACRO_TAG: &str = "$:/tags/Macro";

/// Whether a content type is one of the binary types kept as raw bytes.
pub fn is_binary_type(content_type: &str) -> bool {
    BINARY_TYPE.is_match(content_type)
}

/// Current UTC time in the 17-digit `YYYYMMDDhhmmssmmm` tiddler format.
pub fn timestamp_now() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S%3f").to_string()
}

/// Render a list the way TiddlyWiki writes `tags`: items containing spaces
/// are wrapped in `[[...]]`.
pub fn stringify_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| {
            let item = item.as_ref();
            if item.contains(char::is_whitespace) {
                format!("[[{}]]", item)
            } else {
                item.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a TiddlyWiki list string (`one [[two words]] three`).
pub fn parse_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut rest = value.trim_start();

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("[[") {
            match after.find("]]") {
                Some(end) => {
                    items.push(after[..end].to_string());
                    rest = &after[end + 2..];
                }
                None => {
                    items.push(after.to_string());
                    rest = "";
                }
            }
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            items.push(rest[..end].to_string());
            rest = &rest[end..];
        }
        rest = rest.trim_start();
    }

    items.retain(|item| !item.is_empty());
    items
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Plain string value
    Text(String),
    /// Raw body of a binary tiddler
    Bytes(Bytes),
    /// Ordered string list, e.g. `tags` sent as a JSON array
    List(Vec<String>),
}

impl FieldValue {
    /// Borrow the value if it is plain text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// String form used by the line encoding. Raw bytes have none.
    pub fn to_field_string(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::List(items) => Some(stringify_list(items)),
            FieldValue::Bytes(_) => None,
        }
    }

    fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(FieldValue::Text(s)),
            Value::Array(items) => Some(FieldValue::List(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Null => None,
                        Value::String(s) => Some(s),
                        other => Some(other.to_string()),
                    })
                    .collect(),
            )),
            other => Some(FieldValue::Text(other.to_string())),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::List(value)
    }
}

impl From<Bytes> for FieldValue {
    fn from(value: Bytes) -> Self {
        FieldValue::Bytes(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(Bytes::from(value))
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::List(items) => items.serialize(serializer),
            FieldValue::Bytes(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
        }
    }
}

/// A wiki record: an open map of field name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tiddler {
    fields: BTreeMap<String, FieldValue>,
}

impl Tiddler {
    /// Create an empty tiddler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tiddler with only a title.
    pub fn with_title(title: impl Into<String>) -> Self {
        let mut tiddler = Self::new();
        tiddler.set(TITLE, title.into());
        tiddler
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// String view of a field. Lists are rendered with the tag convention,
    /// raw bytes have no string view.
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields.get(name).and_then(FieldValue::to_field_string)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// The title, if present as plain text.
    pub fn title(&self) -> Option<&str> {
        self.fields.get(TITLE).and_then(FieldValue::as_text)
    }

    /// Numeric revision; absent or unparseable counts as 0.
    pub fn revision(&self) -> u64 {
        self.field(REVISION)
            .and_then(|r| r.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn set_revision(&mut self, revision: u64) {
        self.set(REVISION, revision.to_string());
    }

    /// Parsed tags, whether stored as a list or as a bracketed string.
    pub fn tags(&self) -> Vec<String> {
        match self.fields.get(TAGS) {
            Some(FieldValue::List(items)) => items.clone(),
            Some(FieldValue::Text(s)) => parse_list(s),
            _ => Vec::new(),
        }
    }

    /// Whether the `type` field names a binary content type.
    pub fn is_binary(&self) -> bool {
        self.fields
            .get(TYPE)
            .and_then(FieldValue::as_text)
            .is_some_and(is_binary_type)
    }

    /// System tiddlers have titles starting with `$:/`.
    pub fn is_system(&self) -> bool {
        self.title().is_some_and(|t| t.starts_with("$:/"))
    }

    /// Copy for listings: the body is dropped unless the tiddler is a macro.
    pub fn skinny(&self) -> Tiddler {
        let mut copy = self.clone();
        if !self.tags().iter().any(|t| t == MACRO_TAG) {
            copy.remove(TEXT);
        }
        copy
    }

    /// Stamp `modified` with the current time, and `created` if missing.
    pub fn touch(&mut self) {
        let now = timestamp_now();
        if !self.contains(CREATED) {
            self.set(CREATED, now.clone());
        }
        self.set(MODIFIED, now);
    }

    /// Parse the structured (JSON) encoding.
    ///
    /// A nested `fields` object is flattened into the top level.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Produce the structured (JSON) encoding.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_json_map(map: Map<String, Value>) -> Self {
        let mut tiddler = Tiddler::new();
        for (name, value) in map {
            match (name.as_str(), value) {
                ("fields", Value::Object(nested)) => {
                    for (nested_name, nested_value) in nested {
                        if let Some(v) = FieldValue::from_json(nested_value) {
                            tiddler.fields.insert(nested_name, v);
                        }
                    }
                }
                (_, value) => {
                    if let Some(v) = FieldValue::from_json(value) {
                        tiddler.fields.insert(name, v);
                    }
                }
            }
        }
        tiddler
    }
}

impl Serialize for Tiddler {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Tiddler {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Object(map) => Ok(Tiddler::from_json_map(map)),
            other => Err(D::Error::custom(format!(
                "expected a JSON object for a tiddler, found {}",
                other
            ))),
        }
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Tiddler {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Tiddler {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
