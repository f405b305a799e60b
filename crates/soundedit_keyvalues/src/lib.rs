// SPDX-License-Identifier: MIT OR Apache-2.0
//! KeyValues (VDF) text format for `SoundEdit`.
//!
//! Sound operator stacks are stored as nested KeyValues text. Unlike a plain
//! map, a KeyValues section may repeat a key (`import_stack` is the common
//! case), so [`KeyValues`] keeps every entry in document order.
//!
//! ## Usage
//!
//! ```
//! use soundedit_keyvalues::{parse, KeyValues};
//!
//! let kv = parse(r#""start_stacks" { "my_stack" { } }"#).unwrap();
//! assert!(kv.get_section("start_stacks").is_some());
//! ```

pub mod parse;
pub mod write;

pub use parse::{parse, ParseError, ParseErrorKind};
pub use write::to_string_pretty;

use std::fmt;
use std::path::{Path, PathBuf};

/// A value stored under a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Leaf string value
    String(String),
    /// Nested section
    Section(KeyValues),
}

impl Value {
    /// Get the string contents, if this is a leaf
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Section(_) => None,
        }
    }

    /// Get the nested section, if this is one
    pub fn as_section(&self) -> Option<&KeyValues> {
        match self {
            Self::Section(kv) => Some(kv),
            Self::String(_) => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<KeyValues> for Value {
    fn from(value: KeyValues) -> Self {
        Self::Section(value)
    }
}

/// An ordered KeyValues section. Duplicate keys are kept as separate entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyValues {
    entries: Vec<(String, Value)>,
}

impl KeyValues {
    /// Create an empty section
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, keeping any existing entries with the same key
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Builder form of [`KeyValues::push`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, value);
        self
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Every value stored under `key`, in document order
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// First leaf string stored under `key`
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// First section stored under `key`
    pub fn get_section(&self, key: &str) -> Option<&KeyValues> {
        self.get(key).and_then(Value::as_section)
    }

    /// Iterate entries in document order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries, duplicates included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the section has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for KeyValues {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl IntoIterator for KeyValues {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl fmt::Display for KeyValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write::write_section(f, self, 0)
    }
}

/// Error reading a KeyValues file from disk
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The file contents are not valid KeyValues
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying parse error
        source: ParseError,
    },
}

/// Read and parse a KeyValues file
pub fn from_path(path: impl AsRef<Path>) -> Result<KeyValues, ReadError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let kv = parse(&text).map_err(|source| ReadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("Read {} top-level entries from {:?}", kv.len(), path);
    Ok(kv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_keys_are_kept() {
        let kv = KeyValues::new()
            .with("import_stack", "a")
            .with("import_stack", "b")
            .with("other", "c");

        assert_eq!(kv.len(), 3);
        assert_eq!(kv.get_str("import_stack"), Some("a"));
        let all: Vec<_> = kv.get_all("import_stack").filter_map(Value::as_str).collect();
        assert_eq!(all, vec!["a", "b"]);
    }

    #[test]
    fn test_section_access() {
        let kv = KeyValues::new().with("outer", KeyValues::new().with("inner", "1"));
        assert_eq!(kv.get_str("outer"), None);
        assert_eq!(
            kv.get_section("outer").and_then(|s| s.get_str("inner")),
            Some("1")
        );
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = from_path("/definitely/not/here.txt").unwrap_err();
        assert!(matches!(err, ReadError::Io { .. }));
    }
}
