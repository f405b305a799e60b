// SPDX-License-Identifier: MIT OR Apache-2.0
//! Key-value kinds and string conversion.
//!
//! Key-values are stored in the exact string form they were written in, so a
//! loaded stack writes back unchanged. Typed accessors parse on demand.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind tag of a key-value parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyValueKind {
    /// Free text
    String,
    /// `true`/`false`/`1`/`0`
    Bool,
    /// Boolean that is implied true by presence
    #[serde(alias = "implcit_bool")]
    ImplicitBool,
    /// One of a fixed set of choices
    Enum,
    /// Integer
    Int,
    /// Floating point
    Float,
}

impl KeyValueKind {
    /// Manifest tag for this kind
    pub fn tag(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::ImplicitBool => "implicit_bool",
            Self::Enum => "enum",
            Self::Int => "int",
            Self::Float => "float",
        }
    }

    /// Check `value` against this kind
    pub fn check(self, key: &str, value: &str, choices: &[String]) -> Result<()> {
        let invalid = || Error::InvalidLiteral {
            key: key.to_string(),
            value: value.to_string(),
            expected: self.tag().to_string(),
        };

        match self {
            Self::String => Ok(()),
            Self::Bool | Self::ImplicitBool => parse_bool(value).map(|_| ()).ok_or_else(invalid),
            Self::Int => value.trim().parse::<i64>().map(|_| ()).map_err(|_| invalid()),
            Self::Float => value.trim().parse::<f64>().map(|_| ()).map_err(|_| invalid()),
            Self::Enum => {
                if choices.iter().any(|c| c == value) {
                    Ok(())
                } else {
                    Err(Error::InvalidEnumChoice {
                        key: key.to_string(),
                        value: value.to_string(),
                        choices: choices.to_vec(),
                    })
                }
            }
        }
    }

    /// Value a freshly created key-value takes when the manifest gives no default
    pub fn fallback_default(self, choices: &[String]) -> String {
        match self {
            Self::String => String::new(),
            Self::Bool | Self::ImplicitBool => "false".to_string(),
            Self::Int | Self::Float => "0".to_string(),
            Self::Enum => choices.first().cloned().unwrap_or_default(),
        }
    }
}

impl fmt::Display for KeyValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Case-insensitive boolean parse accepting `true`/`false`/`1`/`0`
pub fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") || value == "1" {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") || value == "0" {
        Some(false)
    } else {
        None
    }
}

/// Current value of a node key-value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Kind tag copied from the manifest
    pub kind: KeyValueKind,
    /// Allowed values for enums
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    value: String,
    explicit: bool,
}

impl KeyValue {
    /// A key-value holding its default
    pub fn with_default(kind: KeyValueKind, choices: Vec<String>, default: Option<&str>) -> Self {
        let value = default
            .map(str::to_string)
            .unwrap_or_else(|| kind.fallback_default(&choices));
        Self {
            kind,
            choices,
            value,
            explicit: false,
        }
    }

    /// Assign a new value after validating it
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.kind.check(key, value, &self.choices)?;
        self.value = value.to_string();
        self.explicit = true;
        Ok(())
    }

    /// Current value in string form
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Whether the value was set explicitly rather than defaulted
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Boolean view for `bool`/`implicit_bool` key-values
    pub fn as_bool(&self) -> Option<bool> {
        match self.kind {
            KeyValueKind::Bool | KeyValueKind::ImplicitBool => parse_bool(&self.value),
            _ => None,
        }
    }

    /// Integer view for `int` key-values
    pub fn as_int(&self) -> Option<i64> {
        match self.kind {
            KeyValueKind::Int => self.value.trim().parse().ok(),
            _ => None,
        }
    }

    /// Float view for `float` and `int` key-values
    pub fn as_float(&self) -> Option<f64> {
        match self.kind {
            KeyValueKind::Float | KeyValueKind::Int => self.value.trim().parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("False"), Some(false));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("yes"), None);
    }

    #[test]
    fn test_kind_checks() {
        let choices = vec!["add".to_string(), "mul".to_string()];
        assert!(KeyValueKind::Enum.check("mode", "mul", &choices).is_ok());
        assert!(matches!(
            KeyValueKind::Enum.check("mode", "div", &choices),
            Err(Error::InvalidEnumChoice { .. })
        ));
        assert!(matches!(
            KeyValueKind::Int.check("count", "1.5", &[]),
            Err(Error::InvalidLiteral { .. })
        ));
        assert!(KeyValueKind::Float.check("gain", "1.5", &[]).is_ok());
        assert!(KeyValueKind::String.check("name", "", &[]).is_ok());
        assert!(KeyValueKind::ImplicitBool.check("flag", "true", &[]).is_ok());
    }

    #[test]
    fn test_key_value_keeps_text() {
        let mut kv = KeyValue::with_default(KeyValueKind::Bool, Vec::new(), None);
        assert_eq!(kv.as_str(), "false");
        assert!(!kv.is_explicit());

        kv.set("flag", "TRUE").unwrap();
        assert_eq!(kv.as_str(), "TRUE");
        assert_eq!(kv.as_bool(), Some(true));
        assert!(kv.is_explicit());

        assert!(kv.set("flag", "maybe").is_err());
        assert_eq!(kv.as_str(), "TRUE");
    }
}
