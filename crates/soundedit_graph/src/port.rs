// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for node inputs/outputs.

use crate::error::{Error, Result};
use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    /// Input port
    Input,
    /// Output port
    Output,
}

impl PortDirection {
    /// Lowercase label used in messages
    pub fn label(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// Data type that can flow through ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Scalar
    #[serde(rename = "float")]
    Float,
    /// 3-component vector
    #[serde(rename = "vec3")]
    Vec3,
    /// Eight 3-component vectors
    #[serde(rename = "vec3x8")]
    Vec3x8,
    /// Speaker mix
    #[serde(rename = "speakers")]
    Speakers,
}

impl ValueType {
    /// Every value type, in tag order
    pub const ALL: [ValueType; 4] = [Self::Float, Self::Vec3, Self::Vec3x8, Self::Speakers];

    /// Manifest tag for this type
    pub fn tag(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Vec3 => "vec3",
            Self::Vec3x8 => "vec3x8",
            Self::Speakers => "speakers",
        }
    }

    /// Get the color for this port type (for UI)
    pub fn color(self) -> [u8; 3] {
        match self {
            Self::Vec3 => [0, 255, 0],
            Self::Float => [255, 255, 0],
            Self::Speakers => [255, 0, 0],
            Self::Vec3x8 => [255, 0, 255],
        }
    }

    /// Check that `value` is a well-formed literal of this type.
    ///
    /// Vectors accept whitespace and/or comma separators with optional brackets.
    /// Speaker literals are free-form.
    pub fn validate_literal(self, key: &str, value: &str) -> Result<()> {
        let expected_components = match self {
            Self::Float => 1,
            Self::Vec3 => 3,
            Self::Vec3x8 => 24,
            Self::Speakers => return Ok(()),
        };

        let components = literal_components(value);
        let valid = components.len() == expected_components
            && components.iter().all(|c| c.parse::<f64>().is_ok());
        if valid {
            Ok(())
        } else {
            Err(Error::InvalidLiteral {
                key: key.to_string(),
                value: value.to_string(),
                expected: self.tag().to_string(),
            })
        }
    }
}

fn literal_components(value: &str) -> Vec<&str> {
    let trimmed = value.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);
    inner
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .collect()
}

impl FromStr for ValueType {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.tag() == tag)
            .ok_or_else(|| Error::UnknownValueType(tag.to_string()))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A port on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// Port name, unique per direction on a node
    pub name: String,
    /// Port direction
    pub direction: PortDirection,
    /// Data type
    pub value_type: ValueType,
    /// Default value (for inputs)
    pub default_value: Option<String>,
}

impl Port {
    /// Create a new input port
    pub fn input(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Input,
            value_type,
            default_value: None,
        }
    }

    /// Create a new output port
    pub fn output(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Output,
            value_type,
            default_value: None,
        }
    }

    /// Set the default value
    pub fn with_default(mut self, value: Option<String>) -> Self {
        self.default_value = value;
        self
    }

    /// Display color for this port
    pub fn color(&self) -> [u8; 3] {
        self.value_type.color()
    }
}

/// Address of a port within a graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    /// Owning node
    pub node: NodeId,
    /// Port name
    pub port: String,
}

impl PortRef {
    /// Create a port reference
    pub fn new(node: NodeId, port: impl Into<String>) -> Self {
        Self {
            node,
            port: port.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_tags() {
        for value_type in ValueType::ALL {
            assert_eq!(value_type.tag().parse::<ValueType>().unwrap(), value_type);
        }
        assert_eq!(
            "bogus".parse::<ValueType>(),
            Err(Error::UnknownValueType("bogus".to_string()))
        );
    }

    #[test]
    fn test_literal_validation() {
        assert!(ValueType::Float.validate_literal("gain", "0.5").is_ok());
        assert!(ValueType::Float.validate_literal("gain", " -3 ").is_ok());
        assert!(ValueType::Float.validate_literal("gain", "loud").is_err());
        assert!(ValueType::Vec3.validate_literal("pos", "1 2 3").is_ok());
        assert!(ValueType::Vec3.validate_literal("pos", "[1, 2, 3]").is_ok());
        assert!(ValueType::Vec3.validate_literal("pos", "1 2").is_err());
        assert!(ValueType::Vec3x8.validate_literal("v", &"0 ".repeat(24)).is_ok());
        assert!(ValueType::Speakers.validate_literal("mix", "anything").is_ok());
    }
}
