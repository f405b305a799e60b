// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the graph framework.

use crate::manifest::NodeTypeSpec;
use crate::port::{Port, ValueType};
use crate::value::KeyValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the single output on a constant node
pub const CONSTANT_OUTPUT: &str = "value";

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// What a node represents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// A sound operator of a manifest type
    Operator {
        /// Operator type name
        operator: String,
    },
    /// A literal feeding one input
    Constant {
        /// Type of the literal
        value_type: ValueType,
        /// Literal text
        value: String,
    },
}

/// A node instance in the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    name: String,
    kind: NodeKind,
    /// Position in the graph UI
    pub position: [f32; 2],
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    key_values: IndexMap<String, KeyValue>,
    /// Record fields that are neither inputs nor key-values, written back verbatim
    extra_fields: Vec<(String, String)>,
}

impl Node {
    /// Create an operator node with ports and key-value defaults from its type
    pub(crate) fn operator(name: impl Into<String>, operator: &str, spec: &NodeTypeSpec) -> Self {
        let mut node = Self {
            id: NodeId::new(),
            name: name.into(),
            kind: NodeKind::Operator {
                operator: operator.to_string(),
            },
            position: [0.0, 0.0],
            inputs: Vec::new(),
            outputs: Vec::new(),
            key_values: IndexMap::new(),
            extra_fields: Vec::new(),
        };
        node.apply_type(operator, spec);
        node
    }

    /// Create a constant-source node
    pub(crate) fn constant(name: impl Into<String>, value_type: ValueType, value: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            kind: NodeKind::Constant {
                value_type,
                value: value.into(),
            },
            position: [0.0, 0.0],
            inputs: Vec::new(),
            outputs: vec![Port::output(CONSTANT_OUTPUT, value_type)],
            key_values: IndexMap::new(),
            extra_fields: Vec::new(),
        }
    }

    /// Rebuild ports and key-values for an operator type.
    ///
    /// Explicitly set key-values that keep their name keep their value when it
    /// is still valid; everything else takes the new type's default.
    pub(crate) fn apply_type(&mut self, operator: &str, spec: &NodeTypeSpec) {
        self.kind = NodeKind::Operator {
            operator: operator.to_string(),
        };

        self.inputs.clear();
        for input in &spec.inputs {
            if self.input(&input.name).is_none() {
                self.inputs
                    .push(Port::input(&input.name, input.value_type).with_default(input.default.clone()));
            }
        }

        self.outputs.clear();
        for output in &spec.outputs {
            if self.output(&output.name).is_none() {
                self.outputs
                    .push(Port::output(&output.name, output.value_type).with_default(output.default.clone()));
            }
        }

        let mut previous = std::mem::take(&mut self.key_values);
        for kv_spec in &spec.keyvalues {
            if self.key_values.contains_key(&kv_spec.name) {
                continue;
            }
            let mut kv = KeyValue::with_default(
                kv_spec.kind,
                kv_spec.choices.clone(),
                kv_spec.default.as_deref(),
            );
            let explicit = previous.shift_remove(&kv_spec.name).filter(KeyValue::is_explicit);
            if let Some(old) = explicit {
                if let Err(e) = kv.set(&kv_spec.name, old.as_str()) {
                    tracing::debug!("Node '{}' drops '{}' on retype: {}", self.name, kv_spec.name, e);
                }
            }
            self.key_values.insert(kv_spec.name.clone(), kv);
        }
    }

    /// Display name, unique within the graph
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// What this node represents
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Operator type name, for operator nodes
    pub fn operator_type(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Operator { operator } => Some(operator),
            NodeKind::Constant { .. } => None,
        }
    }

    /// Literal text, for constant nodes
    pub fn constant_value(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Constant { value, .. } => Some(value),
            NodeKind::Operator { .. } => None,
        }
    }

    pub(crate) fn constant_value_mut(&mut self) -> Option<(ValueType, &mut String)> {
        match &mut self.kind {
            NodeKind::Constant { value_type, value } => Some((*value_type, value)),
            NodeKind::Operator { .. } => None,
        }
    }

    /// Whether this is a constant-source node
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, NodeKind::Constant { .. })
    }

    /// Input ports
    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    /// Output ports
    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    /// Get an input port by name
    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name == name)
    }

    /// Get an output port by name
    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// Key-values in manifest order
    pub fn key_values(&self) -> impl Iterator<Item = (&str, &KeyValue)> {
        self.key_values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// A key-value by name
    pub fn key_value(&self, name: &str) -> Option<&KeyValue> {
        self.key_values.get(name)
    }

    pub(crate) fn key_value_mut(&mut self, name: &str) -> Option<&mut KeyValue> {
        self.key_values.get_mut(name)
    }

    /// Unrecognized record fields kept for write-back, in document order
    pub fn extra_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.extra_fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn push_extra_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extra_fields.push((key.into(), value.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;

    fn manifest() -> Manifest {
        Manifest::from_json_str(
            r#"{
                "__base": { "inputs": [{ "name": "gain", "type": "vec3" }] },
                "mixer": {
                    "inputs": [{ "name": "gain", "type": "float" }, { "name": "in", "type": "speakers" }],
                    "outputs": [{ "name": "out", "type": "speakers" }],
                    "keyvalues": [{ "name": "mode", "type": "enum", "choices": ["a", "b"] }]
                },
                "other": {
                    "keyvalues": [{ "name": "mode", "type": "enum", "choices": ["b", "c"], "default": "c" }]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_ports_dedupe_by_name() {
        let manifest = manifest();
        let node = Node::operator("m", "mixer", manifest.type_spec("mixer").unwrap());
        assert_eq!(node.inputs().len(), 2);
        assert_eq!(node.input("gain").unwrap().value_type, ValueType::Float);
        assert_eq!(node.key_value("mode").unwrap().as_str(), "a");
    }

    #[test]
    fn test_apply_type_keeps_valid_key_values() {
        let manifest = manifest();
        let mut node = Node::operator("m", "mixer", manifest.type_spec("mixer").unwrap());
        node.key_value_mut("mode").unwrap().set("mode", "b").unwrap();

        node.apply_type("other", manifest.type_spec("other").unwrap());
        let mode = node.key_value("mode").unwrap();
        assert_eq!(mode.as_str(), "b");
        assert!(mode.is_explicit());
        assert_eq!(node.operator_type(), Some("other"));
        assert!(node.output("out").is_none());
    }

    #[test]
    fn test_apply_type_resets_invalid_key_values() {
        let manifest = manifest();
        let mut node = Node::operator("m", "mixer", manifest.type_spec("mixer").unwrap());
        node.apply_type("other", manifest.type_spec("other").unwrap());
        // "a" is not a choice of "other", so the new default applies
        assert_eq!(node.key_value("mode").unwrap().as_str(), "c");
    }

    #[test]
    fn test_apply_type_drops_explicit_value_the_new_type_rejects() {
        let manifest = manifest();
        let mut node = Node::operator("m", "mixer", manifest.type_spec("mixer").unwrap());
        node.key_value_mut("mode").unwrap().set("mode", "a").unwrap();

        node.apply_type("other", manifest.type_spec("other").unwrap());
        let mode = node.key_value("mode").unwrap();
        assert_eq!(mode.as_str(), "c");
        assert!(!mode.is_explicit());
    }

    #[test]
    fn test_extra_fields_keep_repeats() {
        let mut node = Node::constant("c", ValueType::Float, "0");
        node.push_extra_field("comment", "one");
        node.push_extra_field("comment", "two");
        assert_eq!(
            node.extra_fields().collect::<Vec<_>>(),
            vec![("comment", "one"), ("comment", "two")]
        );
    }

    #[test]
    fn test_constant_node() {
        let node = Node::constant("c", ValueType::Float, "0.5");
        assert!(node.is_constant());
        assert_eq!(node.constant_value(), Some("0.5"));
        assert_eq!(node.output(CONSTANT_OUTPUT).unwrap().value_type, ValueType::Float);
        assert!(node.inputs().is_empty());
    }
}
