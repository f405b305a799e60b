// SPDX-License-Identifier: MIT OR Apache-2.0
//! Operator manifests: the schema of every node type a target game supports.
//!
//! A manifest is a JSON document mapping operator type names to their inputs,
//! outputs and key-values. The reserved `__base` entry is appended to every
//! other type at load time and is not itself a usable type.
//!
//! One manifest per target game is kept in a [`ManifestRegistry`], which always
//! has exactly one active manifest. Translator calls read the active manifest
//! at call time, so swapping it affects every subsequent build.

use crate::error::{Error, Result};
use crate::port::ValueType;
use crate::value::KeyValueKind;
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// Type name whose fields are merged into every other type
pub const BASE_TYPE: &str = "__base";

/// An input or output declared by an operator type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoSpec {
    /// Port name
    pub name: String,
    /// Value type tag
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Default literal
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// An input declared by an operator type
pub type InputSpec = IoSpec;

/// An output declared by an operator type
pub type OutputSpec = IoSpec;

/// A key-value parameter declared by an operator type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueSpec {
    /// Key-value name
    pub name: String,
    /// Kind tag
    #[serde(rename = "type")]
    pub kind: KeyValueKind,
    /// Default value, in string form
    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Allowed values for `enum` key-values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl KeyValueSpec {
    /// Validate a string value against this key-value's kind
    pub fn check(&self, value: &str) -> Result<()> {
        self.kind.check(&self.name, value, &self.choices)
    }
}

/// Describes a single operator type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTypeSpec {
    /// Display label
    #[serde(default)]
    pub label: String,
    /// Description
    #[serde(default, rename = "desc", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Inputs, in declaration order
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    /// Outputs, in declaration order
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
    /// Key-values, in declaration order
    #[serde(default)]
    pub keyvalues: Vec<KeyValueSpec>,
    /// Category used to group types in pickers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl NodeTypeSpec {
    /// First input with this name
    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// First output with this name
    pub fn output(&self, name: &str) -> Option<&OutputSpec> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// First key-value with this name
    pub fn key_value(&self, name: &str) -> Option<&KeyValueSpec> {
        self.keyvalues.iter().find(|k| k.name == name)
    }

    fn unify(&mut self, base: &NodeTypeSpec) {
        self.inputs.extend(base.inputs.iter().cloned());
        self.outputs.extend(base.outputs.iter().cloned());
        self.keyvalues.extend(base.keyvalues.iter().cloned());
    }
}

/// Accept strings, numbers and booleans as defaults; store them as strings
fn scalar_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    use serde_json::Value;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "default must be a string, number or boolean, got {other}"
        ))),
    }
}

/// Node schema for one target game
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    game: Option<String>,
    types: IndexMap<String, NodeTypeSpec>,
    categories: BTreeSet<String>,
}

impl Manifest {
    /// Load a manifest from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Load {
            origin: origin.clone(),
            reason: e.to_string(),
        })?;
        let manifest = Self::parse(&text, &origin)?;
        tracing::info!(
            "Loaded manifest {} ({} operator types, {} categories)",
            origin,
            manifest.types.len(),
            manifest.categories.len()
        );
        Ok(manifest)
    }

    /// Parse a manifest from JSON text.
    ///
    /// Accepts either a flat `{ type: spec }` object or `{ "game": ..., "nodes": { type: spec } }`.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::parse(text, "<memory>")
    }

    fn parse(text: &str, origin: &str) -> Result<Self> {
        use serde_json::Value;

        let load_error = |reason: String| Error::Load {
            origin: origin.to_string(),
            reason,
        };

        let doc: Value = serde_json::from_str(text).map_err(|e| load_error(e.to_string()))?;
        let wrapped = doc.get("game").is_some_and(Value::is_string)
            && doc.get("nodes").is_some_and(Value::is_object);
        let (game, nodes) = if wrapped {
            (
                doc.get("game").and_then(Value::as_str).map(str::to_string),
                doc["nodes"].clone(),
            )
        } else {
            (None, doc)
        };

        let types: IndexMap<String, NodeTypeSpec> =
            serde_json::from_value(nodes).map_err(|e| load_error(e.to_string()))?;
        let mut manifest = Self::from_types(types).map_err(|e| match e {
            Error::Load { reason, .. } => load_error(reason),
            other => other,
        })?;
        manifest.game = game;
        Ok(manifest)
    }

    /// Build a manifest from already-parsed type specs.
    ///
    /// Appends `__base` fields to every other type, drops `__base` from the
    /// type set, fills empty labels with the type name and validates defaults.
    pub fn from_types(mut types: IndexMap<String, NodeTypeSpec>) -> Result<Self> {
        let base = types.shift_remove(BASE_TYPE);

        for (name, spec) in types.iter_mut() {
            if let Some(base) = &base {
                spec.unify(base);
            }
            if spec.label.is_empty() {
                spec.label = name.clone();
            }
            validate_type(name, spec)?;
        }

        let categories = types
            .values()
            .filter_map(|t| t.category.clone())
            .collect();

        Ok(Self {
            game: None,
            types,
            categories,
        })
    }

    /// Game name, when the manifest declares one
    pub fn game(&self) -> Option<&str> {
        self.game.as_deref()
    }

    /// Look up an operator type
    pub fn type_spec(&self, name: &str) -> Result<&NodeTypeSpec> {
        self.types
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("operator type '{name}'")))
    }

    /// Inputs of an operator type
    pub fn input_specs(&self, name: &str) -> Result<&[InputSpec]> {
        self.type_spec(name).map(|t| t.inputs.as_slice())
    }

    /// Outputs of an operator type
    pub fn output_specs(&self, name: &str) -> Result<&[OutputSpec]> {
        self.type_spec(name).map(|t| t.outputs.as_slice())
    }

    /// Key-values of an operator type
    pub fn key_value_specs(&self, name: &str) -> Result<&[KeyValueSpec]> {
        self.type_spec(name).map(|t| t.keyvalues.as_slice())
    }

    /// Whether `name` is a usable operator type
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// All type specs in declaration order
    pub fn type_specs(&self) -> impl Iterator<Item = (&str, &NodeTypeSpec)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// All type names in declaration order
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Types belonging to one category
    pub fn types_in_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a NodeTypeSpec)> + 'a {
        self.type_specs()
            .filter(move |(_, t)| t.category.as_deref() == Some(category))
    }

    /// Distinct categories across all types
    pub fn categories(&self) -> &BTreeSet<String> {
        &self.categories
    }

    /// Number of usable types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the manifest has no usable types
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

fn validate_type(name: &str, spec: &NodeTypeSpec) -> Result<()> {
    for kv in &spec.keyvalues {
        if kv.kind == KeyValueKind::Enum && kv.choices.is_empty() {
            return Err(Error::Load {
                origin: name.to_string(),
                reason: format!("enum key-value '{}' of '{}' has no choices", kv.name, name),
            });
        }
        if let Some(default) = &kv.default {
            kv.check(default).map_err(|e| Error::Load {
                origin: name.to_string(),
                reason: format!("bad default for '{}' of '{}': {}", kv.name, name, e),
            })?;
        }
    }
    Ok(())
}

/// Display color for a value-type tag
pub fn color_for_value_type(tag: &str) -> Result<[u8; 3]> {
    tag.parse::<ValueType>().map(ValueType::color)
}

struct RegistryState {
    manifests: IndexMap<String, Arc<Manifest>>,
    active: String,
}

impl RegistryState {
    fn insert(&mut self, name: String, manifest: Manifest) {
        if self.manifests.contains_key(&name) {
            tracing::info!("Replacing registered manifest: {}", name);
        }
        self.manifests.insert(name, Arc::new(manifest));
    }

    fn activate(&mut self, name: &str) {
        if self.active != name {
            tracing::info!("Active manifest: {} -> {}", self.active, name);
            self.active = name.to_string();
        }
    }
}

/// Named manifests with exactly one active selection
pub struct ManifestRegistry {
    state: RwLock<RegistryState>,
}

impl ManifestRegistry {
    /// Create a registry whose first manifest is active
    pub fn new(name: impl Into<String>, manifest: Manifest) -> Self {
        let name = name.into();
        let mut manifests = IndexMap::new();
        manifests.insert(name.clone(), Arc::new(manifest));
        Self {
            state: RwLock::new(RegistryState {
                manifests,
                active: name,
            }),
        }
    }

    /// Register a manifest, replacing any existing one with the same name
    pub fn register(&self, name: impl Into<String>, manifest: Manifest) {
        self.state.write().insert(name.into(), manifest);
    }

    /// Register a manifest and make it the active one in a single step
    pub fn register_active(&self, name: impl Into<String>, manifest: Manifest) {
        let name = name.into();
        let mut state = self.state.write();
        state.activate(&name);
        state.insert(name, manifest);
    }

    /// Make a registered manifest the active one
    pub fn set_active(&self, name: &str) -> Result<()> {
        let mut state = self.state.write();
        if !state.manifests.contains_key(name) {
            return Err(Error::NotFound(format!("manifest '{name}'")));
        }
        state.activate(name);
        Ok(())
    }

    /// The active manifest
    pub fn active(&self) -> Arc<Manifest> {
        let state = self.state.read();
        state
            .manifests
            .get(&state.active)
            .cloned()
            .unwrap_or_default()
    }

    /// Name of the active manifest
    pub fn active_name(&self) -> String {
        self.state.read().active.clone()
    }

    /// A registered manifest by name
    pub fn get(&self, name: &str) -> Option<Arc<Manifest>> {
        self.state.read().manifests.get(name).cloned()
    }

    /// Registered manifest names, in registration order
    pub fn names(&self) -> Vec<String> {
        self.state.read().manifests.keys().cloned().collect()
    }
}

impl std::fmt::Debug for ManifestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ManifestRegistry")
            .field("manifests", &state.manifests.keys().collect::<Vec<_>>())
            .field("active", &state.active)
            .finish()
    }
}

static GLOBAL: OnceCell<ManifestRegistry> = OnceCell::new();

/// Install the process-wide registry, or register into it if already installed.
///
/// The manifest becomes active either way.
pub fn install_global(name: &str, manifest: Manifest) -> &'static ManifestRegistry {
    let mut fresh = Some(manifest);
    let registry = GLOBAL.get_or_init(|| {
        ManifestRegistry::new(name, fresh.take().unwrap_or_default())
    });
    if let Some(manifest) = fresh {
        registry.register_active(name, manifest);
    }
    registry
}

/// The process-wide registry, once installed
pub fn global() -> Option<&'static ManifestRegistry> {
    GLOBAL.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "__base": {
            "inputs": [{ "name": "X", "type": "float" }],
            "outputs": [],
            "keyvalues": [{ "name": "execute_once", "type": "bool", "default": false }]
        },
        "foo": {
            "label": "Foo",
            "inputs": [{ "name": "Y", "type": "vec3" }],
            "outputs": [{ "name": "out", "type": "float" }],
            "keyvalues": [],
            "category": "math"
        },
        "bar": {
            "inputs": [],
            "outputs": [],
            "keyvalues": [
                { "name": "mode", "type": "enum", "choices": ["add", "mul"], "default": "add" },
                { "name": "legacy", "type": "implcit_bool" }
            ],
            "category": "util"
        }
    }"#;

    #[test]
    fn test_base_unification() {
        let manifest = Manifest::from_json_str(MANIFEST).unwrap();
        let inputs: Vec<_> = manifest
            .input_specs("foo")
            .unwrap()
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(inputs, vec!["Y", "X"]);
        assert!(manifest.type_spec(BASE_TYPE).is_err());
        assert!(!manifest.type_names().any(|n| n == BASE_TYPE));
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn test_duplicate_base_fields_are_kept() {
        let manifest = Manifest::from_json_str(
            r#"{
                "__base": { "inputs": [{ "name": "X", "type": "float" }] },
                "dup": { "inputs": [{ "name": "X", "type": "vec3" }] }
            }"#,
        )
        .unwrap();
        let inputs = manifest.input_specs("dup").unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].value_type, ValueType::Vec3);
        assert_eq!(inputs[1].value_type, ValueType::Float);
    }

    #[test]
    fn test_defaults_and_labels() {
        let manifest = Manifest::from_json_str(MANIFEST).unwrap();
        let foo = manifest.type_spec("foo").unwrap();
        assert_eq!(foo.label, "Foo");
        assert_eq!(manifest.type_spec("bar").unwrap().label, "bar");
        let kv = foo.key_value("execute_once").unwrap();
        assert_eq!(kv.default.as_deref(), Some("false"));
        assert_eq!(
            manifest.type_spec("bar").unwrap().key_value("legacy").unwrap().kind,
            KeyValueKind::ImplicitBool
        );
    }

    #[test]
    fn test_categories() {
        let manifest = Manifest::from_json_str(MANIFEST).unwrap();
        let categories: Vec<_> = manifest.categories().iter().map(String::as_str).collect();
        assert_eq!(categories, vec!["math", "util"]);
        let math: Vec<_> = manifest.types_in_category("math").map(|(n, _)| n).collect();
        assert_eq!(math, vec!["foo"]);
    }

    #[test]
    fn test_wrapped_manifest() {
        let manifest = Manifest::from_json_str(
            r#"{ "game": "chaos", "nodes": { "foo": { "inputs": [] } } }"#,
        )
        .unwrap();
        assert_eq!(manifest.game(), Some("chaos"));
        assert!(manifest.contains("foo"));
    }

    #[test]
    fn test_unknown_type_lookup() {
        let manifest = Manifest::from_json_str(MANIFEST).unwrap();
        assert!(matches!(manifest.type_spec("nope"), Err(Error::NotFound(_))));
        assert!(matches!(manifest.input_specs("nope"), Err(Error::NotFound(_))));
        assert!(matches!(manifest.output_specs("nope"), Err(Error::NotFound(_))));
        assert!(matches!(manifest.key_value_specs("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            Manifest::from_json_str("{ not json"),
            Err(Error::Load { .. })
        ));
        assert!(matches!(
            Manifest::from_json_str(r#"{ "a": { "inputs": [{ "name": "x", "type": "quat" }] } }"#),
            Err(Error::Load { .. })
        ));
        assert!(matches!(
            Manifest::from_json_str(r#"{ "a": { "keyvalues": [{ "name": "m", "type": "enum" }] } }"#),
            Err(Error::Load { .. })
        ));
        assert!(matches!(
            Manifest::from_json_str(
                r#"{ "a": { "keyvalues": [{ "name": "m", "type": "enum", "choices": ["x"], "default": "y" }] } }"#
            ),
            Err(Error::Load { .. })
        ));
        assert!(matches!(
            Manifest::load("/no/such/manifest.json"),
            Err(Error::Load { .. })
        ));
    }

    #[test]
    fn test_colors() {
        assert_eq!(color_for_value_type("vec3"), Ok([0, 255, 0]));
        assert_eq!(color_for_value_type("float"), Ok([255, 255, 0]));
        assert_eq!(color_for_value_type("speakers"), Ok([255, 0, 0]));
        assert_eq!(color_for_value_type("vec3x8"), Ok([255, 0, 255]));
        assert_eq!(
            color_for_value_type("bogus"),
            Err(Error::UnknownValueType("bogus".to_string()))
        );
    }

    #[test]
    fn test_registry_active_selection() {
        let first = Manifest::from_json_str(MANIFEST).unwrap();
        let second = Manifest::from_json_str(r#"{ "only": {} }"#).unwrap();
        let registry = ManifestRegistry::new("chaos", first);
        registry.register("other", second);

        assert_eq!(registry.active_name(), "chaos");
        assert!(registry.active().contains("foo"));

        registry.set_active("other").unwrap();
        assert!(registry.active().contains("only"));
        assert!(!registry.active().contains("foo"));

        assert!(matches!(registry.set_active("missing"), Err(Error::NotFound(_))));
        assert_eq!(registry.active_name(), "other");
        assert_eq!(registry.names(), vec!["chaos", "other"]);
    }

    #[test]
    fn test_register_active_replaces_and_selects() {
        let registry = ManifestRegistry::new("chaos", Manifest::from_json_str(MANIFEST).unwrap());
        registry.register_active("other", Manifest::from_json_str(r#"{ "only": {} }"#).unwrap());
        assert_eq!(registry.active_name(), "other");

        registry.register_active("chaos", Manifest::from_json_str(r#"{ "again": {} }"#).unwrap());
        assert_eq!(registry.active_name(), "chaos");
        assert!(registry.active().contains("again"));
        assert_eq!(registry.names(), vec!["chaos", "other"]);
    }

    #[test]
    fn test_install_global_activates_each_manifest() {
        let first = install_global("first", Manifest::from_json_str(MANIFEST).unwrap());
        assert_eq!(first.active_name(), "first");

        let second = install_global("second", Manifest::from_json_str(r#"{ "only": {} }"#).unwrap());
        assert!(std::ptr::eq(first, second));
        assert_eq!(second.active_name(), "second");
        assert!(second.active().contains("only"));
        assert!(global().is_some_and(|g| g.get("first").is_some()));
    }
}
