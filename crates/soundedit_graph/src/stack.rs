// SPDX-License-Identifier: MIT OR Apache-2.0
//! Operator stack documents.
//!
//! A stack file has two groups, `start_stacks` and `update_stacks`, each an
//! ordered set of named stacks. A stack maps node names to node records and
//! may pull in other stacks of the same group with `import_stack`.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use soundedit_keyvalues::{KeyValues, Value};
use std::path::Path;

/// Stack-level key naming another stack to merge in
pub const IMPORT_STACK_KEY: &str = "import_stack";

/// Node-level key naming the operator type
pub const OPERATOR_KEY: &str = "operator";

/// Which group a stack belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackKind {
    /// Runs once when the sound starts
    Start,
    /// Runs every update
    Update,
}

impl StackKind {
    /// Both groups, in file order
    pub const ALL: [StackKind; 2] = [Self::Start, Self::Update];

    /// Section key in the stack file
    pub fn section_key(self) -> &'static str {
        match self {
            Self::Start => "start_stacks",
            Self::Update => "update_stacks",
        }
    }
}

/// One node of a stack: its operator type and raw field strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// Operator type name
    pub operator: String,
    /// Inputs, key-values and any other fields, in document order.
    /// A field may repeat; the translator decides what a repeat means.
    pub fields: Vec<(String, String)>,
}

impl NodeRecord {
    /// A record with no fields
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field append
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }

    /// First value of a field
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == field)
            .map(|(_, value)| value.as_str())
    }

    fn from_keyvalues(node: &str, kv: &KeyValues) -> Result<Self> {
        let mut operator = None;
        let mut fields = Vec::new();
        for (key, value) in kv.iter() {
            let Value::String(value) = value else {
                return Err(Error::InvalidDocument(format!(
                    "field '{key}' of node '{node}' is a section"
                )));
            };
            if key == OPERATOR_KEY {
                operator = Some(value.clone());
                continue;
            }
            fields.push((key.to_string(), value.clone()));
        }
        let operator = operator.ok_or_else(|| {
            Error::InvalidDocument(format!("node '{node}' has no '{OPERATOR_KEY}' field"))
        })?;
        Ok(Self { operator, fields })
    }

    fn to_keyvalues(&self) -> KeyValues {
        let mut kv = KeyValues::new().with(OPERATOR_KEY, self.operator.as_str());
        for (field, value) in &self.fields {
            kv.push(field.as_str(), value.as_str());
        }
        kv
    }
}

/// A single entry of a stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackField {
    /// `import_stack` naming another stack
    Import(String),
    /// A node record
    Node(NodeRecord),
    /// Any other scalar field
    Value(String),
}

/// An ordered operator stack. Keys may repeat (multiple `import_stack`s).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OperatorStack {
    entries: Vec<(String, StackField)>,
}

impl OperatorStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&mut self, key: impl Into<String>, field: StackField) {
        self.entries.push((key.into(), field));
    }

    /// Builder form of [`OperatorStack::push`]
    pub fn with(mut self, key: impl Into<String>, field: StackField) -> Self {
        self.push(key, field);
        self
    }

    /// Builder shorthand for an `import_stack` entry
    pub fn with_import(self, stack: impl Into<String>) -> Self {
        self.with(IMPORT_STACK_KEY, StackField::Import(stack.into()))
    }

    /// Builder shorthand for a node entry
    pub fn with_node(self, name: impl Into<String>, record: NodeRecord) -> Self {
        self.with(name, StackField::Node(record))
    }

    /// Replace the first entry with this key, or append if there is none
    pub fn set(&mut self, key: &str, field: StackField) -> Option<StackField> {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, field)),
            None => {
                self.entries.push((key.to_string(), field));
                None
            }
        }
    }

    /// First entry with this key
    pub fn get(&self, key: &str) -> Option<&StackField> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, f)| f)
    }

    /// All entries in order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &StackField)> {
        self.entries.iter().map(|(k, f)| (k.as_str(), f))
    }

    /// Names of imported stacks, in order
    pub fn imports(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|(_, f)| match f {
            StackField::Import(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Node records, in order
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &NodeRecord)> {
        self.entries.iter().filter_map(|(k, f)| match f {
            StackField::Node(record) => Some((k.as_str(), record)),
            _ => None,
        })
    }

    /// A node record by name
    pub fn node(&self, name: &str) -> Option<&NodeRecord> {
        self.nodes().find(|(n, _)| *n == name).map(|(_, r)| r)
    }

    /// Number of node records
    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read a stack body
    pub fn from_keyvalues(kv: &KeyValues) -> Result<Self> {
        let mut stack = Self::new();
        for (key, value) in kv.iter() {
            let field = match value {
                Value::String(name) if key == IMPORT_STACK_KEY => StackField::Import(name.clone()),
                Value::String(text) => StackField::Value(text.clone()),
                Value::Section(_) if key == IMPORT_STACK_KEY => {
                    return Err(Error::InvalidDocument(format!(
                        "'{IMPORT_STACK_KEY}' must name a stack"
                    )));
                }
                Value::Section(section) => StackField::Node(NodeRecord::from_keyvalues(key, section)?),
            };
            stack.push(key, field);
        }
        Ok(stack)
    }

    /// Write a stack body
    pub fn to_keyvalues(&self) -> KeyValues {
        let mut kv = KeyValues::new();
        for (key, field) in &self.entries {
            match field {
                StackField::Import(name) | StackField::Value(name) => kv.push(key.as_str(), name.as_str()),
                StackField::Node(record) => kv.push(key.as_str(), record.to_keyvalues()),
            }
        }
        kv
    }
}

/// The named stacks of one group
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StackGroup {
    stacks: IndexMap<String, OperatorStack>,
}

impl StackGroup {
    /// Create an empty group
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a stack
    pub fn insert(&mut self, name: impl Into<String>, stack: OperatorStack) -> Option<OperatorStack> {
        self.stacks.insert(name.into(), stack)
    }

    /// Builder form of [`StackGroup::insert`]
    pub fn with(mut self, name: impl Into<String>, stack: OperatorStack) -> Self {
        self.insert(name, stack);
        self
    }

    /// A stack by name
    pub fn get(&self, name: &str) -> Option<&OperatorStack> {
        self.stacks.get(name)
    }

    /// Stacks in file order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OperatorStack)> {
        self.stacks.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Stack names in file order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stacks.keys().map(String::as_str)
    }

    /// Number of stacks
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    /// Whether the group is empty
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Add the stacks of one group section; a later definition replaces an earlier one
    fn read_keyvalues(&mut self, kind: StackKind, kv: &KeyValues) -> Result<()> {
        for (name, value) in kv.iter() {
            let Value::Section(body) = value else {
                return Err(Error::InvalidDocument(format!(
                    "'{}' entry '{}' is not a stack",
                    kind.section_key(),
                    name
                )));
            };
            if self.insert(name, OperatorStack::from_keyvalues(body)?).is_some() {
                tracing::warn!("Stack '{}' is defined twice, keeping the last one", name);
            }
        }
        Ok(())
    }

    fn to_keyvalues(&self) -> KeyValues {
        self.iter()
            .map(|(name, stack)| (name, stack.to_keyvalues()))
            .collect()
    }
}

/// A complete stack file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StackFile {
    /// Stacks run when a sound starts
    pub start_stacks: StackGroup,
    /// Stacks run every update
    pub update_stacks: StackGroup,
}

impl StackFile {
    /// Read and parse a stack file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let kv = soundedit_keyvalues::from_path(path.as_ref())
            .map_err(|e| Error::InvalidDocument(e.to_string()))?;
        Self::from_keyvalues(&kv)
    }

    /// Read the two stack groups from a parsed document. Missing groups are
    /// empty; a group section that appears twice adds to the same group.
    pub fn from_keyvalues(kv: &KeyValues) -> Result<Self> {
        let mut file = Self::default();
        for (key, value) in kv.iter() {
            let Some(kind) = StackKind::ALL.into_iter().find(|k| k.section_key() == key) else {
                tracing::warn!("Ignoring unknown top-level section '{}'", key);
                continue;
            };
            let Value::Section(body) = value else {
                return Err(Error::InvalidDocument(format!("'{key}' is not a section")));
            };
            file.group_mut(kind).read_keyvalues(kind, body)?;
        }
        Ok(file)
    }

    /// Write both groups
    pub fn to_keyvalues(&self) -> KeyValues {
        StackKind::ALL
            .into_iter()
            .map(|kind| (kind.section_key(), self.group(kind).to_keyvalues()))
            .collect()
    }

    /// One group
    pub fn group(&self, kind: StackKind) -> &StackGroup {
        match kind {
            StackKind::Start => &self.start_stacks,
            StackKind::Update => &self.update_stacks,
        }
    }

    /// One group, mutably
    pub fn group_mut(&mut self, kind: StackKind) -> &mut StackGroup {
        match kind {
            StackKind::Start => &mut self.start_stacks,
            StackKind::Update => &mut self.update_stacks,
        }
    }
}

/// Flatten a stack's imports.
///
/// Imported fields override local fields with the same key and are appended
/// otherwise. Imports resolve transitively; an import chain that returns to
/// a stack already being merged fails with [`Error::CyclicImport`].
pub fn resolve_imports(stack_name: &str, group: &StackGroup) -> Result<OperatorStack> {
    if group.get(stack_name).is_none() {
        return Err(Error::NotFound(format!("stack '{stack_name}'")));
    }
    let mut chain = Vec::new();
    resolve(stack_name, group, &mut chain)
}

fn resolve(stack_name: &str, group: &StackGroup, chain: &mut Vec<String>) -> Result<OperatorStack> {
    if chain.iter().any(|s| s == stack_name) {
        let mut cycle = chain.clone();
        cycle.push(stack_name.to_string());
        return Err(Error::CyclicImport { chain: cycle });
    }
    let Some(stack) = group.get(stack_name) else {
        return Err(Error::NotFound(format!("stack '{stack_name}'")));
    };

    chain.push(stack_name.to_string());

    let mut merged = OperatorStack::new();
    for (key, field) in stack.entries() {
        if !matches!(field, StackField::Import(_)) {
            merged.push(key, field.clone());
        }
    }

    for import in stack.imports() {
        if group.get(import).is_none() {
            return Err(Error::UnresolvedImport {
                stack: stack_name.to_string(),
                import: import.to_string(),
            });
        }
        let imported = resolve(import, group, chain)?;
        let mut overridden = 0;
        for (key, field) in imported.entries {
            if merged.set(&key, field).is_some() {
                overridden += 1;
            }
        }
        tracing::debug!(
            "Merged '{}' into '{}' ({} fields overridden)",
            import,
            stack_name,
            overridden
        );
    }

    chain.pop();
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn value(text: &str) -> StackField {
        StackField::Value(text.to_string())
    }

    #[test]
    fn test_import_overrides_local() {
        let group = StackGroup::new()
            .with(
                "A",
                OperatorStack::new().with_import("B").with("k1", value("v1")),
            )
            .with(
                "B",
                OperatorStack::new().with("k1", value("vB")).with("k2", value("vB2")),
            );

        let resolved = resolve_imports("A", &group).unwrap();
        let expected = OperatorStack::new().with("k1", value("vB")).with("k2", value("vB2"));
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_later_import_wins() {
        let group = StackGroup::new()
            .with("A", OperatorStack::new().with_import("B").with_import("C"))
            .with("B", OperatorStack::new().with("k", value("fromB")))
            .with("C", OperatorStack::new().with("k", value("fromC")));

        let resolved = resolve_imports("A", &group).unwrap();
        assert!(matches!(resolved.get("k"), Some(StackField::Value(v)) if v == "fromC"));
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn test_transitive_imports() {
        let group = StackGroup::new()
            .with("A", OperatorStack::new().with_import("B"))
            .with("B", OperatorStack::new().with_import("C").with("b", value("1")))
            .with("C", OperatorStack::new().with("c", value("2")));

        let resolved = resolve_imports("A", &group).unwrap();
        let keys: Vec<_> = resolved.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "c"]);
        assert_eq!(resolved.imports().count(), 0);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let group = StackGroup::new()
            .with("A", OperatorStack::new().with_import("B").with_import("C"))
            .with("B", OperatorStack::new().with_import("D"))
            .with("C", OperatorStack::new().with_import("D"))
            .with("D", OperatorStack::new().with("d", value("1")));

        assert!(resolve_imports("A", &group).is_ok());
    }

    #[test]
    fn test_cyclic_import() {
        let group = StackGroup::new()
            .with("A", OperatorStack::new().with_import("B"))
            .with("B", OperatorStack::new().with_import("A"));

        assert_eq!(
            resolve_imports("A", &group),
            Err(Error::CyclicImport {
                chain: vec!["A".to_string(), "B".to_string(), "A".to_string()]
            })
        );
    }

    #[test]
    fn test_unresolved_import() {
        let group = StackGroup::new().with("A", OperatorStack::new().with_import("missing"));
        assert_eq!(
            resolve_imports("A", &group),
            Err(Error::UnresolvedImport {
                stack: "A".to_string(),
                import: "missing".to_string()
            })
        );
        assert!(matches!(resolve_imports("nope", &group), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_file_from_keyvalues() {
        let text = r#"
            "start_stacks"
            {
                "base"
                {
                    "volume" { "operator" "sos_op_math_float" "input1" "1.0" }
                }
                "derived"
                {
                    "import_stack" "base"
                    "import_stack" "other"
                    "pitch" { "operator" "sos_op_math_float" "input1" "@volume.output" }
                }
            }
            "update_stacks" { }
        "#;
        let kv = soundedit_keyvalues::parse(text).unwrap();
        let file = StackFile::from_keyvalues(&kv).unwrap();

        assert_eq!(file.start_stacks.len(), 2);
        assert!(file.update_stacks.is_empty());
        let derived = file.start_stacks.get("derived").unwrap();
        assert_eq!(derived.imports().collect::<Vec<_>>(), vec!["base", "other"]);
        assert_eq!(
            derived.node("pitch").unwrap().get("input1"),
            Some("@volume.output")
        );

        let reparsed = StackFile::from_keyvalues(&file.to_keyvalues()).unwrap();
        assert_eq!(reparsed, file);
    }

    #[test]
    fn test_node_without_operator() {
        let kv = soundedit_keyvalues::parse(r#"start_stacks { s { n { input1 "1" } } }"#).unwrap();
        assert!(matches!(
            StackFile::from_keyvalues(&kv),
            Err(Error::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_repeated_node_fields_are_kept() {
        let kv = soundedit_keyvalues::parse(
            r#"start_stacks { s { n { operator op input1 "@a.output" input1 "@b.output" } } }"#,
        )
        .unwrap();
        let file = StackFile::from_keyvalues(&kv).unwrap();
        let node = file.start_stacks.get("s").unwrap().node("n").unwrap();

        assert_eq!(
            node.fields,
            vec![
                ("input1".to_string(), "@a.output".to_string()),
                ("input1".to_string(), "@b.output".to_string()),
            ]
        );
        assert_eq!(node.get("input1"), Some("@a.output"));
        assert_eq!(StackFile::from_keyvalues(&file.to_keyvalues()).unwrap(), file);
    }

    #[test]
    fn test_repeated_group_sections_merge() {
        let kv = soundedit_keyvalues::parse(
            r#"
            start_stacks { first { n { operator op } } shared { n { operator old } } }
            update_stacks { tick { n { operator op } } }
            start_stacks { second { n { operator op } } shared { n { operator new } } }
            "#,
        )
        .unwrap();
        let file = StackFile::from_keyvalues(&kv).unwrap();

        assert_eq!(
            file.start_stacks.names().collect::<Vec<_>>(),
            vec!["first", "shared", "second"]
        );
        let shared = file.start_stacks.get("shared").unwrap();
        assert_eq!(shared.node("n").unwrap().operator, "new");
        assert_eq!(file.update_stacks.len(), 1);
    }
}
