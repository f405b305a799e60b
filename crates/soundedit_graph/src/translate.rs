// SPDX-License-Identifier: MIT OR Apache-2.0
//! Conversion between operator stacks and node graphs.
//!
//! Building a graph runs three passes over a stack:
//!
//! 1. imports are flattened into a single stack;
//! 2. every node record becomes an operator node, then its literal inputs
//!    become constant nodes and its key-values are assigned;
//! 3. `@node.output` references become connections.
//!
//! Names for every document node are reserved before pass 2 creates any
//! constant, and references are only resolved once every node exists, so
//! forward references work. A failure anywhere discards the graph.

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::manifest::{Manifest, ManifestRegistry};
use crate::node::{Node, NodeId, NodeKind, CONSTANT_OUTPUT};
use crate::port::PortRef;
use crate::stack::{resolve_imports, NodeRecord, OperatorStack, StackField, StackFile, StackGroup, StackKind};
use std::collections::HashMap;

/// Prefix marking a field value as a reference to another node's output
pub const REFERENCE_PREFIX: char = '@';

/// Split `@node.output` into its node and output names
pub fn parse_reference(value: &str) -> Result<(&str, &str)> {
    let malformed = || Error::MalformedReference(value.to_string());
    let body = value.strip_prefix(REFERENCE_PREFIX).ok_or_else(malformed)?;
    let (node, output) = body.split_once('.').ok_or_else(malformed)?;
    if node.is_empty() || output.is_empty() || output.contains('.') {
        return Err(malformed());
    }
    Ok((node, output))
}

/// Outcome of building one stack of a file
#[derive(Debug)]
pub struct StackReport {
    /// Group the stack belongs to
    pub kind: StackKind,
    /// Stack name
    pub name: String,
    /// The built graph, or why it could not be built
    pub result: Result<Graph>,
}

/// Translates stacks against the registry's active manifest.
///
/// The active manifest is read at the start of every call, so switching the
/// active game affects the next translation.
#[derive(Debug, Clone, Copy)]
pub struct StackTranslator<'r> {
    registry: &'r ManifestRegistry,
}

impl<'r> StackTranslator<'r> {
    /// Translate against a registry
    pub fn new(registry: &'r ManifestRegistry) -> Self {
        Self { registry }
    }

    /// Translate against the process-wide registry
    pub fn global() -> Result<StackTranslator<'static>> {
        crate::manifest::global()
            .map(StackTranslator::new)
            .ok_or_else(|| Error::NotFound("global manifest registry".to_string()))
    }

    /// Build the graph for one stack of a group, following its imports
    pub fn build_graph(&self, stack_name: &str, group: &StackGroup) -> Result<Graph> {
        let stack = resolve_imports(stack_name, group)?;
        self.build_stack(stack_name, &stack)
    }

    /// Build a graph from a stack whose imports are already resolved.
    ///
    /// Any `import_stack` entry left in `stack` is ignored.
    pub fn build_stack(&self, name: &str, stack: &OperatorStack) -> Result<Graph> {
        let manifest = self.registry.active();
        let mut graph = Graph::new(name);

        for (key, field) in stack.entries() {
            if let StackField::Value(value) = field {
                graph.properties.insert(key.to_string(), value.clone());
            }
        }

        // Pass 2a: one operator node per record, reserving every document name
        let mut document_nodes: Vec<(NodeId, &str, &NodeRecord)> = Vec::new();
        let mut by_name: HashMap<&str, NodeId> = HashMap::new();
        for (node_name, record) in stack.nodes() {
            let spec = manifest.type_spec(&record.operator).map_err(|_| Error::UnknownOperatorType {
                node: node_name.to_string(),
                operator: record.operator.clone(),
            })?;
            let id = graph.insert_node(Node::operator(node_name, &record.operator, spec))?;
            by_name.insert(node_name, id);
            document_nodes.push((id, node_name, record));
        }

        // Pass 2b: literals and key-values
        for &(id, node_name, record) in &document_nodes {
            assign_fields(&mut graph, &manifest, id, node_name, record)?;
        }

        // Pass 3: references
        let mut connected = 0;
        for &(id, _, record) in &document_nodes {
            for (field, value) in &record.fields {
                if !value.starts_with(REFERENCE_PREFIX) || !is_input(&graph, id, field) {
                    continue;
                }
                let (source_name, output) = parse_reference(value)?;
                let unresolved = |reason: String| Error::UnresolvedReference {
                    reference: value.clone(),
                    reason,
                };
                let source = *by_name
                    .get(source_name)
                    .ok_or_else(|| unresolved(format!("no node named '{source_name}'")))?;
                let has_output = graph
                    .node(source)
                    .is_some_and(|n| n.output(output).is_some());
                if !has_output {
                    return Err(unresolved(format!(
                        "node '{source_name}' has no output '{output}'"
                    )));
                }
                graph.connect(PortRef::new(source, output), PortRef::new(id, field.as_str()))?;
                connected += 1;
            }
        }

        graph.auto_layout();
        graph.mark_clean();
        tracing::debug!(
            "Built graph '{}': {} nodes ({} from the document), {} references",
            name,
            graph.node_count(),
            document_nodes.len(),
            connected
        );
        Ok(graph)
    }

    /// Build every stack of a file, in file order
    pub fn build_file(&self, file: &StackFile) -> Vec<StackReport> {
        let mut reports = Vec::new();
        for kind in StackKind::ALL {
            let group = file.group(kind);
            for name in group.names() {
                let result = self.build_graph(name, group);
                if let Err(e) = &result {
                    tracing::warn!("Stack '{}' in {} failed: {}", name, kind.section_key(), e);
                }
                reports.push(StackReport {
                    kind,
                    name: name.to_string(),
                    result,
                });
            }
        }
        reports
    }

    /// Serialize a graph back to a stack.
    ///
    /// Constants are folded into the literal of the input they feed,
    /// connections become `@node.output` references, and only key-values
    /// that were explicitly set are written.
    pub fn to_document(&self, graph: &Graph) -> OperatorStack {
        to_document(graph)
    }
}

fn is_input(graph: &Graph, id: NodeId, field: &str) -> bool {
    graph.node(id).is_some_and(|n| n.input(field).is_some())
}

fn assign_fields(
    graph: &mut Graph,
    manifest: &Manifest,
    id: NodeId,
    node_name: &str,
    record: &NodeRecord,
) -> Result<()> {
    let spec = manifest.type_spec(&record.operator)?;
    for (field, value) in &record.fields {
        if spec.key_value(field).is_some() {
            if value.starts_with(REFERENCE_PREFIX) && spec.input(field).is_some() {
                continue;
            }
            if graph.node(id).and_then(|n| n.key_value(field)).is_some_and(|kv| kv.is_explicit()) {
                tracing::warn!("Node '{}' sets '{}' twice, keeping the last value", node_name, field);
            }
            graph.set_key_value(id, field, value)?;
            continue;
        }

        let input_type = graph
            .node(id)
            .and_then(|n| n.input(field))
            .map(|port| port.value_type);
        match input_type {
            Some(_) if value.starts_with(REFERENCE_PREFIX) => {}
            Some(value_type) => {
                if let Err(e) = value_type.validate_literal(field, value) {
                    tracing::warn!("Node '{}': {}, keeping the literal as written", node_name, e);
                }
                let name = graph.unique_name(&format!("{node_name}_{field}"));
                let constant = graph.insert_node(Node::constant(name, value_type, value.as_str()))?;
                graph.connect(
                    PortRef::new(constant, CONSTANT_OUTPUT),
                    PortRef::new(id, field.as_str()),
                )?;
            }
            None => {
                tracing::warn!(
                    "Node '{}' ({}) has unknown field '{}', keeping it as-is",
                    node_name,
                    record.operator,
                    field
                );
                graph.push_extra_field(id, field, value)?;
            }
        }
    }
    Ok(())
}

/// Serialize a graph back to a stack. See [`StackTranslator::to_document`].
pub fn to_document(graph: &Graph) -> OperatorStack {
    let mut stack = OperatorStack::new();
    for (key, value) in &graph.properties {
        stack.push(key.as_str(), StackField::Value(value.clone()));
    }

    for node in graph.nodes() {
        let Some(operator) = node.operator_type() else {
            continue;
        };
        let mut record = NodeRecord::new(operator);

        for port in node.inputs() {
            let Some(connection) = graph.connection_to(&PortRef::new(node.id, port.name.as_str())) else {
                continue;
            };
            let Some(source) = graph.node(connection.from_node) else {
                continue;
            };
            let text = match source.kind() {
                NodeKind::Constant { value, .. } => value.clone(),
                NodeKind::Operator { .. } => {
                    format!("{REFERENCE_PREFIX}{}.{}", source.name(), connection.from_port)
                }
            };
            record.fields.push((port.name.clone(), text));
        }

        for (key, kv) in node.key_values() {
            if kv.is_explicit() && record.get(key).is_none() {
                record.fields.push((key.to_string(), kv.as_str().to_string()));
            }
        }

        for (key, value) in node.extra_fields() {
            record.fields.push((key.to_string(), value.to_string()));
        }

        stack.push(node.name(), StackField::Node(record));
    }
    stack
}
