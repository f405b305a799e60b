// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and connections.
//!
//! Every mutation raises the graph's dirty flag. Each input port holds at
//! most one incoming connection; an unconnected input falls back to its
//! declared default.

use crate::connection::{Connection, ConnectionId};
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::node::{Node, NodeId};
use crate::port::{PortDirection, PortRef, ValueType};
use crate::signal::{DirtySignal, SubscriptionId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Horizontal spacing between layout columns
const LAYOUT_COLUMN_WIDTH: f32 = 260.0;
/// Vertical spacing between nodes in a column
const LAYOUT_ROW_HEIGHT: f32 = 140.0;

/// A node graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    /// Graph name (the operator stack name)
    pub name: String,
    /// Stack-level scalar fields, written back verbatim
    #[serde(default)]
    pub properties: IndexMap<String, String>,
    /// Nodes in the graph
    nodes: IndexMap<NodeId, Node>,
    /// Connections between nodes
    connections: IndexMap<ConnectionId, Connection>,
    #[serde(skip)]
    dirty: DirtySignal,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------
    // Dirty state
    // ------------------------------------------------------------------

    /// Whether the graph changed since it was loaded or last marked clean
    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    /// Subscribe to dirty-state transitions
    pub fn subscribe(&mut self, callback: impl FnMut(bool) + 'static) -> SubscriptionId {
        self.dirty.subscribe(callback)
    }

    /// Remove a dirty-state subscription
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.dirty.unsubscribe(id)
    }

    /// Clear the dirty flag, e.g. after a successful save
    pub fn mark_clean(&mut self) {
        self.dirty.clear();
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Add a node, failing if its name is taken
    pub(crate) fn insert_node(&mut self, node: Node) -> Result<NodeId> {
        if self.node_id(node.name()).is_some() {
            return Err(Error::DuplicateName(node.name().to_string()));
        }
        let id = node.id;
        self.nodes.insert(id, node);
        self.dirty.mark();
        Ok(id)
    }

    /// Create an operator node with every key-value at its manifest default.
    ///
    /// Without a name, one is generated from the type name.
    pub fn create_node(
        &mut self,
        manifest: &Manifest,
        operator: &str,
        name: Option<&str>,
    ) -> Result<NodeId> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.unique_name(operator),
        };
        let spec = manifest.type_spec(operator).map_err(|_| Error::UnknownOperatorType {
            node: name.clone(),
            operator: operator.to_string(),
        })?;
        self.insert_node(Node::operator(name, operator, spec))
    }

    /// Create a constant-source node holding a literal
    pub fn create_constant(
        &mut self,
        value_type: ValueType,
        value: &str,
        name: Option<&str>,
    ) -> Result<NodeId> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.unique_name("constant"),
        };
        value_type.validate_literal(&name, value)?;
        self.insert_node(Node::constant(name, value_type, value))
    }

    /// Change the literal held by a constant node
    pub fn set_constant(&mut self, node_id: NodeId, value: &str) -> Result<()> {
        let node = self.node_mut(node_id)?;
        let name = node.name().to_string();
        let (value_type, slot) = node
            .constant_value_mut()
            .ok_or_else(|| Error::InvalidDocument(format!("node '{name}' is not a constant")))?;
        value_type.validate_literal(&name, value)?;
        *slot = value.to_string();
        self.dirty.mark();
        Ok(())
    }

    /// Remove a node by name, detaching every connection that touches it.
    ///
    /// Returns false if no node has that name.
    pub fn remove_node(&mut self, name: &str) -> bool {
        let Some(node_id) = self.node_id(name) else {
            return false;
        };
        self.connections.retain(|_, c| !c.involves_node(node_id));
        self.nodes.shift_remove(&node_id);
        self.dirty.mark();
        true
    }

    /// Rename a node
    pub fn rename_node(&mut self, node_id: NodeId, new_name: &str) -> Result<()> {
        if let Some(existing) = self.node_id(new_name) {
            if existing == node_id {
                return Ok(());
            }
            return Err(Error::DuplicateName(new_name.to_string()));
        }
        self.node_mut(node_id)?.set_name(new_name.to_string());
        self.dirty.mark();
        Ok(())
    }

    /// Change an operator node's type.
    ///
    /// Ports are rebuilt from the new type; connections on ports that no
    /// longer exist are dropped.
    pub fn retype(&mut self, manifest: &Manifest, node_id: NodeId, operator: &str) -> Result<()> {
        let node = self.node_mut(node_id)?;
        if node.is_constant() {
            return Err(Error::InvalidDocument(format!(
                "node '{}' is a constant and has no operator type",
                node.name()
            )));
        }
        let spec = manifest.type_spec(operator).map_err(|_| Error::UnknownOperatorType {
            node: node.name().to_string(),
            operator: operator.to_string(),
        })?;
        node.apply_type(operator, spec);

        let node = &self.nodes[&node_id];
        let before = self.connections.len();
        self.connections.retain(|_, c| {
            let stale_input = c.to_node == node_id && node.input(&c.to_port).is_none();
            let stale_output = c.from_node == node_id && node.output(&c.from_port).is_none();
            !(stale_input || stale_output)
        });
        tracing::debug!(
            "Retyped '{}' to {} ({} connections dropped)",
            node.name(),
            operator,
            before - self.connections.len()
        );
        self.dirty.mark();
        Ok(())
    }

    /// Assign a key-value after validating it against its kind
    pub fn set_key_value(&mut self, node_id: NodeId, key: &str, value: &str) -> Result<()> {
        let node = self.node_mut(node_id)?;
        let name = node.name().to_string();
        let kv = node
            .key_value_mut(key)
            .ok_or_else(|| Error::NotFound(format!("key-value '{key}' on node '{name}'")))?;
        kv.set(key, value)?;
        self.dirty.mark();
        Ok(())
    }

    pub(crate) fn push_extra_field(&mut self, node_id: NodeId, key: &str, value: &str) -> Result<()> {
        self.node_mut(node_id)?.push_extra_field(key, value);
        self.dirty.mark();
        Ok(())
    }

    fn node_mut(&mut self, node_id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(&node_id)
            .ok_or_else(|| Error::NodeNotFound(format!("{:?}", node_id.0)))
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a node by name
    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.values().find(|n| n.name() == name)
    }

    /// ID of the node with this name
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.node_by_name(name).map(|n| n.id)
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// A name based on `base` that no node uses yet
    pub fn unique_name(&self, base: &str) -> String {
        if self.node_id(base).is_none() {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| self.node_id(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Connect an output port to an input port
    pub fn connect(&mut self, from: PortRef, to: PortRef) -> Result<ConnectionId> {
        let source_node = self.nodes.get(&from.node)
            .ok_or_else(|| Error::NodeNotFound(format!("{:?}", from.node.0)))?;
        let target_node = self.nodes.get(&to.node)
            .ok_or_else(|| Error::NodeNotFound(format!("{:?}", to.node.0)))?;

        if source_node.output(&from.port).is_none() {
            return Err(Error::PortNotFound {
                node: source_node.name().to_string(),
                port: from.port,
                direction: PortDirection::Output.label(),
            });
        }
        if target_node.input(&to.port).is_none() {
            return Err(Error::PortNotFound {
                node: target_node.name().to_string(),
                port: to.port,
                direction: PortDirection::Input.label(),
            });
        }

        if self.connection_to(&to).is_some() {
            return Err(Error::DuplicateConnection {
                node: target_node.name().to_string(),
                port: to.port,
            });
        }

        let connection = Connection::new(from, to);
        let id = connection.id;
        self.connections.insert(id, connection);
        self.dirty.mark();
        Ok(id)
    }

    /// Remove the connection feeding an input, if any
    pub fn disconnect(&mut self, input: &PortRef) -> Option<Connection> {
        let id = self.connection_to(input)?.id;
        let removed = self.connections.shift_remove(&id);
        self.dirty.mark();
        removed
    }

    /// Get a connection by ID
    pub fn connection(&self, connection_id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection_id)
    }

    /// Get all connections
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// The connection feeding an input
    pub fn connection_to(&self, input: &PortRef) -> Option<&Connection> {
        self.connections.values().find(|c| c.ends_at(input))
    }

    /// Get the number of connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // ------------------------------------------------------------------
    // Ordering and layout
    // ------------------------------------------------------------------

    /// Get nodes in dependency order, sources first
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut visited = HashSet::new();
        let mut temp_mark = HashSet::new();
        let mut order = Vec::new();

        for node_id in self.nodes.keys() {
            if !visited.contains(node_id) {
                self.visit(*node_id, &mut visited, &mut temp_mark, &mut order)?;
            }
        }

        Ok(order)
    }

    fn visit(
        &self,
        node_id: NodeId,
        visited: &mut HashSet<NodeId>,
        temp_mark: &mut HashSet<NodeId>,
        order: &mut Vec<NodeId>,
    ) -> Result<()> {
        if temp_mark.contains(&node_id) {
            return Err(Error::CycleDetected);
        }
        if visited.contains(&node_id) {
            return Ok(());
        }

        temp_mark.insert(node_id);

        // Visit all nodes that this node depends on
        for connection in self.connections.values().filter(|c| c.to_node == node_id) {
            self.visit(connection.from_node, visited, temp_mark, order)?;
        }

        temp_mark.remove(&node_id);
        visited.insert(node_id);
        order.push(node_id);

        Ok(())
    }

    /// Arrange nodes in columns by dependency depth.
    ///
    /// Nodes caught in a cycle go in one column after the rest. Layout is a
    /// view concern and does not mark the graph dirty.
    pub fn auto_layout(&mut self) {
        let mut incoming: HashMap<NodeId, usize> = self.nodes.keys().map(|id| (*id, 0)).collect();
        for c in self.connections.values() {
            if let Some(count) = incoming.get_mut(&c.to_node) {
                *count += 1;
            }
        }

        let mut depth: HashMap<NodeId, usize> = HashMap::new();
        let mut ready: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|id| incoming[*id] == 0)
            .copied()
            .collect();
        ready.reverse();

        while let Some(node_id) = ready.pop() {
            let d = *depth.entry(node_id).or_insert(0);
            for c in self.connections.values().filter(|c| c.from_node == node_id) {
                let next = depth.entry(c.to_node).or_insert(0);
                *next = (*next).max(d + 1);
                if let Some(count) = incoming.get_mut(&c.to_node) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(c.to_node);
                    }
                }
            }
        }

        let cycle_column = depth.values().copied().max().map_or(0, |d| d + 1);
        let mut rows: HashMap<usize, usize> = HashMap::new();
        for node in self.nodes.values_mut() {
            let column = if incoming[&node.id] == 0 {
                depth.get(&node.id).copied().unwrap_or(0)
            } else {
                cycle_column
            };
            let row = rows.entry(column).or_insert(0);
            node.position = [
                column as f32 * LAYOUT_COLUMN_WIDTH,
                *row as f32 * LAYOUT_ROW_HEIGHT,
            ];
            *row += 1;
        }
    }
}
