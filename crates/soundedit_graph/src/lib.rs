// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sound operator graphs for soundedit.
//!
//! This crate provides:
//! - the operator schema registry, loaded from a per-game JSON manifest
//! - a typed node graph of operator and constant nodes
//! - translation between KeyValues operator stacks and graphs
//!
//! ## Architecture
//!
//! A [`Manifest`] describes every operator type: its typed inputs and
//! outputs and its key-value settings. The [`ManifestRegistry`] holds one
//! manifest per game with exactly one active. A [`StackTranslator`] reads the
//! active manifest to turn a [`StackFile`] stack into a [`Graph`] and back.

pub mod connection;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod node;
pub mod port;
pub mod signal;
pub mod stack;
pub mod translate;
pub mod value;

pub use connection::{Connection, ConnectionId};
pub use error::{Error, Result};
pub use graph::Graph;
pub use manifest::{
    color_for_value_type, global, install_global, InputSpec, IoSpec, KeyValueSpec, Manifest,
    ManifestRegistry, NodeTypeSpec, OutputSpec,
};
pub use node::{Node, NodeId, NodeKind, CONSTANT_OUTPUT};
pub use port::{Port, PortDirection, PortRef, ValueType};
pub use signal::{DirtySignal, SubscriptionId};
pub use stack::{resolve_imports, NodeRecord, OperatorStack, StackField, StackFile, StackGroup, StackKind};
pub use translate::{to_document, StackReport, StackTranslator};
pub use value::{KeyValue, KeyValueKind};
