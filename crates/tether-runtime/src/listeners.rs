// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Node-scoped listener table: (node, event) -> the one active script handler.

use std::collections::HashMap;

use tracing::debug;

use tether_core::types::{HandlerId, NodeId};

#[derive(Debug, Default)]
pub struct ListenerTable {
    by_node: HashMap<NodeId, HashMap<String, HandlerId>>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for (`node`, `event`), replacing and returning any
    /// previous handler.
    pub fn register(&mut self, node: NodeId, event: &str, handler: HandlerId) -> Option<HandlerId> {
        let previous = self
            .by_node
            .entry(node)
            .or_default()
            .insert(event.to_string(), handler);
        if let Some(old) = previous {
            debug!(node = %node, event, old = %old, new = %handler, "listener replaced");
        }
        previous
    }

    pub fn unregister(&mut self, node: NodeId, event: &str) -> Option<HandlerId> {
        let events = self.by_node.get_mut(&node)?;
        let removed = events.remove(event);
        if events.is_empty() {
            self.by_node.remove(&node);
        }
        removed
    }

    pub fn handler(&self, node: NodeId, event: &str) -> Option<HandlerId> {
        self.by_node.get(&node)?.get(event).copied()
    }

    pub fn is_attached(&self, node: NodeId, event: &str) -> bool {
        self.handler(node, event).is_some()
    }

    /// Drop every registration for the given nodes. Returns how many entries
    /// went away.
    pub fn purge(&mut self, nodes: &[NodeId]) -> usize {
        nodes
            .iter()
            .filter_map(|id| self.by_node.remove(id))
            .map(|events| events.len())
            .sum()
    }

    /// Number of registrations referencing `node`.
    pub fn references(&self, node: NodeId) -> usize {
        self.by_node.get(&node).map_or(0, HashMap::len)
    }

    /// Total registrations.
    pub fn len(&self) -> usize {
        self.by_node.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}
