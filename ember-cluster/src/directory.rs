/*
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */

//! The static node directory: every node in the cluster, known up front
//! from config at boot. An unknown node id is a permanent error - there is
//! no dynamic membership or gossip here, just a fixed table.

use std::collections::HashMap;

use crate::errors::{ClusterError, ClusterResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    pub node_id: String,
    pub node_type: String,
    pub address: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NodeDirectory {
    nodes: HashMap<String, NodeEntry>,
}

impl NodeDirectory {
    pub fn new() -> Self {
        NodeDirectory { nodes: HashMap::new() }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = NodeEntry>) -> Self {
        let nodes = entries.into_iter().map(|e| (e.node_id.clone(), e)).collect();
        NodeDirectory { nodes }
    }

    pub fn insert(&mut self, entry: NodeEntry) {
        self.nodes.insert(entry.node_id.clone(), entry);
    }

    pub fn get(&self, node_id: &str) -> ClusterResult<&NodeEntry> {
        self.nodes.get(node_id).filter(|e| e.enabled).ok_or_else(|| ClusterError::UnknownNode(node_id.to_string()))
    }

    /// Every enabled node of `node_type`, in a stable order (`node_id`
    /// ascending) so that repeated calls with the same directory pick the
    /// same candidate set - callers that need to spread load across them
    /// (the client's peer selection) hash into this list deterministically.
    pub fn of_type(&self, node_type: &str) -> Vec<&NodeEntry> {
        let mut matches: Vec<&NodeEntry> = self.nodes.values().filter(|e| e.enabled && e.node_type == node_type).collect();
        matches.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        matches
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
