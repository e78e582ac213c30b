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

//! Boot configuration. One RON file describes every node in the cluster;
//! `--node-id` picks which entry this process boots as. The rest of the
//! file becomes the node directory `ember-cluster` consults for outbound
//! RPC - there is no separate discovery step, per the component design's
//! "declarative list ... loaded at boot".

use std::path::Path;

use ember_cluster::directory::{NodeDirectory, NodeEntry};
use ember_net::connector::ConnectorConfig;
use ember_proto::serializer::SerializerKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(String, std::io::Error),

    #[error("malformed RON config: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("node id '{0}' is not present in the cluster config")]
    UnknownNodeId(String),

    #[error("node '{0}' is disabled in the cluster config")]
    NodeDisabled(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerName {
    Json,
    Protobuf,
}

impl From<SerializerName> for SerializerKind {
    fn from(name: SerializerName) -> Self {
        match name {
            SerializerName::Json => SerializerKind::Json,
            SerializerName::Protobuf => SerializerKind::Protobuf,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One node's full boot profile: cluster directory fields (`node_type`,
/// `address`, `enabled`) plus the connector settings only that node's own
/// process needs (`listen_tcp`/`listen_ws`/heartbeat/etc).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeProfile {
    pub node_id: String,
    pub node_type: String,
    /// Address this node's cluster RPC server listens on and that peers
    /// dial to reach it.
    pub address: String,
    pub listen_tcp: Option<String>,
    pub listen_ws: Option<String>,
    pub heartbeat_secs: u32,
    pub disconnect_on_timeout: bool,
    pub use_dict: bool,
    pub data_compression: bool,
    pub serializer: SerializerName,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl NodeProfile {
    pub fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig {
            node_type: self.node_type.clone(),
            heartbeat_secs: self.heartbeat_secs,
            disconnect_on_timeout: self.disconnect_on_timeout,
            use_dict: self.use_dict,
            data_compression: self.data_compression,
            serializer: self.serializer.into(),
        }
    }

    fn directory_entry(&self) -> NodeEntry {
        NodeEntry { node_id: self.node_id.clone(), node_type: self.node_type.clone(), address: self.address.clone(), enabled: self.enabled }
    }
}

/// The whole cluster, as declared in one RON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub nodes: Vec<NodeProfile>,
}

impl ClusterConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
        Ok(ron::de::from_bytes(&bytes)?)
    }

    /// The profile this process boots as. Rejects an unknown or disabled
    /// `node_id` - both are fatal boot-time conditions, per the error
    /// handling design's "unknown node_id in the directory".
    pub fn node(&self, node_id: &str) -> ConfigResult<&NodeProfile> {
        let profile = self.nodes.iter().find(|n| n.node_id == node_id).ok_or_else(|| ConfigError::UnknownNodeId(node_id.to_string()))?;
        if !profile.enabled {
            return Err(ConfigError::NodeDisabled(node_id.to_string()));
        }
        Ok(profile)
    }

    pub fn directory(&self) -> NodeDirectory {
        NodeDirectory::from_entries(self.nodes.iter().map(NodeProfile::directory_entry))
    }
}
