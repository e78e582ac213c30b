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

use thiserror::Error;

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("unknown node id '{0}'")]
    UnknownNode(String),

    #[error("no node of type '{0}' is registered in the directory")]
    NoNodeOfType(String),

    #[error("rpc to node '{0}' timed out")]
    Timeout(String),

    #[error("connection to node '{0}' failed: {1}")]
    Connect(String, String),

    #[error("protocol error: {0}")]
    Proto(#[from] ember_proto::errors::ProtoError),

    #[error("actor error: {0}")]
    Actor(#[from] ember_actor::errors::ActorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
