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

//! Cross-node RPC: a static node directory, a hand-derived `prost`
//! envelope, and a client/server pair that speak it over the same
//! length-prefixed framing. [`remote::ClusterForwarder`] is the seam that
//! plugs this crate into `ember-net`'s connector without `ember-net` ever
//! depending on `ember-cluster` directly.

pub mod client;
pub mod directory;
pub mod errors;
pub mod framing;
pub mod proto;
pub mod remote;
pub mod server;

pub mod prelude {
    pub use crate::client::ClusterClient;
    pub use crate::directory::{NodeDirectory, NodeEntry};
    pub use crate::errors::{ClusterError, ClusterResult};
    pub use crate::remote::ClusterForwarder;
    pub use crate::server::ClusterServer;
}
