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

//! Outbound RPC. One lazily-connected, lazily-reconnected [`PeerConnection`]
//! per peer node, each with its own correlation table so many calls can be
//! in flight on the same socket at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::directory::NodeDirectory;
use crate::errors::{ClusterError, ClusterResult};
use crate::framing;
use crate::proto;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);
const OUT_CHANNEL_BOUND: usize = 256;

struct PeerConnection {
    out_tx: mpsc::Sender<proto::Request>,
    pending: Arc<DashMap<u64, oneshot::Sender<proto::Response>>>,
}

impl PeerConnection {
    async fn connect(node_id: String, address: &str) -> ClusterResult<Arc<Self>> {
        let stream = TcpStream::connect(address).await.map_err(|e| ClusterError::Connect(node_id.clone(), e.to_string()))?;
        let (mut read_half, mut write_half) = stream.into_split();
        let pending: Arc<DashMap<u64, oneshot::Sender<proto::Response>>> = Arc::new(DashMap::new());
        let (out_tx, mut out_rx) = mpsc::channel::<proto::Request>(OUT_CHANNEL_BOUND);

        tokio::spawn(async move {
            while let Some(req) = out_rx.recv().await {
                if framing::write_frame(&mut write_half, &req).await.is_err() {
                    break;
                }
            }
        });

        let reader_pending = pending.clone();
        let reader_node_id = node_id.clone();
        tokio::spawn(async move {
            loop {
                match framing::read_frame::<_, proto::Response>(&mut read_half).await {
                    Ok(Some(resp)) => {
                        if let Some((_, tx)) = reader_pending.remove(&resp.correlation_id) {
                            let _ = tx.send(resp);
                        }
                    }
                    _ => break,
                }
            }
            // the connection is gone; every caller still parked on this
            // table would otherwise hang until its own timeout fires.
            let stuck: Vec<u64> = reader_pending.iter().map(|e| *e.key()).collect();
            for id in stuck {
                reader_pending.remove(&id);
            }
            debug!(node_id = %reader_node_id, "cluster peer connection reader exited");
        });

        Ok(Arc::new(PeerConnection { out_tx, pending }))
    }
}

/// Outbound cluster RPC client. One per process; shared behind an `Arc`
/// between `ember-net`'s connector (via [`crate::remote::ClusterForwarder`])
/// and anything else in the `ember` binary that needs to call a remote
/// actor directly.
pub struct ClusterClient {
    own_node_id: String,
    directory: NodeDirectory,
    peers: DashMap<String, Arc<PeerConnection>>,
    next_correlation: AtomicU64,
    call_timeout: Duration,
}

impl ClusterClient {
    pub fn new(own_node_id: impl Into<String>, directory: NodeDirectory) -> Self {
        ClusterClient { own_node_id: own_node_id.into(), directory, peers: DashMap::new(), next_correlation: AtomicU64::new(1), call_timeout: DEFAULT_CALL_TIMEOUT }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn own_node_id(&self) -> &str {
        &self.own_node_id
    }

    pub fn directory(&self) -> &NodeDirectory {
        &self.directory
    }

    /// Pick a node of `node_type` deterministically from `key` (a session
    /// id, typically), so repeated calls for the same caller keep landing
    /// on the same peer while different callers spread across the pool.
    pub fn pick_node(&self, node_type: &str, key: u64) -> ClusterResult<String> {
        let candidates = self.directory.of_type(node_type);
        if candidates.is_empty() {
            return Err(ClusterError::NoNodeOfType(node_type.to_string()));
        }
        let idx = (key as usize) % candidates.len();
        Ok(candidates[idx].node_id.clone())
    }

    async fn peer(&self, node_id: &str) -> ClusterResult<Arc<PeerConnection>> {
        if let Some(p) = self.peers.get(node_id) {
            return Ok(p.clone());
        }
        let entry = self.directory.get(node_id)?.clone();
        let conn = PeerConnection::connect(node_id.to_string(), &entry.address).await?;
        self.peers.insert(node_id.to_string(), conn.clone());
        Ok(conn)
    }

    /// Send a `Request` and wait up to `call_timeout` for its `Response`.
    pub async fn call(&self, node_id: &str, source: String, target: String, func_name: String, args: Bytes) -> ClusterResult<(i32, Bytes)> {
        let peer = self.peer(node_id).await?;
        let correlation_id = self.next_correlation.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        peer.pending.insert(correlation_id, tx);

        let req = proto::Request { source, target, func_name, args: args.to_vec(), correlation_id };
        if peer.out_tx.send(req).await.is_err() {
            peer.pending.remove(&correlation_id);
            self.peers.remove(node_id);
            return Err(ClusterError::Timeout(node_id.to_string()));
        }

        // per §4.6, connection loss while a caller is parked is surfaced the
        // same way a timeout is: the caller has no way to distinguish "the
        // reply never came because the peer died" from "it never came in time".
        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(resp)) => Ok((resp.code, Bytes::from(resp.data))),
            Ok(Err(_)) => {
                self.peers.remove(node_id);
                Err(ClusterError::Timeout(node_id.to_string()))
            }
            Err(_) => {
                peer.pending.remove(&correlation_id);
                Err(ClusterError::Timeout(node_id.to_string()))
            }
        }
    }

    /// Fire-and-forget: `correlation_id` 0 tells the peer not to bother
    /// replying.
    pub async fn notify(&self, node_id: &str, source: String, target: String, func_name: String, args: Bytes) -> ClusterResult<()> {
        let peer = self.peer(node_id).await?;
        let req = proto::Request { source, target, func_name, args: args.to_vec(), correlation_id: 0 };
        peer.out_tx.send(req).await.map_err(|_| ClusterError::Timeout(node_id.to_string()))
    }
}
