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

//! Implements `ember_net::connector::RemoteForwarder` on top of
//! [`ClusterClient`], closing the loop the connector leaves open: a route
//! whose `nodeType` isn't this process's own is handed here, sent across
//! the cluster, and - for a `Request` - its eventual `Response` is written
//! back onto the originating session exactly the way a local handler's
//! reply would be.

use std::sync::Arc;

use bytes::Bytes;
use ember_net::connector::RemoteForwarder;
use ember_net::errors::{NetError, NetResult};
use ember_net::session::SessionRegistry;
use ember_proto::message::{Message, MessageType};
use ember_proto::packet::Packet;
use ember_proto::route::Route;
use tracing::warn;

use crate::client::ClusterClient;

pub struct ClusterForwarder {
    client: Arc<ClusterClient>,
    sessions: SessionRegistry,
}

impl ClusterForwarder {
    pub fn new(client: Arc<ClusterClient>, sessions: SessionRegistry) -> Self {
        ClusterForwarder { client, sessions }
    }

    fn resolve_node_id(&self, route: &Route, session_id: u64) -> NetResult<String> {
        if let Some(server_id) = &route.server_id {
            self.client.directory().get(server_id).map(|e| e.node_id.clone()).map_err(|e| NetError::Rejected(e.to_string()))
        } else {
            self.client.pick_node(&route.node_type, session_id).map_err(|e| NetError::Rejected(e.to_string()))
        }
    }
}

#[async_trait::async_trait]
impl RemoteForwarder for ClusterForwarder {
    async fn forward(&self, session_id: u64, route: &Route, msg: &Message) -> NetResult<()> {
        let node_id = self.resolve_node_id(route, session_id)?;
        let source = format!("{}/session/{}", self.client.own_node_id(), session_id);
        let target = route.to_string();

        match msg.msg_type {
            MessageType::Request => {
                let id = msg.id;
                let client = self.client.clone();
                let sessions = self.sessions.clone();
                let data = msg.data.clone();
                let func_name = route.method.clone();
                tokio::spawn(async move {
                    match client.call(&node_id, source, target, func_name, data).await {
                        Ok((code, reply_data)) => {
                            let body = if code == ember_actor::invocation::CODE_OK { reply_data } else { Bytes::new() };
                            let response = Message::response(id, "", body);
                            match Packet::data(response.encode().freeze()).to_bytes() {
                                Ok(bytes) => {
                                    if let Some(session) = sessions.get(session_id) {
                                        if session.try_send(bytes).is_err() {
                                            warn!(session = session_id, "dropped cluster response, session channel full or closed");
                                        }
                                    }
                                }
                                Err(e) => warn!(session = session_id, error = %e, "failed to encode cluster response packet"),
                            }
                        }
                        Err(e) => warn!(session = session_id, node = %node_id, error = %e, "cluster rpc failed"),
                    }
                });
                Ok(())
            }
            MessageType::Notify | MessageType::Push => {
                self.client.notify(&node_id, source, target, route.method.clone(), msg.data.clone()).await.map_err(|e| NetError::Rejected(e.to_string()))
            }
            MessageType::Response => {
                warn!(session = session_id, "dropping client-originated Response message, nothing to correlate it to");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{NodeDirectory, NodeEntry};
    use crate::framing;
    use tokio::net::TcpListener;

    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut read_half, mut write_half) = stream.into_split();
            loop {
                match framing::read_frame::<_, crate::proto::Request>(&mut read_half).await {
                    Ok(Some(req)) => {
                        if req.correlation_id != 0 {
                            let resp = crate::proto::Response { code: 0, data: req.args, correlation_id: req.correlation_id };
                            if framing::write_frame(&mut write_half, &resp).await.is_err() {
                                break;
                            }
                        }
                    }
                    _ => break,
                }
            }
        });
        addr
    }

    async fn forwarder(address: String) -> (ClusterForwarder, SessionRegistry) {
        let dir = NodeDirectory::from_entries([NodeEntry { node_id: "node-2".into(), node_type: "chat".into(), address, enabled: true }]);
        let client = Arc::new(ClusterClient::new("node-1", dir));
        let sessions = SessionRegistry::new();
        (ClusterForwarder::new(client, sessions.clone()), sessions)
    }

    #[tokio::test]
    async fn forward_of_a_request_writes_the_cluster_response_back_onto_the_session() {
        let address = echo_server().await;
        let (fwd, sessions) = forwarder(address).await;
        let (out_tx, mut out_rx) = tokio::sync::mpsc::channel(4);
        let session = sessions.create("127.0.0.1:1".parse().unwrap(), out_tx);

        let route = Route::new("chat", "room", "say");
        let msg = Message::request(7, "chat.room.say", Bytes::from_static(b"hi"));
        fwd.forward(session.id, &route, &msg).await.unwrap();

        let bytes = tokio::time::timeout(std::time::Duration::from_secs(1), out_rx.recv()).await.unwrap().unwrap();
        let mut decoder = ember_proto::packet::PacketDecoder::new();
        let packets = decoder.push(&bytes).unwrap();
        let packet = packets.into_iter().next().unwrap();
        let decoded = Message::decode(packet.payload).unwrap();
        assert_eq!(decoded.msg_type, MessageType::Response);
        assert_eq!(decoded.id, 7);
    }

    #[tokio::test]
    async fn forward_of_a_notify_sends_without_waiting_for_a_reply() {
        let address = echo_server().await;
        let (fwd, sessions) = forwarder(address).await;
        let (out_tx, _out_rx) = tokio::sync::mpsc::channel(4);
        let session = sessions.create("127.0.0.1:1".parse().unwrap(), out_tx);

        let route = Route::new("chat", "room", "say");
        let msg = Message::notify("chat.room.say", Bytes::from_static(b"hi"));
        fwd.forward(session.id, &route, &msg).await.unwrap();
    }

    #[tokio::test]
    async fn forward_to_an_unknown_node_type_fails() {
        let (fwd, sessions) = forwarder("127.0.0.1:1".to_string()).await;
        let (out_tx, _out_rx) = tokio::sync::mpsc::channel(4);
        let session = sessions.create("127.0.0.1:1".parse().unwrap(), out_tx);

        let route = Route::new("missing", "room", "say");
        let msg = Message::notify("missing.room.say", Bytes::new());
        assert!(fwd.forward(session.id, &route, &msg).await.is_err());
    }
}
