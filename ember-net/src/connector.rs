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

//! The TCP accept loop, per-session reader/writer tasks, the handshake/
//! heartbeat state machine, and the heartbeat supervisor. WebSocket
//! connections (`ws.rs`) are accepted through `axum` but feed the exact
//! same [`process_packet`] state machine and share [`ConnectorConfig`].

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bytes::Bytes;
use ember_proto::dict::RouteDict;
use ember_proto::message::Message;
use ember_proto::packet::{Packet, PacketDecoder, PacketKind};
use ember_proto::route::Route;
use ember_proto::serializer::SerializerKind;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::{NetError, NetResult};
use crate::handler::HandlerComponent;
use crate::handshake::{build_handshake_packet, heartbeat_packet_bytes};
use crate::session::{Session, SessionRegistry, SessionStatus};

const READ_CHUNK: usize = 8 * 1024;
const OUT_CHANNEL_BOUND: usize = 256;

#[derive(Clone)]
pub struct ConnectorConfig {
    pub node_type: String,
    pub heartbeat_secs: u32,
    pub disconnect_on_timeout: bool,
    pub use_dict: bool,
    pub data_compression: bool,
    pub serializer: SerializerKind,
}

impl ConnectorConfig {
    fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs as u64 * 2)
    }
}

type CheckClientFn = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;
type HostFilterFn = Arc<dyn Fn(&SocketAddr) -> bool + Send + Sync>;

/// Hands a message whose route resolved to a different `nodeType` off to
/// the cluster. `ember-net` has no dependency on `ember-cluster`; the
/// `ember` binary wires a concrete implementation in at boot, keeping the
/// two crates' dependency direction one-way.
#[async_trait::async_trait]
pub trait RemoteForwarder: Send + Sync {
    async fn forward(&self, session_id: u64, route: &Route, msg: &Message) -> NetResult<()>;
}

/// Accept loop, session bookkeeping and the connection-level filters
/// (`BlackListFunc`, host filter, `CheckClient`) described in the
/// component design. One `Connector` per process; `ember-net`'s consumer
/// (the `ember` binary) owns it for the process lifetime.
pub struct Connector {
    config: ConnectorConfig,
    sessions: SessionRegistry,
    handler: HandlerComponent,
    handshake_bytes: Bytes,
    black_list: Arc<RwLock<HashSet<String>>>,
    host_filter: Option<HostFilterFn>,
    check_client: Option<CheckClientFn>,
    dict: RouteDict,
    remote_forward: Option<Arc<dyn RemoteForwarder>>,
}

impl Connector {
    pub fn new(config: ConnectorConfig, handler: HandlerComponent, dict: RouteDict) -> NetResult<Self> {
        let dict_map = if config.use_dict { Some(dict.as_map()) } else { None };
        let handshake_bytes = build_handshake_packet(config.heartbeat_secs, dict_map, config.serializer, config.data_compression)?;
        Ok(Connector {
            config,
            sessions: SessionRegistry::new(),
            handler,
            handshake_bytes,
            black_list: Arc::new(RwLock::new(HashSet::new())),
            host_filter: None,
            check_client: None,
            dict,
            remote_forward: None,
        })
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn set_remote_forwarder(&mut self, forwarder: Arc<dyn RemoteForwarder>) {
        self.remote_forward = Some(forwarder);
    }

    pub fn set_host_filter(&mut self, f: impl Fn(&SocketAddr) -> bool + Send + Sync + 'static) {
        self.host_filter = Some(Arc::new(f));
    }

    pub fn set_check_client(&mut self, f: impl Fn(&str, &str) -> bool + Send + Sync + 'static) {
        self.check_client = Some(Arc::new(f));
    }

    pub fn check_client(&self, node_type: &str, version: &str) -> bool {
        self.check_client.as_ref().map(|f| f(node_type, version)).unwrap_or(true)
    }

    fn is_blacklisted(&self, addr: &str) -> bool {
        self.black_list.read().unwrap().contains(addr)
    }

    fn is_host_allowed(&self, addr: &SocketAddr) -> bool {
        self.host_filter.as_ref().map(|f| f(addr)).unwrap_or(true)
    }

    /// Spawns a task that periodically invokes `refresh` (the
    /// `BlackListFunc`) and swaps in whatever list it returns.
    pub fn spawn_black_list_refresher(self: &Arc<Self>, interval: Duration, refresh: impl Fn() -> Vec<String> + Send + Sync + 'static) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let fresh: HashSet<String> = refresh().into_iter().collect();
                *this.black_list.write().unwrap() = fresh;
            }
        });
    }

    /// Runs the accept loop on `listener` until the task is aborted. Each
    /// accepted connection is rejected pre-session (black list, host
    /// filter) or spawns reader/writer tasks and enters `Start`.
    pub async fn accept_tcp(self: Arc<Self>, listener: TcpListener) -> NetResult<()> {
        loop {
            let (stream, remote_addr) = listener.accept().await?;
            if !self.is_host_allowed(&remote_addr) || self.is_blacklisted(&remote_addr.ip().to_string()) {
                info!(%remote_addr, "connection rejected by filter");
                continue;
            }
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.handle_tcp_connection(stream, remote_addr).await {
                    debug!(%remote_addr, error = %e, "session ended");
                }
            });
        }
    }

    async fn handle_tcp_connection(self: Arc<Self>, mut stream: TcpStream, remote_addr: SocketAddr) -> NetResult<()> {
        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(OUT_CHANNEL_BOUND);
        let session = self.sessions.create(remote_addr, out_tx);
        info!(session = session.id, %remote_addr, "session accepted");

        let (mut read_half, mut write_half) = stream.split();

        let writer = async {
            while let Some(bytes) = out_rx.recv().await {
                if write_half.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        };

        let reader = async {
            let mut decoder = PacketDecoder::new();
            let mut buf = [0u8; READ_CHUNK];
            loop {
                let n = match read_half.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(_) => break,
                };
                let packets = match decoder.push(&buf[..n]) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(session = session.id, error = %e, "malformed packet stream, closing session");
                        break;
                    }
                };
                for packet in packets {
                    if self.process_packet(&session, packet).await.is_err() {
                        return;
                    }
                }
            }
        };

        tokio::select! {
            _ = writer => {}
            _ = reader => {}
        }

        self.sessions.remove(session.id);
        Ok(())
    }

    /// The state-machine table from the component design. Shared between
    /// the TCP accept loop and the WebSocket upgrade handler.
    pub async fn process_packet(&self, session: &Arc<Session>, packet: Packet) -> NetResult<()> {
        match (session.status(), packet.kind) {
            (SessionStatus::Start, _) => {
                session.send(self.handshake_bytes.clone()).await?;
                session.transition(SessionStatus::WaitAck)?;
                debug!(session = session.id, "sent handshake response");
                Ok(())
            }
            (SessionStatus::WaitAck, PacketKind::HandshakeAck) => {
                session.transition(SessionStatus::Working)?;
                session.touch_heartbeat();
                debug!(session = session.id, "session now working");
                Ok(())
            }
            (SessionStatus::WaitAck, _) => {
                warn!(session = session.id, "out-of-order packet while waiting for handshake ack, closing");
                session.close();
                Err(NetError::BadHandshake(format!("session {} sent {:?} while WaitAck", session.id, packet.kind)))
            }
            (SessionStatus::Working, PacketKind::Heartbeat) => {
                session.touch_heartbeat();
                session.send(heartbeat_packet_bytes()?).await?;
                Ok(())
            }
            (SessionStatus::Working, PacketKind::Data) => self.dispatch_data(session, packet.payload).await,
            (SessionStatus::Working, PacketKind::Handshake | PacketKind::HandshakeAck) => {
                warn!(session = session.id, "handshake packet received while already working, closing");
                session.close();
                Err(NetError::BadHandshake(format!("session {} re-sent handshake while Working", session.id)))
            }
            (SessionStatus::Working, PacketKind::Kick) => {
                session.close();
                Ok(())
            }
            (SessionStatus::Closed, _) => Err(NetError::SessionClosed(session.id)),
        }
    }

    async fn dispatch_data(&self, session: &Arc<Session>, payload: Bytes) -> NetResult<()> {
        let msg = Message::decode(payload)?;
        let route_str = msg.route_str(&self.dict)?.to_string();
        let route = match Route::parse(&route_str) {
            Ok(r) => r,
            Err(e) => {
                warn!(session = session.id, route = %route_str, error = %e, "dropping message with unparseable route");
                return Ok(());
            }
        };
        if route.node_type.is_empty() {
            warn!(session = session.id, "dropping message with empty node_type");
            return Ok(());
        }

        if route.is_local(&self.config.node_type) {
            if let Err(e) = self.handler.in_handle(session, &route, &msg).await {
                warn!(session = session.id, route = %route, error = %e, "inbound dispatch failed");
            }
        } else if let Some(forwarder) = &self.remote_forward {
            if let Err(e) = forwarder.forward(session.id, &route, &msg).await {
                warn!(session = session.id, route = %route, error = %e, "remote forward failed");
            }
        } else {
            warn!(session = session.id, route = %route, "no remote forwarder configured, dropping remote-routed message");
        }
        Ok(())
    }

    /// Sweeps every live session once per `heartbeat_secs`, closing stale
    /// ones when `disconnect_on_timeout` or otherwise best-effort pinging
    /// them.
    pub fn spawn_heartbeat_supervisor(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(this.config.heartbeat_secs.max(1) as u64));
            loop {
                ticker.tick().await;
                let timeout = this.config.heartbeat_timeout();
                for session in this.sessions.snapshot() {
                    if session.status() == SessionStatus::Closed {
                        continue;
                    }
                    if session.is_heartbeat_stale(timeout) {
                        if this.config.disconnect_on_timeout {
                            warn!(session = session.id, "heartbeat timeout, closing session");
                            session.close();
                        } else if let Ok(bytes) = heartbeat_packet_bytes() {
                            let _ = session.try_send(bytes);
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerComponent;
    use ember_actor::system::ActorSystem;

    fn test_connector() -> Arc<Connector> {
        let sys = ActorSystem::new("node-1");
        let handler = HandlerComponent::new("game", sys.handle());
        let config = ConnectorConfig {
            node_type: "game".into(),
            heartbeat_secs: 30,
            disconnect_on_timeout: true,
            use_dict: false,
            data_compression: false,
            serializer: SerializerKind::Json,
        };
        Arc::new(Connector::new(config, handler, RouteDict::new()).unwrap())
    }

    fn new_session(connector: &Connector) -> (Arc<Session>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(16);
        (connector.sessions().create("127.0.0.1:1".parse().unwrap(), tx), rx)
    }

    #[tokio::test]
    async fn handshake_happy_path_reaches_working() {
        let connector = test_connector();
        let (session, mut rx) = new_session(&connector);

        connector.process_packet(&session, Packet::handshake(Bytes::new())).await.unwrap();
        assert_eq!(session.status(), SessionStatus::WaitAck);
        let sent = rx.recv().await.unwrap();
        let mut dec = PacketDecoder::new();
        let packets = dec.push(&sent).unwrap();
        assert_eq!(packets[0].kind, PacketKind::Handshake);

        connector.process_packet(&session, Packet::handshake_ack()).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Working);
    }

    #[tokio::test]
    async fn data_before_handshake_ack_closes_the_session() {
        let connector = test_connector();
        let (session, _rx) = new_session(&connector);

        connector.process_packet(&session, Packet::handshake(Bytes::new())).await.unwrap();
        let err = connector.process_packet(&session, Packet::data(Bytes::from_static(b"x"))).await;
        assert!(err.is_err());
        assert_eq!(session.status(), SessionStatus::Closed);
    }

    #[tokio::test]
    async fn heartbeat_in_working_state_echoes_and_refreshes() {
        let connector = test_connector();
        let (session, mut rx) = new_session(&connector);
        connector.process_packet(&session, Packet::handshake(Bytes::new())).await.unwrap();
        rx.recv().await.unwrap();
        connector.process_packet(&session, Packet::handshake_ack()).await.unwrap();

        connector.process_packet(&session, Packet::heartbeat()).await.unwrap();
        let sent = rx.recv().await.unwrap();
        let mut dec = PacketDecoder::new();
        assert_eq!(dec.push(&sent).unwrap()[0].kind, PacketKind::Heartbeat);
    }

    #[tokio::test]
    async fn unknown_node_type_route_is_dropped_without_a_frame() {
        let connector = test_connector();
        let (session, mut rx) = new_session(&connector);
        connector.process_packet(&session, Packet::handshake(Bytes::new())).await.unwrap();
        rx.recv().await.unwrap();
        connector.process_packet(&session, Packet::handshake_ack()).await.unwrap();

        let msg = Message::notify("missing.svc.fn", Bytes::new());
        connector.process_packet(&session, Packet::data(msg.encode().freeze())).await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
