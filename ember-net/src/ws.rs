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

//! WebSocket transport: an `axum` upgrade route that feeds the same
//! [`Connector::process_packet`] state machine the TCP listener drives.
//! Remote-address resolution follows the first-non-empty-of header chain
//! from the component design, falling back to the raw peer address.

use std::net::SocketAddr;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use ember_proto::packet::PacketDecoder;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::connector::Connector;

const OUT_CHANNEL_BOUND: usize = 256;

/// Headers examined in order for the real client address, per the
/// component design's forwarded-address chain. The raw peer address is
/// used when none carry a non-empty value (the "always fall back"
/// variant chosen in DESIGN.md).
const FORWARD_HEADERS: [&str; 3] = ["x-original-forwarded-for", "x-forwarded-for", "x-real-ip"];

pub fn remote_addr_of(headers: &HeaderMap, peer: SocketAddr) -> SocketAddr {
    for name in FORWARD_HEADERS {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            if let Some(first) = value.split(',').map(str::trim).find(|s| !s.is_empty()) {
                if let Ok(ip) = first.parse() {
                    return SocketAddr::new(ip, peer.port());
                }
            }
        }
    }
    peer
}

/// Build the `/ws` route. The returned router expects to be merged into
/// an `axum` app that is served `into_make_service_with_connect_info`.
pub fn router(connector: Arc<Connector>) -> Router {
    Router::new().route(
        "/ws",
        get(move |ws: WebSocketUpgrade, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap| {
            let connector = connector.clone();
            async move {
                let remote_addr = remote_addr_of(&headers, peer);
                ws.on_upgrade(move |socket| handle_socket(socket, remote_addr, connector))
            }
        }),
    )
}

async fn handle_socket(socket: WebSocket, remote_addr: SocketAddr, connector: Arc<Connector>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(OUT_CHANNEL_BOUND);
    let session = connector.sessions().create(remote_addr, out_tx);
    debug!(session = session.id, %remote_addr, "websocket session accepted");

    let writer = async {
        while let Some(bytes) = out_rx.recv().await {
            if ws_tx.send(WsMessage::Binary(bytes)).await.is_err() {
                break;
            }
        }
    };

    let reader = async {
        let mut decoder = PacketDecoder::new();
        while let Some(Ok(msg)) = ws_rx.next().await {
            let chunk = match msg {
                WsMessage::Binary(b) => b,
                WsMessage::Close(_) => break,
                _ => continue,
            };
            let packets = match decoder.push(&chunk) {
                Ok(p) => p,
                Err(e) => {
                    warn!(session = session.id, error = %e, "malformed websocket frame, closing session");
                    break;
                }
            };
            for packet in packets {
                if connector.process_packet(&session, packet).await.is_err() {
                    return;
                }
            }
        }
    };

    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }

    connector.sessions().remove(session.id);
}
