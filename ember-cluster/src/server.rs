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

//! Inbound RPC: accepts peer connections, decodes length-prefixed
//! `Request` frames, and posts each one to its target actor's `call`
//! mailbox via `ActorHandle::call_remote`. One connection can carry many
//! requests in flight; each is dispatched on its own task so a slow
//! handler never blocks the next frame from being read.

use std::sync::Arc;

use bytes::Bytes;
use ember_actor::invocation::{Args, ClusterReply, CODE_UNKNOWN_ERROR};
use ember_actor::path::ActorPath;
use ember_actor::system::ActorSystemHandle;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::ClusterResult;
use crate::framing::{read_frame, write_frame};
use crate::proto::{Request, Response};

const OUT_CHANNEL_BOUND: usize = 256;

/// Listens for peer connections on behalf of one node. Holds nothing but
/// the actor system handle - the node directory and outbound side of the
/// cluster live in [`crate::client::ClusterClient`].
pub struct ClusterServer {
    hsys: ActorSystemHandle,
}

impl ClusterServer {
    pub fn new(hsys: ActorSystemHandle) -> Self {
        ClusterServer { hsys }
    }

    pub async fn accept_tcp(self: Arc<Self>, listener: TcpListener) -> ClusterResult<()> {
        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.handle_connection(stream).await {
                    debug!(%peer_addr, error = %e, "cluster connection ended");
                }
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> ClusterResult<()> {
        let (mut read_half, mut write_half) = stream.into_split();
        let (out_tx, mut out_rx) = mpsc::channel::<Response>(OUT_CHANNEL_BOUND);

        let writer = tokio::spawn(async move {
            while let Some(resp) = out_rx.recv().await {
                if write_frame(&mut write_half, &resp).await.is_err() {
                    break;
                }
            }
        });

        loop {
            match read_frame::<_, Request>(&mut read_half).await {
                Ok(Some(req)) => self.dispatch(req, out_tx.clone()),
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "cluster read loop ended");
                    break;
                }
            }
        }

        drop(out_tx);
        let _ = writer.await;
        Ok(())
    }

    /// Resolves the target actor and posts the call, spawned off the read
    /// loop so one slow handler can't stall the rest of the connection.
    fn dispatch(&self, req: Request, out_tx: mpsc::Sender<Response>) {
        let hsys = self.hsys.clone();
        tokio::spawn(async move {
            let target = match ActorPath::parse(&req.target) {
                Some(p) => p,
                None => {
                    warn!(target = %req.target, "malformed target path on inbound cluster request");
                    reject(&out_tx, req.correlation_id);
                    return;
                }
            };

            let actor = match hsys.lookup(&target) {
                Some(a) => a,
                None => match hsys.get_or_spawn_child(&target).await {
                    Ok(a) => a,
                    Err(e) => {
                        warn!(target = %target, error = %e, "cluster request target not found");
                        reject(&out_tx, req.correlation_id);
                        return;
                    }
                },
            };

            let source = ActorPath::parse(&req.source).unwrap_or_else(|| ActorPath::new("unknown", "unknown", "unknown"));
            let args = Bytes::from(req.args);

            if req.correlation_id == 0 {
                if let Err(e) = actor.notify(source, req.func_name, Args::Encoded(args), true).await {
                    warn!(target = %target, error = %e, "failed to post cluster notify");
                }
            } else {
                let reply: Box<dyn ClusterReply> = Box::new(ReplyOverConnection { out_tx, correlation_id: req.correlation_id });
                if let Err(e) = actor.call_remote(source, req.func_name, args, reply).await {
                    warn!(target = %target, error = %e, "failed to post cluster call");
                }
            }
        });
    }
}

fn reject(out_tx: &mpsc::Sender<Response>, correlation_id: u64) {
    if correlation_id != 0 {
        let _ = out_tx.try_send(Response { code: CODE_UNKNOWN_ERROR, data: Vec::new(), correlation_id });
    }
}

struct ReplyOverConnection {
    out_tx: mpsc::Sender<Response>,
    correlation_id: u64,
}

impl ClusterReply for ReplyOverConnection {
    fn reply(self: Box<Self>, code: i32, data: Bytes) {
        let _ = self.out_tx.try_send(Response { code, data: data.to_vec(), correlation_id: self.correlation_id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{read_frame, write_frame};
    use ember_actor::handler::{bind, ActorHandler, Binding};
    use ember_actor::system::ActorSystem;
    use tokio::net::TcpListener;

    struct Echo;

    impl ActorHandler for Echo {
        fn bindings() -> Vec<Binding<Self>> {
            vec![bind("echo", |_state: &mut Echo, args: String| -> Result<String, String> { Ok(args) })]
        }
    }

    #[tokio::test]
    async fn inbound_request_reaches_the_actor_and_replies() {
        let sys = ActorSystem::new("node-2");
        let hsys = sys.handle();
        hsys.spawn_actor(ActorPath::new("node-2", "echo", "1"), Echo).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(ClusterServer::new(hsys));
        tokio::spawn(server.accept_tcp(listener));

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (mut read_half, mut write_half) = stream.into_split();
        let payload = serde_json::to_vec("ping").unwrap();
        let req = Request { source: "node-1/session/1".into(), target: "node-2/echo/1".into(), func_name: "echo".into(), args: payload.clone(), correlation_id: 9 };
        write_frame(&mut write_half, &req).await.unwrap();

        let resp: Response = read_frame(&mut read_half).await.unwrap().unwrap();
        assert_eq!(resp.correlation_id, 9);
        assert_eq!(resp.data, payload);
    }

    #[tokio::test]
    async fn request_for_an_unknown_target_gets_an_error_response() {
        let sys = ActorSystem::new("node-2");
        let server = Arc::new(ClusterServer::new(sys.handle()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server.accept_tcp(listener));

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (mut read_half, mut write_half) = stream.into_split();
        let req = Request { source: "node-1/session/1".into(), target: "node-2/ghost/1".into(), func_name: "echo".into(), args: vec![], correlation_id: 3 };
        write_frame(&mut write_half, &req).await.unwrap();

        let resp: Response = read_frame(&mut read_half).await.unwrap().unwrap();
        assert_eq!(resp.code, CODE_UNKNOWN_ERROR);
        assert_eq!(resp.correlation_id, 3);
    }
}
