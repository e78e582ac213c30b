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

//! Registers route `handlerName` -> actor bindings and delivers decoded
//! inbound messages to the owning actor's local mailbox. This is the
//! in-process analogue of `cherryHandler.HandlerComponent`'s `InHandle`.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use ember_actor::invocation::{ClusterReply, ReplySink};
use ember_actor::path::ActorPath;
use ember_actor::system::ActorSystemHandle;
use ember_proto::message::{Message, MessageType};
use ember_proto::route::Route;
use tracing::{debug, warn};

use crate::errors::{NetError, NetResult};
use crate::session::Session;

type Resolver = Arc<dyn Fn(&Session, &str) -> ActorPath + Send + Sync>;

/// Maps a route's `handlerName` segment to a resolver that turns a session
/// plus the route's `method` into the concrete [`ActorPath`] that owns it.
/// Registered once per handler at boot, by the application wiring code.
#[derive(Clone)]
pub struct HandlerComponent {
    own_node_type: String,
    hsys: ActorSystemHandle,
    resolvers: Arc<DashMap<String, Resolver>>,
}

impl HandlerComponent {
    pub fn new(own_node_type: impl Into<String>, hsys: ActorSystemHandle) -> Self {
        HandlerComponent { own_node_type: own_node_type.into(), hsys, resolvers: Arc::new(DashMap::new()) }
    }

    pub fn register(&self, handler_name: impl Into<String>, resolver: impl Fn(&Session, &str) -> ActorPath + Send + Sync + 'static) {
        self.resolvers.insert(handler_name.into(), Arc::new(resolver));
    }

    /// Deliver a decoded Data-packet message to its target actor. Called
    /// from the connector's per-session reader task once a Working-status
    /// session has produced a `Message` with a route that resolves local.
    pub async fn in_handle(&self, session: &Arc<Session>, route: &Route, msg: &Message) -> NetResult<()> {
        if !route.is_local(&self.own_node_type) {
            return Err(NetError::Rejected(format!("route '{route}' is not local to node type '{}'", self.own_node_type)));
        }

        let resolver = self
            .resolvers
            .get(&route.handler)
            .map(|r| r.clone())
            .ok_or_else(|| NetError::Rejected(format!("no handler registered for '{}'", route.handler)))?;

        let target = resolver(session, &route.method);
        let actor = match self.hsys.lookup(&target) {
            Some(a) => a,
            None => self.hsys.get_or_spawn_child(&target).await.map_err(NetError::Actor)?,
        };

        let reply = match msg.msg_type {
            MessageType::Request => ReplySink::Cluster(Box::new(SessionReply { session: session.clone(), id: msg.id })),
            MessageType::Notify | MessageType::Push | MessageType::Response => ReplySink::None,
        };

        let source = ActorPath::new(self.hsys.node_id(), "session", session.id.to_string());
        debug!(session = session.id, route = %route, target = %target, "dispatching inbound message");
        let session_ctx: Arc<dyn ember_actor::invocation::SessionContext> = session.clone();
        actor.deliver_local(source, route.method.clone(), msg.data.clone(), reply, Some(session_ctx)).await.map_err(NetError::Actor)
    }
}

/// Writes an invocation's final `(code, data)` back onto the originating
/// session as a `Response` message carrying the same request id. Errors
/// surface to the client as an empty-body response - the wire `Message`
/// format has no error-code slot of its own, so a non-zero code is only
/// observable as a log entry on the server side plus an empty payload on
/// the client (see DESIGN.md for the rationale).
struct SessionReply {
    session: Arc<Session>,
    id: u32,
}

impl ClusterReply for SessionReply {
    fn reply(self: Box<Self>, code: i32, data: Bytes) {
        let body = if code == ember_actor::invocation::CODE_OK { data } else { Bytes::new() };
        let response = Message::response(self.id, "", body);
        let packet = ember_proto::packet::Packet::data(response.encode().freeze());
        match packet.to_bytes() {
            Ok(bytes) => {
                if self.session.try_send(bytes).is_err() {
                    warn!(session = self.session.id, "dropped response, session channel is full or closed");
                }
            }
            Err(e) => warn!(session = self.session.id, error = %e, "failed to encode response packet"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRegistry;
    use ember_actor::system::ActorSystem;
    use ember_proto::route::Route;

    fn new_session() -> (Arc<Session>, tokio::sync::mpsc::Receiver<Bytes>) {
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        let registry = SessionRegistry::new();
        (registry.create("127.0.0.1:9000".parse().unwrap(), tx), rx)
    }

    #[tokio::test]
    async fn in_handle_rejects_a_route_whose_node_type_is_not_local() {
        let sys = ActorSystem::new("n1");
        let hc = HandlerComponent::new("game", sys.handle());
        let (session, _rx) = new_session();
        let route = Route::new("other", "chat", "send");
        let msg = Message::notify("other.chat.send", Bytes::new());

        let err = hc.in_handle(&session, &route, &msg).await.unwrap_err();
        assert!(matches!(err, NetError::Rejected(_)));
    }

    #[tokio::test]
    async fn in_handle_rejects_an_unregistered_handler_name() {
        let sys = ActorSystem::new("n1");
        let hc = HandlerComponent::new("game", sys.handle());
        let (session, _rx) = new_session();
        let route = Route::new("game", "chat", "send");
        let msg = Message::notify("game.chat.send", Bytes::new());

        let err = hc.in_handle(&session, &route, &msg).await.unwrap_err();
        assert!(matches!(err, NetError::Rejected(_)));
    }

    #[tokio::test]
    async fn in_handle_delivers_a_notify_to_the_resolved_actor() {
        use ember_actor::handler::{bind_notify, Binding};
        use ember_actor::path::ActorPath;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc as StdArc;

        struct Chat(StdArc<AtomicBool>);
        impl ember_actor::handler::ActorHandler for Chat {
            fn bindings() -> Vec<Binding<Self>> {
                vec![bind_notify("send", |state: &mut Chat, _arg: ()| {
                    state.0.store(true, Ordering::SeqCst);
                })]
            }
        }

        let sys = ActorSystem::new("n1");
        let hsys = sys.handle();
        let chat_path = ActorPath::new("n1", "chat", "lobby");
        let delivered = StdArc::new(AtomicBool::new(false));
        hsys.spawn_actor(chat_path.clone(), Chat(delivered.clone())).unwrap();

        let hc = HandlerComponent::new("game", hsys.clone());
        let resolved = chat_path.clone();
        hc.register("chat", move |_session, _method| resolved.clone());

        let (session, _rx) = new_session();
        let route = Route::new("game", "chat", "send");
        let msg = Message::notify("game.chat.send", ember_actor::handler::encode_response(&()).unwrap());

        hc.in_handle(&session, &route, &msg).await.unwrap();
        // give the spawned actor task a chance to drain its mailbox
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(delivered.load(Ordering::SeqCst));
    }
}
