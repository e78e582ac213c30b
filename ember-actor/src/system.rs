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

//! The actor registry and dispatch loop. `ActorSystem` owns the process;
//! `ActorSystemHandle` is the cheap-to-clone reference every actor and
//! every external component (the connector, the cluster) actually holds -
//! the same split the tokio actor runtime this is modeled on uses.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tracing::{error, warn};

use crate::errors::{ActorError, Result};
use crate::events::{Event, EventBus};
use crate::handle::ActorHandle;
use crate::handler::{decode_args, encode_response, ActorHandler, BindingFn};
use crate::invocation::{ActorMessage, Args, InvokeOutcome, ReplySink};
use crate::mailbox::{self, DEFAULT_MAILBOX_BOUND};
use crate::path::ActorPath;

const FIND_CHILD_FN: &str = "$find_child";
const FIND_CHILD_TIMEOUT: Duration = Duration::from_secs(2);

type ActorFactory = Arc<dyn Fn(ActorPath, ActorSystemHandle) -> Result<ActorHandle> + Send + Sync>;

struct Inner {
    node_id: String,
    registry: DashMap<ActorPath, ActorHandle>,
    factories: DashMap<String, ActorFactory>,
    tasks: DashMap<ActorPath, tokio::task::AbortHandle>,
    events: EventBus,
}

#[derive(Clone)]
pub struct ActorSystemHandle(Arc<Inner>);

pub struct ActorContext {
    pub path: ActorPath,
    pub hsys: ActorSystemHandle,
}

impl ActorContext {
    pub fn lookup(&self, path: &ActorPath) -> Option<ActorHandle> {
        self.hsys.lookup(path)
    }

    pub fn post_event(&self, name: impl Into<String>, data: impl std::any::Any + Send + Sync) {
        self.hsys.post_event(Event::new(name, self.path.to_string(), data));
    }
}

/// Owns the process's actor registry. There is exactly one of these per
/// node; everything else holds an [`ActorSystemHandle`] clone.
pub struct ActorSystem {
    handle: ActorSystemHandle,
}

impl ActorSystem {
    pub fn new(node_id: impl Into<String>) -> Self {
        ActorSystem {
            handle: ActorSystemHandle(Arc::new(Inner {
                node_id: node_id.into(),
                registry: DashMap::new(),
                factories: DashMap::new(),
                tasks: DashMap::new(),
                events: EventBus::new(),
            })),
        }
    }

    pub fn handle(&self) -> ActorSystemHandle {
        self.handle.clone()
    }
}

impl ActorSystemHandle {
    pub fn node_id(&self) -> &str {
        &self.0.node_id
    }

    pub fn events(&self) -> &EventBus {
        &self.0.events
    }

    pub fn post_event(&self, event: Event) {
        self.0.events.post(event);
    }

    pub fn lookup(&self, path: &ActorPath) -> Option<ActorHandle> {
        self.0.registry.get(path).map(|e| e.clone())
    }

    /// Register a constructor for a lazily-created child of `actor_type`.
    /// Invoked by [`Self::get_or_spawn_child`] once the parent's
    /// `on_find_child` confirms the child should exist.
    pub fn register_factory(
        &self,
        actor_type: impl Into<String>,
        factory: impl Fn(ActorPath, ActorSystemHandle) -> Result<ActorHandle> + Send + Sync + 'static,
    ) {
        self.0.factories.insert(actor_type.into(), Arc::new(factory));
    }

    /// Spawn `state` as the actor living at `path`, returning a handle to
    /// its mailboxes. Binds `H::bindings()` once, up front.
    pub fn spawn_actor<H: ActorHandler>(&self, path: ActorPath, mut state: H) -> Result<ActorHandle> {
        let (senders, mut mailbox) = mailbox::channel(DEFAULT_MAILBOX_BOUND);
        let handle = ActorHandle::new(path.clone(), senders);
        self.0.registry.insert(path.clone(), handle.clone());

        let bindings: HashMap<&'static str, BindingFn<H>> = H::bindings().into_iter().map(|b| (b.func_name, b.call)).collect();
        let ctx = ActorContext { path: path.clone(), hsys: self.clone() };
        let sys = self.clone();
        let task_path = path.clone();

        let join = tokio::spawn(async move {
            state.on_init(&ctx);
            while let Some(msg) = mailbox.recv().await {
                if msg.func_name == FIND_CHILD_FN {
                    dispatch_find_child(&mut state, &ctx, msg);
                    continue;
                }
                dispatch_invocation(&mut state, &bindings, &ctx, msg);
            }
            state.on_stop(&ctx);
            sys.0.registry.remove(&task_path);
            sys.0.tasks.remove(&task_path);
        });
        self.0.tasks.insert(path, join.abort_handle());

        Ok(handle)
    }

    /// Marks an actor for shutdown: every `ActorHandle` clone still held
    /// anywhere (a connector cache, a cluster lookup) rejects further posts
    /// with `ActorStopped` immediately, and the actor's task is aborted so
    /// it stops polling its mailboxes right away rather than waiting for
    /// them to drain naturally.
    pub fn exit(&self, path: &ActorPath) {
        if let Some((_, handle)) = self.0.registry.remove(path) {
            handle.mark_stopped();
        }
        if let Some((_, abort)) = self.0.tasks.remove(path) {
            abort.abort();
        }
    }

    /// Resolve `path`, lazily spawning it through a registered factory if
    /// it names a not-yet-created child whose parent confirms it via
    /// `on_find_child`.
    pub async fn get_or_spawn_child(&self, path: &ActorPath) -> Result<ActorHandle> {
        if let Some(h) = self.lookup(path) {
            return Ok(h);
        }
        let child_id = path.child_id.as_ref().ok_or_else(|| ActorError::ActorNotFound(path.to_string()))?;
        let parent_path = path.parent().expect("child_id implies a parent path");
        let parent = self.lookup(&parent_path).ok_or_else(|| ActorError::ActorNotFound(parent_path.to_string()))?;

        if !ask_find_child(&parent, child_id, FIND_CHILD_TIMEOUT).await? {
            return Err(ActorError::ActorNotFound(path.to_string()));
        }

        let factory = self
            .0
            .factories
            .get(&path.actor_type)
            .map(|f| f.clone())
            .ok_or_else(|| ActorError::ActorNotFound(format!("no factory registered for actor type '{}'", path.actor_type)))?;

        factory(path.clone(), self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{bind, Binding};
    use crate::path::ActorPath;
    use serde::{Deserialize, Serialize};
    use std::time::Duration as StdDuration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Num(i32);

    struct Counter(i32);

    impl ActorHandler for Counter {
        fn bindings() -> Vec<Binding<Self>> {
            vec![bind("inc", |state: &mut Counter, arg: Num| {
                state.0 += arg.0;
                Ok(Num(state.0))
            })]
        }
    }

    #[tokio::test]
    async fn call_wait_local_round_trips_through_a_spawned_actor() {
        let sys = ActorSystem::new("n1");
        let path = ActorPath::new("n1", "counter", "1");
        let handle = sys.handle().spawn_actor(path.clone(), Counter(10)).unwrap();

        let caller = ActorPath::new("n1", "counter", "caller");
        let outcome = handle.call_wait_local(caller, "inc", Box::new(Num(5)), StdDuration::from_secs(1)).await.unwrap();
        match outcome {
            InvokeOutcome::Ok(bytes) => {
                let resp: Num = ember_proto::serializer::decode_json(&bytes).unwrap();
                assert_eq!(resp, Num(15));
            }
            InvokeOutcome::Err { .. } => panic!("expected Ok"),
        }
    }

    #[tokio::test]
    async fn call_wait_local_on_own_path_fails_immediately_with_self_call_deadlock() {
        let sys = ActorSystem::new("n1");
        let path = ActorPath::new("n1", "counter", "1");
        let handle = sys.handle().spawn_actor(path.clone(), Counter(0)).unwrap();

        let result = tokio::time::timeout(
            StdDuration::from_millis(50),
            handle.call_wait_local(path, "inc", Box::new(Num(1)), StdDuration::from_secs(30)),
        )
        .await
        .expect("must not block waiting for the scheduler tick");

        assert!(matches!(result, Err(ActorError::SelfCallDeadlock(_))));
    }

    #[tokio::test]
    async fn lookup_returns_none_for_an_unregistered_path() {
        let sys = ActorSystem::new("n1");
        assert!(sys.handle().lookup(&ActorPath::new("n1", "counter", "missing")).is_none());
    }

    #[tokio::test]
    async fn get_or_spawn_child_uses_on_find_child_and_the_registered_factory() {
        struct Parent;
        impl ActorHandler for Parent {
            fn bindings() -> Vec<Binding<Self>> {
                vec![]
            }
            fn on_find_child(&mut self, child_id: &str, _ctx: &ActorContext) -> bool {
                child_id == "inv"
            }
        }

        let sys = ActorSystem::new("n1");
        let hsys = sys.handle();
        let parent_path = ActorPath::new("n1", "player", "42");
        hsys.spawn_actor(parent_path.clone(), Parent).unwrap();
        hsys.register_factory("inventory", |path, hsys| hsys.spawn_actor(path, Counter(0)));

        let child_path = ActorPath { actor_type: "inventory".into(), child_id: Some("inv".into()), ..parent_path.clone() };
        let child = hsys.get_or_spawn_child(&child_path).await.unwrap();
        assert_eq!(child.path, child_path);
        assert!(hsys.lookup(&child_path).is_some());
    }

    #[tokio::test]
    async fn exit_marks_the_handle_stopped_and_unregisters_the_path() {
        let sys = ActorSystem::new("n1");
        let path = ActorPath::new("n1", "counter", "1");
        let handle = sys.handle().spawn_actor(path.clone(), Counter(0)).unwrap();

        sys.handle().exit(&path);

        assert!(sys.handle().lookup(&path).is_none());
        let err = handle.notify(ActorPath::new("n1", "counter", "caller"), "inc", Args::Typed(Box::new(Num(1))), false).await.unwrap_err();
        assert!(matches!(err, ActorError::ActorStopped(_)));
    }

    #[tokio::test]
    async fn get_or_spawn_child_fails_when_on_find_child_rejects() {
        struct Parent;
        impl ActorHandler for Parent {
            fn bindings() -> Vec<Binding<Self>> {
                vec![]
            }
            fn on_find_child(&mut self, _child_id: &str, _ctx: &ActorContext) -> bool {
                false
            }
        }

        let sys = ActorSystem::new("n1");
        let hsys = sys.handle();
        let parent_path = ActorPath::new("n1", "player", "42");
        hsys.spawn_actor(parent_path.clone(), Parent).unwrap();

        let child_path = ActorPath { actor_type: "inventory".into(), child_id: Some("inv".into()), ..parent_path.clone() };
        assert!(matches!(hsys.get_or_spawn_child(&child_path).await, Err(ActorError::ActorNotFound(_))));
    }
}

async fn ask_find_child(parent: &ActorHandle, child_id: &str, timeout: Duration) -> Result<bool> {
    use tokio::sync::oneshot;
    let (tx, rx) = oneshot::channel();
    let msg = ActorMessage {
        source: parent.path.clone(),
        target: parent.path.clone(),
        func_name: FIND_CHILD_FN.to_string(),
        args: Args::Typed(Box::new(child_id.to_string())),
        is_cluster: false,
        reply: ReplySink::Local(tx),
        session: None,
    };
    parent.post_system(msg).await?;
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(InvokeOutcome::Ok(bytes))) => Ok(decode_args::<bool>(Args::Encoded(bytes)).unwrap_or(false)),
        _ => Ok(false),
    }
}

fn dispatch_find_child<H: ActorHandler>(state: &mut H, ctx: &ActorContext, msg: ActorMessage) {
    let ActorMessage { args, reply, .. } = msg;
    let child_id = match args {
        Args::Typed(boxed) => boxed.downcast::<String>().map(|b| *b).unwrap_or_default(),
        Args::Encoded(_) => String::new(),
    };
    let found = state.on_find_child(&child_id, ctx);
    let outcome = encode_response(&found).map(InvokeOutcome::Ok).unwrap_or(InvokeOutcome::Ok(Bytes::new()));
    reply.send(outcome);
}

fn dispatch_invocation<H: ActorHandler>(state: &mut H, bindings: &HashMap<&'static str, BindingFn<H>>, ctx: &ActorContext, msg: ActorMessage) {
    let ActorMessage { func_name, args, reply, is_cluster, session, .. } = msg;

    let result = std::panic::catch_unwind(AssertUnwindSafe(|| match bindings.get(func_name.as_str()) {
        Some(binding) => (binding.call)(state, ctx, args, session.as_deref()),
        None => InvokeOutcome::Err { code: crate::invocation::CODE_UNKNOWN_ERROR, message: format!("unknown function '{func_name}'") },
    }));

    match result {
        Ok(outcome) => reply.send(outcome),
        Err(payload) => {
            let msg = crate::events::describe_panic(&*payload);
            error!(actor = %ctx.path, func = %func_name, panic = %msg, "handler panicked");
            match reply {
                ReplySink::Cluster(r) => r.reply(crate::invocation::CODE_RPC_REMOTE_EXECUTE_ERROR, Bytes::new()),
                ReplySink::Local(_) | ReplySink::None => {
                    if is_cluster {
                        warn!(actor = %ctx.path, "panicked invocation had no reply sink to report through");
                    }
                    // dropping the sender (if any) unblocks the caller with ReplyAbandoned
                    // instead of hanging until the CallWait timeout.
                }
            }
        }
    }
}
