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

//! The message an actor's mailbox carries, the two argument shapes it can
//! hold, and the reply plumbing that lets a caller await a result without
//! the runtime caring whether the caller is local or across the cluster.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::path::ActorPath;

/// A connector-originated connection, blind to its transport. `ember-net`'s
/// `Session` implements this so a local handler binding can read or bind the
/// caller's uid without `ember-actor` depending on `ember-net`. Only
/// connector-delivered local invocations carry one - cluster-originated and
/// actor-to-actor calls never do.
pub trait SessionContext: Send + Sync {
    fn session_id(&self) -> u64;
    fn uid(&self) -> u64;
    fn bind_uid(&self, uid: u64);
}

/// Local calls hand the invoker a concrete, already-typed value so the
/// common case never pays a serialize/deserialize round trip; only a
/// cluster-originated call carries raw bytes that the invoker decodes
/// against the bound argument type.
pub enum Args {
    Typed(Box<dyn Any + Send>),
    Encoded(Bytes),
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Args::Typed(_) => write!(f, "Args::Typed(..)"),
            Args::Encoded(b) => write!(f, "Args::Encoded({} bytes)", b.len()),
        }
    }
}

/// Outcome of a handler invocation, already mapped through the return-value
/// convention described in the component design: a plain error becomes
/// `Err`, a `(resp, err)` pair collapses to one of the two variants.
#[derive(Debug, Clone)]
pub enum InvokeOutcome {
    Ok(Bytes),
    Err { code: i32, message: String },
}

impl InvokeOutcome {
    pub fn empty_ok() -> Self {
        InvokeOutcome::Ok(Bytes::new())
    }
}

pub const CODE_OK: i32 = 0;
pub const CODE_UNKNOWN_ERROR: i32 = 1;
pub const CODE_RPC_REMOTE_EXECUTE_ERROR: i32 = 2;

/// Something that can receive the final `(code, data)` of an invocation.
/// Implemented by the cluster crate's correlation-table entry so that
/// `ember-actor` never needs to know about network transports.
pub trait ClusterReply: Send {
    fn reply(self: Box<Self>, code: i32, data: Bytes);
}

pub enum ReplySink {
    Local(oneshot::Sender<InvokeOutcome>),
    Cluster(Box<dyn ClusterReply>),
    None,
}

impl ReplySink {
    pub fn send(self, outcome: InvokeOutcome) {
        match self {
            ReplySink::Local(tx) => {
                let _ = tx.send(outcome);
            }
            ReplySink::Cluster(reply) => match outcome {
                InvokeOutcome::Ok(data) => reply.reply(CODE_OK, data),
                InvokeOutcome::Err { code, .. } => reply.reply(code, Bytes::new()),
            },
            ReplySink::None => {}
        }
    }
}

pub struct ActorMessage {
    pub source: ActorPath,
    pub target: ActorPath,
    pub func_name: String,
    pub args: Args,
    pub is_cluster: bool,
    pub reply: ReplySink,
    /// The originating connection, for connector-delivered local messages.
    pub session: Option<Arc<dyn SessionContext>>,
}

impl fmt::Debug for ActorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorMessage")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("func_name", &self.func_name)
            .field("args", &self.args)
            .field("is_cluster", &self.is_cluster)
            .finish()
    }
}
