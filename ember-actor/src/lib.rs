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

//! The actor runtime: addressable actors with a three-mailbox (local,
//! remote, call) single consumer, a funcName -> adapter invocation
//! registry in place of reflection, and an asynchronous event bus. This
//! crate knows nothing about transports or cluster wire formats - `ember-net`
//! and `ember-cluster` build on top of [`ActorHandle`] and
//! [`ActorSystemHandle`] without this crate depending on either of them. The
//! one seam a connector-originated call needs back into its session
//! (binding a uid, say) is [`invocation::SessionContext`], a trait
//! `ember-net`'s `Session` implements rather than a concrete dependency.

pub mod errors;
pub mod events;
pub mod handle;
pub mod handler;
pub mod invocation;
pub mod mailbox;
pub mod path;
pub mod system;

pub mod prelude {
    pub use crate::errors::{ActorError, Result};
    pub use crate::events::{Event, EventBus};
    pub use crate::handle::ActorHandle;
    pub use crate::handler::{bind, bind_notify, bind_session, ActorHandler, Binding};
    pub use crate::invocation::{ActorMessage, Args, ClusterReply, InvokeOutcome, ReplySink, SessionContext};
    pub use crate::path::ActorPath;
    pub use crate::system::{ActorContext, ActorSystem, ActorSystemHandle};
}
