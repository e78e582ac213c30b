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

//! A cloneable, opaque reference to an actor's mailboxes. This is the only
//! way the rest of the system ever touches another actor.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::errors::{ActorError, Result};
use crate::invocation::{ActorMessage, Args, ClusterReply, InvokeOutcome, ReplySink, SessionContext};
use crate::mailbox::MailboxSender;
use crate::path::ActorPath;

#[derive(Clone)]
pub struct ActorHandle {
    pub path: ActorPath,
    senders: MailboxSenderShared,
    stopped: std::sync::Arc<AtomicBool>,
}

// the three mpsc::Sender handles are individually cheap to clone; sharing
// them behind one Arc keeps ActorHandle::clone() a single refcount bump.
type MailboxSenderShared = std::sync::Arc<MailboxSender>;

impl ActorHandle {
    pub fn new(path: ActorPath, senders: MailboxSender) -> Self {
        ActorHandle { path, senders: std::sync::Arc::new(senders), stopped: std::sync::Arc::new(AtomicBool::new(false)) }
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Acquire) && !self.senders.local.is_closed()
    }

    /// Marked by `ActorSystemHandle::exit` - every clone of this handle
    /// (the registry's, the connector's, a cached cluster lookup) observes
    /// it immediately since they all share the same flag.
    pub(crate) fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn ensure_running(&self) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ActorError::ActorStopped(self.path.to_string()));
        }
        Ok(())
    }

    fn sink_for(&self, is_cluster: bool) -> &tokio::sync::mpsc::Sender<ActorMessage> {
        if is_cluster {
            &self.senders.remote
        } else {
            &self.senders.local
        }
    }

    /// Fire-and-forget notify - the `Call` half of `Call`/`CallWait`.
    pub async fn notify(&self, source: ActorPath, func_name: impl Into<String>, args: Args, is_cluster: bool) -> Result<()> {
        self.ensure_running()?;
        let msg = ActorMessage { source, target: self.path.clone(), func_name: func_name.into(), args, is_cluster, reply: ReplySink::None, session: None };
        self.sink_for(is_cluster).send(msg).await.map_err(|_| ActorError::ReceiverClosed(self.path.to_string()))
    }

    pub fn try_notify(&self, source: ActorPath, func_name: impl Into<String>, args: Args, is_cluster: bool) -> Result<()> {
        self.ensure_running()?;
        let msg = ActorMessage { source, target: self.path.clone(), func_name: func_name.into(), args, is_cluster, reply: ReplySink::None, session: None };
        self.sink_for(is_cluster)
            .try_send(msg)
            .map_err(|e| match e {
                tokio::sync::mpsc::error::TrySendError::Full(_) => ActorError::MailboxFull(self.path.to_string()),
                tokio::sync::mpsc::error::TrySendError::Closed(_) => ActorError::ReceiverClosed(self.path.to_string()),
            })
    }

    /// `CallWait`: post to the high-priority `call` mailbox and block the
    /// caller on a one-shot reply up to `timeout`. A call that names the
    /// caller's own path would deadlock the single mailbox consumer and is
    /// rejected immediately instead.
    pub async fn call_wait_local(&self, source: ActorPath, func_name: impl Into<String>, args: Box<dyn Any + Send>, timeout: Duration) -> Result<InvokeOutcome> {
        if source == self.path {
            return Err(ActorError::SelfCallDeadlock(source.to_string()));
        }
        self.ensure_running()?;

        let (tx, rx) = oneshot::channel();
        let msg = ActorMessage {
            source,
            target: self.path.clone(),
            func_name: func_name.into(),
            args: Args::Typed(args),
            is_cluster: false,
            reply: ReplySink::Local(tx),
            session: None,
        };

        self.senders.call.send(msg).await.map_err(|_| ActorError::ReceiverClosed(self.path.to_string()))?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => {
                warn!("reply sink for {} dropped without a reply", self.path);
                Err(ActorError::ReplyAbandoned(self.path.to_string()))
            }
            Err(_) => Err(ActorError::Timeout(self.path.to_string(), timeout)),
        }
    }

    /// Post a pre-built message straight onto the high-priority `call`
    /// mailbox, bypassing the public `notify`/`call_wait_local` constructors.
    /// Used internally for system-level invocations such as `on_find_child`.
    pub(crate) async fn post_system(&self, msg: ActorMessage) -> Result<()> {
        self.ensure_running()?;
        self.senders.call.send(msg).await.map_err(|_| ActorError::ReceiverClosed(self.path.to_string()))
    }

    /// Post a connector-originated client message onto the `local` mailbox.
    /// Used by `ember-net`'s handler component to deliver a decoded Data
    /// packet to its target actor; `reply`, if any, is how a `Request`'s
    /// response makes its way back onto the originating session. `session`
    /// is handed through to the bound handler so it can read or bind the
    /// caller's uid.
    pub async fn deliver_local(&self, source: ActorPath, func_name: impl Into<String>, args: Bytes, reply: ReplySink, session: Option<std::sync::Arc<dyn SessionContext>>) -> Result<()> {
        self.ensure_running()?;
        let msg = ActorMessage { source, target: self.path.clone(), func_name: func_name.into(), args: Args::Encoded(args), is_cluster: false, reply, session };
        self.senders.local.send(msg).await.map_err(|_| ActorError::ReceiverClosed(self.path.to_string()))
    }

    /// Post a cluster-originated invocation, arranging for the final
    /// `(code, data)` to be written back through `reply` once the handler
    /// runs. Used by `ember-cluster` when it receives an inbound Request.
    /// Lands on the `remote` mailbox - the same one cluster `Notify`s use -
    /// not `call`, which is reserved for local `CallWait`s.
    pub async fn call_remote(&self, source: ActorPath, func_name: impl Into<String>, args: Bytes, reply: Box<dyn ClusterReply>) -> Result<()> {
        self.ensure_running()?;
        let msg = ActorMessage {
            source,
            target: self.path.clone(),
            func_name: func_name.into(),
            args: Args::Encoded(args),
            is_cluster: true,
            reply: ReplySink::Cluster(reply),
            session: None,
        };
        debug!(target = %self.path, "posting cluster call");
        self.senders.remote.send(msg).await.map_err(|_| ActorError::ReceiverClosed(self.path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc as StdArc;

    fn handle() -> (ActorHandle, mailbox::Mailbox) {
        let (senders, mailbox) = mailbox::channel(8);
        let path = ActorPath::new("n1", "room", "1");
        (ActorHandle::new(path, senders), mailbox)
    }

    #[tokio::test]
    async fn notify_lands_on_the_local_mailbox_when_not_cluster() {
        let (h, mut mb) = handle();
        h.notify(ActorPath::new("n1", "room", "caller"), "ping", Args::Encoded(Bytes::new()), false).await.unwrap();
        let msg = mb.recv().await.unwrap();
        assert_eq!(msg.func_name, "ping");
        assert!(!msg.is_cluster);
    }

    #[tokio::test]
    async fn notify_lands_on_the_remote_mailbox_when_cluster() {
        let (h, mut mb) = handle();
        h.notify(ActorPath::new("n1", "room", "caller"), "ping", Args::Encoded(Bytes::new()), true).await.unwrap();
        let msg = mb.recv().await.unwrap();
        assert_eq!(msg.func_name, "ping");
        assert!(msg.is_cluster);
    }

    #[test]
    fn try_notify_reports_mailbox_full_once_the_bound_is_reached() {
        let (senders, _mb) = mailbox::channel(1);
        let h = ActorHandle::new(ActorPath::new("n1", "room", "1"), senders);
        h.try_notify(ActorPath::new("n1", "room", "c"), "a", Args::Encoded(Bytes::new()), false).unwrap();
        let err = h.try_notify(ActorPath::new("n1", "room", "c"), "b", Args::Encoded(Bytes::new()), false).unwrap_err();
        assert!(matches!(err, ActorError::MailboxFull(_)));
    }

    #[tokio::test]
    async fn call_wait_local_to_its_own_path_fails_immediately() {
        let (h, _mb) = handle();
        let err = h.call_wait_local(h.path.clone(), "inc", Box::new(1u32), Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ActorError::SelfCallDeadlock(_)));
    }

    #[tokio::test]
    async fn call_wait_local_times_out_when_nobody_replies() {
        let (h, mut mb) = handle();
        let caller = ActorPath::new("n1", "room", "caller");
        let result = h.call_wait_local(caller, "inc", Box::new(1u32), Duration::from_millis(20));
        let (result, _msg) = tokio::join!(result, async { mb.recv().await });
        assert!(matches!(result, Err(ActorError::Timeout(_, _))));
    }

    #[tokio::test]
    async fn posts_are_rejected_with_actor_stopped_once_marked_stopped() {
        let (h, _mb) = handle();
        h.mark_stopped();
        let err = h.notify(ActorPath::new("n1", "room", "c"), "ping", Args::Encoded(Bytes::new()), false).await.unwrap_err();
        assert!(matches!(err, ActorError::ActorStopped(_)));
        assert!(!h.is_running());
    }

    #[tokio::test]
    async fn call_remote_invokes_the_cluster_reply_with_the_invoker_outcome() {
        struct CapturingReply(StdArc<AtomicBool>);
        impl ClusterReply for CapturingReply {
            fn reply(self: Box<Self>, code: i32, _data: Bytes) {
                self.0.store(code == crate::invocation::CODE_OK, Ordering::SeqCst);
            }
        }

        let (h, mut mb) = handle();
        let seen = StdArc::new(AtomicBool::new(false));
        h.call_remote(ActorPath::new("n2", "room", "1"), "inc", Bytes::new(), Box::new(CapturingReply(seen.clone()))).await.unwrap();

        let msg = mb.recv().await.unwrap();
        assert!(msg.is_cluster);
        msg.reply.send(InvokeOutcome::Ok(Bytes::new()));
        assert!(seen.load(Ordering::SeqCst));
    }
}
