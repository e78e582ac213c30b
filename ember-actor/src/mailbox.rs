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

//! Each actor owns three FIFO mailboxes (`local`, `remote`, `call`) drained
//! by a single consumer task. Selection prefers `call` over `remote` over
//! `local`, but caps consecutive non-local picks so a busy RPC caller can
//! never starve a chatty local sender - see the fairness cap.

use tokio::sync::mpsc;

use crate::invocation::ActorMessage;

pub const DEFAULT_MAILBOX_BOUND: usize = 1024;

/// Number of consecutive call/remote messages drained before a pending
/// local message is forced through even if call/remote still have backlog.
const FAIRNESS_CAP: u32 = 8;

pub struct MailboxSender {
    pub local: mpsc::Sender<ActorMessage>,
    pub remote: mpsc::Sender<ActorMessage>,
    pub call: mpsc::Sender<ActorMessage>,
}

pub struct Mailbox {
    local: mpsc::Receiver<ActorMessage>,
    remote: mpsc::Receiver<ActorMessage>,
    call: mpsc::Receiver<ActorMessage>,
    consecutive_priority: u32,
}

pub fn channel(bound: usize) -> (MailboxSender, Mailbox) {
    let (local_tx, local_rx) = mpsc::channel(bound);
    let (remote_tx, remote_rx) = mpsc::channel(bound);
    let (call_tx, call_rx) = mpsc::channel(bound);
    (
        MailboxSender { local: local_tx, remote: remote_tx, call: call_tx },
        Mailbox { local: local_rx, remote: remote_rx, call: call_rx, consecutive_priority: 0 },
    )
}

impl Mailbox {
    /// Returns `None` once every sender has been dropped and all three
    /// mailboxes are drained - the actor's natural shutdown signal.
    pub async fn recv(&mut self) -> Option<ActorMessage> {
        if self.consecutive_priority >= FAIRNESS_CAP {
            if let Ok(msg) = self.local.try_recv() {
                self.consecutive_priority = 0;
                return Some(msg);
            }
        }

        tokio::select! {
            biased;
            msg = self.call.recv() => {
                if let Some(m) = msg {
                    self.consecutive_priority += 1;
                    return Some(m);
                }
            }
            msg = self.remote.recv() => {
                if let Some(m) = msg {
                    self.consecutive_priority += 1;
                    return Some(m);
                }
            }
            msg = self.local.recv() => {
                if let Some(m) = msg {
                    self.consecutive_priority = 0;
                    return Some(m);
                }
            }
        }

        // one of the three channels closed on this tick; the others may still
        // have messages; the select above already took the first ready one,
        // so only the terminal "all closed" case falls through to here if
        // every branch returned None in the same poll.
        self.drain_remaining().await
    }

    async fn drain_remaining(&mut self) -> Option<ActorMessage> {
        if let Ok(m) = self.call.try_recv() {
            return Some(m);
        }
        if let Ok(m) = self.remote.try_recv() {
            return Some(m);
        }
        if let Ok(m) = self.local.try_recv() {
            return Some(m);
        }
        if self.call.is_closed() && self.remote.is_closed() && self.local.is_closed() {
            None
        } else {
            // a channel closed but others are still open and momentarily empty;
            // yield and let the caller loop back into select.
            tokio::task::yield_now().await;
            Box::pin(self.recv()).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{Args, ReplySink};
    use crate::path::ActorPath;
    use bytes::Bytes;

    fn msg(func: &str) -> ActorMessage {
        ActorMessage {
            source: ActorPath::new("n1", "t", "1"),
            target: ActorPath::new("n1", "t", "2"),
            func_name: func.to_string(),
            args: Args::Encoded(Bytes::new()),
            is_cluster: false,
            reply: ReplySink::None,
            session: None,
        }
    }

    #[tokio::test]
    async fn call_messages_are_drained_before_local_ones() {
        let (tx, mut mb) = channel(16);
        tx.local.send(msg("local")).await.unwrap();
        tx.call.send(msg("call")).await.unwrap();

        let first = mb.recv().await.unwrap();
        assert_eq!(first.func_name, "call");
        let second = mb.recv().await.unwrap();
        assert_eq!(second.func_name, "local");
    }

    #[tokio::test]
    async fn fairness_cap_forces_a_local_pass_under_sustained_call_pressure() {
        let (tx, mut mb) = channel(64);
        tx.local.send(msg("local")).await.unwrap();
        for _ in 0..(FAIRNESS_CAP as usize + 4) {
            tx.call.send(msg("call")).await.unwrap();
        }

        let mut saw_local = false;
        for _ in 0..(FAIRNESS_CAP as usize + 1) {
            let m = mb.recv().await.unwrap();
            if m.func_name == "local" {
                saw_local = true;
                break;
            }
        }
        assert!(saw_local, "local message was starved past the fairness cap");
    }

    #[tokio::test]
    async fn recv_returns_none_once_all_senders_are_dropped() {
        let (tx, mut mb) = channel(4);
        drop(tx);
        assert!(mb.recv().await.is_none());
    }
}
