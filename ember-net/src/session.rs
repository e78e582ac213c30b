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

//! Per-connection state: the monotonic status machine, the outbound channel
//! a writer task drains, and the small set of close listeners other
//! components (the handler component, in particular) register on.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use dashmap::DashMap;
use ember_actor::invocation::SessionContext;
use tokio::sync::mpsc;

use crate::errors::{NetError, NetResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionStatus {
    Start = 0,
    WaitAck = 1,
    Working = 2,
    Closed = 3,
}

impl SessionStatus {
    fn from_u8(v: u8) -> SessionStatus {
        match v {
            0 => SessionStatus::Start,
            1 => SessionStatus::WaitAck,
            2 => SessionStatus::Working,
            _ => SessionStatus::Closed,
        }
    }
}

type CloseListener = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// One client connection. `status` only ever moves forward through
/// `Start -> WaitAck -> Working -> Closed`; [`Session::transition`] is the
/// only way to advance it and rejects anything else.
pub struct Session {
    pub id: u64,
    pub remote_addr: SocketAddr,
    uid: AtomicU64,
    status: AtomicU8,
    out_tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    last_heartbeat: Mutex<Instant>,
    on_close: Mutex<Vec<CloseListener>>,
}

impl Session {
    fn new(id: u64, remote_addr: SocketAddr, out_tx: mpsc::Sender<Bytes>) -> Self {
        Session {
            id,
            remote_addr,
            uid: AtomicU64::new(0),
            status: AtomicU8::new(SessionStatus::Start as u8),
            out_tx: Mutex::new(Some(out_tx)),
            last_heartbeat: Mutex::new(Instant::now()),
            on_close: Mutex::new(Vec::new()),
        }
    }

    pub fn uid(&self) -> u64 {
        self.uid.load(Ordering::Relaxed)
    }

    pub fn bind_uid(&self, uid: u64) {
        self.uid.store(uid, Ordering::Relaxed);
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Advance the status machine. Any attempt to move to a status that is
    /// not the strict successor of the current one fails without mutating
    /// state - the caller is expected to close the session on error.
    pub fn transition(&self, next: SessionStatus) -> NetResult<()> {
        let current = self.status();
        let expected_next = match current {
            SessionStatus::Start => SessionStatus::WaitAck,
            SessionStatus::WaitAck => SessionStatus::Working,
            SessionStatus::Working | SessionStatus::Closed => SessionStatus::Closed,
        };
        if next != expected_next {
            return Err(NetError::BadHandshake(format!("invalid transition {current:?} -> {next:?} for session {}", self.id)));
        }
        self.status.store(next as u8, Ordering::Release);
        Ok(())
    }

    pub fn touch_heartbeat(&self) {
        *self.last_heartbeat.lock().unwrap() = Instant::now();
    }

    pub fn is_heartbeat_stale(&self, timeout: std::time::Duration) -> bool {
        self.last_heartbeat.lock().unwrap().elapsed() > timeout
    }

    pub async fn send(&self, bytes: Bytes) -> NetResult<()> {
        let tx = self.out_tx.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(bytes).await.map_err(|_| NetError::SessionClosed(self.id)),
            None => Err(NetError::SessionClosed(self.id)),
        }
    }

    pub fn try_send(&self, bytes: Bytes) -> NetResult<()> {
        let guard = self.out_tx.lock().unwrap();
        match guard.as_ref() {
            Some(tx) => tx.try_send(bytes).map_err(|_| NetError::SessionClosed(self.id)),
            None => Err(NetError::SessionClosed(self.id)),
        }
    }

    pub fn on_close(&self, listener: impl Fn(u64, u64) + Send + Sync + 'static) {
        self.on_close.lock().unwrap().push(Arc::new(listener));
    }

    /// Force the status to `Closed`, drop the outbound sender so the
    /// session's writer task sees its channel close and exits, and fire
    /// every registered close listener exactly once. Dropping the sender
    /// is what actually tears the connection down: the writer task's
    /// `out_rx.recv()` returns `None`, the reader/writer `select!` in the
    /// connector completes, and the underlying socket is closed once that
    /// task returns. Idempotent - closing an already-closed session is a
    /// no-op.
    pub fn close(&self) {
        let was_closed = self.status.swap(SessionStatus::Closed as u8, Ordering::AcqRel) == SessionStatus::Closed as u8;
        if !was_closed {
            self.out_tx.lock().unwrap().take();
            for listener in self.on_close.lock().unwrap().iter() {
                listener(self.id, self.uid());
            }
        }
    }
}

impl SessionContext for Session {
    fn session_id(&self) -> u64 {
        self.id
    }

    fn uid(&self) -> u64 {
        Session::uid(self)
    }

    fn bind_uid(&self, uid: u64) {
        Session::bind_uid(self, uid)
    }
}

/// Process-wide monotonic session id allocator plus the live-session map.
/// The only process-wide mutable state besides this counter is explicitly
/// disallowed by the design notes, so everything else is threaded through
/// as an explicit `Application`-style context.
#[derive(Clone)]
pub struct SessionRegistry {
    next_id: Arc<AtomicU64>,
    sessions: Arc<DashMap<u64, Arc<Session>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry { next_id: Arc::new(AtomicU64::new(1)), sessions: Arc::new(DashMap::new()) }
    }

    pub fn create(&self, remote_addr: SocketAddr, out_tx: mpsc::Sender<Bytes>) -> Arc<Session> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session::new(id, remote_addr, out_tx));
        self.sessions.insert(id, session.clone());
        session
    }

    pub fn get(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|e| e.clone())
    }

    pub fn remove(&self, id: u64) {
        if let Some((_, session)) = self.sessions.remove(&id) {
            session.close();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of every live session, for the heartbeat supervisor sweep.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session() -> (Arc<Session>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(8);
        let registry = SessionRegistry::new();
        let session = registry.create("127.0.0.1:9000".parse().unwrap(), tx);
        (session, rx)
    }

    #[test]
    fn status_transitions_follow_the_strict_monotonic_sequence() {
        let (session, _rx) = test_session();
        assert_eq!(session.status(), SessionStatus::Start);
        session.transition(SessionStatus::WaitAck).unwrap();
        session.transition(SessionStatus::Working).unwrap();
        session.transition(SessionStatus::Closed).unwrap();
        assert_eq!(session.status(), SessionStatus::Closed);
    }

    #[test]
    fn out_of_order_transitions_are_rejected() {
        let (session, _rx) = test_session();
        assert!(session.transition(SessionStatus::Working).is_err());
        assert_eq!(session.status(), SessionStatus::Start);
    }

    #[test]
    fn skipping_waitack_straight_to_working_is_rejected() {
        let (session, _rx) = test_session();
        session.transition(SessionStatus::WaitAck).unwrap();
        // WaitAck -> Closed (an "other" packet in WaitAck) is legal...
        let fresh_registry = SessionRegistry::new();
        let (tx, _rx2) = mpsc::channel(8);
        let other = fresh_registry.create("127.0.0.1:9001".parse().unwrap(), tx);
        other.transition(SessionStatus::WaitAck).unwrap();
        // ...but Start -> Working directly is not.
        let (tx3, _rx3) = mpsc::channel(8);
        let registry3 = SessionRegistry::new();
        let fresh = registry3.create("127.0.0.1:9002".parse().unwrap(), tx3);
        assert!(fresh.transition(SessionStatus::Working).is_err());
    }

    #[test]
    fn close_fires_listeners_exactly_once() {
        let (session, _rx) = test_session();
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        session.on_close(move |_id, _uid| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        session.close();
        session.close();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_drops_the_outbound_sender_so_the_writer_side_observes_channel_end() {
        let (session, mut rx) = test_session();
        session.close();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn send_and_try_send_fail_once_the_session_is_closed() {
        let (session, _rx) = test_session();
        session.close();
        assert!(session.send(Bytes::from_static(b"x")).await.is_err());
        assert!(session.try_send(Bytes::from_static(b"x")).is_err());
    }

    #[test]
    fn registry_allocates_monotonic_ids() {
        let registry = SessionRegistry::new();
        let (tx1, _r1) = mpsc::channel(4);
        let (tx2, _r2) = mpsc::channel(4);
        let a = registry.create("127.0.0.1:1".parse().unwrap(), tx1);
        let b = registry.create("127.0.0.1:2".parse().unwrap(), tx2);
        assert!(b.id > a.id);
        assert_eq!(registry.len(), 2);
    }
}
