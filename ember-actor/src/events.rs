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

//! A synchronous-registration, asynchronous-delivery publish/subscribe bus.
//! Modeled on the `MsgSubscriber`/`MsgSubscriptions` pattern, generalized
//! from a single statically typed message to an arbitrary named, `Any`
//! payload so unrelated actor types can publish events to each other
//! without a shared message enum.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

pub struct Event {
    pub name: String,
    pub sender_id: String,
    pub data: Arc<dyn Any + Send + Sync>,
}

impl Event {
    pub fn new(name: impl Into<String>, sender_id: impl Into<String>, data: impl Any + Send + Sync) -> Self {
        Event { name: name.into(), sender_id: sender_id.into(), data: Arc::new(data) }
    }
}

type Subscriber = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<DashMap<String, Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus { subscribers: Arc::new(DashMap::new()) }
    }

    /// Subscribe to events of `name`. Registration order is preserved for
    /// delivery order within a single `post`.
    pub fn subscribe(&self, name: impl Into<String>, callback: impl Fn(&Event) + Send + Sync + 'static) {
        self.subscribers.entry(name.into()).or_default().push(Arc::new(callback));
    }

    /// Deliver `event` to every subscriber registered for its name, in
    /// registration order, one single-pass task so delivery order matches
    /// subscription order; each subscriber call is individually
    /// `catch_unwind`-isolated so one panicking subscriber never stops the
    /// rest from being delivered to or affects the publisher.
    pub fn post(&self, event: Event) {
        let Some(subs) = self.subscribers.get(&event.name).map(|s| s.clone()) else {
            return;
        };
        let event = Arc::new(event);
        tokio::spawn(async move {
            for sub in subs {
                if let Err(e) = std::panic::AssertUnwindSafe(|| (sub)(&event)).catch_unwind_sync() {
                    warn!("event subscriber panicked: {e}");
                }
            }
        });
    }
}

/// std::panic::catch_unwind wrapper so the call above reads as a single
/// expression instead of an extra local binding at every call site.
trait CatchUnwindSync {
    fn catch_unwind_sync(self) -> Result<(), String>;
}

impl<F: FnOnce()> CatchUnwindSync for std::panic::AssertUnwindSafe<F> {
    fn catch_unwind_sync(self) -> Result<(), String> {
        std::panic::catch_unwind(self.0).map_err(|payload| describe_panic(&payload))
    }
}

pub(crate) fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn subscribers_are_delivered_in_registration_order_and_isolated() {
        let bus = EventBus::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let o1 = order.clone();
        bus.subscribe("tick", move |_e| o1.lock().unwrap().push(1));
        bus.subscribe("tick", |_e| panic!("boom"));
        let o3 = order.clone();
        bus.subscribe("tick", move |_e| o3.lock().unwrap().push(3));

        bus.post(Event::new("tick", "sys", 0u32));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let seen = order.lock().unwrap().clone();
        assert_eq!(seen, vec![1, 3]);
    }

    #[tokio::test]
    async fn events_with_no_subscribers_are_dropped_silently() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        bus.subscribe("other", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        bus.post(Event::new("tick", "sys", 0u32));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
