// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Global event bus for occurrences with no node target: sensor samples,
// connectivity changes, push tokens, lifecycle transitions.
//
// The bus itself lives in the UI thread's state and is only dispatched there.
// Sources running elsewhere hold a `BusHandle`, which queues the event onto
// the UI thread instead of touching the bus.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

/// A subscriber callback. Runs on the UI thread.
pub type Subscriber = Box<dyn Fn(&str, &Value) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct GlobalEventBus {
    subscribers: HashMap<String, Vec<(SubscriptionId, Subscriber)>>,
    next_id: u64,
}

impl GlobalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, name: &str, subscriber: Subscriber) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers
            .entry(name.to_string())
            .or_default()
            .push((id, subscriber));
        debug!(event = name, "global subscriber added");
        id
    }

    /// Returns whether `id` was subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let mut found = false;
        self.subscribers.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|(sid, _)| *sid != id);
            found |= subs.len() != before;
            !subs.is_empty()
        });
        found
    }

    /// Fan `payload` out to every subscriber of `name`. Fire-and-forget; the
    /// payload is not inspected. Returns how many subscribers ran.
    pub fn dispatch(&self, name: &str, payload: &Value) -> usize {
        let Some(subs) = self.subscribers.get(name) else {
            trace!(event = name, "global event with no subscribers");
            return 0;
        };
        for (_, subscriber) in subs {
            subscriber(name, payload);
        }
        subs.len()
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.subscribers.get(name).map_or(0, Vec::len)
    }
}

/// Thread-safe entry point for event sources. Emitting queues the event onto
/// the UI thread, where it is dispatched on the bus.
#[derive(Clone)]
pub struct BusHandle {
    emit: Arc<dyn Fn(String, Value) + Send + Sync>,
}

impl BusHandle {
    pub fn new(emit: impl Fn(String, Value) + Send + Sync + 'static) -> Self {
        Self {
            emit: Arc::new(emit),
        }
    }

    pub fn emit(&self, name: &str, payload: Value) {
        (self.emit)(name.to_string(), payload);
    }
}

impl std::fmt::Debug for BusHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BusHandle")
    }
}
