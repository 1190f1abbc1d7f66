// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Liveness tokens and at-most-once pending callbacks.
//
// A `PendingCallback` stands for an in-flight asynchronous result (a module
// call, a permission prompt, a billing flow). It is consumed by completing it,
// so a second completion cannot be expressed. If it is dropped without being
// completed, an error is delivered instead. Once the owner's `LivenessToken` is
// killed, completing or dropping it does nothing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::debug;

use tether_core::error::{Result, TetherError};

/// Shared flag owned by a module (or any other callback owner) that flips to
/// dead exactly once, at teardown.
#[derive(Debug, Clone)]
pub struct LivenessToken(Arc<AtomicBool>);

impl LivenessToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Mark the owner as torn down. Returns `true` if this call did the kill.
    pub fn kill(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl Default for LivenessToken {
    fn default() -> Self {
        Self::new()
    }
}

/// What a pending callback hands to its delivery closure.
///
/// Whether the result is stale was decided when the callback completed; a
/// completion that exists is delivered. The owner's token rides along for
/// callers that report on a later teardown.
pub struct Completion<T> {
    outcome: Result<T>,
    liveness: LivenessToken,
}

impl<T> Completion<T> {
    pub fn is_live(&self) -> bool {
        self.liveness.is_alive()
    }

    pub fn outcome(&self) -> &Result<T> {
        &self.outcome
    }

    pub fn into_outcome(self) -> Result<T> {
        self.outcome
    }
}

type Deliver<T> = Box<dyn FnOnce(Completion<T>) + Send>;

/// An identifier-correlated, at-most-once continuation.
pub struct PendingCallback<T: Send + 'static> {
    deliver: Option<Deliver<T>>,
    liveness: LivenessToken,
}

impl<T: Send + 'static> PendingCallback<T> {
    pub fn new(liveness: LivenessToken, deliver: impl FnOnce(Completion<T>) + Send + 'static) -> Self {
        Self {
            deliver: Some(Box::new(deliver)),
            liveness,
        }
    }

    pub fn liveness(&self) -> &LivenessToken {
        &self.liveness
    }

    /// Whether completing now would deliver anything.
    pub fn is_live(&self) -> bool {
        self.liveness.is_alive()
    }

    /// Deliver the outcome. Returns `false` when the owner was already torn
    /// down and the outcome was dropped. This is the only staleness check: a
    /// teardown after this point does not retract the result.
    pub fn complete(mut self, outcome: Result<T>) -> bool {
        let Some(deliver) = self.deliver.take() else {
            return false;
        };

        if !self.liveness.is_alive() {
            debug!("{}", TetherError::StaleCallback);
            return false;
        }

        deliver(Completion {
            outcome,
            liveness: self.liveness.clone(),
        });
        true
    }
}

impl PendingCallback<Value> {
    pub fn resolve(self, value: Value) -> bool {
        self.complete(Ok(value))
    }

    pub fn reject(self, error: TetherError) -> bool {
        self.complete(Err(error))
    }
}

impl<T: Send + 'static> Drop for PendingCallback<T> {
    fn drop(&mut self) {
        let Some(deliver) = self.deliver.take() else {
            return;
        };
        if !self.liveness.is_alive() {
            return;
        }

        debug!("pending callback dropped without a result");
        deliver(Completion {
            outcome: Err(TetherError::ResourceUnavailable(
                "callback dropped before completion".into(),
            )),
            liveness: self.liveness.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording() -> (Arc<Mutex<Vec<Result<Value>>>>, impl FnOnce(Completion<Value>) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let deliver = move |completion: Completion<Value>| {
            sink.lock().expect("lock").push(completion.into_outcome());
        };
        (seen, deliver)
    }

    #[test]
    fn resolve_delivers_once() {
        let (seen, deliver) = recording();
        let callback = PendingCallback::new(LivenessToken::new(), deliver);

        assert!(callback.resolve(Value::from(1)));

        let seen = seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].as_ref().expect("ok"), &Value::from(1));
    }

    #[test]
    fn dropping_without_completion_delivers_an_error() {
        let (seen, deliver) = recording();
        drop(PendingCallback::new(LivenessToken::new(), deliver));

        let seen = seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], Err(TetherError::ResourceUnavailable(_))));
    }

    #[test]
    fn completion_after_kill_is_a_no_op() {
        let (seen, deliver) = recording();
        let token = LivenessToken::new();
        let callback = PendingCallback::new(token.clone(), deliver);

        assert!(token.kill());
        assert!(!callback.resolve(Value::Null));
        assert!(seen.lock().expect("lock").is_empty());
    }

    #[test]
    fn drop_after_kill_is_silent() {
        let (seen, deliver) = recording();
        let token = LivenessToken::new();
        let callback = PendingCallback::new(token.clone(), deliver);

        token.kill();
        drop(callback);
        assert!(seen.lock().expect("lock").is_empty());
    }

    #[test]
    fn kill_reports_only_the_first_call() {
        let token = LivenessToken::new();
        assert!(token.kill());
        assert!(!token.kill());
        assert!(!token.is_alive());
    }

    #[test]
    fn completion_sees_a_later_kill() {
        let token = LivenessToken::new();
        let parked = Arc::new(Mutex::new(None));
        let slot = parked.clone();
        let callback = PendingCallback::new(token.clone(), move |completion: Completion<Value>| {
            *slot.lock().expect("lock") = Some(completion);
        });

        callback.resolve(Value::Null);
        token.kill();

        let completion = parked.lock().expect("lock").take().expect("delivered");
        assert!(!completion.is_live());
    }
}
