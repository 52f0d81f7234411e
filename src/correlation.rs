//! Request/response correlation over a streaming channel.
//!
//! A caller registers a key before transmitting its request and then waits on
//! the returned [`PendingCorrelation`] handle. The stream's reader resolves
//! the handle when a frame carrying the same key arrives. Response arrival and the
//! deadline are the two events that end the wait; either way the key is
//! removed from the registry.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use serde_json::Value;
use tokio::{
    sync::oneshot,
    time::{Instant, timeout_at},
};

use crate::{Error, Result};

type Reply = Result<Value>;

struct Waiter {
    id: u64,
    tx: oneshot::Sender<Reply>,
}

/// Registry of in-flight correlated requests, one waiter per key.
#[derive(Default)]
pub struct Correlator {
    waiters: Mutex<HashMap<String, Waiter>>,
    next_id: AtomicU64,
}

impl Correlator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn waiters(&self) -> MutexGuard<'_, HashMap<String, Waiter>> {
        // the map holds no invariant a panicking holder could break
        self.waiters.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Registers `key` with a deadline `timeout` from now.
    ///
    /// Fails with [`Error::DuplicateCorrelation`] if `key` is already pending.
    pub fn register(
        self: &Arc<Self>,
        key: impl Into<String>,
        timeout: Duration,
    ) -> Result<PendingCorrelation> {
        let key = key.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let mut waiters = self.waiters();
        if waiters.contains_key(&key) {
            return Err(Error::DuplicateCorrelation(key));
        }
        waiters.insert(key.clone(), Waiter { id, tx });

        Ok(PendingCorrelation {
            key,
            id,
            timeout,
            deadline: deadline_after(timeout),
            rx,
            correlator: Arc::clone(self),
        })
    }

    /// Hands `response` to the waiter registered under `key`.
    ///
    /// Returns false if nobody is waiting for `key`.
    pub fn resolve(&self, key: &str, response: Value) -> bool {
        let Some(waiter) = self.waiters().remove(key) else {
            return false;
        };
        if waiter.tx.send(Ok(response)).is_err() {
            log::debug!("waiter for {key} went away before its response arrived");
        }
        true
    }

    /// Fails every pending waiter, e.g. when the channel closes.
    pub fn fail_all(&self, reason: &str) {
        let drained: Vec<_> = self.waiters().drain().collect();
        for (key, waiter) in drained {
            log::debug!("failing pending request {key}: {reason}");
            let _ = waiter
                .tx
                .send(Err(Error::StreamDisconnected(reason.to_string())));
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.waiters().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.waiters().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes `key` only if it still belongs to waiter `id`.
    fn remove(&self, key: &str, id: u64) {
        let mut waiters = self.waiters();
        if waiters.get(key).is_some_and(|waiter| waiter.id == id) {
            waiters.remove(key);
        }
    }
}

/// `timeout` from now, capped roughly 30 years out.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}

/// Handle to a registered correlated request.
///
/// Dropping it before a response arrives unregisters the key.
pub struct PendingCorrelation {
    key: String,
    id: u64,
    timeout: Duration,
    deadline: Instant,
    rx: oneshot::Receiver<Reply>,
    correlator: Arc<Correlator>,
}

impl PendingCorrelation {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Waits for the response or the deadline, whichever comes first.
    pub async fn wait(mut self) -> Result<Value> {
        match timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(Error::StreamDisconnected(format!(
                "channel closed while waiting for {}",
                self.key
            ))),
            Err(_) => {
                log::warn!("no response for {} within {:?}", self.key, self.timeout);
                Err(Error::CorrelationTimeout {
                    key: self.key.clone(),
                    timeout: self.timeout,
                })
            }
        }
    }
}

impl Drop for PendingCorrelation {
    fn drop(&mut self) {
        self.correlator.remove(&self.key, self.id);
    }
}

/// Key under which a request of `kind` for `id` is correlated.
///
/// `kind` is the request or response variant name with its `Request` /
/// `Response` suffix removed, e.g. `CancelOrder`.
pub fn correlation_key(kind: &str, id: &str) -> String {
    format!("{kind}:{id}")
}

/// Extracts the correlation key from a response frame.
///
/// Responses are single-key objects such as
/// `{"CancelOrderResponse": {"response": {"order_id": "abc", ..}, ..}}`; the
/// order id is looked up on the payload itself or on its `response` field.
pub fn response_key(frame: &Value) -> Option<String> {
    let map = frame.as_object()?;
    if map.len() != 1 {
        return None;
    }
    let (variant, payload) = map.iter().next()?;
    let kind = variant.strip_suffix("Response").unwrap_or(variant);

    let order_id = payload
        .get("order_id")
        .or_else(|| payload.get("response").and_then(|r| r.get("order_id")))?
        .as_str()?;

    Some(correlation_key(kind, order_id))
}
