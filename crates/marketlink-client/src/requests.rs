//! Request registry (C5): request id allocation and single-shot pending
//! completions.
//!
//! A completion's result type varies per request, so the slot stores a
//! type-erased boxed value and the waiter downcasts it back on receipt.
//! The alternative -- one `DashMap` per response type -- would scatter
//! the "pending completions" invariant across many maps instead of one.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI32, Ordering};

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::error::ClientError;

pub type RequestId = i32;

/// First request id this client hands out. Matches the gateway's own
/// convention of reserving low ids for the handshake/start-api exchange.
const FIRST_REQUEST_ID: i32 = 1000;

type BoxedResult = Result<Box<dyn Any + Send>, ClientError>;

/// A single-shot result slot awaited by the caller that issued a
/// request. Resolves to `Err(ClientError::Canceled)` if the registry
/// drops the slot without resolving it (the request's completion was
/// removed, e.g. by `fail`, without a matching `send`).
pub struct PendingCompletion<T> {
    receiver: oneshot::Receiver<BoxedResult>,
    _marker: PhantomData<T>,
}

impl<T: Send + 'static> PendingCompletion<T> {
    pub async fn wait(self) -> Result<T, ClientError> {
        match self.receiver.await {
            Ok(Ok(boxed)) => Ok(*boxed
                .downcast::<T>()
                .expect("request registry resolved with the wrong type for this request id")),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ClientError::Canceled),
        }
    }
}

/// Connection-scoped table of in-flight requests.
pub struct RequestRegistry {
    next_id: AtomicI32,
    pending: DashMap<RequestId, oneshot::Sender<BoxedResult>>,
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI32::new(FIRST_REQUEST_ID),
            pending: DashMap::new(),
        }
    }

    /// Allocate the next request id. Strictly increasing for the life of
    /// the registry; never reused.
    pub fn next_request_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Allocate a request id and install a fresh completion slot for it.
    pub fn make_pending<T: Send + 'static>(&self) -> (RequestId, PendingCompletion<T>) {
        let id = self.next_request_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        (
            id,
            PendingCompletion {
                receiver: rx,
                _marker: PhantomData,
            },
        )
    }

    /// Install a completion slot under a caller-supplied id rather than
    /// one allocated by this registry. Used for order placement, where
    /// the id space is the order id cursor (`NEXT_VALID_ID`), not this
    /// registry's own counter, but an `ERROR` naming that id must still
    /// fail the right waiter.
    pub fn make_pending_with_id<T: Send + 'static>(&self, id: RequestId) -> PendingCompletion<T> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        PendingCompletion {
            receiver: rx,
            _marker: PhantomData,
        }
    }

    /// Resolve the slot for `id` successfully. Ignored if the slot is
    /// missing (already resolved, failed, or never registered -- e.g. a
    /// late response for a canceled request).
    pub fn resolve<T: Send + 'static>(&self, id: RequestId, value: T) {
        if let Some((_, tx)) = self.pending.remove(&id) {
            let _ = tx.send(Ok(Box::new(value)));
        }
    }

    /// Fail the slot for `id`. Ignored if the slot is missing.
    pub fn fail(&self, id: RequestId, error: ClientError) {
        if let Some((_, tx)) = self.pending.remove(&id) {
            let _ = tx.send(Err(error));
        }
    }

    pub fn is_pending(&self, id: RequestId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Fail every currently pending completion with `error` and clear the
    /// table. Used when the transport dies: the reader task is gone, so
    /// nothing will ever resolve these slots otherwise.
    pub fn fail_all(&self, error: impl Fn() -> ClientError) {
        let ids: Vec<RequestId> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(error()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_start_at_1000_and_increase() {
        let registry = RequestRegistry::new();
        assert_eq!(registry.next_request_id(), 1000);
        assert_eq!(registry.next_request_id(), 1001);
    }

    #[tokio::test]
    async fn resolve_delivers_typed_value() {
        let registry = RequestRegistry::new();
        let (id, pending) = registry.make_pending::<i32>();
        registry.resolve(id, 42);
        assert_eq!(pending.wait().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn fail_delivers_the_error() {
        let registry = RequestRegistry::new();
        let (id, pending) = registry.make_pending::<i32>();
        registry.fail(id, ClientError::NotConnected);
        assert!(matches!(pending.wait().await, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn resolve_on_missing_id_is_ignored() {
        let registry = RequestRegistry::new();
        registry.resolve(9999, 1i32);
        assert!(!registry.is_pending(9999));
    }

    #[tokio::test]
    async fn double_resolve_only_delivers_once() {
        let registry = RequestRegistry::new();
        let (id, pending) = registry.make_pending::<i32>();
        registry.resolve(id, 1);
        // Second resolve targets an already-removed slot; ignored.
        registry.resolve(id, 2);
        assert_eq!(pending.wait().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fail_all_fails_every_pending_slot_and_clears_the_table() {
        let registry = RequestRegistry::new();
        let (id_a, pending_a) = registry.make_pending::<i32>();
        let (id_b, pending_b) = registry.make_pending::<i32>();
        registry.fail_all(|| ClientError::Transport(std::io::Error::other("socket closed")));
        assert!(matches!(pending_a.wait().await, Err(ClientError::Transport(_))));
        assert!(matches!(pending_b.wait().await, Err(ClientError::Transport(_))));
        assert!(!registry.is_pending(id_a));
        assert!(!registry.is_pending(id_b));
    }

    #[tokio::test]
    async fn dropping_the_registry_slot_cancels_the_waiter() {
        let registry = RequestRegistry::new();
        let (id, pending) = registry.make_pending::<i32>();
        registry.pending.remove(&id);
        assert!(matches!(pending.wait().await, Err(ClientError::Canceled)));
    }
}
