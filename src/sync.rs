//! Concurrency primitives: [`WriteSerializer`] (a single-permit admission
//! queue admitting at most one in-flight mutation) and [`InitGate`] (a
//! one-shot readiness latch whose construction failure is cached and
//! replayed to every later caller, rather than retried in the background).

use crate::error::ChainStoreError;
use std::future::Future;
use tokio::sync::{Mutex, OnceCell};

/// Serializes mutations so that at most one put/delete pipeline is ever
/// in flight, regardless of how many callers invoke the public API
/// concurrently. Acquires are FIFO because `tokio::sync::Mutex` queues
/// waiters in arrival order.
#[derive(Debug, Default)]
pub struct WriteSerializer {
    admission: Mutex<()>,
}

impl WriteSerializer {
    /// A fresh serializer with no mutation in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the single admission token, runs `body`, and releases the
    /// token on every exit path — including `body` returning an error or
    /// panicking, since the guard's `Drop` runs regardless.
    pub async fn locked_mutation<T, F, Fut>(&self, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.admission.lock().await;
        body().await
    }
}

/// A one-shot readiness latch. All public operations await this before
/// proceeding; a failed initialisation is cached and returned verbatim to
/// every later caller instead of being retried.
#[derive(Debug, Default)]
pub struct InitGate {
    cell: OnceCell<Result<(), ChainStoreError>>,
}

impl InitGate {
    /// A gate that has not yet been initialised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `init` at most once, caching its result; every call (including
    /// the first) awaits the same outcome before returning.
    pub async fn ready<F, Fut>(&self, init: F) -> Result<(), ChainStoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), ChainStoreError>>,
    {
        self.cell
            .get_or_init(init)
            .await
            .clone()
            .map_err(|e| ChainStoreError::InitFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn mutations_serialize_to_a_single_in_flight_count() {
        let serializer = Arc::new(WriteSerializer::new());
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let serializer = serializer.clone();
            let concurrent = concurrent.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                serializer
                    .locked_mutation(|| async {
                        let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn init_gate_runs_init_exactly_once() {
        let gate = InitGate::new();
        let calls = AtomicUsize::new(0);

        let first = gate
            .ready(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        let second = gate
            .ready(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn init_gate_caches_failure() {
        let gate = InitGate::new();
        let first = gate.ready(|| async { Err(ChainStoreError::NotFound) }).await;
        let second = gate.ready(|| async { Ok(()) }).await;

        assert!(matches!(first, Err(ChainStoreError::InitFailed(_))));
        assert!(matches!(second, Err(ChainStoreError::InitFailed(_))));
    }
}
