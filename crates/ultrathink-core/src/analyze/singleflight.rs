//! Single-flight coalescing
//!
//! A process-wide map from canonical request key to an in-flight handle.
//! The first caller spawns the upstream work; later callers subscribe to the
//! same broadcast outcome. Every caller is a waiter; when the last waiter
//! drops before completion, the upstream task is aborted.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use crate::error::{CoreError, Result};

type SharedOutcome<T> = std::result::Result<T, Arc<CoreError>>;

struct Flight<T> {
    flight_id: u64,
    tx: broadcast::Sender<SharedOutcome<T>>,
    waiters: Arc<AtomicUsize>,
    abort: AbortHandle,
}

type FlightMap<T> = Arc<Mutex<HashMap<String, Flight<T>>>>;

pub struct SingleFlight<T> {
    inflight: FlightMap<T>,
    next_id: AtomicU64,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

/// Decrements the waiter count when a caller is cancelled mid-wait and
/// aborts the upstream task once nobody is listening.
struct WaiterGuard<T> {
    map: FlightMap<T>,
    key: String,
    flight_id: u64,
    armed: bool,
}

impl<T> Drop for WaiterGuard<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(mut map) = self.map.lock() else {
            return;
        };
        let last_waiter = match map.get(&self.key) {
            // Only touch the flight this waiter actually joined; the key may
            // have been reused by a newer flight
            Some(flight) if flight.flight_id == self.flight_id => {
                flight.waiters.fetch_sub(1, Ordering::SeqCst) == 1
            }
            _ => false,
        };
        if last_waiter {
            if let Some(flight) = map.remove(&self.key) {
                flight.abort.abort();
            }
        }
    }
}

impl<T: Clone + Send + 'static> SingleFlight<T> {
    /// Run `fut` under the given key, coalescing with any identical call
    /// already in flight. All waiters observe the same outcome.
    pub async fn run<F>(&self, key: String, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (mut rx, flight_id) = {
            let mut map = self
                .inflight
                .lock()
                .map_err(|_| CoreError::Internal("single-flight lock poisoned".to_string()))?;

            match map.get(&key) {
                Some(flight) => {
                    flight.waiters.fetch_add(1, Ordering::SeqCst);
                    (flight.tx.subscribe(), flight.flight_id)
                }
                None => {
                    let flight_id = self.next_id.fetch_add(1, Ordering::SeqCst);
                    let (tx, rx) = broadcast::channel(1);
                    let waiters = Arc::new(AtomicUsize::new(1));

                    let map_handle = Arc::clone(&self.inflight);
                    let key_handle = key.clone();
                    let tx_handle = tx.clone();
                    let task = tokio::spawn(async move {
                        let outcome = fut.await.map_err(Arc::new);
                        // Remove before sending so late arrivals start a
                        // fresh flight instead of missing the broadcast
                        if let Ok(mut map) = map_handle.lock() {
                            map.remove(&key_handle);
                        }
                        let _ = tx_handle.send(outcome);
                    });

                    map.insert(
                        key.clone(),
                        Flight {
                            flight_id,
                            tx,
                            waiters,
                            abort: task.abort_handle(),
                        },
                    );
                    (rx, flight_id)
                }
            }
        };

        let mut guard = WaiterGuard {
            map: Arc::clone(&self.inflight),
            key,
            flight_id,
            armed: true,
        };

        let received = rx.recv().await;
        guard.armed = false;
        drop(guard);

        match received {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(shared)) => Err(CoreError::from_shared(&shared)),
            Err(_) => Err(CoreError::Internal(
                "analysis task aborted before completion".to_string(),
            )),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_identical_calls_run_once() {
        let flights: Arc<SingleFlight<u64>> = Arc::new(SingleFlight::default());
        let counter = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..8 {
            let flights = Arc::clone(&flights);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                flights
                    .run("same-key".to_string(), async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42_u64)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1, "upstream ran exactly once");
    }

    #[tokio::test]
    async fn test_distinct_keys_run_separately() {
        let flights: Arc<SingleFlight<u64>> = Arc::new(SingleFlight::default());
        let counter = Arc::new(AtomicUsize::new(0));

        for key in ["k1", "k2"] {
            let counter = Arc::clone(&counter);
            flights
                .run(key.to_string(), async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(1_u64)
                })
                .await
                .unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_are_shared() {
        let flights: Arc<SingleFlight<u64>> = Arc::new(SingleFlight::default());

        let mut handles = vec![];
        for _ in 0..3 {
            let flights = Arc::clone(&flights);
            handles.push(tokio::spawn(async move {
                flights
                    .run("fail-key".to_string(), async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err::<u64, _>(CoreError::unavailable("chat down"))
                    })
                    .await
            }));
        }

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, CoreError::ServiceUnavailable(_)));
        }
    }

    #[tokio::test]
    async fn test_key_reusable_after_completion() {
        let flights: Arc<SingleFlight<u64>> = Arc::new(SingleFlight::default());
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = Arc::clone(&counter);
            flights
                .run("reused".to_string(), async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(7_u64)
                })
                .await
                .unwrap();
        }
        // Sequential calls are separate flights
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelling_all_waiters_aborts_upstream() {
        let flights: Arc<SingleFlight<u64>> = Arc::new(SingleFlight::default());
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let waiter = {
            let flights = Arc::clone(&flights);
            let started = Arc::clone(&started);
            let finished = Arc::clone(&finished);
            tokio::spawn(async move {
                flights
                    .run("cancelled".to_string(), async move {
                        started.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                        Ok(0_u64)
                    })
                    .await
            })
        };

        // Let the upstream start, then cancel the only waiter
        tokio::time::sleep(Duration::from_millis(50)).await;
        waiter.abort();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0, "upstream was aborted");
        assert!(flights.inflight.lock().unwrap().is_empty(), "flight cleaned up");
    }
}
