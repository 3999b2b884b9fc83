//! Provides a coalescer which collapses concurrent identical calls into one execution.
//!
//! When several callers request the same key while a computation for that key is already in
//! flight, only the first caller actually executes it. All others wait for the shared outcome
//! and receive the very same result. This protects the source of truth (a database or a
//! cluster peer) from being hit by a thundering herd of identical requests.
//!
//! Note that this is pure de-duplication of *concurrent* work. Nothing is ever cached: once a
//! computation has completed, the next call for the same key starts a fresh one.
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// An error shared between all callers of a coalesced computation.
///
/// The error of a failed computation is handed to every waiter, therefore it is kept behind
/// an [Arc] instead of being consumed by the first caller.
pub type SharedError = Arc<anyhow::Error>;

/// The outcome of a coalesced computation as observed by every caller.
pub type SharedResult<T> = Result<T, SharedError>;

/// Coalesces concurrent calls per key into a single execution.
///
/// # Examples
/// ```
/// # use callisto::singleflight::SingleFlight;
/// #[tokio::main]
/// async fn main() {
///     let flights = SingleFlight::new();
///
///     // Sequential calls each run their own computation...
///     let first = flights.execute("answer", || async { Ok(42) }).await.unwrap();
///     let second = flights.execute("answer", || async { Ok(42) }).await.unwrap();
///     assert_eq!(first, second);
/// }
/// ```
pub struct SingleFlight<T> {
    calls: Mutex<HashMap<String, Call<T>>>,
}

/// A computation which is currently in flight.
///
/// A call is present in the registry exactly as long as its computation has not completed.
/// All callers which arrive in that window park a sender here and await the shared outcome.
struct Call<T> {
    waiters: Vec<oneshot::Sender<SharedResult<T>>>,
}

impl<T: Clone> SingleFlight<T> {
    /// Creates a new coalescer without any calls in flight.
    pub fn new() -> Self {
        SingleFlight {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Executes the given task unless a call for the same key is already in flight.
    ///
    /// The first caller for a key runs the task and hands its result to every caller which
    /// arrived while the task was running - those never execute their own task. Callers which
    /// arrive after the computation has completed start a fresh one.
    ///
    /// Errors are fanned out unchanged: all callers of one flight observe the same
    /// [SharedError] instance. No retry is ever attempted here.
    pub async fn execute<F, Fut>(&self, key: &str, task: F) -> SharedResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let waiter = {
            let mut calls = self.calls.lock().unwrap();
            match calls.get_mut(key) {
                Some(call) => {
                    let (tx, rx) = oneshot::channel();
                    call.waiters.push(tx);
                    Some(rx)
                }
                None => {
                    let _ = calls.insert(key.to_owned(), Call { waiters: Vec::new() });
                    None
                }
            }
        };

        if let Some(receiver) = waiter {
            return match receiver.await {
                Ok(result) => result,
                // The leading caller was dropped before its computation completed...
                Err(_) => Err(Arc::new(anyhow::anyhow!(
                    "The coalesced computation for this key was abandoned."
                ))),
            };
        }

        let flight = Flight {
            calls: &self.calls,
            key,
            done: false,
        };

        let result = task().await.map_err(Arc::new);
        flight.complete();

        // Remove the call before delivering any result, so that a caller arriving right now
        // starts a fresh computation instead of attaching to a completed one...
        let waiters = match self.calls.lock().unwrap().remove(key) {
            Some(call) => call.waiters,
            None => Vec::new(),
        };
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }

        result
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters a call whose leading caller is dropped mid-computation.
///
/// Dropping the leader also drops all parked senders, which unblocks the waiters with an
/// error instead of leaving them stuck on a flight which can never complete.
struct Flight<'a, T> {
    calls: &'a Mutex<HashMap<String, Call<T>>>,
    key: &'a str,
    done: bool,
}

impl<'a, T> Flight<'a, T> {
    fn complete(mut self) {
        self.done = true;
    }
}

impl<'a, T> Drop for Flight<'a, T> {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.calls.lock().unwrap().remove(self.key);
        }
    }
}
