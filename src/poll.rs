//! Periodic refresh of a remote value.
//!
//! Each tick starts a new request and drops the one still pending, so a
//! slow response can never overwrite a newer one. Published values carry the
//! sequence number of the request that produced them.
//!
//! ```rust,ignore
//! let (handle, mut rx) = Poller::new("current-problem", Duration::from_secs(30))
//!     .spawn(move || { let c = client.clone(); async move { c.fetch().await } });
//! while rx.changed().await.is_ok() { /* ... */ }
//! drop(handle); // stops polling
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::Result;

/// A value together with the request that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Polled<T> {
    pub seq: u64,
    pub value: T,
}

pub type PollReceiver<T> = watch::Receiver<Option<Polled<T>>>;

/// Consecutive failures after which logging escalates to `error`.
const LOUD_FAILURES: u32 = 5;

pub struct Poller {
    label: String,
    interval: Duration,
}

impl Poller {
    pub fn new(label: impl Into<String>, interval: Duration) -> Self {
        Self {
            label: label.into(),
            interval,
        }
    }

    /// Start polling `fetch` on a background task.
    ///
    /// The first request is issued immediately. Failures are logged and the
    /// next attempt waits for the next tick; there is no retry in between.
    pub fn spawn<T, F, Fut>(self, fetch: F) -> (PollHandle, PollReceiver<T>)
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(self.run(fetch, tx));
        (PollHandle { task }, rx)
    }

    async fn run<T, F, Fut>(self, fetch: F, tx: watch::Sender<Option<Polled<T>>>)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut seq: u64 = 0;
        let mut in_flight: Option<(u64, Pin<Box<Fut>>)> = None;
        let mut consecutive_failures: u32 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some((stale, _)) = in_flight.take() {
                        debug!(poller = %self.label, seq = stale, "dropping unanswered request");
                    }
                    seq += 1;
                    in_flight = Some((seq, Box::pin(fetch())));
                }
                (done_seq, result) = async {
                    match in_flight.as_mut() {
                        Some((s, fut)) => (*s, fut.as_mut().await),
                        None => std::future::pending().await,
                    }
                }, if in_flight.is_some() => {
                    in_flight = None;
                    match result {
                        Ok(value) => {
                            consecutive_failures = 0;
                            tx.send_replace(Some(Polled { seq: done_seq, value }));
                        }
                        Err(e) => {
                            consecutive_failures = consecutive_failures.saturating_add(1);
                            if consecutive_failures >= LOUD_FAILURES {
                                error!(poller = %self.label, error = %e, consecutive_failures, "poll failed repeatedly, will retry next tick");
                            } else {
                                warn!(poller = %self.label, error = %e, "poll failed, will retry next tick");
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Owns the polling task. Dropping it stops the loop and any pending request.
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
