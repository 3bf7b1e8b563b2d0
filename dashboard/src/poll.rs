//! Fixed-interval polling for views.
//!
//! Every tick gets a sequence number. A result is published only when it is
//! newer than the last published one, and publishing aborts any older fetch
//! still in flight. Dropping the [`PollHandle`] stops the task and every
//! outstanding fetch.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct PollSnapshot<T> {
    /// Sequence number of the request that produced this snapshot.
    pub seq: u64,
    pub value: Option<T>,
    pub last_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for PollSnapshot<T> {
    fn default() -> Self {
        Self {
            seq: 0,
            value: None,
            last_error: None,
            updated_at: None,
        }
    }
}

pub struct PollHandle<T> {
    name: &'static str,
    rx: watch::Receiver<PollSnapshot<T>>,
    refresh: Arc<Notify>,
    task: JoinHandle<()>,
}

impl<T: Clone> PollHandle<T> {
    pub fn latest(&self) -> PollSnapshot<T> {
        self.rx.borrow().clone()
    }
}

impl<T> PollHandle<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot<T>> {
        self.rx.clone()
    }

    /// Fetch now instead of waiting for the next tick.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn cancel(self) {}
}

impl<T> Drop for PollHandle<T> {
    fn drop(&mut self) {
        debug!(poller = self.name, "Stopping poller");
        self.task.abort();
    }
}

/// Starts polling `fetch` every `every`, beginning immediately.
pub fn spawn_poller<T, F, Fut>(name: &'static str, every: Duration, fetch: F) -> PollHandle<T>
where
    T: Send + Sync + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let (tx, rx) = watch::channel(PollSnapshot::default());
    let refresh = Arc::new(Notify::new());
    let task = tokio::spawn(drive(name, every, fetch, tx, refresh.clone()));
    PollHandle {
        name,
        rx,
        refresh,
        task,
    }
}

async fn drive<T, F, Fut>(
    name: &'static str,
    every: Duration,
    mut fetch: F,
    tx: watch::Sender<PollSnapshot<T>>,
    refresh: Arc<Notify>,
) where
    T: Send + Sync + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let mut ticker = time::interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: JoinSet<(u64, Result<T>)> = JoinSet::new();
    let mut pending: VecDeque<(u64, AbortHandle)> = VecDeque::new();
    let mut next_seq = 0u64;
    let mut published = 0u64;

    loop {
        let start = tokio::select! {
            _ = ticker.tick() => true,
            _ = refresh.notified() => {
                ticker.reset();
                true
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                match joined {
                    Ok((seq, result)) if seq > published => {
                        published = seq;
                        while pending.front().is_some_and(|(s, _)| *s <= seq) {
                            if let Some((_, stale)) = pending.pop_front() {
                                stale.abort();
                            }
                        }
                        publish(name, &tx, seq, result);
                    }
                    Ok((seq, _)) => debug!(poller = name, seq, published, "Discarding stale poll result"),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => warn!(poller = name, error = %e, "Poll task panicked"),
                }
                false
            }
        };

        if start {
            next_seq += 1;
            let seq = next_seq;
            let request = fetch();
            let handle = in_flight.spawn(async move { (seq, request.await) });
            pending.push_back((seq, handle));
        }
    }
}

fn publish<T>(name: &'static str, tx: &watch::Sender<PollSnapshot<T>>, seq: u64, result: Result<T>) {
    match result {
        Ok(value) => tx.send_modify(|snap| {
            snap.seq = seq;
            snap.value = Some(value);
            snap.last_error = None;
            snap.updated_at = Some(Utc::now());
        }),
        Err(e) => {
            warn!(poller = name, seq, error = %e, "Poll request failed");
            tx.send_modify(|snap| {
                snap.seq = seq;
                snap.last_error = Some(e.to_string());
            });
        }
    }
}
