use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::op::Op;

const MIN_INTERVAL: Duration = Duration::from_millis(50);

type FetchFn<T> = dyn Fn() -> Result<T, ApiError> + Send + Sync;

/// What a view renders for one feed.
#[derive(Debug, Clone)]
pub struct FeedState<T> {
    /// Last successfully fetched snapshot. Survives failed cycles.
    pub snapshot: Option<T>,
    /// `Pending` only while the very first cycle is in flight.
    pub status: Op<()>,
    /// Cycles whose result was applied, failures included.
    pub cycles: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> FeedState<T> {
    fn empty() -> Self {
        Self {
            snapshot: None,
            status: Op::Idle,
            cycles: 0,
            updated_at: None,
        }
    }

    pub fn loading(&self) -> bool {
        self.status.is_pending()
    }

    pub fn error(&self) -> Option<&str> {
        self.status.failure().map(String::as_str)
    }
}

struct FeedInner<T> {
    state: FeedState<T>,
    live: bool,
    issued: u64,
    applied: Option<u64>,
    in_flight: usize,
}

struct Feed<T> {
    name: String,
    fetch: Box<FetchFn<T>>,
    inner: Mutex<FeedInner<T>>,
    settled: Condvar,
}

impl<T> Feed<T> {
    fn lock(&self) -> MutexGuard<'_, FeedInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_live(&self) -> bool {
        self.lock().live
    }

    /// Issues a ticket for one cycle. Periodic ticks are skipped while another
    /// cycle of this feed is still in flight; forced refreshes always run.
    fn begin(&self, forced: bool) -> Option<u64> {
        let mut inner = self.lock();
        if !inner.live {
            return None;
        }
        if !forced && inner.in_flight > 0 {
            debug!(feed = %self.name, "cycle still in flight, skipping tick");
            return None;
        }
        let ticket = inner.issued;
        inner.issued += 1;
        inner.in_flight += 1;
        if ticket == 0 {
            inner.state.status = Op::Pending;
        } else if !inner.state.status.is_pending() {
            inner.state.status = Op::Idle;
        }
        Some(ticket)
    }

    fn finish(&self, ticket: u64, result: Result<T, ApiError>) -> bool {
        let mut inner = self.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        if !inner.live {
            debug!(feed = %self.name, "feed stopped, dropping late result");
            return false;
        }
        if inner.applied.is_some_and(|applied| applied > ticket) {
            debug!(feed = %self.name, ticket, "newer cycle already applied, dropping result");
            return false;
        }
        inner.applied = Some(ticket);
        match result {
            Ok(snapshot) => {
                inner.state.snapshot = Some(snapshot);
                inner.state.status = Op::Success(());
                inner.state.updated_at = Some(Utc::now());
            }
            Err(err) => {
                warn!(feed = %self.name, "fetch failed: {err}");
                inner.state.status = Op::Failure(err.to_string());
            }
        }
        inner.state.cycles += 1;
        self.settled.notify_all();
        true
    }

    fn run_cycle(&self, forced: bool) -> bool {
        let Some(ticket) = self.begin(forced) else {
            return false;
        };
        let result = (self.fetch)();
        self.finish(ticket, result)
    }
}

/// Owning side of a live feed. Dropping it (or calling `stop`) cancels the
/// timer, and any fetch still in flight is ignored when it lands.
pub struct Poller<T> {
    feed: Arc<Feed<T>>,
    stop_tx: Sender<()>,
}

impl<T: Send + 'static> Poller<T> {
    pub fn start<F>(name: &str, interval: Duration, fetch: F) -> Self
    where
        F: Fn() -> Result<T, ApiError> + Send + Sync + 'static,
    {
        let interval = interval.max(MIN_INTERVAL);
        let feed = Arc::new(Feed {
            name: name.to_string(),
            fetch: Box::new(fetch),
            inner: Mutex::new(FeedInner {
                state: FeedState::empty(),
                live: true,
                issued: 0,
                applied: None,
                in_flight: 0,
            }),
            settled: Condvar::new(),
        });
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        info!(feed = %name, interval_ms = interval.as_millis() as u64, "poller started");
        let worker = feed.clone();
        thread::spawn(move || {
            let mut next = Instant::now();
            loop {
                let wait = next.saturating_duration_since(Instant::now());
                match stop_rx.recv_timeout(wait) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                if !worker.is_live() {
                    break;
                }

                let started = Instant::now();
                worker.run_cycle(false);

                let Some((tick, skipped)) = next_tick(started, interval, Instant::now()) else {
                    warn!(feed = %worker.name, "interval out of clock range, no further ticks");
                    let _ = stop_rx.recv();
                    break;
                };
                next = tick;
                if skipped > 0 {
                    debug!(feed = %worker.name, skipped, "fetch overran the interval");
                }
            }
            debug!(feed = %worker.name, "poller thread exited");
        });

        Self { feed, stop_tx }
    }
}

impl<T> Poller<T> {
    pub fn handle(&self) -> FeedHandle<T> {
        FeedHandle {
            feed: self.feed.clone(),
        }
    }

    /// Idempotent.
    pub fn stop(&self) {
        let mut inner = self.feed.lock();
        if !inner.live {
            return;
        }
        inner.live = false;
        self.feed.settled.notify_all();
        drop(inner);
        let _ = self.stop_tx.send(());
        info!(feed = %self.feed.name, "poller stopped");
    }
}

impl<T> Drop for Poller<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Shared read/refresh access to a feed. Cannot stop it.
pub struct FeedHandle<T> {
    feed: Arc<Feed<T>>,
}

impl<T> Clone for FeedHandle<T> {
    fn clone(&self) -> Self {
        Self {
            feed: self.feed.clone(),
        }
    }
}

impl<T: Clone> FeedHandle<T> {
    pub fn state(&self) -> FeedState<T> {
        self.feed.lock().state.clone()
    }

    pub fn snapshot(&self) -> Option<T> {
        self.feed.lock().state.snapshot.clone()
    }
}

impl<T> FeedHandle<T> {
    pub fn name(&self) -> &str {
        &self.feed.name
    }

    pub fn is_live(&self) -> bool {
        self.feed.is_live()
    }

    /// Runs one out-of-cycle fetch on the calling thread. Returns whether its
    /// result was applied.
    pub fn refresh_now(&self) -> bool {
        self.feed.run_cycle(true)
    }

    /// Blocks until at least `cycles` cycles have been applied, the feed
    /// stops, or `timeout` passes.
    pub fn wait_for_cycles(&self, cycles: u64, timeout: Duration) -> bool {
        let inner = self.feed.lock();
        let (inner, _) = self
            .feed
            .settled
            .wait_timeout_while(inner, timeout, |inner| {
                inner.live && inner.state.cycles < cycles
            })
            .unwrap_or_else(PoisonError::into_inner);
        inner.state.cycles >= cycles
    }
}

/// First tick on the `interval` grid anchored at `started` that lies after `now`,
/// with the number of ticks passed over. `None` past the range of `Instant`.
fn next_tick(started: Instant, interval: Duration, now: Instant) -> Option<(Instant, u32)> {
    let mut next = started.checked_add(interval)?;
    let mut skipped = 0u32;
    while next <= now {
        next = next.checked_add(interval)?;
        skipped = skipped.saturating_add(1);
    }
    Some((next, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_tick_skips_overrun_ticks() {
        let started = Instant::now();
        let interval = Duration::from_millis(100);
        let now = started + Duration::from_millis(350);
        let (next, skipped) = next_tick(started, interval, now).expect("in range");
        assert_eq!(next, started + Duration::from_millis(400));
        assert_eq!(skipped, 3);
    }

    #[test]
    fn next_tick_without_overrun() {
        let started = Instant::now();
        let interval = Duration::from_secs(5);
        let (next, skipped) = next_tick(started, interval, started).expect("in range");
        assert_eq!(next, started + interval);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn next_tick_beyond_clock_range_is_none() {
        let started = Instant::now();
        assert!(next_tick(started, Duration::MAX, started).is_none());
    }

    #[test]
    fn huge_interval_still_fetches_once_and_stops() {
        let poller = Poller::start("huge", Duration::MAX, || Ok::<_, ApiError>(7u8));
        let handle = poller.handle();
        assert!(handle.wait_for_cycles(1, Duration::from_secs(5)));
        assert_eq!(handle.snapshot(), Some(7));
        poller.stop();
        assert!(!handle.is_live());
    }
}
