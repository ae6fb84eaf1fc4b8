use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::op::Op;
use crate::poller::FeedHandle;

/// Something that can be forced to re-fetch out of cycle.
pub trait Resync: Send + Sync {
    fn resync(&self) -> bool;
}

impl<T: Send + 'static> Resync for FeedHandle<T> {
    fn resync(&self) -> bool {
        self.refresh_now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation<R> {
    /// Another invocation was still in flight; the action did not run.
    Skipped,
    Succeeded(R),
    Failed(String),
}

/// Runs administrative actions one at a time and resyncs the status feed after
/// each success.
pub struct ActionOrchestrator {
    busy: AtomicBool,
    last: Mutex<Op<String>>,
    resync: Option<Arc<dyn Resync>>,
}

impl ActionOrchestrator {
    pub fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            last: Mutex::new(Op::Idle),
            resync: None,
        }
    }

    pub fn with_resync(resync: Arc<dyn Resync>) -> Self {
        Self {
            resync: Some(resync),
            ..Self::new()
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// `Success(label)` of the last completed action, or `Failure(message)`.
    pub fn last(&self) -> Op<String> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn invoke<R, F>(&self, action: F, success_label: &str) -> Invocation<R>
    where
        F: FnOnce() -> Result<R, ApiError>,
    {
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            debug!(action = success_label, "action already in flight, ignoring trigger");
            return Invocation::Skipped;
        };
        self.set_last(Op::Pending);

        match action() {
            Ok(reply) => {
                info!("{success_label}");
                self.set_last(Op::Success(success_label.to_string()));
                if let Some(resync) = self.resync.as_ref() {
                    if !resync.resync() {
                        debug!("status resync was not applied");
                    }
                }
                Invocation::Succeeded(reply)
            }
            Err(err) => {
                let message = match err {
                    ApiError::Action(msg) => msg,
                    other => other.to_string(),
                };
                warn!("action failed: {message}");
                self.set_last(Op::Failure(message.clone()));
                Invocation::Failed(message)
            }
        }
    }

    fn set_last(&self, op: Op<String>) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = op;
    }
}

impl Default for ActionOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the busy flag for the duration of one invocation.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
