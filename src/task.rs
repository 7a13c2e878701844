// ── Tasks ─────────────────────────────────────────────────────────────────────
//
// A `Task` is one deferred closure plus the slot its outcome lands in.  The
// queue owns the task until the loop thread takes it; the producer keeps only
// a `TaskHandle` pointing at the shared slot.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{BoxError, Cause, PumpError, Result, TaskFailure};

type Work<V> = Box<dyn FnOnce() -> std::result::Result<V, BoxError> + Send + 'static>;

// ── Status ────────────────────────────────────────────────────────────────────

/// Observable lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

enum Outcome<V> {
    Pending,
    Running,
    Completed(V),
    Failed(TaskFailure),
    Cancelled,
}

impl<V> Outcome<V> {
    fn status(&self) -> TaskStatus {
        match self {
            Self::Pending => TaskStatus::Pending,
            Self::Running => TaskStatus::Running,
            Self::Completed(_) => TaskStatus::Completed,
            Self::Failed(_) => TaskStatus::Failed,
            Self::Cancelled => TaskStatus::Cancelled,
        }
    }

    fn is_final(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

struct Slot<V> {
    outcome: Mutex<Outcome<V>>,
    done: Condvar,
}

impl<V> Slot<V> {
    fn finish(&self, outcome: Outcome<V>) {
        *self.outcome.lock() = outcome;
        self.done.notify_all();
    }

    /// Pending → Cancelled. Returns false if the task already left Pending.
    fn cancel(&self) -> bool {
        let mut guard = self.outcome.lock();
        if !matches!(*guard, Outcome::Pending) {
            return false;
        }
        *guard = Outcome::Cancelled;
        drop(guard);
        self.done.notify_all();
        true
    }
}

// ── Runnable ──────────────────────────────────────────────────────────────────

/// Type-erased task as stored in the work queue.
pub(crate) trait Runnable: Send {
    /// Execute on the loop thread. Never unwinds.
    fn run(self: Box<Self>);
    /// Mark cancelled without running.
    fn cancel(self: Box<Self>);
}

pub(crate) type Job = Box<dyn Runnable>;

/// A deferred computation and the slot its outcome is written to.
pub(crate) struct Task<V> {
    work: Option<Work<V>>,
    slot: Arc<Slot<V>>,
}

impl<V: Send + 'static> Task<V> {
    /// Build a task and the handle that observes it.
    pub(crate) fn new<F>(work: F) -> (Self, TaskHandle<V>)
    where
        F: FnOnce() -> std::result::Result<V, BoxError> + Send + 'static,
    {
        let slot = Arc::new(Slot {
            outcome: Mutex::new(Outcome::Pending),
            done: Condvar::new(),
        });
        let handle = TaskHandle { slot: slot.clone() };
        (
            Self {
                work: Some(Box::new(work)),
                slot,
            },
            handle,
        )
    }
}

impl<V: Send + 'static> Runnable for Task<V> {
    fn run(mut self: Box<Self>) {
        {
            let mut guard = self.slot.outcome.lock();
            if !matches!(*guard, Outcome::Pending) {
                // Cancelled through its handle while queued.
                return;
            }
            *guard = Outcome::Running;
        }

        let Some(work) = self.work.take() else {
            return;
        };

        let outcome = match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(value)) => Outcome::Completed(value),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "task returned an error");
                Outcome::Failed(TaskFailure::capture(Cause::Error(e)))
            }
            Err(payload) => {
                let cause = Cause::panic(payload);
                tracing::warn!(panic = %cause, "task panicked on loop thread");
                Outcome::Failed(TaskFailure::capture(cause))
            }
        };
        self.slot.finish(outcome);
    }

    fn cancel(self: Box<Self>) {
        // Drop does the work.
    }
}

impl<V> Drop for Task<V> {
    fn drop(&mut self) {
        // A task that never ran must not leave its handle waiting forever.
        self.slot.cancel();
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Non-owning view of a submitted task's outcome.
pub struct TaskHandle<V> {
    slot: Arc<Slot<V>>,
}

impl<V> TaskHandle<V> {
    /// Block until the task completes, fails, or is cancelled.
    pub fn wait(self) -> Result<V> {
        let mut guard = self.slot.outcome.lock();
        while !guard.is_final() {
            self.slot.done.wait(&mut guard);
        }
        // The handle is consumed, so nobody observes the slot after this.
        match std::mem::replace(&mut *guard, Outcome::Cancelled) {
            Outcome::Completed(v) => Ok(v),
            Outcome::Failed(f) => Err(PumpError::from(f)),
            Outcome::Cancelled => Err(PumpError::Cancelled),
            Outcome::Pending | Outcome::Running => unreachable!("waited for a final outcome"),
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.slot.outcome.lock().status()
    }

    pub fn is_finished(&self) -> bool {
        self.slot.outcome.lock().is_final()
    }

    /// Best-effort cancel. Succeeds only while the task is still queued.
    pub fn cancel(&self) -> bool {
        self.slot.cancel()
    }
}

impl<V> std::fmt::Debug for TaskHandle<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("status", &self.status())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
