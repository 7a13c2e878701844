// ── Work queue ────────────────────────────────────────────────────────────────
//
// Multi-producer, single-consumer FIFO of type-erased tasks.
//
//   • Any thread may `push`; only the loop thread calls `drain` and `close`.
//   • Tasks are never run while the queue lock is held, so a running task may
//     submit more work without deadlocking.
//   • Once closed, `push` fails and the remaining tasks are cancelled exactly
//     once.  Nothing is lost or duplicated across the close.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::{PumpError, Result};
use crate::task::Job;

struct Inner {
    jobs: VecDeque<Job>,
    closed: bool,
}

pub(crate) struct WorkQueue {
    inner: Mutex<Inner>,
}

impl WorkQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                jobs: VecDeque::new(),
                closed: false,
            }),
        }
    }

    /// Append to the tail.  Fails only after `close`.
    pub(crate) fn push(&self, job: Job) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            drop(inner);
            // Dropping the rejected job resolves its handle as cancelled.
            drop(job);
            return Err(PumpError::LoopExited);
        }
        inner.jobs.push_back(job);
        Ok(())
    }

    fn pop(&self) -> Option<Job> {
        self.inner.lock().jobs.pop_front()
    }

    /// Run head tasks until the queue is empty or `stop` returns true.
    ///
    /// Returns the number of tasks taken off the queue.
    pub(crate) fn drain(&self, stop: impl Fn() -> bool) -> usize {
        let mut taken = 0;
        while !stop() {
            let Some(job) = self.pop() else {
                break;
            };
            job.run();
            taken += 1;
        }
        taken
    }

    /// Reject further pushes and cancel whatever is still queued.
    ///
    /// Returns the number of tasks cancelled.
    pub(crate) fn close(&self) -> usize {
        let leftover = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            std::mem::take(&mut inner.jobs)
        };
        let n = leftover.len();
        for job in leftover {
            job.cancel();
        }
        n
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Task, TaskHandle, TaskStatus};
    use std::sync::Arc;
    use std::thread;

    fn push_value(q: &WorkQueue, order: &Arc<Mutex<Vec<u32>>>, v: u32) -> TaskHandle<u32> {
        let order = order.clone();
        let (task, handle) = Task::new(move || {
            order.lock().push(v);
            Ok(v)
        });
        q.push(Box::new(task)).expect("queue open");
        handle
    }

    #[test]
    fn drain_runs_fifo_until_empty() {
        let q = WorkQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (1..=5).map(|v| push_value(&q, &order, v)).collect();
        assert_eq!(q.len(), 5);

        assert_eq!(q.drain(|| false), 5);
        assert_eq!(*order.lock(), vec![1, 2, 3, 4, 5]);
        assert_eq!(q.len(), 0);
        // Draining an empty queue is not an error.
        assert_eq!(q.drain(|| false), 0);
        for h in handles {
            assert_eq!(h.status(), TaskStatus::Completed);
        }
    }

    #[test]
    fn drain_stops_when_asked() {
        let q = WorkQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let _h1 = push_value(&q, &order, 1);
        let _h2 = push_value(&q, &order, 2);
        assert_eq!(q.drain(|| true), 0);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn task_may_push_while_draining() {
        let q = Arc::new(WorkQueue::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let inner_q = q.clone();
        let inner_order = order.clone();
        let (task, _h) = Task::new(move || {
            inner_order.lock().push(1);
            let o = inner_order.clone();
            let (t, _h2) = Task::new(move || {
                o.lock().push(2);
                Ok(())
            });
            inner_q.push(Box::new(t))?;
            Ok(())
        });
        q.push(Box::new(task)).expect("queue open");
        assert_eq!(q.drain(|| false), 2);
        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[test]
    fn close_cancels_leftovers_and_rejects_pushes() {
        let q = WorkQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..3).map(|v| push_value(&q, &order, v)).collect();

        assert_eq!(q.close(), 3);
        assert_eq!(q.close(), 0);
        for h in handles {
            assert!(matches!(h.wait(), Err(PumpError::Cancelled)));
        }

        let (late, late_handle) = Task::new(|| Ok(0u32));
        assert!(matches!(q.push(Box::new(late)), Err(PumpError::LoopExited)));
        assert_eq!(late_handle.status(), TaskStatus::Cancelled);
        assert!(order.lock().is_empty());
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        const PRODUCERS: u32 = 4;
        const PER_PRODUCER: u32 = 250;

        let q = Arc::new(WorkQueue::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let q = q.clone();
                let order = order.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        push_value(&q, &order, p * 10_000 + i);
                    }
                })
            })
            .collect();

        // Consume concurrently with the producers.
        let mut drained = 0;
        while drained < (PRODUCERS * PER_PRODUCER) as usize {
            drained += q.drain(|| false);
            thread::yield_now();
        }
        for p in producers {
            p.join().expect("producer thread");
        }

        let seen = order.lock().clone();
        assert_eq!(seen.len(), (PRODUCERS * PER_PRODUCER) as usize);
        for p in 0..PRODUCERS {
            let mine: Vec<u32> = seen.iter().copied().filter(|v| v / 10_000 == p).collect();
            let expected: Vec<u32> = (0..PER_PRODUCER).map(|i| p * 10_000 + i).collect();
            assert_eq!(mine, expected, "producer {p} order");
        }
    }
}
