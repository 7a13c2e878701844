// ── Message loop thread ───────────────────────────────────────────────────────
//
// One dedicated thread owns one native message queue.  Lifecycle:
//
//   Created → Starting → Ready → (drain ⇄ pump)* → Exiting → Terminated
//
//   • `Ready` is entered only after the pump has prepared the native queue and
//     the thread's identity has been published.
//   • The loop drains the work queue right after publishing, so work queued
//     while the identity was still unset is picked up without a wake-up.
//   • Every task still queued when the loop exits is cancelled, never dropped
//     silently; once `Terminated`, submissions fail with `LoopExited`.
//   • Wake and quit messages are posted only while the state lock shows the
//     loop below `Exiting`.  The loop cannot leave without taking that lock,
//     so its native thread id is still its own when the post lands.
//   • Dropping the last `MessageLoop` handle asks the loop to quit.

use std::backtrace::Backtrace;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::config::LoopConfig;
use crate::error::{BoxError, Cause, PumpError, Result, TaskFailure};
use crate::platform::{DefaultPump, Pump, Pumped};
use crate::queue::WorkQueue;
use crate::task::{Task, TaskHandle};

// ── State ─────────────────────────────────────────────────────────────────────

/// Where the loop thread is in its lifecycle.  Ordered: later states compare
/// greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoopState {
    /// Constructed, thread not spawned.
    Created,
    /// Thread spawned, identity not yet published.
    Starting,
    /// Identity published; draining work and pumping messages.
    Ready,
    /// Quit observed; cancelling leftover work.
    Exiting,
    Terminated,
}

/// The loop thread's two identities, published once before `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity<Id> {
    /// Native id used to post wake and quit messages.
    pub os: Id,
    /// Rust thread id used to detect calls made from the loop thread itself.
    pub logical: ThreadId,
}

struct Shared<P: Pump> {
    pump: P,
    config: LoopConfig,
    queue: WorkQueue,
    identity: OnceLock<Identity<P::ThreadId>>,
    state: Mutex<LoopState>,
    state_changed: Condvar,
    quit_requested: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<P: Pump> Shared<P> {
    fn state(&self) -> LoopState {
        *self.state.lock()
    }

    fn set_state(&self, next: LoopState) {
        *self.state.lock() = next;
        self.state_changed.notify_all();
    }

    /// Block until the state reaches at least `target`.
    fn wait_for(&self, target: LoopState) -> LoopState {
        let mut state = self.state.lock();
        while *state < target {
            self.state_changed.wait(&mut state);
        }
        *state
    }

    /// Body of the loop thread.
    fn run(&self) {
        let os = match self.pump.prepare() {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(error = %e, "message loop could not prepare its queue");
                self.terminate();
                return;
            }
        };

        let identity = Identity {
            os,
            logical: thread::current().id(),
        };
        // Only this thread ever sets the identity, and only here.
        let _ = self.identity.set(identity);
        self.set_state(LoopState::Ready);
        tracing::debug!(thread = ?identity.os, "message loop ready");

        loop {
            // Also covers a quit asked for before the identity existed.
            if self.quit_requested.load(Ordering::Acquire) {
                break;
            }
            let ran = self
                .queue
                .drain(|| self.quit_requested.load(Ordering::Acquire));
            if ran > 0 {
                tracing::trace!(ran, "drained work queue");
            }

            match self.pump.pump_once() {
                Ok(Pumped::Dispatched) => {}
                Ok(Pumped::Quit) => break,
                Err(e) => {
                    tracing::error!(error = %e, "message pump failed; exiting loop");
                    break;
                }
            }
        }

        self.terminate();
    }

    /// Wake the loop if it is running.
    ///
    /// Before `Ready` there is nothing to wake: the loop drains right after
    /// it publishes.  From `Exiting` on the queue is closed or about to be.
    fn wake(&self) {
        let state = self.state.lock();
        if *state != LoopState::Ready {
            return;
        }
        let Some(identity) = self.identity.get() else {
            return;
        };
        if let Err(e) = self.pump.wake(identity.os) {
            tracing::warn!(error = %e, "failed to wake message loop");
        }
    }

    /// Set the quit flag and post the quit message, under the state lock.
    fn request_quit(&self) -> Result<()> {
        let state = self.state.lock();
        match *state {
            LoopState::Created | LoopState::Starting => Err(PumpError::NotStarted),
            LoopState::Exiting | LoopState::Terminated => Ok(()),
            LoopState::Ready => {
                let Some(identity) = self.identity.get() else {
                    return Err(PumpError::NotStarted);
                };
                self.quit_requested.store(true, Ordering::Release);
                self.pump.request_quit(identity.os)
            }
        }
    }

    /// The last handle went away: stop the loop whatever state it is in.
    fn release(&self) {
        let state = {
            let state = self.state.lock();
            self.quit_requested.store(true, Ordering::Release);
            *state
        };
        match state {
            // Never started; nobody can start it now.
            LoopState::Created => self.terminate(),
            // Sees the flag right after publishing.
            LoopState::Starting => {}
            LoopState::Ready => {
                if let Err(e) = self.request_quit() {
                    tracing::warn!(error = %e, "failed to stop released message loop");
                }
            }
            LoopState::Exiting | LoopState::Terminated => {}
        }
        tracing::debug!(?state, "last message loop handle dropped");
    }

    fn terminate(&self) {
        self.set_state(LoopState::Exiting);
        let cancelled = self.queue.close();
        if cancelled > 0 {
            tracing::debug!(cancelled, "cancelled queued tasks at exit");
        }
        self.set_state(LoopState::Terminated);
        tracing::debug!("message loop terminated");
    }
}

// ── Public handle ─────────────────────────────────────────────────────────────

/// Handle to a dedicated thread running a native message loop.
///
/// Cheap to clone; all clones address the same thread.  Work submitted from
/// any thread runs on the loop thread in submission order.
///
/// Dropping the last clone (including those held by [`Proxy`] values and by
/// queued closures) requests a quit, like [`exit`]: unstarted work is
/// cancelled and the thread ends on its own.  Call [`shutdown`] instead to
/// also wait for the thread.
///
/// [`Proxy`]: crate::Proxy
/// [`exit`]: Self::exit
/// [`shutdown`]: Self::shutdown
pub struct MessageLoop<P: Pump = DefaultPump> {
    shared: Arc<Shared<P>>,
    _owners: Arc<Owners<P>>,
}

/// Shared by every user-facing handle but not by the loop thread itself.
struct Owners<P: Pump>(Arc<Shared<P>>);

impl<P: Pump> Drop for Owners<P> {
    fn drop(&mut self) {
        self.0.release();
    }
}

impl<P: Pump> Clone for MessageLoop<P> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            _owners: self._owners.clone(),
        }
    }
}

impl MessageLoop<DefaultPump> {
    /// Create an unstarted loop on the platform's native pump.
    pub fn new() -> Self {
        Self::with_pump(DefaultPump::default())
    }

    /// Create and start a loop on the platform's native pump.
    pub fn spawn() -> Result<Self> {
        let ml = Self::new();
        ml.start()?;
        Ok(ml)
    }
}

impl Default for MessageLoop<DefaultPump> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Pump> MessageLoop<P> {
    pub fn with_pump(pump: P) -> Self {
        Self::with_config(pump, LoopConfig::default())
    }

    pub fn with_config(pump: P, config: LoopConfig) -> Self {
        let shared = Arc::new(Shared {
            pump,
            config,
            queue: WorkQueue::new(),
            identity: OnceLock::new(),
            state: Mutex::new(LoopState::Created),
            state_changed: Condvar::new(),
            quit_requested: AtomicBool::new(false),
            thread: Mutex::new(None),
        });
        Self {
            _owners: Arc::new(Owners(shared.clone())),
            shared,
        }
    }

    /// Spawn the loop thread.  Returns immediately; use [`wait_ready`] to
    /// block until the identity is published.
    ///
    /// [`wait_ready`]: Self::wait_ready
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if *state != LoopState::Created {
                return Err(PumpError::AlreadyStarted);
            }
            *state = LoopState::Starting;
        }

        let mut builder = thread::Builder::new().name(self.shared.config.thread_name.clone());
        if let Some(size) = self.shared.config.stack_size {
            builder = builder.stack_size(size);
        }

        // Hold the slot across the spawn so `join` never sees a gap.
        let mut slot = self.shared.thread.lock();
        let shared = self.shared.clone();
        match builder.spawn(move || shared.run()) {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(())
            }
            Err(e) => {
                drop(slot);
                self.shared.terminate();
                Err(e.into())
            }
        }
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Queue `work` for the loop thread and return without waiting.
    ///
    /// Never blocks: before the identity is published the task is queued and
    /// picked up as soon as the loop becomes ready.  Fails with
    /// [`PumpError::LoopExited`] once the loop has terminated.
    pub fn run_async<F, V>(&self, work: F) -> Result<TaskHandle<V>>
    where
        F: FnOnce() -> V + Send + 'static,
        V: Send + 'static,
    {
        let (task, handle) = Task::new(move || Ok(work()));
        self.submit(task, handle)
    }

    /// As [`run_async`](Self::run_async), for work that can fail.  An `Err`
    /// is delivered through the handle as [`PumpError::Task`].
    pub fn try_run_async<F, V, E>(&self, work: F) -> Result<TaskHandle<V>>
    where
        F: FnOnce() -> std::result::Result<V, E> + Send + 'static,
        V: Send + 'static,
        E: Into<BoxError>,
    {
        let (task, handle) = Task::new(move || work().map_err(Into::into));
        self.submit(task, handle)
    }

    fn submit<V>(&self, task: Task<V>, handle: TaskHandle<V>) -> Result<TaskHandle<V>>
    where
        V: Send + 'static,
    {
        self.shared.queue.push(Box::new(task))?;
        self.shared.wake();
        Ok(handle)
    }

    /// Run `work` on the loop thread and block until it returns.
    ///
    /// Called from the loop thread itself, `work` runs in place without
    /// touching the queue.  A panic in `work` comes back as
    /// [`PumpError::Task`] carrying both the loop-thread and the caller's
    /// stack.
    pub fn run_on_thread<F, V>(&self, work: F) -> Result<V>
    where
        F: FnOnce() -> V + Send + 'static,
        V: Send + 'static,
    {
        if self.is_loop_thread() {
            return Ok(work());
        }
        let site = Backtrace::capture();
        self.run_async(work)?
            .wait()
            .map_err(|e| stitch(e, site))
    }

    /// As [`run_on_thread`](Self::run_on_thread), for work that can fail.
    ///
    /// The error value reaches the caller unchanged inside the returned
    /// [`TaskFailure`]; use [`TaskFailure::downcast_ref`] to get it back.
    pub fn try_run_on_thread<F, V, E>(&self, work: F) -> Result<V>
    where
        F: FnOnce() -> std::result::Result<V, E> + Send + 'static,
        V: Send + 'static,
        E: Into<BoxError>,
    {
        if self.is_loop_thread() {
            return work()
                .map_err(|e| PumpError::from(TaskFailure::capture(Cause::Error(e.into()))));
        }
        let site = Backtrace::capture();
        self.try_run_async(work)?
            .wait()
            .map_err(|e| stitch(e, site))
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────

    /// Ask the loop to quit.
    ///
    /// Tasks that have not started by the time the quit is observed are
    /// cancelled.  Must be called after the identity is published (see
    /// [`wait_ready`](Self::wait_ready)); earlier calls fail with
    /// [`PumpError::NotStarted`].  Calling it on an exiting or terminated loop
    /// is a no-op, and posts nothing: a terminated loop's native thread id
    /// may already belong to another thread.
    pub fn exit(&self) -> Result<()> {
        self.shared.request_quit()
    }

    /// Block until the loop thread has terminated.
    ///
    /// Must not be called from the loop thread.
    pub fn join(&self) -> Result<()> {
        if self.is_loop_thread() {
            return Err(PumpError::ReentrantCall);
        }
        if self.state() == LoopState::Created {
            return Err(PumpError::NotStarted);
        }

        self.shared.wait_for(LoopState::Terminated);
        let handle = self.shared.thread.lock().take();
        if let Some(handle) = handle {
            handle.join().map_err(|_| PumpError::LoopPanicked)?;
        }
        Ok(())
    }

    /// `exit` followed by `join`.
    pub fn shutdown(&self) -> Result<()> {
        self.exit()?;
        self.join()
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    /// Block until the loop has published its identity.
    ///
    /// Fails with [`PumpError::LoopExited`] if the loop is already exiting or
    /// never managed to start.  Blocks indefinitely on a loop that is never
    /// started.
    pub fn wait_ready(&self) -> Result<Identity<P::ThreadId>> {
        let state = self.shared.wait_for(LoopState::Ready);
        match self.shared.identity.get() {
            Some(identity) if state == LoopState::Ready => Ok(*identity),
            _ => Err(PumpError::LoopExited),
        }
    }

    /// The published identity, if any.
    pub fn identity(&self) -> Option<Identity<P::ThreadId>> {
        self.shared.identity.get().copied()
    }

    pub fn state(&self) -> LoopState {
        self.shared.state()
    }

    /// True when called on the loop thread.
    pub fn is_loop_thread(&self) -> bool {
        self.shared
            .identity
            .get()
            .is_some_and(|id| id.logical == thread::current().id())
    }

    /// Number of tasks waiting in the queue.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn pump(&self) -> &P {
        &self.shared.pump
    }

    pub fn config(&self) -> &LoopConfig {
        &self.shared.config
    }
}

impl<P: Pump> fmt::Debug for MessageLoop<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageLoop")
            .field("thread_name", &self.shared.config.thread_name)
            .field("state", &self.state())
            .field("identity", &self.identity())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Attach the caller's stack to a failure coming back from the loop thread.
fn stitch(e: PumpError, site: Backtrace) -> PumpError {
    match e {
        PumpError::Task(failure) => PumpError::from((*failure).submitted_from(site)),
        other => other,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
