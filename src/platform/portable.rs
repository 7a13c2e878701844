// ── Portable pump ─────────────────────────────────────────────────────────────
//
// Channel-backed stand-in for a native thread message queue.  Wake-ups, quit
// requests and posted messages share one FIFO, exactly like thread messages
// posted with `PostThreadMessageW`.  Used as the default pump off Windows and
// by the test suite everywhere.

use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;
use std::thread::{self, ThreadId};

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::{payload_message, PumpError, Result};
use crate::platform::{Pump, Pumped};

/// Native-handler stand-in: runs on the loop thread when dispatched.
pub type MessageHandler = Box<dyn FnOnce() + Send + 'static>;

enum Signal {
    Wake,
    Quit,
    Message(MessageHandler),
}

/// A message queue for exactly one loop thread.
pub struct ChannelPump {
    tx: Sender<Signal>,
    rx: Receiver<Signal>,
    owner: OnceLock<ThreadId>,
}

impl ChannelPump {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            tx,
            rx,
            owner: OnceLock::new(),
        }
    }

    /// Post a message whose handler runs on the loop thread during the
    /// dispatch step, after any queued work has been drained.
    pub fn post_message(&self, handler: impl FnOnce() + Send + 'static) -> Result<()> {
        self.send(Signal::Message(Box::new(handler)))
    }

    fn send(&self, signal: Signal) -> Result<()> {
        // We hold a receiver, so the channel cannot be disconnected.
        self.tx.send(signal).map_err(|_| PumpError::LoopExited)
    }

    fn check_target(&self, target: ThreadId) -> Result<()> {
        match self.owner.get() {
            Some(owner) if *owner == target => Ok(()),
            Some(_) => Err(PumpError::LoopExited),
            None => Err(PumpError::NotStarted),
        }
    }
}

impl Default for ChannelPump {
    fn default() -> Self {
        Self::new()
    }
}

impl Pump for ChannelPump {
    type ThreadId = ThreadId;

    fn prepare(&self) -> Result<ThreadId> {
        let me = thread::current().id();
        if *self.owner.get_or_init(|| me) != me {
            return Err(PumpError::AlreadyStarted);
        }
        Ok(me)
    }

    fn pump_once(&self) -> Result<Pumped> {
        match self.rx.recv() {
            Ok(Signal::Wake) => Ok(Pumped::Dispatched),
            Ok(Signal::Message(handler)) => {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(handler)) {
                    tracing::error!(
                        panic = %payload_message(payload.as_ref()),
                        "message handler panicked"
                    );
                }
                Ok(Pumped::Dispatched)
            }
            Ok(Signal::Quit) | Err(_) => Ok(Pumped::Quit),
        }
    }

    fn wake(&self, thread: ThreadId) -> Result<()> {
        self.check_target(thread)?;
        self.send(Signal::Wake)
    }

    fn request_quit(&self, thread: ThreadId) -> Result<()> {
        self.check_target(thread)?;
        self.send(Signal::Quit)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
