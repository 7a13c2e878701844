// ── Platform abstraction layer ────────────────────────────────────────────────
//
// The loop thread talks to the OS only through `Pump`.  No `unsafe` lives
// here; all Win32 FFI is confined to the `win32` sub-module and never leaks
// outward.

use std::fmt;

use crate::error::Result;

pub mod portable;
#[cfg(windows)]
pub mod win32;

/// What one blocking turn of the native loop produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pumped {
    /// A message arrived and was handed to its native handler (wake-ups
    /// included).
    Dispatched,
    /// The quit signal was observed.  The loop must exit.
    Quit,
}

/// Native message primitives consumed by [`MessageLoop`](crate::MessageLoop).
///
/// `prepare` and `pump_once` are only ever called on the loop thread;
/// `wake` and `request_quit` are called from any thread.
pub trait Pump: Send + Sync + 'static {
    /// OS-level identifier used to address the loop thread.
    type ThreadId: Copy + Eq + fmt::Debug + Send + Sync + 'static;

    /// Make sure the calling thread owns a native message queue, then return
    /// its OS-level id.  Called once, before the identity is published.
    fn prepare(&self) -> Result<Self::ThreadId>;

    /// Block until a message arrives (dispatch it) or the quit signal does.
    fn pump_once(&self) -> Result<Pumped>;

    /// Deliver a no-op message so a blocked `pump_once` returns.
    fn wake(&self, thread: Self::ThreadId) -> Result<()>;

    /// Deliver the quit signal to `thread`'s current or next `pump_once`.
    fn request_quit(&self, thread: Self::ThreadId) -> Result<()>;
}

/// Pump used by `MessageLoop::new()`.
#[cfg(windows)]
pub type DefaultPump = win32::Win32Pump;

/// Pump used by `MessageLoop::new()`.
#[cfg(not(windows))]
pub type DefaultPump = portable::ChannelPump;
