//! Run work on a dedicated thread that pumps a native message loop.
//!
//! Some platform APIs (DDE, raw input, hidden notification windows) only work
//! on a thread that keeps pumping system messages.  [`MessageLoop`] owns such
//! a thread; other threads hand it closures with
//! [`run_async`](MessageLoop::run_async) or
//! [`run_on_thread`](MessageLoop::run_on_thread), and [`Proxy`] /
//! [`facade!`] route every call on a wrapped object through it.

// ── Safety policy ────────────────────────────────────────────────────────────
// Unsafe code is forbidden everywhere except `platform::win32` (Win32 FFI).
// Each unsafe block in that module MUST carry a `// SAFETY:` comment.
#![deny(unsafe_code)]

pub mod config;
pub mod error;
mod message_loop;
pub mod platform;
mod proxy;
mod queue;
mod task;

pub use config::LoopConfig;
pub use error::{BoxError, Cause, PanicPayload, PumpError, Result, TaskFailure};
pub use message_loop::{Identity, LoopState, MessageLoop};
pub use platform::{DefaultPump, Pump, Pumped};
pub use proxy::Proxy;
pub use task::{TaskHandle, TaskStatus};
