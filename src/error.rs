// ── Central error type ────────────────────────────────────────────────────────
//
// All fallible operations in msgpump return `error::Result<T>`.  Failures of
// marshalled work never unwind the loop thread; they are parked in the task's
// handle and surface here when the caller observes it.

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;

use parking_lot::Mutex;

/// Boxed error produced by fallible work submitted to the loop thread.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Every error that msgpump can produce.
#[derive(Debug, thiserror::Error)]
pub enum PumpError {
    /// A Win32 API call returned a failure code.
    #[error("{function} failed (error {code:#010x})")]
    Win32 {
        /// The name of the failing function, for display purposes.
        function: &'static str,
        /// The raw Win32 error code (`GetLastError()` value) or HRESULT.
        code: u32,
    },

    /// Work ran on the loop thread and failed there.
    #[error(transparent)]
    Task(Box<TaskFailure>),

    /// The task was still queued when the loop exited, or its handle
    /// cancelled it first.
    #[error("task was cancelled before it ran")]
    Cancelled,

    /// The loop thread has not published its identity yet.
    #[error("message loop has not started")]
    NotStarted,

    #[error("message loop was already started")]
    AlreadyStarted,

    /// The loop thread has terminated and accepts no more work.
    #[error("message loop has exited")]
    LoopExited,

    /// A proxied delegate was re-entered from its own loop thread while an
    /// outer call still holds it.
    #[error("proxy delegate is already in use on the loop thread")]
    ReentrantCall,

    /// Raw input enumeration returned a different count than it reported.
    #[error("mismatched allocated ({allocated}) vs. received devices count ({received})")]
    DeviceCountMismatch { allocated: usize, received: usize },

    /// The loop thread itself panicked.
    #[error("message loop thread panicked")]
    LoopPanicked,

    /// A standard I/O error (thread spawn, config file, …).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A config file could not be parsed.
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}

impl From<TaskFailure> for PumpError {
    fn from(e: TaskFailure) -> Self {
        Self::Task(Box::new(e))
    }
}

// Convert a windows-crate error (HRESULT) directly into a PumpError so that
// `?` can be used on `windows::core::Result<T>` throughout the platform module.
#[cfg(windows)]
impl From<windows::core::Error> for PumpError {
    fn from(e: windows::core::Error) -> Self {
        // HRESULT.0 is i32; reinterpret bits as u32 for display purposes.
        Self::Win32 {
            function: "windows",
            code: e.code().0 as u32,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PumpError>;

// ── Task failures ─────────────────────────────────────────────────────────────

/// What went wrong inside a piece of marshalled work.
#[derive(Debug)]
pub enum Cause {
    /// The work returned an error value.
    Error(BoxError),
    /// The work panicked.
    Panic(PanicPayload),
}

impl Cause {
    /// Wrap a payload caught with `catch_unwind`.
    pub(crate) fn panic(payload: Box<dyn Any + Send>) -> Self {
        Self::Panic(PanicPayload::new(payload))
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(e) => write!(f, "{e}"),
            Self::Panic(p) => write!(f, "panicked: {}", p.message()),
        }
    }
}

/// A panic payload exactly as it was caught on the loop thread, plus its
/// rendered message.
///
/// The payload sits behind a lock only so failures stay `Sync`; it is never
/// contended.
#[derive(Debug)]
pub struct PanicPayload {
    message: String,
    payload: Mutex<Box<dyn Any + Send>>,
}

impl PanicPayload {
    fn new(payload: Box<dyn Any + Send>) -> Self {
        Self {
            message: payload_message(payload.as_ref()),
            payload: Mutex::new(payload),
        }
    }

    /// `&str` and `String` payloads verbatim; other payload types render as
    /// `Box<dyn Any>`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The original payload, ready for `std::panic::resume_unwind`.
    pub fn into_inner(self) -> Box<dyn Any + Send> {
        self.payload.into_inner()
    }
}

/// Render a panic payload the way the default panic hook does.
pub(crate) fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}

/// Failure of a task, carried from the loop thread back to the caller.
///
/// Holds the stack captured where the work failed (on the loop thread) and,
/// once the failure crosses back through [`run_on_thread`], the stack of the
/// call site that submitted it. [`TaskFailure::trace`] renders both as one
/// report, execution site first.
///
/// Backtraces follow `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`; when capture is
/// disabled the report still names both sites.
///
/// [`run_on_thread`]: crate::MessageLoop::run_on_thread
#[derive(Debug)]
pub struct TaskFailure {
    cause: Cause,
    executed_at: Backtrace,
    submitted_from: Option<Backtrace>,
}

impl TaskFailure {
    /// Capture a failure at the current (execution) site.
    pub(crate) fn capture(cause: Cause) -> Self {
        Self {
            cause,
            executed_at: Backtrace::capture(),
            submitted_from: None,
        }
    }

    /// Attach the submitting thread's stack. The first site recorded wins.
    pub(crate) fn submitted_from(mut self, site: Backtrace) -> Self {
        if self.submitted_from.is_none() {
            self.submitted_from = Some(site);
        }
        self
    }

    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    pub fn into_cause(self) -> Cause {
        self.cause
    }

    pub fn is_panic(&self) -> bool {
        matches!(self.cause, Cause::Panic(_))
    }

    /// The panic message, if the work panicked.
    pub fn panic_message(&self) -> Option<&str> {
        match &self.cause {
            Cause::Panic(p) => Some(p.message()),
            Cause::Error(_) => None,
        }
    }

    /// Take the original panic payload out of the failure.  Gives the
    /// failure back unchanged if the work returned an error instead.
    pub fn into_panic(self) -> std::result::Result<Box<dyn Any + Send>, Self> {
        match self.cause {
            Cause::Panic(p) => Ok(p.into_inner()),
            cause => Err(Self { cause, ..self }),
        }
    }

    /// Borrow the original error value if it is an `E`.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match &self.cause {
            Cause::Error(e) => e.downcast_ref::<E>(),
            Cause::Panic(_) => None,
        }
    }

    pub fn executed_at(&self) -> &Backtrace {
        &self.executed_at
    }

    pub fn submitted_at(&self) -> Option<&Backtrace> {
        self.submitted_from.as_ref()
    }

    /// One continuous trace: loop-thread execution site, then the producer
    /// call site that marshalled the work.
    pub fn trace(&self) -> String {
        let mut out = format!("{}\n  executed on loop thread at:\n{}", self.cause, self.executed_at);
        if let Some(site) = &self.submitted_from {
            out.push_str("\n  marshalled from:\n");
            out.push_str(&site.to_string());
        }
        out
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task failed on loop thread: {}", self.cause)
    }
}

impl std::error::Error for TaskFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            Cause::Error(e) => Some(e.as_ref()),
            Cause::Panic(_) => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
