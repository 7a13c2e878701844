// ── Win32 platform implementation ─────────────────────────────────────────────
//
// This is the only module in the crate where `unsafe` code is permitted.
// Every `unsafe` block MUST carry a `// SAFETY:` comment that states:
//   • which invariant makes the operation sound, and
//   • what the caller is responsible for maintaining.
//
// Nothing in this module is `pub` beyond what callers genuinely need; keep the
// unsafe surface as small as possible.

#![allow(unsafe_code)]

// ── Sub-modules ───────────────────────────────────────────────────────────────

pub mod pump; // thread message queue: peek / get / post
pub mod user32; // thin window and raw-input wrappers

pub use pump::Win32Pump;

use windows::Win32::Foundation::GetLastError;

use crate::error::PumpError;

/// Capture the current Win32 last-error code and wrap it in a `PumpError`.
///
/// Call immediately after a Win32 function that signals failure. `GetLastError`
/// reads thread-local state that can be overwritten by any subsequent API call.
pub(crate) fn last_error(function: &'static str) -> PumpError {
    // SAFETY: GetLastError reads thread-local state set by the last Win32 call.
    // It is always safe to call and never fails.
    let code = unsafe { GetLastError() };
    PumpError::Win32 {
        function,
        code: code.0,
    }
}

/// Re-label a windows-crate error with the function that produced it.
pub(crate) fn win32_error(function: &'static str, e: windows::core::Error) -> PumpError {
    PumpError::Win32 {
        function,
        code: e.code().0 as u32,
    }
}
