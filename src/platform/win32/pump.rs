// ── Win32 thread message pump ─────────────────────────────────────────────────
//
// Thread messages only: nothing here creates a window.  Windows created on the
// loop thread (see `user32`) receive their messages through the same
// `DispatchMessageW` call.

#![allow(unsafe_code)]

use windows::Win32::{
    Foundation::{HWND, LPARAM, WPARAM},
    System::Threading::GetCurrentThreadId,
    UI::WindowsAndMessaging::{
        DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW, TranslateMessage, MSG,
        PM_NOREMOVE, WM_QUIT, WM_USER,
    },
};

use super::{last_error, win32_error};
use crate::error::Result;
use crate::platform::{Pump, Pumped};

/// Message id posted to wake the loop.  Carries no payload.
pub const WM_WAKE: u32 = WM_USER;

/// Drives the calling thread's Win32 message queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Pump;

impl Pump for Win32Pump {
    type ThreadId = u32;

    fn prepare(&self) -> Result<u32> {
        let mut msg = MSG::default();
        // SAFETY: &mut msg is a valid MSG pointer.  A non-removing peek with no
        // filter is the documented way to force creation of the thread's
        // message queue; its return value (message available) is irrelevant.
        unsafe {
            let _ = PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_NOREMOVE);
        }
        // SAFETY: GetCurrentThreadId takes no parameters and cannot fail.
        Ok(unsafe { GetCurrentThreadId() })
    }

    fn pump_once(&self) -> Result<Pumped> {
        let mut msg = MSG::default();

        // SAFETY: &mut msg is a valid MSG pointer; HWND::default() retrieves
        // messages for all windows on this thread plus thread messages; 0,0
        // filter accepts all.
        let ret = unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) };

        match ret.0 {
            // GetMessageW returns -1 on error.
            -1 => Err(last_error("GetMessageW")),
            // Returns 0 when WM_QUIT is retrieved.
            0 => Ok(Pumped::Quit),
            _ => {
                // SAFETY: msg was populated by a successful GetMessageW call.
                // TranslateMessage's return value (whether it generated
                // WM_CHAR) and DispatchMessageW's LRESULT are intentionally
                // unused.  Thread messages (hwnd == null) dispatch to nothing.
                unsafe {
                    let _ = TranslateMessage(&msg);
                    let _ = DispatchMessageW(&msg);
                }
                Ok(Pumped::Dispatched)
            }
        }
    }

    fn wake(&self, thread: u32) -> Result<()> {
        // SAFETY: PostThreadMessageW only copies the four scalar arguments into
        // the target thread's queue; an invalid thread id is reported as an
        // error, not undefined behaviour.
        unsafe { PostThreadMessageW(thread, WM_WAKE, WPARAM(0), LPARAM(0)) }
            .map_err(|e| win32_error("PostThreadMessageW", e))
    }

    fn request_quit(&self, thread: u32) -> Result<()> {
        // SAFETY: as in `wake`.  GetMessageW reports WM_QUIT as a 0 return.
        unsafe { PostThreadMessageW(thread, WM_QUIT, WPARAM(0), LPARAM(0)) }
            .map_err(|e| win32_error("PostThreadMessageW", e))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
