// ── user32 wrappers ───────────────────────────────────────────────────────────
//
// One native call each, failure translated to `PumpError::Win32`.  Window
// handles are thread-affine: create, use and destroy them on the loop thread
// (e.g. inside `MessageLoop::run_on_thread`).

#![allow(unsafe_code)]

use std::ffi::c_void;

use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{HINSTANCE, HWND},
        UI::{
            Input::{GetRawInputDeviceList, RAWINPUTDEVICELIST},
            WindowsAndMessaging::{
                CreateWindowExW, DestroyWindow, RegisterWindowMessageW, HMENU, WINDOW_EX_STYLE,
                WINDOW_STYLE,
            },
        },
    },
};

use super::{last_error, win32_error};
use crate::error::{PumpError, Result};

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Register (or look up) a system-wide unique message id for `name`.
pub fn register_window_message(name: &str) -> Result<u32> {
    let name_wide = wide(name);
    // SAFETY: name_wide is a valid null-terminated UTF-16 string that remains
    // allocated for the duration of the call.
    let id = unsafe { RegisterWindowMessageW(PCWSTR(name_wide.as_ptr())) };
    if id == 0 {
        return Err(last_error("RegisterWindowMessageW"));
    }
    Ok(id)
}

/// `create_window_ex` with no extended style.
#[allow(clippy::too_many_arguments)]
pub fn create_window(
    class_name: &str,
    window_name: &str,
    style: WINDOW_STYLE,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    parent: HWND,
    menu: HMENU,
    instance: HINSTANCE,
    param: Option<*const c_void>,
) -> Result<HWND> {
    create_window_ex(
        WINDOW_EX_STYLE(0),
        class_name,
        window_name,
        style,
        x,
        y,
        width,
        height,
        parent,
        menu,
        instance,
        param,
    )
}

/// Create a window owned by the calling thread.
#[allow(clippy::too_many_arguments)]
pub fn create_window_ex(
    ex_style: WINDOW_EX_STYLE,
    class_name: &str,
    window_name: &str,
    style: WINDOW_STYLE,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    parent: HWND,
    menu: HMENU,
    instance: HINSTANCE,
    param: Option<*const c_void>,
) -> Result<HWND> {
    let class_wide = wide(class_name);
    let name_wide = wide(window_name);

    // SAFETY: both strings are valid null-terminated UTF-16 buffers alive for
    // the call.  Handles are passed through unchanged; CreateWindowExW
    // validates them and reports failure through its result.  `param` is only
    // forwarded to the window procedure as WM_CREATE data.
    unsafe {
        CreateWindowExW(
            ex_style,
            PCWSTR(class_wide.as_ptr()),
            PCWSTR(name_wide.as_ptr()),
            style,
            x,
            y,
            width,
            height,
            parent,
            menu,
            instance,
            param,
        )
    }
    .map_err(|e| win32_error("CreateWindowExW", e))
}

/// Destroy a window created on the calling thread.
pub fn destroy_window(hwnd: HWND) -> Result<()> {
    // SAFETY: DestroyWindow validates the handle and fails (rather than
    // faulting) for handles that are stale or owned by another thread.
    unsafe { DestroyWindow(hwnd) }.map_err(|e| win32_error("DestroyWindow", e))
}

/// Enumerate attached raw input devices.
pub fn raw_input_device_list() -> Result<Vec<RAWINPUTDEVICELIST>> {
    let entry_size = std::mem::size_of::<RAWINPUTDEVICELIST>() as u32;
    let mut count: u32 = 0;

    // First call with no buffer queries the expected number of devices.
    // SAFETY: &mut count is a valid u32 pointer; a null list is allowed.
    let ret = unsafe { GetRawInputDeviceList(None, &mut count, entry_size) };
    if ret != 0 {
        return Err(last_error("GetRawInputDeviceList"));
    }

    let mut devices = vec![RAWINPUTDEVICELIST::default(); count as usize];
    // SAFETY: devices holds `count` initialised entries of `entry_size` bytes
    // each, and count tells the API how many it may write.
    let ret = unsafe { GetRawInputDeviceList(Some(devices.as_mut_ptr()), &mut count, entry_size) };
    if ret == u32::MAX {
        return Err(last_error("GetRawInputDeviceList"));
    }

    if ret as usize != devices.len() {
        return Err(PumpError::DeviceCountMismatch {
            allocated: devices.len(),
            received: ret as usize,
        });
    }

    Ok(devices)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
