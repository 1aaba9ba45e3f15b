//! Module-handle lifecycle and symbol lookup, C-callable.
//!
//! Handles are opaque pointers owned by the caller and released with
//! [`ps_module_close`]. Failures return null (or 0) and leave a message for
//! [`ps_last_error`], per-thread, in the `dlerror` style.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;

use crate::ffi::guard;
use crate::module::{BindFlags, ModuleHandle, ModuleName};
use crate::resolver;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(message: Option<String>) {
    LAST_ERROR.with(|slot| {
        *slot.borrow_mut() = message.and_then(|msg| CString::new(msg).ok());
    });
}

/// Message for the most recent failed `ps_*` call on this thread, or null if
/// that call succeeded.
///
/// The pointer stays valid until the next `ps_*` call on the same thread.
#[no_mangle]
pub extern "C" fn ps_last_error() -> *const c_char {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map_or(ptr::null(), |msg| msg.as_ptr())
    })
}

/// Installs the process-image resolver.
///
/// Returns 1 if this call installed it, 0 if a resolver was already active.
/// Safe to call from any thread, any number of times.
#[no_mangle]
pub extern "C" fn ps_install() -> c_int {
    guard(0, || {
        set_last_error(None);
        resolver::install() as c_int
    })
}

/// Resolves or opens the module `name` and returns an owned handle.
///
/// The sentinel name opens the process image with the installed resolver's
/// flags; other names are loaded by the ordinary path with lazy binding.
/// Returns null on failure; see [`ps_last_error`].
///
/// # Safety
/// `name` must be null or a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn ps_module_open(name: *const c_char) -> *mut ModuleHandle {
    guard(ptr::null_mut(), || {
        if name.is_null() {
            set_last_error(Some("module name is null".to_string()));
            return ptr::null_mut();
        }
        let name = match unsafe { CStr::from_ptr(name) }.to_str() {
            Ok(name) => name,
            Err(_) => {
                set_last_error(Some("module name is not valid UTF-8".to_string()));
                return ptr::null_mut();
            }
        };
        let opened = match ModuleName::parse(name) {
            ModuleName::Sentinel => ModuleHandle::open_process_image(resolver::sentinel_flags()),
            ModuleName::Named(name) => {
                ModuleHandle::open_named(&name, BindFlags::lazy_global(), None)
            }
        };
        match opened {
            Ok(handle) => {
                set_last_error(None);
                Box::into_raw(Box::new(handle))
            }
            Err(err) => {
                set_last_error(Some(err.to_string()));
                ptr::null_mut()
            }
        }
    })
}

/// Destroys a handle returned by [`ps_module_open`]. Null-safe no-op.
///
/// Closing a process-image handle releases a loader reference; the image
/// itself never unloads.
///
/// # Safety
/// - `handle` must be null or a pointer returned by `ps_module_open`
/// - `handle` must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn ps_module_close(handle: *mut ModuleHandle) {
    guard((), || {
        if !handle.is_null() {
            drop(unsafe { Box::from_raw(handle) });
        }
    });
}

/// Returns 1 if `handle` refers to the process image, 0 otherwise (including
/// null).
///
/// # Safety
/// `handle` must be null or a valid pointer returned by `ps_module_open`.
#[no_mangle]
pub unsafe extern "C" fn ps_module_is_process_image(handle: *const ModuleHandle) -> c_int {
    guard(0, || {
        if handle.is_null() {
            return 0;
        }
        unsafe { &*handle }.is_process_image() as c_int
    })
}

/// Address of `symbol` in `handle`, or null on a miss; see [`ps_last_error`].
///
/// # Safety
/// - `handle` must be null or a valid pointer returned by `ps_module_open`
/// - `symbol` must be null or a valid NUL-terminated C string
#[no_mangle]
pub unsafe extern "C" fn ps_symbol_address(
    handle: *const ModuleHandle,
    symbol: *const c_char,
) -> *mut c_void {
    guard(ptr::null_mut(), || {
        if handle.is_null() || symbol.is_null() {
            set_last_error(Some("null handle or symbol name".to_string()));
            return ptr::null_mut();
        }
        let handle = unsafe { &*handle };
        let symbol = match unsafe { CStr::from_ptr(symbol) }.to_str() {
            Ok(symbol) => symbol,
            Err(_) => {
                set_last_error(Some("symbol name is not valid UTF-8".to_string()));
                return ptr::null_mut();
            }
        };
        match handle.symbol_address(symbol) {
            Ok(addr) => {
                set_last_error(None);
                addr
            }
            Err(err) => {
                set_last_error(Some(err.to_string()));
                ptr::null_mut()
            }
        }
    })
}
