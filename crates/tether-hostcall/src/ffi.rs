//! C boundary
//!
//! These functions operate on a process-global dispatcher installed once with
//! `install_global`. Failures are reported as `false`/sentinel returns with
//! the message available from `tether_last_error` on the same thread.

use std::cell::RefCell;
use std::ffi::{c_char, CString};

use once_cell::sync::OnceCell;
use tether_runtime::{Error, STR_NONE};

use crate::dispatch::Dispatcher;
use crate::status::{last_error, record};

/// Global dispatcher used by the C entry points
static GLOBAL: OnceCell<Dispatcher> = OnceCell::new();

thread_local! {
    /// Backing storage for the pointer returned by `tether_last_error`
    static LAST_ERROR_TEXT: RefCell<CString> = RefCell::new(CString::default());
}

/// Install the dispatcher the C entry points use. Only the first call wins.
pub fn install_global(dispatcher: Dispatcher) -> bool {
    GLOBAL.set(dispatcher).is_ok()
}

pub fn global() -> Option<&'static Dispatcher> {
    GLOBAL.get()
}

fn global_or_fail() -> Option<&'static Dispatcher> {
    let dispatcher = GLOBAL.get();
    if dispatcher.is_none() {
        let _ = record::<()>(Err(Error::HostUnavailable));
    }
    dispatcher
}

/// Write the engine version into the out-params
///
/// # Safety
/// Each pointer must be null or valid for a `u32` write.
#[no_mangle]
pub unsafe extern "C" fn tether_get_version(major: *mut u32, minor: *mut u32, build: *mut u32) -> bool {
    let Some(dispatcher) = global_or_fail() else {
        return false;
    };
    match dispatcher.version() {
        Ok(version) => {
            if !major.is_null() {
                *major = version.major;
            }
            if !minor.is_null() {
                *minor = version.minor;
            }
            if !build.is_null() {
                *build = version.build;
            }
            true
        }
        Err(_) => false,
    }
}

/// Resolve a UTF-8 string to its engine id without interning it.
/// Returns `STR_NONE` when the string is unknown or invalid.
///
/// # Safety
/// `ptr` must be null or valid for `len` bytes of reads.
#[no_mangle]
pub unsafe extern "C" fn tether_get_str_id(ptr: *const u8, len: usize) -> u32 {
    if ptr.is_null() {
        return STR_NONE;
    }
    let bytes = std::slice::from_raw_parts(ptr, len);
    let Ok(s) = std::str::from_utf8(bytes) else {
        let _ = record::<()>(Err(Error::engine("string is not valid UTF-8")));
        return STR_NONE;
    };
    match global_or_fail() {
        Some(dispatcher) => dispatcher.resolve(s).raw(),
        None => STR_NONE,
    }
}

/// Message of the last failed call on this thread, or an empty string.
///
/// The pointer stays valid until the next call to this function on the same
/// thread.
#[no_mangle]
pub extern "C" fn tether_last_error() -> *const c_char {
    let message = last_error().map(|e| e.to_string()).unwrap_or_default();
    // messages never contain NUL; fall back to empty if one ever does
    let text = CString::new(message).unwrap_or_default();
    LAST_ERROR_TEXT.with(|slot| {
        *slot.borrow_mut() = text;
        slot.borrow().as_ptr()
    })
}
