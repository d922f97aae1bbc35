//! Per-thread last error
//!
//! Every dispatcher call overwrites the calling thread's slot: cleared on
//! success, set on failure. Deferred writes report success to their caller
//! and never touch it afterwards.

use std::cell::RefCell;

use tether_runtime::{Error, Result};

thread_local! {
    static LAST_ERROR: RefCell<Option<Error>> = const { RefCell::new(None) };
}

/// The error from the last dispatcher call made on this thread, if it failed
pub fn last_error() -> Option<Error> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

pub(crate) fn record<T>(result: Result<T>) -> Result<T> {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = result.as_ref().err().cloned());
    result
}
