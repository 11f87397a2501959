//! Shared plumbing for the exported functions: argument decoding, error
//! hand-out and the fatal path for calls that have no error channel.

use std::os::raw::{c_char, c_int};
use std::ptr;

use bridge_core::raw::read_str;
use bridge_core::{AllocationLedger, RawError};
use bridge_engine::{BridgeError, BridgeResult};
use liblogger::{log_error, Logger};

/// Borrows a required string argument for the duration of the call.
///
/// # Safety
/// `ptr` must be null or a NUL-terminated string that outlives `'a`.
pub unsafe fn arg<'a>(ptr: *const c_char, what: &'static str) -> BridgeResult<&'a str> {
    read_str(ptr, what).map_err(BridgeError::from)
}

/// `Error?` shape: null on success, an owned message released with `dealloc_error` otherwise.
pub fn into_raw_error(result: BridgeResult<()>) -> *mut RawError {
    match result {
        Ok(()) => ptr::null_mut(),
        Err(e) => AllocationLedger::global().alloc_error(&e.to_string()),
    }
}

pub fn bool_to_int(b: bool) -> c_int {
    c_int::from(b)
}

/// Resolves the result of an operation whose C signature can't carry an error.
///
/// Reaching a context that doesn't exist is a defect in the caller and aborts.
/// Anything else is logged and the fallback is returned.
pub fn settle<T>(op: &str, result: BridgeResult<T>, fallback: T) -> T {
    match result {
        Ok(value) => value,
        Err(e @ BridgeError::UnknownContext(_)) => abort_on_context_misuse(op, &e),
        Err(e) => {
            log_error!(&format!("{} failed: {}", op, e));
            fallback
        }
    }
}

fn abort_on_context_misuse(op: &str, error: &BridgeError) -> ! {
    log_error!(&format!("Fatal: {} used an unusable context: {}", op, error));
    let _ = Logger::shutdown();
    std::process::abort();
}
