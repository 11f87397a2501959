//! The one release path for every value handed to the foreign side.
//!
//! Passing a pointer that is not outstanding, or releasing it through the wrong
//! function, aborts the process.

use std::os::raw::c_char;

use bridge_core::{abort_on_defect, AllocationLedger, RawError};

/// # Safety
/// `err` must be null or an error returned by this library and not yet released.
#[no_mangle]
pub unsafe extern "C" fn dealloc_error(err: *mut RawError) {
    abort_on_defect(AllocationLedger::global().release_error(err));
}

/// # Safety
/// `p` must be null or a string returned by this library and not yet released.
#[no_mangle]
pub unsafe extern "C" fn dealloc_charp(p: *mut c_char) {
    abort_on_defect(AllocationLedger::global().release_string(p));
}

/// # Safety
/// `p` must be null or a string array returned by this library and not yet released.
#[no_mangle]
pub unsafe extern "C" fn dealloc_str_array(p: *mut *mut c_char) {
    abort_on_defect(AllocationLedger::global().release_str_array(p));
}
