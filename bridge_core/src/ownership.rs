//! Allocation ledger for everything the bridge hands to the foreign side.
//!
//! Each allocation helper has exactly one release helper. The ledger records the
//! address and kind of every outstanding handout so that a double release, a
//! foreign pointer or a release through the wrong helper is caught instead of
//! corrupting the heap.

use std::collections::HashMap;
use std::fmt;
use std::os::raw::c_char;
use std::ptr;
use std::sync::Mutex;

use liblogger::log_error;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::raw::{to_c_string, RawError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocationKind {
    Error,
    String,
    StrArray,
}

impl fmt::Display for AllocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AllocationKind::Error => "error",
            AllocationKind::String => "string",
            AllocationKind::StrArray => "string array",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReleaseDefect {
    #[error("{kind} at {addr:#x} was not handed out by the bridge or was already released")]
    NotOutstanding { addr: usize, kind: AllocationKind },
    #[error("{actual} at {addr:#x} released as {requested}")]
    KindMismatch {
        addr: usize,
        requested: AllocationKind,
        actual: AllocationKind,
    },
}

static GLOBAL_LEDGER: Lazy<AllocationLedger> = Lazy::new(AllocationLedger::new);

#[derive(Debug, Default)]
pub struct AllocationLedger {
    live: Mutex<HashMap<usize, AllocationKind>>,
}

impl AllocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger backing the exported `dealloc_*` functions.
    pub fn global() -> &'static AllocationLedger {
        &GLOBAL_LEDGER
    }

    pub fn outstanding(&self) -> usize {
        self.with_live(|live| live.len())
    }

    pub fn outstanding_of(&self, kind: AllocationKind) -> usize {
        self.with_live(|live| live.values().filter(|k| **k == kind).count())
    }

    pub fn alloc_string(&self, s: &str) -> *mut c_char {
        let raw = to_c_string(s).into_raw();
        self.record(raw as usize, AllocationKind::String);
        raw
    }

    pub fn alloc_error(&self, msg: &str) -> *mut RawError {
        let raw = Box::into_raw(Box::new(RawError { msg: to_c_string(msg).into_raw() }));
        self.record(raw as usize, AllocationKind::Error);
        raw
    }

    /// NULL-terminated array of strings.
    pub fn alloc_str_array<S: AsRef<str>>(&self, items: &[S]) -> *mut *mut c_char {
        let mut slots: Vec<*mut c_char> = Vec::with_capacity(items.len() + 1);
        slots.extend(items.iter().map(|s| to_c_string(s.as_ref()).into_raw()));
        slots.push(ptr::null_mut());

        let raw = Box::into_raw(slots.into_boxed_slice()) as *mut *mut c_char;
        self.record(raw as usize, AllocationKind::StrArray);
        raw
    }

    /// # Safety
    /// `p` must be null or a pointer returned by [`Self::alloc_string`] on this ledger.
    /// Any other pointer is reported as a defect before it is touched.
    pub unsafe fn release_string(&self, p: *mut c_char) -> Result<(), ReleaseDefect> {
        if p.is_null() {
            return Ok(());
        }
        self.forget(p as usize, AllocationKind::String)?;
        drop(std::ffi::CString::from_raw(p));
        Ok(())
    }

    /// # Safety
    /// `p` must be null or a pointer returned by [`Self::alloc_error`] on this ledger.
    pub unsafe fn release_error(&self, p: *mut RawError) -> Result<(), ReleaseDefect> {
        if p.is_null() {
            return Ok(());
        }
        self.forget(p as usize, AllocationKind::Error)?;
        let err = Box::from_raw(p);
        if !err.msg.is_null() {
            drop(std::ffi::CString::from_raw(err.msg));
        }
        Ok(())
    }

    /// # Safety
    /// `p` must be null or a pointer returned by [`Self::alloc_str_array`] on this
    /// ledger, with its elements and terminator left untouched.
    pub unsafe fn release_str_array(&self, p: *mut *mut c_char) -> Result<(), ReleaseDefect> {
        if p.is_null() {
            return Ok(());
        }
        self.forget(p as usize, AllocationKind::StrArray)?;

        let mut len = 0;
        while !(*p.add(len)).is_null() {
            drop(std::ffi::CString::from_raw(*p.add(len)));
            len += 1;
        }
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(p, len + 1)));
        Ok(())
    }

    fn record(&self, addr: usize, kind: AllocationKind) {
        self.with_live(|live| {
            live.insert(addr, kind);
        });
    }

    fn forget(&self, addr: usize, requested: AllocationKind) -> Result<(), ReleaseDefect> {
        self.with_live(|live| match live.get(&addr).copied() {
            None => Err(ReleaseDefect::NotOutstanding { addr, kind: requested }),
            Some(actual) if actual != requested => Err(ReleaseDefect::KindMismatch { addr, requested, actual }),
            Some(_) => {
                live.remove(&addr);
                Ok(())
            }
        })
    }

    fn with_live<R>(&self, f: impl FnOnce(&mut HashMap<usize, AllocationKind>) -> R) -> R {
        let mut guard = match self.live.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

/// Logs a release defect and aborts the process. A broken ownership contract
/// leaves the heap in an unknown state, so there is nothing to recover.
pub fn abort_on_defect(result: Result<(), ReleaseDefect>) {
    if let Err(defect) = result {
        log_error!(&format!("Fatal ownership defect: {}", defect));
        let _ = liblogger::Logger::shutdown();
        std::process::abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn each_helper_releases_its_own_kind() {
        let ledger = AllocationLedger::new();
        let s = ledger.alloc_string("value");
        let e = ledger.alloc_error("boom");
        let a = ledger.alloc_str_array(&["x", "y"]);
        assert_eq!(ledger.outstanding(), 3);

        unsafe {
            assert_eq!(CStr::from_ptr(s).to_str(), Ok("value"));
            assert_eq!(CStr::from_ptr((*e).msg).to_str(), Ok("boom"));
            assert_eq!(CStr::from_ptr(*a.add(1)).to_str(), Ok("y"));
            assert!((*a.add(2)).is_null());

            assert_eq!(ledger.release_string(s), Ok(()));
            assert_eq!(ledger.release_error(e), Ok(()));
            assert_eq!(ledger.release_str_array(a), Ok(()));
        }
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn null_release_is_a_no_op() {
        let ledger = AllocationLedger::new();
        unsafe {
            assert_eq!(ledger.release_string(ptr::null_mut()), Ok(()));
            assert_eq!(ledger.release_error(ptr::null_mut()), Ok(()));
            assert_eq!(ledger.release_str_array(ptr::null_mut()), Ok(()));
        }
    }

    #[test]
    fn double_release_is_detected_before_touching_memory() {
        let ledger = AllocationLedger::new();
        let s = ledger.alloc_string("once");
        unsafe {
            assert_eq!(ledger.release_string(s), Ok(()));
            assert!(matches!(
                ledger.release_string(s),
                Err(ReleaseDefect::NotOutstanding { kind: AllocationKind::String, .. })
            ));
        }
    }

    #[test]
    fn wrong_release_helper_is_detected() {
        let ledger = AllocationLedger::new();
        let a = ledger.alloc_str_array::<&str>(&[]);
        unsafe {
            let defect = ledger.release_string(a as *mut c_char).unwrap_err();
            assert_eq!(
                defect,
                ReleaseDefect::KindMismatch {
                    addr: a as usize,
                    requested: AllocationKind::String,
                    actual: AllocationKind::StrArray,
                }
            );
            // still outstanding, so the right helper succeeds
            assert_eq!(ledger.release_str_array(a), Ok(()));
        }
        assert_eq!(ledger.outstanding_of(AllocationKind::StrArray), 0);
    }
}
