//! Per-task operations the foreign collector calls with its context id.

use std::os::raw::{c_char, c_int};
use std::ptr;

use bridge_core::raw::{decode_map, decode_modifiers};
use bridge_core::{AllocationLedger, RawError, RawMap, RawModifiers, RawValue};
use bridge_engine::{BridgeError, BridgeResult};
use liblogger::LogLevel;

use crate::boundary::{arg, bool_to_int, into_raw_error, settle};
use crate::bridge;

/// Records one sample for the current collect pass.
///
/// # Safety
/// String arguments must be NUL-terminated; `value` must point to a `RawValue`;
/// `modifiers` may be null.
#[no_mangle]
pub unsafe extern "C" fn ctx_add_metric(
    ctx_id: *const c_char,
    ns: *const c_char,
    value: *const RawValue,
    modifiers: *const RawModifiers,
) -> *mut RawError {
    into_raw_error(add_metric(ctx_id, ns, value, modifiers))
}

unsafe fn add_metric(
    ctx_id: *const c_char,
    ns: *const c_char,
    value: *const RawValue,
    modifiers: *const RawModifiers,
) -> BridgeResult<()> {
    let id = arg(ctx_id, "context id")?;
    let name = arg(ns, "namespace")?;
    if value.is_null() {
        return Err(BridgeError::InvalidArgument("value must not be null".to_string()));
    }
    let value = (*value).decode()?;
    let modifiers = decode_modifiers(modifiers)?;
    bridge().add_metric(id, name, value, modifiers.as_ref())
}

/// # Safety
/// See [`ctx_add_metric`].
#[no_mangle]
pub unsafe extern "C" fn ctx_always_apply(
    ctx_id: *const c_char,
    ns: *const c_char,
    modifiers: *const RawModifiers,
) -> *mut RawError {
    let result = (|| {
        let id = arg(ctx_id, "context id")?;
        let pattern = arg(ns, "namespace selector")?;
        let modifiers = decode_modifiers(modifiers)?.unwrap_or_default();
        bridge().always_apply(id, pattern, modifiers)
    })();
    into_raw_error(result)
}

/// # Safety
/// See [`ctx_add_metric`].
#[no_mangle]
pub unsafe extern "C" fn ctx_apply_to_all(ctx_id: *const c_char, modifiers: *const RawModifiers) -> *mut RawError {
    let result = (|| {
        let id = arg(ctx_id, "context id")?;
        let modifiers = decode_modifiers(modifiers)?.unwrap_or_default();
        bridge().apply_to_all(id, modifiers)
    })();
    into_raw_error(result)
}

/// # Safety
/// `ctx_id` must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn ctx_dismiss_all_modifiers(ctx_id: *const c_char) {
    let result = arg(ctx_id, "context id").and_then(|id| bridge().dismiss_all_modifiers(id));
    settle("ctx_dismiss_all_modifiers", result, ())
}

/// 1 when the metric (or a prefix of one) is both defined and requested.
///
/// # Safety
/// Both arguments must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn ctx_should_process(ctx_id: *const c_char, ns: *const c_char) -> c_int {
    let result = (|| {
        let id = arg(ctx_id, "context id")?;
        let name = arg(ns, "namespace")?;
        bridge().should_process(id, name)
    })();
    bool_to_int(settle("ctx_should_process", result, false))
}

/// NULL-terminated array, released with `dealloc_str_array`.
///
/// # Safety
/// `ctx_id` must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn ctx_requested_metrics(ctx_id: *const c_char) -> *mut *mut c_char {
    let result = arg(ctx_id, "context id").and_then(|id| bridge().requested_metrics(id));
    let rules = settle("ctx_requested_metrics", result, Vec::new());
    AllocationLedger::global().alloc_str_array(&rules[..])
}

/// Null when the key is absent; otherwise released with `dealloc_charp`.
///
/// # Safety
/// Both arguments must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn ctx_config_value(ctx_id: *const c_char, key: *const c_char) -> *mut c_char {
    let result = (|| {
        let id = arg(ctx_id, "context id")?;
        let key = arg(key, "config key")?;
        bridge().config(id, key)
    })();
    match settle("ctx_config_value", result, None) {
        Some(value) => AllocationLedger::global().alloc_string(&value),
        None => ptr::null_mut(),
    }
}

/// # Safety
/// `ctx_id` must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn ctx_config_keys(ctx_id: *const c_char) -> *mut *mut c_char {
    let result = arg(ctx_id, "context id").and_then(|id| bridge().config_keys(id));
    let keys = settle("ctx_config_keys", result, Vec::new());
    AllocationLedger::global().alloc_str_array(&keys[..])
}

/// # Safety
/// `ctx_id` must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn ctx_raw_config(ctx_id: *const c_char) -> *mut c_char {
    let result = arg(ctx_id, "context id").and_then(|id| bridge().raw_config(id));
    let raw = settle("ctx_raw_config", result, String::new());
    AllocationLedger::global().alloc_string(&raw)
}

/// # Safety
/// Both arguments must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn ctx_add_warning(ctx_id: *const c_char, message: *const c_char) {
    let result = (|| {
        let id = arg(ctx_id, "context id")?;
        let message = arg(message, "warning")?;
        bridge().add_warning(id, message)
    })();
    settle("ctx_add_warning", result, ())
}

/// # Safety
/// `ctx_id` must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn ctx_is_done(ctx_id: *const c_char) -> c_int {
    let result = arg(ctx_id, "context id").and_then(|id| bridge().is_done(id));
    bool_to_int(settle("ctx_is_done", result, false))
}

/// Levels are 0 = debug .. 3 = error; anything higher is logged as an error.
///
/// # Safety
/// String arguments must be NUL-terminated; `fields` may be null.
#[no_mangle]
pub unsafe extern "C" fn ctx_log(ctx_id: *const c_char, level: c_int, message: *const c_char, fields: *const RawMap) {
    let result = (|| {
        let id = arg(ctx_id, "context id")?;
        let message = arg(message, "log message")?;
        let fields: Vec<(String, String)> = decode_map(fields)?
            .map(|tags| tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
            .unwrap_or_default();
        bridge().log(id, LogLevel::from_raw(level), message, &fields)
    })();
    settle("ctx_log", result, ())
}
