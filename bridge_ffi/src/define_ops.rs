//! Registration calls, valid only from inside the define callback.

use std::os::raw::{c_char, c_int};

use bridge_core::{RawError, ValueKind};
use bridge_engine::BridgeError;

use crate::boundary::{arg, into_raw_error, settle};
use crate::bridge;

/// `kind` is a `vtype` code (1 = int64, 2 = uint64, 3 = double, 4 = bool).
///
/// # Safety
/// String arguments must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn define_metric(ns: *const c_char, kind: c_int, unit: *const c_char, description: *const c_char) {
    let result = (|| {
        let namespace = arg(ns, "namespace")?;
        let kind = ValueKind::from_raw(kind).ok_or(BridgeError::InvalidValueType(kind))?;
        let unit = arg(unit, "unit")?;
        let description = arg(description, "description")?;
        bridge().define_metric(namespace, kind, unit, description)
    })();
    settle("define_metric", result, ())
}

/// # Safety
/// Both arguments must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn define_group(name: *const c_char, description: *const c_char) {
    let result = (|| {
        let name = arg(name, "group name")?;
        let description = arg(description, "group description")?;
        bridge().define_group(name, description)
    })();
    settle("define_group", result, ())
}

/// # Safety
/// `config` must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn define_example_config(config: *const c_char) -> *mut RawError {
    into_raw_error(arg(config, "example config").and_then(|text| bridge().define_example_config(text)))
}

/// Zero or a negative value means no limit.
#[no_mangle]
pub extern "C" fn define_tasks_per_instance_limit(limit: i64) {
    settle("define_tasks_per_instance_limit", bridge().define_tasks_per_instance_limit(limit), ())
}

/// Zero or a negative value means no limit.
#[no_mangle]
pub extern "C" fn define_instances_limit(limit: i64) {
    settle("define_instances_limit", bridge().define_instances_limit(limit), ())
}
