//! Drives the exported functions the way a foreign collector would.
//! Everything shares the process-wide bridge, so it runs as one ordered scenario.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use bridge_core::{AllocationLedger, MetricValue, OwnedRawMap, OwnedRawModifiers, RawError, RawValue, Timestamp};
use bridge_ffi::bridge;
use bridge_ffi::context_ops::*;
use bridge_ffi::define_ops::*;
use bridge_ffi::release::*;

fn c(s: &str) -> CString {
    CString::new(s).unwrap()
}

unsafe fn take_error(err: *mut RawError) -> Option<String> {
    if err.is_null() {
        return None;
    }
    let msg = CStr::from_ptr((*err).msg).to_str().unwrap().to_string();
    dealloc_error(err);
    Some(msg)
}

unsafe fn take_string(p: *mut c_char) -> Option<String> {
    if p.is_null() {
        return None;
    }
    let s = CStr::from_ptr(p).to_str().unwrap().to_string();
    dealloc_charp(p);
    Some(s)
}

unsafe fn take_str_array(p: *mut *mut c_char) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0;
    while !(*p.add(i)).is_null() {
        out.push(CStr::from_ptr(*p.add(i)).to_str().unwrap().to_string());
        i += 1;
    }
    dealloc_str_array(p);
    out
}

#[test]
fn collector_session_through_the_c_surface() {
    let task = c("ffi-task");
    let baseline = AllocationLedger::global().outstanding();

    unsafe {
        // define phase
        define_metric(c("/demo/cpu/usage").as_ptr(), 3, c("%").as_ptr(), c("cpu usage").as_ptr());
        define_metric(c("/demo/disk/[device]/iops").as_ptr(), 1, c("").as_ptr(), c("disk iops").as_ptr());
        define_metric(c("/demo/bad/kind").as_ptr(), 9, c("").as_ptr(), c("").as_ptr());
        define_group(c("device").as_ptr(), c("block device").as_ptr());
        define_instances_limit(3);
        assert_eq!(take_error(define_example_config(c(r#"{"interval": 5}"#).as_ptr())), None);
        let err = take_error(define_example_config(c("not json").as_ptr())).unwrap();
        assert!(err.contains("not valid JSON"), "{}", err);

        bridge()
            .load_task(
                "ffi-task",
                r#"{"server": {"port": 8080}, "tags": ["a", "b"]}"#,
                &["/demo/cpu/*".to_string()],
            )
            .unwrap();

        // late definitions are refused
        define_metric(c("/demo/late/metric").as_ptr(), 1, c("").as_ptr(), c("").as_ptr());
        let snapshot = bridge().definitions().snapshot();
        assert_eq!(snapshot.metrics.len(), 2);
        assert_eq!(snapshot.instances_limit, Some(3));

        // submission
        let value = RawValue::from(MetricValue::Double(42.5));
        assert_eq!(take_error(ctx_add_metric(task.as_ptr(), c("/demo/cpu/usage").as_ptr(), &value, ptr::null())), None);

        let err = take_error(ctx_add_metric(task.as_ptr(), c("/demo/mem/free").as_ptr(), &value, ptr::null()));
        assert_eq!(err.as_deref(), Some("metric /demo/mem/free is not defined"));

        let modifiers = OwnedRawModifiers::new()
            .tags_to_add(&[("host", "h1")])
            .timestamp(1_700_000_000, 5)
            .unit("percent");
        let raw_modifiers = modifiers.as_raw();
        assert_eq!(
            take_error(ctx_add_metric(task.as_ptr(), c("/demo/cpu/usage").as_ptr(), &value, &raw_modifiers)),
            None
        );

        let iops = RawValue::from(MetricValue::Int64(12));
        let disk = c("/demo/disk/[device=sda]/iops");
        assert_eq!(
            take_error(ctx_always_apply(task.as_ptr(), c("/demo/disk/**").as_ptr(), &raw_modifiers)),
            None
        );
        assert_eq!(take_error(ctx_add_metric(task.as_ptr(), disk.as_ptr(), &iops, ptr::null())), None);
        assert!(take_error(ctx_always_apply(task.as_ptr(), c("").as_ptr(), ptr::null())).is_some());

        {
            let entry = bridge().contexts().get("ffi-task").unwrap();
            let state = entry.state();
            assert_eq!(state.samples.len(), 3);
            assert_eq!(state.samples[0].unit, "%");
            assert_eq!(state.samples[1].unit, "percent");
            assert_eq!(state.samples[1].tags.get("host"), Some("h1"));
            assert_eq!(state.samples[1].timestamp, Timestamp::new(1_700_000_000, 5).unwrap());
            assert_eq!(state.samples[2].name, "/demo/disk/sda/iops");
            assert_eq!(state.samples[2].tags.get("host"), Some("h1"));
        }
        ctx_dismiss_all_modifiers(task.as_ptr());
        assert_eq!(take_error(ctx_add_metric(task.as_ptr(), disk.as_ptr(), &iops, ptr::null())), None);
        assert!(bridge().contexts().get("ffi-task").unwrap().state().samples[3].tags.is_empty());

        // filters
        assert_eq!(ctx_should_process(task.as_ptr(), c("/demo/cpu").as_ptr()), 1);
        assert_eq!(ctx_should_process(task.as_ptr(), c("/demo/disk").as_ptr()), 0);
        assert_eq!(take_str_array(ctx_requested_metrics(task.as_ptr())), vec!["/demo/cpu/*"]);

        // configuration
        assert_eq!(take_string(ctx_config_value(task.as_ptr(), c("server.port").as_ptr())).as_deref(), Some("8080"));
        assert_eq!(take_string(ctx_config_value(task.as_ptr(), c("missing").as_ptr())), None);
        assert_eq!(take_str_array(ctx_config_keys(task.as_ptr())), vec!["server.port", "tags"]);
        assert_eq!(take_string(ctx_config_value(task.as_ptr(), c("tags").as_ptr())).as_deref(), Some("a,b"));
        assert!(take_string(ctx_raw_config(task.as_ptr())).unwrap().contains("8080"));

        // control
        ctx_add_warning(task.as_ptr(), c("disk sdb missing").as_ptr());
        let fields = OwnedRawMap::new(&[("device", "sdb")]);
        ctx_log(task.as_ptr(), 2, c("device vanished").as_ptr(), fields.as_ptr());
        ctx_log(task.as_ptr(), 42, c("unknown level").as_ptr(), ptr::null());
        assert_eq!(ctx_is_done(task.as_ptr()), 0);

        bridge().cancel("ffi-task").unwrap();
        assert_eq!(ctx_is_done(task.as_ptr()), 1);
        let err = take_error(ctx_add_metric(task.as_ptr(), c("/demo/cpu/usage").as_ptr(), &value, ptr::null()));
        assert_eq!(err.as_deref(), Some("task ffi-task has been canceled"));

        let (_, warnings) = bridge().take_results(&bridge().contexts().get("ffi-task").unwrap());
        assert_eq!(warnings.len(), 1);

        // unknown contexts are reported on calls that can carry an error
        let err = take_error(ctx_add_metric(c("gone").as_ptr(), c("/demo/cpu/usage").as_ptr(), &value, ptr::null()));
        assert_eq!(err.as_deref(), Some("context gone does not exist"));

        bridge().unload_task("ffi-task").unwrap();

        // null releases are no-ops
        dealloc_error(ptr::null_mut());
        dealloc_charp(ptr::null_mut());
        dealloc_str_array(ptr::null_mut());
    }

    assert_eq!(AllocationLedger::global().outstanding(), baseline);
}
