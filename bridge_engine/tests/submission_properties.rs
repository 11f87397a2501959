use bridge_core::{MetricValue, Modifiers, RawValue, Timestamp, ValueKind};
use bridge_engine::{Bridge, BridgeError, ContextState};

fn scenario_bridge() -> Bridge {
    let bridge = Bridge::default();
    bridge.define_metric("/proc/cpu/usage", ValueKind::Double, "%", "").unwrap();
    bridge.define_metric("/proc/mem/free", ValueKind::Uint64, "", "").unwrap();
    bridge.define_metric("/proc/disk/[device]/iops", ValueKind::Uint64, "ops", "disk iops").unwrap();
    bridge
}

#[test]
fn destroyed_context_is_absent() {
    let bridge = scenario_bridge();
    for id in ["t1", "task-with-dashes", "ünïcode"] {
        bridge.contexts().create(id, ContextState::default()).unwrap();
        bridge.contexts().destroy(id).unwrap();
        assert!(bridge.contexts().lookup(id).is_none());
    }
}

#[test]
fn defined_metric_is_recorded_once() {
    let bridge = scenario_bridge();
    let entry = bridge.load_task("t1", "", &[]).unwrap();

    bridge.add_metric("t1", "/proc/cpu/usage", MetricValue::Double(42.5), None).unwrap();

    let (samples, _) = bridge.take_results(&entry);
    assert_eq!(samples.len(), 1);
    let sample = &samples[0];
    assert_eq!(sample.name, "/proc/cpu/usage");
    assert_eq!(sample.value, MetricValue::Double(42.5));
    assert!(sample.tags.is_empty());
    assert_eq!(sample.unit, "%");
}

#[test]
fn undefined_metric_is_rejected_without_a_sample() {
    let bridge = scenario_bridge();
    let entry = bridge.load_task("t1", "", &[]).unwrap();

    for name in ["/undefined/metric", "", "/proc/cpu", "/proc/cpu/usage/extra", "proc/cpu/usage"] {
        assert_eq!(
            bridge.add_metric("t1", name, MetricValue::Double(1.0), None).unwrap_err(),
            BridgeError::UndefinedMetric(name.to_string())
        );
    }
    assert!(bridge.take_results(&entry).0.is_empty());
}

#[test]
fn unknown_context_is_reported() {
    let bridge = scenario_bridge();
    assert_eq!(
        bridge.add_metric("ghost", "/proc/cpu/usage", MetricValue::Double(1.0), None).unwrap_err(),
        BridgeError::UnknownContext("ghost".into())
    );
    assert_eq!(bridge.config_keys("ghost").unwrap_err(), BridgeError::UnknownContext("ghost".into()));
}

#[test]
fn submissions_after_cancel_are_rejected() {
    let bridge = scenario_bridge();
    let entry = bridge.load_task("t1", "", &[]).unwrap();
    bridge.add_metric("t1", "/proc/cpu/usage", MetricValue::Double(1.0), None).unwrap();

    bridge.cancel("t1").unwrap();
    assert!(bridge.is_done("t1").unwrap());
    assert_eq!(
        bridge.add_metric("t1", "/proc/cpu/usage", MetricValue::Double(2.0), None).unwrap_err(),
        BridgeError::ContextDone("t1".into())
    );
    // warnings are still accepted and the earlier sample survives
    bridge.add_warning("t1", "late").unwrap();
    let (samples, warnings) = bridge.take_results(&entry);
    assert_eq!(samples.len(), 1);
    assert_eq!(warnings.len(), 1);

    // canceled while idle: no further pass until unload
    assert_eq!(bridge.begin_collect(&entry).unwrap_err(), BridgeError::ContextDone("t1".into()));
    assert!(bridge.is_done("t1").unwrap());
    assert_eq!(
        bridge.add_metric("t1", "/proc/cpu/usage", MetricValue::Double(3.0), None).unwrap_err(),
        BridgeError::ContextDone("t1".into())
    );
    bridge.unload_task("t1").unwrap();
}

#[test]
fn pass_queued_behind_unload_is_refused() {
    let bridge = scenario_bridge();
    let entry = bridge.load_task("t1", "", &[]).unwrap();

    bridge.begin_collect(&entry).unwrap();
    // unload closes the task while the pass is still running
    entry.close();
    bridge.take_results(&entry);

    assert_eq!(bridge.begin_collect(&entry).unwrap_err(), BridgeError::ContextDone("t1".into()));
    assert!(bridge.is_done("t1").unwrap());
}

#[test]
fn cancel_of_a_finished_pass_does_not_carry_over() {
    let bridge = scenario_bridge();
    let entry = bridge.load_task("t1", "", &[]).unwrap();

    bridge.begin_collect(&entry).unwrap();
    bridge.cancel("t1").unwrap();
    assert_eq!(
        bridge.add_metric("t1", "/proc/cpu/usage", MetricValue::Double(1.0), None).unwrap_err(),
        BridgeError::ContextDone("t1".into())
    );
    bridge.take_results(&entry);

    bridge.begin_collect(&entry).unwrap();
    assert!(!bridge.is_done("t1").unwrap());
    bridge.add_metric("t1", "/proc/cpu/usage", MetricValue::Double(2.0), None).unwrap();
    let (samples, _) = bridge.take_results(&entry);
    assert_eq!(samples.len(), 1);
}

#[test]
fn per_call_tags_override_always_apply() {
    let bridge = scenario_bridge();
    let entry = bridge.load_task("t1", "", &[]).unwrap();
    bridge
        .always_apply("t1", "/proc/cpu/usage", Modifiers::default().with_tag("a", "1"))
        .unwrap();

    let per_call = Modifiers::default().with_tag("a", "2").with_tag("b", "3");
    bridge.add_metric("t1", "/proc/cpu/usage", MetricValue::Double(1.0), Some(&per_call)).unwrap();

    let (samples, _) = bridge.take_results(&entry);
    let tags: Vec<_> = samples[0].tags.iter().collect();
    assert_eq!(tags, vec![("a", "2"), ("b", "3")]);
}

#[test]
fn dismiss_restores_defaults() {
    let bridge = scenario_bridge();
    let entry = bridge.load_task("t1", "", &[]).unwrap();
    let standing = Modifiers::default()
        .with_tag("a", "1")
        .with_unit("B")
        .with_description("free memory")
        .with_timestamp(Timestamp::new(1, 0).unwrap());
    bridge.always_apply("t1", "/proc/**", standing.clone()).unwrap();
    bridge.apply_to_all("t1", standing).unwrap();

    bridge.dismiss_all_modifiers("t1").unwrap();
    bridge.dismiss_all_modifiers("t1").unwrap();

    let before = Timestamp::now();
    bridge.add_metric("t1", "/proc/mem/free", MetricValue::Uint64(10), None).unwrap();
    let after = Timestamp::now();

    let (samples, _) = bridge.take_results(&entry);
    let sample = &samples[0];
    assert!(sample.tags.is_empty());
    assert_eq!(sample.unit, "");
    assert_eq!(sample.description, "");
    assert!(before <= sample.timestamp && sample.timestamp <= after);
}

#[test]
fn wildcard_rules_apply_in_registration_order() {
    let bridge = scenario_bridge();
    let entry = bridge.load_task("t1", "", &[]).unwrap();
    bridge.always_apply("t1", "/proc/**", Modifiers::default().with_tag("scope", "all").with_unit("x")).unwrap();
    bridge.always_apply("t1", "/proc/disk/[device={^sd}]/iops", Modifiers::default().with_tag("scope", "sd")).unwrap();
    assert!(matches!(
        bridge.always_apply("t1", "", Modifiers::default()),
        Err(BridgeError::InvalidPattern { .. })
    ));
    assert!(matches!(
        bridge.always_apply("t1", "/proc/{(}", Modifiers::default()),
        Err(BridgeError::InvalidPattern { .. })
    ));

    bridge.add_metric("t1", "/proc/disk/[device=sda]/iops", MetricValue::Uint64(5), None).unwrap();
    bridge.add_metric("t1", "/proc/disk/nvme0/iops", MetricValue::Uint64(6), None).unwrap();

    let (samples, _) = bridge.take_results(&entry);
    assert_eq!(samples[0].name, "/proc/disk/sda/iops");
    assert_eq!(samples[0].tags.get("scope"), Some("sd"));
    assert_eq!(samples[0].unit, "x");
    assert_eq!(samples[0].namespace[2].group.as_deref(), Some("device"));
    assert_eq!(samples[1].tags.get("scope"), Some("all"));
    assert_eq!(samples[1].description, "disk iops");
}

#[test]
fn max_unsigned_value_crosses_the_boundary_intact() {
    let bridge = scenario_bridge();
    let entry = bridge.load_task("t1", "", &[]).unwrap();

    let raw = RawValue::from(MetricValue::Uint64(u64::MAX));
    let decoded = unsafe { raw.decode() }.unwrap();
    bridge.add_metric("t1", "/proc/mem/free", decoded, None).unwrap();

    let (samples, _) = bridge.take_results(&entry);
    match samples[0].value {
        MetricValue::Uint64(v) => assert_eq!(v, u64::MAX),
        other => panic!("reinterpreted as {:?}", other),
    }
}

#[test]
fn requested_metrics_drive_should_process() {
    let bridge = scenario_bridge();
    bridge
        .load_task("all", "", &["/*".to_string()])
        .unwrap();
    bridge
        .load_task("some", "", &["/proc/disk/**".to_string(), "/proc/cpu/usage".to_string()])
        .unwrap();

    assert!(bridge.requested_metrics("all").unwrap().is_empty());
    assert_eq!(bridge.requested_metrics("some").unwrap(), vec!["/proc/disk/**", "/proc/cpu/usage"]);

    assert!(bridge.should_process("all", "/proc/mem/free").unwrap());
    assert!(!bridge.should_process("all", "/proc/swap/free").unwrap());

    assert!(bridge.should_process("some", "/proc/disk").unwrap());
    assert!(bridge.should_process("some", "/proc/disk/sda/iops").unwrap());
    assert!(bridge.should_process("some", "/proc/*/usage").unwrap());
    assert!(!bridge.should_process("some", "/proc/mem/free").unwrap());
    assert!(!bridge.should_process("some", "not a namespace").unwrap());

    // advisory only: filtered metrics are still accepted
    bridge.add_metric("some", "/proc/mem/free", MetricValue::Uint64(1), None).unwrap();
}

#[test]
fn configuration_is_read_only_snapshot() {
    let bridge = scenario_bridge();
    let raw = r#"{"server": {"ip": "10.0.0.1", "port": 8080}, "disks": ["sda", "sdb"]}"#;
    bridge.load_task("t1", raw, &[]).unwrap();

    assert_eq!(bridge.config("t1", "server.port").unwrap().as_deref(), Some("8080"));
    assert_eq!(bridge.config("t1", "disks").unwrap().as_deref(), Some("sda,sdb"));
    assert_eq!(bridge.config("t1", "missing").unwrap(), None);
    assert_eq!(bridge.config_keys("t1").unwrap(), vec!["disks", "server.ip", "server.port"]);
    assert_eq!(bridge.raw_config("t1").unwrap(), raw);

    assert!(matches!(bridge.load_task("t2", "{broken", &[]), Err(BridgeError::SerializationFailure(_))));
    assert!(bridge.contexts().lookup("t2").is_none());
}

#[test]
fn loading_freezes_definitions() {
    let bridge = scenario_bridge();
    bridge.load_task("t1", "", &[]).unwrap();
    assert_eq!(
        bridge.define_metric("/proc/late/metric", ValueKind::Bool, "", "").unwrap_err(),
        BridgeError::AlreadyReady
    );
    assert_eq!(bridge.load_task("t1", "", &[]).unwrap_err(), BridgeError::DuplicateContext("t1".into()));
}
