//! Random-number collector used to exercise the bridge end to end.

use std::collections::HashMap;
use std::sync::Mutex;

use bridge_core::{Modifiers, ValueKind};
use bridge_engine::{Bridge, BridgeError, BridgeResult, Collector, TaskContext};
use liblogger::{log_debug, log_info, LogLevel};
use liblogger_macros::log_entry_exit;
use rand::Rng;

pub const PLUGIN_NAME: &str = "collector_rand";
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_MAX: i64 = 100;

pub const EXAMPLE_CONFIG: &str = r#"{
    "max": 40,
    "tags": { "source": "demo" }
}"#;

#[derive(Default)]
pub struct RandCollector {
    max_by_task: Mutex<HashMap<String, i64>>,
}

impl RandCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn max_for(&self, id: &str) -> i64 {
        let guard = match self.max_by_task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get(id).copied().unwrap_or(DEFAULT_MAX)
    }
}

impl Collector for RandCollector {
    #[log_entry_exit]
    fn define(&self, bridge: &Bridge) -> BridgeResult<()> {
        bridge.define_metric("/random/integer/value", ValueKind::Int64, "", "Random value (0-max)")?;
        bridge.define_metric("/random/unsigned/value", ValueKind::Uint64, "", "Random unsigned value")?;
        bridge.define_metric("/random/float/value", ValueKind::Double, "ratio", "Random value (0-1)")?;
        bridge.define_metric("/random/[slot]/flag", ValueKind::Bool, "", "Random coin flip per slot")?;
        bridge.define_group("slot", "Coin slot number")?;
        bridge.define_example_config(EXAMPLE_CONFIG)?;
        bridge.define_tasks_per_instance_limit(5)?;
        bridge.define_instances_limit(0)
    }

    fn load(&self, task: &TaskContext<'_>) -> BridgeResult<()> {
        let max = match task.config("max") {
            Some(text) => text
                .parse::<i64>()
                .ok()
                .filter(|max| *max > 0)
                .ok_or_else(|| BridgeError::InvalidArgument(format!("max must be a positive integer, got {:?}", text)))?,
            None => DEFAULT_MAX,
        };

        let mut tags = Modifiers::default();
        for key in task.config_keys()? {
            if let Some(name) = key.strip_prefix("tags.") {
                if let Some(value) = task.config(&key) {
                    tags = tags.with_tag(name, value);
                }
            }
        }
        if !tags.is_empty() {
            task.always_apply("/random/**", tags)?;
        }

        let mut guard = match self.max_by_task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(task.id().to_string(), max);
        log_info!(&format!("Task {} will draw values up to {}", task.id(), max));
        Ok(())
    }

    fn collect(&self, task: &TaskContext<'_>) -> BridgeResult<()> {
        let max = self.max_for(task.id());
        let mut rng = rand::thread_rng();

        if task.should_process("/random/integer/value") {
            task.add_metric("/random/integer/value", rng.gen_range(0..=max))?;
        }
        if task.should_process("/random/unsigned/value") {
            task.add_metric("/random/unsigned/value", rng.gen::<u64>())?;
        }
        if task.should_process("/random/float/value") {
            let value: f64 = rng.gen();
            task.add_metric_with(
                "/random/float/value",
                value,
                &Modifiers::default().with_tag("max", max.to_string()),
            )?;
        }

        for slot in 0..3 {
            if task.is_done() {
                task.log(LogLevel::Info, "Collect canceled, returning partial results", &[])?;
                return Ok(());
            }
            let name = format!("/random/[slot={}]/flag", slot);
            if task.should_process(&name) {
                task.add_metric(&name, rng.gen_bool(0.5))?;
            }
        }

        if max < 10 {
            task.add_warning("max is below 10, values are barely random")?;
        }
        log_debug!(&format!("Collected random values for task {}", task.id()));
        Ok(())
    }

    fn unload(&self, task: &TaskContext<'_>) -> BridgeResult<()> {
        let mut guard = match self.max_by_task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.remove(task.id());
        Ok(())
    }
}
