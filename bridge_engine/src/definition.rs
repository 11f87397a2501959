//! Process-wide metric definitions.
//!
//! Definitions are collected while the registry is `Defining` and frozen on the
//! transition to `Ready`, after which the table is read without locking.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use bridge_core::ValueKind;
use liblogger::{log_debug, log_warn};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::error::{BridgeError, BridgeResult};
use crate::namespace::{Namespace, SampleElement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Uninitialized,
    Defining,
    Ready,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Phase::Uninitialized,
            1 => Phase::Defining,
            _ => Phase::Ready,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricDefinition {
    pub namespace: Namespace,
    pub kind: ValueKind,
    pub unit: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricInfo {
    pub namespace: String,
    pub kind: ValueKind,
    pub unit: String,
    pub description: String,
}

/// What the host learns about the collector after the define phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DefinitionSnapshot {
    pub metrics: Vec<MetricInfo>,
    pub groups: BTreeMap<String, String>,
    pub example_config: Option<String>,
    pub tasks_per_instance_limit: Option<u32>,
    pub instances_limit: Option<u32>,
}

#[derive(Debug, Default)]
pub struct DefinitionTable {
    metrics: Vec<MetricDefinition>,
    groups: BTreeMap<String, String>,
    example_config: Option<String>,
    tasks_per_instance_limit: Option<u32>,
    instances_limit: Option<u32>,
}

impl DefinitionTable {
    /// First definition the submitted namespace binds to, with its bound elements.
    pub fn resolve(&self, submitted: &Namespace) -> Option<(&MetricDefinition, Vec<SampleElement>)> {
        self.metrics
            .iter()
            .find_map(|def| def.namespace.bind(submitted).map(|bound| (def, bound)))
    }

    pub fn admits_prefix(&self, query: &Namespace) -> bool {
        self.metrics.iter().any(|def| def.namespace.admits_prefix(query))
    }

    pub fn group_description(&self, group: &str) -> Option<&str> {
        self.groups.get(group).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    fn snapshot(&self) -> DefinitionSnapshot {
        DefinitionSnapshot {
            metrics: self
                .metrics
                .iter()
                .map(|m| MetricInfo {
                    namespace: m.namespace.to_string(),
                    kind: m.kind,
                    unit: m.unit.clone(),
                    description: m.description.clone(),
                })
                .collect(),
            groups: self.groups.clone(),
            example_config: self.example_config.clone(),
            tasks_per_instance_limit: self.tasks_per_instance_limit,
            instances_limit: self.instances_limit,
        }
    }
}

#[derive(Debug, Default)]
pub struct Definitions {
    phase: AtomicU8,
    building: Mutex<DefinitionTable>,
    frozen: OnceCell<DefinitionTable>,
}

impl Definitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// `Uninitialized -> Defining`. Only one start per registry.
    pub fn begin(&self) -> BridgeResult<()> {
        self.phase
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| BridgeError::AlreadyStarted)
    }

    /// Moves to `Ready`, freezing the table. Idempotent.
    pub fn freeze(&self) -> &DefinitionTable {
        self.frozen.get_or_init(|| {
            let mut building = self.lock_building();
            let table = std::mem::take(&mut *building);
            self.phase.store(2, Ordering::Release);
            drop(building);
            log_debug!(&format!("Definitions frozen with {} metric(s)", table.metrics.len()));
            table
        })
    }

    pub fn table(&self) -> Option<&DefinitionTable> {
        self.frozen.get()
    }

    pub fn snapshot(&self) -> DefinitionSnapshot {
        match self.frozen.get() {
            Some(table) => table.snapshot(),
            None => self.lock_building().snapshot(),
        }
    }

    pub fn define_metric(&self, namespace: &str, kind: ValueKind, unit: &str, description: &str) -> BridgeResult<()> {
        let parsed = Namespace::parse_definition(namespace)
            .map_err(|e| BridgeError::invalid_pattern(namespace, e.to_string()))?;
        self.with_building(|table| {
            if table.metrics.iter().any(|m| m.namespace.to_string() == parsed.to_string()) {
                log_warn!(&format!("Metric {} defined twice, keeping the first definition", namespace));
                return;
            }
            table.metrics.push(MetricDefinition {
                namespace: parsed,
                kind,
                unit: unit.to_string(),
                description: description.to_string(),
            });
        })
    }

    pub fn define_group(&self, name: &str, description: &str) -> BridgeResult<()> {
        if name.is_empty() {
            return Err(BridgeError::InvalidArgument("group name is empty".to_string()));
        }
        self.with_building(|table| {
            table.groups.insert(name.to_string(), description.to_string());
        })
    }

    /// The example must be a JSON document; it is stored as given.
    pub fn define_example_config(&self, text: &str) -> BridgeResult<()> {
        serde_json::from_str::<serde_json::Value>(text)
            .map_err(|e| BridgeError::SerializationFailure(format!("example config is not valid JSON: {}", e)))?;
        self.with_building(|table| table.example_config = Some(text.to_string()))
    }

    /// `n <= 0` means no limit.
    pub fn define_tasks_per_instance_limit(&self, n: i64) -> BridgeResult<()> {
        self.with_building(|table| table.tasks_per_instance_limit = limit(n))
    }

    /// `n <= 0` means no limit.
    pub fn define_instances_limit(&self, n: i64) -> BridgeResult<()> {
        self.with_building(|table| table.instances_limit = limit(n))
    }

    fn with_building(&self, f: impl FnOnce(&mut DefinitionTable)) -> BridgeResult<()> {
        if self.phase() == Phase::Ready {
            return Err(BridgeError::AlreadyReady);
        }
        let mut table = self.lock_building();
        // freeze may have won the race while we waited for the lock
        if self.phase() == Phase::Ready {
            return Err(BridgeError::AlreadyReady);
        }
        f(&mut table);
        Ok(())
    }

    fn lock_building(&self) -> std::sync::MutexGuard<'_, DefinitionTable> {
        match self.building.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn limit(n: i64) -> Option<u32> {
    if n <= 0 {
        None
    } else {
        Some(u32::try_from(n).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_once() {
        let defs = Definitions::new();
        assert_eq!(defs.phase(), Phase::Uninitialized);
        defs.begin().unwrap();
        assert_eq!(defs.phase(), Phase::Defining);
        assert_eq!(defs.begin().unwrap_err(), BridgeError::AlreadyStarted);
        defs.freeze();
        assert_eq!(defs.phase(), Phase::Ready);
    }

    #[test]
    fn late_definitions_are_rejected() {
        let defs = Definitions::new();
        defs.define_metric("/proc/cpu/usage", ValueKind::Double, "%", "cpu").unwrap();
        defs.freeze();

        assert_eq!(defs.define_metric("/proc/mem/used", ValueKind::Uint64, "B", "").unwrap_err(), BridgeError::AlreadyReady);
        assert_eq!(defs.define_group("dev", "").unwrap_err(), BridgeError::AlreadyReady);
        assert_eq!(defs.define_instances_limit(3).unwrap_err(), BridgeError::AlreadyReady);
        assert_eq!(defs.table().map(|t| t.metrics.len()), Some(1));
    }

    #[test]
    fn limits_and_example_config() {
        let defs = Definitions::new();
        defs.define_tasks_per_instance_limit(0).unwrap();
        defs.define_instances_limit(4).unwrap();
        assert!(matches!(defs.define_example_config("{nope"), Err(BridgeError::SerializationFailure(_))));
        defs.define_example_config(r#"{"interval": "10s"}"#).unwrap();

        let snap = defs.snapshot();
        assert_eq!(snap.tasks_per_instance_limit, None);
        assert_eq!(snap.instances_limit, Some(4));
        assert_eq!(snap.example_config.as_deref(), Some(r#"{"interval": "10s"}"#));
    }

    #[test]
    fn malformed_namespace_is_an_invalid_pattern() {
        let defs = Definitions::new();
        assert!(matches!(
            defs.define_metric("proc/cpu", ValueKind::Double, "", ""),
            Err(BridgeError::InvalidPattern { .. })
        ));
        assert!(matches!(
            defs.define_metric("/proc/[group]", ValueKind::Double, "", ""),
            Err(BridgeError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn resolves_dynamic_groups() {
        let defs = Definitions::new();
        defs.define_metric("/acme/[dev]/iops", ValueKind::Uint64, "ops", "disk iops").unwrap();
        defs.define_group("dev", "block device").unwrap();
        let table = defs.freeze();

        let sub = Namespace::parse_submission("/acme/[dev=sda]/iops").unwrap();
        let (def, bound) = table.resolve(&sub).unwrap();
        assert_eq!(def.unit, "ops");
        assert_eq!(bound[1].group.as_deref(), Some("dev"));
        assert_eq!(table.group_description("dev"), Some("block device"));
        assert!(table.admits_prefix(&Namespace::parse_query("/acme/sdb").unwrap()));
    }
}
