//! The operations a collector performs against its task context, and the
//! host-side operations that create, drive and destroy those contexts.

use bridge_core::{MetricValue, Modifiers, TagSet, Timestamp, ValueKind};
use liblogger::{format_fields, log_at, log_debug, log_info, log_warn, LogLevel};

use crate::config_snapshot::ConfigSnapshot;
use crate::context_registry::{ContextHandle, ContextRegistry};
use crate::context_state::{AlwaysApplyRule, ContextState, Sample, Warning};
use crate::definition::Definitions;
use crate::error::{BridgeError, BridgeResult};
use crate::namespace::{render_sample, Namespace};
use crate::settings::BridgeSettings;

/// Filter rule meaning "every metric".
pub const REQUEST_ALL_METRICS: &str = "/*";

#[derive(Debug, Default)]
pub struct Bridge {
    definitions: Definitions,
    contexts: ContextRegistry,
    settings: BridgeSettings,
}

impl Bridge {
    pub fn new(settings: BridgeSettings) -> Self {
        Bridge { definitions: Definitions::new(), contexts: ContextRegistry::new(), settings }
    }

    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    pub fn contexts(&self) -> &ContextRegistry {
        &self.contexts
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Borrowing view of one task for Rust collectors.
    pub fn task<'a>(&'a self, id: &'a str) -> TaskContext<'a> {
        TaskContext { bridge: self, id }
    }

    // ----- definitions -----

    pub fn define_metric(&self, namespace: &str, kind: ValueKind, unit: &str, description: &str) -> BridgeResult<()> {
        self.definitions.define_metric(namespace, kind, unit, description)
    }

    pub fn define_group(&self, name: &str, description: &str) -> BridgeResult<()> {
        self.definitions.define_group(name, description)
    }

    pub fn define_example_config(&self, text: &str) -> BridgeResult<()> {
        self.definitions.define_example_config(text)
    }

    pub fn define_tasks_per_instance_limit(&self, n: i64) -> BridgeResult<()> {
        self.definitions.define_tasks_per_instance_limit(n)
    }

    pub fn define_instances_limit(&self, n: i64) -> BridgeResult<()> {
        self.definitions.define_instances_limit(n)
    }

    // ----- host side -----

    /// Creates the context for a task. Loading the first task freezes definitions.
    pub fn load_task(&self, id: &str, raw_config: &str, requested: &[String]) -> BridgeResult<ContextHandle> {
        Ok(self.claim_new_task(id, raw_config, requested)?.0)
    }

    /// Like [`Bridge::load_task`], also returning the claim on the new context
    /// so no other request can reach it before the load callback has run.
    pub fn claim_new_task(
        &self,
        id: &str,
        raw_config: &str,
        requested: &[String],
    ) -> BridgeResult<(ContextHandle, tokio::sync::OwnedMutexGuard<()>)> {
        if id.is_empty() {
            return Err(BridgeError::InvalidArgument("context id is empty".to_string()));
        }
        let config = ConfigSnapshot::from_json(raw_config)?;

        let mut rules = Vec::new();
        for rule in requested {
            if rule == REQUEST_ALL_METRICS || rule == "/**" {
                continue;
            }
            let selector = Namespace::parse_selector(rule)
                .map_err(|e| BridgeError::invalid_pattern(rule, e.to_string()))?;
            rules.push((rule.clone(), selector));
        }

        self.definitions.freeze();
        let claimed = self.contexts.create_claimed(id, ContextState::new(config, rules))?;
        log_info!(&format!("Task {} loaded", id), format_fields(&[("requested", requested.join(","))]));
        Ok(claimed)
    }

    /// Start of a collect pass: clears last pass's output. Fails with
    /// `ContextDone` once the task was canceled while idle or is unloading.
    pub fn begin_collect(&self, entry: &ContextHandle) -> BridgeResult<()> {
        entry.start_pass()?;
        entry.state().clear_session();
        Ok(())
    }

    /// Ends the current pass and drains what it recorded.
    pub fn take_results(&self, entry: &ContextHandle) -> (Vec<Sample>, Vec<Warning>) {
        entry.finish_pass();
        let mut state = entry.state();
        if state.dropped_warnings > 0 {
            log_warn!(
                &format!("{} warning(s) over the limit were dropped", state.dropped_warnings),
                format_fields(&[("context_id", entry.id())])
            );
        }
        (std::mem::take(&mut state.samples), std::mem::take(&mut state.warnings))
    }

    pub fn cancel(&self, id: &str) -> BridgeResult<()> {
        self.contexts.get(id)?.cancel();
        Ok(())
    }

    pub fn unload_task(&self, id: &str) -> BridgeResult<()> {
        let entry = self.contexts.get(id)?;
        entry.close();
        self.contexts.destroy(id)?;
        log_info!(&format!("Task {} unloaded", id));
        Ok(())
    }

    // ----- metric submission -----

    pub fn add_metric(&self, id: &str, name: &str, value: MetricValue, modifiers: Option<&Modifiers>) -> BridgeResult<()> {
        let entry = self.contexts.get(id)?;
        if entry.is_done() {
            return Err(BridgeError::ContextDone(id.to_string()));
        }

        let undefined = || BridgeError::UndefinedMetric(name.to_string());
        let submitted = Namespace::parse_submission(name).map_err(|_| undefined())?;
        let table = self.definitions.table().ok_or_else(undefined)?;
        let (definition, bound) = table.resolve(&submitted).ok_or_else(undefined)?;

        if definition.kind != value.kind() {
            return Err(BridgeError::ValueKindMismatch {
                name: name.to_string(),
                expected: definition.kind,
                actual: value.kind(),
            });
        }

        let now = Timestamp::now();
        let mut state = entry.state();
        let standing = state.standing_modifiers(&bound);
        let effective = match modifiers {
            Some(per_call) => per_call.merged_over(&standing),
            None => standing,
        };
        let meta = effective.resolve(now, &definition.description, &definition.unit);

        state.samples.push(Sample {
            name: render_sample(&bound),
            namespace: bound,
            value,
            tags: meta.tags,
            timestamp: meta.timestamp,
            description: meta.description,
            unit: meta.unit,
        });
        Ok(())
    }

    pub fn should_process(&self, id: &str, name: &str) -> BridgeResult<bool> {
        let entry = self.contexts.get(id)?;
        let query = match Namespace::parse_query(name) {
            Ok(query) => query,
            Err(e) => {
                log_debug!(&format!("Should not process {}: {}", name, e));
                return Ok(false);
            }
        };

        let defined = self.definitions.table().map_or(false, |t| t.admits_prefix(&query));
        if !defined {
            return Ok(false);
        }
        let state = entry.state();
        Ok(state.requested.is_empty() || state.requested.iter().any(|(_, rule)| rule.selects_prefix(&query)))
    }

    /// Filter rules from the host; empty when every metric is wanted.
    pub fn requested_metrics(&self, id: &str) -> BridgeResult<Vec<String>> {
        Ok(self.contexts.get(id)?.state().requested_rules())
    }

    // ----- modifiers -----

    pub fn always_apply(&self, id: &str, pattern: &str, modifiers: Modifiers) -> BridgeResult<()> {
        let entry = self.contexts.get(id)?;
        let selector = Namespace::parse_selector(pattern)
            .map_err(|e| BridgeError::invalid_pattern(pattern, e.to_string()))?;
        entry.state().always_apply.push(AlwaysApplyRule {
            pattern: pattern.to_string(),
            selector,
            modifiers,
        });
        Ok(())
    }

    /// Standing modifiers for every metric of the task, under any always-apply rule.
    pub fn apply_to_all(&self, id: &str, modifiers: Modifiers) -> BridgeResult<()> {
        let entry = self.contexts.get(id)?;
        let mut state = entry.state();
        state.pending_modifiers = modifiers.merged_over(&state.pending_modifiers);
        Ok(())
    }

    pub fn dismiss_all_modifiers(&self, id: &str) -> BridgeResult<()> {
        self.contexts.get(id)?.state().dismiss_modifiers();
        Ok(())
    }

    // ----- configuration -----

    pub fn config(&self, id: &str, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.contexts.get(id)?.state().config.get(key).map(str::to_string))
    }

    pub fn config_keys(&self, id: &str) -> BridgeResult<Vec<String>> {
        Ok(self.contexts.get(id)?.state().config.keys())
    }

    pub fn raw_config(&self, id: &str) -> BridgeResult<String> {
        Ok(self.contexts.get(id)?.state().config.raw().to_string())
    }

    // ----- control -----

    pub fn is_done(&self, id: &str) -> BridgeResult<bool> {
        Ok(self.contexts.get(id)?.is_done())
    }

    pub fn add_warning(&self, id: &str, text: &str) -> BridgeResult<()> {
        let entry = self.contexts.get(id)?;
        let mut state = entry.state();
        if state.warnings.len() >= self.settings.max_warnings {
            state.dropped_warnings += 1;
            log_warn!(
                "Maximum number of warnings reached, new warning ignored",
                format_fields(&[("context_id", id)])
            );
            return Ok(());
        }

        state.warnings.push(Warning {
            message: truncate_on_char_boundary(text, self.settings.max_warning_len).to_string(),
            timestamp: Timestamp::now(),
        });
        Ok(())
    }

    /// Emits a plugin log line with its fields and the task id.
    pub fn log(&self, id: &str, level: LogLevel, message: &str, fields: &[(String, String)]) -> BridgeResult<()> {
        self.contexts.get(id)?;
        let all = log_fields(id, fields);
        let pairs: Vec<(&str, &str)> = all.iter().collect();
        log_at!(level, message, format_fields(&pairs[..]));
        Ok(())
    }
}

/// Fields of a plugin log line: the task id first, then the plugin's fields
/// with one entry per key. A plugin field named `context_id` is dropped.
fn log_fields(id: &str, fields: &[(String, String)]) -> TagSet {
    let mut all = TagSet::new();
    all.insert("context_id", id);
    for (key, value) in fields.iter().filter(|(key, _)| key != "context_id") {
        all.insert(key.as_str(), value.as_str());
    }
    all
}

fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// A task seen from the collector: the bridge operations with the id bound.
#[derive(Clone, Copy)]
pub struct TaskContext<'a> {
    bridge: &'a Bridge,
    id: &'a str,
}

impl<'a> TaskContext<'a> {
    pub fn id(&self) -> &'a str {
        self.id
    }

    pub fn add_metric(&self, name: &str, value: impl Into<MetricValue>) -> BridgeResult<()> {
        self.bridge.add_metric(self.id, name, value.into(), None)
    }

    pub fn add_metric_with(&self, name: &str, value: impl Into<MetricValue>, modifiers: &Modifiers) -> BridgeResult<()> {
        self.bridge.add_metric(self.id, name, value.into(), Some(modifiers))
    }

    pub fn always_apply(&self, pattern: &str, modifiers: Modifiers) -> BridgeResult<()> {
        self.bridge.always_apply(self.id, pattern, modifiers)
    }

    pub fn apply_to_all(&self, modifiers: Modifiers) -> BridgeResult<()> {
        self.bridge.apply_to_all(self.id, modifiers)
    }

    pub fn dismiss_all_modifiers(&self) -> BridgeResult<()> {
        self.bridge.dismiss_all_modifiers(self.id)
    }

    pub fn should_process(&self, name: &str) -> bool {
        self.bridge.should_process(self.id, name).unwrap_or(false)
    }

    pub fn requested_metrics(&self) -> BridgeResult<Vec<String>> {
        self.bridge.requested_metrics(self.id)
    }

    pub fn config(&self, key: &str) -> Option<String> {
        self.bridge.config(self.id, key).ok().flatten()
    }

    pub fn config_keys(&self) -> BridgeResult<Vec<String>> {
        self.bridge.config_keys(self.id)
    }

    pub fn raw_config(&self) -> BridgeResult<String> {
        self.bridge.raw_config(self.id)
    }

    pub fn is_done(&self) -> bool {
        self.bridge.is_done(self.id).unwrap_or(true)
    }

    pub fn add_warning(&self, text: &str) -> BridgeResult<()> {
        self.bridge.add_warning(self.id, text)
    }

    pub fn log(&self, level: LogLevel, message: &str, fields: &[(String, String)]) -> BridgeResult<()> {
        self.bridge.log(self.id, level, message, fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge_with_cpu() -> Bridge {
        let bridge = Bridge::default();
        bridge.define_metric("/proc/cpu/usage", ValueKind::Double, "%", "cpu usage").unwrap();
        bridge
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_on_char_boundary("abc", 5), "abc");
        assert_eq!(truncate_on_char_boundary("abcdef", 3), "abc");
        // 'é' is two bytes; cutting inside it backs off
        assert_eq!(truncate_on_char_boundary("aé", 2), "a");
    }

    #[test]
    fn warnings_are_capped_and_truncated() {
        let bridge = Bridge::new(BridgeSettings { max_warnings: 2, max_warning_len: 4, ..Default::default() });
        let entry = bridge.load_task("t1", "", &[]).unwrap();
        for text in ["first warning", "second", "third"] {
            bridge.add_warning("t1", text).unwrap();
        }
        let (_, warnings) = bridge.take_results(&entry);
        let messages: Vec<_> = warnings.iter().map(|w| w.message.as_str()).collect();
        assert_eq!(messages, vec!["firs", "seco"]);
        assert!(!bridge.is_done("t1").unwrap());
    }

    #[test]
    fn apply_to_all_accumulates_and_per_call_wins() {
        let bridge = bridge_with_cpu();
        let entry = bridge.load_task("t1", "", &[]).unwrap();
        bridge.apply_to_all("t1", Modifiers::default().with_tag("host", "a")).unwrap();
        bridge.apply_to_all("t1", Modifiers::default().with_tag("dc", "x")).unwrap();
        bridge.always_apply("t1", "/proc/cpu/usage", Modifiers::default().with_tag("host", "b")).unwrap();

        let per_call = Modifiers::default().with_unit("ratio");
        bridge.add_metric("t1", "/proc/cpu/usage", MetricValue::Double(0.5), Some(&per_call)).unwrap();

        let (samples, _) = bridge.take_results(&entry);
        let tags: Vec<_> = samples[0].tags.iter().collect();
        assert_eq!(tags, vec![("host", "b"), ("dc", "x")]);
        assert_eq!(samples[0].unit, "ratio");
        assert_eq!(samples[0].description, "cpu usage");
    }

    #[test]
    fn value_kind_must_match_definition() {
        let bridge = bridge_with_cpu();
        bridge.load_task("t1", "", &[]).unwrap();
        assert_eq!(
            bridge.add_metric("t1", "/proc/cpu/usage", MetricValue::Int64(1), None).unwrap_err(),
            BridgeError::ValueKindMismatch {
                name: "/proc/cpu/usage".into(),
                expected: ValueKind::Double,
                actual: ValueKind::Int64,
            }
        );
    }

    #[test]
    fn invalid_filter_rule_fails_load() {
        let bridge = bridge_with_cpu();
        let err = bridge.load_task("t1", "", &["proc/cpu".to_string()]).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidPattern { .. }));
        assert!(bridge.contexts().lookup("t1").is_none());
    }

    #[test]
    fn log_requires_a_live_context() {
        let bridge = bridge_with_cpu();
        assert_eq!(
            bridge.log("nope", LogLevel::Info, "hello", &[]).unwrap_err(),
            BridgeError::UnknownContext("nope".into())
        );
        bridge.load_task("t1", "", &[]).unwrap();
        bridge.log("t1", LogLevel::Warn, "disk slow", &[("dev".into(), "sda".into())]).unwrap();
    }

    #[test]
    fn log_fields_keep_one_context_id() {
        let fields = vec![
            ("context_id".to_string(), "spoofed".to_string()),
            ("dev".to_string(), "sda".to_string()),
            ("dev".to_string(), "sdb".to_string()),
        ];
        let all = log_fields("t1", &fields);
        assert_eq!(all.iter().collect::<Vec<_>>(), vec![("context_id", "t1"), ("dev", "sdb")]);
    }

    #[test]
    fn standing_removal_beats_per_call_add() {
        let bridge = bridge_with_cpu();
        let entry = bridge.load_task("t1", "", &[]).unwrap();
        bridge.apply_to_all("t1", Modifiers::default().without_tag("host")).unwrap();

        let per_call = Modifiers::default().with_tag("host", "x").with_tag("dc", "eu");
        bridge.add_metric("t1", "/proc/cpu/usage", MetricValue::Double(0.5), Some(&per_call)).unwrap();

        let (samples, _) = bridge.take_results(&entry);
        assert_eq!(samples[0].tags.iter().collect::<Vec<_>>(), vec![("dc", "eu")]);
    }
}
