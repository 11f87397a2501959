use bridge_core::{MetricValue, Modifiers, TagSet, Timestamp};
use serde::Serialize;

use crate::config_snapshot::ConfigSnapshot;
use crate::namespace::{Namespace, SampleElement};

/// A metric recorded during one collect pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub name: String,
    pub namespace: Vec<SampleElement>,
    pub value: MetricValue,
    pub tags: TagSet,
    pub timestamp: Timestamp,
    pub description: String,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub message: String,
    pub timestamp: Timestamp,
}

/// Standing modifiers applied to every submission the pattern selects.
#[derive(Debug, Clone)]
pub struct AlwaysApplyRule {
    pub pattern: String,
    pub selector: Namespace,
    pub modifiers: Modifiers,
}

/// Mutable per-task state. Guarded by the owning entry's mutex.
#[derive(Debug, Default)]
pub struct ContextState {
    pub config: ConfigSnapshot,
    pub requested: Vec<(String, Namespace)>,
    pub pending_modifiers: Modifiers,
    pub always_apply: Vec<AlwaysApplyRule>,
    pub samples: Vec<Sample>,
    pub warnings: Vec<Warning>,
    pub dropped_warnings: usize,
}

impl ContextState {
    pub fn new(config: ConfigSnapshot, requested: Vec<(String, Namespace)>) -> Self {
        ContextState { config, requested, ..Default::default() }
    }

    /// Start of a collect pass: drops what the previous pass left behind.
    pub fn clear_session(&mut self) {
        self.samples.clear();
        self.warnings.clear();
        self.dropped_warnings = 0;
    }

    pub fn dismiss_modifiers(&mut self) {
        self.pending_modifiers = Modifiers::default();
        self.always_apply.clear();
    }

    /// Standing modifiers for a bound namespace, in application order:
    /// context-wide pending modifiers first, then matching rules by registration.
    pub fn standing_modifiers(&self, sample: &[SampleElement]) -> Modifiers {
        self.always_apply
            .iter()
            .filter(|rule| rule.selector.selects(sample))
            .fold(self.pending_modifiers.clone(), |acc, rule| rule.modifiers.merged_over(&acc))
    }

    pub fn requested_rules(&self) -> Vec<String> {
        self.requested.iter().map(|(raw, _)| raw.clone()).collect()
    }
}
