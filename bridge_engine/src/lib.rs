//! Context bridge between a collector plugin and its host.
//!
//! [`Bridge`] owns the process-wide state: metric definitions and the registry
//! of active task contexts. The plugin reaches it through the per-task
//! operations (submission, modifiers, configuration, control); the host drives
//! it through [`CollectorController`], which runs the define phase once and then
//! dispatches load/collect/unload commands from a [`HostLink`].

pub mod error;
pub mod namespace;
pub mod config_snapshot;
pub mod context_state;
pub mod context_registry;
pub mod definition;
pub mod settings;
pub mod bridge;
pub mod host_link;
pub mod lifecycle;

pub use bridge::{Bridge, TaskContext, REQUEST_ALL_METRICS};
pub use config_snapshot::ConfigSnapshot;
pub use context_registry::{ContextEntry, ContextHandle, ContextRegistry};
pub use context_state::{AlwaysApplyRule, ContextState, Sample, Warning};
pub use definition::{DefinitionSnapshot, Definitions, MetricInfo, Phase};
pub use error::{BridgeError, BridgeResult};
pub use host_link::{channel_link, stdio_link, CollectReport, HostCommand, HostHandle, HostLink, HostReport};
pub use lifecycle::{Collector, CollectorController};
pub use namespace::{Namespace, NamespaceError, SampleElement};
pub use settings::{BridgeSettings, HostLinkKind, DEFAULT_CONFIG_FILE};
