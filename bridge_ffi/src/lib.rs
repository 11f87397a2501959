//! `extern "C"` surface of the collector bridge.
//!
//! A foreign collector links this library, registers its definitions from the
//! define callback and then calls `start_collector`, which blocks serving the host.
//! Every call names its task by context id; no pointer into either side's memory
//! outlives the call, except values handed out through the `dealloc_*` pairs.

use std::sync::Arc;

use bridge_engine::{Bridge, BridgeSettings, DEFAULT_CONFIG_FILE};
use liblogger::{log_error, log_info, Logger};
use once_cell::sync::Lazy;

pub mod boundary;
pub mod callbacks;
pub mod context_ops;
pub mod define_ops;
pub mod release;

pub use callbacks::{start_collector, CallbackCollector};

static BRIDGE: Lazy<Arc<Bridge>> = Lazy::new(|| {
    let settings = BridgeSettings::from_file(DEFAULT_CONFIG_FILE).unwrap_or_else(|e| {
        log_error!(&format!("Invalid bridge settings, using defaults: {}", e));
        BridgeSettings::default()
    });
    Arc::new(Bridge::new(settings))
});

/// The process-wide bridge every exported function works against.
pub fn bridge() -> &'static Arc<Bridge> {
    &BRIDGE
}

#[ctor::ctor]
fn on_load() {
    Logger::init();
    log_info!("Collector bridge library loaded");
}
