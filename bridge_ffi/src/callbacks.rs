//! Adapts the foreign collector's C callbacks to the engine's `Collector` trait,
//! and the `start_collector` entry point that runs it.

use std::os::raw::c_char;
use std::sync::Arc;

use bridge_core::raw::to_c_string;
use bridge_core::{DefineCallback, TaskCallback};
use bridge_engine::{Bridge, BridgeError, BridgeResult, Collector, CollectorController, TaskContext};
use liblogger::{log_error, log_warn};
use liblogger_macros::log_entry_exit;

use crate::boundary::arg;
use crate::bridge;

/// A collector whose callbacks live on the foreign side. Load and unload are optional.
pub struct CallbackCollector {
    collect: TaskCallback,
    load: Option<TaskCallback>,
    unload: Option<TaskCallback>,
    define: Option<DefineCallback>,
}

impl CallbackCollector {
    pub fn new(
        collect: TaskCallback,
        load: Option<TaskCallback>,
        unload: Option<TaskCallback>,
        define: Option<DefineCallback>,
    ) -> Self {
        CallbackCollector { collect, load, unload, define }
    }
}

/// The id string is owned here and valid only for the duration of the call.
fn call_with_id(callback: TaskCallback, task: &TaskContext<'_>) {
    let id = to_c_string(task.id());
    unsafe { callback(id.as_ptr() as *mut c_char) }
}

impl Collector for CallbackCollector {
    fn define(&self, _bridge: &Bridge) -> BridgeResult<()> {
        if let Some(define) = self.define {
            unsafe { define() }
        }
        Ok(())
    }

    fn load(&self, task: &TaskContext<'_>) -> BridgeResult<()> {
        if let Some(load) = self.load {
            call_with_id(load, task);
        }
        Ok(())
    }

    fn collect(&self, task: &TaskContext<'_>) -> BridgeResult<()> {
        call_with_id(self.collect, task);
        Ok(())
    }

    fn unload(&self, task: &TaskContext<'_>) -> BridgeResult<()> {
        if let Some(unload) = self.unload {
            call_with_id(unload, task);
        }
        Ok(())
    }
}

/// Runs the define callback, then serves the host until it disconnects.
///
/// A second call in the same process is logged and returns immediately.
///
/// # Safety
/// Callbacks must be valid for the life of the process; `name` and `version`
/// must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn start_collector(
    collect: Option<TaskCallback>,
    load: Option<TaskCallback>,
    unload: Option<TaskCallback>,
    define: Option<DefineCallback>,
    name: *const c_char,
    version: *const c_char,
) {
    let Some(collect) = collect else {
        log_error!("start_collector called without a collect callback");
        return;
    };
    let (name, version) = match (arg(name, "collector name"), arg(version, "collector version")) {
        (Ok(name), Ok(version)) => (name, version),
        (Err(e), _) | (_, Err(e)) => {
            log_error!(&format!("start_collector rejected: {}", e));
            return;
        }
    };

    let collector = CallbackCollector::new(collect, load, unload, define);
    match serve(Arc::new(collector), name, version) {
        Ok(()) => {}
        Err(BridgeError::AlreadyStarted) => log_warn!("start_collector called more than once; ignoring"),
        Err(e) => log_error!(&format!("Collector {} stopped with error: {}", name, e)),
    }
}

#[log_entry_exit]
fn serve(collector: Arc<CallbackCollector>, name: &str, version: &str) -> BridgeResult<()> {
    let bridge = bridge().clone();
    let link = bridge.settings().host_link;
    CollectorController::new(bridge, collector, name, version).run_blocking(link)
}
