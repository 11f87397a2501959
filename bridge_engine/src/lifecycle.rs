//! Collector lifecycle: one define phase, then an event loop dispatching host
//! commands to the collector's callbacks.
//!
//! Each command runs on its own Tokio task and every callback runs on the
//! blocking pool, so a slow collect for one context never stalls another.
//! Within a context the task gate admits one request at a time.

use std::sync::Arc;
use std::time::Instant;

use liblogger::{format_fields, log_debug, log_error, log_info, log_warn};
use liblogger_macros::measure_time;
use tokio::task::JoinSet;

use crate::bridge::{Bridge, TaskContext};
use crate::definition::DefinitionSnapshot;
use crate::error::{BridgeError, BridgeResult};
use crate::host_link::{stdio_link, CollectReport, HostCommand, HostLink, HostReport};
use crate::settings::HostLinkKind;

/// Callbacks of a collector plugin. Only `collect` is mandatory.
pub trait Collector: Send + Sync + 'static {
    /// Registers metric definitions. Called once before any task is loaded.
    fn define(&self, _bridge: &Bridge) -> BridgeResult<()> {
        Ok(())
    }

    fn load(&self, _task: &TaskContext<'_>) -> BridgeResult<()> {
        Ok(())
    }

    fn collect(&self, task: &TaskContext<'_>) -> BridgeResult<()>;

    fn unload(&self, _task: &TaskContext<'_>) -> BridgeResult<()> {
        Ok(())
    }
}

pub struct CollectorController {
    bridge: Arc<Bridge>,
    collector: Arc<dyn Collector>,
    name: String,
    version: String,
}

impl CollectorController {
    pub fn new(bridge: Arc<Bridge>, collector: Arc<dyn Collector>, name: &str, version: &str) -> Self {
        CollectorController {
            bridge,
            collector,
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    /// `Uninitialized -> Defining -> Ready`. Fails with `AlreadyStarted` on a second call.
    pub fn define(&self) -> BridgeResult<DefinitionSnapshot> {
        let definitions = self.bridge.definitions();
        definitions.begin()?;
        log_info!(&format!("Starting collector {} {}", self.name, self.version));

        if let Err(e) = self.collector.define(&self.bridge) {
            log_error!(&format!("Define callback failed: {}", e));
            return Err(e);
        }
        definitions.freeze();
        Ok(definitions.snapshot())
    }

    /// Builds a runtime and serves the configured host link until it closes.
    pub fn run_blocking(self, link: HostLinkKind) -> BridgeResult<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("collector-bridge")
            .build()
            .map_err(|e| BridgeError::InvalidArgument(format!("can't start runtime: {}", e)))?;

        match link {
            HostLinkKind::Stdio => runtime.block_on(async move { self.run(stdio_link()).await }),
            HostLinkKind::None => {
                let snapshot = self.define()?;
                let text = serde_json::to_string_pretty(&snapshot)
                    .map_err(|e| BridgeError::SerializationFailure(e.to_string()))?;
                println!("{}", text);
                Ok(())
            }
        }
    }

    /// Runs the define phase, then dispatches commands until the link closes
    /// or the host sends `Shutdown`. Contexts left loaded are unloaded on exit.
    pub async fn run(self, mut link: HostLink) -> BridgeResult<()> {
        let definitions = self.define()?;
        let _ = link
            .reports
            .send(HostReport::Ready {
                name: self.name.clone(),
                version: self.version.clone(),
                definitions,
            })
            .await;

        let mut in_flight = JoinSet::new();
        while let Some(command) = link.commands.recv().await {
            if command == HostCommand::Shutdown {
                log_info!("Shutdown requested by host");
                break;
            }
            let bridge = self.bridge.clone();
            let collector = self.collector.clone();
            let reports = link.reports.clone();
            in_flight.spawn(async move {
                let report = dispatch(bridge, collector, command).await;
                let _ = reports.send(report).await;
            });

            // reap finished commands so the set doesn't grow unbounded
            while in_flight.try_join_next().is_some() {}
        }

        for id in self.bridge.contexts().ids() {
            let _ = self.bridge.cancel(&id);
        }
        while in_flight.join_next().await.is_some() {}

        for id in self.bridge.contexts().ids() {
            let report = unload(self.bridge.clone(), self.collector.clone(), id).await;
            let _ = link.reports.send(report).await;
        }
        log_info!(&format!("Collector {} stopped", self.name));
        Ok(())
    }
}

async fn dispatch(bridge: Arc<Bridge>, collector: Arc<dyn Collector>, command: HostCommand) -> HostReport {
    match command {
        HostCommand::Load { id, config, requested } => {
            let error = load(bridge, collector, &id, &config, &requested).await.err().map(|e| e.to_string());
            HostReport::Loaded { id, error }
        }
        HostCommand::Collect { id } => HostReport::Collected(collect(bridge, collector, id).await),
        HostCommand::Cancel { id } => {
            let error = bridge.cancel(&id).err().map(|e| e.to_string());
            HostReport::Cancelled { id, error }
        }
        HostCommand::Unload { id } => unload(bridge, collector, id).await,
        HostCommand::Shutdown => HostReport::Rejected { error: "shutdown is handled by the event loop".to_string() },
    }
}

/// Runs one callback on the blocking pool, turning a panic into an error.
async fn call_blocking<F>(bridge: Arc<Bridge>, collector: Arc<dyn Collector>, id: String, f: F) -> BridgeResult<()>
where
    F: FnOnce(&dyn Collector, &TaskContext<'_>) -> BridgeResult<()> + Send + 'static,
{
    let task_id = id.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let task = bridge.task(&task_id);
        f(collector.as_ref(), &task)
    })
    .await;

    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(BridgeError::Callback(format!("callback for task {} panicked", id))),
        Err(e) => Err(BridgeError::Callback(format!("callback for task {} was aborted: {}", id, e))),
    }
}

async fn load(
    bridge: Arc<Bridge>,
    collector: Arc<dyn Collector>,
    id: &str,
    config: &str,
    requested: &[String],
) -> BridgeResult<()> {
    let (_entry, _claim) = bridge.claim_new_task(id, config, requested)?;

    let result = call_blocking(bridge.clone(), collector, id.to_string(), |c, task| c.load(task)).await;
    if let Err(e) = &result {
        log_warn!(&format!("Load of task {} failed: {}", id, e));
        let _ = bridge.contexts().destroy(id);
    }
    result
}

async fn collect(bridge: Arc<Bridge>, collector: Arc<dyn Collector>, id: String) -> CollectReport {
    let entry = match bridge.contexts().get(&id) {
        Ok(entry) => entry,
        Err(e) => return failed_collect(id, e),
    };
    let _claim = match entry.try_acquire() {
        Ok(claim) => claim,
        Err(e) => return failed_collect(id, e),
    };

    if let Err(e) = bridge.begin_collect(&entry) {
        return failed_collect(id, e);
    }
    let started = Instant::now();
    let result = call_blocking(bridge.clone(), collector, id.clone(), |c, task| run_collect_pass(c, task)).await;
    let (samples, warnings) = bridge.take_results(&entry);

    let elapsed = format!("{:?}", started.elapsed());
    let metrics_num = samples.len().to_string();
    let warnings_num = warnings.len().to_string();
    let fields = [
        ("context_id", id.as_str()),
        ("elapsed", elapsed.as_str()),
        ("metrics", metrics_num.as_str()),
        ("warnings", warnings_num.as_str()),
    ];
    if entry.is_done() {
        log_info!("Collect completed after task had been canceled", format_fields(&fields[..]));
    } else {
        log_debug!("Collect completed", format_fields(&fields[..]));
    }

    CollectReport {
        id,
        samples,
        warnings,
        error: result.err().map(|e| format!("collect ended with error: {}", e)),
    }
}

#[measure_time(warn_after_ms = 10000)]
fn run_collect_pass(collector: &dyn Collector, task: &TaskContext<'_>) -> BridgeResult<()> {
    collector.collect(task)
}

fn failed_collect(id: String, error: BridgeError) -> CollectReport {
    log_warn!(&format!("Collect for task {} rejected: {}", id, error));
    CollectReport { id, samples: Vec::new(), warnings: Vec::new(), error: Some(error.to_string()) }
}

/// Cancels the task, waits for its in-flight request, then unloads it.
async fn unload(bridge: Arc<Bridge>, collector: Arc<dyn Collector>, id: String) -> HostReport {
    let entry = match bridge.contexts().get(&id) {
        Ok(entry) => entry,
        Err(e) => return HostReport::Unloaded { id, error: Some(e.to_string()) },
    };
    entry.close();
    let _claim = entry.acquire().await;

    let result = call_blocking(bridge.clone(), collector, id.clone(), |c, task| c.unload(task)).await;
    let destroyed = bridge.unload_task(&id);

    let error = result.and(destroyed).err().map(|e| e.to_string());
    HostReport::Unloaded { id, error }
}
