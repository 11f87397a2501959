use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::context_state::ContextState;
use crate::error::{BridgeError, BridgeResult};

/// One active task.
///
/// `state` is locked per call; `done` is polled without locking; `gate` admits
/// one host request (load, collect or unload) at a time.
#[derive(Debug)]
pub struct ContextEntry {
    id: String,
    done: AtomicBool,
    run: Mutex<RunState>,
    state: Mutex<ContextState>,
    gate: Arc<AsyncMutex<()>>,
}

/// Whether a collect pass is running and whether new passes are refused.
/// `done` only changes while this is locked.
#[derive(Debug, Default)]
struct RunState {
    collecting: bool,
    closed: bool,
}

pub type ContextHandle = Arc<ContextEntry>;

impl ContextEntry {
    fn new(id: &str, state: ContextState) -> Self {
        ContextEntry {
            id: id.to_string(),
            done: AtomicBool::new(false),
            run: Mutex::new(RunState::default()),
            state: Mutex::new(state),
            gate: Arc::new(AsyncMutex::new(())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Cancels the running pass. With no pass running the task stays done
    /// and later passes are refused until it is unloaded.
    pub fn cancel(&self) {
        let mut run = self.run();
        self.done.store(true, Ordering::Release);
        if !run.collecting {
            run.closed = true;
        }
    }

    /// Marks the task done for good; no further pass may start.
    pub fn close(&self) {
        let mut run = self.run();
        run.closed = true;
        self.done.store(true, Ordering::Release);
    }

    /// Starts a collect pass, clearing a cancel that targeted an earlier one.
    pub fn start_pass(&self) -> BridgeResult<()> {
        let mut run = self.run();
        if run.closed {
            return Err(BridgeError::ContextDone(self.id.clone()));
        }
        run.collecting = true;
        self.done.store(false, Ordering::Release);
        Ok(())
    }

    pub fn finish_pass(&self) {
        self.run().collecting = false;
    }

    fn run(&self) -> MutexGuard<'_, RunState> {
        match self.run.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, ContextState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Claims the task for one host request, failing if another is in flight.
    pub fn try_acquire(&self) -> BridgeResult<OwnedMutexGuard<()>> {
        self.gate
            .clone()
            .try_lock_owned()
            .map_err(|_| BridgeError::TaskBusy(self.id.clone()))
    }

    /// Waits until the in-flight request, if any, has finished.
    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        self.gate.clone().lock_owned().await
    }
}

/// Process-wide map of active tasks keyed by context id.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: RwLock<HashMap<String, ContextHandle>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, id: &str, state: ContextState) -> BridgeResult<ContextHandle> {
        let mut map = match self.contexts.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if map.contains_key(id) {
            return Err(BridgeError::DuplicateContext(id.to_string()));
        }
        let entry = Arc::new(ContextEntry::new(id, state));
        map.insert(id.to_string(), entry.clone());
        Ok(entry)
    }

    /// Creates a context that is already claimed by the caller's request.
    pub fn create_claimed(&self, id: &str, state: ContextState) -> BridgeResult<(ContextHandle, OwnedMutexGuard<()>)> {
        let mut map = match self.contexts.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if map.contains_key(id) {
            return Err(BridgeError::DuplicateContext(id.to_string()));
        }
        let entry = Arc::new(ContextEntry::new(id, state));
        let claim = entry.try_acquire()?;
        map.insert(id.to_string(), entry.clone());
        Ok((entry, claim))
    }

    pub fn lookup(&self, id: &str) -> Option<ContextHandle> {
        let map = match self.contexts.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(id).cloned()
    }

    pub fn get(&self, id: &str) -> BridgeResult<ContextHandle> {
        self.lookup(id).ok_or_else(|| BridgeError::UnknownContext(id.to_string()))
    }

    pub fn destroy(&self, id: &str) -> BridgeResult<()> {
        let mut map = match self.contexts.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.remove(id)
            .map(|_| ())
            .ok_or_else(|| BridgeError::UnknownContext(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.contexts.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = match self.contexts.read() {
            Ok(map) => map.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        };
        ids.sort();
        ids
    }
}
