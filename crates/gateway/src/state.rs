use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tm_domain::config::Config;
use tm_providers::ModelRegistry;
use tm_tools::ToolRegistry;

use crate::bus::EventBus;
use crate::store::TaskStore;
use crate::worker::WorkerTracker;

/// Shared application state passed to all API handlers.
///
/// Every field is an `Arc`'d handle created once at startup; workers
/// share nothing else.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub models: Arc<ModelRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub store: Arc<TaskStore>,
    pub bus: Arc<EventBus>,
    /// In-flight task workers, tracked for the shutdown drain.
    pub workers: Arc<WorkerTracker>,
    /// Set on SIGINT/SIGTERM; observed between orchestrator turns and
    /// before spawning new workers.
    pub shutdown: Arc<AtomicBool>,
}
