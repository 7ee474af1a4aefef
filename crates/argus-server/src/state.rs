use argus_core::maintenance::Maintenance;
use argus_core::submit::SubmitService;
use argus_core::PipelineConfig;
use argus_db::{Database, FetchRepository, PgQueueBus};

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub db: Database,
    pub submit: SubmitService<FetchRepository, PgQueueBus>,
    pub maintenance: Maintenance<FetchRepository>,
    pub config: PipelineConfig,
}

impl AppState {
    pub fn new(db: Database, config: PipelineConfig) -> Self {
        let repo = db.fetch_repo();
        let bus = db.queue_bus();
        Self {
            submit: SubmitService::new(repo.clone(), bus, config.clone()),
            maintenance: Maintenance::new(repo),
            db,
            config,
        }
    }
}
