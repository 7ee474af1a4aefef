//! Core fetch pipeline: URL canonicalization, failure classification, the
//! record state machine, the queue protocol, and the control/worker plane
//! services, all generic over the store, bus, and browser seams.

pub mod attempt;
pub mod bus;
pub mod classify;
pub mod config;
pub mod consumers;
pub mod engine;
pub mod error;
pub mod maintenance;
pub mod messages;
pub mod normalize;
pub mod record;
pub mod store;
pub mod submit;
pub mod testutil;

pub use bus::{Delivery, MessageHandler, QueueBus};
pub use config::{PipelineConfig, ScraperConfig};
pub use engine::{PageEngine, PageFetch, WaitStrategy};
pub use error::AppError;
pub use record::{compute_hash, FetchRecord, FetchStatus, NewFetchRecord, Patch, RecordUpdate};
pub use store::{FetchStore, RecordFilter};
