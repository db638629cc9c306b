pub mod cache;
pub mod checkpoints;
pub mod config;
pub mod context;
pub mod error;
pub mod fanout;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod parsing;
pub mod queue;
pub mod reliability;
pub mod resolution;
pub mod sink;
pub mod telemetry;
pub mod types;
pub mod utils;
pub mod workers;
pub mod writer;

pub use cache::CacheIndex;
pub use checkpoints::CheckpointStore;
pub use config::Settings;
pub use context::PipelineContext;
pub use error::{IngestError, IngestResult};
pub use orchestrator::{assign_priority, Pipeline, PipelineState};
