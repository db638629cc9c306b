//! The typed data model shared by every pipeline component.

pub mod cached_file_info;
pub mod change_event;
pub mod checkpoint;
pub mod entity;
pub mod relationship;
pub mod subscription;
pub mod task;

pub use cached_file_info::CachedFileInfo;
pub use change_event::ChangeEvent;
pub use checkpoint::{Checkpoint, CheckpointExport, CheckpointReason, CheckpointSummary, TimeWindow};
pub use entity::{DirectoryEntity, Entity, FileEntity, ModuleEntity, Parameter, Symbol, SymbolDetail};
pub use relationship::{PlaceholderCategory, Relationship, ToRef};
pub use subscription::Subscription;
pub use task::Task;
