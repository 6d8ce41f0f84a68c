pub mod hash;
pub mod scanner;
pub mod render;
pub mod fetch;
pub mod snapshot;
pub mod aggregate;
pub mod store;
pub mod sync;
pub mod watcher;
pub mod config;
pub mod error;

pub use config::Config;
pub use error::{DocShelfError, Result};
pub use fetch::{Fetcher, GitFetcher, LocalFetcher, SourceFetcher};
pub use hash::{CategoryId, DocumentId};
pub use render::{MarkdownRenderer, Renderer};
pub use snapshot::Snapshot;
pub use store::SnapshotStore;
pub use sync::{RunOutcome, SourceConfig, SyncOrchestrator, SyncTrigger, SyncWorker, TriggerOutcome};
pub use watcher::TreeWatcher;
