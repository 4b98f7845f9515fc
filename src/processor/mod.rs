pub mod batch;
pub mod checkpoint;
pub mod orchestrator;
pub mod progress_tracker;

pub use batch::{BatchReport, BatchRunner, BrowserSessionFactory};
pub use checkpoint::CheckpointStore;
pub use orchestrator::OrchestratorPolicy;
pub use progress_tracker::ProgressTracker;
