pub mod recorder;
pub mod scheduler;
pub mod store;
pub mod worker;

pub use recorder::PostRecorder;
pub use scheduler::Scheduler;
pub use store::{DedupGuard, DedupStore};
pub use worker::{AccountWorker, WorkerState};
