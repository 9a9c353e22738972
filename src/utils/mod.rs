pub mod channels;
pub mod perf;
pub mod worker;

pub use channels::{AudioChannels, EventBus};
pub use perf::TimingTracker;
pub use worker::WorkerThread;
