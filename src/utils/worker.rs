use crate::{Result, ZelnaError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// A named worker thread with a cooperative stop flag.
///
/// Joining the thread is the worker's acknowledgement that it has stopped
/// and released whatever it acquired at startup.
pub struct WorkerThread {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    pub fn spawn<F>(name: impl Into<String>, body: F) -> Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let name = name.into();
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(worker_stop))
            .map_err(|e| ZelnaError::Channel(format!("Failed to spawn {}: {}", name, e)))?;

        Ok(Self {
            name,
            stop,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Signal the worker and wait for it to exit
    pub fn stop_and_join(mut self) {
        self.request_stop();
        self.join_inner();
    }

    fn join_inner(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Worker {} panicked", self.name);
            } else {
                debug!("Worker {} stopped", self.name);
            }
        }
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.request_stop();
        self.join_inner();
    }
}
