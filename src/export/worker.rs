use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::export::controller::ExportController;
use crate::foundation::error::{StratumError, StratumResult};

/// Fixed set of named OS threads draining the controller's queue.
#[derive(Debug)]
pub struct WorkerPool {
    controller: Arc<ExportController>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` threads (at least one).
    pub fn spawn(controller: Arc<ExportController>, workers: usize) -> StratumResult<Self> {
        let count = workers.max(1);
        let mut handles = Vec::with_capacity(count);
        for i in 0..count {
            let ctrl = Arc::clone(&controller);
            let handle = std::thread::Builder::new()
                .name(format!("stratum-export-{i}"))
                .spawn(move || worker_loop(&ctrl))
                .map_err(|e| {
                    StratumError::Other(anyhow::anyhow!("failed to spawn export worker {i}: {e}"))
                })?;
            handles.push(handle);
        }
        debug!(workers = count, "export worker pool started");
        Ok(Self {
            controller,
            handles,
        })
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Close the queue, let workers drain it and join them.
    pub fn shutdown(mut self) -> StratumResult<()> {
        self.stop()
    }

    fn stop(&mut self) -> StratumResult<()> {
        self.controller.queue().close();
        let mut panicked = 0;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            return Err(StratumError::Other(anyhow::anyhow!(
                "{panicked} export worker(s) panicked"
            )));
        }
        debug!("export worker pool stopped");
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            let _ = self.stop();
        }
    }
}

fn worker_loop(controller: &ExportController) {
    while let Some(id) = controller.queue().pop() {
        match controller.process(id) {
            Ok(status) => debug!(job = %id, %status, "worker finished job"),
            Err(err) => warn!(job = %id, error = %err, "worker could not process job"),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/export/worker.rs"]
mod tests;
