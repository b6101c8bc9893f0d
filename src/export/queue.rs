use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::foundation::core::JobId;
use crate::foundation::error::{StratumError, StratumResult};

/// FIFO of job ids waiting for a worker.
pub trait JobQueue: Send + Sync {
    /// Enqueue a job id. Fails once the queue is closed.
    fn push(&self, id: JobId) -> StratumResult<()>;

    /// Block until an id is available; `None` once the queue is closed and drained.
    fn pop(&self) -> Option<JobId>;

    /// Stop accepting pushes and wake every waiting consumer.
    fn close(&self);

    /// Number of ids waiting.
    fn len(&self) -> usize;

    /// Return `true` when nothing is waiting.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<JobId>,
    closed: bool,
}

/// Mutex + condvar queue shared by the worker threads of one process.
#[derive(Debug, Default)]
pub struct InProcessQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl InProcessQueue {
    /// Create an open, empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether [`JobQueue::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|s| s.closed).unwrap_or(true)
    }
}

impl JobQueue for InProcessQueue {
    fn push(&self, id: JobId) -> StratumResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StratumError::Other(anyhow::anyhow!("job queue lock poisoned")))?;
        if state.closed {
            return Err(StratumError::invalid_state(format!(
                "job queue is closed; {id} was not enqueued"
            )));
        }
        state.items.push_back(id);
        self.ready.notify_one();
        Ok(())
    }

    fn pop(&self) -> Option<JobId> {
        let mut state = self.state.lock().ok()?;
        loop {
            if let Some(id) = state.items.pop_front() {
                return Some(id);
            }
            if state.closed {
                return None;
            }
            state = self.ready.wait(state).ok()?;
        }
    }

    fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
        self.ready.notify_all();
    }

    fn len(&self) -> usize {
        self.state.lock().map(|s| s.items.len()).unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/export/queue.rs"]
mod tests;
