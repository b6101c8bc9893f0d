//! Export job lifecycle: request, job records, queue, controller and workers.

/// Job controller.
pub mod controller;
/// Job, request and status types.
pub mod job;
/// Job queue.
pub mod queue;
/// Job registry.
pub mod store;
/// Worker thread pool.
pub mod worker;
