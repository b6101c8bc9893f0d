use super::*;
use crate::convert::memory::{InMemoryConverter, ScriptedFailure};
use crate::design::model::Design;
use crate::design::store::InMemoryDesignStore;
use crate::export::job::{ExportRequest, JobStatus};
use crate::export::queue::InProcessQueue;
use crate::export::store::JobStore;
use crate::foundation::core::Canvas;
use crate::storage::ArtifactStorage;
use std::time::Duration;

#[test]
fn pool_processes_jobs_and_survives_failures() {
    let dir = tempfile::tempdir().unwrap();
    let designs = Arc::new(InMemoryDesignStore::new());
    let design = designs
        .insert(Design::new("w", Canvas::new(16, 16).unwrap()).unwrap())
        .unwrap();
    let converter = Arc::new(InMemoryConverter::new());
    converter.fail_next(ScriptedFailure::Panic);
    let storage = ArtifactStorage::new(dir.path());
    storage.init().unwrap();
    let controller = Arc::new(ExportController::new(
        designs,
        Arc::new(JobStore::new()),
        Arc::new(InProcessQueue::new()),
        converter,
        storage,
    ));

    let pool = WorkerPool::spawn(Arc::clone(&controller), 3).unwrap();
    assert_eq!(pool.size(), 3);

    let ids: Vec<_> = (0..6)
        .map(|_| controller.submit(ExportRequest::new(design, "svg")).unwrap())
        .collect();
    let statuses: Vec<JobStatus> = ids
        .iter()
        .map(|id| {
            controller
                .wait(*id, Duration::from_secs(10))
                .unwrap()
                .status
        })
        .collect();
    pool.shutdown().unwrap();

    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == JobStatus::Failed)
            .count(),
        1
    );
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == JobStatus::Completed)
            .count(),
        5
    );
    assert!(controller.queue().is_empty());
    assert!(
        controller
            .submit(ExportRequest::new(design, "svg"))
            .is_err()
    );
}
