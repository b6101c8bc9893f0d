use super::*;
use crate::convert::format::ConvertOptions;
use crate::export::job::{ArtifactMeta, ExportJob, JobStatus};
use time::macros::datetime;

#[test]
fn init_creates_root() {
    let dir = tempfile::tempdir().unwrap();
    let storage = ArtifactStorage::new(dir.path().join("a").join("b"));
    storage.init().unwrap();
    assert!(storage.root().is_dir());
    storage.init().unwrap();
}

#[test]
fn artifact_path_layout() {
    let storage = ArtifactStorage::new("/srv/exports");
    let design = DesignId::new();
    let job = JobId::new();
    let at = datetime!(2024-03-05 07:08:09.123 UTC);
    let path = storage
        .artifact_path(design, job, ExportFormat::Webm, at)
        .unwrap();

    assert_eq!(path.parent().unwrap(), Path::new("/srv/exports").join(design.to_string()));
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("export-20240305T070809123Z-"), "{name}");
    assert!(name.ends_with(".webm"));
    let hash = name
        .trim_start_matches("export-20240305T070809123Z-")
        .trim_end_matches(".webm");
    assert_eq!(hash.len(), 16);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

    // deterministic for the same inputs
    assert_eq!(
        storage.artifact_path(design, job, ExportFormat::Webm, at).unwrap(),
        path
    );
}

#[test]
fn artifact_names_differ_per_job_at_same_instant() {
    let storage = ArtifactStorage::new("/srv/exports");
    let design = DesignId::new();
    let at = datetime!(2024-03-05 07:08:09 UTC);
    let a = storage
        .artifact_path(design, JobId::new(), ExportFormat::Png, at)
        .unwrap();
    let b = storage
        .artifact_path(design, JobId::new(), ExportFormat::Png, at)
        .unwrap();
    assert_ne!(a, b);
}

#[test]
fn artifact_stamp_is_utc() {
    let storage = ArtifactStorage::new("/srv");
    let at = datetime!(2024-03-05 09:00:00 +02:00);
    let path = storage
        .artifact_path(DesignId::new(), JobId::new(), ExportFormat::Pdf, at)
        .unwrap();
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("export-20240305T070000000Z-"), "{name}");
}

#[test]
fn open_rejects_paths_outside_root() {
    let dir = tempfile::tempdir().unwrap();
    let storage = ArtifactStorage::new(dir.path().join("exports"));
    storage.init().unwrap();

    let outside = dir.path().join("secret.txt");
    std::fs::write(&outside, b"x").unwrap();
    assert!(matches!(
        storage.open(&outside),
        Err(StratumError::Storage(_))
    ));

    let escaped = storage.root().join("..").join("secret.txt");
    assert!(escaped.exists());
    assert!(matches!(
        storage.open(&escaped),
        Err(StratumError::Storage(_))
    ));

    #[cfg(unix)]
    {
        let link = storage.root().join("link.svg");
        std::os::unix::fs::symlink(&outside, &link).unwrap();
        assert!(matches!(storage.open(&link), Err(StratumError::Storage(_))));
    }

    let missing = storage.root().join("nope.png");
    assert!(matches!(
        storage.open(&missing),
        Err(StratumError::NotFound(_))
    ));

    let inside = storage.root().join("ok.svg");
    std::fs::write(&inside, b"<svg/>").unwrap();
    assert!(storage.open(&inside).is_ok());
}

#[test]
fn discard_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let storage = ArtifactStorage::new(dir.path());
    let file = dir.path().join("a.png");
    std::fs::write(&file, b"png").unwrap();
    storage.discard(&file).unwrap();
    assert!(!file.exists());
    storage.discard(&file).unwrap();
}

#[test]
fn purge_removes_files_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let storage = ArtifactStorage::new(dir.path());
    storage.init().unwrap();
    let jobs = JobStore::new();

    let t0 = datetime!(2024-01-01 00:00 UTC);
    let mut job = ExportJob::new(
        DesignId::new(),
        "",
        ExportFormat::Svg,
        ConvertOptions::default(),
        None,
        t0,
    );
    let path = storage
        .artifact_path(job.design_id, job.id, ExportFormat::Svg, t0)
        .unwrap();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"<svg/>").unwrap();
    job.transition(JobStatus::Queued, t0).unwrap();
    job.transition(JobStatus::Processing, t0).unwrap();
    job.transition(JobStatus::Completed, t0).unwrap();
    job.artifact = Some(ArtifactMeta {
        path: path.clone(),
        file_name: path.file_name().unwrap().to_string_lossy().into_owned(),
        size_bytes: 6,
        mime_type: "image/svg+xml".to_string(),
        format: ExportFormat::Svg,
    });
    job.expires_at = Some(t0 + time::Duration::hours(24));
    let id = jobs.insert(job).unwrap();

    assert_eq!(
        storage
            .purge_expired(&jobs, t0 + time::Duration::hours(1))
            .unwrap(),
        0
    );
    assert!(path.exists());

    let later = t0 + time::Duration::hours(24);
    assert_eq!(storage.purge_expired(&jobs, later).unwrap(), 1);
    assert!(!path.exists());
    let job = jobs.get(id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.artifact.is_none());

    assert_eq!(storage.purge_expired(&jobs, later).unwrap(), 0);
}
