use super::*;

fn job() -> ExportJob {
    ExportJob::new(
        DesignId::new(),
        "alice",
        ExportFormat::Png,
        ConvertOptions::default(),
        None,
        OffsetDateTime::UNIX_EPOCH,
    )
}

#[test]
fn transitions_follow_the_lifecycle() {
    use JobStatus::*;
    let allowed = [
        (Created, Queued),
        (Created, Cancelled),
        (Queued, Processing),
        (Queued, Cancelled),
        (Processing, Completed),
        (Processing, Failed),
    ];
    for (from, to) in allowed {
        assert!(from.can_transition_to(to), "{from} -> {to}");
    }
    for terminal in [Completed, Failed, Cancelled] {
        assert!(terminal.is_terminal());
        for next in [Created, Queued, Processing, Completed, Failed, Cancelled] {
            assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
        }
    }
    assert!(!Processing.can_transition_to(Cancelled));
    assert!(!Queued.can_transition_to(Completed));
}

#[test]
fn transition_stamps_times_and_progress() {
    let mut j = job();
    let t1 = OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(5);
    j.transition(JobStatus::Queued, t1).unwrap();
    j.transition(JobStatus::Processing, t1).unwrap();
    assert_eq!(j.started_at, Some(t1));
    assert_eq!(j.progress, 10);
    let t2 = t1 + time::Duration::seconds(1);
    j.transition(JobStatus::Completed, t2).unwrap();
    assert_eq!(j.completed_at, Some(t2));
    assert_eq!(j.updated_at, t2);
    assert_eq!(j.progress, 100);

    let err = j.transition(JobStatus::Failed, t2).unwrap_err();
    assert!(matches!(err, StratumError::InvalidState(_)));
    assert_eq!(j.status, JobStatus::Completed);
}

#[test]
fn retry_links_to_original() {
    let original = job();
    let retry = original.retry_from(OffsetDateTime::UNIX_EPOCH);
    assert_ne!(retry.id, original.id);
    assert_eq!(retry.retry_of, Some(original.id));
    assert_eq!(retry.attempt, 2);
    assert_eq!(retry.status, JobStatus::Created);
    assert_eq!(retry.format, original.format);
}

#[test]
fn view_hides_diagnostics() {
    let mut j = job();
    let err = StratumError::conversion("rasterizer failed", "stack trace with /secret/path");
    j.error = Some(JobError::from(&err));
    assert_eq!(
        j.error.as_ref().unwrap().details.as_deref(),
        Some("stack trace with /secret/path")
    );

    let view = j.view();
    let public = view.error.unwrap();
    assert_eq!(public.code, "conversion");
    assert_eq!(public.message, "rasterizer failed");
    let json = serde_json::to_string(&j.view()).unwrap();
    assert!(!json.contains("secret"));
}

#[test]
fn request_options_use_default_quality() {
    let mut req = ExportRequest::new(DesignId::new(), "png");
    req.width = Some(10);
    assert_eq!(req.options(QualityTier::Low).quality, QualityTier::Low);
    req.quality = Some(QualityTier::Ultra);
    let opts = req.options(QualityTier::Low);
    assert_eq!(opts.quality, QualityTier::Ultra);
    assert_eq!(opts.width, Some(10));
}

#[test]
fn job_serializes_with_rfc3339_times() {
    let j = job();
    let json = serde_json::to_value(&j).unwrap();
    assert_eq!(json["createdAt"], "1970-01-01T00:00:00Z");
    assert_eq!(json["status"], "created");
    let back: ExportJob = serde_json::from_value(json).unwrap();
    assert_eq!(back, j);
}
