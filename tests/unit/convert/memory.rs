use super::*;
use crate::convert::format::{ConvertOptions, ExportFormat};
use crate::design::model::Background;

fn doc() -> Document {
    Document {
        width: 8,
        height: 8,
        background: Background::default(),
        animation: None,
        primitives: Vec::new(),
    }
}

#[test]
fn records_requests_and_consumes_failures_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let conv = InMemoryConverter::new();
    conv.fail_next(ScriptedFailure::Timeout);
    let req = ConvertRequest {
        format: ExportFormat::Png,
        options: ConvertOptions::default(),
        output_path: dir.path().join("a.png"),
    };

    assert!(matches!(
        conv.convert(&doc(), &req),
        Err(StratumError::Timeout(_))
    ));
    let handle = conv.convert(&doc(), &req).unwrap();
    assert!(handle.size_bytes > 0);
    assert_eq!(conv.requests().len(), 2);
    assert_eq!(conv.requests()[0], req);
}
