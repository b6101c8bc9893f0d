use super::*;

fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn defaults_are_valid() {
    let config = StratumConfig::default();
    config.validate().unwrap();
    assert_eq!(config.workers, 2);
    assert_eq!(config.conversion_timeout(), Duration::from_secs(120));
    assert_eq!(config.level_filter().unwrap(), LevelFilter::INFO);
    assert_eq!(config.rasterizer, PathBuf::from("magick"));
}

#[test]
fn toml_fills_missing_keys_with_defaults() {
    let config = StratumConfig::from_toml(
        r#"
export_root = "/var/lib/stratum"
workers = 4
default_quality = "ultra"
"#,
    )
    .unwrap();
    assert_eq!(config.export_root, PathBuf::from("/var/lib/stratum"));
    assert_eq!(config.workers, 4);
    assert_eq!(config.default_quality, QualityTier::Ultra);
    assert_eq!(config.retention_hours, 24);
}

#[test]
fn toml_rejects_unknown_keys() {
    let err = StratumConfig::from_toml("wrokers = 3").unwrap_err();
    assert!(matches!(err, StratumError::Validation(_)));
}

#[test]
fn env_overrides_file_and_cli_overrides_env() {
    let mut config = StratumConfig::from_toml("workers = 4\nlog_level = \"warn\"").unwrap();
    config
        .apply_env(env(&[
            ("STRATUM_WORKERS", "8"),
            ("STRATUM_DEFAULT_QUALITY", "low"),
            ("STRATUM_TRANSCODER", "/opt/ffmpeg"),
            ("HOME", "/root"),
            ("STRATUM_UNRELATED", "x"),
        ]))
        .unwrap();
    assert_eq!(config.workers, 8);
    assert_eq!(config.default_quality, QualityTier::Low);
    assert_eq!(config.transcoder, PathBuf::from("/opt/ffmpeg"));
    assert_eq!(config.log_level, "warn");

    config.apply_overrides(&ConfigOverrides {
        workers: Some(1),
        log_level: Some("debug".to_string()),
        ..Default::default()
    });
    assert_eq!(config.workers, 1);
    assert_eq!(config.level_filter().unwrap(), LevelFilter::DEBUG);
    assert_eq!(config.default_quality, QualityTier::Low);
}

#[test]
fn bad_env_values_are_rejected() {
    let mut config = StratumConfig::default();
    assert!(
        config
            .apply_env(env(&[("STRATUM_WORKERS", "many")]))
            .is_err()
    );
    assert!(
        config
            .apply_env(env(&[("STRATUM_DEFAULT_QUALITY", "best")]))
            .is_err()
    );
}

#[test]
fn validate_checks_ranges() {
    let cases: Vec<fn(&mut StratumConfig)> = vec![
        |c| c.workers = 0,
        |c| c.workers = 1000,
        |c| c.conversion_timeout_secs = 0,
        |c| c.retention_hours = 0,
        |c| c.log_level = "loud".to_string(),
        |c| c.export_root = PathBuf::new(),
        |c| c.rasterizer = PathBuf::new(),
    ];
    for mutate in cases {
        let mut config = StratumConfig::default();
        mutate(&mut config);
        assert!(matches!(
            config.validate(),
            Err(StratumError::Validation(_))
        ));
    }
}

#[test]
fn load_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stratum.toml");
    std::fs::write(&path, "retention_hours = 48\n").unwrap();
    let config = StratumConfig::from_file(&path).unwrap();
    assert_eq!(config.retention_hours, 48);
    assert_eq!(
        config.controller_settings(None).retention,
        time::Duration::hours(48)
    );

    assert!(StratumConfig::from_file(&dir.path().join("missing.toml")).is_err());
}

#[test]
fn build_controller_initializes_storage() {
    let dir = tempfile::tempdir().unwrap();
    let config = StratumConfig {
        export_root: dir.path().join("out"),
        ..Default::default()
    };
    let designs = Arc::new(crate::design::store::InMemoryDesignStore::new());
    let controller = config
        .build_controller(designs, Engine::Builtin, None)
        .unwrap();
    assert!(dir.path().join("out").is_dir());
    assert_eq!(controller.storage().root(), dir.path().join("out"));
}
