use super::*;
use crate::convert::format::QualityTier;
use crate::design::model::Background;

fn strings(args: &[OsString]) -> Vec<String> {
    args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
}

fn document() -> Document {
    Document {
        width: 64,
        height: 32,
        background: Background::default(),
        animation: None,
        primitives: Vec::new(),
    }
}

#[test]
fn png_args_with_width_resize() {
    let opts = ConvertOptions {
        width: Some(100),
        ..ConvertOptions::default()
    };
    let args = strings(&rasterizer_args(
        Path::new("in.svg"),
        Path::new("out.png"),
        ExportFormat::Png,
        &opts,
    ));
    assert_eq!(
        args,
        vec![
            "-background",
            "white",
            "in.svg",
            "-flatten",
            "-resize",
            "100x",
            "-quality",
            "92",
            "out.png"
        ]
    );
}

#[test]
fn transparent_png_keeps_alpha_and_jpg_flattens_override() {
    let opts = ConvertOptions {
        transparent: true,
        quality: QualityTier::Low,
        ..ConvertOptions::default()
    };
    let args = strings(&rasterizer_args(
        Path::new("in.svg"),
        Path::new("out.png"),
        ExportFormat::Png,
        &opts,
    ));
    assert_eq!(&args[..3], ["-background", "none", "in.svg"]);
    assert!(!args.contains(&"-flatten".to_string()));
    assert!(args.contains(&"60".to_string()));

    let opts = ConvertOptions {
        transparent: true,
        background_color: Some("#abcdef".to_string()),
        scale: Some(1.5),
        ..ConvertOptions::default()
    };
    let args = strings(&rasterizer_args(
        Path::new("in.svg"),
        Path::new("out.jpg"),
        ExportFormat::Jpg,
        &opts,
    ));
    assert_eq!(&args[..4], ["-background", "#abcdef", "in.svg", "-flatten"]);
    assert!(args.windows(2).any(|w| w == ["-resize", "150%"]));
}

#[test]
fn video_args_loop_frame_for_duration() {
    let anim = AnimationSettings {
        duration_ms: 2_500,
        fps: 24,
        loop_playback: true,
    };
    let args = strings(&transcoder_args(
        Path::new("frame.png"),
        Path::new("out.mp4"),
        ExportFormat::Mp4,
        &ConvertOptions::default(),
        &anim,
    ));
    assert!(args.windows(2).any(|w| w == ["-framerate", "24"]));
    assert!(args.windows(2).any(|w| w == ["-t", "2.500"]));
    assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
    assert!(args.windows(2).any(|w| w == ["-pix_fmt", "yuv420p"]));
    assert!(args.windows(2).any(|w| w == ["-crf", "23"]));
    assert_eq!(args.last().map(String::as_str), Some("out.mp4"));

    let args = strings(&transcoder_args(
        Path::new("frame.png"),
        Path::new("out.webm"),
        ExportFormat::Webm,
        &ConvertOptions {
            quality: QualityTier::Ultra,
            ..ConvertOptions::default()
        },
        &anim,
    ));
    assert!(args.windows(2).any(|w| w == ["-c:v", "libvpx-vp9"]));
    assert!(args.windows(2).any(|w| w == ["-crf", "18"]));
    assert!(!args.contains(&"+faststart".to_string()));
}

#[test]
fn svg_is_written_without_subprocess() {
    let dir = tempfile::tempdir().unwrap();
    let conv = ExternalConverter::new(
        dir.path().join("no-such-rasterizer"),
        dir.path().join("no-such-transcoder"),
        Duration::from_secs(1),
    );
    let out = dir.path().join("nested/out.svg");
    let handle = conv
        .convert(
            &document(),
            &ConvertRequest {
                format: ExportFormat::Svg,
                options: ConvertOptions::default(),
                output_path: out.clone(),
            },
        )
        .unwrap();
    assert_eq!(handle.path, out);
    assert!(handle.size_bytes > 0);
    assert_eq!(handle.mime_type, "image/svg+xml");
}

#[test]
fn missing_program_is_conversion_error() {
    let dir = tempfile::tempdir().unwrap();
    let conv = ExternalConverter::new(
        dir.path().join("no-such-rasterizer"),
        DEFAULT_TRANSCODER,
        Duration::from_secs(1),
    );
    let err = conv
        .convert(
            &document(),
            &ConvertRequest {
                format: ExportFormat::Png,
                options: ConvertOptions::default(),
                output_path: dir.path().join("out.png"),
            },
        )
        .unwrap_err();
    assert!(matches!(err, StratumError::Conversion { .. }));
    assert!(!is_program_available(&dir.path().join("no-such-rasterizer")));
}

#[cfg(unix)]
mod scripts {
    use super::*;
    use std::{fs, os::unix::fs::PermissionsExt};

    fn make_executable(path: &Path) {
        let mut perms = fs::metadata(path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("set perms");
    }

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
        make_executable(&path);
        path
    }

    fn request(dir: &Path, format: ExportFormat) -> ConvertRequest {
        ConvertRequest {
            format,
            options: ConvertOptions {
                width: Some(100),
                ..ConvertOptions::default()
            },
            output_path: dir.join(format!("out.{}", format.extension())),
        }
    }

    #[test]
    fn rasterizer_receives_args_and_output_is_measured() {
        let dir = tempfile::tempdir().expect("temp dir");
        let args_log = dir.path().join("args.log");
        let raster = script(
            dir.path(),
            "fake-magick",
            &format!(
                "echo \"$@\" > \"{}\"\nfor last; do :; done\nprintf 'PNGDATA' > \"$last\"\n",
                args_log.display()
            ),
        );
        let conv = ExternalConverter::new(&raster, "ffmpeg", Duration::from_secs(10));
        let handle = conv
            .convert(&document(), &request(dir.path(), ExportFormat::Png))
            .expect("convert");
        assert_eq!(handle.size_bytes, 7);
        let logged = fs::read_to_string(&args_log).expect("args");
        assert!(logged.contains("-resize 100x"));
        assert!(logged.contains("document.svg"));
    }

    #[test]
    fn nonzero_exit_carries_stderr_as_diagnostics() {
        let dir = tempfile::tempdir().expect("temp dir");
        let raster = script(dir.path(), "fake-magick", "echo 'no decode delegate' >&2\nexit 3\n");
        let conv = ExternalConverter::new(&raster, "ffmpeg", Duration::from_secs(10));
        let err = conv
            .convert(&document(), &request(dir.path(), ExportFormat::Jpg))
            .unwrap_err();
        assert_eq!(err.code(), "conversion");
        assert!(err.to_string().contains("status 3"));
        assert_eq!(err.diagnostics(), Some("no decode delegate"));
    }

    #[test]
    fn zero_exit_without_output_fails() {
        let dir = tempfile::tempdir().expect("temp dir");
        let raster = script(dir.path(), "fake-magick", "exit 0\n");
        let conv = ExternalConverter::new(&raster, "ffmpeg", Duration::from_secs(10));
        let err = conv
            .convert(&document(), &request(dir.path(), ExportFormat::Gif))
            .unwrap_err();
        assert!(matches!(err, StratumError::Conversion { .. }));
    }

    #[test]
    fn slow_process_is_killed_on_timeout() {
        let dir = tempfile::tempdir().expect("temp dir");
        let raster = script(dir.path(), "slow-magick", "exec sleep 5\n");
        let conv = ExternalConverter::new(&raster, "ffmpeg", Duration::from_millis(200));
        let started = Instant::now();
        let err = conv
            .convert(&document(), &request(dir.path(), ExportFormat::Png))
            .unwrap_err();
        assert!(matches!(err, StratumError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn timeout_kills_helper_processes_holding_the_pipes() {
        let dir = tempfile::tempdir().expect("temp dir");
        let marker = dir.path().join("helper-survived");
        let raster = script(
            dir.path(),
            "forking-magick",
            &format!(
                "(sleep 1; touch \"{}\") &\necho 'delegating' >&2\nsleep 4\n",
                marker.display()
            ),
        );
        let conv = ExternalConverter::new(&raster, "ffmpeg", Duration::from_millis(200));
        let started = Instant::now();
        let err = conv
            .convert(&document(), &request(dir.path(), ExportFormat::Png))
            .unwrap_err();
        assert!(matches!(err, StratumError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());

        std::thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists());
    }

    #[test]
    fn video_runs_rasterizer_then_transcoder() {
        let dir = tempfile::tempdir().expect("temp dir");
        let log = dir.path().join("calls.log");
        let body = format!(
            "echo \"$(basename \"$0\") $@\" >> \"{}\"\nfor last; do :; done\nprintf 'X' > \"$last\"\n",
            log.display()
        );
        let raster = script(dir.path(), "fake-magick", &body);
        let ffmpeg = script(dir.path(), "fake-ffmpeg", &body);
        let conv = ExternalConverter::new(&raster, &ffmpeg, Duration::from_secs(10));
        let mut doc = document();
        doc.animation = Some(AnimationSettings::default());
        let handle = conv
            .convert(&doc, &request(dir.path(), ExportFormat::Mp4))
            .expect("convert");
        assert_eq!(handle.mime_type, "video/mp4");

        let calls = fs::read_to_string(&log).expect("log");
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("fake-magick"));
        assert!(lines[0].contains("frame.png"));
        assert!(lines[1].starts_with("fake-ffmpeg"));
        assert!(lines[1].contains("-t 3.000"));
    }

    #[test]
    fn scratch_directory_is_removed() {
        let dir = tempfile::tempdir().expect("temp dir");
        let seen = dir.path().join("seen.log");
        let raster = script(
            dir.path(),
            "fake-magick",
            &format!(
                "dirname \"$3\" > \"{}\"\nfor last; do :; done\nprintf 'X' > \"$last\"\n",
                seen.display()
            ),
        );
        let conv = ExternalConverter::new(&raster, "ffmpeg", Duration::from_secs(10));
        conv.convert(&document(), &request(dir.path(), ExportFormat::Png))
            .expect("convert");
        let scratch = fs::read_to_string(&seen).expect("seen");
        assert!(!Path::new(scratch.trim()).exists());
    }
}
