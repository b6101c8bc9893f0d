use std::ffi::OsString;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::convert::format::{
    ArtifactHandle, ConvertOptions, ConvertRequest, Converter, ExportFormat, artifact_handle,
    ensure_parent_dir,
};
use crate::design::model::AnimationSettings;
use crate::foundation::error::{StratumError, StratumResult};
use crate::render::document::Document;
use crate::render::svg::to_svg;

/// Default rasterizer program (ImageMagick 7).
pub const DEFAULT_RASTERIZER: &str = "magick";
/// Default video transcoder program.
pub const DEFAULT_TRANSCODER: &str = "ffmpeg";
/// Default per-process timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long output pipes are read after a kill before they are abandoned.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Converter that shells out to an external rasterizer and transcoder.
///
/// SVG output is written directly. Raster formats write the intermediate SVG into a scoped
/// temporary directory and run the rasterizer on it; video formats rasterize one frame and have
/// the transcoder loop it for the animation duration. Every process is killed once the timeout
/// elapses.
#[derive(Clone, Debug)]
pub struct ExternalConverter {
    rasterizer: PathBuf,
    transcoder: PathBuf,
    timeout: Duration,
}

impl Default for ExternalConverter {
    fn default() -> Self {
        Self::new(DEFAULT_RASTERIZER, DEFAULT_TRANSCODER, DEFAULT_TIMEOUT)
    }
}

impl ExternalConverter {
    /// Create a converter using the given programs.
    pub fn new(
        rasterizer: impl Into<PathBuf>,
        transcoder: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            rasterizer: rasterizer.into(),
            transcoder: transcoder.into(),
            timeout,
        }
    }

    /// Per-process timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn rasterize(
        &self,
        doc: &Document,
        format: ExportFormat,
        options: &ConvertOptions,
        output: &Path,
    ) -> StratumResult<()> {
        let scratch = scratch_dir()?;
        let input = scratch.path().join("document.svg");
        let doc = options.apply_background(doc, format);
        write_file(&input, to_svg(&doc).as_bytes())?;

        let args = rasterizer_args(&input, output, format, options);
        run_bounded(&self.rasterizer, &args, self.timeout)?;
        Ok(())
    }

    fn encode_video(
        &self,
        doc: &Document,
        format: ExportFormat,
        options: &ConvertOptions,
        output: &Path,
    ) -> StratumResult<()> {
        let scratch = scratch_dir()?;
        let input = scratch.path().join("document.svg");
        let frame = scratch.path().join("frame.png");
        let doc = options.apply_background(doc, format);
        write_file(&input, to_svg(&doc).as_bytes())?;

        let frame_args = rasterizer_args(&input, &frame, ExportFormat::Png, options);
        run_bounded(&self.rasterizer, &frame_args, self.timeout)?;
        if !frame.exists() {
            return Err(StratumError::conversion(
                "rasterizer produced no video frame",
                frame.display().to_string(),
            ));
        }

        let animation = doc.animation.unwrap_or_default();
        let args = transcoder_args(&frame, output, format, options, &animation);
        run_bounded(&self.transcoder, &args, self.timeout)?;
        Ok(())
    }
}

impl Converter for ExternalConverter {
    fn name(&self) -> &'static str {
        "external"
    }

    #[tracing::instrument(
        name = "convert",
        level = "debug",
        skip_all,
        fields(converter = "external", format = %request.format)
    )]
    fn convert(&self, doc: &Document, request: &ConvertRequest) -> StratumResult<ArtifactHandle> {
        ensure_parent_dir(&request.output_path)?;
        let out = request.output_path.as_path();
        match request.format {
            ExportFormat::Svg => {
                let doc = request.options.apply_background(doc, request.format);
                write_file(out, to_svg(&doc).as_bytes())?;
            }
            ExportFormat::Png | ExportFormat::Jpg | ExportFormat::Pdf | ExportFormat::Gif => {
                self.rasterize(doc, request.format, &request.options, out)?;
            }
            ExportFormat::Mp4 | ExportFormat::Webm => {
                self.encode_video(doc, request.format, &request.options, out)?;
            }
        }
        artifact_handle(out, request.format)
    }
}

/// Rasterizer argument list: `[-background ..] input [-flatten] [-resize ..] -quality Q output`.
pub fn rasterizer_args(
    input: &Path,
    output: &Path,
    format: ExportFormat,
    options: &ConvertOptions,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(10);
    let matte = options.matte(format);
    args.push("-background".into());
    args.push(matte.into());
    args.push(input.as_os_str().to_owned());
    if matte != "none" {
        args.push("-flatten".into());
    }
    if let Some(geometry) = options.resize_geometry() {
        args.push("-resize".into());
        args.push(geometry.into());
    }
    args.push("-quality".into());
    args.push(options.quality.value().to_string().into());
    args.push(output.as_os_str().to_owned());
    args
}

/// Transcoder argument list looping a still frame for the animation duration.
pub fn transcoder_args(
    frame: &Path,
    output: &Path,
    format: ExportFormat,
    options: &ConvertOptions,
    animation: &AnimationSettings,
) -> Vec<OsString> {
    let seconds = animation.duration_ms as f64 / 1000.0;
    let mut args: Vec<OsString> = [
        "-y",
        "-loglevel",
        "error",
        "-loop",
        "1",
        "-framerate",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(animation.fps.max(1).to_string().into());
    args.push("-i".into());
    args.push(frame.as_os_str().to_owned());
    args.push("-t".into());
    args.push(format!("{seconds:.3}").into());
    // yuv420p needs even dimensions.
    args.push("-vf".into());
    args.push("scale=trunc(iw/2)*2:trunc(ih/2)*2".into());
    args.push("-an".into());
    let crf = options.quality.crf().to_string();
    match format {
        ExportFormat::Webm => {
            for a in ["-c:v", "libvpx-vp9", "-pix_fmt", "yuv420p", "-b:v", "0", "-crf"] {
                args.push(a.into());
            }
            args.push(crf.into());
        }
        _ => {
            for a in ["-c:v", "libx264", "-pix_fmt", "yuv420p", "-crf"] {
                args.push(a.into());
            }
            args.push(crf.into());
            args.push("-movflags".into());
            args.push("+faststart".into());
        }
    }
    args.push(output.as_os_str().to_owned());
    args
}

/// Captured result of a finished process.
#[derive(Debug)]
pub(crate) struct ProcessOutput {
    pub(crate) status: ExitStatus,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

/// Run `program` to completion, killing it after `timeout`.
///
/// On unix the program runs in its own process group and the whole group is killed, so helper
/// processes it started cannot outlive the timeout. Output still held open by a straggler is
/// abandoned after a short grace period.
///
/// Nonzero exit becomes [`StratumError::Conversion`] with stderr/stdout as diagnostics.
pub(crate) fn run_bounded(
    program: &Path,
    args: &[OsString],
    timeout: Duration,
) -> StratumResult<ProcessOutput> {
    let started_at = Instant::now();
    let deadline = started_at
        .checked_add(timeout)
        .unwrap_or_else(|| started_at + Duration::from_secs(u64::from(u32::MAX)));
    let name = program.display().to_string();

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        command.process_group(0);
    }
    let mut child = command
        .spawn()
        .map_err(|err| {
            warn!(
                op = "convert::spawn",
                result = "error",
                program = %name,
                error = %err,
                "failed to spawn converter process"
            );
            if err.kind() == ErrorKind::NotFound {
                StratumError::conversion(
                    format!("converter program '{name}' was not found"),
                    err.to_string(),
                )
            } else {
                StratumError::conversion(format!("failed to spawn '{name}'"), err.to_string())
            }
        })?;

    let stdout_drain = drain(child.stdout.take());
    let stderr_drain = drain(child.stderr.take());

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                kill_tree(&mut child);
                let grace = Instant::now() + DRAIN_GRACE;
                let stderr = collect(stderr_drain, grace);
                let _ = collect(stdout_drain, grace);
                warn!(
                    op = "convert::spawn",
                    result = "timeout",
                    program = %name,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    stderr = %stderr.trim(),
                    "converter process timed out and was killed"
                );
                return Err(StratumError::timeout(format!(
                    "'{name}' did not finish within {}s",
                    timeout.as_secs_f64()
                )));
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(err) => {
                kill_tree(&mut child);
                return Err(StratumError::conversion(
                    format!("failed to wait for '{name}'"),
                    err.to_string(),
                ));
            }
        }
    };

    // A helper that inherited the pipes may keep them open after the program exits.
    let drain_deadline = deadline.max(Instant::now() + DRAIN_GRACE);
    let output = ProcessOutput {
        status,
        stdout: collect(stdout_drain, drain_deadline),
        stderr: collect(stderr_drain, drain_deadline),
    };
    let exit_code = output.status.code().map(i64::from).unwrap_or(-1);

    if !output.status.success() {
        warn!(
            op = "convert::spawn",
            result = "error",
            program = %name,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            exit_code,
            stderr = %output.stderr.trim(),
            "converter process failed"
        );
        let mut diagnostics = output.stderr.trim().to_string();
        if !output.stdout.trim().is_empty() {
            if !diagnostics.is_empty() {
                diagnostics.push('\n');
            }
            diagnostics.push_str(output.stdout.trim());
        }
        return Err(StratumError::conversion(
            format!("'{name}' exited with status {exit_code}"),
            diagnostics,
        ));
    }

    info!(
        op = "convert::spawn",
        result = "ok",
        program = %name,
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        exit_code,
        "converter process finished"
    );
    Ok(output)
}

/// Kill `child` and, on unix, every process in its group; then reap it.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        // The child leads its own group, so the group id equals its pid.
        let group = format!("-{}", child.id());
        let killed = Command::new("kill")
            .args(["-KILL", "--", group.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(err) = killed {
            warn!(
                op = "convert::kill",
                pgid = %group,
                error = %err,
                "failed to signal process group"
            );
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<Vec<u8>>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });
        rx
    })
}

/// Output read by a drain thread, or nothing if it is still blocked at `deadline`.
fn collect(rx: Option<Receiver<Vec<u8>>>, deadline: Instant) -> String {
    rx.and_then(|rx| {
        rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .ok()
    })
    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    .unwrap_or_default()
}

fn scratch_dir() -> StratumResult<tempfile::TempDir> {
    tempfile::Builder::new()
        .prefix("stratum-convert-")
        .tempdir()
        .map_err(|e| StratumError::storage(format!("failed to create scratch directory: {e}")))
}

fn write_file(path: &Path, bytes: &[u8]) -> StratumResult<()> {
    std::fs::write(path, bytes)
        .map_err(|e| StratumError::storage(format!("failed to write '{}': {e}", path.display())))
}

/// Return `true` when `program` can be invoked (`program -version` exits 0).
pub fn is_program_available(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/convert/external.rs"]
mod tests;
