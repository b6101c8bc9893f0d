use std::{
    fs::File,
    io::{BufReader, Write as _},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use stratum::convert::external::is_program_available;
use stratum::{
    AnimationSettings, ConfigOverrides, Design, Engine, ExportController, ExportRequest,
    InMemoryDesignStore, JobStatus, QualityTier, RenderOptions, StratumConfig, WorkerPool,
};

#[derive(Parser, Debug)]
#[command(name = "stratum", version, about = "Render and export layered designs")]
struct Cli {
    /// Base log level (trace|debug|info|warn|error|off). `RUST_LOG` directives still apply.
    #[arg(long = "log-level", global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a design and print the drawing document as JSON.
    Render(RenderArgs),
    /// Render a design to an SVG file.
    Svg(SvgArgs),
    /// Export a design through the job pipeline and wait for the result.
    Export(Box<ExportArgs>),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input design JSON.
    #[arg(long)]
    design: PathBuf,

    /// Pretty-print the document.
    #[arg(long)]
    pretty: bool,
}

#[derive(Parser, Debug)]
struct SvgArgs {
    /// Input design JSON.
    #[arg(long)]
    design: PathBuf,

    /// Output SVG path; `-` writes to stdout.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input design JSON.
    #[arg(long)]
    design: PathBuf,

    /// Target format (png, jpg, svg, pdf, gif, mp4, webm).
    #[arg(long)]
    format: String,

    /// Output width in pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels.
    #[arg(long)]
    height: Option<u32>,

    /// Uniform scale factor, used when neither width nor height is given.
    #[arg(long)]
    scale: Option<f64>,

    /// Quality tier.
    #[arg(long, value_parser = parse_quality)]
    quality: Option<QualityTier>,

    /// Drop the background for formats with an alpha channel.
    #[arg(long)]
    transparent: bool,

    /// Override the background color.
    #[arg(long = "background", value_name = "COLOR")]
    background_color: Option<String>,

    /// Animation duration in milliseconds for video formats.
    #[arg(long = "duration-ms")]
    duration_ms: Option<u64>,

    /// Frames per second for video formats.
    #[arg(long)]
    fps: Option<u32>,

    /// Conversion backend.
    #[arg(long, value_enum, default_value_t = Engine::External)]
    engine: Engine,

    /// Optional TOML configuration file.
    #[arg(long, env = "STRATUM_CONFIG_FILE", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the export root directory.
    #[arg(long = "out-dir", value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Override the number of worker threads.
    #[arg(long)]
    workers: Option<usize>,

    /// Override the conversion timeout.
    #[arg(long = "timeout-secs", value_name = "SECONDS")]
    timeout_secs: Option<u64>,

    /// Override the rasterizer program.
    #[arg(long, value_name = "PROGRAM")]
    rasterizer: Option<PathBuf>,

    /// Override the transcoder program.
    #[arg(long, value_name = "PROGRAM")]
    transcoder: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => {
            init_tracing(parse_level(cli.log_level.as_deref())?)?;
            cmd_render(args)
        }
        Command::Svg(args) => {
            init_tracing(parse_level(cli.log_level.as_deref())?)?;
            cmd_svg(args)
        }
        Command::Export(args) => cmd_export(*args, cli.log_level),
    }
}

fn parse_level(level: Option<&str>) -> anyhow::Result<LevelFilter> {
    level
        .unwrap_or("info")
        .parse::<LevelFilter>()
        .map_err(|e| anyhow::anyhow!("invalid --log-level: {e}"))
}

fn parse_quality(s: &str) -> Result<QualityTier, String> {
    QualityTier::parse(s).map_err(|e| e.to_string())
}

fn init_tracing(level: LevelFilter) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

fn read_design(path: &Path) -> anyhow::Result<Design> {
    let f = File::open(path).with_context(|| format!("open design '{}'", path.display()))?;
    let design: Design = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parse design '{}'", path.display()))?;
    Ok(design)
}

fn asset_root(design_path: &Path) -> PathBuf {
    design_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf()
}

fn render_opts(design_path: &Path) -> RenderOptions {
    RenderOptions {
        animation: None,
        asset_root: Some(asset_root(design_path)),
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let design = read_design(&args.design)?;
    let doc = stratum::render_with(&design, &render_opts(&args.design))?;
    let json = if args.pretty {
        serde_json::to_string_pretty(&doc)?
    } else {
        serde_json::to_string(&doc)?
    };
    let mut out = std::io::stdout().lock();
    writeln!(out, "{json}").context("write document to stdout")?;
    Ok(())
}

fn cmd_svg(args: SvgArgs) -> anyhow::Result<()> {
    let design = read_design(&args.design)?;
    let doc = stratum::render_with(&design, &render_opts(&args.design))?;
    let svg = stratum::to_svg(&doc);
    if args.out.as_os_str() == "-" {
        std::io::stdout()
            .lock()
            .write_all(svg.as_bytes())
            .context("write svg to stdout")?;
        return Ok(());
    }
    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output directory '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, svg.as_bytes())
        .with_context(|| format!("write svg '{}'", args.out.display()))?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_export(args: ExportArgs, log_level: Option<String>) -> anyhow::Result<()> {
    let mut config = StratumConfig::load(args.config.as_deref())?;
    config.apply_overrides(&ConfigOverrides {
        export_root: args.out_dir.clone(),
        workers: args.workers,
        conversion_timeout_secs: args.timeout_secs,
        rasterizer: args.rasterizer.clone(),
        transcoder: args.transcoder.clone(),
        default_quality: None,
        log_level,
    });
    config.validate().context("validate configuration")?;
    init_tracing(config.level_filter()?)?;

    if args.engine == Engine::External {
        for program in [&config.rasterizer, &config.transcoder] {
            if !is_program_available(program) {
                tracing::warn!(program = %program.display(), "converter program is not available");
            }
        }
    }

    let design = read_design(&args.design)?;
    let design_id = design.id;
    let designs = Arc::new(InMemoryDesignStore::new());
    designs.insert(design)?;

    let controller: Arc<ExportController> = Arc::new(config.build_controller(
        designs,
        args.engine,
        Some(asset_root(&args.design)),
    )?);
    let pool = WorkerPool::spawn(Arc::clone(&controller), config.workers)?;

    let animation = (args.duration_ms.is_some() || args.fps.is_some()).then(|| {
        let defaults = AnimationSettings::default();
        AnimationSettings {
            duration_ms: args.duration_ms.unwrap_or(defaults.duration_ms),
            fps: args.fps.unwrap_or(defaults.fps),
            loop_playback: defaults.loop_playback,
        }
    });
    let request = ExportRequest {
        quality: args.quality,
        width: args.width,
        height: args.height,
        scale: args.scale,
        transparent: args.transparent,
        background_color: args.background_color,
        animation,
        ..ExportRequest::new(design_id, args.format)
    };
    let id = controller.submit(request)?;

    // rasterize and transcode steps are each bounded by the conversion timeout
    let budget = config.conversion_timeout() * 2 + Duration::from_secs(30);
    let view = controller.wait(id, budget)?;
    pool.shutdown()?;

    println!("{}", serde_json::to_string_pretty(&view)?);
    match view.status {
        JobStatus::Completed => {
            let artifact = view
                .artifact
                .context("completed job has no artifact metadata")?;
            eprintln!(
                "exported {} ({} bytes)",
                artifact.path.display(),
                artifact.size_bytes
            );
            Ok(())
        }
        status => {
            let reason = view
                .error
                .map(|e| format!("{}: {}", e.code, e.message))
                .unwrap_or_else(|| "no error recorded".to_string());
            anyhow::bail!("export {id} ended {status}: {reason}")
        }
    }
}
