use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "slowmo-render", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a project into a video file or an image sequence.
    Render(RenderArgs),
    /// Print the time bounds and sources of a project.
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input project JSON.
    project: PathBuf,

    /// Output start time in seconds (defaults to the first node).
    #[arg(long)]
    start: Option<f64>,

    /// Output end time in seconds (defaults to the last node).
    #[arg(long)]
    end: Option<f64>,

    /// Output frame rate (defaults to the project's render settings).
    #[arg(long)]
    fps: Option<f64>,

    /// Interpolation between source frames.
    #[arg(long, value_enum)]
    interpolation: Option<InterpolationChoice>,

    /// Output frame size.
    #[arg(long, value_enum)]
    size: Option<SizeChoice>,

    /// Output video path (requires `ffmpeg` on PATH).
    #[arg(long, conflicts_with = "images")]
    video: Option<PathBuf>,

    /// Video codec passed to ffmpeg.
    #[arg(long, default_value = "libx264")]
    codec: String,

    /// Image filename pattern; `%1` is replaced by the frame number.
    #[arg(long, requires = "dir")]
    images: Option<String>,

    /// Output directory for `--images`.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Smoothness of the v3d flow source.
    #[arg(long)]
    flow_lambda: Option<f32>,

    /// How often progress is printed.
    #[arg(long, default_value_t = 500)]
    progress_interval_ms: u64,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Input project JSON.
    project: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InterpolationChoice {
    Nearest,
    Linear,
    Flow,
}

impl From<InterpolationChoice> for slowmo::InterpolationMode {
    fn from(c: InterpolationChoice) -> Self {
        match c {
            InterpolationChoice::Nearest => Self::Nearest,
            InterpolationChoice::Linear => Self::Linear,
            InterpolationChoice::Flow => Self::Flow,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SizeChoice {
    Orig,
    Small,
}

fn main() -> anyhow::Result<()> {
    // Library notices (run description, "Rendering finished.") show by default.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,slowmo=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Info(args) => cmd_info(args),
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut renderer = slowmo::SlowmoRenderer::new();
    renderer
        .load(&args.project)
        .with_context(|| format!("load project '{}'", args.project.display()))?;

    if let Some(start) = args.start {
        renderer.set_start(start)?;
    }
    if let Some(end) = args.end {
        renderer.set_end(end)?;
    }
    if let Some(fps) = args.fps {
        renderer.set_fps(fps)?;
    }
    if let Some(mode) = args.interpolation {
        renderer.set_interpolation(mode.into())?;
    }
    if let Some(size) = args.size {
        renderer.set_size(matches!(size, SizeChoice::Orig))?;
    }
    if let Some(lambda) = args.flow_lambda
        && !renderer.set_flow_lambda(lambda)
    {
        eprintln!("--flow-lambda ignored: project has no tunable flow source");
    }

    if let Some(video) = &args.video {
        renderer.set_video_render_target(video.clone(), args.codec.clone())?;
    } else if let (Some(pattern), Some(dir)) = (&args.images, &args.dir) {
        renderer.set_images_render_target(pattern.clone(), dir.clone())?;
    }

    let mut reasons = String::new();
    if !renderer.is_complete(&mut reasons) {
        anyhow::bail!(
            "not ready to render:\n{reasons}\n(pass --video <path> or --images <pattern> --dir <dir>)"
        );
    }

    renderer.start()?;
    let interval = Duration::from_millis(args.progress_interval_ms.max(10));
    let mut last = None;
    while renderer.is_rendering() {
        std::thread::sleep(interval);
        let progress = renderer.progress();
        if last != Some(progress) {
            eprintln!("progress {progress}");
            last = Some(progress);
        }
    }

    let terminal = renderer
        .wait()
        .context("render task ended without a terminal event")?;
    eprintln!("progress {}", renderer.progress());
    match terminal.kind {
        slowmo::TerminalKind::Finished => {
            eprintln!("{}", terminal.reason);
            Ok(())
        }
        kind => anyhow::bail!("rendering {kind:?}: {}", terminal.reason),
    }
}

fn cmd_info(args: InfoArgs) -> anyhow::Result<()> {
    let (project, warnings) = slowmo::load_project(&args.project)
        .with_context(|| format!("load project '{}'", args.project.display()))?;
    for w in &warnings {
        eprintln!("warning: {w}");
    }

    let bounds = project.nodes().bounds();
    println!("nodes: {}", project.nodes().len());
    println!("time: {:.3} s .. {:.3} s", bounds.start, bounds.end);
    println!("frames: {}", project.frames().describe());
    println!(
        "flow source: {}",
        project.flow_source().map(|f| f.name()).unwrap_or("none")
    );
    let settings = project.render_settings();
    println!(
        "render: {} fps, {:?}, {}",
        settings.fps.get(),
        settings.interpolation,
        settings.size.label()
    );
    Ok(())
}
