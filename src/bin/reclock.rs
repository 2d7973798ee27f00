use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

use reclock::{
    CaptureOpts, DEFAULT_EXTRA_SECONDS, EncoderPreset, FfmpegSink, FfmpegSinkOpts, FrameFormat,
    FrameSink, Fps, JobStatus, ProgressObserver, ProgressSnapshot, ReclockError, Resolution,
    SceneJob, SyntheticDriver, SyntheticDriverOpts, discover_scenes, is_ffmpeg_on_path, run_jobs,
};

#[derive(Parser, Debug)]
#[command(name = "reclock", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record scene files to MP4 videos (requires `ffmpeg` on PATH).
    Record(RecordArgs),
}

#[derive(Parser, Debug)]
struct RecordArgs {
    /// Directory containing scene files (`NN-name.html`).
    #[arg(long)]
    scenes: PathBuf,

    /// Output directory for videos (defaults to the scenes directory).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Capture frame rate.
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Viewport width in pixels.
    #[arg(long, default_value_t = 1920)]
    width: u32,
    /// Viewport height in pixels.
    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// Capture quality tier.
    #[arg(long, value_enum, default_value_t = Quality::Final)]
    quality: Quality,

    /// Shorthand for `--quality draft --parallel 3`.
    #[arg(long, default_value_t = false)]
    fast: bool,

    /// Number of parallel recording sessions, clamped to the scene count.
    /// Defaults to 1, or 3 with `--fast`; an explicit value always wins.
    #[arg(long)]
    parallel: Option<usize>,

    /// Only record scenes whose name contains this substring.
    #[arg(long)]
    scene: Option<String>,

    /// Write a JSON run report to this path.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Rendering backend.
    #[arg(long, value_enum, default_value_t = DriverChoice::Synthetic)]
    driver: DriverChoice,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Quality {
    /// JPEG frames, fast x264 preset.
    Draft,
    /// Lossless PNG frames, slow x264 preset.
    Final,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DriverChoice {
    /// Built-in deterministic renderer.
    Synthetic,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Record(args) => cmd_record(args),
    }
}

/// Prints one line per snapshot; coarse but safe from any worker thread.
struct LineProgress;

impl ProgressObserver for LineProgress {
    fn update(&self, snap: &ProgressSnapshot) {
        if snap.total_frames > 0 && snap.frame_index > 0 {
            eprintln!(
                "[{}] {}/{} frames ({:.0}%)",
                snap.scene_id, snap.frame_index, snap.total_frames, snap.percent
            );
        } else {
            eprintln!("[{}] {:?}", snap.scene_id, snap.phase);
        }
    }

    fn finish(&self, snap: &ProgressSnapshot) {
        eprintln!(
            "[{}] {:?} in {:.1}s",
            snap.scene_id,
            snap.phase,
            snap.elapsed_ms as f64 / 1000.0
        );
    }
}

fn cmd_record(args: RecordArgs) -> anyhow::Result<()> {
    let quality = if args.fast { Quality::Draft } else { args.quality };
    let parallel = effective_parallelism(args.fast, args.parallel);
    let format = match quality {
        Quality::Draft => FrameFormat::Jpeg,
        Quality::Final => FrameFormat::Png,
    };
    let preset = match quality {
        Quality::Draft => EncoderPreset::Draft,
        Quality::Final => EncoderPreset::Final,
    };

    if !is_ffmpeg_on_path() {
        anyhow::bail!(
            "ffmpeg is required for MP4 encoding, but was not found on PATH \
             (install it, e.g. `apt install ffmpeg` or `brew install ffmpeg`)"
        );
    }
    if args.width == 0 || args.height == 0 || args.width % 2 != 0 || args.height % 2 != 0 {
        anyhow::bail!(
            "width and height must be non-zero and even for yuv420p mp4 output (got {}x{})",
            args.width,
            args.height
        );
    }

    let fps = Fps::new(args.fps, 1)?;
    let jobs = discover_scenes(&args.scenes, args.scene.as_deref(), fps, DEFAULT_EXTRA_SECONDS)?;
    if jobs.is_empty() {
        anyhow::bail!(
            "no scene files found in '{}' (expected names like 01-intro.html{})",
            args.scenes.display(),
            match &args.scene {
                Some(filter) => format!(", filter '{filter}'"),
                None => String::new(),
            }
        );
    }
    let out_dir = args.out.clone().unwrap_or_else(|| args.scenes.clone());
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create output dir '{}'", out_dir.display()))?;

    eprintln!(
        "recording {} scene(s) at {} fps, {} session(s)",
        jobs.len(),
        args.fps,
        reclock::clamp_worker_count(parallel, jobs.len())
    );

    let resolution = Resolution {
        width: args.width,
        height: args.height,
    };
    let opts = CaptureOpts {
        fps,
        format,
        resolution,
        ..CaptureOpts::default()
    };
    let driver_opts = SyntheticDriverOpts {
        resolution,
        format,
        jpeg_quality: 90,
    };

    let make_driver = move |_worker: usize| -> reclock::ReclockResult<Box<dyn reclock::RendererDriver>> {
        match args.driver {
            DriverChoice::Synthetic => Ok(Box::new(SyntheticDriver::new(driver_opts.clone()))),
        }
    };
    let make_sink = {
        let out_dir = out_dir.clone();
        move |job: &SceneJob| -> reclock::ReclockResult<(Box<dyn FrameSink>, PathBuf)> {
            let artifact = out_dir.join(format!("{}.mp4", job.id));
            let mut sink_opts = FfmpegSinkOpts::new(&artifact);
            sink_opts.preset = preset;
            Ok((Box::new(FfmpegSink::new(sink_opts)), artifact))
        }
    };

    let report = run_jobs(jobs, &opts, parallel, &make_driver, &make_sink, &LineProgress)?;

    for job in &report.reports {
        match job.status {
            JobStatus::Done => eprintln!(
                "  ok   {} ({:.1}s video, {:.1}s wall)",
                job.scene_id, job.duration_seconds, job.wall_seconds
            ),
            _ => eprintln!(
                "  FAIL {} ({})",
                job.scene_id,
                job.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    eprintln!(
        "{} scene(s), {:.1}s of video, {:.1}s wall",
        report.reports.len(),
        report.total_video_seconds,
        report.wall_seconds
    );

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("write report '{}'", path.display()))?;
        eprintln!("wrote report {}", path.display());
    }

    let failed = report.failed_count();
    if failed > 0 {
        return Err(ReclockError::driver(format!("{failed} scene(s) failed")).into());
    }
    Ok(())
}

/// `--fast` only supplies the default; an explicit `--parallel` always wins.
fn effective_parallelism(fast: bool, parallel: Option<usize>) -> usize {
    parallel.unwrap_or(if fast { 3 } else { 1 })
}
