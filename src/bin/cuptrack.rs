//! cuptrack: run the cup and object trackers over frame directories, pull
//! frames out of a sequence, or record a region of one.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use image::RgbImage;
use tracing::{error, info};

use cuptrack_rs::AppConfig;
use cuptrack_rs::extract::{self, ExtractionMode, FrameExtractor, ImageFormat};
use cuptrack_rs::integration::{
    ColorCupDetector, ContourCupDetector, DetectionSource, FlowCupPipeline, FramePipeline,
    FrameSource, HeadlessDisplay, ImageDirSink, ImageDirSinkFactory, ImageSequence, InputEvent,
    ReplayDetector, SessionStats, TrackerPipeline, VideoReader, run_session,
};
use cuptrack_rs::recorder::ScreenRecorder;
use cuptrack_rs::region::Region;
use cuptrack_rs::tracker::IdentityPolicy;

#[derive(Parser, Debug)]
#[command(author, version, about = "Shell-game cup and object tracking", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log per-frame detail
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Track three cups in a directory of frames and predict the marked one
    TrackCups {
        frames: PathBuf,

        #[arg(long, value_enum, default_value_t = CupMode::Contour)]
        mode: CupMode,

        /// Cup detector [default: edges in contour mode, color in flow mode]
        #[arg(long, value_enum)]
        detector: Option<CupDetector>,

        /// Slot to mark after the first frame
        #[arg(long)]
        mark: Option<u64>,

        /// Directory for annotated frames
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, default_value_t = 30.0)]
        fps: f64,
    },
    /// Replay recorded detections over a directory of frames
    TrackObjects {
        frames: PathBuf,

        /// JSON-lines detection log, one array per frame
        #[arg(long)]
        detections: PathBuf,

        /// Mark whatever is under this point after the first frame
        #[arg(long, value_parser = parse_point)]
        mark_at: Option<(f32, f32)>,

        #[arg(long, value_enum, default_value_t = IdSource::Passthrough)]
        tracker: IdSource,

        /// Confidence threshold
        #[arg(long)]
        conf: Option<f32>,

        /// NMS IoU threshold
        #[arg(long)]
        iou: Option<f32>,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, default_value_t = 30.0)]
        fps: f64,
    },
    /// Save selected frames as numbered images
    Extract {
        video: PathBuf,

        /// Output directory [default: ./<video stem>_frames]
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, default_value = "png")]
        format: String,

        #[arg(short, long, default_value = "frame")]
        prefix: String,

        #[arg(long, default_value_t = 0)]
        start: usize,

        #[arg(long)]
        end: Option<usize>,

        #[arg(long, default_value_t = 1)]
        step: usize,

        #[arg(long)]
        max: Option<usize>,

        /// Explicit frame indices
        #[arg(long, num_args = 1.., conflicts_with_all = ["start", "end", "step", "max"])]
        frames: Vec<usize>,
    },
    /// Record a region of a frame source, starting with the first frame
    Record {
        source: PathBuf,

        /// Output path [default: screen_recording_<timestamp>.mp4]
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        fps: Option<u32>,

        /// Region to record as TOP,LEFT,WIDTH,HEIGHT [default: whole frame]
        #[arg(long, value_parser = parse_region)]
        region: Option<Region>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum CupMode {
    /// Re-detect every frame
    Contour,
    /// Re-detect periodically, follow with optical flow in between
    Flow,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum CupDetector {
    /// Canny edges and outer contours
    Edges,
    /// HSV threshold and morphology
    Color,
}

impl CupMode {
    fn default_detector(self) -> CupDetector {
        match self {
            CupMode::Contour => CupDetector::Edges,
            CupMode::Flow => CupDetector::Color,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum IdSource {
    /// Use the ids recorded in the log
    Passthrough,
    /// Ignore recorded ids and associate boxes by overlap
    Iou,
}

fn parse_point(s: &str) -> std::result::Result<(f32, f32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got {:?}", s))?;
    let x = x.trim().parse::<f32>().map_err(|e| e.to_string())?;
    let y = y.trim().parse::<f32>().map_err(|e| e.to_string())?;
    Ok((x, y))
}

fn parse_region(s: &str) -> std::result::Result<Region, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [top, left, width, height] = parts.as_slice() else {
        return Err(format!("expected TOP,LEFT,WIDTH,HEIGHT, got {:?}", s));
    };
    let top = top.parse::<i32>().map_err(|e| e.to_string())?;
    let left = left.parse::<i32>().map_err(|e| e.to_string())?;
    let width = width.parse::<u32>().map_err(|e| e.to_string())?;
    let height = height.parse::<u32>().map_err(|e| e.to_string())?;
    if width == 0 || height == 0 {
        return Err("region must have a non-zero size".to_string());
    }
    Ok(Region::new(top, left, width, height))
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.verbose {
        "cuptrack=debug,cuptrack_rs=debug"
    } else {
        "cuptrack=info,cuptrack_rs=info"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AppConfig::default(),
    };

    match args.command {
        Command::TrackCups {
            frames,
            mode,
            detector,
            mark,
            output,
            fps,
        } => {
            let mut source = ImageSequence::open(&frames, fps)
                .with_context(|| format!("cannot open frames in {}", frames.display()))?;
            let mut display = headless_display(output)?;
            if let Some(slot) = mark {
                display.schedule(1, InputEvent::MarkSlot(slot));
            }

            let detector = detector.unwrap_or_else(|| mode.default_detector());
            info!(?mode, ?detector, "tracking cups");
            let stats = match detector {
                CupDetector::Edges => {
                    let slots = config.detector.slots;
                    let detector = ContourCupDetector::new(config.detector.clone());
                    track_cups(detector, slots, mode, &config, &mut source, &mut display)?
                }
                CupDetector::Color => {
                    let slots = config.color.slots;
                    let detector = ColorCupDetector::new(config.color.clone());
                    track_cups(detector, slots, mode, &config, &mut source, &mut display)?
                }
            };
            report(&stats, display)
        }
        Command::TrackObjects {
            frames,
            detections,
            mark_at,
            tracker,
            conf,
            iou,
            output,
            fps,
        } => {
            let mut filter = config.objects.clone();
            if let Some(conf) = conf {
                filter.confidence = conf;
            }
            if let Some(iou) = iou {
                filter.iou = iou;
            }
            filter.validate()?;

            let mut source = ImageSequence::open(&frames, fps)
                .with_context(|| format!("cannot open frames in {}", frames.display()))?;
            let mut detector = ReplayDetector::load(&detections, filter)
                .with_context(|| format!("cannot read detections from {}", detections.display()))?;
            if tracker == IdSource::Iou {
                detector = detector.without_ids();
            }

            let mut display = headless_display(output)?;
            if let Some((x, y)) = mark_at {
                display.schedule(1, InputEvent::Click { x, y });
            }

            let mut pipeline = TrackerPipeline::new(
                detector,
                IdentityPolicy::persistent(config.associator.clone()),
                config.tracker.clone(),
            );
            let stats = run_session(&mut source, &mut pipeline, &mut display)?;
            if pipeline.tracker().marked_id().is_none() && mark_at.is_some() {
                info!("nothing was under the mark point");
            }
            report(&stats, display)
        }
        Command::Extract {
            video,
            output,
            format,
            prefix,
            start,
            end,
            step,
            max,
            frames,
        } => {
            let format: ImageFormat = format.parse()?;
            let mut reader = ImageSequence::open(&video, 30.0)
                .with_context(|| format!("cannot open {}", video.display()))?;
            let output = output.unwrap_or_else(|| extract::default_output_dir(&video));
            let mode = if frames.is_empty() {
                ExtractionMode::Range {
                    start,
                    end,
                    step,
                    max,
                }
            } else {
                ExtractionMode::Frames(frames)
            };

            let summary = FrameExtractor::new(output)
                .with_format(format)
                .with_prefix(prefix)
                .extract(&mut reader, &mode)?;
            info!(
                written = summary.written,
                dir = %summary.output_dir.display(),
                "done"
            );
            Ok(())
        }
        Command::Record {
            source,
            output,
            fps,
            region,
        } => {
            let mut recorder_config = config.recorder.clone();
            if output.is_some() {
                recorder_config.output = output;
            }
            if let Some(fps) = fps {
                recorder_config.fps = fps;
            }

            let mut frames = ImageSequence::open(&source, recorder_config.fps as f64)
                .with_context(|| format!("cannot open {}", source.display()))?;
            let (width, height) = frames.dimensions();
            let monitor = Region::new(0, 0, width, height);
            let region = region.unwrap_or(monitor);

            let mut capture = CroppedSequence {
                frames: &mut frames,
                monitor,
                region,
            };
            let mut recorder = ScreenRecorder::new(recorder_config, region, ImageDirSinkFactory)?;
            let mut display: HeadlessDisplay<ImageDirSink> = HeadlessDisplay::new(None);
            recorder.start()?;

            match recorder.run(&mut capture, &mut display)? {
                Some(summary) => info!(
                    frames = summary.frames,
                    seconds = summary.duration.as_secs_f64(),
                    path = %summary.path.display(),
                    "recording saved"
                ),
                None => info!("nothing recorded"),
            }
            Ok(())
        }
    }
}

fn track_cups<D: DetectionSource>(
    detector: D,
    slots: usize,
    mode: CupMode,
    config: &AppConfig,
    source: &mut ImageSequence,
    display: &mut HeadlessDisplay<ImageDirSink>,
) -> Result<SessionStats> {
    let stats = match mode {
        CupMode::Contour => {
            let policy = IdentityPolicy::positional(slots);
            let mut pipeline = TrackerPipeline::new(detector, policy, config.tracker.clone());
            run_session(source, &mut pipeline, display)?
        }
        CupMode::Flow => {
            let tracker = config.tracker.clone();
            let mut pipeline = FlowCupPipeline::new(detector, slots, &config.flow, tracker);
            run_session(source, &mut pipeline, display)?
        }
    };
    Ok(stats)
}

/// Frames of a sequence cut down to the recorded region.
struct CroppedSequence<'a> {
    frames: &'a mut ImageSequence,
    monitor: Region,
    region: Region,
}

impl FrameSource for CroppedSequence<'_> {
    fn next_frame(&mut self) -> cuptrack_rs::Result<Option<RgbImage>> {
        match self.frames.next_frame()? {
            Some(frame) => self.region.crop_from(&frame, &self.monitor).map(Some),
            None => Ok(None),
        }
    }
}

fn headless_display(output: Option<PathBuf>) -> Result<HeadlessDisplay<ImageDirSink>> {
    let sink = output
        .map(|dir| {
            ImageDirSink::create(&dir)
                .with_context(|| format!("cannot create output directory {}", dir.display()))
        })
        .transpose()?;
    Ok(HeadlessDisplay::new(sink))
}

fn report(stats: &SessionStats, display: HeadlessDisplay<ImageDirSink>) -> Result<()> {
    if let Some(status) = display.last_status() {
        info!("{}", status);
    }
    display.finish()?;

    match &stats.final_prediction {
        Some(prediction) => info!(
            id = %prediction.id,
            x = prediction.bbox.x,
            y = prediction.bbox.y,
            width = prediction.bbox.width,
            height = prediction.bbox.height,
            frames = stats.frames,
            skipped = stats.skipped,
            "final prediction"
        ),
        None => info!(frames = stats.frames, skipped = stats.skipped, "no prediction"),
    }
    Ok(())
}
