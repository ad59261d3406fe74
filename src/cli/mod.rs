//! Command-line interface for the spin pipeline.

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use crate::analysis::{PeriodEstimate, Signal};
use crate::config::{ConfigError, RansacConfig, RateMethod};
use crate::core::frame::{frames_from_parts, Frame, PointCloud};
use crate::core::{loaders, writers};
use crate::pipeline::{estimate_rate, Pipeline};
use crate::processors::FrameReducer;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "spin-pipeline")]
#[command(about = "Rotation rate and size from timestamped depth scans", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Extrema,
    Orientation,
}

impl From<MethodArg> for RateMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Extrema => RateMethod::Extrema,
            MethodArg::Orientation => RateMethod::Orientation,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate RPM and dimensions from a directory of frames
    Analyze {
        /// Directory containing one point cloud file per frame
        frames_dir: PathBuf,
        /// CSV with one timestamp per frame
        timestamps: PathBuf,
        /// Multiplier converting timestamp values to seconds
        #[arg(long, default_value_t = 1.0)]
        timestamp_scale: f64,
        /// Frame file extension (ply or csv)
        #[arg(long, default_value = "ply")]
        extension: String,
        /// Output directory for frames.csv and report.yaml
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Reduce frames in parallel
        #[arg(long)]
        parallel: bool,
        /// Rate estimation method
        #[arg(long, value_enum)]
        method: Option<MethodArg>,
        /// Write each cleaned cluster as PLY under <output_dir>/clusters
        #[arg(long)]
        dump_clusters: bool,
    },

    /// Clean a single frame and report its indicators
    Reduce {
        /// Input PLY or CSV frame
        frame: PathBuf,
        /// Write the cleaned cluster to this PLY file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Estimate RPM from a recorded indicator signal (timestamp,value CSV)
    Rpm {
        /// Signal CSV file
        signal: PathBuf,
        /// Multiplier converting timestamp values to seconds
        #[arg(long, default_value_t = 1.0)]
        timestamp_scale: f64,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Output YAML path
        #[arg(default_value = "spin-pipeline.yaml")]
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Create a progress bar over `len` frames
fn create_progress(len: usize, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("=> "),
    );
    pb.set_message(message.to_string());
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        println!("║ {:<20}: {:<39} ║", key, truncate_display(value, 39));
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

/// Shorten `value` to at most `width` characters, ending in "..." when cut.
fn truncate_display(value: &str, width: usize) -> String {
    if value.chars().count() > width {
        let kept: String = value.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        value.to_string()
    }
}

fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    error!("{}: {}", context, err);
    std::process::exit(1);
}

fn format_triplet(v: [f64; 3]) -> String {
    format!("{:.2} x {:.2} x {:.2}", v[0], v[1], v[2])
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) if e.downcast_ref::<ConfigError>().is_some() => {
                fail(&format!("Invalid config {}", path.display()), format!("{:#}", e));
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {:#}, using defaults",
                    path.display(),
                    e
                );
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::Analyze {
            frames_dir,
            timestamps,
            timestamp_scale,
            extension,
            output_dir,
            parallel,
            method,
            dump_clusters,
        } => {
            let mut config = config;
            config.parallel |= parallel;
            if let Some(method) = method {
                config.rate.method = method.into();
            }
            cmd_analyze(
                &frames_dir,
                &timestamps,
                timestamp_scale,
                &extension,
                output_dir,
                dump_clusters,
                config,
            );
        }
        Commands::Reduce { frame, output } => {
            cmd_reduce(&frame, output, &config);
        }
        Commands::Rpm {
            signal,
            timestamp_scale,
        } => {
            cmd_rpm(&signal, timestamp_scale, &config);
        }
        Commands::InitConfig { path } => {
            cmd_init_config(&path, &config);
        }
    }
}

fn load_frames(frames_dir: &Path, extension: &str, timestamps: &[f64]) -> Vec<Frame> {
    let files = loaders::list_frame_files(frames_dir, extension)
        .unwrap_or_else(|e| fail("Failed to list frames", e));

    let pb = create_progress(files.len(), "Loading frames");
    let clouds: Vec<PointCloud> = files
        .par_iter()
        .map(|path| {
            let cloud = loaders::load_frame(path);
            pb.inc(1);
            cloud.map_err(|e| format!("{}: {}", path.display(), e))
        })
        .collect::<Result<_, _>>()
        .unwrap_or_else(|e| fail("Failed to load frame", e));
    pb.finish_and_clear();

    frames_from_parts(clouds, timestamps).unwrap_or_else(|e| fail("Invalid session", e))
}

fn cmd_analyze(
    frames_dir: &Path,
    timestamps_path: &Path,
    timestamp_scale: f64,
    extension: &str,
    output_dir: Option<PathBuf>,
    dump_clusters: bool,
    mut config: PipelineConfig,
) {
    let start = Instant::now();

    if config.rate.method == RateMethod::Orientation && config.reducer.normal.is_none() {
        info!("Orientation method requested; enabling surface normal fitting");
        config.reducer.normal = Some(RansacConfig::default());
    }

    println!("Analyzing session...");
    println!("Frames directory: {}", frames_dir.display());
    println!("Timestamps: {}", timestamps_path.display());

    let timestamps = loaders::load_timestamps_csv(timestamps_path, timestamp_scale)
        .unwrap_or_else(|e| fail("Failed to load timestamps", e));
    let frames = load_frames(frames_dir, extension, &timestamps);

    let pipeline = Pipeline::new(config).unwrap_or_else(|e| fail("Invalid config", e));
    let cancel = AtomicBool::new(false);

    let pb = create_progress(frames.len(), "Reducing frames");
    let reductions = pipeline
        .reduce_frames(&frames, &cancel, &|| pb.inc(1))
        .unwrap_or_else(|e| fail("Frame reduction failed", e));
    pb.finish_and_clear();

    let spinner = create_spinner("Estimating rotation rate...");
    let report = match pipeline.analyze(&reductions, &timestamps) {
        Ok(report) => report,
        Err(e) => {
            spinner.finish_and_clear();
            fail("Analysis failed", e);
        }
    };
    spinner.finish_and_clear();

    let mut written = Vec::new();
    if let Some(dir) = &output_dir {
        let frames_csv = dir.join("frames.csv");
        writers::write_frames_csv(&frames_csv, &report.frame_rows())
            .unwrap_or_else(|e| fail("Failed to write frames CSV", e));
        written.push(frames_csv);

        let report_yaml = dir.join("report.yaml");
        writers::write_report_yaml(&report_yaml, &report)
            .unwrap_or_else(|e| fail("Failed to write report", e));
        written.push(report_yaml);

        if dump_clusters {
            for reduction in reductions.iter().filter(|r| r.valid) {
                let path = dir
                    .join("clusters")
                    .join(format!("cluster_{:05}.ply", reduction.index));
                writers::write_ply(&path, &reduction.cluster.points)
                    .unwrap_or_else(|e| fail("Failed to write cluster", e));
            }
            written.push(dir.join("clusters"));
        }
    } else if dump_clusters {
        warn!("--dump-clusters needs --output-dir; skipping cluster export");
    }

    let period = match &report.period {
        Some(PeriodEstimate::HalfPeriod { seconds, .. }) => format!("{:.4} s", seconds),
        Some(PeriodEstimate::Idle) => "idle".to_string(),
        None => "n/a".to_string(),
    };
    let outputs: Vec<String> = written.iter().map(|p| p.display().to_string()).collect();

    print_summary(
        "Analysis Complete",
        &[
            ("Frames", report.audit.frames.to_string()),
            ("Valid frames", report.audit.valid_frames.to_string()),
            ("Half period", period),
            ("RPM", format!("{:.2}", report.rpm.rpm)),
            ("Method", format!("{:?}", report.rpm.method)),
            ("Mean depth", format!("{:.3}", report.mean_depth)),
            ("Dimensions", format_triplet(report.dimensions.dimensions)),
            ("Outputs", outputs.join(", ")),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_reduce(frame_path: &Path, output: Option<PathBuf>, config: &PipelineConfig) {
    let start = Instant::now();

    let spinner = create_spinner("Loading frame...");
    let cloud = match loaders::load_frame(frame_path) {
        Ok(cloud) => cloud,
        Err(e) => {
            spinner.finish_and_clear();
            fail("Failed to load frame", e);
        }
    };

    spinner.set_message("Reducing frame...");
    let reducer = FrameReducer::new(config.reducer.clone()).unwrap_or_else(|e| {
        spinner.finish_and_clear();
        fail("Invalid config", e);
    });
    let reduction = reducer.reduce(&Frame::new(0, 0.0, cloud));
    spinner.finish_and_clear();

    if let Some(path) = &output {
        writers::write_ply(path, &reduction.cluster.points)
            .unwrap_or_else(|e| fail("Failed to write cluster", e));
    }

    let removed: Vec<String> = reduction
        .counts
        .removed()
        .iter()
        .map(|(stage, n)| format!("{:?}={}", stage, n))
        .collect();

    print_summary(
        "Frame Reduction Complete",
        &[
            ("Input file", frame_path.display().to_string()),
            ("Input points", reduction.counts.input.to_string()),
            ("Cluster points", reduction.cluster.points.len().to_string()),
            (
                "Valid",
                match reduction.failed_stage {
                    Some(stage) => format!("no (emptied at {:?})", stage),
                    None => "yes".to_string(),
                },
            ),
            ("Extents", format_triplet(reduction.extents.map(f64::from))),
            ("Area", format!("{:.5}", reduction.area)),
            ("Depth", format!("{:.4}", reduction.depth)),
            ("Removed", removed.join(" ")),
            (
                "Output PLY",
                output.map_or("-".to_string(), |p| p.display().to_string()),
            ),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_rpm(signal_path: &Path, timestamp_scale: f64, config: &PipelineConfig) {
    let start = Instant::now();

    let (timestamps, values) = loaders::load_signal_csv(signal_path, timestamp_scale)
        .unwrap_or_else(|e| fail("Failed to load signal", e));
    let signal = Signal::from_samples(timestamps, values)
        .unwrap_or_else(|e| fail("Invalid signal", e));

    let analysis = estimate_rate(&signal, config).unwrap_or_else(|e| fail("Rate estimation failed", e));

    let (period, marks) = match &analysis.period.estimate {
        PeriodEstimate::HalfPeriod {
            seconds,
            sample_count,
        } => (format!("{:.4} s", seconds), sample_count.to_string()),
        PeriodEstimate::Idle => ("idle".to_string(), "0".to_string()),
    };

    print_summary(
        "Rate Estimation Complete",
        &[
            ("Signal", signal_path.display().to_string()),
            ("Samples", signal.len().to_string()),
            ("Half period", period),
            ("Intervals used", marks),
            ("Excluded kinds", format!("{:?}", analysis.period.excluded)),
            ("RPM", format!("{:.2}", analysis.rpm.rpm)),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_init_config(path: &Path, config: &PipelineConfig) {
    match config.to_yaml(path) {
        Ok(()) => println!("Wrote configuration to {}", path.display()),
        Err(e) => fail("Failed to write config", format!("{:#}", e)),
    }
}
