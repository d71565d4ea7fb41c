use anyhow::Result;
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use track_analyzer::analysis::SpectralAnalyzer;
use track_analyzer::pipeline::OutputMode;
use track_analyzer::watermark::BitDepth;
use track_analyzer::{AnalysisPipeline, AnalysisReport, AnalysisRequest, AnalyzerConfig};

#[derive(Parser, Debug)]
#[command(name = "track-analyzer", version)]
#[command(about = "Analyze an audio file and optionally embed a watermark", long_about = None)]
struct Args {
    /// Audio file to analyze (overwritten in place when watermarking)
    file: String,

    /// Identifier to embed as an LSB watermark
    watermark_id: Option<String>,

    /// Track ID used to name the feature matrix file (default: MD5 of FILE)
    track_id: Option<String>,

    /// Report payload besides the scalar summary
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Rows in the feature matrix
    #[arg(long)]
    frames: Option<usize>,

    /// Points in the waveform envelope
    #[arg(long)]
    points: Option<usize>,

    /// Resample decoded audio to this rate
    #[arg(long, conflicts_with = "native_rate")]
    sample_rate: Option<u32>,

    /// Analyze at the file's native sample rate
    #[arg(long)]
    native_rate: bool,

    /// Bit depth of the rewritten file (16 or 24)
    #[arg(long)]
    bit_depth: Option<u16>,

    /// Minimum BPM for tempo folding
    #[arg(long, requires = "max_bpm")]
    min_bpm: Option<f32>,

    /// Maximum BPM for tempo folding
    #[arg(long, requires = "min_bpm")]
    max_bpm: Option<f32>,

    /// Directory for feature matrix files
    #[arg(long)]
    matrix_dir: Option<String>,

    /// TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Waveform,
    Matrix,
    MatrixInline,
}

impl From<ModeArg> for OutputMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Waveform => OutputMode::Waveform,
            ModeArg::Matrix => OutputMode::MatrixFile,
            ModeArg::MatrixInline => OutputMode::MatrixInline,
        }
    }
}

fn main() {
    // --help and --version print clap's plain text and are the only runs
    // that do not emit a JSON object
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let err = anyhow::anyhow!("Invalid arguments: {}", first_line(&e.to_string()));
            println!("{}", AnalysisReport::from_error(&err).to_json());
            return;
        }
    };

    // Initialize logging (stderr, stdout carries the report)
    let log_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let report = match run(&args) {
        Ok(summary) => AnalysisReport::Success(summary),
        Err(e) => {
            log::error!("Analysis failed: {:#}", e);
            AnalysisReport::from_error(&e)
        }
    };

    println!("{}", report.to_json());
}

fn run(args: &Args) -> Result<track_analyzer::pipeline::AnalysisSummary> {
    let config = build_config(args)?;
    log::debug!("Configuration: {:?}", config);

    let analyzer = SpectralAnalyzer::new().with_bpm_range(config.min_bpm, config.max_bpm);
    let pipeline = AnalysisPipeline::new(config, analyzer)?;

    // Expand ~ in paths
    let path = PathBuf::from(shellexpand::tilde(&args.file).as_ref());
    let mut request = AnalysisRequest::new(path);
    if let Some(id) = &args.watermark_id {
        request = request.with_watermark(id.clone());
    }
    if let Some(id) = &args.track_id {
        request = request.with_track_id(id.clone());
    }

    pipeline.run(&request)
}

/// Config file (if any) with command-line overrides applied on top
fn build_config(args: &Args) -> Result<AnalyzerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let path = PathBuf::from(shellexpand::tilde(path).as_ref());
            AnalyzerConfig::from_toml_file(&path)?
        }
        None => AnalyzerConfig::new(),
    };

    if let Some(mode) = args.mode {
        config = config.with_output_mode(mode.into());
    }
    if let Some(frames) = args.frames {
        config = config.with_frames_target(frames);
    }
    if let Some(points) = args.points {
        config = config.with_waveform_points(points);
    }
    if args.native_rate {
        config = config.with_sample_rate(None);
    } else if let Some(rate) = args.sample_rate {
        config = config.with_sample_rate(Some(rate));
    }
    if let Some(bits) = args.bit_depth {
        config = config.with_bit_depth(BitDepth::try_from(bits)?);
    }
    if let (Some(min), Some(max)) = (args.min_bpm, args.max_bpm) {
        config = config.with_bpm_range(min, max);
    }
    if let Some(dir) = &args.matrix_dir {
        config = config.with_matrix_dir(PathBuf::from(shellexpand::tilde(dir).as_ref()));
    }

    Ok(config)
}

fn first_line(text: &str) -> String {
    text.lines()
        .next()
        .unwrap_or_default()
        .trim_start_matches("error: ")
        .to_string()
}
