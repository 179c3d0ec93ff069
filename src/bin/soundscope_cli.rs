use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::broadcast::error::TryRecvError;

use soundscope::analysis::features::FeatureFrame;
use soundscope::analysis::{AnalysisEvent, AnalysisPipeline, ClassificationResult};
use soundscope::config::AppConfig;
use soundscope::engine::{AudioBackend, DesktopStubBackend, EngineCapture, EngineHandle, SyntheticSignal};
use soundscope::graph::{SpectrumAnalyzer, StageRef};
use soundscope::recording::{DirectoryUploadService, RecordingSession, RecordingStage};
use soundscope::render::{ManualFrameClock, RenderLoop, SpectrogramPainter};
use soundscope::ClassificationMode;

#[derive(Parser, Debug)]
#[command(
    name = "soundscope_cli",
    about = "Offline analysis and synthetic capture harness for the soundscope core"
)]
struct Cli {
    /// Configuration file (defaults to assets/soundscope_config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug-level logging
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract features from a WAV file and classify it
    Analyze {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Include every feature frame in the report
        #[arg(long)]
        frames: bool,
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },
    /// Run the engine on a synthetic signal and print classifications as JSON lines
    Stream {
        #[arg(long, value_enum, default_value_t = SignalArg::Tone)]
        signal: SignalArg,
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,
        #[arg(long, default_value_t = 0.5)]
        amplitude: f32,
        #[arg(long, default_value_t = 200)]
        blocks: u64,
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },
    /// Render a WAV file's scrolling spectrogram to a PPM image
    Render {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Record a synthetic signal through the engine and store it as WAV
    Record {
        #[arg(long)]
        output_dir: PathBuf,
        #[arg(long, value_enum, default_value_t = SignalArg::Tone)]
        signal: SignalArg,
        #[arg(long, default_value_t = 1.0)]
        seconds: f32,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Rules,
    Vote,
}

impl From<ModeArg> for ClassificationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Rules => ClassificationMode::Rules,
            ModeArg::Vote => ClassificationMode::Vote,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SignalArg {
    Silence,
    Tone,
    Noise,
    Mixed,
}

impl SignalArg {
    fn to_signal(self, frequency: f32, amplitude: f32) -> SyntheticSignal {
        match self {
            SignalArg::Silence => SyntheticSignal::Silence,
            SignalArg::Tone => SyntheticSignal::Tone {
                frequency,
                amplitude,
            },
            SignalArg::Noise => SyntheticSignal::Noise { amplitude },
            SignalArg::Mixed => SyntheticSignal::ToneWithNoise {
                frequency,
                amplitude,
                noise: amplitude * 0.2,
            },
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    soundscope::init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Analyze {
            input,
            output,
            frames,
            mode,
        } => run_analyze(config, &input, output, frames, mode),
        Commands::Stream {
            signal,
            frequency,
            amplitude,
            blocks,
            mode,
        } => run_stream(config, signal.to_signal(frequency, amplitude), blocks, mode),
        Commands::Render { input, output } => run_render(config, &input, &output),
        Commands::Record {
            output_dir,
            signal,
            seconds,
        } => run_record(config, signal.to_signal(440.0, 0.5), &output_dir, seconds),
    }
}

/// Mono samples of a WAV file (channels averaged, integers scaled to -1..1)
fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .context("decoding float samples")?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .context("decoding integer samples")?
        }
    };

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

fn run_analyze(
    mut config: AppConfig,
    input: &Path,
    output_path: Option<PathBuf>,
    include_frames: bool,
    mode: Option<ModeArg>,
) -> Result<ExitCode> {
    let (samples, sample_rate) = read_wav(input)?;
    config.extractor.sample_rate = sample_rate;
    if let Some(mode) = mode {
        config.classifier.mode = mode.into();
    }
    let config = config.sanitized();

    let mut pipeline = AnalysisPipeline::new(&config);
    let mut frames = Vec::new();
    let mut results = Vec::new();
    for block in samples.chunks(config.audio.block_size) {
        pipeline.process(block, |event| match event {
            AnalysisEvent::Frame(frame) => frames.push(frame),
            AnalysisEvent::Classification(result) => results.push(result),
        });
    }

    let report = AnalysisReport {
        input: input.display().to_string(),
        sample_rate,
        mode: config.classifier.mode,
        frame_count: frames.len(),
        final_label: results.last().map(|r| r.label.to_string()),
        classifications: &results,
        frames: include_frames.then_some(frames.as_slice()),
    };
    let json = serde_json::to_string_pretty(&report)?;

    if let Some(path) = output_path {
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }
    Ok(ExitCode::from(0))
}

fn run_stream(
    config: AppConfig,
    signal: SyntheticSignal,
    blocks: u64,
    mode: Option<ModeArg>,
) -> Result<ExitCode> {
    let backend = Arc::new(
        DesktopStubBackend::new(
            config.extractor.sample_rate,
            config.audio.block_size,
            signal,
        )
        .with_max_blocks(blocks),
    );
    let engine = EngineHandle::with_backend(config, backend.clone())
        .context("building engine")?;
    if let Some(mode) = mode {
        engine.set_classification_mode(mode.into())?;
    }

    let mut results = engine.subscribe_classifications();
    engine.start()?;
    let drained = engine.wait_for_blocks(blocks, Duration::from_secs(60));
    engine.stop()?;
    if !drained {
        bail!(
            "engine processed only {} of {} blocks",
            backend.blocks_sent(),
            blocks
        );
    }

    loop {
        match results.try_recv() {
            Ok(result) => println!("{}", serde_json::to_string(&result)?),
            Err(TryRecvError::Lagged(missed)) => {
                tracing::warn!("{} classifications dropped by the event channel", missed);
            }
            Err(_) => break,
        }
    }
    Ok(ExitCode::from(0))
}

fn run_render(config: AppConfig, input: &Path, output: &Path) -> Result<ExitCode> {
    let (samples, _) = read_wav(input)?;
    let mut analyzer = SpectrumAnalyzer::from_config(&config.render);
    let painter = SpectrogramPainter::new(analyzer.tap(), &config.render);
    let render_loop = RenderLoop::new(ManualFrameClock::new(), painter);

    // One display frame per block
    render_loop.start();
    for block in samples.chunks(config.audio.block_size) {
        analyzer.push(block);
        analyzer.update();
        render_loop.clock().tick();
    }
    render_loop.stop();

    let ppm = render_loop.with_painter(|painter| painter.spectrogram().to_ppm());
    fs::write(output, ppm).with_context(|| format!("writing {}", output.display()))?;
    println!(
        "{} columns rendered to {}",
        render_loop.with_painter(|painter| painter.frames_painted()),
        output.display()
    );
    Ok(ExitCode::from(0))
}

fn run_record(
    config: AppConfig,
    signal: SyntheticSignal,
    output_dir: &Path,
    seconds: f32,
) -> Result<ExitCode> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let blocks = ((seconds.max(0.0) * config.extractor.sample_rate as f32)
        / config.audio.block_size as f32)
        .ceil() as u64;
    let backend = Arc::new(
        DesktopStubBackend::new(
            config.extractor.sample_rate,
            config.audio.block_size,
            signal,
        )
        .with_max_blocks(blocks),
    );
    let sample_rate = backend.sample_rate();
    let engine = Arc::new(
        EngineHandle::with_backend(config, backend).context("building engine")?,
    );

    let mut session = RecordingSession::new(EngineCapture::new(&engine), sample_rate);
    let stage: StageRef = Arc::new(Mutex::new(RecordingStage::new(session.sink())));
    engine.attach_stage(Arc::clone(&stage))?;

    session.start()?;
    if !engine.wait_for_blocks(blocks, Duration::from_secs(60)) {
        bail!("capture did not deliver {} blocks in time", blocks);
    }
    session.stop()?;
    engine.detach_stage(&stage);

    let reference = session.deliver(&DirectoryUploadService::new(output_dir, "recording"))?;
    println!("{}", reference);
    Ok(ExitCode::from(0))
}

#[derive(Serialize)]
struct AnalysisReport<'a> {
    input: String,
    sample_rate: u32,
    mode: ClassificationMode,
    frame_count: usize,
    final_label: Option<String>,
    classifications: &'a [ClassificationResult],
    #[serde(skip_serializing_if = "Option::is_none")]
    frames: Option<&'a [FeatureFrame]>,
}
