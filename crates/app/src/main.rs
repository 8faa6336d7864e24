use std::{
    cell::RefCell,
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    rc::Rc,
};

use clap::{Parser, Subcommand};
use music_pulse_core::{
    AppConfig, AudioEngine, Decoder, FeatureConsumer, FeatureSummary, ManualClock, OfflineOutput,
    RenderGraph, Tick, WavDecoder,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn main() -> music_pulse_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyse {
            input,
            fps,
            start,
            config,
            output,
        } => run_analyse(&input, fps, start, config.as_deref(), output.as_deref()),
        Commands::Info { input } => run_info(&input),
    }
}

fn run_analyse(
    input: &Path,
    fps: u32,
    start: f64,
    config: Option<&Path>,
    output: Option<&Path>,
) -> music_pulse_core::Result<()> {
    tracing::info!(?input, fps, start, "analysing track");

    let config = match config {
        Some(path) => AppConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => AppConfig::default(),
    };

    let clock = ManualClock::new();
    let device = OfflineOutput::new(clock.clone(), config.analyser.clone())?;
    let mut engine = AudioEngine::new(device, clock.clone(), &config)?;
    engine.load(&std::fs::read(input)?, &WavDecoder)?;
    let duration = engine.duration().unwrap_or_default();

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    let stats = Rc::new(RefCell::new(RunStats::default()));
    let mut graph = RenderGraph::new();
    graph.register(NdjsonWriter::new(sink));
    let collector = Rc::clone(&stats);
    graph.register_fn(move |tick| {
        collector.borrow_mut().record(tick);
        Ok(())
    });

    let start = engine.play(start)?;
    let frame = 1.0 / f64::from(fps);
    // Headroom past the end so a late completion is still observed.
    let max_ticks = ((duration - start + 1.0) * f64::from(fps)).ceil() as u64;

    for _ in 0..max_ticks {
        clock.advance(frame);
        let tick = engine.tick();
        graph.dispatch(&tick)?;
        if !engine.is_playing() {
            break;
        }
    }
    drop(graph);

    let stats = stats.borrow();
    tracing::info!(
        ticks = stats.ticks,
        beats = stats.beats,
        peak_volume = stats.peak_volume,
        mean_volume = stats.mean_volume(),
        "analysis finished"
    );
    Ok(())
}

fn run_info(input: &Path) -> music_pulse_core::Result<()> {
    let buffer = WavDecoder.decode(&std::fs::read(input)?)?;
    let info = TrackInfo {
        sample_rate: buffer.sample_rate(),
        channels: buffer.channels(),
        frames: buffer.frames(),
        duration_seconds: buffer.duration_seconds(),
    };
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Debug, Serialize)]
struct TrackInfo {
    sample_rate: u32,
    channels: u16,
    frames: usize,
    duration_seconds: f64,
}

/// One NDJSON line per tick.
#[derive(Debug, Serialize)]
struct FrameLine {
    tick: u64,
    offset_seconds: Option<f64>,
    elapsed_ms: f64,
    #[serde(flatten)]
    features: FeatureSummary,
}

struct NdjsonWriter {
    writer: Box<dyn Write>,
    ticks: u64,
}

impl NdjsonWriter {
    fn new(writer: Box<dyn Write>) -> Self {
        Self { writer, ticks: 0 }
    }
}

impl FeatureConsumer for NdjsonWriter {
    fn consume(&mut self, tick: &Tick<'_>) -> music_pulse_core::Result<()> {
        let line = FrameLine {
            tick: self.ticks,
            offset_seconds: tick.offset_seconds,
            elapsed_ms: tick.elapsed_ms,
            features: tick.features.summary(),
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        self.ticks += 1;
        Ok(())
    }
}

impl Drop for NdjsonWriter {
    fn drop(&mut self) {
        if let Err(err) = self.writer.flush() {
            tracing::warn!(%err, "failed to flush feature output");
        }
    }
}

#[derive(Debug, Default)]
struct RunStats {
    ticks: u64,
    beats: u64,
    peak_volume: f32,
    volume_sum: f64,
}

impl RunStats {
    fn record(&mut self, tick: &Tick<'_>) {
        self.ticks += 1;
        if tick.features.is_beat {
            self.beats += 1;
        }
        self.peak_volume = self.peak_volume.max(tick.features.volume);
        self.volume_sum += f64::from(tick.features.volume);
    }

    fn mean_volume(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            self.volume_sum / self.ticks as f64
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Playback-synchronised audio feature extraction",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Simulate playback of a WAV file and stream per-tick features as NDJSON.
    Analyse {
        /// Path to the WAV file to analyse.
        input: PathBuf,
        /// Simulated display refresh rate.
        #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..=1000))]
        fps: u32,
        /// Offset in seconds to start playback from.
        #[arg(long, default_value_t = 0.0)]
        start: f64,
        /// Optional JSON engine configuration.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write NDJSON here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the decoded buffer's metadata.
    Info {
        /// Path to the WAV file to inspect.
        input: PathBuf,
    },
}
