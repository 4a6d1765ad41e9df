//! virtual-mic-relay: line-delimited JSON host for the virtual microphone
//! engine.
//!
//! Reads one `EngineCommand` per stdin line and writes one envelope per
//! stdout line (events, load results, progress). Logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use virtual_mic_core::{
    CommandOutcome, DecodeOutcome, EngineCommand, EngineConfig, EngineEvent, Severity, VirtualMicEngine,
};
use virtual_mic_cpal::{list_input_devices, CpalMicProvider, SpeakerMonitor};

mod envelope;

use envelope::Envelope;

/// Command-line arguments for virtual-mic-relay
#[derive(Parser, Debug)]
#[command(name = "virtual-mic-relay")]
#[command(about = "Virtual microphone engine driven by JSON lines on stdin")]
#[command(version)]
struct Args {
    /// JSON file with engine settings; defaults apply when omitted
    #[arg(short, long, env = "VIRTUAL_MIC_CONFIG")]
    config: Option<PathBuf>,

    /// Play the virtual stream through the default output device
    #[arg(short, long)]
    monitor: bool,

    /// Input device used when injection is off (default: system microphone)
    #[arg(long)]
    passthrough_device: Option<String>,

    /// Print input devices as JSON and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args = Args::parse();

    if args.list_devices {
        let devices = list_input_devices().context("Failed to list input devices")?;
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    let config = load_config(args.config.as_deref())?;
    let provider = match &args.passthrough_device {
        Some(name) => CpalMicProvider::with_device(name.clone()),
        None => CpalMicProvider::default_device(),
    };

    let mut engine =
        VirtualMicEngine::new(config, Box::new(provider)).context("Failed to initialize engine")?;
    let (_, events) = engine.subscribe_channel();

    let _monitor = if args.monitor {
        let stream = engine.virtual_stream().context("Failed to create virtual stream")?;
        Some(SpeakerMonitor::start(stream).context("Failed to start speaker monitor")?)
    } else {
        None
    };

    info!("relay ready");
    run(&mut engine, &events).await?;

    engine.deactivate_injection();
    engine.stop();
    let mut stdout = tokio::io::stdout();
    flush_events(&events, &mut stdout).await?;
    info!("relay shutdown complete");
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: EngineConfig = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Main loop until stdin closes.
async fn run(engine: &mut VirtualMicEngine, events: &Receiver<EngineEvent>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<DecodeOutcome>();
    let mut poll = tokio::time::interval(engine.config().progress_poll_interval());
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    debug!("stdin closed");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<EngineCommand>(line) {
                    Ok(command) => {
                        if let CommandOutcome::LoadPending(job) = engine.handle(command) {
                            let done_tx = done_tx.clone();
                            tokio::task::spawn_blocking(move || {
                                let _ = done_tx.send(job.run());
                            });
                        }
                    }
                    Err(e) => {
                        warn!("rejected command line: {}", e);
                        engine.bus().log(format!("Invalid command: {}", e), Severity::Error);
                    }
                }
            }
            Some(outcome) = done_rx.recv() => {
                let name = outcome.name.clone();
                let loaded = engine.finish_load(outcome);
                flush_events(events, &mut stdout).await?;
                let envelope = Envelope::LoadResult { load_result: loaded, name: name.as_deref() };
                write_line(&mut stdout, &envelope).await?;
            }
            _ = poll.tick() => {
                let was_playing = engine.state().is_playing();
                let progress = engine.tick();
                if was_playing {
                    write_line(&mut stdout, &Envelope::progress(progress, engine.state())).await?;
                }
            }
        }
        flush_events(events, &mut stdout).await?;
    }
    Ok(())
}

async fn flush_events(events: &Receiver<EngineEvent>, stdout: &mut tokio::io::Stdout) -> Result<()> {
    while let Ok(event) = events.try_recv() {
        write_line(stdout, &Envelope::event(&event)).await?;
    }
    Ok(())
}

async fn write_line(stdout: &mut tokio::io::Stdout, envelope: &Envelope<'_>) -> Result<()> {
    let line = envelope.to_line().context("Failed to encode envelope")?;
    stdout.write_all(line.as_bytes()).await.context("Failed to write stdout")?;
    stdout.flush().await.context("Failed to flush stdout")?;
    Ok(())
}
