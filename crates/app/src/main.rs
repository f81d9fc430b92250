use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dmx_controller_core::{
    sequence, AppConfig, AudioInput, ChannelCommand, DmxController, DmxTransport, EffectKind,
    NullTransport, SerialTransport,
};
use tracing_subscriber::EnvFilter;

fn main() -> dmx_controller_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    let transport: Box<dyn DmxTransport> = if cli.dry_run {
        tracing::info!("dry run, frames are discarded");
        Box::new(NullTransport::default())
    } else {
        Box::new(SerialTransport::new(&config.dmx))
    };

    let controller = DmxController::start(&config, transport, audio_input())?;
    let hold = cli
        .seconds
        .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok());
    let result = run_command(&controller, cli.command, hold);
    controller.shutdown();
    result
}

fn run_command(
    controller: &DmxController,
    command: Commands,
    hold: Option<Duration>,
) -> dmx_controller_core::Result<()> {
    let fixtures = controller.fixtures().to_vec();
    let programs = controller.programs();

    match command {
        Commands::Effect { kind, speed } => {
            if let Some(speed) = speed {
                programs.set_speed(speed);
            }
            programs.start_effect(kind, fixtures)?;
            wait(hold);
        }
        Commands::Sequence { file } => {
            let steps = sequence::load_steps_or_empty(&file);
            if steps.is_empty() {
                tracing::warn!(file = %file.display(), "nothing to play");
                return Ok(());
            }
            let total = sequence::total_duration(&steps);
            programs.start_sequence(steps, fixtures)?;
            // Timing out early is fine; shutdown stops the sequence.
            programs.wait_idle(hold.unwrap_or(total.saturating_add(Duration::from_secs(1))));
        }
        Commands::Audio => {
            programs.start_audio(fixtures)?;
            match hold {
                Some(hold) => {
                    programs.wait_idle(hold);
                }
                None => while !programs.wait_idle(Duration::from_secs(3600)) {},
            }
            if let Some(error) = programs.last_error() {
                return Err(dmx_controller_core::DmxError::audio(error));
            }
        }
        Commands::Scene { file } => {
            load_scene(controller, &file);
            wait(hold);
        }
        Commands::Set { channel, value } => {
            controller.apply_remote(ChannelCommand::new(channel, value));
            wait(hold);
        }
        Commands::Blackout => {
            controller.blackout();
            wait(hold.or(Some(Duration::from_millis(100))));
        }
    }

    Ok(())
}

fn load_scene(controller: &DmxController, file: &Path) {
    tracing::info!(file = %file.display(), "loading scene");
    controller.load_scene(file);
}

/// Keeps the process (and therefore the transmitter) alive.
fn wait(hold: Option<Duration>) {
    match hold {
        Some(duration) => std::thread::sleep(duration),
        None => loop {
            std::thread::park();
        },
    }
}

#[cfg(feature = "cpal")]
fn audio_input() -> Arc<dyn AudioInput> {
    Arc::new(dmx_controller_core::CpalInput)
}

#[cfg(not(feature = "cpal"))]
fn audio_input() -> Arc<dyn AudioInput> {
    Arc::new(dmx_controller_core::UnavailableInput)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

fn parse_effect(value: &str) -> Result<EffectKind, String> {
    value.parse().map_err(|err: dmx_controller_core::DmxError| err.to_string())
}

#[derive(Parser, Debug)]
#[command(author, version, about = "DMX512 moving-head controller", long_about = None)]
struct Cli {
    /// JSON configuration file. Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Discard frames instead of writing to the serial port.
    #[arg(long, global = true)]
    dry_run: bool,
    /// How long to keep running before shutting down.
    #[arg(short, long, global = true)]
    seconds: Option<f64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one effect on every patched fixture.
    Effect {
        /// color-chase, strobe or rainbow.
        #[arg(value_parser = parse_effect)]
        kind: EffectKind,
        /// Effect speed in percent (1-100).
        #[arg(long)]
        speed: Option<i32>,
    },
    /// Play a JSON sequence file to completion.
    Sequence {
        file: PathBuf,
    },
    /// Drive the fixtures from the default audio input.
    Audio,
    /// Load a saved scene and hold it.
    Scene {
        file: PathBuf,
    },
    /// Write a single 1-based channel, like a remote command.
    Set {
        channel: i32,
        value: i32,
    },
    /// Zero every patched fixture.
    Blackout,
}
