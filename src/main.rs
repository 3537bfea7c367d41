// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use sampleplayer::controller::{keyboard, Controller};
use sampleplayer::samples::{EngineEvent, EngineSettings, SamplePlayerEngine};
use sampleplayer::{audio, config};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// The name a sample is registered under by the play subcommand.
const PLAY_SAMPLE_NAME: &str = "sample";

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A named-sample audio player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Plays a single audio file through the audio interface.
    Play {
        /// The device name to play through.
        device_name: String,
        /// The path to the audio file.
        file: PathBuf,
        /// Loop the file. Requires --duration.
        #[arg(short, long = "loop", requires = "duration")]
        looping: bool,
        /// Start on the speaker output.
        #[arg(short, long)]
        speaker: bool,
        /// The device used for the speaker output. Defaults to the playback device.
        #[arg(long)]
        speaker_device: Option<String>,
        /// How long to play before stopping, e.g. 10s or 1m30s.
        #[arg(short, long)]
        duration: Option<String>,
    },
    /// Start will load the configured samples and read commands from stdin.
    Start {
        /// The path to the player config.
        player_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            device_name,
            file,
            looping,
            speaker,
            speaker_device,
            duration,
        } => {
            let mut audio_config = config::Audio::new(&device_name);
            if let Some(speaker_device) = speaker_device {
                audio_config = audio_config.with_speaker_device(&speaker_device);
            }
            let duration: Option<Duration> = match duration {
                Some(duration) => Some(DurationString::from_string(duration)?.into()),
                None => None,
            };

            let device = audio::get_device(&audio_config)?;
            let engine = SamplePlayerEngine::create(
                device,
                EngineSettings {
                    speaker_output: speaker,
                    ..Default::default()
                },
            )?;
            let mut events = engine.subscribe();
            engine.load(PLAY_SAMPLE_NAME, &file).await?;
            engine.play(PLAY_SAMPLE_NAME, looping).await?;

            match duration {
                Some(duration) => {
                    if tokio::time::timeout(duration, wait_for_finish(&mut events))
                        .await
                        .is_err()
                    {
                        engine.stop(PLAY_SAMPLE_NAME).await?;
                    }
                }
                None => wait_for_finish(&mut events).await,
            }
        }
        Commands::Start { player_path } => {
            let engine = config::init_engine(&player_path).await?;
            let mut controller = Controller::new(engine, Arc::new(keyboard::Driver::new()))?;
            controller.join().await?;
        }
    }

    Ok(())
}

/// Waits until the played sample finishes or the engine goes away.
async fn wait_for_finish(events: &mut broadcast::Receiver<EngineEvent>) {
    loop {
        match events.recv().await {
            Ok(EngineEvent::SampleFinished { .. }) => return,
            Ok(EngineEvent::Error(err)) => eprintln!("Error: {}", err),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
