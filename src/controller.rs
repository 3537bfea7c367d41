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
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, warn, Instrument, Level};

use crate::samples::{EngineEvent, SamplePlayerEngine, SamplePlayerError};

pub mod keyboard;

/// Controller events that will trigger behavior in the engine.
#[derive(Debug, PartialEq)]
pub enum Event {
    /// Loads the file at the path under the name.
    Load { name: String, path: PathBuf },

    /// Plays the named sample, optionally looping.
    Play { name: String, looping: bool },

    /// Stops the named sample.
    Stop { name: String },

    /// Unloads the named sample.
    Unload { name: String },

    /// Switches to the speaker output when true, the default output otherwise.
    Route { speaker: bool },

    /// Logs the loaded samples.
    List,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Drives a sample player engine from a driver's events.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(
        engine: SamplePlayerEngine,
        driver: Arc<dyn Driver>,
    ) -> Result<Controller, Box<dyn Error>> {
        let span = span!(Level::INFO, "controller");
        Ok(Controller {
            handle: tokio::spawn(Controller::trigger_events(engine, driver).instrument(span)),
        })
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Dispatches driver events to the engine and logs engine events until the driver closes.
    async fn trigger_events(engine: SamplePlayerEngine, driver: Arc<dyn Driver>) {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);
        let mut engine_events = engine.subscribe();

        info!(
            samples = engine.loaded_samples().len(),
            route = %engine.output_route(),
            "Controller started."
        );

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    info!(event = format!("{:?}", event), "Received event.");
                    if let Err(e) = Controller::dispatch(&engine, event).await {
                        error!("Error talking to engine: {}", e);
                    }
                }
                engine_event = engine_events.recv() => match engine_event {
                    Ok(engine_event) => log_engine_event(&engine_event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Controller missed engine events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        info!("Controller closing.");
        if let Err(e) = join_handle.await {
            error!("Error waiting for event monitor to stop: {}", e);
        }
    }

    async fn dispatch(engine: &SamplePlayerEngine, event: Event) -> Result<(), SamplePlayerError> {
        match event {
            Event::Load { name, path } => engine.load(&name, &path).await,
            Event::Play { name, looping } => engine.play(&name, looping).await,
            Event::Stop { name } => engine.stop(&name).await,
            Event::Unload { name } => engine.unload(&name).await,
            Event::Route { speaker } => {
                engine.set_output_route(speaker);
                Ok(())
            }
            Event::List => {
                for name in engine.loaded_samples() {
                    if let Some(sample) = engine.sample_info(&name) {
                        info!(
                            sample = sample.name,
                            path = %sample.path.display(),
                            channels = sample.channels,
                            duration_ms = sample.duration.as_millis(),
                            playing = sample.playing,
                            looping = sample.looping,
                            "Loaded sample."
                        );
                    }
                }
                info!(
                    route = %engine.output_route(),
                    memory_kb = engine.memory_usage() / 1024,
                    "Engine status."
                );
                Ok(())
            }
        }
    }
}

fn log_engine_event(event: &EngineEvent) {
    match event {
        EngineEvent::Error(err) => error!(kind = %err.kind, reason = err.reason, "Engine error"),
        EngineEvent::RouteChanged(route) => info!(route = %route, "Output route changed."),
        EngineEvent::SampleFinished { name } => info!(sample = name, "Sample finished."),
    }
}

#[cfg(test)]
mod test {
    use std::{
        error::Error,
        io,
        sync::{Arc, Mutex},
    };

    use tokio::{sync::mpsc::Sender, task::JoinHandle};

    use crate::{
        audio::{mock, OutputRoute},
        samples::{EngineSettings, SamplePlayerEngine},
        testutil::write_wav,
    };

    use super::{Driver, Event};

    /// Sends a fixed script of events, then closes.
    struct TestDriver {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl TestDriver {
        fn new(events: Vec<Event>) -> TestDriver {
            TestDriver {
                events: Arc::new(Mutex::new(events)),
            }
        }
    }

    impl Driver for TestDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let events: Vec<Event> = self
                .events
                .lock()
                .expect("failed to get lock")
                .drain(..)
                .collect();
            tokio::task::spawn_blocking(move || {
                for event in events {
                    assert!(events_tx.blocking_send(event).is_ok());
                }
                Ok(())
            })
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller() -> Result<(), Box<dyn Error>> {
        let tempdir = tempfile::tempdir()?;
        let bell = tempdir.path().join("bell.wav");
        let gong = tempdir.path().join("gong.wav");
        write_wav(&bell, 1, 44100, &[4096; 4410])?;
        write_wav(&gong, 2, 44100, &[4096; 8820])?;

        let device = Arc::new(mock::Device::get("mock-device"));
        let engine = SamplePlayerEngine::create(device.clone(), EngineSettings::default())?;

        let driver = Arc::new(TestDriver::new(vec![
            Event::Load {
                name: "bell".to_string(),
                path: bell,
            },
            Event::Load {
                name: "gong".to_string(),
                path: gong,
            },
            Event::Load {
                name: "missing".to_string(),
                path: tempdir.path().join("missing.wav"),
            },
            Event::Play {
                name: "bell".to_string(),
                looping: true,
            },
            Event::Play {
                name: "gong".to_string(),
                looping: false,
            },
            Event::Stop {
                name: "gong".to_string(),
            },
            Event::Route { speaker: true },
            Event::Unload {
                name: "gong".to_string(),
            },
            Event::List,
        ]));
        let mut controller = super::Controller::new(engine.clone(), driver)?;
        assert!(
            controller.join().await.is_ok(),
            "Error waiting for controller",
        );

        assert_eq!(engine.loaded_samples(), vec!["bell".to_string()]);
        assert!(engine.is_playing("bell"));
        assert_eq!(engine.output_route(), OutputRoute::Speaker);
        assert_eq!(
            device.route_history(),
            vec![OutputRoute::Default, OutputRoute::Speaker]
        );

        Ok(())
    }
}
