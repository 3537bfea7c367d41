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
use std::io;
use std::path::PathBuf;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;

const LOAD: &str = "load";
const PLAY: &str = "play";
const STOP: &str = "stop";
const UNLOAD: &str = "unload";
const ROUTE: &str = "route";
const LIST: &str = "list";

const LOOP: &str = "loop";
const SPEAKER: &str = "speaker";
const DEFAULT: &str = "default";

/// A controller that drives the engine from lines typed on stdin.
#[derive(Default)]
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Turns one line of input into an event. Returns None for anything unrecognized.
    fn parse(input: &str) -> Option<Event> {
        let mut words = input.split_whitespace();
        let command = words.next()?.to_lowercase();
        let args: Vec<&str> = words.collect();

        match (command.as_str(), args.as_slice()) {
            (LOAD, [name, path @ ..]) if !path.is_empty() => Some(Event::Load {
                name: name.to_string(),
                // Paths may contain spaces.
                path: PathBuf::from(path.join(" ")),
            }),
            (PLAY, [name]) => Some(Event::Play {
                name: name.to_string(),
                looping: false,
            }),
            (PLAY, [name, mode]) if mode.eq_ignore_ascii_case(LOOP) => Some(Event::Play {
                name: name.to_string(),
                looping: true,
            }),
            (STOP, [name]) => Some(Event::Stop {
                name: name.to_string(),
            }),
            (UNLOAD, [name]) => Some(Event::Unload {
                name: name.to_string(),
            }),
            (ROUTE, [route]) if route.eq_ignore_ascii_case(SPEAKER) => {
                Some(Event::Route { speaker: true })
            }
            (ROUTE, [route]) if route.eq_ignore_ascii_case(DEFAULT) => {
                Some(Event::Route { speaker: false })
            }
            (LIST, []) => Some(Event::List),
            _ => None,
        }
    }

    /// Reads and dispatches one line. Returns false once the input is exhausted.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({} <name> <path>, {} <name> [{}], {} <name>, {} <name>, {} {}|{}, {}): ",
            LOAD, PLAY, LOOP, STOP, UNLOAD, ROUTE, SPEAKER, DEFAULT, LIST,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }
        if input.trim().is_empty() {
            return Ok(true);
        }

        match Self::parse(&input) {
            Some(event) => events_tx
                .blocking_send(event)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
            None => warn!(input = input.trim(), "Unrecognized input"),
        }
        Ok(true)
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}

            info!("Keyboard input closed.");
            Ok(())
        })
    }
}
