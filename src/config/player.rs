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
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::Deserialize;

use super::audio::Audio;
use super::error::ConfigError;
use crate::samples::{EngineSettings, ReloadPolicy, MAX_EVENT_CAPACITY};

/// The configuration for the sample player.
#[derive(Deserialize, Clone, Debug)]
pub struct Player {
    /// The audio output configuration.
    audio: Audio,
    /// Start on the speaker route instead of the default route.
    speaker_output: Option<bool>,
    /// What to do when a name is loaded twice.
    reload_policy: Option<ReloadPolicy>,
    /// How many engine events a slow subscriber may fall behind by.
    event_capacity: Option<usize>,
    /// Samples to preload on start.
    #[serde(default)]
    samples: Vec<Sample>,
}

/// A sample to preload.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Sample {
    /// The name the sample is registered under.
    pub name: String,
    /// The audio file, relative to the configuration file.
    pub file: String,
}

impl Player {
    /// Parse a player configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Player, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Player>()?)
    }

    /// The audio output configuration.
    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// Engine settings derived from this configuration.
    pub fn settings(&self) -> EngineSettings {
        let defaults = EngineSettings::default();
        EngineSettings {
            speaker_output: self.speaker_output.unwrap_or(defaults.speaker_output),
            reload_policy: self.reload_policy.unwrap_or(defaults.reload_policy),
            event_capacity: self
                .event_capacity
                .unwrap_or(defaults.event_capacity)
                .clamp(1, MAX_EVENT_CAPACITY),
        }
    }

    /// Samples to preload, with their files resolved against `base_dir`.
    pub fn samples(&self, base_dir: &Path) -> Vec<(String, PathBuf)> {
        self.samples
            .iter()
            .map(|sample| (sample.name.clone(), base_dir.join(&sample.file)))
            .collect()
    }
}
