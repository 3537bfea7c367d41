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
use std::path::Path;

use tracing::info;

use crate::samples::SamplePlayerEngine;

mod audio;
mod error;
mod player;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::player::{Player, Sample};

/// Builds an engine from a player configuration file and preloads its samples. Sample files
/// are resolved relative to the directory holding the configuration.
pub async fn init_engine(path: &Path) -> Result<SamplePlayerEngine, Box<dyn Error>> {
    let player = Player::deserialize(path)?;
    let device = crate::audio::get_device(player.audio())?;
    let engine = SamplePlayerEngine::create(device, player.settings())?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    for (name, file) in player.samples(base_dir) {
        engine.load(&name, &file).await?;
        info!(sample = name, file = %file.display(), "Preloaded sample.");
    }

    Ok(engine)
}
