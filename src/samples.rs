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

//! Named sample playback.
//!
//! This module provides:
//! - Sample loading (decoded fully into memory at the output rate)
//! - A registry of named samples with async load/play/stop/unload
//! - Voice management, one voice per sample
//! - Output routing and an engine-wide event stream

mod engine;
mod error;
mod events;
mod loader;
mod settings;
mod voice;

pub use engine::{SampleInfo, SamplePlayerEngine};
pub use error::{ErrorKind, SamplePlayerError};
pub use events::{EngineError, EngineEvent};
pub use loader::{LoadedSample, SampleLoader};
pub use settings::{EngineSettings, ReloadPolicy, MAX_EVENT_CAPACITY};
