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
use serde::Deserialize;

/// Default number of events a subscriber may lag behind before it starts missing them.
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Largest event channel capacity an engine will allocate.
pub const MAX_EVENT_CAPACITY: usize = 1 << 16;

/// What `load` does when the name is already taken.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReloadPolicy {
    /// Stop the old sample, then replace it.
    #[default]
    Replace,
    /// Fail with AlreadyLoaded.
    Reject,
}

/// Settings for a SamplePlayerEngine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Start on the speaker route.
    pub speaker_output: bool,
    pub reload_policy: ReloadPolicy,
    /// Capacity of the event broadcast channel, clamped to 1..=MAX_EVENT_CAPACITY.
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            speaker_output: false,
            reload_policy: ReloadPolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineSettings {
    /// The event channel capacity actually used.
    pub fn clamped_event_capacity(&self) -> usize {
        self.event_capacity.clamp(1, MAX_EVENT_CAPACITY)
    }
}
