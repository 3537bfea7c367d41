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

//! Voices: one playing instance of a loaded sample.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::playsync::CancelHandle;

/// Represents an active voice playing a sample.
pub struct Voice {
    /// The audio source ID in the mixer.
    source_id: u64,
    /// Whether the voice wraps around at the end of the sample.
    looping: bool,
    /// Cancel handle for stopping this voice without lock contention.
    cancel_handle: CancelHandle,
    /// Set by the mixer once the source has played to its end.
    finished: Arc<AtomicBool>,
}

impl Voice {
    /// Creates a new voice.
    pub fn new(
        source_id: u64,
        looping: bool,
        cancel_handle: CancelHandle,
        finished: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source_id,
            looping,
            cancel_handle,
            finished,
        }
    }

    pub fn source_id(&self) -> u64 {
        self.source_id
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Returns true while the voice is still sounding.
    pub fn is_active(&self) -> bool {
        !self.cancel_handle.is_cancelled() && !self.finished.load(Ordering::Relaxed)
    }

    /// Stops the voice. The mixer drops its source on the next block. Returns true if the
    /// voice was still sounding.
    pub fn stop(&self) -> bool {
        let was_active = self.is_active();
        self.cancel_handle.cancel();
        was_active
    }
}
