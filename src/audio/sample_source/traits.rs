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
use std::time::Duration;

use super::error::SampleSourceError;

/// A source of audio samples read one interleaved frame at a time.
pub trait SampleSource: Send + Sync {
    /// Writes the next frame into `frame`, one sample per channel.
    /// Returns Ok(false) once the source is exhausted; `frame` is left untouched in that case.
    ///
    /// `frame` must have exactly channel_count() elements.
    fn next_frame(&mut self, frame: &mut [f32]) -> Result<bool, SampleSourceError>;

    /// Get the number of channels in this source
    fn channel_count(&self) -> u16;

    /// Get the sample rate of this source
    fn sample_rate(&self) -> u32;

    /// Get the duration of this source (if known)
    /// Returns None if the duration is unknown or infinite
    fn duration(&self) -> Option<Duration>;
}

/// Blanket implementation for Box<dyn SampleSource>
impl SampleSource for Box<dyn SampleSource> {
    fn next_frame(&mut self, frame: &mut [f32]) -> Result<bool, SampleSourceError> {
        (**self).next_frame(frame)
    }

    fn channel_count(&self) -> u16 {
        (**self).channel_count()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn duration(&self) -> Option<Duration> {
        (**self).duration()
    }
}
