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
use std::sync::Arc;
use std::time::Duration;

use super::error::SampleSourceError;
use super::traits::SampleSource;

/// A sample source that plays interleaved samples held in memory. The data is shared, so any
/// number of sources can be cut from one loaded sample without copying.
pub struct MemorySampleSource {
    /// Interleaved sample storage.
    samples: Arc<Vec<f32>>,
    /// Current position in frames.
    current_frame: usize,
    channel_count: u16,
    sample_rate: u32,
    /// When true the source wraps to the first frame instead of finishing.
    looping: bool,
    /// Number of times the source has wrapped.
    loops_completed: u64,
}

impl MemorySampleSource {
    /// Creates a one-shot source from owned interleaved samples.
    pub fn new(interleaved_samples: Vec<f32>, channel_count: u16, sample_rate: u32) -> Self {
        Self::from_shared(Arc::new(interleaved_samples), channel_count, sample_rate, false)
    }

    /// Creates a source over shared interleaved samples.
    pub fn from_shared(
        samples: Arc<Vec<f32>>,
        channel_count: u16,
        sample_rate: u32,
        looping: bool,
    ) -> Self {
        Self {
            samples,
            current_frame: 0,
            channel_count,
            sample_rate,
            looping,
            loops_completed: 0,
        }
    }

    /// Returns the total number of frames
    fn total_frames(&self) -> usize {
        if self.channel_count == 0 {
            return 0;
        }
        self.samples.len() / self.channel_count as usize
    }

    /// Returns how many times a looping source has wrapped around.
    pub fn loops_completed(&self) -> u64 {
        self.loops_completed
    }
}

impl SampleSource for MemorySampleSource {
    fn next_frame(&mut self, frame: &mut [f32]) -> Result<bool, SampleSourceError> {
        let num_channels = self.channel_count as usize;
        if frame.len() != num_channels {
            return Err(SampleSourceError::SampleConversionFailed(format!(
                "frame has {} channels, expected {}",
                frame.len(),
                num_channels
            )));
        }

        let total_frames = self.total_frames();
        if total_frames == 0 {
            return Ok(false);
        }

        if self.current_frame >= total_frames {
            if !self.looping {
                return Ok(false);
            }
            self.current_frame = 0;
            self.loops_completed += 1;
        }

        let start = self.current_frame * num_channels;
        frame.copy_from_slice(&self.samples[start..start + num_channels]);
        self.current_frame += 1;
        Ok(true)
    }

    fn channel_count(&self) -> u16 {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn duration(&self) -> Option<Duration> {
        if self.looping {
            return None;
        }
        let duration_secs = self.total_frames() as f64 / self.sample_rate as f64;
        Some(Duration::from_secs_f64(duration_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(source: &mut MemorySampleSource, frames: usize) -> Vec<f32> {
        let mut out = Vec::new();
        let mut frame = vec![0.0; source.channel_count() as usize];
        for _ in 0..frames {
            if !source.next_frame(&mut frame).unwrap() {
                break;
            }
            out.extend_from_slice(&frame);
        }
        out
    }

    #[test]
    fn test_one_shot_finishes() {
        let mut source = MemorySampleSource::new(vec![0.1, 0.2, 0.3, 0.4], 2, 44100);
        assert_eq!(drain(&mut source, 10), vec![0.1, 0.2, 0.3, 0.4]);

        let mut frame = [0.0; 2];
        assert!(!source.next_frame(&mut frame).unwrap());
        assert_eq!(source.duration(), Some(Duration::from_secs_f64(2.0 / 44100.0)));
    }

    #[test]
    fn test_looping_wraps() {
        let mut source =
            MemorySampleSource::from_shared(Arc::new(vec![0.5, -0.5, 0.25]), 1, 44100, true);
        assert_eq!(drain(&mut source, 7), vec![0.5, -0.5, 0.25, 0.5, -0.5, 0.25, 0.5]);
        assert_eq!(source.loops_completed(), 2);
        assert_eq!(source.duration(), None);
    }

    #[test]
    fn test_empty_looping_source_finishes() {
        let mut source = MemorySampleSource::from_shared(Arc::new(Vec::new()), 1, 44100, true);
        let mut frame = [0.0; 1];
        assert!(!source.next_frame(&mut frame).unwrap());
    }

    #[test]
    fn test_wrong_frame_size() {
        let mut source = MemorySampleSource::new(vec![0.1, 0.2], 2, 44100);
        let mut frame = [0.0; 1];
        assert!(source.next_frame(&mut frame).is_err());
    }
}
