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
// Core audio mixing logic shared by the cpal backend and the mock device.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::audio::sample_source::SampleSource;
use crate::audio::{Notification, Notifier};
use crate::playsync::CancelHandle;

/// Sums active sources into interleaved output blocks.
#[derive(Clone)]
pub struct AudioMixer {
    /// Active audio sources currently playing
    active_sources: Arc<Mutex<Vec<ActiveSource>>>,
    /// Number of output channels
    num_channels: u16,
    /// Sample rate
    sample_rate: u32,
    /// Where finished source IDs are reported.
    notifier: Arc<Mutex<Option<Notifier>>>,
}

/// Represents an active audio source in the mixer
pub struct ActiveSource {
    /// Unique ID for this source
    pub id: u64,
    /// The sample source, already at the mixer's sample rate
    pub source: Box<dyn SampleSource>,
    /// Precomputed channel mappings: source_channel_index -> Vec<output_channel_index>
    pub channel_mappings: Vec<Vec<usize>>,
    /// Scratch space for one source frame
    frame_buffer: Vec<f32>,
    /// Whether this source has finished playing
    pub is_finished: Arc<AtomicBool>,
    /// Cancel handle for this source
    pub cancel_handle: CancelHandle,
}

impl ActiveSource {
    pub fn new(id: u64, source: Box<dyn SampleSource>, cancel_handle: CancelHandle) -> Self {
        Self {
            id,
            source,
            channel_mappings: Vec::new(),
            frame_buffer: Vec::new(),
            is_finished: Arc::new(AtomicBool::new(false)),
            cancel_handle,
        }
    }
}

impl AudioMixer {
    /// Creates a new audio mixer
    pub fn new(num_channels: u16, sample_rate: u32) -> Self {
        Self {
            active_sources: Arc::new(Mutex::new(Vec::new())),
            num_channels,
            sample_rate,
            notifier: Arc::new(Mutex::new(None)),
        }
    }

    /// Sets where finished sources are reported.
    pub fn set_notifier(&self, notifier: Notifier) {
        *self.notifier.lock() = Some(notifier);
    }

    /// Mono sources feed the first two outputs. Otherwise source channel n feeds output n and
    /// channels beyond the output count are dropped.
    fn precompute_channel_mappings(
        source_channel_count: usize,
        num_channels: usize,
    ) -> Vec<Vec<usize>> {
        if source_channel_count == 1 {
            return vec![(0..num_channels.min(2)).collect()];
        }

        (0..source_channel_count)
            .map(|source_channel| {
                if source_channel < num_channels {
                    vec![source_channel]
                } else {
                    Vec::new()
                }
            })
            .collect()
    }

    /// Adds a new audio source to the mixer
    pub fn add_source(&self, mut source: ActiveSource) {
        let source_channels = source.source.channel_count() as usize;
        source.channel_mappings =
            Self::precompute_channel_mappings(source_channels, self.num_channels as usize);
        source.frame_buffer = vec![0.0; source_channels];

        self.active_sources.lock().push(source);
    }

    /// Cancels and drops every active source.
    pub fn stop_all(&self) {
        let mut sources = self.active_sources.lock();
        for source in sources.iter() {
            source.cancel_handle.cancel();
        }
        sources.clear();
    }

    /// The number of sources still sounding.
    pub fn active_count(&self) -> usize {
        self.active_sources.lock().len()
    }

    /// Mixes as many frames as fit into `output`, which is interleaved with num_channels
    /// samples per frame. Cancelled sources are dropped silently. Sources that run out or fail
    /// are flagged and reported through the notifier.
    pub fn process_into(&self, output: &mut [f32]) {
        output.fill(0.0);
        let num_channels = self.num_channels as usize;
        if num_channels == 0 {
            return;
        }
        let num_frames = output.len() / num_channels;

        let mut reports = Vec::new();
        {
            let mut sources = self.active_sources.lock();
            sources.retain_mut(|active_source| {
                if active_source.cancel_handle.is_cancelled() {
                    return false;
                }
                if active_source.is_finished.load(Ordering::Relaxed) {
                    return false;
                }

                for frame_index in 0..num_frames {
                    match active_source
                        .source
                        .next_frame(&mut active_source.frame_buffer)
                    {
                        Ok(true) => {}
                        Ok(false) => {
                            active_source.is_finished.store(true, Ordering::Relaxed);
                            reports.push(Notification::Finished(active_source.id));
                            return false;
                        }
                        Err(e) => {
                            warn!(
                                source_id = active_source.id,
                                err = %e,
                                "Dropping failed source"
                            );
                            active_source.is_finished.store(true, Ordering::Relaxed);
                            reports.push(Notification::Failed(active_source.id, e.to_string()));
                            return false;
                        }
                    }

                    let out_frame =
                        &mut output[frame_index * num_channels..(frame_index + 1) * num_channels];
                    for (sample, outputs) in active_source
                        .frame_buffer
                        .iter()
                        .zip(active_source.channel_mappings.iter())
                    {
                        for &output_index in outputs {
                            out_frame[output_index] += sample;
                        }
                    }
                }
                true
            });
        }

        if reports.is_empty() {
            return;
        }
        if let Some(notifier) = self.notifier.lock().as_ref() {
            for report in reports {
                let _ = notifier.try_send(report);
            }
        }
    }

    /// Processes multiple frames of audio mixing
    pub fn process_frames(&self, num_frames: usize) -> Vec<f32> {
        let mut frames = vec![0.0f32; num_frames * self.num_channels as usize];
        self.process_into(&mut frames);
        frames
    }

    /// Gets the number of output channels
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audio::sample_source::{MemorySampleSource, SampleSourceError};

    fn create_test_source(id: u64, samples: Vec<f32>, channel_count: u16) -> ActiveSource {
        ActiveSource::new(
            id,
            Box::new(MemorySampleSource::new(samples, channel_count, 44100)),
            CancelHandle::new(),
        )
    }

    #[test]
    fn test_mono_feeds_first_two_outputs() {
        let mixer = AudioMixer::new(4, 44100);
        mixer.add_source(create_test_source(1, vec![0.5, 0.75], 1));

        let frames = mixer.process_frames(2);
        assert_eq!(frames, vec![0.5, 0.5, 0.0, 0.0, 0.75, 0.75, 0.0, 0.0]);
    }

    #[test]
    fn test_multiple_source_mixing() {
        let mixer = AudioMixer::new(2, 44100);
        mixer.add_source(create_test_source(1, vec![0.5, 0.25], 2));
        mixer.add_source(create_test_source(2, vec![0.25, 0.125], 2));

        let frames = mixer.process_frames(1);
        assert_eq!(frames, vec![0.75, 0.375]);
    }

    #[test]
    fn test_extra_source_channels_dropped() {
        let mixer = AudioMixer::new(2, 44100);
        mixer.add_source(create_test_source(1, vec![0.5, 0.25, 1.0, 1.0], 4));

        let frames = mixer.process_frames(1);
        assert_eq!(frames, vec![0.5, 0.25]);
    }

    #[test]
    fn test_finished_source_reported() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mixer = AudioMixer::new(2, 44100);
        mixer.set_notifier(tx);

        let source = create_test_source(7, vec![0.5, 0.5], 2);
        let is_finished = source.is_finished.clone();
        mixer.add_source(source);

        let frames = mixer.process_frames(3);
        assert_eq!(frames, vec![0.5, 0.5, 0.0, 0.0, 0.0, 0.0]);
        assert!(is_finished.load(Ordering::Relaxed));
        assert_eq!(mixer.active_count(), 0);
        assert_eq!(rx.try_recv().unwrap(), Notification::Finished(7));
    }

    struct BrokenSource {
        frames_left: usize,
    }

    impl SampleSource for BrokenSource {
        fn next_frame(&mut self, frame: &mut [f32]) -> Result<bool, SampleSourceError> {
            if self.frames_left == 0 {
                return Err(SampleSourceError::SampleConversionFailed(
                    "corrupt packet".to_string(),
                ));
            }
            self.frames_left -= 1;
            frame.fill(0.5);
            Ok(true)
        }

        fn channel_count(&self) -> u16 {
            2
        }

        fn sample_rate(&self) -> u32 {
            44100
        }

        fn duration(&self) -> Option<Duration> {
            None
        }
    }

    #[test]
    fn test_failed_source_reported() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mixer = AudioMixer::new(2, 44100);
        mixer.set_notifier(tx);

        let source = ActiveSource::new(
            9,
            Box::new(BrokenSource { frames_left: 1 }),
            CancelHandle::new(),
        );
        let is_finished = source.is_finished.clone();
        mixer.add_source(source);

        let frames = mixer.process_frames(3);
        assert_eq!(frames, vec![0.5, 0.5, 0.0, 0.0, 0.0, 0.0]);
        assert!(is_finished.load(Ordering::Relaxed));
        assert_eq!(mixer.active_count(), 0);
        match rx.try_recv().unwrap() {
            Notification::Failed(id, reason) => {
                assert_eq!(id, 9);
                assert!(reason.contains("corrupt packet"));
            }
            other => panic!("expected a failure report, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cancelled_source_not_reported() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mixer = AudioMixer::new(2, 44100);
        mixer.set_notifier(tx);

        let source = create_test_source(3, vec![0.5; 20], 2);
        let cancel_handle = source.cancel_handle.clone();
        mixer.add_source(source);
        mixer.process_frames(2);

        cancel_handle.cancel();
        let frames = mixer.process_frames(2);
        assert!(frames.iter().all(|sample| *sample == 0.0));
        assert_eq!(mixer.active_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_all() {
        let mixer = AudioMixer::new(2, 44100);
        let source = create_test_source(1, vec![0.5; 20], 2);
        let cancel_handle = source.cancel_handle.clone();
        mixer.add_source(source);
        mixer.add_source(create_test_source(2, vec![0.5; 20], 2));

        mixer.stop_all();
        assert_eq!(mixer.active_count(), 0);
        assert!(cancel_handle.is_cancelled());
    }
}
