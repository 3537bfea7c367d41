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
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::warn;

use super::error::SampleSourceError;
use super::traits::SampleSource;

/// A sample source that decodes audio files (WAV, MP3, FLAC, OGG, etc.) with symphonia and
/// yields interleaved f32 frames.
pub struct AudioSampleSource {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    is_finished: bool,
    /// Interleaved samples from the most recently decoded packet.
    sample_buffer: Vec<f32>,
    buffer_position: usize,
    channels: u16,
    sample_rate: u32,
    duration: Option<Duration>,
}

impl SampleSource for AudioSampleSource {
    fn next_frame(&mut self, frame: &mut [f32]) -> Result<bool, SampleSourceError> {
        let channels = self.channels as usize;
        if frame.len() != channels {
            return Err(SampleSourceError::SampleConversionFailed(format!(
                "frame has {} channels, expected {}",
                frame.len(),
                channels
            )));
        }

        if self.is_finished {
            return Ok(false);
        }

        if self.buffer_position + channels > self.sample_buffer.len() && !self.refill_buffer()? {
            self.is_finished = true;
            return Ok(false);
        }

        let start = self.buffer_position;
        frame.copy_from_slice(&self.sample_buffer[start..start + channels]);
        self.buffer_position += channels;
        Ok(true)
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

impl AudioSampleSource {
    /// Opens and probes the given file.
    ///
    /// Filesystem problems (missing file, directory, permissions) surface as
    /// `SampleSourceError::IoError`; anything wrong with the contents surfaces as one of the
    /// decoding variants.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SampleSourceError> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)
            .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))?;
        if metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            )
            .into());
        }
        let file = File::open(path)
            .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| SampleSourceError::Unsupported(format!("{}: {}", path.display(), e)))?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                SampleSourceError::Unsupported(format!("{}: no audio track", path.display()))
            })?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params.sample_rate.ok_or_else(|| {
            SampleSourceError::Unsupported(format!("{}: sample rate not specified", path.display()))
        })?;
        let duration = params
            .n_frames
            .map(|frames| Duration::from_secs_f64(frames as f64 / sample_rate as f64));

        let decoder = get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| SampleSourceError::Unsupported(format!("{}: {}", path.display(), e)))?;

        let mut source = Self {
            format_reader,
            decoder,
            track_id,
            is_finished: false,
            sample_buffer: Vec::new(),
            buffer_position: 0,
            channels: params.channels.map(|c| c.count() as u16).unwrap_or(0),
            sample_rate,
            duration,
        };

        // Some containers don't carry a channel layout. Decode the first packet to find it.
        if source.channels == 0 && !source.refill_buffer()? {
            return Err(SampleSourceError::Empty(path.display().to_string()));
        }

        Ok(source)
    }

    /// Reads the next packet. End of stream is reported as Ok(None).
    fn read_next_packet(
        format_reader: &mut dyn FormatReader,
    ) -> Result<Option<Packet>, SymphoniaError> {
        match format_reader.next_packet() {
            Ok(packet) => Ok(Some(packet)),
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Decodes packets until one yields audio for our track. Returns false at end of stream.
    fn refill_buffer(&mut self) -> Result<bool, SampleSourceError> {
        loop {
            let packet = match Self::read_next_packet(self.format_reader.as_mut()) {
                Ok(Some(packet)) => packet,
                Ok(None) => return Ok(false),
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(error = e, "Skipping undecodable packet");
                    continue;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let (samples, channels) = decode_buffer_to_f32(decoded);
            // Header packets (e.g. Vorbis) decode to zero frames.
            if channels == 0 || samples.is_empty() {
                continue;
            }
            if self.channels == 0 {
                self.channels = channels as u16;
            }

            self.sample_buffer = samples;
            self.buffer_position = 0;
            return Ok(true);
        }
    }
}

/// Converts a decoded AudioBufferRef to interleaved f32 samples and returns the channel count
/// observed in the decoded buffer.
fn decode_buffer_to_f32(decoded: AudioBufferRef) -> (Vec<f32>, usize) {
    match decoded {
        AudioBufferRef::F32(buf) => interleave_planar_samples(&buf, |sample| sample),
        AudioBufferRef::F64(buf) => interleave_planar_samples(&buf, |sample| sample as f32),
        AudioBufferRef::S8(buf) => interleave_planar_samples(&buf, scale_s8),
        AudioBufferRef::S16(buf) => interleave_planar_samples(&buf, scale_s16),
        AudioBufferRef::S24(buf) => {
            interleave_planar_samples(&buf, |sample| scale_s24(sample.inner()))
        }
        AudioBufferRef::S32(buf) => interleave_planar_samples(&buf, scale_s32),
        AudioBufferRef::U8(buf) => interleave_planar_samples(&buf, scale_u8),
        AudioBufferRef::U16(buf) => interleave_planar_samples(&buf, scale_u16),
        AudioBufferRef::U24(buf) => {
            interleave_planar_samples(&buf, |sample| scale_u24(sample.inner()))
        }
        AudioBufferRef::U32(buf) => interleave_planar_samples(&buf, scale_u32),
    }
}

fn interleave_planar_samples<T, F>(buf: &AudioBuffer<T>, convert: F) -> (Vec<f32>, usize)
where
    T: symphonia::core::sample::Sample,
    F: Fn(T) -> f32,
{
    let frames = buf.frames();
    let channels = buf.spec().channels.count();
    let planes = buf.planes();
    let mut samples = Vec::with_capacity(frames * channels);
    for frame_idx in 0..frames {
        for plane in planes.planes().iter().take(channels) {
            samples.push(convert(plane[frame_idx]));
        }
    }
    (samples, channels)
}

#[inline]
fn scale_s8(sample: i8) -> f32 {
    sample as f32 / (1i64 << 7) as f32
}

#[inline]
fn scale_s16(sample: i16) -> f32 {
    sample as f32 / (1i64 << 15) as f32
}

#[inline]
fn scale_s24(sample: i32) -> f32 {
    sample as f32 / (1i64 << 23) as f32
}

#[inline]
fn scale_s32(sample: i32) -> f32 {
    sample as f32 / (1i64 << 31) as f32
}

#[inline]
fn scale_u8(sample: u8) -> f32 {
    (sample as f32 / u8::MAX as f32) * 2.0 - 1.0
}

#[inline]
fn scale_u16(sample: u16) -> f32 {
    (sample as f32 / u16::MAX as f32) * 2.0 - 1.0
}

#[inline]
fn scale_u24(sample: u32) -> f32 {
    let max = (1u32 << 24) - 1;
    (sample as f32 / max as f32) * 2.0 - 1.0
}

#[inline]
fn scale_u32(sample: u32) -> f32 {
    (sample as f32 / u32::MAX as f32) * 2.0 - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_decode_stereo_wav() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("stereo.wav");
        write_wav(&path, 2, 48000, &[1000, -1000, 2000, -2000, 3000, -3000]).unwrap();

        let mut source = AudioSampleSource::from_file(&path).unwrap();
        assert_eq!(source.channel_count(), 2);
        assert_eq!(source.sample_rate(), 48000);

        let mut frame = [0.0f32; 2];
        let mut frames = Vec::new();
        while source.next_frame(&mut frame).unwrap() {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 3);
        assert!((frames[0][0] - scale_s16(1000)).abs() < 1e-6);
        assert!((frames[2][1] - scale_s16(-3000)).abs() < 1e-6);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let tempdir = tempfile::tempdir().unwrap();
        let result = AudioSampleSource::from_file(tempdir.path().join("nope.wav"));
        assert!(matches!(result, Err(SampleSourceError::IoError(_))));
    }

    #[test]
    fn test_directory_is_io_error() {
        let tempdir = tempfile::tempdir().unwrap();
        let result = AudioSampleSource::from_file(tempdir.path());
        assert!(matches!(result, Err(SampleSourceError::IoError(_))));
    }

    #[test]
    fn test_garbage_is_unsupported() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("notes.txt");
        std::fs::write(&path, b"this is definitely not audio data at all").unwrap();
        let result = AudioSampleSource::from_file(&path);
        assert!(matches!(result, Err(SampleSourceError::Unsupported(_))));
    }

    #[test]
    fn test_scaling() {
        assert_eq!(scale_s16(0), 0.0);
        assert_eq!(scale_s16(i16::MIN), -1.0);
        assert_eq!(scale_u8(0), -1.0);
        assert_eq!(scale_u8(u8::MAX), 1.0);
        assert!((scale_s24(1 << 22) - 0.5).abs() < 1e-6);
    }
}
