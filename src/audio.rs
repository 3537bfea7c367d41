// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::{error::Error, fmt, sync::Arc};

use crate::config;

pub mod cpal;
pub mod format;
pub mod mixer;
pub mod mock;
pub mod sample_source;
pub mod thread_priority;

pub use format::{SampleFormat, TargetFormat};
pub use mixer::{ActiveSource, AudioMixer};

/// Global atomic counter for generating unique source IDs.
static SOURCE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Returns a process-unique ID for a new mixer source.
pub fn next_source_id() -> u64 {
    SOURCE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// The physical output that playback is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputRoute {
    /// The default output (earpiece, headphones, or the host's default device).
    #[default]
    Default,
    /// The loudspeaker output.
    Speaker,
}

impl OutputRoute {
    /// Maps the speaker-output flag onto a route.
    pub fn from_speaker_output(is_speaker_output: bool) -> OutputRoute {
        if is_speaker_output {
            OutputRoute::Speaker
        } else {
            OutputRoute::Default
        }
    }

    /// Returns true if this is the speaker route.
    pub fn is_speaker(self) -> bool {
        self == OutputRoute::Speaker
    }
}

impl fmt::Display for OutputRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputRoute::Default => write!(f, "default"),
            OutputRoute::Speaker => write!(f, "speaker"),
        }
    }
}

/// Out-of-band messages sent from the audio path back to whoever started the device.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The source with the given ID played to its end.
    Finished(u64),
    /// The source with the given ID failed mid-playback and was dropped.
    Failed(u64, String),
    /// The output stream reported a failure.
    Fault(String),
}

/// Sending half for device notifications. Sends never block the audio path.
pub type Notifier = crossbeam_channel::Sender<Notification>;

/// Errors raised by an audio device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no output device found with name {0}")]
    NotFound(String),

    #[error("no default output device is available")]
    NoDefaultDevice,

    #[error("audio device has not been started")]
    NotStarted,

    #[error("audio device has already been started")]
    AlreadyStarted,

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("output stream error: {0}")]
    Stream(String),

    #[error("audio output thread is no longer running")]
    Disconnected,
}

pub trait Device: Any + fmt::Display + std::marker::Send + std::marker::Sync {
    /// Opens the output on the given route and begins rendering the mixer. Finished sources and
    /// stream faults are reported through the notifier.
    fn start(&self, route: OutputRoute, notifier: Notifier) -> Result<(), DeviceError>;

    /// Hands a source to the mixer. It starts sounding on the next rendered block.
    fn add_source(&self, source: ActiveSource) -> Result<(), DeviceError>;

    /// Moves the output to the given route. Active sources keep playing.
    fn set_route(&self, route: OutputRoute) -> Result<(), DeviceError>;

    /// Returns the route currently in use.
    fn route(&self) -> OutputRoute;

    /// The output sample rate. Loaded samples are converted to this rate.
    fn sample_rate(&self) -> u32;

    /// The number of output channels.
    fn num_channels(&self) -> u16;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, Box<dyn Error>>;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets a device for the given configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        config.target_format()?;
        return Ok(Arc::new(mock::Device::get(device).clocked(config)));
    };

    Ok(Arc::new(cpal::Device::get(config.clone())?))
}
