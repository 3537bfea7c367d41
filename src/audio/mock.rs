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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::{ActiveSource, AudioMixer, DeviceError, Notification, Notifier, OutputRoute};
use crate::config;

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;

/// A mock device. Nothing reaches hardware; the mixer is either rendered by hand through
/// `render` or by a clock thread running at real-time pace.
#[derive(Clone)]
pub struct Device {
    name: String,
    mixer: AudioMixer,
    route: Arc<RwLock<OutputRoute>>,
    route_history: Arc<Mutex<Vec<OutputRoute>>>,
    notifier: Arc<Mutex<Option<Notifier>>>,
    started: Arc<AtomicBool>,
    fail_start: Arc<AtomicBool>,
    fail_route_changes: Arc<AtomicBool>,
    /// Frames per clock tick. None means the mixer is only rendered by hand.
    block_frames: Option<usize>,
    clock: Arc<Mutex<Option<Clock>>>,
}

/// Renders the mixer in real time until dropped.
struct Clock {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            mixer: AudioMixer::new(DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE),
            route: Arc::new(RwLock::new(OutputRoute::Default)),
            route_history: Arc::new(Mutex::new(Vec::new())),
            notifier: Arc::new(Mutex::new(None)),
            started: Arc::new(AtomicBool::new(false)),
            fail_start: Arc::new(AtomicBool::new(false)),
            fail_route_changes: Arc::new(AtomicBool::new(false)),
            block_frames: None,
            clock: Arc::new(Mutex::new(None)),
        }
    }

    /// Takes the output format from the configuration and renders in real time once started.
    pub fn clocked(mut self, config: &config::Audio) -> Device {
        self.mixer = AudioMixer::new(config.channels(), config.sample_rate());
        self.block_frames = Some(config.buffer_size());
        self
    }

    /// Renders the given number of frames by hand.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        self.mixer.process_frames(frames)
    }

    /// Every route the device has been opened on or switched to, in order.
    pub fn route_history(&self) -> Vec<OutputRoute> {
        self.route_history.lock().clone()
    }

    /// The number of sources still in the mixer.
    pub fn active_sources(&self) -> usize {
        self.mixer.active_count()
    }

    /// Returns true once the device has been started.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    /// Makes the next start fail.
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::Relaxed);
    }

    /// Makes route switches fail while set.
    pub fn set_fail_route_changes(&self, fail: bool) {
        self.fail_route_changes.store(fail, Ordering::Relaxed);
    }

    /// Reports a stream fault as a real backend would.
    pub fn inject_fault(&self, reason: &str) -> Result<(), DeviceError> {
        match self.notifier.lock().as_ref() {
            Some(notifier) => notifier
                .send(Notification::Fault(reason.to_string()))
                .map_err(|_| DeviceError::Disconnected),
            None => Err(DeviceError::NotStarted),
        }
    }

    fn start_clock(&self, block_frames: usize) {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mixer = self.mixer.clone();
        let tick = Duration::from_secs_f64(block_frames as f64 / mixer.sample_rate() as f64);
        let handle = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                let mut block = vec![0.0f32; block_frames * mixer.num_channels() as usize];
                while !shutdown.load(Ordering::Relaxed) {
                    mixer.process_into(&mut block);
                    thread::sleep(tick);
                }
            })
        };
        *self.clock.lock() = Some(Clock {
            shutdown,
            handle: Some(handle),
        });
    }
}

impl super::Device for Device {
    fn start(&self, route: OutputRoute, notifier: Notifier) -> Result<(), DeviceError> {
        if self.fail_start.load(Ordering::Relaxed) {
            return Err(DeviceError::Stream(format!(
                "mock device {} refused to start",
                self.name
            )));
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(DeviceError::AlreadyStarted);
        }

        *self.route.write() = route;
        self.route_history.lock().push(route);
        self.mixer.set_notifier(notifier.clone());
        *self.notifier.lock() = Some(notifier);
        if let Some(block_frames) = self.block_frames {
            self.start_clock(block_frames);
        }

        info!(device = self.name, route = %route, "Started mock device.");
        Ok(())
    }

    fn add_source(&self, source: ActiveSource) -> Result<(), DeviceError> {
        if !self.is_started() {
            return Err(DeviceError::NotStarted);
        }
        self.mixer.add_source(source);
        Ok(())
    }

    fn set_route(&self, route: OutputRoute) -> Result<(), DeviceError> {
        if !self.is_started() {
            return Err(DeviceError::NotStarted);
        }
        if self.fail_route_changes.load(Ordering::Relaxed) {
            return Err(DeviceError::Stream(format!(
                "mock device {} refused to switch to {}",
                self.name, route
            )));
        }

        *self.route.write() = route;
        self.route_history.lock().push(route);
        debug!(device = self.name, route = %route, "Switched mock route.");
        Ok(())
    }

    fn route(&self) -> OutputRoute {
        *self.route.read()
    }

    fn sample_rate(&self) -> u32 {
        self.mixer.sample_rate()
    }

    fn num_channels(&self) -> u16 {
        self.mixer.num_channels()
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, Box<dyn Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}
