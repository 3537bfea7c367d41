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

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, span, Level};

use crate::audio::thread_priority::{
    audio_thread_priority, configure_audio_thread_priority, rt_audio_enabled,
};
use crate::audio::{
    ActiveSource, AudioMixer, Device as AudioDevice, DeviceError, Notification, Notifier,
    OutputRoute, SampleFormat, TargetFormat,
};
use crate::config;

/// The name that selects the host's default output device.
const DEFAULT_DEVICE_NAME: &str = "default";

/// A small wrapper around a cpal::Device that owns the continuous output stream and moves it
/// between the default and speaker outputs.
pub struct Device {
    /// The name of the default-route device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The format the output stream is opened with.
    target_format: TargetFormat,
    /// Audio configuration, used to resolve routes to devices.
    audio_config: config::Audio,
    /// The running output, once started.
    output_manager: Mutex<Option<OutputManager>>,
    /// The route the stream is currently open on.
    route: RwLock<OutputRoute>,
}

/// Commands handled by the thread that owns the cpal stream.
enum StreamCommand {
    SwitchRoute {
        route: OutputRoute,
        reply: Sender<Result<(), DeviceError>>,
    },
    Shutdown,
}

/// Manages the continuous output stream and mixing of multiple audio sources.
struct OutputManager {
    /// The core audio mixer
    mixer: AudioMixer,
    /// Channel for handing new audio sources to the producer thread.
    source_tx: Sender<ActiveSource>,
    /// Channel for commanding the output thread.
    command_tx: Sender<StreamCommand>,
    /// Tells the producer thread to exit.
    shutdown: Arc<AtomicBool>,
    /// Handle to the output thread (owns the stream).
    output_thread: Option<thread::JoinHandle<()>>,
    /// Handle to the producer thread (fills the ring buffer).
    producer_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

impl Drop for OutputManager {
    fn drop(&mut self) {
        self.mixer.stop_all();
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.command_tx.send(StreamCommand::Shutdown);

        if let Some(thread) = self.producer_thread.take() {
            let _ = thread.join();
        }
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

/// Finds an output device by name across all hosts. The name "default" selects the default
/// host's default output device.
fn find_output_device(name: &str) -> Result<(cpal::HostId, cpal::Device), DeviceError> {
    if name == DEFAULT_DEVICE_NAME {
        let host = cpal::default_host();
        return host
            .default_output_device()
            .map(|device| (host.id(), device))
            .ok_or(DeviceError::NoDefaultDevice);
    }

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(e) => {
                debug!(err = %e, host = host_id.name(), "Host unavailable");
                continue;
            }
        };
        let devices = match host.output_devices() {
            Ok(devices) => devices,
            Err(e) => {
                debug!(err = %e, host = host_id.name(), "Unable to list output devices");
                continue;
            }
        };
        for device in devices {
            if device.name().is_ok_and(|device_name| device_name.trim() == name) {
                return Ok((host_id, device));
            }
        }
    }

    Err(DeviceError::NotFound(name.to_string()))
}

/// The device name a route plays through.
fn route_device_name(audio_config: &config::Audio, route: OutputRoute) -> &str {
    match route {
        OutputRoute::Default => audio_config.device(),
        OutputRoute::Speaker => audio_config
            .speaker_device()
            .unwrap_or_else(|| audio_config.device()),
    }
}

/// Returns true if moving between the routes means opening a different device.
fn route_changes_device(
    audio_config: &config::Audio,
    from: OutputRoute,
    to: OutputRoute,
) -> bool {
    route_device_name(audio_config, from) != route_device_name(audio_config, to)
}

/// Builds and starts an output stream of sample type T that drains the ring buffer.
fn build_typed_stream<T>(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    ring: Arc<Mutex<rtrb::Consumer<f32>>>,
    notifier: Notifier,
) -> Result<cpal::Stream, DeviceError>
where
    T: SizedSample + FromSample<f32>,
{
    let stream = device
        .build_output_stream(
            stream_config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // During a route switch two streams briefly share the ring. Whichever callback
                // loses the lock plays silence.
                match ring.try_lock() {
                    Some(mut consumer) => {
                        for sample in data.iter_mut() {
                            *sample = match consumer.pop() {
                                Ok(value) => T::from_sample(value),
                                Err(_) => T::EQUILIBRIUM,
                            };
                        }
                    }
                    None => data.fill(T::EQUILIBRIUM),
                }
            },
            move |err| {
                error!(err = %err, "CPAL output stream error");
                let _ = notifier.try_send(Notification::Fault(err.to_string()));
            },
            None,
        )
        .map_err(|e| DeviceError::Stream(e.to_string()))?;
    stream
        .play()
        .map_err(|e| DeviceError::Stream(e.to_string()))?;
    Ok(stream)
}

/// Opens the stream for a route in the configured sample format.
fn open_stream(
    audio_config: &config::Audio,
    target_format: &TargetFormat,
    num_channels: u16,
    route: OutputRoute,
    ring: Arc<Mutex<rtrb::Consumer<f32>>>,
    notifier: Notifier,
) -> Result<cpal::Stream, DeviceError> {
    let device_name = route_device_name(audio_config, route);
    let (_, device) = find_output_device(device_name)?;
    let stream_config = cpal::StreamConfig {
        channels: num_channels,
        sample_rate: cpal::SampleRate(target_format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match (target_format.sample_format, target_format.bits_per_sample) {
        (SampleFormat::Float, _) => {
            build_typed_stream::<f32>(&device, &stream_config, ring, notifier)?
        }
        (SampleFormat::Int, 16) => {
            build_typed_stream::<i16>(&device, &stream_config, ring, notifier)?
        }
        (SampleFormat::Int, _) => {
            build_typed_stream::<i32>(&device, &stream_config, ring, notifier)?
        }
    };
    info!(
        device = device_name,
        route = %route,
        format = %target_format.sample_format,
        bits = target_format.bits_per_sample,
        "CPAL output stream started"
    );
    Ok(stream)
}

impl OutputManager {
    /// Spawns the producer and output threads and waits until the first stream is playing.
    fn start(
        audio_config: config::Audio,
        target_format: TargetFormat,
        num_channels: u16,
        route: OutputRoute,
        notifier: Notifier,
    ) -> Result<OutputManager, DeviceError> {
        let mixer = AudioMixer::new(num_channels, target_format.sample_rate);
        mixer.set_notifier(notifier.clone());

        let (source_tx, source_rx) = crossbeam_channel::unbounded::<ActiveSource>();
        let (command_tx, command_rx) = crossbeam_channel::unbounded::<StreamCommand>();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), DeviceError>>(1);
        let shutdown = Arc::new(AtomicBool::new(false));

        let block_frames = audio_config.buffer_size();
        let block_samples = block_frames * num_channels as usize;
        // Roughly 100ms of audio, and never less than two blocks.
        let capacity =
            (target_format.sample_rate as usize * num_channels as usize / 10).max(block_samples * 2);
        let (producer, consumer) = rtrb::RingBuffer::<f32>::new(capacity);
        let consumer = Arc::new(Mutex::new(consumer));

        let producer_thread = {
            let mixer = mixer.clone();
            let shutdown = shutdown.clone();
            let priority = audio_thread_priority();
            let rt_audio = rt_audio_enabled();
            thread::spawn(move || {
                configure_audio_thread_priority(priority, rt_audio);
                run_producer(mixer, source_rx, producer, block_samples, shutdown);
            })
        };

        let output_thread = thread::spawn(move || {
            let mut _stream = match open_stream(
                &audio_config,
                &target_format,
                num_channels,
                route,
                consumer.clone(),
                notifier.clone(),
            ) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            let mut current_route = route;
            while let Ok(command) = command_rx.recv() {
                match command {
                    StreamCommand::SwitchRoute { route, reply } => {
                        if !route_changes_device(&audio_config, current_route, route) {
                            debug!(
                                device = route_device_name(&audio_config, route),
                                route = %route,
                                "Route uses the open device, keeping the stream"
                            );
                            current_route = route;
                            let _ = reply.send(Ok(()));
                            continue;
                        }

                        // The new stream is running before the old one is dropped.
                        let result = open_stream(
                            &audio_config,
                            &target_format,
                            num_channels,
                            route,
                            consumer.clone(),
                            notifier.clone(),
                        )
                        .map(|stream| {
                            _stream = stream;
                            current_route = route;
                        });
                        let _ = reply.send(result);
                    }
                    StreamCommand::Shutdown => break,
                }
            }
        });

        let manager = OutputManager {
            mixer,
            source_tx,
            command_tx,
            shutdown,
            output_thread: Some(output_thread),
            producer_thread: Some(producer_thread),
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(manager),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DeviceError::Disconnected),
        }
    }

    /// Adds a new audio source to be played.
    fn add_source(&self, source: ActiveSource) -> Result<(), DeviceError> {
        self.source_tx
            .send(source)
            .map_err(|_| DeviceError::Disconnected)
    }

    /// Moves the stream to another route and waits for the outcome.
    fn switch_route(&self, route: OutputRoute) -> Result<(), DeviceError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.command_tx
            .send(StreamCommand::SwitchRoute {
                route,
                reply: reply_tx,
            })
            .map_err(|_| DeviceError::Disconnected)?;
        reply_rx.recv().map_err(|_| DeviceError::Disconnected)?
    }
}

/// Mixes blocks into the ring buffer until shut down.
fn run_producer(
    mixer: AudioMixer,
    source_rx: Receiver<ActiveSource>,
    mut producer: rtrb::Producer<f32>,
    block_samples: usize,
    shutdown: Arc<AtomicBool>,
) {
    let mut scratch = vec![0.0f32; block_samples];

    while !shutdown.load(Ordering::Relaxed) {
        while let Ok(new_source) = source_rx.try_recv() {
            mixer.add_source(new_source);
        }

        if producer.slots() >= block_samples {
            mixer.process_into(&mut scratch);
            for &sample in scratch.iter() {
                if producer.push(sample).is_err() {
                    break;
                }
            }
        } else {
            thread::sleep(Duration::from_micros(500));
        }
    }
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices.
    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_configs) = device.supported_output_configs() else {
                    continue;
                };
                let max_channels = output_configs
                    .map(|output_config| output_config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    let name = device.name()?;
                    devices.push(Device {
                        max_channels,
                        host_id,
                        target_format: TargetFormat::default(),
                        audio_config: config::Audio::new(&name),
                        output_manager: Mutex::new(None),
                        route: RwLock::new(OutputRoute::Default),
                        name,
                    })
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the cpal device described by the configuration. The stream isn't opened until
    /// the device is started.
    pub fn get(audio_config: config::Audio) -> Result<Device, Box<dyn Error>> {
        let target_format = audio_config.target_format()?;
        let (host_id, device) = find_output_device(audio_config.device())?;
        let max_channels = device
            .supported_output_configs()?
            .map(|output_config| output_config.channels())
            .max()
            .unwrap_or(0);

        if max_channels < audio_config.channels() {
            return Err(DeviceError::UnsupportedFormat(format!(
                "{} channels requested, audio device {} only has {}",
                audio_config.channels(),
                audio_config.device(),
                max_channels
            ))
            .into());
        }

        Ok(Device {
            name: audio_config.device().to_string(),
            max_channels,
            host_id,
            target_format,
            audio_config,
            output_manager: Mutex::new(None),
            route: RwLock::new(OutputRoute::Default),
        })
    }
}

impl AudioDevice for Device {
    fn start(&self, route: OutputRoute, notifier: Notifier) -> Result<(), DeviceError> {
        let span = span!(Level::INFO, "start device (cpal)");
        let _enter = span.enter();

        let mut output_manager = self.output_manager.lock();
        if output_manager.is_some() {
            return Err(DeviceError::AlreadyStarted);
        }

        *output_manager = Some(OutputManager::start(
            self.audio_config.clone(),
            self.target_format.clone(),
            self.audio_config.channels(),
            route,
            notifier,
        )?);
        *self.route.write() = route;
        info!(device = self.name, route = %route, "Started output.");
        Ok(())
    }

    fn add_source(&self, source: ActiveSource) -> Result<(), DeviceError> {
        match self.output_manager.lock().as_ref() {
            Some(output_manager) => output_manager.add_source(source),
            None => Err(DeviceError::NotStarted),
        }
    }

    fn set_route(&self, route: OutputRoute) -> Result<(), DeviceError> {
        match self.output_manager.lock().as_ref() {
            Some(output_manager) => output_manager.switch_route(route)?,
            None => return Err(DeviceError::NotStarted),
        }
        *self.route.write() = route;
        info!(device = self.name, route = %route, "Switched output route.");
        Ok(())
    }

    fn route(&self) -> OutputRoute {
        *self.route.read()
    }

    fn sample_rate(&self) -> u32 {
        self.target_format.sample_rate
    }

    fn num_channels(&self) -> u16 {
        self.audio_config.channels()
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Device>, Box<dyn Error>> {
        Err("not a mock".into())
    }
}
