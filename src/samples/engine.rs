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

//! The sample player engine: a registry of named samples with async load, play, stop, and
//! unload, an output route toggle, and an event stream for failures that don't belong to
//! any single call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::error::{ErrorKind, SamplePlayerError};
use super::events::{EngineError, EngineEvent};
use super::loader::{LoadedSample, SampleLoader};
use super::settings::{EngineSettings, ReloadPolicy};
use super::voice::Voice;
use crate::audio::{self, ActiveSource, Device, Notification, OutputRoute};
use crate::playsync::CancelHandle;

/// How often the notification forwarder checks whether the engine is gone.
const FORWARDER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A snapshot of one registered sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleInfo {
    pub name: String,
    pub path: PathBuf,
    pub channels: u16,
    pub sample_rate: u32,
    /// Length of one pass through the sample.
    pub duration: Duration,
    pub playing: bool,
    pub looping: bool,
}

/// A registered sample and its voice, if one has been started.
struct SampleEntry {
    sample: LoadedSample,
    voice: Option<Voice>,
}

struct EngineInner {
    device: Arc<dyn Device>,
    loader: SampleLoader,
    settings: EngineSettings,
    /// Registered samples by name.
    samples: RwLock<HashMap<String, SampleEntry>>,
    /// Serializes operations on the same name.
    name_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Mixer source IDs of started voices, mapped back to their sample names.
    sources: Mutex<HashMap<u64, String>>,
    events: broadcast::Sender<EngineEvent>,
}

/// Plays named, preloaded samples through an audio device.
///
/// The engine is cheap to clone; clones share the same registry and device. Calls on the same
/// name run one at a time in the order they acquire the name; calls on different names run
/// concurrently.
#[derive(Clone)]
pub struct SamplePlayerEngine {
    inner: Arc<EngineInner>,
}

impl SamplePlayerEngine {
    /// Starts the device on the route chosen by the settings and returns a ready engine.
    pub fn create(
        device: Arc<dyn Device>,
        settings: EngineSettings,
    ) -> Result<SamplePlayerEngine, SamplePlayerError> {
        let route = OutputRoute::from_speaker_output(settings.speaker_output);
        let (notify_tx, notify_rx) = crossbeam_channel::unbounded();
        if let Err(e) = device.start(route, notify_tx) {
            error!(device = %device, err = %e, "Unable to start audio device");
            return Err(e.into());
        }

        let (events, _) = broadcast::channel(settings.clamped_event_capacity());
        let inner = Arc::new(EngineInner {
            loader: SampleLoader::new(device.sample_rate()),
            device,
            settings,
            samples: RwLock::new(HashMap::new()),
            name_locks: Mutex::new(HashMap::new()),
            sources: Mutex::new(HashMap::new()),
            events,
        });

        let weak = Arc::downgrade(&inner);
        thread::spawn(move || forward_notifications(weak, notify_rx));

        info!(device = %inner.device, route = %route, "Sample player engine created.");
        Ok(SamplePlayerEngine { inner })
    }

    /// Decodes the file at `path` and registers it under `name`.
    ///
    /// If the name is taken, the reload policy decides: `Replace` stops the old sample and
    /// swaps in the new data once it has decoded, `Reject` fails with AlreadyLoaded. A
    /// failed decode leaves any existing sample untouched.
    pub async fn load(&self, name: &str, path: impl AsRef<Path>) -> Result<(), SamplePlayerError> {
        let path = path.as_ref().to_path_buf();
        let _guard = self.inner.lock_name(name).await;

        let exists = self.inner.samples.read().contains_key(name);
        if exists && self.inner.settings.reload_policy == ReloadPolicy::Reject {
            return Err(fail(SamplePlayerError::AlreadyLoaded(name.to_string())));
        }

        let loader = self.inner.loader.clone();
        let load_path = path.clone();
        let loaded = match tokio::task::spawn_blocking(move || loader.load(&load_path)).await {
            Ok(Ok(loaded)) => loaded,
            Ok(Err(e)) => return Err(fail(SamplePlayerError::from_load(&path, e))),
            Err(e) => {
                return Err(fail(SamplePlayerError::DecodeError {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }))
            }
        };

        let previous = self.inner.samples.write().insert(
            name.to_string(),
            SampleEntry {
                sample: loaded,
                voice: None,
            },
        );
        if let Some(voice) = previous.and_then(|entry| entry.voice) {
            self.inner.retire(&voice);
        }

        info!(
            sample = name,
            path = %path.display(),
            replaced = exists,
            "Loaded sample."
        );
        Ok(())
    }

    /// Starts the sample from the beginning. A voice already playing for this sample is cut.
    pub async fn play(&self, name: &str, looping: bool) -> Result<(), SamplePlayerError> {
        let _guard = self.inner.lock_name(name).await;

        let (sample, previous) = {
            let mut samples = self.inner.samples.write();
            match samples.get_mut(name) {
                Some(entry) => (entry.sample.clone(), entry.voice.take()),
                None => return Err(fail(SamplePlayerError::NotLoaded(name.to_string()))),
            }
        };
        if let Some(previous) = previous {
            self.inner.retire(&previous);
        }

        let cancel_handle = CancelHandle::new();
        let source_id = audio::next_source_id();
        let source = ActiveSource::new(
            source_id,
            Box::new(sample.create_source(looping)),
            cancel_handle.clone(),
        );
        let voice = Voice::new(
            source_id,
            looping,
            cancel_handle,
            source.is_finished.clone(),
        );

        self.inner
            .sources
            .lock()
            .insert(source_id, name.to_string());
        if let Err(e) = self.inner.device.add_source(source) {
            self.inner.sources.lock().remove(&source_id);
            return Err(fail(e.into()));
        }

        if let Some(entry) = self.inner.samples.write().get_mut(name) {
            entry.voice = Some(voice);
        }

        info!(
            sample = name,
            looping,
            route = %self.inner.device.route(),
            "Playing sample."
        );
        Ok(())
    }

    /// Stops the sample's voice. Stopping a sample that isn't playing succeeds.
    pub async fn stop(&self, name: &str) -> Result<(), SamplePlayerError> {
        let _guard = self.inner.lock_name(name).await;

        let voice = match self.inner.samples.write().get_mut(name) {
            Some(entry) => entry.voice.take(),
            None => return Err(fail(SamplePlayerError::NotLoaded(name.to_string()))),
        };

        let was_playing = voice.is_some_and(|voice| self.inner.retire(&voice));
        if was_playing {
            info!(sample = name, "Stopped sample.");
        } else {
            debug!(sample = name, "Sample was not playing.");
        }
        Ok(())
    }

    /// Stops the sample and releases its data.
    pub async fn unload(&self, name: &str) -> Result<(), SamplePlayerError> {
        let _guard = self.inner.lock_name(name).await;

        let entry = match self.inner.samples.write().remove(name) {
            Some(entry) => entry,
            None => return Err(fail(SamplePlayerError::NotLoaded(name.to_string()))),
        };
        if let Some(voice) = entry.voice {
            self.inner.retire(&voice);
        }

        info!(
            sample = name,
            freed_kb = entry.sample.memory_size() / 1024,
            "Unloaded sample."
        );
        Ok(())
    }

    /// Moves playback, current and future, to the speaker or the default output. The outcome
    /// is published: RouteChanged on success, an Error event of kind DeviceError on failure,
    /// in which case the previous route stays in effect.
    pub fn set_output_route(&self, is_speaker_output: bool) {
        let route = OutputRoute::from_speaker_output(is_speaker_output);
        if self.inner.device.route() == route {
            debug!(route = %route, "Output route unchanged.");
            return;
        }

        match self.inner.device.set_route(route) {
            Ok(()) => {
                info!(route = %route, "Output route changed.");
                self.inner.publish(EngineEvent::RouteChanged(route));
            }
            Err(e) => {
                let err = SamplePlayerError::from(e);
                error!(route = %route, err = %err, "Unable to change output route");
                self.inner
                    .publish(EngineEvent::Error(EngineError::from(&err)));
            }
        }
    }

    /// The route playback is currently using.
    pub fn output_route(&self) -> OutputRoute {
        self.inner.device.route()
    }

    /// Returns true if a sample is registered under the name.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.inner.samples.read().contains_key(name)
    }

    /// Returns true if the sample has a voice that is still sounding.
    pub fn is_playing(&self, name: &str) -> bool {
        self.inner
            .samples
            .read()
            .get(name)
            .and_then(|entry| entry.voice.as_ref())
            .is_some_and(|voice| voice.is_active())
    }

    /// Names of all registered samples, sorted.
    pub fn loaded_samples(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.samples.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn sample_info(&self, name: &str) -> Option<SampleInfo> {
        let samples = self.inner.samples.read();
        let entry = samples.get(name)?;
        let active_voice = entry.voice.as_ref().filter(|voice| voice.is_active());
        Some(SampleInfo {
            name: name.to_string(),
            path: entry.sample.path().to_path_buf(),
            channels: entry.sample.channel_count(),
            sample_rate: entry.sample.sample_rate(),
            duration: entry.sample.duration(),
            playing: active_voice.is_some(),
            looping: active_voice.is_some_and(|voice| voice.is_looping()),
        })
    }

    /// Bytes of decoded audio held by the registry.
    pub fn memory_usage(&self) -> usize {
        self.inner
            .samples
            .read()
            .values()
            .map(|entry| entry.sample.memory_size())
            .sum()
    }

    /// Stops every voice. Samples stay loaded.
    pub fn stop_all(&self) {
        self.inner.stop_all();
    }

    /// Returns a new receiver for engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Calls `callback` for every error event, on a dedicated thread, until the engine is
    /// dropped.
    pub fn on_error<F>(&self, callback: F) -> thread::JoinHandle<()>
    where
        F: Fn(&EngineError) + Send + 'static,
    {
        let mut events = self.subscribe();
        thread::spawn(move || loop {
            match events.blocking_recv() {
                Ok(EngineEvent::Error(err)) => callback(&err),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Error callback fell behind the event stream");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        })
    }
}

/// Holds a name's operation lock. The name's entry is dropped from the lock table once no
/// other call holds or waits on it.
struct NameGuard<'a> {
    inner: &'a EngineInner,
    name: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.inner.name_locks.lock();
        // One reference in the table and one here: nobody else is waiting.
        let idle = locks
            .get(&self.name)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2);
        if idle {
            locks.remove(&self.name);
        }
    }
}

impl EngineInner {
    /// Waits for exclusive use of the name.
    async fn lock_name(&self, name: &str) -> NameGuard<'_> {
        let lock = self
            .name_locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone();
        let mut name_guard = NameGuard {
            inner: self,
            name: name.to_string(),
            lock: lock.clone(),
            guard: None,
        };
        name_guard.guard = Some(lock.lock_owned().await);
        name_guard
    }

    fn publish(&self, event: EngineEvent) {
        // An error only means nobody is subscribed.
        let _ = self.events.send(event);
    }

    /// Stops a voice and forgets its source. Returns true if it was still sounding.
    fn retire(&self, voice: &Voice) -> bool {
        self.sources.lock().remove(&voice.source_id());
        voice.stop()
    }

    fn stop_all(&self) {
        let voices: Vec<Voice> = self
            .samples
            .write()
            .values_mut()
            .filter_map(|entry| entry.voice.take())
            .collect();
        let stopped = voices.iter().filter(|voice| self.retire(voice)).count();
        if stopped > 0 {
            info!(stopped, "Stopped all voices.");
        }
    }

    /// Forgets a voice whose source the mixer has dropped. Returns the sample name, if the
    /// source still belonged to one.
    fn release_source(&self, source_id: u64) -> Option<String> {
        let name = self.sources.lock().remove(&source_id)?;
        if let Some(entry) = self.samples.write().get_mut(&name) {
            if entry
                .voice
                .as_ref()
                .is_some_and(|voice| voice.source_id() == source_id)
            {
                entry.voice = None;
            }
        }
        Some(name)
    }

    fn handle_notification(&self, notification: Notification) {
        match notification {
            Notification::Finished(source_id) => {
                let Some(name) = self.release_source(source_id) else {
                    return;
                };
                debug!(sample = name, "Sample finished.");
                self.publish(EngineEvent::SampleFinished { name });
            }
            Notification::Failed(source_id, reason) => {
                let Some(name) = self.release_source(source_id) else {
                    return;
                };
                error!(sample = name, reason, "Sample playback failed");
                self.publish(EngineEvent::Error(EngineError::new(
                    ErrorKind::DecodeError,
                    format!("sample {} stopped: {}", name, reason),
                )));
            }
            Notification::Fault(reason) => {
                error!(device = %self.device, reason, "Audio device fault");
                self.publish(EngineEvent::Error(EngineError::new(
                    ErrorKind::DeviceError,
                    reason,
                )));
            }
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Turns device notifications into engine events until the engine is dropped.
fn forward_notifications(
    engine: Weak<EngineInner>,
    notifications: crossbeam_channel::Receiver<Notification>,
) {
    loop {
        match notifications.recv_timeout(FORWARDER_POLL_INTERVAL) {
            Ok(notification) => match engine.upgrade() {
                Some(inner) => inner.handle_notification(notification),
                None => return,
            },
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if engine.strong_count() == 0 {
                    return;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Logs an operation failure on its way back to the caller.
fn fail(err: SamplePlayerError) -> SamplePlayerError {
    warn!(kind = %err.kind(), err = %err, "Sample operation failed");
    err
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::mpsc;

    use tokio::time::timeout;

    use super::*;
    use crate::audio::mock;
    use crate::testutil::{eventually, write_wav};

    const EVENT_TIMEOUT: Duration = Duration::from_secs(3);

    struct Fixture {
        _tempdir: tempfile::TempDir,
        dir: PathBuf,
        device: Arc<mock::Device>,
        engine: SamplePlayerEngine,
    }

    impl Fixture {
        fn new(settings: EngineSettings) -> Fixture {
            let tempdir = tempfile::tempdir().unwrap();
            let dir = tempdir.path().to_path_buf();
            let device = Arc::new(mock::Device::get("mock-device"));
            let engine = SamplePlayerEngine::create(device.clone(), settings).unwrap();
            Fixture {
                _tempdir: tempdir,
                dir,
                device,
                engine,
            }
        }

        /// Writes a mono WAV with the given number of frames at the mock device's rate.
        fn wav(&self, file: &str, frames: usize) -> PathBuf {
            let path = self.dir.join(file);
            write_wav(&path, 1, 44100, &vec![8192; frames]).unwrap();
            path
        }
    }

    async fn next_event(events: &mut broadcast::Receiver<EngineEvent>) -> EngineEvent {
        timeout(EVENT_TIMEOUT, events.recv())
            .await
            .expect("timed out waiting for an engine event")
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_operations_on_unknown_name() {
        let fixture = Fixture::new(EngineSettings::default());
        let engine = &fixture.engine;

        assert_eq!(
            engine.play("ghost", false).await.unwrap_err().kind(),
            ErrorKind::NotLoaded
        );
        assert_eq!(
            engine.stop("ghost").await.unwrap_err().kind(),
            ErrorKind::NotLoaded
        );
        assert_eq!(
            engine.unload("ghost").await.unwrap_err().kind(),
            ErrorKind::NotLoaded
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bell_lifecycle() {
        let fixture = Fixture::new(EngineSettings::default());
        let engine = &fixture.engine;
        let path = fixture.wav("bell.wav", 44100);

        engine.load("bell", &path).await.unwrap();
        assert!(engine.is_loaded("bell"));
        assert_eq!(engine.memory_usage(), 44100 * std::mem::size_of::<f32>());

        engine.play("bell", false).await.unwrap();
        assert!(engine.is_playing("bell"));
        assert_eq!(fixture.device.active_sources(), 1);
        let rendered = fixture.device.render(4);
        assert_eq!(rendered[0], 0.25);
        assert_eq!(rendered[1], 0.25);

        engine.stop("bell").await.unwrap();
        assert!(!engine.is_playing("bell"));
        fixture.device.render(1);
        assert_eq!(fixture.device.active_sources(), 0);

        engine.unload("bell").await.unwrap();
        assert!(!engine.is_loaded("bell"));
        assert_eq!(engine.memory_usage(), 0);
        assert_eq!(
            engine.play("bell", false).await.unwrap_err().kind(),
            ErrorKind::NotLoaded
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reload_after_unload() {
        let fixture = Fixture::new(EngineSettings {
            reload_policy: ReloadPolicy::Reject,
            ..Default::default()
        });
        let engine = &fixture.engine;
        let path = fixture.wav("snare.wav", 100);

        engine.load("snare", &path).await.unwrap();
        engine.unload("snare").await.unwrap();
        engine.load("snare", &path).await.unwrap();
        assert!(engine.is_loaded("snare"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_when_not_playing() {
        let fixture = Fixture::new(EngineSettings::default());
        let engine = &fixture.engine;
        engine.load("kick", fixture.wav("kick.wav", 100)).await.unwrap();

        engine.stop("kick").await.unwrap();
        engine.stop("kick").await.unwrap();
        assert!(engine.is_loaded("kick"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_loads() {
        let fixture = Fixture::new(EngineSettings::default());
        let engine = &fixture.engine;
        let first = fixture.wav("first.wav", 1000);
        let second = fixture.wav("second.wav", 2000);

        let (a, b) = tokio::join!(engine.load("first", &first), engine.load("second", &second));
        a.unwrap();
        b.unwrap();
        assert_eq!(
            engine.loaded_samples(),
            vec!["first".to_string(), "second".to_string()]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_calls_on_one_name() {
        let fixture = Fixture::new(EngineSettings::default());
        let path = fixture.wav("hat.wav", 100);
        fixture.engine.load("hat", &path).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let engine = fixture.engine.clone();
            handles.push(tokio::spawn(async move {
                engine.play("hat", i % 2 == 0).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Each play cut the previous voice, so exactly one remains.
        assert!(fixture.engine.is_playing("hat"));
        fixture.device.render(1);
        assert_eq!(fixture.device.active_sources(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_name_locks_are_released() {
        let fixture = Fixture::new(EngineSettings::default());
        let engine = &fixture.engine;
        let path = fixture.wav("rim.wav", 100);

        for i in 0..1000 {
            let name = format!("ghost{}", i);
            assert_eq!(
                engine.play(&name, false).await.unwrap_err().kind(),
                ErrorKind::NotLoaded
            );
        }
        for i in 0..10 {
            let name = format!("rim{}", i);
            engine.load(&name, &path).await.unwrap();
            engine.play(&name, false).await.unwrap();
            engine.stop(&name).await.unwrap();
            engine.unload(&name).await.unwrap();
        }
        assert_eq!(engine.inner.name_locks.lock().len(), 0);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            let path = path.clone();
            handles.push(tokio::spawn(async move {
                let _ = engine.load("rim", &path).await;
                let _ = engine.unload("rim").await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(engine.inner.name_locks.lock().len(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_interleaved_calls_on_one_name() {
        let fixture = Fixture::new(EngineSettings::default());
        let path = fixture.wav("cowbell.wav", 44100);

        for round in 0..4 {
            let mut handles = Vec::new();
            for i in 0..24 {
                let engine = fixture.engine.clone();
                let path = path.clone();
                handles.push(tokio::spawn(async move {
                    let result = match i % 3 {
                        0 => engine.load("cowbell", &path).await,
                        1 => engine.play("cowbell", i % 2 == 0).await,
                        _ => engine.unload("cowbell").await,
                    };
                    if let Err(e) = result {
                        assert_eq!(e.kind(), ErrorKind::NotLoaded);
                    }
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }

            fixture.device.render(1);
            let playing = usize::from(fixture.engine.is_playing("cowbell"));
            assert!(fixture.device.active_sources() <= 1, "round {}", round);
            assert_eq!(fixture.device.active_sources(), playing, "round {}", round);
            if !fixture.engine.is_loaded("cowbell") {
                assert_eq!(playing, 0);
            }

            // A final unload leaves nothing behind.
            let _ = fixture.engine.unload("cowbell").await;
            fixture.device.render(1);
            assert!(!fixture.engine.is_loaded("cowbell"));
            assert_eq!(fixture.device.active_sources(), 0);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reject_policy() {
        let fixture = Fixture::new(EngineSettings {
            reload_policy: ReloadPolicy::Reject,
            ..Default::default()
        });
        let engine = &fixture.engine;
        let path = fixture.wav("tom.wav", 100);

        engine.load("tom", &path).await.unwrap();
        assert_eq!(
            engine.load("tom", &path).await.unwrap_err().kind(),
            ErrorKind::AlreadyLoaded
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_replace_policy_stops_old_voice() {
        let fixture = Fixture::new(EngineSettings::default());
        let engine = &fixture.engine;

        engine.load("pad", fixture.wav("short.wav", 100)).await.unwrap();
        engine.play("pad", true).await.unwrap();
        assert!(engine.is_playing("pad"));

        let long = fixture.wav("long.wav", 500);
        engine.load("pad", &long).await.unwrap();
        assert!(!engine.is_playing("pad"));
        fixture.device.render(1);
        assert_eq!(fixture.device.active_sources(), 0);

        let info = engine.sample_info("pad").unwrap();
        assert_eq!(info.path, long);
        assert_eq!(info.channels, 1);
        assert_eq!(info.sample_rate, 44100);
        assert!(!info.playing);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_replace_keeps_old_sample() {
        let fixture = Fixture::new(EngineSettings::default());
        let engine = &fixture.engine;
        let path = fixture.wav("ride.wav", 100);
        engine.load("ride", &path).await.unwrap();

        let err = engine
            .load("ride", fixture.dir.join("missing.wav"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(engine.sample_info("ride").unwrap().path, path);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_errors() {
        let fixture = Fixture::new(EngineSettings::default());
        let engine = &fixture.engine;

        let err = engine
            .load("missing", fixture.dir.join("missing.wav"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let text = fixture.dir.join("notes.txt");
        std::fs::write(&text, b"these are words, not samples").unwrap();
        let err = engine.load("notes", &text).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeError);

        assert!(engine.loaded_samples().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_looping_voice_keeps_playing() {
        let fixture = Fixture::new(EngineSettings::default());
        let engine = &fixture.engine;
        engine.load("loop", fixture.wav("loop.wav", 10)).await.unwrap();

        engine.play("loop", true).await.unwrap();
        let rendered = fixture.device.render(35);
        assert!(rendered.iter().all(|sample| *sample == 0.25));
        assert!(engine.is_playing("loop"));
        assert!(engine.sample_info("loop").unwrap().looping);

        engine.stop("loop").await.unwrap();
        assert!(!engine.is_playing("loop"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_one_shot_finishes() {
        let fixture = Fixture::new(EngineSettings::default());
        let engine = &fixture.engine;
        let mut events = engine.subscribe();
        engine.load("clap", fixture.wav("clap.wav", 10)).await.unwrap();

        engine.play("clap", false).await.unwrap();
        fixture.device.render(20);

        assert_eq!(
            next_event(&mut events).await,
            EngineEvent::SampleFinished {
                name: "clap".to_string()
            }
        );
        assert!(!engine.is_playing("clap"));
        assert!(engine.is_loaded("clap"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stopped_voice_does_not_finish() {
        let fixture = Fixture::new(EngineSettings::default());
        let engine = &fixture.engine;
        let mut events = engine.subscribe();
        engine.load("crash", fixture.wav("crash.wav", 10)).await.unwrap();

        engine.play("crash", false).await.unwrap();
        engine.stop("crash").await.unwrap();
        fixture.device.render(20);

        engine.set_output_route(true);
        assert_eq!(
            next_event(&mut events).await,
            EngineEvent::RouteChanged(OutputRoute::Speaker)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_initial_speaker_route() {
        let fixture = Fixture::new(EngineSettings {
            speaker_output: true,
            ..Default::default()
        });
        let engine = &fixture.engine;
        engine.load("chime", fixture.wav("chime.wav", 100)).await.unwrap();

        engine.play("chime", false).await.unwrap();
        assert_eq!(engine.output_route(), OutputRoute::Speaker);
        assert_eq!(fixture.device.route_history(), vec![OutputRoute::Speaker]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_route_switch_mid_playback() {
        let fixture = Fixture::new(EngineSettings::default());
        let engine = &fixture.engine;
        let mut events = engine.subscribe();
        engine.load("drone", fixture.wav("drone.wav", 100)).await.unwrap();
        engine.play("drone", true).await.unwrap();
        fixture.device.render(10);

        engine.set_output_route(true);
        assert_eq!(
            next_event(&mut events).await,
            EngineEvent::RouteChanged(OutputRoute::Speaker)
        );
        assert_eq!(engine.output_route(), OutputRoute::Speaker);
        assert!(engine.is_playing("drone"));
        assert!(fixture
            .device
            .render(10)
            .iter()
            .all(|sample| *sample == 0.25));

        // Asking for the current route again does nothing.
        engine.set_output_route(true);
        engine.set_output_route(false);
        assert_eq!(
            next_event(&mut events).await,
            EngineEvent::RouteChanged(OutputRoute::Default)
        );
        assert_eq!(
            fixture.device.route_history(),
            vec![
                OutputRoute::Default,
                OutputRoute::Speaker,
                OutputRoute::Default
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_route_switch() {
        let fixture = Fixture::new(EngineSettings::default());
        let engine = &fixture.engine;
        let mut events = engine.subscribe();

        fixture.device.set_fail_route_changes(true);
        engine.set_output_route(true);

        match next_event(&mut events).await {
            EngineEvent::Error(err) => assert_eq!(err.kind, ErrorKind::DeviceError),
            event => panic!("unexpected event {:?}", event),
        }
        assert_eq!(engine.output_route(), OutputRoute::Default);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_device_fault_reaches_subscribers_and_callback() {
        let fixture = Fixture::new(EngineSettings::default());
        let engine = &fixture.engine;
        let mut events = engine.subscribe();
        let (tx, rx) = mpsc::channel();
        engine.on_error(move |err| {
            let _ = tx.send(err.clone());
        });

        fixture.device.inject_fault("stream underrun").unwrap();

        let expected = EngineError::new(ErrorKind::DeviceError, "stream underrun");
        assert_eq!(
            next_event(&mut events).await,
            EngineEvent::Error(expected.clone())
        );
        let received = tokio::task::spawn_blocking(move || rx.recv_timeout(EVENT_TIMEOUT))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, expected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_voice_publishes_error() {
        let fixture = Fixture::new(EngineSettings::default());
        let engine = &fixture.engine;
        let mut events = engine.subscribe();
        engine.load("glitch", fixture.wav("glitch.wav", 1000)).await.unwrap();
        engine.play("glitch", false).await.unwrap();

        let source_id = engine.inner.samples.read()["glitch"]
            .voice
            .as_ref()
            .unwrap()
            .source_id();
        engine.inner.handle_notification(Notification::Failed(
            source_id,
            "corrupt packet".to_string(),
        ));

        match next_event(&mut events).await {
            EngineEvent::Error(err) => {
                assert_eq!(err.kind, ErrorKind::DecodeError);
                assert!(err.reason.contains("glitch"));
                assert!(err.reason.contains("corrupt packet"));
            }
            event => panic!("unexpected event {:?}", event),
        }
        assert!(!engine.is_playing("glitch"));
        assert!(engine.is_loaded("glitch"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_oversized_event_capacity() {
        let fixture = Fixture::new(EngineSettings {
            event_capacity: usize::MAX,
            ..Default::default()
        });
        let mut events = fixture.engine.subscribe();
        fixture.engine.set_output_route(true);
        assert_eq!(
            next_event(&mut events).await,
            EngineEvent::RouteChanged(OutputRoute::Speaker)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_failure() {
        let device = Arc::new(mock::Device::get("mock-device"));
        device.set_fail_start(true);
        let result = SamplePlayerEngine::create(device, EngineSettings::default());
        assert_eq!(result.err().unwrap().kind(), ErrorKind::DeviceError);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drop_stops_voices() {
        let fixture = Fixture::new(EngineSettings::default());
        fixture
            .engine
            .load("tail", fixture.wav("tail.wav", 1000))
            .await
            .unwrap();
        fixture.engine.play("tail", true).await.unwrap();

        let device = fixture.device.clone();
        drop(fixture);
        device.render(1);
        eventually(
            || device.active_sources() == 0,
            "Voices survived the engine",
        );
    }
}
