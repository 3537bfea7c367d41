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
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::info;

/// Default priority for the audio threads when SAMPLEPLAYER_THREAD_PRIORITY is unset.
const DEFAULT_AUDIO_THREAD_PRIORITY: u8 = 70;

/// Reads SAMPLEPLAYER_THREAD_PRIORITY (0-99) once, before the audio threads are spawned.
pub fn audio_thread_priority() -> ThreadPriority {
    std::env::var("SAMPLEPLAYER_THREAD_PRIORITY")
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|n| *n < 100)
        .or(Some(DEFAULT_AUDIO_THREAD_PRIORITY))
        .and_then(|n| ThreadPriorityValue::try_from(n).ok())
        .map(ThreadPriority::Crossplatform)
        .unwrap_or(ThreadPriority::Max)
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Returns whether we should attempt RT (SCHED_FIFO) scheduling for the audio threads.
/// Default: enabled. Opt out with SAMPLEPLAYER_DISABLE_RT_AUDIO=1.
pub fn rt_audio_enabled() -> bool {
    !env_flag("SAMPLEPLAYER_DISABLE_RT_AUDIO")
}

/// Raises the calling thread's priority. Failures are logged and otherwise ignored; playback
/// still works at normal priority.
pub fn configure_audio_thread_priority(priority: ThreadPriority, rt_audio: bool) {
    if let Err(e) = set_current_thread_priority(priority) {
        tracing::debug!(error = ?e, "Unable to raise audio thread priority");
    }

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            priority,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for audio thread");
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to set RT SCHED_FIFO for audio thread"
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = rt_audio;
}

#[cfg(test)]
mod test {
    use serial_test::serial;

    use super::*;

    fn crossplatform(n: u8) -> ThreadPriority {
        ThreadPriority::Crossplatform(ThreadPriorityValue::try_from(n).unwrap())
    }

    #[test]
    #[serial]
    fn test_audio_thread_priority_from_env() {
        std::env::set_var("SAMPLEPLAYER_THREAD_PRIORITY", "42");
        assert_eq!(audio_thread_priority(), crossplatform(42));

        std::env::set_var("SAMPLEPLAYER_THREAD_PRIORITY", "150");
        assert_eq!(
            audio_thread_priority(),
            crossplatform(DEFAULT_AUDIO_THREAD_PRIORITY)
        );

        std::env::set_var("SAMPLEPLAYER_THREAD_PRIORITY", "loud");
        assert_eq!(
            audio_thread_priority(),
            crossplatform(DEFAULT_AUDIO_THREAD_PRIORITY)
        );

        std::env::remove_var("SAMPLEPLAYER_THREAD_PRIORITY");
        assert_eq!(
            audio_thread_priority(),
            crossplatform(DEFAULT_AUDIO_THREAD_PRIORITY)
        );
    }

    #[test]
    #[serial]
    fn test_rt_audio_enabled() {
        std::env::remove_var("SAMPLEPLAYER_DISABLE_RT_AUDIO");
        assert!(rt_audio_enabled());

        for value in ["1", "true", "YES", "on"] {
            std::env::set_var("SAMPLEPLAYER_DISABLE_RT_AUDIO", value);
            assert!(!rt_audio_enabled());
        }

        std::env::set_var("SAMPLEPLAYER_DISABLE_RT_AUDIO", "0");
        assert!(rt_audio_enabled());
        std::env::remove_var("SAMPLEPLAYER_DISABLE_RT_AUDIO");
    }
}
