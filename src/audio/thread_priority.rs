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
use tracing::{info, warn};

/// Default priority for the audio producer thread when BWSYNC_THREAD_PRIORITY is unset.
const DEFAULT_PRODUCER_THREAD_PRIORITY: u8 = 70;

fn parse_priority(value: Option<&str>) -> u8 {
    value
        .and_then(|v| v.trim().parse::<u8>().ok())
        .filter(|n| *n < 100)
        .unwrap_or(DEFAULT_PRODUCER_THREAD_PRIORITY)
}

/// Reads BWSYNC_THREAD_PRIORITY (0-99) once, before the producer thread starts.
pub fn producer_thread_priority() -> u8 {
    parse_priority(std::env::var("BWSYNC_THREAD_PRIORITY").ok().as_deref())
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

/// Returns whether we should attempt RT (SCHED_FIFO) scheduling for the producer thread.
/// Default: enabled. Opt out with BWSYNC_DISABLE_RT_AUDIO=1.
pub fn rt_audio_enabled() -> bool {
    !env_flag("BWSYNC_DISABLE_RT_AUDIO")
}

/// Raises the priority of the calling thread. Failures are logged and otherwise ignored;
/// audio still plays at normal priority.
pub fn configure_audio_thread_priority(priority: u8, rt_audio: bool) {
    let priority = match ThreadPriorityValue::try_from(priority) {
        Ok(priority) => priority,
        Err(e) => {
            warn!(priority, error = ?e, "Invalid audio thread priority");
            return;
        }
    };
    let tp = ThreadPriority::Crossplatform(priority);
    if let Err(e) = set_current_thread_priority(tp) {
        warn!(error = %e, "Failed to raise audio thread priority");
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
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for audio producer thread");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to set RT SCHED_FIFO for audio producer thread"
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

    #[test]
    fn test_parse_priority() {
        assert_eq!(70, parse_priority(None));
        assert_eq!(42, parse_priority(Some("42")));
        assert_eq!(99, parse_priority(Some(" 99 ")));
        assert_eq!(70, parse_priority(Some("100")));
        assert_eq!(70, parse_priority(Some("high")));
    }

    #[test]
    #[serial]
    fn test_rt_audio_flag() {
        std::env::remove_var("BWSYNC_DISABLE_RT_AUDIO");
        assert!(rt_audio_enabled());

        std::env::set_var("BWSYNC_DISABLE_RT_AUDIO", "yes");
        assert!(!rt_audio_enabled());

        std::env::set_var("BWSYNC_DISABLE_RT_AUDIO", "0");
        assert!(rt_audio_enabled());

        std::env::remove_var("BWSYNC_DISABLE_RT_AUDIO");
    }
}
