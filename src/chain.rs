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
use std::f64::consts::TAU;

use tracing::{error, trace};

use crate::automation::Param;
use crate::envelope::{AutomationEvent, EventKind};
use crate::options::{BeatMode, Options};
use crate::program::Program;

/// Time constant for output gain changes (fade in, volume and mute).
pub const FADE_TIME_CONSTANT: f64 = 0.05;

/// The level the output gain fades towards on stop.
pub const FADE_FLOOR: f32 = 0.0001;

/// A sine oscillator with an automatable frequency.
#[derive(Clone, Debug)]
pub struct Oscillator {
    frequency: Param,
    phase: f64,
}

impl Oscillator {
    pub fn new(hz: f64) -> Oscillator {
        Oscillator {
            frequency: Param::new(hz as f32),
            phase: 0.0,
        }
    }

    pub fn frequency(&mut self) -> &mut Param {
        &mut self.frequency
    }

    #[inline]
    fn next(&mut self, t: f64, sample_rate: f64) -> f32 {
        let hz = self.frequency.sample(t) as f64;
        let out = (self.phase * TAU).sin() as f32;
        self.phase = (self.phase + hz / sample_rate).fract();
        out
    }
}

/// The mode-specific part of the chain. The two modes have different graphs, so switching
/// modes means building a new chain.
#[derive(Clone, Debug)]
pub enum Voice {
    /// One carrier gated by a pulse gain.
    Pulsed { carrier: Oscillator, pulse_gain: Param },
    /// A fixed carrier on the left, a moving carrier on the right.
    DualChannel { left: Oscillator, right: Oscillator },
}

/// The signal chain a session or a rendering drives: voice, output gain, and the sample
/// clock that advances as frames are rendered.
#[derive(Clone, Debug)]
pub struct SignalChain {
    sample_rate: u32,
    frames: u64,
    voice: Voice,
    output_gain: Param,
    live: bool,
}

impl SignalChain {
    /// Builds the chain for the options' beat mode. In dual-channel mode the moving carrier
    /// starts at the frequency the program has at `offset`.
    pub fn new(
        program: &Program,
        options: &Options,
        sample_rate: u32,
        offset: f64,
        output_gain: f32,
    ) -> SignalChain {
        let voice = match options.beat_mode() {
            BeatMode::Pulsed => Voice::Pulsed {
                carrier: Oscillator::new(options.carrier_hz()),
                pulse_gain: Param::new(0.0),
            },
            BeatMode::DualChannel => Voice::DualChannel {
                left: Oscillator::new(options.carrier_hz()),
                right: Oscillator::new(options.carrier_hz() + program.beat_at(offset)),
            },
        };

        SignalChain {
            sample_rate,
            frames: 0,
            voice,
            output_gain: Param::new(output_gain),
            live: true,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Interleaved channels produced per frame.
    pub fn channels(&self) -> u16 {
        match self.voice {
            Voice::Pulsed { .. } => 1,
            Voice::DualChannel { .. } => 2,
        }
    }

    /// The chain's clock, in seconds of audio rendered so far.
    pub fn current_time(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    /// Returns false once the chain has been released.
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Releases the chain. Rendering produces silence from here on and automation is
    /// ignored.
    pub fn release(&mut self) {
        self.live = false;
    }

    /// Schedules an automation event. Against a released chain this is a no-op and
    /// returns false.
    pub fn apply(&mut self, event: &AutomationEvent) -> bool {
        if !self.live {
            trace!(time = event.time(), "Ignoring automation for released chain");
            return false;
        }

        match (&mut self.voice, event.kind()) {
            (Voice::Pulsed { pulse_gain, .. }, EventKind::GainRamp { from, to, end }) => {
                pulse_gain.set_value_at_time(from, event.time());
                pulse_gain.linear_ramp_to_value_at_time(to, end);
                true
            }
            (Voice::DualChannel { right, .. }, EventKind::FrequencySet { hz, end }) => {
                right.frequency().linear_ramp_to_value_at_time(hz as f32, end);
                true
            }
            (voice, kind) => {
                error!(
                    voice = format!("{:?}", voice),
                    event = format!("{:?}", kind),
                    "Automation event does not fit the chain"
                );
                false
            }
        }
    }

    /// Glides the output gain towards `target`, starting now.
    pub fn glide_output_gain(&mut self, target: f32) -> bool {
        if !self.live {
            return false;
        }
        let now = self.current_time();
        self.output_gain
            .set_target_at_time(target, now, FADE_TIME_CONSTANT);
        true
    }

    /// Drops all pending automation and starts fading the output out.
    pub fn fade_out(&mut self) -> bool {
        if !self.live {
            return false;
        }
        let now = self.current_time();
        match &mut self.voice {
            Voice::Pulsed { pulse_gain, .. } => pulse_gain.cancel_scheduled_values(now),
            Voice::DualChannel { right, .. } => right.frequency().cancel_scheduled_values(now),
        }
        self.output_gain.cancel_scheduled_values(now);
        self.output_gain
            .set_target_at_time(FADE_FLOOR, now, FADE_TIME_CONSTANT);
        true
    }

    /// Number of automation events still queued on the chain.
    pub fn pending(&self) -> usize {
        let voice = match &self.voice {
            Voice::Pulsed { pulse_gain, .. } => pulse_gain.pending(),
            Voice::DualChannel { right, .. } => right.frequency.pending(),
        };
        voice + self.output_gain.pending()
    }

    /// Renders interleaved frames into `output`, advancing the clock. Any trailing partial
    /// frame is left untouched.
    pub fn render(&mut self, output: &mut [f32]) {
        let channels = self.channels() as usize;
        let sample_rate = self.sample_rate as f64;

        if !self.live {
            let frames = output.len() / channels;
            output[..frames * channels].fill(0.0);
            self.frames += frames as u64;
            return;
        }

        for frame in output.chunks_exact_mut(channels) {
            let t = self.frames as f64 / sample_rate;
            let gain = self.output_gain.sample(t);
            match &mut self.voice {
                Voice::Pulsed {
                    carrier,
                    pulse_gain,
                } => {
                    let pulse = pulse_gain.sample(t);
                    frame[0] = carrier.next(t, sample_rate) * pulse * gain;
                }
                Voice::DualChannel { left, right } => {
                    frame[0] = left.next(t, sample_rate) * gain;
                    frame[1] = right.next(t, sample_rate) * gain;
                }
            }
            self.frames += 1;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::program::Stage;
    use crate::testutil::audio_test_utils::{calculate_rms, dominant_frequency};

    fn program() -> Program {
        Program::new(4.0, vec![Stage::new(4.0, 10.0)])
    }

    #[test]
    fn test_channels() {
        let pulsed = SignalChain::new(&program(), &Options::default(), 8000, 0.0, 1.0);
        assert_eq!(1, pulsed.channels());

        let options = Options::default().with_beat_mode(BeatMode::DualChannel);
        let dual = SignalChain::new(&program(), &options, 8000, 0.0, 1.0);
        assert_eq!(2, dual.channels());
    }

    #[test]
    fn test_clock_advances_with_rendering() {
        let mut chain = SignalChain::new(&program(), &Options::default(), 8000, 0.0, 1.0);
        assert_eq!(0.0, chain.current_time());
        let mut buffer = vec![0.0; 4000];
        chain.render(&mut buffer);
        assert_eq!(0.5, chain.current_time());
        assert_eq!(4000, chain.frames_rendered());
    }

    #[test]
    fn test_pulsed_silent_without_pulses() {
        let mut chain = SignalChain::new(&program(), &Options::default(), 8000, 0.0, 1.0);
        let mut buffer = vec![0.0; 800];
        chain.render(&mut buffer);
        assert!(buffer.iter().all(|sample| *sample == 0.0));
    }

    #[test]
    fn test_pulse_gates_carrier() {
        let mut chain = SignalChain::new(&program(), &Options::default(), 8000, 0.0, 1.0);
        chain.apply(&AutomationEvent::new(
            0.0,
            EventKind::GainRamp {
                from: 0.0,
                to: 1.0,
                end: 0.05,
            },
        ));
        chain.apply(&AutomationEvent::new(
            0.05,
            EventKind::GainRamp {
                from: 1.0,
                to: 0.0,
                end: 0.1,
            },
        ));

        let mut buffer = vec![0.0; 1600];
        chain.render(&mut buffer);
        assert!(calculate_rms(&buffer[0..800]) > 0.1);
        assert!(buffer[800..].iter().all(|sample| sample.abs() < 1e-6));
    }

    #[test]
    fn test_dual_channel_frequencies() {
        let options = Options::default().with_beat_mode(BeatMode::DualChannel);
        let mut chain = SignalChain::new(&program(), &options, 8000, 0.0, 1.0);
        let mut buffer = vec![0.0; 16000];
        chain.render(&mut buffer);

        let left: Vec<f32> = buffer.iter().step_by(2).copied().collect();
        let right: Vec<f32> = buffer.iter().skip(1).step_by(2).copied().collect();
        assert!((dominant_frequency(&left, 8000) - 400.0).abs() < 2.0);
        assert!((dominant_frequency(&right, 8000) - 404.0).abs() < 2.0);
    }

    #[test]
    fn test_mismatched_event_is_rejected() {
        let mut chain = SignalChain::new(&program(), &Options::default(), 8000, 0.0, 1.0);
        assert!(!chain.apply(&AutomationEvent::new(
            0.0,
            EventKind::FrequencySet { hz: 410.0, end: 0.1 },
        )));
    }

    #[test]
    fn test_released_chain_ignores_automation() {
        let mut chain = SignalChain::new(&program(), &Options::default(), 8000, 0.0, 1.0);
        chain.release();
        assert!(!chain.is_live());
        assert!(!chain.apply(&AutomationEvent::new(
            0.0,
            EventKind::GainRamp {
                from: 0.0,
                to: 1.0,
                end: 0.1,
            },
        )));
        assert!(!chain.glide_output_gain(1.0));
        assert!(!chain.fade_out());
        assert_eq!(0, chain.pending());

        let mut buffer = vec![1.0; 100];
        chain.render(&mut buffer);
        assert!(buffer.iter().all(|sample| *sample == 0.0));
        assert_eq!(100, chain.frames_rendered());
    }

    #[test]
    fn test_fade_out_cancels_pending_pulses() {
        let mut chain = SignalChain::new(&program(), &Options::default(), 8000, 0.0, 1.0);
        for index in 0..10 {
            let start = index as f64 * 0.25;
            chain.apply(&AutomationEvent::new(
                start,
                EventKind::GainRamp {
                    from: 0.0,
                    to: 1.0,
                    end: start + 0.0625,
                },
            ));
        }
        assert_eq!(20, chain.pending());
        assert!(chain.fade_out());
        // Only the fade itself remains.
        assert_eq!(1, chain.pending());
    }
}
