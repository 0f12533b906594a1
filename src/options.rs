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
use std::{error::Error, fmt, str::FromStr};

pub const DEFAULT_CARRIER_HZ: f64 = 400.0;
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// How the beat is made audible.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BeatMode {
    /// One carrier whose gain is pulsed at the beat rate.
    Pulsed,
    /// Two carriers, one per ear, offset from each other by the beat frequency.
    DualChannel,
}

impl BeatMode {
    /// Number of output channels the mode renders.
    pub fn channels(&self) -> u16 {
        match self {
            BeatMode::Pulsed => 1,
            BeatMode::DualChannel => 2,
        }
    }

    /// The traditional name of the mode, used for export file names.
    pub fn export_name(&self) -> &'static str {
        match self {
            BeatMode::Pulsed => "isochronic",
            BeatMode::DualChannel => "binaural",
        }
    }
}

impl FromStr for BeatMode {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pulsed" | "isochronic" => Ok(BeatMode::Pulsed),
            "dual-channel" | "dual_channel" | "binaural" => Ok(BeatMode::DualChannel),
            _ => Err(format!("unsupported beat mode: {}", s).into()),
        }
    }
}

impl fmt::Display for BeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeatMode::Pulsed => write!(f, "pulsed"),
            BeatMode::DualChannel => write!(f, "dual-channel"),
        }
    }
}

/// What live playback does once the program has run its course.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndAction {
    /// Keep playing the final beat frequency until stopped.
    Hold,
    /// Stop on its own.
    Stop,
}

impl FromStr for EndAction {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hold" => Ok(EndAction::Hold),
            "stop" => Ok(EndAction::Stop),
            _ => Err(format!("unsupported end action: {}", s).into()),
        }
    }
}

impl fmt::Display for EndAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndAction::Hold => write!(f, "hold"),
            EndAction::Stop => write!(f, "stop"),
        }
    }
}

/// Per-session rendering options. Read-only once a session has started, except for the
/// volume and mute controls.
#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    carrier_hz: f64,
    beat_mode: BeatMode,
    end_action: EndAction,
    volume: f32,
    muted: bool,
    sample_rate: u32,
}

impl Options {
    /// Creates a new set of options. The volume is clamped to [0, 1].
    pub fn new(
        carrier_hz: f64,
        beat_mode: BeatMode,
        end_action: EndAction,
        volume: f32,
        muted: bool,
        sample_rate: u32,
    ) -> Options {
        Options {
            carrier_hz,
            beat_mode,
            end_action,
            volume: volume.clamp(0.0, 1.0),
            muted,
            sample_rate,
        }
    }

    /// Returns a copy with a different beat mode.
    pub fn with_beat_mode(mut self, beat_mode: BeatMode) -> Options {
        self.beat_mode = beat_mode;
        self
    }

    /// Returns a copy with a different end action.
    pub fn with_end_action(mut self, end_action: EndAction) -> Options {
        self.end_action = end_action;
        self
    }

    /// Returns a copy with a different sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Options {
        self.sample_rate = sample_rate;
        self
    }

    pub fn carrier_hz(&self) -> f64 {
        self.carrier_hz
    }

    pub fn beat_mode(&self) -> BeatMode {
        self.beat_mode
    }

    pub fn end_action(&self) -> EndAction {
        self.end_action
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The output gain the chain should settle at.
    pub fn target_gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    pub(crate) fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub(crate) fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }
}

impl Default for Options {
    fn default() -> Self {
        Options::new(
            DEFAULT_CARRIER_HZ,
            BeatMode::Pulsed,
            EndAction::Hold,
            1.0,
            false,
            DEFAULT_SAMPLE_RATE,
        )
    }
}
