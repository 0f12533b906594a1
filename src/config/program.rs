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
use std::{fs, path::Path, str::FromStr};

use config::{Config, File, FileFormat};
use duration_string::DurationString;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ConfigError;
use crate::options::{BeatMode, EndAction, Options, DEFAULT_CARRIER_HZ, DEFAULT_SAMPLE_RATE};
use crate::program::{Program, Stage, MAX_BEAT_HZ};

const DEFAULT_START_BEAT_HZ: f64 = 7.0;
const DEFAULT_NAME: &str = "Untitled";

/// A stage duration, either a duration string ("30m", "1h30m") or a number of seconds.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum StageDuration {
    Seconds(f64),
    Text(String),
}

impl StageDuration {
    /// Returns the duration in seconds.
    pub fn seconds(&self) -> Result<f64, ConfigError> {
        match self {
            StageDuration::Seconds(seconds) if seconds.is_finite() && *seconds >= 0.0 => {
                Ok(*seconds)
            }
            StageDuration::Seconds(seconds) => Err(ConfigError::InvalidDuration {
                value: seconds.to_string(),
                reason: "must be a non-negative number of seconds".to_string(),
            }),
            StageDuration::Text(text) => {
                let text = text.trim();
                if let Ok(seconds) = text.parse::<f64>() {
                    return StageDuration::Seconds(seconds).seconds();
                }
                DurationString::from_string(text.to_string())
                    .map(|duration| std::time::Duration::from(duration).as_secs_f64())
                    .map_err(|e| ConfigError::InvalidDuration {
                        value: text.to_string(),
                        reason: e.to_string(),
                    })
            }
        }
    }
}

/// A YAML representation of a program stage.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct StageFile {
    /// The beat frequency reached at the end of the stage.
    beat_hz: f64,
    /// How long the ramp takes.
    duration: StageDuration,
}

impl StageFile {
    pub fn new(beat_hz: f64, duration: &str) -> StageFile {
        StageFile {
            beat_hz,
            duration: StageDuration::Text(duration.to_string()),
        }
    }

    fn to_stage(&self, max_beat_hz: f64) -> Result<Stage, ConfigError> {
        let beat_hz = check_beat_hz("stages.beat_hz", self.beat_hz, max_beat_hz)?;
        Ok(Stage::new(beat_hz, self.duration.seconds()?))
    }
}

/// Beat frequencies must be non-negative and no higher than `max_beat_hz`.
fn check_beat_hz(
    field: &'static str,
    beat_hz: f64,
    max_beat_hz: f64,
) -> Result<f64, ConfigError> {
    if !beat_hz.is_finite() || beat_hz < 0.0 {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{} is not a non-negative frequency", beat_hz),
        });
    }
    if beat_hz > max_beat_hz {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{} is above the {}Hz limit", beat_hz, max_beat_hz),
        });
    }
    Ok(beat_hz)
}

/// A YAML representation of a program and the options it plays with.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct ProgramFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    carrier_hz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_beat_hz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    beat_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    muted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<u32>,
    #[serde(default)]
    stages: Vec<StageFile>,
}

impl ProgramFile {
    /// Creates a program file with every option left at its default.
    pub fn new(name: &str, description: &str, start_beat_hz: f64, stages: Vec<StageFile>) -> Self {
        ProgramFile {
            name: Some(name.to_string()),
            description: Some(description.to_string()),
            start_beat_hz: Some(start_beat_hz),
            stages,
            ..Default::default()
        }
    }

    pub fn with_carrier_hz(mut self, carrier_hz: f64) -> Self {
        self.carrier_hz = Some(carrier_hz);
        self
    }

    /// Deserializes a file from the path into a program file.
    pub fn deserialize(path: &Path) -> Result<ProgramFile, ConfigError> {
        debug!(path = %path.display(), "Loading program file");
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<ProgramFile>()?)
    }

    /// Parses a program file from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<ProgramFile, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<ProgramFile>()?)
    }

    /// Serializes the program file to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yml::to_string(self)?)
    }

    /// Serialize and save the program file to the given path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_NAME)
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }

    /// Builds the program.
    pub fn to_program(&self) -> Result<Program, ConfigError> {
        // Beats can't be faster than the output can represent.
        let nyquist = self
            .sample_rate
            .filter(|sample_rate| *sample_rate > 0)
            .unwrap_or(DEFAULT_SAMPLE_RATE) as f64
            / 2.0;
        let max_beat_hz = nyquist.min(MAX_BEAT_HZ);

        let start_beat_hz = check_beat_hz(
            "start_beat_hz",
            self.start_beat_hz.unwrap_or(DEFAULT_START_BEAT_HZ),
            max_beat_hz,
        )?;

        let stages = self
            .stages
            .iter()
            .map(|stage| stage.to_stage(max_beat_hz))
            .collect::<Result<Vec<Stage>, ConfigError>>()?;
        Ok(Program::new(start_beat_hz, stages))
    }

    /// Builds the playback and rendering options.
    pub fn to_options(&self) -> Result<Options, ConfigError> {
        let carrier_hz = self.carrier_hz.unwrap_or(DEFAULT_CARRIER_HZ);
        if !carrier_hz.is_finite() || carrier_hz <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "carrier_hz",
                reason: format!("{} is not a positive frequency", carrier_hz),
            });
        }

        let volume = self.volume.unwrap_or(1.0);
        if !(0.0..=1.0).contains(&volume) {
            return Err(ConfigError::Invalid {
                field: "volume",
                reason: format!("{} is outside [0, 1]", volume),
            });
        }

        let sample_rate = self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        if sample_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "sample_rate",
                reason: "must be positive".to_string(),
            });
        }

        let beat_mode = match &self.beat_mode {
            Some(beat_mode) => BeatMode::from_str(beat_mode).map_err(|e| ConfigError::Invalid {
                field: "beat_mode",
                reason: e.to_string(),
            })?,
            None => BeatMode::Pulsed,
        };
        let end_action = match &self.end_action {
            Some(end_action) => {
                EndAction::from_str(end_action).map_err(|e| ConfigError::Invalid {
                    field: "end_action",
                    reason: e.to_string(),
                })?
            }
            None => EndAction::Hold,
        };

        Ok(Options::new(
            carrier_hz,
            beat_mode,
            end_action,
            volume,
            self.muted.unwrap_or(false),
            sample_rate,
        ))
    }
}
