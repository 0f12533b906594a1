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
use std::fmt;

use crate::util::{duration_minutes_seconds, seconds};

/// The highest beat frequency a program can hold. Anything above it is clamped.
pub const MAX_BEAT_HZ: f64 = 20_000.0;

/// Non-finite frequencies become zero, everything else is clamped to [0, MAX_BEAT_HZ].
fn clamp_beat_hz(beat_hz: f64) -> f64 {
    if beat_hz.is_finite() {
        beat_hz.clamp(0.0, MAX_BEAT_HZ)
    } else {
        0.0
    }
}

/// One ramp segment of a program. The beat frequency glides linearly from the previous
/// anchor to `beat_hz`, arriving `duration_seconds` after the previous anchor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stage {
    beat_hz: f64,
    duration_seconds: f64,
}

impl Stage {
    /// Creates a new stage. Negative durations are clamped to zero and the beat frequency
    /// to [0, MAX_BEAT_HZ], with NaN and infinities treated as zero.
    pub fn new(beat_hz: f64, duration_seconds: f64) -> Stage {
        Stage {
            beat_hz: clamp_beat_hz(beat_hz),
            duration_seconds: duration_seconds.max(0.0),
        }
    }

    /// The beat frequency reached at the end of the stage.
    pub fn beat_hz(&self) -> f64 {
        self.beat_hz
    }

    /// How long the ramp takes.
    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }
}

/// A declarative beat frequency schedule: a start value followed by ordered ramps.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    start_beat_hz: f64,
    stages: Vec<Stage>,
}

impl Program {
    /// Creates a new program.
    pub fn new(start_beat_hz: f64, stages: Vec<Stage>) -> Program {
        Program {
            start_beat_hz: clamp_beat_hz(start_beat_hz),
            stages,
        }
    }

    /// The beat frequency at elapsed time zero.
    pub fn start_beat_hz(&self) -> f64 {
        self.start_beat_hz
    }

    /// The ramps, in the order they play.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// The sum of all stage durations.
    pub fn total_duration(&self) -> f64 {
        self.stages.iter().map(|stage| stage.duration_seconds).sum()
    }

    /// Returns the instantaneous beat frequency `elapsed` seconds into the program.
    ///
    /// Before the start the program reports its start value, and past the end it holds
    /// the last stage's value. A zero-length stage is a jump: at its instant the previous
    /// anchor is still reported, and the new value only shows once time moves past it.
    pub fn beat_at(&self, elapsed: f64) -> f64 {
        if elapsed <= 0.0 || elapsed.is_nan() {
            return self.start_beat_hz;
        }

        let mut stage_start = 0.0;
        let mut previous = self.start_beat_hz;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration_seconds;

            if elapsed <= stage_end {
                if stage.duration_seconds == 0.0 {
                    return previous;
                }
                let k = (elapsed - stage_start) / stage.duration_seconds;
                return previous + (stage.beat_hz - previous) * k;
            }

            stage_start = stage_end;
            previous = stage.beat_hz;
        }

        previous
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}Hz", self.start_beat_hz)?;
        for stage in &self.stages {
            write!(
                f,
                " -> {:.1}Hz ({})",
                stage.beat_hz,
                duration_minutes_seconds(seconds(stage.duration_seconds))
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn three_stage() -> Program {
        Program::new(
            8.0,
            vec![
                Stage::new(4.0, 900.0),
                Stage::new(10.0, 900.0),
                Stage::new(6.0, 300.0),
            ],
        )
    }

    #[test]
    fn test_before_start_reports_start_value() {
        let program = three_stage();
        for t in [0.0, -0.001, -1.0, -1e9, f64::NEG_INFINITY] {
            assert_eq!(8.0, program.beat_at(t));
        }
    }

    #[test]
    fn test_halfway_through_single_stage() {
        let program = Program::new(10.0, vec![Stage::new(5.0, 1800.0)]);
        assert!((program.beat_at(900.0) - 7.5).abs() < EPSILON);
    }

    #[test]
    fn test_stage_endpoints_are_exact() {
        let program = three_stage();
        let mut end = 0.0;
        for stage in program.stages() {
            end += stage.duration_seconds();
            assert!((program.beat_at(end) - stage.beat_hz()).abs() < EPSILON);
        }
    }

    #[test]
    fn test_continuous_across_boundaries() {
        let program = three_stage();
        for boundary in [900.0, 1800.0] {
            let before = program.beat_at(boundary - 1e-6);
            let after = program.beat_at(boundary + 1e-6);
            assert!((before - after).abs() < 1e-6, "jump at {}", boundary);
        }
    }

    #[test]
    fn test_holds_last_value() {
        let program = three_stage();
        let total = program.total_duration();
        assert_eq!(2100.0, total);
        for t in [total + 0.001, total + 60.0, 1e12] {
            assert_eq!(program.beat_at(total), program.beat_at(t));
        }
        assert_eq!(6.0, program.beat_at(total + 1.0));
    }

    #[test]
    fn test_zero_duration_stage_jumps_after_instant() {
        let program = Program::new(
            4.0,
            vec![
                Stage::new(4.0, 10.0),
                Stage::new(12.0, 0.0),
                Stage::new(12.0, 10.0),
            ],
        );

        // At the jump instant the previous anchor is still reported.
        assert_eq!(4.0, program.beat_at(10.0));
        assert!((program.beat_at(10.0 + 1e-9) - 12.0).abs() < EPSILON);
        assert_eq!(12.0, program.beat_at(15.0));
    }

    #[test]
    fn test_zero_duration_program() {
        let program = Program::new(6.0, vec![Stage::new(9.0, 0.0)]);
        assert_eq!(0.0, program.total_duration());
        assert_eq!(6.0, program.beat_at(0.0));
        assert_eq!(9.0, program.beat_at(0.5));
    }

    #[test]
    fn test_no_stages() {
        let program = Program::new(7.0, vec![]);
        assert_eq!(7.0, program.beat_at(100.0));
    }

    #[test]
    fn test_negative_inputs_clamped() {
        let stage = Stage::new(-3.0, -10.0);
        assert_eq!(0.0, stage.beat_hz());
        assert_eq!(0.0, stage.duration_seconds());
    }

    #[test]
    fn test_unusable_beats_sanitized() {
        assert_eq!(0.0, Stage::new(f64::INFINITY, 1.0).beat_hz());
        assert_eq!(0.0, Stage::new(f64::NAN, 1.0).beat_hz());
        assert_eq!(MAX_BEAT_HZ, Stage::new(1e300, 1.0).beat_hz());

        let program = Program::new(f64::INFINITY, vec![Stage::new(1e300, 10.0)]);
        assert_eq!(0.0, program.start_beat_hz());
        assert_eq!(MAX_BEAT_HZ, program.beat_at(10.0));
        assert!(program.beat_at(5.0).is_finite());
    }

    #[test]
    fn test_display() {
        let program = Program::new(10.0, vec![Stage::new(5.0, 1800.0)]);
        assert_eq!("10.0Hz -> 5.0Hz (30:00)", program.to_string());
    }
}
