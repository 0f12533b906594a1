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
//! The built-in programs, numbered from 1.

use crate::config::{ProgramFile, StageFile};

/// Number of built-in presets.
pub const PRESET_COUNT: usize = 5;

/// Returns the built-in preset with the given 1-based index.
pub fn get(index: usize) -> Option<ProgramFile> {
    let preset = match index {
        1 => ProgramFile::new(
            "Preset 1",
            "A standard default preset.",
            7.0,
            vec![StageFile::new(7.0, "30m")],
        ),
        2 => ProgramFile::new(
            "Preset 2",
            "From 10Hz down to 5Hz over 30 minutes.",
            10.0,
            vec![StageFile::new(5.0, "30m")],
        ),
        3 => ProgramFile::new(
            "Preset 3",
            "From 4Hz up to 8Hz over 45 minutes.",
            4.0,
            vec![StageFile::new(8.0, "45m")],
        ),
        4 => ProgramFile::new(
            "Preset 4",
            "Low carrier, short session.",
            6.0,
            vec![StageFile::new(12.0, "20m")],
        )
        .with_carrier_hz(200.0),
        5 => ProgramFile::new(
            "Preset 5",
            "High carrier, multi-stage session.",
            8.0,
            vec![StageFile::new(4.0, "15m"), StageFile::new(10.0, "15m")],
        )
        .with_carrier_hz(600.0),
        _ => return None,
    };
    Some(preset)
}

/// Returns every built-in preset in order.
pub fn all() -> Vec<ProgramFile> {
    (1..=PRESET_COUNT).filter_map(get).collect()
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_all_presets_are_valid() -> Result<(), Box<dyn Error>> {
        let presets = all();
        assert_eq!(PRESET_COUNT, presets.len());
        for preset in presets {
            let program = preset.to_program()?;
            assert!(program.total_duration() > 0.0, "{} is empty", preset.name());
            preset.to_options()?;
        }
        Ok(())
    }

    #[test]
    fn test_out_of_range() {
        assert!(get(0).is_none());
        assert!(get(PRESET_COUNT + 1).is_none());
    }

    #[test]
    fn test_preset_ramps() -> Result<(), Box<dyn Error>> {
        let program = get(2).ok_or("missing preset")?.to_program()?;
        assert_eq!(1800.0, program.total_duration());
        assert_eq!(10.0, program.beat_at(0.0));
        assert!((program.beat_at(900.0) - 7.5).abs() < 1e-9);
        assert_eq!(5.0, program.beat_at(1800.0));

        let program = get(5).ok_or("missing preset")?.to_program()?;
        assert_eq!(1800.0, program.total_duration());
        assert_eq!(4.0, program.beat_at(900.0));
        assert_eq!(10.0, program.beat_at(1800.0));

        let options = get(4).ok_or("missing preset")?.to_options()?;
        assert_eq!(200.0, options.carrier_hz());
        Ok(())
    }
}
