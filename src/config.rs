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
use std::path::Path;

mod audio;
mod error;
mod program;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::program::{ProgramFile, StageDuration, StageFile};

/// Loads a program file and builds the program and its options.
pub fn load_program(
    path: &Path,
) -> Result<(ProgramFile, crate::program::Program, crate::options::Options), ConfigError> {
    let file = ProgramFile::deserialize(path)?;
    let program = file.to_program()?;
    let options = file.to_options()?;
    Ok((file, program, options))
}
