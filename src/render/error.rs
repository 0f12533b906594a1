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

/// Why an offline rendering failed. No partial output is left behind in any case.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Cannot render a program with no duration")]
    EmptyProgram,

    #[error("Not enough memory to render {samples} samples")]
    OutOfMemory { samples: usize },

    #[error("Unable to write rendering: {0}")]
    Io(#[from] std::io::Error),
}
