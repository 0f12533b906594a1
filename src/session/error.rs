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
use super::Phase;

/// Errors a session reports to its caller.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The output could not be set up. The session is left as it was, so the caller may
    /// retry.
    #[error("Could not start playback: {0}")]
    CouldNotStart(String),

    #[error("Cannot {operation} while {phase}")]
    InvalidTransition {
        phase: Phase,
        operation: &'static str,
    },
}
