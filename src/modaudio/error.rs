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
use super::handle::Kind;
use crate::audio::EngineError;

/// Errors returned by the mod audio subsystem. Every error leaves prior state unchanged.
#[derive(Debug, thiserror::Error)]
pub enum ModAudioError {
    #[error("Could not find audio file '{0}'")]
    NotFound(String),

    #[error("Tried to load audio file with invalid file type: '{0}'")]
    UnsupportedFormat(String),

    #[error("Failed to initialize audio for '{target}': {source}")]
    EngineInitFailed {
        target: String,
        #[source]
        source: EngineError,
    },

    #[error("Tried to {action} a {found} as a {expected}")]
    KindMismatch {
        action: &'static str,
        expected: Kind,
        found: Kind,
    },

    #[error("Tried to {action} an unloaded audio handle")]
    InvalidHandle { action: &'static str },
}
