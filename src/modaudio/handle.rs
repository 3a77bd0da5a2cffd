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

use slotmap::Key;

use super::pool::PoolKey;
use crate::audio::Sound;
use crate::mods::ModFileRef;

/// Whether an asset was loaded as a streamed track or a one-shot sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Stream,
    Sample,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Stream => write!(f, "stream"),
            Kind::Sample => write!(f, "sample"),
        }
    }
}

/// Opaque reference to a loaded asset. Invalid once the asset is destroyed
/// or the subsystem shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AudioHandle(PoolKey);

impl AudioHandle {
    pub(crate) fn new(key: PoolKey) -> AudioHandle {
        AudioHandle(key)
    }

    pub(crate) fn key(&self) -> PoolKey {
        self.0
    }
}

impl fmt::Display for AudioHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:?}", self.0.data())
    }
}

/// A loaded asset and its base engine sound.
pub(crate) struct ModAudioAsset {
    pub file: ModFileRef,
    pub kind: Kind,
    pub sound: Box<dyn Sound>,
}

impl ModAudioAsset {
    pub fn name(&self) -> &str {
        self.file.file().relative_path()
    }
}
