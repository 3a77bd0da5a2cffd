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

//! Mod audio engine.
//!
//! Loads user-supplied audio assets from the active mod (streamed tracks and
//! one-shot samples), plays them through an audio engine, and reclaims the
//! overlapping sample copies whose completion is reported from the engine's
//! own thread.

pub mod audio;
pub mod config;
pub mod modaudio;
pub mod mods;
pub mod spatial;

#[cfg(test)]
mod testutil;

pub use modaudio::{AudioHandle, Kind, LifecycleState, ModAudio, ModAudioError};
