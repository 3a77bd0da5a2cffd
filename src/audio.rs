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
use std::{fmt, path::Path, sync::Arc, time::Duration};

use crate::config;

pub mod buffered;
pub mod cpal;
pub mod decode;
pub mod mixer;
pub mod mock;
mod thread_priority;

/// Invoked by the engine, from its own thread, when a one-shot sound reaches its end.
pub type EndCallback = Box<dyn FnOnce() + Send + 'static>;

/// Mode flags passed to the engine when a sound is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundFlags {
    /// Decode incrementally while playing instead of up front.
    pub stream: bool,
    /// Decode the whole file into memory at load time.
    pub decode: bool,
    /// Ignore pitch changes.
    pub no_pitch: bool,
    /// Skip engine-side spatialization. Panning for samples is computed by the caller.
    pub no_spatialization: bool,
}

impl SoundFlags {
    /// Flags for long streamed tracks: low memory, incremental decode.
    pub const STREAM: SoundFlags = SoundFlags {
        stream: true,
        decode: false,
        no_pitch: false,
        no_spatialization: true,
    };

    /// Flags for one-shot samples: fully pre-decoded, fixed pitch.
    pub const SAMPLE: SoundFlags = SoundFlags {
        stream: false,
        decode: true,
        no_pitch: true,
        no_spatialization: true,
    };
}

/// Errors reported by an audio engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio file error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("Unsupported audio data: {0}")]
    Unsupported(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Audio engine is not running")]
    NotRunning,
}

/// An engine-resident sound. Dropping the sound uninitializes it.
///
/// Sounds are shared between the thread that owns them and the engine's
/// playback thread, so every operation takes `&self`.
pub trait Sound: Send + Sync {
    /// Starts (or resumes) playback. A sound sitting at its end restarts from the beginning.
    fn start(&self);

    /// Stops playback without moving the cursor.
    fn stop(&self);

    /// Returns true while the sound is audible.
    fn is_playing(&self) -> bool;

    /// Moves the playback cursor to the given frame.
    fn seek_to_frame(&self, frame: u64);

    /// The current playback cursor in frames.
    fn cursor_frames(&self) -> u64;

    /// The total length in frames, or 0 when unknown.
    fn length_frames(&self) -> u64;

    /// The sample rate of the underlying data.
    fn sample_rate(&self) -> u32;

    /// Time elapsed at the current cursor.
    fn time(&self) -> Duration {
        let sample_rate = self.sample_rate();
        if sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.cursor_frames() as f64 / sample_rate as f64)
    }

    fn volume(&self) -> f32;
    fn set_volume(&self, volume: f32);

    /// Stereo balance in [-1, 1].
    fn pan(&self) -> f32;
    fn set_pan(&self, pan: f32);

    fn pitch(&self) -> f32;
    fn set_pitch(&self, pitch: f32);

    fn is_looping(&self) -> bool;
    fn set_looping(&self, looping: bool);

    /// Registers the completion notification. The engine calls it at most once,
    /// from its own thread, when a non-looping sound reaches its end.
    fn set_end_callback(&self, callback: EndCallback);

    /// Creates an independent sound over the same data with the same settings.
    fn duplicate(&self, flags: SoundFlags) -> Result<Box<dyn Sound>, EngineError>;
}

/// An audio engine capable of turning files into sounds.
pub trait Engine: fmt::Display + Send + Sync {
    /// Initializes a sound from the given file.
    fn load(&self, path: &Path, flags: SoundFlags) -> Result<Box<dyn Sound>, EngineError>;
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, EngineError> {
    cpal::list_devices()
}

/// Creates the engine described by the given configuration.
pub fn create_engine(config: &config::Engine) -> Result<Arc<dyn Engine>, EngineError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Engine::get(device)));
    };

    Ok(Arc::new(cpal::Engine::open(config)?))
}
