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
use glam::Vec3;
use tracing::{debug, error};

use super::{AudioHandle, Kind, ModAudio, ModAudioError};
use crate::config;

/// Master and per-category volume levels, each in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeLevels {
    master: f32,
    music: f32,
    sfx: f32,
}

impl Default for VolumeLevels {
    fn default() -> Self {
        VolumeLevels {
            master: 1.0,
            music: 1.0,
            sfx: 1.0,
        }
    }
}

fn clamp_level(level: f32) -> f32 {
    if level.is_nan() {
        return 0.0;
    }
    level.clamp(0.0, 1.0)
}

impl VolumeLevels {
    pub fn from_config(config: &config::Volume) -> VolumeLevels {
        VolumeLevels {
            master: config.master(),
            music: config.music(),
            sfx: config.sfx(),
        }
    }

    pub fn master(&self) -> f32 {
        self.master
    }

    pub fn music(&self) -> f32 {
        self.music
    }

    pub fn sfx(&self) -> f32 {
        self.sfx
    }

    pub fn set_master(&mut self, level: f32) {
        self.master = clamp_level(level);
    }

    pub fn set_music(&mut self, level: f32) {
        self.music = clamp_level(level);
    }

    pub fn set_sfx(&mut self, level: f32) {
        self.sfx = clamp_level(level);
    }

    /// Engine volume for a stream played at `volume`.
    pub fn music_volume(&self, volume: f32) -> f32 {
        self.master * self.music * volume
    }

    /// Engine volume for a sample played at `volume` with the given distance intensity.
    pub fn sfx_volume(&self, volume: f32, intensity: f32) -> f32 {
        self.master * self.sfx * volume * intensity
    }
}

impl ModAudio {
    /// Plays a stream. It restarts from the beginning when `restart` is set or
    /// when it is not currently playing.
    pub fn stream_play(
        &mut self,
        handle: AudioHandle,
        restart: bool,
        volume: f32,
    ) -> Result<(), ModAudioError> {
        let asset = self.asset(handle, Kind::Stream, "play")?;
        asset.sound.set_volume(self.volumes.music_volume(volume));
        if restart || !asset.sound.is_playing() {
            asset.sound.seek_to_frame(0);
        }
        asset.sound.start();
        debug!(path = asset.name(), restart, volume, "Stream playing");
        Ok(())
    }

    /// Stops a stream where it is.
    pub fn stream_pause(&mut self, handle: AudioHandle) -> Result<(), ModAudioError> {
        self.asset(handle, Kind::Stream, "pause")?.sound.stop();
        Ok(())
    }

    /// Stops a stream and rewinds it.
    pub fn stream_stop(&mut self, handle: AudioHandle) -> Result<(), ModAudioError> {
        let asset = self.asset(handle, Kind::Stream, "stop")?;
        asset.sound.stop();
        asset.sound.seek_to_frame(0);
        Ok(())
    }

    /// Playback time of a stream in seconds.
    pub fn stream_position(&self, handle: AudioHandle) -> Result<f32, ModAudioError> {
        Ok(self
            .asset(handle, Kind::Stream, "getpos")?
            .sound
            .time()
            .as_secs_f32())
    }

    /// Seeks a stream to a fraction of its length.
    pub fn stream_set_position(
        &mut self,
        handle: AudioHandle,
        fraction: f32,
    ) -> Result<(), ModAudioError> {
        let sound = &self.asset(handle, Kind::Stream, "setpos")?.sound;
        let frame = (sound.length_frames() as f64 * fraction.clamp(0.0, 1.0) as f64) as u64;
        sound.seek_to_frame(frame);
        Ok(())
    }

    pub fn stream_looping(&self, handle: AudioHandle) -> Result<bool, ModAudioError> {
        Ok(self.asset(handle, Kind::Stream, "getloop")?.sound.is_looping())
    }

    pub fn stream_set_looping(
        &mut self,
        handle: AudioHandle,
        looping: bool,
    ) -> Result<(), ModAudioError> {
        self.asset(handle, Kind::Stream, "setloop")?
            .sound
            .set_looping(looping);
        Ok(())
    }

    /// Playback pitch of a stream, 1.0 being the original speed.
    pub fn stream_frequency(&self, handle: AudioHandle) -> Result<f32, ModAudioError> {
        Ok(self.asset(handle, Kind::Stream, "getfreq")?.sound.pitch())
    }

    pub fn stream_set_frequency(
        &mut self,
        handle: AudioHandle,
        frequency: f32,
    ) -> Result<(), ModAudioError> {
        self.asset(handle, Kind::Stream, "setfreq")?
            .sound
            .set_pitch(frequency);
        Ok(())
    }

    /// The engine volume of a stream, levels included.
    pub fn stream_volume(&self, handle: AudioHandle) -> Result<f32, ModAudioError> {
        Ok(self.asset(handle, Kind::Stream, "getvol")?.sound.volume())
    }

    pub fn stream_set_volume(
        &mut self,
        handle: AudioHandle,
        volume: f32,
    ) -> Result<(), ModAudioError> {
        let level = self.volumes.music_volume(volume);
        self.asset(handle, Kind::Stream, "setvol")?
            .sound
            .set_volume(level);
        Ok(())
    }

    pub fn stream_destroy(&mut self, handle: AudioHandle) -> Result<(), ModAudioError> {
        self.destroy(handle, Kind::Stream)
    }

    /// Plays a sample at a world position. A sample that is already playing
    /// gets an overlapping copy instead of being restarted.
    pub fn sample_play(
        &mut self,
        handle: AudioHandle,
        position: Vec3,
        volume: f32,
    ) -> Result<(), ModAudioError> {
        let asset = self.asset(handle, Kind::Sample, "play")?;

        let (distance, pan) = self.spatializer.locate(self.listener.as_ref(), position);
        let intensity = self.spatializer.intensity(distance);
        let level = self.volumes.sfx_volume(volume, intensity);

        if !asset.sound.is_playing() {
            asset.sound.set_volume(level);
            asset.sound.set_pan(pan);
            asset.sound.start();
            debug!(path = asset.name(), level, pan, "Sample playing");
            return Ok(());
        }

        let copy = self
            .reclaimer
            .spawn_copy(handle, asset.sound.as_ref())
            .map_err(|source| {
                error!(path = asset.name(), err = %source, "Failed to copy sample");
                ModAudioError::EngineInitFailed {
                    target: asset.name().to_string(),
                    source,
                }
            })?;
        copy.set_volume(level);
        copy.set_pan(pan);
        copy.start();
        debug!(path = asset.name(), level, pan, "Sample copy playing");
        Ok(())
    }

    /// Destroys every copy of the sample, then stops and rewinds it.
    pub fn sample_stop(&mut self, handle: AudioHandle) -> Result<(), ModAudioError> {
        self.asset(handle, Kind::Sample, "stop")?;
        self.stop_copies(handle);
        let asset = self.asset(handle, Kind::Sample, "stop")?;
        asset.sound.stop();
        asset.sound.seek_to_frame(0);
        Ok(())
    }

    pub fn sample_destroy(&mut self, handle: AudioHandle) -> Result<(), ModAudioError> {
        self.destroy(handle, Kind::Sample)
    }
}
