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
//! The mod audio subsystem.
//!
//! Assets are loaded from the active mod as either streams (long tracks,
//! decoded while playing) or samples (short effects, decoded up front). A
//! sample that is played again while still sounding gets an independent copy
//! so that plays overlap; copies are reclaimed on the main thread once the
//! engine reports that they finished.
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, span, warn, Level};

use crate::audio::{self, Engine, EngineError, SoundFlags};
use crate::config::Settings;
use crate::mods::Mod;
use crate::spatial::{Listener, Spatializer};

mod copies;
mod error;
mod handle;
mod playback;
mod pool;
mod registry;

#[cfg(test)]
mod tests;

use self::copies::{Reclaimer, SampleCopy};
use self::handle::ModAudioAsset;
use self::pool::Pool;
use self::registry::Registry;

pub use self::error::ModAudioError;
pub use self::handle::{AudioHandle, Kind};
pub use self::playback::VolumeLevels;
pub use self::registry::{is_supported_format, SUPPORTED_EXTENSIONS};

/// Lifecycle of the subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Active,
    ShuttingDown,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Uninitialized => write!(f, "uninitialized"),
            LifecycleState::Active => write!(f, "active"),
            LifecycleState::ShuttingDown => write!(f, "shutting down"),
        }
    }
}

/// Owns every loaded asset, the engine, and the copy reclamation state.
///
/// All methods run on the main thread. Only the reclaimer is shared with the
/// engine's callback thread.
pub struct ModAudio {
    state: LifecycleState,
    engine: Option<Arc<dyn Engine>>,
    pool: Pool<ModAudioAsset>,
    registry: Registry,
    reclaimer: Arc<Reclaimer>,
    /// Reused by every drain so the pending list swap never allocates.
    reclaim_scratch: Vec<SampleCopy>,
    active_mod: Option<Arc<Mod>>,
    volumes: VolumeLevels,
    spatializer: Spatializer,
    listener: Option<Listener>,
}

impl Default for ModAudio {
    fn default() -> Self {
        ModAudio::new()
    }
}

impl ModAudio {
    /// Creates an uninitialized subsystem. Call `init` before loading anything.
    pub fn new() -> ModAudio {
        ModAudio {
            state: LifecycleState::Uninitialized,
            engine: None,
            pool: Pool::new(),
            registry: Registry::default(),
            reclaimer: Arc::new(Reclaimer::default()),
            reclaim_scratch: Vec::new(),
            active_mod: None,
            volumes: VolumeLevels::default(),
            spatializer: Spatializer::default(),
            listener: None,
        }
    }

    /// Creates an active subsystem around an existing engine.
    pub fn with_engine(engine: Arc<dyn Engine>, settings: &Settings) -> ModAudio {
        let mut mod_audio = ModAudio::new();
        mod_audio.apply_settings(settings);
        info!(engine = %engine, "Mod audio initialized");
        mod_audio.engine = Some(engine);
        mod_audio.state = LifecycleState::Active;
        mod_audio
    }

    fn apply_settings(&mut self, settings: &Settings) {
        self.volumes = VolumeLevels::from_config(settings.volume());
        self.spatializer = Spatializer::new(settings.spatial());
    }

    /// Creates the engine. An engine failure is logged and not retried; the
    /// subsystem then stays uninitialized and loads report `EngineInitFailed`.
    pub fn init(&mut self, settings: &Settings) {
        if self.state != LifecycleState::Uninitialized || self.engine.is_some() {
            warn!(state = %self.state, "Mod audio already initialized");
            return;
        }
        let span = span!(Level::INFO, "mod audio init");
        let _enter = span.enter();

        self.apply_settings(settings);
        match audio::create_engine(settings.engine()) {
            Ok(engine) => {
                info!(engine = %engine, "Mod audio initialized");
                self.engine = Some(engine);
                self.state = LifecycleState::Active;
            }
            Err(e) => {
                error!(err = %e, device = settings.engine().device(), "Failed to initialize audio engine");
            }
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Sets the mod that asset paths are resolved against.
    pub fn set_active_mod(&mut self, active_mod: Option<Arc<Mod>>) {
        if let Some(active_mod) = active_mod.as_ref() {
            debug!(name = active_mod.name(), "Active mod set");
        }
        self.active_mod = active_mod;
    }

    pub fn active_mod(&self) -> Option<&Arc<Mod>> {
        self.active_mod.as_ref()
    }

    /// Sets the listener used to attenuate and pan sample plays. `None`
    /// plays every sample at full intensity, centred.
    pub fn set_listener(&mut self, listener: Option<Listener>) {
        self.listener = listener;
    }

    pub fn volumes(&self) -> &VolumeLevels {
        &self.volumes
    }

    pub fn volumes_mut(&mut self) -> &mut VolumeLevels {
        &mut self.volumes
    }

    /// Loads (or returns the already loaded) stream for the given path.
    pub fn stream_load(&mut self, path: &str) -> Result<AudioHandle, ModAudioError> {
        self.find_or_create(path, Kind::Stream)
    }

    /// Loads (or returns the already loaded) sample for the given path.
    pub fn sample_load(&mut self, path: &str) -> Result<AudioHandle, ModAudioError> {
        self.find_or_create(path, Kind::Sample)
    }

    fn find_or_create(&mut self, path: &str, kind: Kind) -> Result<AudioHandle, ModAudioError> {
        if !is_supported_format(path) {
            warn!(path, "Tried to load audio file with invalid file type");
            return Err(ModAudioError::UnsupportedFormat(path.to_string()));
        }

        let Some(engine) = self.engine.clone() else {
            warn!(path, "Tried to load audio without an engine");
            return Err(ModAudioError::EngineInitFailed {
                target: path.to_string(),
                source: EngineError::NotRunning,
            });
        };

        let file = self
            .active_mod
            .as_ref()
            .and_then(|active_mod| active_mod.find_by_suffix(path))
            .ok_or_else(|| {
                warn!(path, "Could not find audio file");
                ModAudioError::NotFound(path.to_string())
            })?;

        if let Some(handle) = self.registry.find(&file) {
            match self.pool.get(handle.key()) {
                Some(asset) if asset.kind == kind => return Ok(handle),
                Some(asset) => {
                    warn!(path, existing = %asset.kind, requested = %kind, "Audio already loaded as a different kind");
                    return Err(ModAudioError::KindMismatch {
                        action: "load",
                        expected: kind,
                        found: asset.kind,
                    });
                }
                None => self.registry.remove(&file),
            }
        }

        let flags = match kind {
            Kind::Stream => SoundFlags::STREAM,
            Kind::Sample => SoundFlags::SAMPLE,
        };
        let sound = engine
            .load(file.file().cached_path(), flags)
            .map_err(|source| {
                error!(path, err = %source, "Failed to load audio file");
                ModAudioError::EngineInitFailed {
                    target: path.to_string(),
                    source,
                }
            })?;

        let handle = AudioHandle::new(self.pool.allocate(ModAudioAsset {
            file: file.clone(),
            kind,
            sound,
        }));
        self.registry.insert(file, handle);
        info!(path, kind = %kind, handle = %handle, "Audio loaded");
        Ok(handle)
    }

    /// Looks up a live asset of the given kind.
    fn asset(
        &self,
        handle: AudioHandle,
        kind: Kind,
        action: &'static str,
    ) -> Result<&ModAudioAsset, ModAudioError> {
        let asset = self.pool.get(handle.key()).ok_or_else(|| {
            warn!(handle = %handle, action, "Tried to use an unloaded audio handle");
            ModAudioError::InvalidHandle { action }
        })?;
        if asset.kind != kind {
            warn!(handle = %handle, action, expected = %kind, found = %asset.kind, "Audio kind mismatch");
            return Err(ModAudioError::KindMismatch {
                action,
                expected: kind,
                found: asset.kind,
            });
        }
        Ok(asset)
    }

    /// The kind of a live handle.
    pub fn kind(&self, handle: AudioHandle) -> Option<Kind> {
        self.pool.get(handle.key()).map(|asset| asset.kind)
    }

    /// Whether the base sound of a live handle is playing. Copies are not counted.
    pub fn is_playing(&self, handle: AudioHandle) -> Result<bool, ModAudioError> {
        let asset = self.pool.get(handle.key()).ok_or(ModAudioError::InvalidHandle {
            action: "query",
        })?;
        Ok(asset.sound.is_playing())
    }

    /// Number of live handles.
    pub fn handle_count(&self) -> usize {
        self.pool.len()
    }

    /// Copies of the sample still playing or not yet reported finished.
    pub fn active_copies(&self, handle: AudioHandle) -> usize {
        self.reclaimer.active_count(handle)
    }

    /// Finished copies awaiting the next `update`.
    pub fn pending_copies(&self) -> usize {
        self.reclaimer.pending_count()
    }

    /// Per-frame entry point: tears down every copy that finished since the last call.
    pub fn update(&mut self) {
        let reclaimed = self.reclaimer.drain_pending(&mut self.reclaim_scratch);
        if reclaimed > 0 {
            debug!(reclaimed, "Reclaimed finished sample copies");
        }
    }

    /// Unloads an asset of the given kind. Sample copies are torn down first.
    fn destroy(&mut self, handle: AudioHandle, kind: Kind) -> Result<(), ModAudioError> {
        self.asset(handle, kind, "destroy")?;
        if kind == Kind::Sample {
            self.stop_copies(handle);
        }
        let Some(asset) = self.pool.remove(handle.key()) else {
            return Err(ModAudioError::InvalidHandle { action: "destroy" });
        };
        self.registry.remove(&asset.file);
        asset.sound.stop();
        info!(path = asset.name(), kind = %kind, handle = %handle, "Audio unloaded");
        Ok(())
    }

    /// Detaches every active copy of the sample and tears them down.
    fn stop_copies(&self, handle: AudioHandle) {
        let copies = self.reclaimer.take_active(handle);
        if copies.is_empty() {
            return;
        }
        for copy in copies.iter() {
            copy.sound().stop();
        }
        debug!(handle = %handle, copies = copies.len(), "Sample copies destroyed");
    }

    /// Destroys every asset newest first, reclaims all copies, and drops the engine.
    /// Every handle is invalid afterwards.
    pub fn shutdown(&mut self) {
        if self.state == LifecycleState::Uninitialized && self.engine.is_none() && self.pool.is_empty() {
            return;
        }
        let span = span!(Level::INFO, "mod audio shutdown");
        let _enter = span.enter();
        self.state = LifecycleState::ShuttingDown;

        let mut key = self.pool.last_key();
        while let Some(current) = key {
            key = self.pool.prev_key(current);
            let handle = AudioHandle::new(current);
            if let Some(kind) = self.kind(handle) {
                if let Err(e) = self.destroy(handle, kind) {
                    error!(err = %e, handle = %handle, "Failed to destroy audio during shutdown");
                }
            }
        }

        self.update();
        let leftover = self.pool.free_all();
        if !leftover.is_empty() {
            warn!(count = leftover.len(), "Releasing audio left in the pool");
        }
        drop(leftover);
        self.registry.clear();
        self.reclaim_scratch = Vec::new();

        if let Some(engine) = self.engine.take() {
            info!(engine = %engine, "Mod audio shut down");
        }
        self.state = LifecycleState::Uninitialized;
    }
}

impl Drop for ModAudio {
    fn drop(&mut self) {
        self.shutdown();
    }
}
