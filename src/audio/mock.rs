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
use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Weak},
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, span, Level};

use super::{EndCallback, EngineError, Sound, SoundFlags};

/// Sample rate every mock sound reports.
pub const MOCK_SAMPLE_RATE: u32 = 44100;

/// Length of every mock sound: two seconds.
pub const MOCK_LENGTH_FRAMES: u64 = 88200;

const CLOCK_TICK: Duration = Duration::from_millis(10);

/// A mock engine. Doesn't actually play anything, but tracks every sound it
/// has initialized and lets the caller finish them from any thread.
pub struct Engine {
    name: String,
    state: Arc<Mutex<MockState>>,
    /// Present when a clock thread advances playing sounds in real time.
    clock_shutdown: Option<Sender<()>>,
    clock_thread: Option<thread::JoinHandle<()>>,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    loads: usize,
    voices: HashMap<u64, Arc<MockVoice>>,
    uninitialized: Vec<u64>,
}

struct MockVoice {
    id: u64,
    path: PathBuf,
    flags: SoundFlags,
    state: Mutex<VoiceState>,
    end_callback: Mutex<Option<EndCallback>>,
}

#[derive(Debug, Clone)]
struct VoiceState {
    playing: bool,
    at_end: bool,
    cursor: u64,
    looping: bool,
    volume: f32,
    pan: f32,
    pitch: f32,
}

impl Default for VoiceState {
    fn default() -> Self {
        VoiceState {
            playing: false,
            at_end: false,
            cursor: 0,
            looping: false,
            volume: 1.0,
            pan: 0.0,
            pitch: 1.0,
        }
    }
}

impl MockVoice {
    /// Moves the cursor forward. Returns the end callback if the voice finished.
    fn advance(&self, frames: u64) -> Option<EndCallback> {
        let mut state = self.state.lock();
        if !state.playing {
            return None;
        }
        state.cursor += frames;
        if state.cursor < MOCK_LENGTH_FRAMES {
            return None;
        }
        if state.looping {
            state.cursor %= MOCK_LENGTH_FRAMES;
            return None;
        }
        state.cursor = MOCK_LENGTH_FRAMES;
        state.playing = false;
        state.at_end = true;
        drop(state);
        self.end_callback.lock().take()
    }

    /// Forces the voice to its end. Returns the end callback if it was playing.
    fn finish(&self) -> Option<EndCallback> {
        let mut state = self.state.lock();
        if !state.playing {
            return None;
        }
        state.cursor = MOCK_LENGTH_FRAMES;
        state.playing = false;
        state.at_end = true;
        drop(state);
        self.end_callback.lock().take()
    }
}

impl Engine {
    /// Gets the given mock engine, with a clock that plays sounds in real time.
    pub fn get(name: &str) -> Engine {
        let mut engine = Engine::new(name);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let state = Arc::downgrade(&engine.state);
        engine.clock_thread = Some(thread::spawn(move || {
            let mut last = Instant::now();
            loop {
                match shutdown_rx.recv_timeout(CLOCK_TICK) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => return,
                }
                let now = Instant::now();
                let frames = ((now - last).as_secs_f64() * MOCK_SAMPLE_RATE as f64) as u64;
                last = now;
                if !advance_state(&state, frames) {
                    return;
                }
            }
        }));
        engine.clock_shutdown = Some(shutdown_tx);
        engine
    }

    /// Creates a mock engine whose sounds only move when told to.
    pub fn new(name: &str) -> Engine {
        Engine {
            name: name.to_string(),
            state: Arc::new(Mutex::new(MockState {
                next_id: 1,
                ..Default::default()
            })),
            clock_shutdown: None,
            clock_thread: None,
        }
    }

    fn register(&self, path: PathBuf, flags: SoundFlags, state: VoiceState) -> MockSound {
        let mut engine_state = self.state.lock();
        let id = engine_state.next_id;
        engine_state.next_id += 1;
        let voice = Arc::new(MockVoice {
            id,
            path,
            flags,
            state: Mutex::new(state),
            end_callback: Mutex::new(None),
        });
        engine_state.voices.insert(id, voice.clone());
        MockSound {
            voice,
            state: self.state.clone(),
        }
    }

    /// Number of successful loads, not counting duplicates.
    pub fn load_count(&self) -> usize {
        self.state.lock().loads
    }

    /// Number of sounds currently initialized.
    pub fn live_sounds(&self) -> usize {
        self.state.lock().voices.len()
    }

    /// Ids of every sound uninitialized so far, in order.
    pub fn uninitialized(&self) -> Vec<u64> {
        self.state.lock().uninitialized.clone()
    }

    /// Ids of the sounds that are currently playing.
    pub fn playing_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .voices()
            .into_iter()
            .filter(|voice| voice.state.lock().playing)
            .map(|voice| voice.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn playing_count(&self) -> usize {
        self.playing_ids().len()
    }

    /// Volume and pan of a live sound.
    pub fn mix_of(&self, id: u64) -> Option<(f32, f32)> {
        let voice = self.state.lock().voices.get(&id).cloned()?;
        let state = voice.state.lock();
        Some((state.volume, state.pan))
    }

    /// Moves every playing sound forward, firing end callbacks on the calling thread.
    pub fn advance(&self, frames: u64) {
        advance_state(&Arc::downgrade(&self.state), frames);
    }

    /// Finishes the given sound as if it had played to its end.
    /// Returns true if it was playing and its end was reported.
    pub fn finish(&self, id: u64) -> bool {
        let voice = self.state.lock().voices.get(&id).cloned();
        let Some(voice) = voice else {
            return false;
        };
        let was_playing = voice.state.lock().playing;
        if let Some(callback) = voice.finish() {
            callback();
        }
        was_playing
    }

    /// Finishes every playing sound. Returns how many were finished.
    pub fn finish_playing(&self) -> usize {
        self.playing_ids()
            .into_iter()
            .filter(|id| self.finish(*id))
            .count()
    }

    fn voices(&self) -> Vec<Arc<MockVoice>> {
        self.state.lock().voices.values().cloned().collect()
    }
}

/// Advances every voice, calling end callbacks after the engine lock is released.
/// Returns false once the engine is gone.
fn advance_state(state: &Weak<Mutex<MockState>>, frames: u64) -> bool {
    let Some(state) = state.upgrade() else {
        return false;
    };
    let voices: Vec<Arc<MockVoice>> = state.lock().voices.values().cloned().collect();
    drop(state);

    for voice in voices {
        if let Some(callback) = voice.advance(frames) {
            debug!(id = voice.id, "Mock sound reached end");
            callback();
        }
    }
    true
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.clock_shutdown.take();
        if let Some(thread) = self.clock_thread.take() {
            let _ = thread.join();
        }
    }
}

impl super::Engine for Engine {
    fn load(&self, path: &Path, flags: SoundFlags) -> Result<Box<dyn Sound>, EngineError> {
        let span = span!(Level::DEBUG, "load (mock)");
        let _enter = span.enter();

        let metadata = std::fs::metadata(path)?;
        if metadata.len() == 0 {
            return Err(EngineError::Unsupported(format!(
                "'{}': empty file",
                path.display()
            )));
        }

        let sound = self.register(path.to_path_buf(), flags, VoiceState::default());
        self.state.lock().loads += 1;
        info!(
            device = self.name,
            id = sound.voice.id,
            path = ?path,
            stream = flags.stream,
            "Mock sound loaded"
        );
        Ok(Box::new(sound))
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}

/// A sound initialized by the mock engine. Dropping it uninitializes it.
pub struct MockSound {
    voice: Arc<MockVoice>,
    state: Arc<Mutex<MockState>>,
}

impl MockSound {
    pub fn id(&self) -> u64 {
        self.voice.id
    }
}

impl Drop for MockSound {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.voices.remove(&self.voice.id);
        state.uninitialized.push(self.voice.id);
    }
}

impl Sound for MockSound {
    fn start(&self) {
        let mut state = self.voice.state.lock();
        if state.at_end {
            state.at_end = false;
            state.cursor = 0;
        }
        state.playing = true;
    }

    fn stop(&self) {
        self.voice.state.lock().playing = false;
    }

    fn is_playing(&self) -> bool {
        self.voice.state.lock().playing
    }

    fn seek_to_frame(&self, frame: u64) {
        let mut state = self.voice.state.lock();
        state.cursor = frame.min(MOCK_LENGTH_FRAMES);
        state.at_end = false;
    }

    fn cursor_frames(&self) -> u64 {
        self.voice.state.lock().cursor
    }

    fn length_frames(&self) -> u64 {
        MOCK_LENGTH_FRAMES
    }

    fn sample_rate(&self) -> u32 {
        MOCK_SAMPLE_RATE
    }

    fn volume(&self) -> f32 {
        self.voice.state.lock().volume
    }

    fn set_volume(&self, volume: f32) {
        self.voice.state.lock().volume = volume;
    }

    fn pan(&self) -> f32 {
        self.voice.state.lock().pan
    }

    fn set_pan(&self, pan: f32) {
        self.voice.state.lock().pan = pan.clamp(-1.0, 1.0);
    }

    fn pitch(&self) -> f32 {
        self.voice.state.lock().pitch
    }

    fn set_pitch(&self, pitch: f32) {
        if !self.voice.flags.no_pitch {
            self.voice.state.lock().pitch = pitch;
        }
    }

    fn is_looping(&self) -> bool {
        self.voice.state.lock().looping
    }

    fn set_looping(&self, looping: bool) {
        self.voice.state.lock().looping = looping;
    }

    fn set_end_callback(&self, callback: EndCallback) {
        *self.voice.end_callback.lock() = Some(callback);
    }

    fn duplicate(&self, flags: SoundFlags) -> Result<Box<dyn Sound>, EngineError> {
        let current = self.voice.state.lock().clone();
        let state = VoiceState {
            looping: current.looping,
            volume: current.volume,
            pan: current.pan,
            pitch: current.pitch,
            ..VoiceState::default()
        };

        let mut engine_state = self.state.lock();
        let id = engine_state.next_id;
        engine_state.next_id += 1;
        let voice = Arc::new(MockVoice {
            id,
            path: self.voice.path.clone(),
            flags,
            state: Mutex::new(state),
            end_callback: Mutex::new(None),
        });
        engine_state.voices.insert(id, voice.clone());
        drop(engine_state);

        debug!(id, source = self.voice.id, path = ?self.voice.path, "Mock sound duplicated");
        Ok(Box::new(MockSound {
            voice,
            state: self.state.clone(),
        }))
    }
}
