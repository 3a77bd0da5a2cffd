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
// Voice mixing independent of the output backend.
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::debug;

use super::buffered::{BufferFillPool, BufferedStream, StreamBuffer, StreamFrame};
use super::decode::{DecodedAudio, StreamDecoder};
use super::{EndCallback, EngineError, Sound, SoundFlags};

/// Mixes every live voice into the output buffer.
pub struct AudioMixer {
    /// Voices that have been initialized and not yet dropped, playing or not.
    voices: RwLock<Vec<Arc<Voice>>>,
    next_id: AtomicU64,
    /// Decodes streams ahead of playback, off the output thread.
    fill_pool: Arc<BufferFillPool>,
    /// Number of output channels
    num_channels: u16,
    /// Output sample rate
    sample_rate: u32,
}

impl AudioMixer {
    /// Creates a new audio mixer
    pub fn new(num_channels: u16, sample_rate: u32, fill_pool: Arc<BufferFillPool>) -> Self {
        Self {
            voices: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fill_pool,
            num_channels: num_channels.max(1),
            sample_rate,
        }
    }

    /// Initializes a sound from a file. Streams are decoded ahead of playback on
    /// the fill pool, everything else up front.
    pub fn load(self: &Arc<Self>, path: &Path, flags: SoundFlags) -> Result<MixerSound, EngineError> {
        let source = if flags.stream {
            VoiceSource::Streamed(BufferedStream::new(
                StreamDecoder::open(path)?,
                self.fill_pool.clone(),
            ))
        } else {
            VoiceSource::Decoded(DecodedAudio::from_file(path)?)
        };
        Ok(self.add_voice(source, flags, VoiceState::default()))
    }

    /// Wraps decoded audio in a new voice.
    pub fn load_decoded(self: &Arc<Self>, audio: Arc<DecodedAudio>, flags: SoundFlags) -> MixerSound {
        self.add_voice(VoiceSource::Decoded(audio), flags, VoiceState::default())
    }

    fn add_voice(self: &Arc<Self>, source: VoiceSource, flags: SoundFlags, state: VoiceState) -> MixerSound {
        let voice = Arc::new(Voice {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            flags,
            source,
            state: Mutex::new(state),
            end_callback: Mutex::new(None),
        });
        self.voices.write().push(voice.clone());
        debug!(voice = voice.id, stream = flags.stream, "Voice added");
        MixerSound {
            voice,
            mixer: self.clone(),
        }
    }

    fn remove_voice(&self, id: u64) {
        self.voices.write().retain(|voice| voice.id != id);
        debug!(voice = id, "Voice removed");
    }

    /// Number of voices that exist, playing or not.
    pub fn voice_count(&self) -> usize {
        self.voices.read().len()
    }

    /// Renders interleaved output frames into `output`, replacing its contents.
    ///
    /// End callbacks of voices that finish during this buffer run after every
    /// mixer lock has been released.
    pub fn process_into_output(&self, output: &mut [f32]) {
        output.fill(0.0);

        let mut finished = Vec::new();
        {
            let voices = self.voices.read();
            for voice in voices.iter() {
                if let Some(callback) = voice.render(output, self.num_channels as usize, self.sample_rate) {
                    finished.push(callback);
                }
            }
        }

        for callback in finished {
            callback();
        }
    }

    /// Gets the number of output channels
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

enum VoiceSource {
    Decoded(Arc<DecodedAudio>),
    Streamed(BufferedStream),
}

impl VoiceSource {
    fn sample_rate(&self) -> u32 {
        match self {
            VoiceSource::Decoded(audio) => audio.sample_rate(),
            VoiceSource::Streamed(stream) => stream.sample_rate(),
        }
    }

    fn length_frames(&self) -> u64 {
        match self {
            VoiceSource::Decoded(audio) => audio.frames(),
            VoiceSource::Streamed(stream) => stream.length_frames(),
        }
    }

    /// Blocks on file I/O for streams. Never called with the voice state locked.
    fn seek(&self, frame: u64) {
        if let VoiceSource::Streamed(stream) = self {
            stream.seek(frame);
        }
    }

    fn reader(&self) -> FrameReader<'_> {
        match self {
            VoiceSource::Decoded(audio) => FrameReader::Decoded(audio),
            VoiceSource::Streamed(stream) => FrameReader::Streamed(stream.buffer()),
        }
    }

    fn after_render(&self) {
        if let VoiceSource::Streamed(stream) = self {
            stream.request_refill();
        }
    }

    fn duplicate(&self) -> Result<VoiceSource, EngineError> {
        Ok(match self {
            VoiceSource::Decoded(audio) => VoiceSource::Decoded(audio.clone()),
            VoiceSource::Streamed(stream) => VoiceSource::Streamed(stream.reopen()?),
        })
    }
}

/// Frame access held for the duration of one render pass.
enum FrameReader<'a> {
    Decoded(&'a DecodedAudio),
    Streamed(MutexGuard<'a, StreamBuffer>),
}

impl FrameReader<'_> {
    fn frame(&self, frame: u64) -> StreamFrame {
        match self {
            FrameReader::Decoded(audio) => audio
                .stereo_frame(frame)
                .map_or(StreamFrame::End, StreamFrame::Ready),
            FrameReader::Streamed(buffer) => buffer.frame(frame),
        }
    }

    fn rewind(&mut self) {
        if let FrameReader::Streamed(buffer) = self {
            buffer.request_rewind();
        }
    }

    fn release_before(&mut self, frame: u64) {
        if let FrameReader::Streamed(buffer) = self {
            buffer.release_before(frame);
        }
    }
}

#[derive(Debug, Clone)]
struct VoiceState {
    playing: bool,
    at_end: bool,
    /// Position in source frames.
    cursor: f64,
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
            cursor: 0.0,
            looping: false,
            volume: 1.0,
            pan: 0.0,
            pitch: 1.0,
        }
    }
}

struct Voice {
    id: u64,
    flags: SoundFlags,
    source: VoiceSource,
    state: Mutex<VoiceState>,
    end_callback: Mutex<Option<EndCallback>>,
}

impl Voice {
    /// Adds this voice into the output. Returns the end callback if the voice finished.
    fn render(&self, output: &mut [f32], channels: usize, output_rate: u32) -> Option<EndCallback> {
        let mut state = self.state.lock();
        if !state.playing {
            return None;
        }

        let pitch = if self.flags.no_pitch {
            1.0
        } else {
            state.pitch.max(0.0) as f64
        };
        let step = pitch * self.source.sample_rate() as f64 / output_rate.max(1) as f64;
        let left_gain = state.volume * if state.pan > 0.0 { 1.0 - state.pan } else { 1.0 };
        let right_gain = state.volume * if state.pan < 0.0 { 1.0 + state.pan } else { 1.0 };

        let mut reader = self.source.reader();
        let mut ended = false;
        for out in output.chunks_exact_mut(channels) {
            let mut index = state.cursor.floor() as u64;
            let (l0, r0) = match reader.frame(index) {
                StreamFrame::Ready(frame) => frame,
                // Underrun: stay silent until the fill pool catches up.
                StreamFrame::Pending => break,
                StreamFrame::End if state.looping && index > 0 => {
                    reader.rewind();
                    state.cursor = 0.0;
                    index = 0;
                    match reader.frame(0) {
                        StreamFrame::Ready(frame) => frame,
                        StreamFrame::Pending => break,
                        StreamFrame::End => {
                            ended = true;
                            break;
                        }
                    }
                }
                StreamFrame::End => {
                    ended = true;
                    break;
                }
            };
            let (l1, r1) = match reader.frame(index + 1) {
                StreamFrame::Ready(frame) => frame,
                _ => (l0, r0),
            };
            let frac = (state.cursor - state.cursor.floor()) as f32;
            let left = (l0 + (l1 - l0) * frac) * left_gain;
            let right = (r0 + (r1 - r0) * frac) * right_gain;

            if channels == 1 {
                out[0] += (left + right) * 0.5;
            } else {
                out[0] += left;
                out[1] += right;
            }
            state.cursor += step;
        }
        reader.release_before(state.cursor.floor() as u64);
        drop(reader);
        self.source.after_render();

        if !ended {
            return None;
        }
        state.playing = false;
        state.at_end = true;
        drop(state);
        debug!(voice = self.id, "Voice reached end");
        self.end_callback.lock().take()
    }
}

/// A sound backed by a mixer voice. Dropping it removes the voice.
pub struct MixerSound {
    voice: Arc<Voice>,
    mixer: Arc<AudioMixer>,
}

impl Drop for MixerSound {
    fn drop(&mut self) {
        self.mixer.remove_voice(self.voice.id);
    }
}

impl Sound for MixerSound {
    fn start(&self) {
        let rewind = {
            let mut state = self.voice.state.lock();
            let rewind = state.at_end;
            if rewind {
                state.at_end = false;
                state.cursor = 0.0;
            }
            state.playing = true;
            rewind
        };
        if rewind {
            self.voice.source.seek(0);
        }
    }

    fn stop(&self) {
        self.voice.state.lock().playing = false;
    }

    fn is_playing(&self) -> bool {
        self.voice.state.lock().playing
    }

    fn seek_to_frame(&self, frame: u64) {
        {
            let mut state = self.voice.state.lock();
            state.cursor = frame as f64;
            state.at_end = false;
        }
        self.voice.source.seek(frame);
    }

    fn cursor_frames(&self) -> u64 {
        self.voice.state.lock().cursor as u64
    }

    fn length_frames(&self) -> u64 {
        self.voice.source.length_frames()
    }

    fn sample_rate(&self) -> u32 {
        self.voice.source.sample_rate()
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
        self.voice.state.lock().pitch = pitch;
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
        let source = self.voice.source.duplicate()?;
        let current = self.voice.state.lock().clone();
        let state = VoiceState {
            looping: current.looping,
            volume: current.volume,
            pan: current.pan,
            pitch: current.pitch,
            ..VoiceState::default()
        };
        Ok(Box::new(self.mixer.add_voice(source, flags, state)))
    }
}
