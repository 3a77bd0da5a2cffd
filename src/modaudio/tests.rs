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
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use glam::Vec3;
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::*;
use crate::audio::buffered::BufferFillPool;
use crate::audio::mixer::AudioMixer;
use crate::audio::mock::{self, MOCK_LENGTH_FRAMES, MOCK_SAMPLE_RATE};
use crate::audio::{Engine, EngineError, Sound, SoundFlags};
use crate::config::{self, Settings};
use crate::mods::Mod;
use crate::spatial::Listener;
use crate::testutil::{write_mod_dir, write_wav};

struct Harness {
    _dir: tempfile::TempDir,
    engine: Arc<mock::Engine>,
    mod_audio: ModAudio,
}

fn harness_with(settings: &Settings) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    write_mod_dir(
        dir.path(),
        &[
            ("sound/hit.ogg", &b"OggS"[..]),
            ("sound/zap.wav", &b"RIFF"[..]),
            ("music/theme.mp3", &b"ID3"[..]),
            ("music/broken.ogg", &b""[..]),
            ("main.lua", &b"-- script"[..]),
        ],
    )
    .unwrap();

    let engine = Arc::new(mock::Engine::new("mock"));
    let mut mod_audio = ModAudio::with_engine(engine.clone(), settings);
    mod_audio.set_active_mod(Some(Arc::new(Mod::from_dir(dir.path()).unwrap())));
    Harness {
        _dir: dir,
        engine,
        mod_audio,
    }
}

fn harness() -> Harness {
    harness_with(&Settings::default())
}

#[test]
fn test_stream_load_is_deduplicated() {
    let mut h = harness();
    let first = h.mod_audio.stream_load("music/theme.mp3").unwrap();
    let second = h.mod_audio.stream_load("theme.mp3").unwrap();
    assert_eq!(first, second);
    assert_eq!(h.engine.load_count(), 1);
    assert_eq!(h.mod_audio.handle_count(), 1);
    assert_eq!(h.mod_audio.kind(first), Some(Kind::Stream));
}

#[test]
fn test_kind_mismatch_leaves_handle_untouched() {
    let mut h = harness();
    let stream = h.mod_audio.stream_load("music/theme.mp3").unwrap();
    let result = h.mod_audio.sample_load("music/theme.mp3");
    assert!(matches!(
        result,
        Err(ModAudioError::KindMismatch {
            expected: Kind::Sample,
            found: Kind::Stream,
            ..
        })
    ));

    // Still a working stream, and the failed load created nothing.
    assert_eq!(h.engine.load_count(), 1);
    h.mod_audio.stream_play(stream, true, 1.0).unwrap();
    assert!(h.mod_audio.is_playing(stream).unwrap());
}

#[test]
fn test_wrong_kind_operations_have_no_effect() {
    let mut h = harness();
    let stream = h.mod_audio.stream_load("music/theme.mp3").unwrap();
    let sample = h.mod_audio.sample_load("sound/hit.ogg").unwrap();

    assert!(matches!(
        h.mod_audio.sample_play(stream, Vec3::ZERO, 1.0),
        Err(ModAudioError::KindMismatch { action: "play", .. })
    ));
    assert!(matches!(
        h.mod_audio.stream_play(sample, true, 1.0),
        Err(ModAudioError::KindMismatch { .. })
    ));
    assert!(matches!(
        h.mod_audio.stream_destroy(sample),
        Err(ModAudioError::KindMismatch { .. })
    ));
    assert_eq!(h.engine.playing_count(), 0);
    assert_eq!(h.mod_audio.handle_count(), 2);
}

#[test]
fn test_load_errors() {
    let mut h = harness();
    assert!(matches!(
        h.mod_audio.stream_load("main.lua"),
        Err(ModAudioError::UnsupportedFormat(_))
    ));
    assert!(matches!(
        h.mod_audio.stream_load("sound/missing.ogg"),
        Err(ModAudioError::NotFound(_))
    ));
    assert!(matches!(
        h.mod_audio.stream_load("music/broken.ogg"),
        Err(ModAudioError::EngineInitFailed { .. })
    ));
    assert_eq!(h.mod_audio.handle_count(), 0);

    h.mod_audio.set_active_mod(None);
    assert!(matches!(
        h.mod_audio.sample_load("sound/hit.ogg"),
        Err(ModAudioError::NotFound(_))
    ));
}

#[test]
fn test_extension_match_is_case_insensitive() {
    let mut h = harness();
    let dir = tempfile::tempdir().unwrap();
    write_mod_dir(dir.path(), &[("SOUND/BOOM.OGG", &b"OggS"[..])]).unwrap();
    h.mod_audio
        .set_active_mod(Some(Arc::new(Mod::from_dir(dir.path()).unwrap())));
    assert!(h.mod_audio.sample_load("SOUND/BOOM.OGG").is_ok());
}

#[test]
fn test_no_engine_reports_init_failure() {
    let mut mod_audio = ModAudio::new();
    assert_eq!(mod_audio.state(), LifecycleState::Uninitialized);
    assert!(matches!(
        mod_audio.stream_load("music/theme.mp3"),
        Err(ModAudioError::EngineInitFailed {
            source: EngineError::NotRunning,
            ..
        })
    ));
}

#[test]
fn test_init_with_mock_device() {
    let settings = Settings::new(config::Engine::new("mock-init"));
    let mut mod_audio = ModAudio::new();
    mod_audio.init(&settings);
    assert_eq!(mod_audio.state(), LifecycleState::Active);

    // A second init is ignored.
    mod_audio.init(&settings);
    assert_eq!(mod_audio.state(), LifecycleState::Active);

    mod_audio.shutdown();
    assert_eq!(mod_audio.state(), LifecycleState::Uninitialized);
}

#[test]
fn test_stream_volume_is_scaled_by_levels() {
    let settings =
        Settings::from_yaml("volume:\n  master: 0.5\n  music: 0.5\n  sfx: 0.25\n").unwrap();
    let mut h = harness_with(&settings);
    let stream = h.mod_audio.stream_load("music/theme.mp3").unwrap();

    h.mod_audio.stream_play(stream, true, 1.0).unwrap();
    assert_eq!(h.mod_audio.stream_volume(stream).unwrap(), 0.25);

    h.mod_audio.stream_set_volume(stream, 0.5).unwrap();
    assert_eq!(h.mod_audio.stream_volume(stream).unwrap(), 0.125);

    h.mod_audio.volumes_mut().set_master(1.0);
    h.mod_audio.volumes_mut().set_music(1.0);
    h.mod_audio.stream_play(stream, false, 0.75).unwrap();
    assert_eq!(h.mod_audio.stream_volume(stream).unwrap(), 0.75);
}

#[test]
fn test_stream_seek_and_position() {
    let mut h = harness();
    let stream = h.mod_audio.stream_load("music/theme.mp3").unwrap();
    h.mod_audio.stream_play(stream, true, 1.0).unwrap();
    h.engine.advance(MOCK_SAMPLE_RATE as u64 / 2);
    assert_eq!(h.mod_audio.stream_position(stream).unwrap(), 0.5);

    h.mod_audio.stream_set_position(stream, 0.0).unwrap();
    assert_eq!(h.mod_audio.stream_position(stream).unwrap(), 0.0);

    h.mod_audio.stream_set_position(stream, 0.5).unwrap();
    let expected = (MOCK_LENGTH_FRAMES / 2) as f32 / MOCK_SAMPLE_RATE as f32;
    assert_eq!(h.mod_audio.stream_position(stream).unwrap(), expected);
}

#[test]
fn test_stream_pause_stop_and_resume() {
    let mut h = harness();
    let stream = h.mod_audio.stream_load("music/theme.mp3").unwrap();
    h.mod_audio.stream_play(stream, true, 1.0).unwrap();
    h.engine.advance(MOCK_SAMPLE_RATE as u64);

    h.mod_audio.stream_pause(stream).unwrap();
    assert!(!h.mod_audio.is_playing(stream).unwrap());
    assert_eq!(h.mod_audio.stream_position(stream).unwrap(), 1.0);

    // Playing a stream that is not sounding starts it over.
    h.mod_audio.stream_play(stream, false, 1.0).unwrap();
    assert_eq!(h.mod_audio.stream_position(stream).unwrap(), 0.0);

    // Playing without restart while sounding keeps the position.
    h.engine.advance(MOCK_SAMPLE_RATE as u64);
    h.mod_audio.stream_play(stream, false, 1.0).unwrap();
    assert_eq!(h.mod_audio.stream_position(stream).unwrap(), 1.0);

    h.mod_audio.stream_stop(stream).unwrap();
    assert!(!h.mod_audio.is_playing(stream).unwrap());
    assert_eq!(h.mod_audio.stream_position(stream).unwrap(), 0.0);
}

#[test]
fn test_stream_looping_and_frequency() {
    let mut h = harness();
    let stream = h.mod_audio.stream_load("music/theme.mp3").unwrap();
    assert!(!h.mod_audio.stream_looping(stream).unwrap());
    h.mod_audio.stream_set_looping(stream, true).unwrap();
    assert!(h.mod_audio.stream_looping(stream).unwrap());

    assert_eq!(h.mod_audio.stream_frequency(stream).unwrap(), 1.0);
    h.mod_audio.stream_set_frequency(stream, 1.5).unwrap();
    assert_eq!(h.mod_audio.stream_frequency(stream).unwrap(), 1.5);

    h.mod_audio.stream_play(stream, true, 1.0).unwrap();
    h.engine.advance(MOCK_LENGTH_FRAMES + 1);
    assert!(h.mod_audio.is_playing(stream).unwrap());
}

#[test]
fn test_overlapping_plays_create_copies() {
    let mut h = harness();
    let sample = h.mod_audio.sample_load("sound/hit.ogg").unwrap();

    h.mod_audio.sample_play(sample, Vec3::ZERO, 1.0).unwrap();
    assert_eq!(h.engine.playing_count(), 1);
    assert_eq!(h.mod_audio.active_copies(sample), 0);

    h.mod_audio.sample_play(sample, Vec3::ZERO, 1.0).unwrap();
    h.mod_audio.sample_play(sample, Vec3::ZERO, 1.0).unwrap();
    assert_eq!(h.engine.playing_count(), 3);
    assert_eq!(h.mod_audio.active_copies(sample), 2);
    assert_eq!(h.engine.live_sounds(), 3);
    h.mod_audio.reclaimer.check_integrity();

    // Copies finish on their own and are reclaimed on the next update.
    assert_eq!(h.engine.finish_playing(), 3);
    assert_eq!(h.mod_audio.active_copies(sample), 0);
    assert_eq!(h.mod_audio.pending_copies(), 2);
    h.mod_audio.reclaimer.check_integrity();

    h.mod_audio.update();
    assert_eq!(h.mod_audio.pending_copies(), 0);
    assert_eq!(h.engine.live_sounds(), 1);
    let uninitialized = h.engine.uninitialized();
    h.mod_audio.update();
    assert_eq!(h.engine.uninitialized(), uninitialized);

    // Idle again: the next play uses the base sound.
    h.mod_audio.sample_play(sample, Vec3::ZERO, 1.0).unwrap();
    assert_eq!(h.mod_audio.active_copies(sample), 0);
    assert_eq!(h.engine.playing_count(), 1);
}

#[test]
fn test_sample_stop_destroys_copies_once() {
    let mut h = harness();
    let sample = h.mod_audio.sample_load("sound/hit.ogg").unwrap();
    for _ in 0..4 {
        h.mod_audio.sample_play(sample, Vec3::ZERO, 1.0).unwrap();
    }
    let playing = h.engine.playing_ids();
    assert_eq!(playing.len(), 4);

    h.mod_audio.sample_stop(sample).unwrap();
    assert_eq!(h.mod_audio.active_copies(sample), 0);
    assert_eq!(h.mod_audio.pending_copies(), 0);
    assert_eq!(h.engine.playing_count(), 0);
    assert_eq!(h.engine.live_sounds(), 1);

    // Late completions for the destroyed copies change nothing.
    for id in playing.iter() {
        assert!(!h.engine.finish(*id));
    }
    h.mod_audio.update();

    let uninitialized = h.engine.uninitialized();
    assert_eq!(uninitialized.len(), 3);
    let unique: HashSet<u64> = uninitialized.iter().copied().collect();
    assert_eq!(unique.len(), 3);
    assert!(!uninitialized.contains(&playing[0]));
    h.mod_audio.reclaimer.check_integrity();
}

#[test]
fn test_sample_volume_and_pan_follow_listener() {
    let settings = Settings::from_yaml("volume:\n  master: 0.5\n  sfx: 0.5\n").unwrap();
    let mut h = harness_with(&settings);
    let sample = h.mod_audio.sample_load("sound/zap.wav").unwrap();

    h.mod_audio.sample_play(sample, Vec3::new(5000.0, 0.0, 0.0), 1.0).unwrap();
    let base = h.engine.playing_ids()[0];
    assert_eq!(h.engine.mix_of(base), Some((0.25, 0.0)));

    h.mod_audio.set_listener(Some(Listener::looking_at(
        Vec3::ZERO,
        Vec3::new(0.0, 0.0, -1.0),
        Vec3::Y,
    )));
    h.mod_audio.sample_play(sample, Vec3::new(10000.0, 0.0, 0.0), 1.0).unwrap();
    let copy = *h.engine.playing_ids().last().unwrap();
    let (volume, pan) = h.engine.mix_of(copy).unwrap();
    assert!((volume - 0.125).abs() < 1e-6, "volume {volume}");
    assert!(pan > 0.0, "pan {pan}");

    h.mod_audio.sample_play(sample, Vec3::new(0.0, 0.0, 30000.0), 1.0).unwrap();
    let silent = *h.engine.playing_ids().last().unwrap();
    assert_eq!(h.engine.mix_of(silent).unwrap().0, 0.0);
}

#[test]
fn test_destroy_invalidates_handle() {
    let mut h = harness();
    let sample = h.mod_audio.sample_load("sound/hit.ogg").unwrap();
    h.mod_audio.sample_play(sample, Vec3::ZERO, 1.0).unwrap();
    h.mod_audio.sample_play(sample, Vec3::ZERO, 1.0).unwrap();

    h.mod_audio.sample_destroy(sample).unwrap();
    assert_eq!(h.engine.live_sounds(), 0);
    assert_eq!(h.mod_audio.active_copies(sample), 0);
    assert!(matches!(
        h.mod_audio.sample_play(sample, Vec3::ZERO, 1.0),
        Err(ModAudioError::InvalidHandle { action: "play" })
    ));
    assert!(matches!(
        h.mod_audio.sample_destroy(sample),
        Err(ModAudioError::InvalidHandle { .. })
    ));

    let reloaded = h.mod_audio.sample_load("sound/hit.ogg").unwrap();
    assert_ne!(reloaded, sample);
    assert_eq!(h.engine.load_count(), 2);
}

#[test]
fn test_shutdown_releases_everything() {
    let mut h = harness();
    let stream = h.mod_audio.stream_load("music/theme.mp3").unwrap();
    let hit = h.mod_audio.sample_load("sound/hit.ogg").unwrap();
    let zap = h.mod_audio.sample_load("sound/zap.wav").unwrap();
    h.mod_audio.stream_play(stream, true, 1.0).unwrap();
    for _ in 0..3 {
        h.mod_audio.sample_play(hit, Vec3::ZERO, 1.0).unwrap();
        h.mod_audio.sample_play(zap, Vec3::ZERO, 1.0).unwrap();
    }
    // One copy finished but not yet reclaimed.
    let last = *h.engine.playing_ids().last().unwrap();
    assert!(h.engine.finish(last));
    assert_eq!(h.mod_audio.pending_copies(), 1);

    h.mod_audio.shutdown();
    assert_eq!(h.mod_audio.state(), LifecycleState::Uninitialized);
    assert_eq!(h.engine.live_sounds(), 0);
    assert_eq!(h.mod_audio.handle_count(), 0);
    assert_eq!(h.mod_audio.pending_copies(), 0);

    let uninitialized = h.engine.uninitialized();
    let unique: HashSet<u64> = uninitialized.iter().copied().collect();
    assert_eq!(uninitialized.len(), 7);
    assert_eq!(unique.len(), 7);

    assert!(matches!(
        h.mod_audio.stream_play(stream, true, 1.0),
        Err(ModAudioError::InvalidHandle { .. })
    ));
    assert!(matches!(
        h.mod_audio.stream_load("music/theme.mp3"),
        Err(ModAudioError::EngineInitFailed { .. })
    ));

    // Shutting down twice is harmless.
    h.mod_audio.shutdown();
    assert_eq!(h.engine.uninitialized().len(), 7);
}

#[test]
fn test_drop_shuts_down() {
    let h = harness();
    let engine = h.engine.clone();
    let mut mod_audio = h.mod_audio;
    let sample = mod_audio.sample_load("sound/hit.ogg").unwrap();
    mod_audio.sample_play(sample, Vec3::ZERO, 1.0).unwrap();
    mod_audio.sample_play(sample, Vec3::ZERO, 1.0).unwrap();
    drop(mod_audio);
    assert_eq!(engine.live_sounds(), 0);
}

#[test]
fn test_concurrent_completion_fuzz() {
    let mut h = harness();
    let hit = h.mod_audio.sample_load("sound/hit.ogg").unwrap();
    let zap = h.mod_audio.sample_load("sound/zap.wav").unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let finisher = {
        let engine = h.engine.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(7);
            while !done.load(Ordering::Relaxed) {
                let playing = engine.playing_ids();
                if playing.is_empty() {
                    thread::yield_now();
                    continue;
                }
                let id = playing[rng.gen_range(0..playing.len())];
                engine.finish(id);
            }
        })
    };

    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..2000 {
        let handle = if rng.gen_bool(0.5) { hit } else { zap };
        match rng.gen_range(0..10) {
            0 => h.mod_audio.sample_stop(handle).unwrap(),
            1 | 2 => h.mod_audio.update(),
            _ => h.mod_audio.sample_play(handle, Vec3::ZERO, 1.0).unwrap(),
        }
        h.mod_audio.reclaimer.check_integrity();
    }

    done.store(true, Ordering::Relaxed);
    finisher.join().unwrap();

    h.engine.finish_playing();
    h.mod_audio.update();
    h.mod_audio.reclaimer.check_integrity();
    assert_eq!(h.mod_audio.active_copies(hit), 0);
    assert_eq!(h.mod_audio.active_copies(zap), 0);
    assert_eq!(h.mod_audio.pending_copies(), 0);
    assert_eq!(h.engine.live_sounds(), 2);

    let uninitialized = h.engine.uninitialized();
    let unique: HashSet<u64> = uninitialized.iter().copied().collect();
    assert_eq!(uninitialized.len(), unique.len(), "a sound was uninitialized twice");
}

/// An engine backed by the real mixer, rendered by hand from any thread.
struct MixerEngine {
    mixer: Arc<AudioMixer>,
}

impl fmt::Display for MixerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mixer")
    }
}

impl Engine for MixerEngine {
    fn load(&self, path: &Path, flags: SoundFlags) -> Result<Box<dyn Sound>, EngineError> {
        Ok(Box::new(self.mixer.load(path, flags)?))
    }
}

struct MixerHarness {
    _dir: tempfile::TempDir,
    mixer: Arc<AudioMixer>,
    mod_audio: ModAudio,
}

fn mixer_harness() -> MixerHarness {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("sound")).unwrap();
    std::fs::create_dir_all(dir.path().join("music")).unwrap();
    write_wav(dir.path().join("sound/blip.wav"), vec![vec![0.5f32; 1000]], 44100).unwrap();
    write_wav(dir.path().join("music/song.wav"), vec![vec![0.25f32; 44100]], 44100).unwrap();

    let fill_pool = Arc::new(BufferFillPool::new(1).unwrap());
    let mixer = Arc::new(AudioMixer::new(2, 44100, fill_pool));
    let engine = Arc::new(MixerEngine {
        mixer: mixer.clone(),
    });
    let mut mod_audio = ModAudio::with_engine(engine, &Settings::default());
    mod_audio.set_active_mod(Some(Arc::new(Mod::from_dir(dir.path()).unwrap())));
    MixerHarness {
        _dir: dir,
        mixer,
        mod_audio,
    }
}

#[test]
fn test_mixer_copies_reclaimed_after_render_thread_finishes_them() {
    let mut h = mixer_harness();
    let blip = h.mod_audio.sample_load("sound/blip.wav").unwrap();
    for _ in 0..3 {
        h.mod_audio.sample_play(blip, Vec3::ZERO, 1.0).unwrap();
    }
    assert_eq!(h.mixer.voice_count(), 3);
    assert_eq!(h.mod_audio.active_copies(blip), 2);

    let render = {
        let mixer = h.mixer.clone();
        thread::spawn(move || {
            let mut output = vec![0.0; 4096];
            mixer.process_into_output(&mut output);
        })
    };
    render.join().unwrap();
    assert_eq!(h.mod_audio.active_copies(blip), 0);
    assert_eq!(h.mod_audio.pending_copies(), 2);
    assert_eq!(h.mixer.voice_count(), 3);
    h.mod_audio.reclaimer.check_integrity();

    h.mod_audio.update();
    assert_eq!(h.mod_audio.pending_copies(), 0);
    assert_eq!(h.mixer.voice_count(), 1);
    assert!(!h.mod_audio.is_playing(blip).unwrap());

    h.mod_audio.shutdown();
    assert_eq!(h.mixer.voice_count(), 0);
}

#[test]
fn test_stream_position_is_clamped_to_length() {
    let mut h = mixer_harness();
    let song = h.mod_audio.stream_load("music/song.wav").unwrap();
    h.mod_audio.stream_play(song, true, 1.0).unwrap();

    h.mod_audio.stream_set_position(song, 1.5).unwrap();
    assert_eq!(h.mod_audio.stream_position(song).unwrap(), 1.0);

    h.mod_audio.stream_set_position(song, -0.5).unwrap();
    assert_eq!(h.mod_audio.stream_position(song).unwrap(), 0.0);

    h.mod_audio.stream_set_position(song, 0.5).unwrap();
    assert_eq!(h.mod_audio.stream_position(song).unwrap(), 0.5);
    let mut output = vec![0.0; 8];
    h.mixer.process_into_output(&mut output);
    assert_eq!(output, vec![0.25; 8]);
    assert!(h.mod_audio.is_playing(song).unwrap());
}
