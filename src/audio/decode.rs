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

//! File decoding for the mixer engine.
//!
//! Samples are decoded entirely into memory at load time ([`DecodedAudio`]);
//! streams keep a small window of decoded frames and pull packets from the
//! file as the fill pool asks for more ([`StreamDecoder`]).

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info};

use super::EngineError;

/// An opened file positioned on its first audio track.
struct OpenedTrack {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    n_frames: Option<u64>,
}

fn open_track(path: &Path) -> Result<OpenedTrack, EngineError> {
    let file = File::open(path).map_err(|e| {
        EngineError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| EngineError::Unsupported(format!("'{}': {}", path.display(), e)))?;
    let format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| EngineError::Unsupported("No audio track found".to_string()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| EngineError::Unsupported("Sample rate not specified".to_string()))?;

    let decoder_opts: DecoderOptions = Default::default();
    let decoder = get_codecs()
        .make(&params, &decoder_opts)
        .map_err(|e| EngineError::Unsupported(format!("'{}': {}", path.display(), e)))?;

    Ok(OpenedTrack {
        format_reader,
        decoder,
        track_id,
        sample_rate,
        n_frames: params.n_frames,
    })
}

/// Reads and decodes the next packet of the track, appending interleaved samples to `out`.
/// Returns the channel count of the decoded packet, or `None` at the end of the file.
fn decode_next_packet(
    format_reader: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
    out: &mut Vec<f32>,
) -> Result<Option<u16>, EngineError> {
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None)
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        // Header packets (ogg/vorbis) decode to no frames; keep reading.
        let channels = append_interleaved(decoded, out);
        if channels > 0 && out.len() >= channels {
            return Ok(Some(channels as u16));
        }
    }
}

/// Appends the decoded buffer to `out` as interleaved f32 and returns its channel count.
fn append_interleaved(decoded: AudioBufferRef, out: &mut Vec<f32>) -> usize {
    match decoded {
        AudioBufferRef::F32(buf) => interleave(&buf, out, |s| s),
        AudioBufferRef::F64(buf) => interleave(&buf, out, |s| s as f32),
        AudioBufferRef::S8(buf) => interleave(&buf, out, scale_s8),
        AudioBufferRef::S16(buf) => interleave(&buf, out, scale_s16),
        AudioBufferRef::S24(buf) => interleave(&buf, out, |s| scale_s24(s.inner())),
        AudioBufferRef::S32(buf) => interleave(&buf, out, scale_s32),
        AudioBufferRef::U8(buf) => interleave(&buf, out, scale_u8),
        AudioBufferRef::U16(buf) => interleave(&buf, out, scale_u16),
        AudioBufferRef::U24(buf) => interleave(&buf, out, |s| scale_u24(s.inner())),
        AudioBufferRef::U32(buf) => interleave(&buf, out, scale_u32),
    }
}

fn interleave<T, F>(buf: &AudioBuffer<T>, out: &mut Vec<f32>, convert: F) -> usize
where
    T: symphonia::core::sample::Sample,
    F: Fn(T) -> f32,
{
    let frames = buf.frames();
    let channels = buf.spec().channels.count();
    let planes = buf.planes();
    out.reserve(frames * channels);
    for frame_idx in 0..frames {
        for ch_idx in 0..channels {
            out.push(convert(planes.planes()[ch_idx][frame_idx]));
        }
    }
    if frames == 0 {
        0
    } else {
        channels
    }
}

#[inline]
pub(crate) fn scale_s8(sample: i8) -> f32 {
    sample as f32 / (1i64 << 7) as f32
}

#[inline]
pub(crate) fn scale_s16(sample: i16) -> f32 {
    sample as f32 / (1i64 << 15) as f32
}

#[inline]
pub(crate) fn scale_s24(sample: i32) -> f32 {
    sample as f32 / (1i64 << 23) as f32
}

#[inline]
pub(crate) fn scale_s32(sample: i32) -> f32 {
    sample as f32 / (1i64 << 31) as f32
}

#[inline]
pub(crate) fn scale_u8(sample: u8) -> f32 {
    (sample as f32 / u8::MAX as f32) * 2.0 - 1.0
}

#[inline]
pub(crate) fn scale_u16(sample: u16) -> f32 {
    (sample as f32 / u16::MAX as f32) * 2.0 - 1.0
}

#[inline]
pub(crate) fn scale_u24(sample: u32) -> f32 {
    let max = (1u32 << 24) - 1;
    (sample as f32 / max as f32) * 2.0 - 1.0
}

#[inline]
pub(crate) fn scale_u32(sample: u32) -> f32 {
    (sample as f32 / u32::MAX as f32) * 2.0 - 1.0
}

/// Folds an interleaved frame down to a stereo pair.
#[inline]
fn stereo(frame: &[f32]) -> (f32, f32) {
    match frame {
        [] => (0.0, 0.0),
        [mono] => (*mono, *mono),
        [left, right, ..] => (*left, *right),
    }
}

/// A sound decoded entirely into memory. Shared between a sample and its copies.
pub struct DecodedAudio {
    /// Interleaved samples.
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl DecodedAudio {
    /// Decodes the whole file.
    pub fn from_file(path: &Path) -> Result<Arc<DecodedAudio>, EngineError> {
        let mut track = open_track(path)?;

        let mut samples = Vec::new();
        let mut channels = 0;
        while let Some(packet_channels) = decode_next_packet(
            track.format_reader.as_mut(),
            track.decoder.as_mut(),
            track.track_id,
            &mut samples,
        )? {
            channels = packet_channels;
        }

        if channels == 0 {
            return Err(EngineError::Unsupported(format!(
                "'{}': no audio frames",
                path.display()
            )));
        }

        let decoded = DecodedAudio::new(samples, channels, track.sample_rate);
        info!(
            path = ?path,
            channels,
            sample_rate = track.sample_rate,
            frames = decoded.frames(),
            memory_kb = decoded.memory_size() / 1024,
            "Sample decoded"
        );
        Ok(Arc::new(decoded))
    }

    /// Wraps already-decoded interleaved samples.
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> DecodedAudio {
        DecodedAudio {
            samples,
            channels: channels.max(1),
            sample_rate,
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames.
    pub fn frames(&self) -> u64 {
        (self.samples.len() / self.channels as usize) as u64
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }

    /// The frame at the given index folded to stereo, or `None` past the end.
    pub fn stereo_frame(&self, frame: u64) -> Option<(f32, f32)> {
        let channels = self.channels as usize;
        let start = usize::try_from(frame).ok()?.checked_mul(channels)?;
        self.samples.get(start..start + channels).map(stereo)
    }
}

/// Incremental decoder for streamed sounds.
pub struct StreamDecoder {
    path: PathBuf,
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: u16,
    sample_rate: u32,
    length_frames: u64,
    /// Decoded interleaved frames starting at `window_start`.
    window: Vec<f32>,
    window_start: u64,
    finished: bool,
}

impl StreamDecoder {
    /// Opens the file and decodes its first packet to learn the channel layout.
    pub fn open(path: &Path) -> Result<StreamDecoder, EngineError> {
        let mut track = open_track(path)?;

        let mut window = Vec::new();
        let channels = decode_next_packet(
            track.format_reader.as_mut(),
            track.decoder.as_mut(),
            track.track_id,
            &mut window,
        )?
        .ok_or_else(|| EngineError::Unsupported(format!("'{}': no audio frames", path.display())))?;

        Ok(StreamDecoder {
            path: path.to_path_buf(),
            format_reader: track.format_reader,
            decoder: track.decoder,
            track_id: track.track_id,
            channels,
            sample_rate: track.sample_rate,
            length_frames: track.n_frames.unwrap_or(0),
            window,
            window_start: 0,
            finished: false,
        })
    }

    /// Opens an independent decoder over the same file.
    pub fn reopen(&self) -> Result<StreamDecoder, EngineError> {
        StreamDecoder::open(&self.path)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The length reported by the container, 0 when unknown.
    pub fn length_frames(&self) -> u64 {
        self.length_frames
    }

    /// The frame at the given index folded to stereo, decoding forward as needed.
    /// Returns `None` once the file is exhausted.
    pub fn stereo_frame(&mut self, frame: u64) -> Result<Option<(f32, f32)>, EngineError> {
        let channels = self.channels as usize;
        let frame = frame.max(self.window_start);
        loop {
            let buffered = (self.window.len() / channels) as u64;
            if frame < self.window_start + buffered {
                let offset = (frame - self.window_start) as usize * channels;
                return Ok(Some(stereo(&self.window[offset..offset + channels])));
            }
            if self.finished {
                return Ok(None);
            }

            // Frames before the requested one are never read again; keep one for interpolation.
            let consumed = (frame - self.window_start).min(buffered).saturating_sub(1);
            if consumed > 0 {
                self.window.drain(..consumed as usize * channels);
                self.window_start += consumed;
            }

            if decode_next_packet(
                self.format_reader.as_mut(),
                self.decoder.as_mut(),
                self.track_id,
                &mut self.window,
            )?
            .is_none()
            {
                self.finished = true;
                if self.length_frames == 0 {
                    self.length_frames = self.window_start + buffered;
                }
            }
        }
    }

    /// Repositions the decoder at the given frame.
    pub fn seek(&mut self, frame: u64) -> Result<(), EngineError> {
        self.window.clear();
        self.finished = false;

        let seeked = self.format_reader.seek(
            SeekMode::Accurate,
            SeekTo::TimeStamp {
                ts: frame,
                track_id: self.track_id,
            },
        )?;
        self.decoder.reset();
        self.window_start = seeked.actual_ts;
        Ok(())
    }
}
