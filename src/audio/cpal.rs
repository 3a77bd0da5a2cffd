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
use std::{fmt, path::Path, sync::Arc, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{error, info, span, Level};

use super::buffered::BufferFillPool;
use super::mixer::AudioMixer;
use super::thread_priority::{callback_thread_priority, configure_audio_thread_priority, rt_audio_enabled};
use super::{EngineError, Sound, SoundFlags};
use crate::config;

/// Workers decoding streams ahead of playback.
const STREAM_FILL_THREADS: usize = 2;

/// An engine that mixes every sound into a single cpal output stream.
///
/// The stream lives on its own output thread; the cpal callback renders the
/// mixer and is also where end-of-sound callbacks fire.
pub struct Engine {
    /// The name of the device.
    name: String,
    /// The host the device belongs to.
    host_id: cpal::HostId,
    mixer: Arc<AudioMixer>,
    /// Dropping this sender tells the output thread to tear down the stream.
    shutdown_tx: Option<Sender<()>>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, Rate={}) ({})",
            self.name,
            self.mixer.num_channels(),
            self.mixer.sample_rate(),
            self.host_id.name()
        )
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown_tx.take();
        if let Some(thread) = self.output_thread.take() {
            if thread.join().is_err() {
                error!(device = self.name, "Output thread panicked");
            }
        }
        info!(device = self.name, "Audio engine stopped");
    }
}

impl Engine {
    /// Opens the configured output device and starts its stream.
    pub fn open(config: &config::Engine) -> Result<Engine, EngineError> {
        let span = span!(Level::INFO, "open engine (cpal)");
        let _enter = span.enter();

        let (host_id, device) = find_device(config.device())?;
        let name = device
            .name()
            .map_err(|e| EngineError::Device(e.to_string()))?;
        let sample_format = device
            .default_output_config()
            .map_err(|e| EngineError::Device(e.to_string()))?
            .sample_format();

        let fill_pool = Arc::new(BufferFillPool::new(STREAM_FILL_THREADS)?);
        let mixer = Arc::new(AudioMixer::new(
            config.channels(),
            config.sample_rate(),
            fill_pool,
        ));
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);

        let output_thread = {
            let mixer = mixer.clone();
            thread::spawn(move || run_output(device, sample_format, mixer, ready_tx, shutdown_rx))
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = output_thread.join();
                return Err(EngineError::Device(e));
            }
            Err(_) => {
                let _ = output_thread.join();
                return Err(EngineError::Device("output thread exited".to_string()));
            }
        }

        info!(
            device = name,
            host = host_id.name(),
            sample_rate = mixer.sample_rate(),
            channels = mixer.num_channels(),
            "Audio engine started"
        );

        Ok(Engine {
            name,
            host_id,
            mixer,
            shutdown_tx: Some(shutdown_tx),
            output_thread: Some(output_thread),
        })
    }
}

impl super::Engine for Engine {
    fn load(&self, path: &Path, flags: SoundFlags) -> Result<Box<dyn Sound>, EngineError> {
        if self.shutdown_tx.is_none() {
            return Err(EngineError::NotRunning);
        }
        Ok(Box::new(self.mixer.load(path, flags)?))
    }
}

/// Builds the stream, reports readiness, then holds the stream until shutdown.
fn run_output(
    device: cpal::Device,
    sample_format: cpal::SampleFormat,
    mixer: Arc<AudioMixer>,
    ready_tx: Sender<Result<(), String>>,
    shutdown_rx: Receiver<()>,
) {
    let stream_config = cpal::StreamConfig {
        channels: mixer.num_channels(),
        sample_rate: cpal::SampleRate(mixer.sample_rate()),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream_result = match sample_format {
        cpal::SampleFormat::F32 => {
            let mut callback = create_f32_callback(mixer);
            device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], info: &cpal::OutputCallbackInfo| callback(data, info),
                |err| error!("CPAL output stream error: {}", err),
                None,
            )
        }
        cpal::SampleFormat::I16 => {
            let mut callback = create_converting_callback::<i16>(mixer);
            device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], info: &cpal::OutputCallbackInfo| callback(data, info),
                |err| error!("CPAL output stream error: {}", err),
                None,
            )
        }
        cpal::SampleFormat::I32 => {
            let mut callback = create_converting_callback::<i32>(mixer);
            device.build_output_stream(
                &stream_config,
                move |data: &mut [i32], info: &cpal::OutputCallbackInfo| callback(data, info),
                |err| error!("CPAL output stream error: {}", err),
                None,
            )
        }
        other => {
            let _ = ready_tx.send(Err(format!("unsupported sample format {:?}", other)));
            return;
        }
    };

    let stream = match stream_result {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("failed to create stream: {}", e)));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(format!("failed to start stream: {}", e)));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Returns once the engine drops its sender.
    let _ = shutdown_rx.recv();
    drop(stream);
}

/// f32 callback: the mixer renders straight into the cpal buffer.
fn create_f32_callback(
    mixer: Arc<AudioMixer>,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    let priority = callback_thread_priority();
    let rt_audio = rt_audio_enabled();
    let mut priority_set = false;
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        configure_audio_thread_priority(priority, rt_audio, &mut priority_set);
        mixer.process_into_output(data);
    }
}

/// Integer callback: render into a scratch buffer and convert.
fn create_converting_callback<T>(
    mixer: Arc<AudioMixer>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let priority = callback_thread_priority();
    let rt_audio = rt_audio_enabled();
    let mut priority_set = false;
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        configure_audio_thread_priority(priority, rt_audio, &mut priority_set);
        scratch.resize(data.len(), 0.0);
        mixer.process_into_output(&mut scratch);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src.clamp(-1.0, 1.0));
        }
    }
}

/// Finds an output device by name. "default" selects the default device of the default host.
fn find_device(name: &str) -> Result<(cpal::HostId, cpal::Device), EngineError> {
    if name == "default" {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::Device("no default output device".to_string()))?;
        return Ok((host.id(), device));
    }

    for (host_id, device) in output_devices()? {
        if device.name().map(|n| n.trim() == name).unwrap_or(false) {
            return Ok((host_id, device));
        }
    }
    Err(EngineError::Device(format!("no device found with name {}", name)))
}

/// Every device on every available host that has at least one output configuration.
fn output_devices() -> Result<Vec<(cpal::HostId, cpal::Device)>, EngineError> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(e) => {
                error!(err = e.to_string(), host = host_id.name(), "Unable to open host");
                continue;
            }
        };
        let host_devices = match host.devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let has_output = device
                .supported_output_configs()
                .map(|mut configs| configs.next().is_some())
                .unwrap_or(false);
            if has_output {
                devices.push((host_id, device));
            }
        }
    }
    Ok(devices)
}

/// Lists output device names with their host and maximum channel count.
pub fn list_devices() -> Result<Vec<String>, EngineError> {
    let mut names: Vec<String> = output_devices()?
        .into_iter()
        .filter_map(|(host_id, device)| {
            let name = device.name().ok()?;
            let max_channels = device
                .supported_output_configs()
                .ok()?
                .map(|config| config.channels())
                .max()
                .unwrap_or(0);
            Some(format!(
                "{} (Channels={}) ({})",
                name,
                max_channels,
                host_id.name()
            ))
        })
        .collect();
    names.sort();
    Ok(names)
}
