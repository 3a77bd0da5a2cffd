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
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{crate_version, Parser, Subcommand};
use glam::Vec3;
use modaudio::config::Settings;
use modaudio::modaudio::is_supported_format;
use modaudio::mods::Mod;
use modaudio::{Kind, LifecycleState, ModAudio};

/// How often the frame loop runs.
const FRAME: Duration = Duration::from_millis(33);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Plays mod audio assets: streamed tracks and overlapping samples."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the playable audio files in a mod directory.
    Files {
        /// The path to the mod on disk.
        mod_dir: String,
    },
    /// Prints the effective configuration.
    Config {
        /// The path to the config file.
        path: Option<String>,
    },
    /// Loads an asset from a mod and plays it until it is done.
    Play {
        /// The path to the mod on disk.
        mod_dir: String,
        /// The asset path, matched against the end of the mod's file paths.
        path: String,
        /// The path to the config file.
        #[arg(short, long)]
        config: Option<String>,
        /// Load the asset as a sample instead of a stream.
        #[arg(short, long)]
        sample: bool,
        /// How many times to play the asset.
        #[arg(short = 'n', long, default_value_t = 1)]
        times: u32,
        /// Milliseconds between plays.
        #[arg(short, long, default_value_t = 250)]
        interval_ms: u64,
        /// The volume to play at, before master and category levels.
        #[arg(short, long, default_value_t = 1.0)]
        volume: f32,
    },
}

fn load_settings(path: Option<&str>) -> Result<Settings, Box<dyn Error>> {
    Ok(match path {
        Some(path) => Settings::deserialize(Path::new(path))?,
        None => Settings::default(),
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = modaudio::audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Files { mod_dir } => {
            let active_mod = Mod::from_dir(&PathBuf::from(&mod_dir))?;
            let files: Vec<&str> = active_mod
                .files()
                .map(|file| file.relative_path())
                .filter(|path| is_supported_format(path))
                .collect();

            if files.is_empty() {
                println!("No audio files found in {}.", mod_dir);
                return Ok(());
            }

            println!("Audio files in {} (count: {}):", active_mod.name(), files.len());
            for file in files {
                println!("- {}", file);
            }
        }
        Commands::Config { path } => {
            let settings = load_settings(path.as_deref())?;
            print!("{}", settings.to_yaml()?);
        }
        Commands::Play {
            mod_dir,
            path,
            config,
            sample,
            times,
            interval_ms,
            volume,
        } => {
            let settings = load_settings(config.as_deref())?;
            let mod_dir = PathBuf::from(&mod_dir);
            let active_mod = Arc::new(Mod::from_dir(&mod_dir)?);

            let mut mod_audio = ModAudio::new();
            mod_audio.init(&settings);
            if mod_audio.state() != LifecycleState::Active {
                return Err(format!(
                    "unable to initialize audio device {}",
                    settings.engine().device()
                )
                .into());
            }
            mod_audio.set_active_mod(Some(active_mod));

            let (handle, kind) = if sample {
                (mod_audio.sample_load(&path)?, Kind::Sample)
            } else {
                (mod_audio.stream_load(&path)?, Kind::Stream)
            };
            println!(
                "Playing {} {} as {} from {} ({} time(s))",
                kind,
                path,
                handle,
                mod_dir.display(),
                times
            );

            let started = Instant::now();
            let interval = Duration::from_millis(interval_ms);
            let mut remaining = times;
            let mut next_play = started;
            loop {
                let now = Instant::now();
                if remaining > 0 && now >= next_play {
                    if sample {
                        mod_audio.sample_play(handle, Vec3::ZERO, volume)?;
                    } else {
                        mod_audio.stream_play(handle, true, volume)?;
                    }
                    remaining -= 1;
                    next_play = now + interval;
                }

                mod_audio.update();

                let busy = mod_audio.is_playing(handle)?
                    || mod_audio.active_copies(handle) > 0
                    || mod_audio.pending_copies() > 0;
                if remaining == 0 && !busy {
                    break;
                }
                thread::sleep(FRAME);
            }

            mod_audio.shutdown();
            println!("Done in {:.1}s.", started.elapsed().as_secs_f32());
        }
    }

    Ok(())
}
