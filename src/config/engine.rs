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
use serde::{Deserialize, Serialize};

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

/// A YAML representation of the audio engine configuration.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Engine {
    /// The output device: a cpal device name, "default", or a name starting with "mock".
    #[serde(default = "default_device")]
    device: String,

    /// Output sample rate in Hz (default: 44100)
    sample_rate: Option<u32>,

    /// Output channel count (default: 2)
    channels: Option<u16>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(DEFAULT_DEVICE)
    }
}

impl Engine {
    /// New will create a new Engine configuration.
    pub fn new(device: &str) -> Engine {
        Engine {
            device: device.to_string(),
            sample_rate: None,
            channels: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the output sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the output channel count (default: 2, never 0)
    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS).max(1)
    }
}
