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

/// Initial volume levels. Every configured level is divided by `scale` and
/// clamped into [0, 1], so 0..127 slider values work with `scale: 127`.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Volume {
    master: Option<f32>,
    music: Option<f32>,
    sfx: Option<f32>,
    scale: Option<f32>,
}

impl Volume {
    /// Returns the divisor for configured levels (default: 1.0).
    pub fn scale(&self) -> f32 {
        match self.scale {
            Some(scale) if scale.is_finite() && scale > 0.0 => scale,
            _ => 1.0,
        }
    }

    fn level(&self, value: Option<f32>) -> f32 {
        value
            .map(|v| (v / self.scale()).clamp(0.0, 1.0))
            .unwrap_or(1.0)
    }

    /// Returns the master level (default: 1.0)
    pub fn master(&self) -> f32 {
        self.level(self.master)
    }

    /// Returns the music level (default: 1.0)
    pub fn music(&self) -> f32 {
        self.level(self.music)
    }

    /// Returns the sound effect level (default: 1.0)
    pub fn sfx(&self) -> f32 {
        self.level(self.sfx)
    }
}
