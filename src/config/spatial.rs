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

const DEFAULT_REFERENCE_DISTANCE: f32 = 0.0;
const DEFAULT_MAX_DISTANCE: f32 = 20000.0;
const DEFAULT_FALLOFF_EXPONENT: f32 = 1.0;
const DEFAULT_PAN_FACTOR: f32 = 10.0;

/// Distance attenuation and panning parameters for positioned samples.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Spatial {
    /// Full volume within this distance.
    reference_distance: Option<f32>,
    /// Silent beyond this distance.
    max_distance: Option<f32>,
    falloff_exponent: Option<f32>,
    /// Multiplier applied to view-space x/z before the pan is computed.
    pan_factor: Option<f32>,
}

impl Spatial {
    pub fn reference_distance(&self) -> f32 {
        self.reference_distance
            .unwrap_or(DEFAULT_REFERENCE_DISTANCE)
            .max(0.0)
    }

    /// Never less than the reference distance.
    pub fn max_distance(&self) -> f32 {
        self.max_distance
            .unwrap_or(DEFAULT_MAX_DISTANCE)
            .max(self.reference_distance())
    }

    pub fn falloff_exponent(&self) -> f32 {
        self.falloff_exponent.unwrap_or(DEFAULT_FALLOFF_EXPONENT)
    }

    pub fn pan_factor(&self) -> f32 {
        self.pan_factor.unwrap_or(DEFAULT_PAN_FACTOR)
    }
}
