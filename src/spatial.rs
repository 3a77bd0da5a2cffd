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
//! Listener-relative attenuation and panning for positioned samples.
use glam::{Mat4, Vec3};

use crate::config;

/// Distance beyond which view-space coordinates stop affecting the pan.
const AUDIO_HORIZON: f32 = 22000.0;

/// The point sounds are heard from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Listener {
    pub position: Vec3,
    /// World-to-view transform.
    pub view: Mat4,
}

impl Listener {
    pub fn new(position: Vec3, view: Mat4) -> Listener {
        Listener { position, view }
    }

    /// A listener at `eye` looking at `target`.
    pub fn looking_at(eye: Vec3, target: Vec3, up: Vec3) -> Listener {
        Listener {
            position: eye,
            view: Mat4::look_at_rh(eye, target, up),
        }
    }
}

/// Computes volume intensity and stereo pan from a listener and a world position.
#[derive(Debug, Clone)]
pub struct Spatializer {
    reference_distance: f32,
    max_distance: f32,
    falloff_exponent: f32,
    pan_factor: f32,
}

impl Default for Spatializer {
    fn default() -> Self {
        Spatializer::new(&config::Spatial::default())
    }
}

impl Spatializer {
    pub fn new(config: &config::Spatial) -> Spatializer {
        Spatializer {
            reference_distance: config.reference_distance(),
            max_distance: config.max_distance(),
            falloff_exponent: config.falloff_exponent(),
            pan_factor: config.pan_factor(),
        }
    }

    /// Volume multiplier in [0, 1] for a sound at the given distance.
    pub fn intensity(&self, distance: f32) -> f32 {
        if distance <= self.reference_distance {
            return 1.0;
        }
        if distance >= self.max_distance {
            return 0.0;
        }
        let range = self.max_distance - self.reference_distance;
        let t = (distance - self.reference_distance) / range;
        (1.0 - t.powf(self.falloff_exponent)).clamp(0.0, 1.0)
    }

    /// Distance to and pan in [-1, 1] of a world position. Without a listener
    /// every sound is at distance 0 and centred.
    pub fn locate(&self, listener: Option<&Listener>, position: Vec3) -> (f32, f32) {
        let Some(listener) = listener else {
            return (0.0, 0.0);
        };
        let distance = position.distance(listener.position);
        let view = listener.view.transform_point3(position);
        let pan = (raw_pan(view.x * self.pan_factor, view.z * self.pan_factor) - 0.5) * 2.0;
        (distance, pan.clamp(-1.0, 1.0))
    }
}

/// Pan in [0, 1] for a view-space x/z, 0.5 being centred.
fn raw_pan(x: f32, z: f32) -> f32 {
    let abs_x = x.abs().min(AUDIO_HORIZON);
    let abs_z = z.abs().min(AUDIO_HORIZON);
    let span = 2.0 * AUDIO_HORIZON;

    if x == 0.0 && z == 0.0 {
        0.5
    } else if x >= 0.0 && abs_x >= abs_z {
        1.0 - (span - abs_x) / (3.0 * (span - abs_z))
    } else if x < 0.0 && abs_x > abs_z {
        (span - abs_x) / (3.0 * (span - abs_z))
    } else {
        0.5 + x / (6.0 * abs_z)
    }
}
