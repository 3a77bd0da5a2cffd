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
use std::path::Path;

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ConfigError;
use super::{Engine, Spatial, Volume};

/// The full configuration file.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    engine: Engine,
    volume: Volume,
    spatial: Spatial,
}

impl Settings {
    /// Creates settings for the given engine with default levels.
    pub fn new(engine: Engine) -> Settings {
        Settings {
            engine,
            ..Default::default()
        }
    }

    /// Parse settings from a YAML file. A missing file yields the defaults.
    pub fn deserialize(path: &Path) -> Result<Settings, ConfigError> {
        if !path.exists() {
            info!(path = ?path, "No config file found, using defaults");
            return Ok(Settings::default());
        }
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Settings>()?)
    }

    /// Parse settings from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Settings, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Settings>()?)
    }

    /// Renders the effective settings as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yml::to_string(self)?)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn spatial(&self) -> &Spatial {
        &self.spatial
    }
}
