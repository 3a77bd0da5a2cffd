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
use std::collections::HashMap;

use super::handle::AudioHandle;
use crate::mods::ModFileRef;

/// File suffixes accepted for loading, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = [".mp3", ".aiff", ".ogg", ".wav", ".flac"];

/// Returns true if the path ends in one of the supported extensions.
pub fn is_supported_format(path: &str) -> bool {
    let path = path.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// At most one handle per mod file.
#[derive(Default)]
pub(crate) struct Registry {
    handles: HashMap<ModFileRef, AudioHandle>,
}

impl Registry {
    pub fn find(&self, file: &ModFileRef) -> Option<AudioHandle> {
        self.handles.get(file).copied()
    }

    pub fn insert(&mut self, file: ModFileRef, handle: AudioHandle) {
        self.handles.insert(file, handle);
    }

    pub fn remove(&mut self, file: &ModFileRef) {
        self.handles.remove(file);
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_formats() {
        assert!(is_supported_format("sound/hit.ogg"));
        assert!(is_supported_format("music/theme.MP3"));
        assert!(is_supported_format("a.aiff"));
        assert!(is_supported_format("a.Wav"));
        assert!(is_supported_format("a.flac"));
        assert!(!is_supported_format("a.m4a"));
        assert!(!is_supported_format("ogg"));
        assert!(!is_supported_format("script.lua"));
    }
}
