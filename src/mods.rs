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
//! The active mod: the ordered table of files a mod ships with.
use std::{
    fmt,
    hash::{Hash, Hasher},
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info};

/// A file shipped with a mod.
#[derive(Debug, PartialEq, Eq)]
pub struct ModFile {
    /// Path relative to the mod root, always '/'-separated.
    relative_path: String,
    /// Where the file lives on disk.
    cached_path: PathBuf,
}

impl ModFile {
    pub fn new(relative_path: &str, cached_path: PathBuf) -> ModFile {
        ModFile {
            relative_path: normalize_path(relative_path),
            cached_path,
        }
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn cached_path(&self) -> &Path {
        &self.cached_path
    }
}

/// Identity of a mod file. Two references are equal only if they point at the
/// same table entry, so the registry can key handles by file.
#[derive(Clone, Debug)]
pub struct ModFileRef(Arc<ModFile>);

impl ModFileRef {
    pub fn file(&self) -> &ModFile {
        &self.0
    }
}

impl PartialEq for ModFileRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ModFileRef {}

impl Hash for ModFileRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

/// A mod and its ordered file table.
#[derive(Debug)]
pub struct Mod {
    name: String,
    files: Vec<Arc<ModFile>>,
}

impl Mod {
    /// Creates a mod from an explicit file table. Table order is preserved.
    pub fn new(name: &str, files: Vec<ModFile>) -> Mod {
        Mod {
            name: name.to_string(),
            files: files.into_iter().map(Arc::new).collect(),
        }
    }

    /// Scans a mod directory recursively. Files are ordered by relative path.
    pub fn from_dir(root: &Path) -> io::Result<Mod> {
        let mut files = Vec::new();
        collect_files(root, root, &mut files)?;
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        let name = root
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("mod")
            .to_string();
        info!(name, root = ?root, files = files.len(), "Mod scanned");
        Ok(Mod::new(&name, files))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn files(&self) -> impl Iterator<Item = &ModFile> {
        self.files.iter().map(|file| file.as_ref())
    }

    /// Finds the first file, in table order, whose relative path ends with the requested path.
    pub fn find_by_suffix(&self, path: &str) -> Option<ModFileRef> {
        let wanted = normalize_path(path);
        if wanted.is_empty() {
            return None;
        }
        self.files
            .iter()
            .find(|file| file.relative_path.ends_with(&wanted))
            .map(|file| ModFileRef(file.clone()))
    }
}

impl fmt::Display for Mod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} files)", self.name, self.files.len())
    }
}

/// Recurse into the given directory and collect every regular file.
fn collect_files(root: &Path, dir: &Path, files: &mut Vec<ModFile>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            collect_files(root, &path, files)?;
            continue;
        }

        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let Some(relative) = relative.to_str() else {
            debug!(path = ?path, "Skipping file with unreadable name");
            continue;
        };
        files.push(ModFile::new(relative, path.clone()));
    }
    Ok(())
}

/// Converts separators to '/' and strips leading "./" and '/'.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while let Some(stripped) = normalized.strip_prefix("./") {
        normalized = stripped.to_string();
    }
    normalized.trim_start_matches('/').to_string()
}
