//! Entity loader: one JSON file per record.
//!
//! [`scan_entities`] walks a directory lazily and yields one outcome per
//! `*.json` file in file-name order. [`load_map`] folds that sequence into an
//! [`EntityMap`] keyed by each record's own `uri` (never its file name).
//!
//! Failure policy:
//! - a directory that cannot be listed is a [`LoadError::DirectoryUnreadable`]
//!   and aborts the caller;
//! - a file that cannot be read or parsed, has an empty `uri`, or repeats a
//!   `uri` already loaded is skipped with a warning and reported in
//!   [`LoadedMap::skipped`].

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use archdex_core::error::LoadError;
use archdex_core::models::{Entity, EntityMap};

use crate::config::Config;

/// A file left out of a load, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// An entity map plus the files that did not make it in.
#[derive(Debug)]
pub struct LoadedMap<E> {
    pub map: EntityMap<E>,
    pub skipped: Vec<SkippedFile>,
}

/// Lazy sequence of parsed entities under one directory.
///
/// Calling [`scan_entities`] again restarts the walk from the beginning.
pub struct EntityFiles<E> {
    root: PathBuf,
    walker: walkdir::IntoIter,
    matcher: GlobSet,
    _entity: PhantomData<fn() -> E>,
}

fn json_matcher() -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    if let Ok(glob) = Glob::new("*.json") {
        builder.add(glob);
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

/// Start walking `dir` (recursively) for `*.json` entity files.
pub fn scan_entities<E: DeserializeOwned>(
    dir: &Path,
    kind: &'static str,
) -> Result<EntityFiles<E>, LoadError> {
    std::fs::read_dir(dir).map_err(|source| LoadError::DirectoryUnreadable {
        kind,
        path: dir.to_path_buf(),
        source,
    })?;

    Ok(EntityFiles {
        root: dir.to_path_buf(),
        walker: WalkDir::new(dir).sort_by_file_name().into_iter(),
        matcher: json_matcher(),
        _entity: PhantomData,
    })
}

fn read_entity<E: DeserializeOwned>(path: &Path) -> Result<E, LoadError> {
    let file_err = |reason: String| LoadError::File {
        path: path.to_path_buf(),
        reason,
    };
    let bytes = std::fs::read(path).map_err(|e| file_err(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| file_err(e.to_string()))
}

impl<E: DeserializeOwned> Iterator for EntityFiles<E> {
    /// Parsed entity with its path, or a [`LoadError::File`].
    type Item = Result<(PathBuf, E), LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    return Some(Err(LoadError::File {
                        path,
                        reason: e.to_string(),
                    }));
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            if !self.matcher.is_match(relative) {
                continue;
            }

            let path = entry.into_path();
            return Some(read_entity(&path).map(|entity| (path, entity)));
        }
    }
}

impl<E> LoadedMap<E> {
    fn skip(&mut self, path: PathBuf, reason: String) {
        tracing::warn!(path = %path.display(), %reason, "skipping file");
        self.skipped.push(SkippedFile { path, reason });
    }
}

impl<E: Entity> LoadedMap<E> {
    pub fn new() -> Self {
        Self {
            map: EntityMap::new(),
            skipped: Vec::new(),
        }
    }

    /// Add every entity under `dir`. The first record seen for a URI wins.
    pub fn extend_from_dir(&mut self, dir: &Path) -> Result<(), LoadError>
    where
        E: DeserializeOwned,
    {
        for outcome in scan_entities::<E>(dir, E::KIND)? {
            match outcome {
                Ok((path, entity)) => {
                    if entity.uri().is_empty() {
                        self.skip(path, format!("{} has an empty uri", E::KIND));
                        continue;
                    }
                    if let Err(rejected) = self.map.insert(entity) {
                        self.skip(
                            path,
                            format!("duplicate {} uri {}", E::KIND, rejected.uri()),
                        );
                    }
                }
                Err(LoadError::File { path, reason }) => self.skip(path, reason),
                Err(fatal) => return Err(fatal),
            }
        }
        Ok(())
    }
}

impl<E: Entity> Default for LoadedMap<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the entity map for one directory.
pub fn load_map<E: Entity + DeserializeOwned>(dir: &Path) -> Result<LoadedMap<E>, LoadError> {
    let mut loaded = LoadedMap::new();
    loaded.extend_from_dir(dir)?;
    tracing::info!(
        kind = E::KIND,
        dir = %dir.display(),
        loaded = loaded.map.len(),
        skipped = loaded.skipped.len(),
        "entity map built"
    );
    Ok(loaded)
}

/// Where each record kind lives under a dataset root.
///
/// ```text
/// <root>/subjects/*.json
/// <root>/agents/**/*.json
/// <root>/repositories/<id>/digital_objects/*.json
/// <root>/repositories/<id>/accessions/*.json
/// ```
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    pub root: PathBuf,
    pub agents: PathBuf,
    /// Repository ids to include. Empty means all.
    pub repositories: Vec<String>,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            agents: root.join("agents"),
            root,
            repositories: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.dataset.root.clone(),
            agents: config.agents_root(),
            repositories: config.dataset.repositories.clone(),
        }
    }

    pub fn subjects(&self) -> PathBuf {
        self.root.join("subjects")
    }

    pub fn repositories_root(&self) -> PathBuf {
        self.root.join("repositories")
    }

    /// Selected repository directories, sorted by id.
    pub fn repository_dirs(&self) -> Result<Vec<PathBuf>, LoadError> {
        let root = self.repositories_root();
        let unreadable = |source| LoadError::DirectoryUnreadable {
            kind: "repositories",
            path: root.clone(),
            source,
        };

        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(&root).map_err(unreadable)? {
            let entry = entry.map_err(unreadable)?;
            if !entry.path().is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            if self.repositories.is_empty() || self.repositories.contains(&id) {
                dirs.push(entry.path());
            }
        }
        dirs.sort();

        for wanted in &self.repositories {
            if !dirs.iter().any(|d| d.ends_with(wanted)) {
                tracing::warn!(repository = %wanted, "configured repository not found in dataset");
            }
        }
        Ok(dirs)
    }
}
