//! Build pipeline orchestration.
//!
//! Coordinates the full build flow: entity maps → accession stream →
//! publish policy → normalization → index documents → batched writes.
//! Accessions are read lazily, one file at a time, while the three lookup
//! maps are held in memory for the whole run.

use anyhow::{bail, Context, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use archdex_core::batch::{index_all, IndexProgress};
use archdex_core::document::IndexDocument;
use archdex_core::error::LoadError;
use archdex_core::models::{Accession, Agent, DigitalObject, Entity, Subject};
use archdex_core::resolve::EntityMaps;
use archdex_core::schema::accession_schema;
use archdex_core::store::SearchIndex;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::db;
use crate::loader::{load_map, scan_entities, DatasetLayout, EntityFiles, LoadedMap, SkippedFile};
use crate::progress::{format_number, ProgressMode};
use crate::sqlite_index::{IndexState, SqliteIndex};

/// Which accessions are admitted to the index.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishPolicy {
    pub skip_unpublished: bool,
    pub skip_suppressed: bool,
}

impl PublishPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            skip_unpublished: config.index.skip_unpublished,
            skip_suppressed: config.index.skip_suppressed,
        }
    }

    pub fn admits(&self, accession: &Accession) -> bool {
        !(self.skip_unpublished && !accession.publish)
            && !(self.skip_suppressed && accession.suppressed)
    }
}

fn load_optional<E: Entity + DeserializeOwned>(into: &mut LoadedMap<E>, dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        tracing::warn!(kind = E::KIND, dir = %dir.display(), "directory not found, continuing without it");
        return Ok(());
    }
    into.extend_from_dir(dir)?;
    Ok(())
}

/// Load the subject, digital object and agent maps for a dataset.
///
/// `subjects/` and `repositories/` must be readable. Per-repository
/// `digital_objects/` and the agents tree are optional.
pub fn load_entity_maps(layout: &DatasetLayout) -> Result<(EntityMaps, Vec<SkippedFile>)> {
    let subjects = load_map::<Subject>(&layout.subjects())?;

    let mut digital_objects = LoadedMap::<DigitalObject>::new();
    for repo in layout.repository_dirs()? {
        load_optional(&mut digital_objects, &repo.join("digital_objects"))?;
    }

    let mut agents = LoadedMap::<Agent>::new();
    load_optional(&mut agents, &layout.agents)?;

    tracing::info!(
        subjects = subjects.map.len(),
        digital_objects = digital_objects.map.len(),
        agents = agents.map.len(),
        "entity maps loaded"
    );

    let mut skipped = subjects.skipped;
    skipped.extend(digital_objects.skipped);
    skipped.extend(agents.skipped);

    Ok((
        EntityMaps {
            subjects: subjects.map,
            digital_objects: digital_objects.map,
            agents: agents.map,
        },
        skipped,
    ))
}

/// Counters kept while an [`AccessionStream`] is drained.
#[derive(Debug, Default)]
pub struct StreamCounts {
    pub read: u64,
    pub filtered: u64,
    pub unresolved: u64,
    pub skipped: Vec<SkippedFile>,
}

/// Lazily turns accession files into index documents, one repository after
/// another.
pub struct AccessionStream<'a> {
    maps: &'a EntityMaps,
    policy: PublishPolicy,
    pending: VecDeque<EntityFiles<Accession>>,
    pub counts: StreamCounts,
}

impl<'a> AccessionStream<'a> {
    pub fn new(
        layout: &DatasetLayout,
        maps: &'a EntityMaps,
        policy: PublishPolicy,
    ) -> Result<Self, LoadError> {
        let mut pending = VecDeque::new();
        for repo in layout.repository_dirs()? {
            let dir = repo.join("accessions");
            if !dir.is_dir() {
                tracing::warn!(dir = %dir.display(), "repository has no accessions directory");
                continue;
            }
            pending.push_back(scan_entities::<Accession>(&dir, Accession::KIND)?);
        }
        Ok(Self {
            maps,
            policy,
            pending,
            counts: StreamCounts::default(),
        })
    }

    fn skip(&mut self, path: PathBuf, reason: String) {
        tracing::warn!(path = %path.display(), %reason, "skipping accession");
        self.counts.skipped.push(SkippedFile { path, reason });
    }
}

impl Iterator for AccessionStream<'_> {
    type Item = IndexDocument;

    fn next(&mut self) -> Option<IndexDocument> {
        loop {
            let outcome = match self.pending.front_mut()?.next() {
                Some(outcome) => outcome,
                None => {
                    self.pending.pop_front();
                    continue;
                }
            };

            let (path, accession) = match outcome {
                Ok(found) => found,
                Err(LoadError::File { path, reason }) => {
                    self.skip(path, reason);
                    continue;
                }
                Err(other) => {
                    self.skip(PathBuf::new(), other.to_string());
                    continue;
                }
            };

            if accession.uri.is_empty() {
                self.skip(path, "accession has an empty uri".to_string());
                continue;
            }
            self.counts.read += 1;

            if !self.policy.admits(&accession) {
                tracing::debug!(uri = %accession.uri, "accession filtered by publish policy");
                self.counts.filtered += 1;
                continue;
            }

            let view = self.maps.normalize(&accession);
            self.counts.unresolved += view.unresolved().count() as u64;
            return Some(IndexDocument::from_view(&view));
        }
    }
}

/// Outcome of one build.
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub accessions_read: u64,
    pub skipped_files: usize,
    pub filtered: u64,
    pub unresolved_refs: u64,
    pub documents: u64,
    pub batches: usize,
    pub elapsed: Duration,
}

impl BuildSummary {
    pub fn print(&self) {
        println!("  accessions read: {}", format_number(self.accessions_read));
        println!("  skipped files: {}", self.skipped_files);
        println!("  filtered: {}", format_number(self.filtered));
        println!("  unresolved references: {}", format_number(self.unresolved_refs));
        println!("  documents indexed: {}", format_number(self.documents));
        println!("  batches: {}", self.batches);
        println!("  elapsed: {:.2}s", self.elapsed.as_secs_f64());
    }
}

/// Load, resolve and index the dataset named by `config` into `index`.
pub async fn build_index(
    config: &Config,
    index: &dyn SearchIndex,
    progress: &dyn IndexProgress,
) -> Result<BuildSummary> {
    let layout = DatasetLayout::from_config(config);
    let (maps, mut skipped) = load_entity_maps(&layout)?;

    let mut stream = AccessionStream::new(&layout, &maps, PublishPolicy::from_config(config))?;
    let stats = index_all(index, &mut stream, config.index.batch_size, progress).await?;

    skipped.append(&mut stream.counts.skipped);
    Ok(BuildSummary {
        accessions_read: stream.counts.read,
        skipped_files: skipped.len(),
        filtered: stream.counts.filtered,
        unresolved_refs: stream.counts.unresolved,
        documents: stats.documents,
        batches: stats.batches,
        elapsed: stats.elapsed,
    })
}

/// `archdex build`: open (or recreate) the SQLite index and fill it.
pub async fn run_build(config: &Config, replace: bool, progress: ProgressMode) -> Result<()> {
    let root = &config.dataset.root;
    if !root.is_dir() {
        bail!("dataset root not found: {}", root.display());
    }

    let index_path = &config.index.path;
    if replace {
        db::remove_database(index_path)
            .with_context(|| format!("Failed to remove index: {}", index_path.display()))?;
    }

    let (index, state) = SqliteIndex::open_or_create(index_path, &accession_schema()).await?;
    let reporter = progress.reporter();
    let result = build_index(config, &index, reporter.as_ref()).await;
    index.close().await;
    let summary = result?;

    let verb = match state {
        IndexState::Created => "created",
        IndexState::Opened => "updated",
    };
    println!("build {} -> {} ({})", root.display(), index_path.display(), verb);
    summary.print();
    println!("ok");
    Ok(())
}
