//! `archdex normalize`: print the resolved view of accession files.
//!
//! One compact JSON object per line on stdout, in argument order.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

use archdex_core::models::Accession;
use archdex_core::resolve::{EntityMaps, NormalizedView};

use crate::config::Config;
use crate::loader::DatasetLayout;
use crate::pipeline::load_entity_maps;

fn read_accession(path: &Path) -> Result<Accession> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read accession: {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse accession: {}", path.display()))
}

/// Normalize every file in `paths` against `maps`.
pub fn normalize_files(maps: &EntityMaps, paths: &[PathBuf]) -> Result<Vec<NormalizedView>> {
    paths
        .iter()
        .map(|path| read_accession(path).map(|acc| maps.normalize(&acc)))
        .collect()
}

pub fn run_normalize(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let layout = DatasetLayout::from_config(config);
    let (maps, _skipped) = load_entity_maps(&layout)?;

    let mut out = std::io::stdout().lock();
    for view in normalize_files(&maps, paths)? {
        writeln!(out, "{}", serde_json::to_string(&view)?)?;
    }
    out.flush()?;
    Ok(())
}
