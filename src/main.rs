//! # archdex CLI
//!
//! Builds a searchable index from an archival export and queries it.
//!
//! ## Usage
//!
//! ```bash
//! archdex --config ./archdex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `archdex build` | Resolve every accession and write it to the index |
//! | `archdex search <terms>` | Query the index |
//! | `archdex normalize <file>...` | Print resolved accession views as JSON |
//! | `archdex stats` | Summarize an existing index |
//!
//! ## Examples
//!
//! ```bash
//! # Index a dataset from scratch
//! archdex build --dataset ./export --index ./export.archdex --replace
//!
//! # Free text with a required term and an exclusion
//! archdex search --facet subjects -- solar +hale -eclipse
//!
//! # Everything published, as JSON
//! archdex search --all --filter publish=true --json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use archdex::config::{self, Config};
use archdex::progress::ProgressMode;
use archdex::search::SearchOptions;
use archdex::{normalize, pipeline, search, stats};

/// archdex resolves archival accession exports into self-contained views
/// and indexes them for faceted full-text search.
#[derive(Parser)]
#[command(name = "archdex", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./archdex.toml` when present; built-in defaults otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show diagnostic logs on stderr (honours RUST_LOG).
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all logs.
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the dataset, resolve every accession and write it to the index.
    ///
    /// An existing index is updated in place: documents are upserted by
    /// accession URI. Use `--replace` to start from an empty index.
    Build {
        /// Dataset root (overrides `dataset.root`).
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Index file (overrides `index.path`).
        #[arg(long)]
        index: Option<PathBuf>,

        /// Delete any existing index first.
        #[arg(long)]
        replace: bool,

        /// Documents per write batch (overrides `index.batch_size`).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Progress output on stderr. Defaults to `human` on a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Search the index.
    ///
    /// Terms are matched with stemming; `+term` is required, `-term` is
    /// excluded and `"a phrase"` matches exactly. Put terms after `--` when
    /// the first one starts with `-`.
    Search {
        terms: Vec<String>,

        /// Number of hits to return. Zero or less means the default.
        #[arg(long, allow_negative_numbers = true)]
        size: Option<i64>,

        /// Offset of the first hit. Negative values start at the first hit.
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        from: i64,

        /// Attach a score explanation to every hit.
        #[arg(long)]
        explain: bool,

        /// Term every hit must contain (repeatable).
        #[arg(long)]
        required: Vec<String>,

        /// Phrase every hit must contain.
        #[arg(long)]
        exact: Option<String>,

        /// Term no hit may contain (repeatable).
        #[arg(long)]
        exclude: Vec<String>,

        /// Match every document when no positive term is given.
        #[arg(long)]
        all: bool,

        /// Exact `field=value` constraint (repeatable).
        #[arg(long)]
        filter: Vec<String>,

        /// Field to facet on (overrides `search.facet_field`).
        #[arg(long)]
        facet: Option<String>,

        /// Number of facet buckets.
        #[arg(long)]
        facet_size: Option<usize>,

        /// Field to highlight (repeatable; overrides `search.highlight_fields`).
        #[arg(long)]
        highlight: Vec<String>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,

        /// Index file (overrides `index.path`).
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Print the resolved view of accession files, one JSON object per line.
    Normalize {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Dataset root to resolve against (overrides `dataset.root`).
        #[arg(long)]
        dataset: Option<PathBuf>,
    },

    /// Show document counts, creation time and schema of an index.
    Stats {
        /// Index file (overrides `index.path`).
        #[arg(long)]
        index: Option<PathBuf>,
    },
}

fn init_tracing(cli: &Cli) {
    // --quiet silences everything, --verbose honours RUST_LOG (info
    // otherwise), the default shows warnings only.
    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("off")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn override_paths(config: &mut Config, dataset: Option<PathBuf>, index: Option<PathBuf>) {
    if let Some(dataset) = dataset {
        config.dataset.root = dataset;
    }
    if let Some(index) = index {
        config.index.path = index;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Build {
            dataset,
            index,
            replace,
            batch_size,
            progress,
        } => {
            override_paths(&mut cfg, dataset, index);
            if let Some(n) = batch_size {
                cfg.index.batch_size = n;
            }
            cfg.validate()?;
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            pipeline::run_build(&cfg, replace, progress).await?;
        }
        Commands::Search {
            terms,
            size,
            from,
            explain,
            required,
            exact,
            exclude,
            all,
            filter,
            facet,
            facet_size,
            highlight,
            json,
            index,
        } => {
            override_paths(&mut cfg, None, index);
            let options = SearchOptions {
                terms,
                required,
                exact,
                exclude,
                all,
                filters: filter,
                from,
                size,
                facet,
                facet_size,
                highlight,
                explain,
                json,
            };
            search::run_search(&cfg, &options).await?;
        }
        Commands::Normalize { files, dataset } => {
            override_paths(&mut cfg, dataset, None);
            normalize::run_normalize(&cfg, &files)?;
        }
        Commands::Stats { index } => {
            override_paths(&mut cfg, None, index);
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
