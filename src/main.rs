mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use seek_embed::{BatchingEmbedder, EmbedConfig};
use seek_index::{
    FsSource, IndexCoordinator, IndexWatcher, Lang, SearchFilter, SearchQuery, StateStore,
    format_as_markdown,
};
use tokio::sync::mpsc;

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "seek", version, about = "Semantic code search for a local project")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "SEEK_CONFIG", default_value = "seek.toml")]
    config: PathBuf,
    /// Project root to index.
    #[arg(long, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bring the index up to date with the project.
    Index {
        /// Drop the collection and all state first.
        #[arg(long)]
        rebuild: bool,
    },
    /// Search indexed code with a natural-language query.
    Search {
        query: String,
        #[arg(short, long)]
        k: Option<usize>,
        /// Only chunks of this language, e.g. `rust` or `python`.
        #[arg(long)]
        lang: Option<String>,
        /// Only chunks below this directory or file.
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        min_score: Option<f32>,
    },
    /// Index, then keep the index in sync with file changes until interrupted.
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;
    if !config.enabled {
        tracing::info!("semantic search disabled by configuration");
        return Ok(());
    }

    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("project root {} not found", cli.root.display()))?;

    match cli.command {
        Command::Index { rebuild } => {
            let coordinator = open_index(&config, &root, rebuild).await?;
            cancel_on_ctrl_c(&coordinator);
            let report = coordinator.index_directory(&root).await?;
            for error in &report.errors {
                tracing::warn!("{error}");
            }
            println!(
                "indexed {} files ({} unchanged, {} removed, {} stale, {} skipped) in {} ms",
                report.files_indexed,
                report.files_unchanged,
                report.files_removed,
                report.files_stale,
                report.files_skipped,
                report.duration_ms
            );
        }
        Command::Search {
            query,
            k,
            lang,
            path,
            min_score,
        } => {
            let language = match lang.as_deref() {
                Some(id) => Some(Lang::from_id(id).with_context(|| format!("unknown language: {id}"))?),
                None => None,
            };
            let coordinator = open_index(&config, &root, false).await?;
            let mut query = SearchQuery::new(query).with_filter(SearchFilter {
                language,
                path_prefix: path,
                kind: None,
            });
            query.k = k;
            query.min_score = min_score;
            let results = coordinator.search(query).await?;
            print!("{}", format_as_markdown(&results));
        }
        Command::Watch => {
            let coordinator = open_index(&config, &root, false).await?;
            cancel_on_ctrl_c(&coordinator);

            // Watch before the initial pass so edits made during it are seen.
            let (tx, rx) = mpsc::channel(config.index.queue_capacity);
            let _watcher = IndexWatcher::start(&root, config.index.max_file_bytes, tx)?;
            let worker = Arc::clone(&coordinator).spawn(rx);
            coordinator.index_directory(&root).await?;
            worker.await.context("index worker panicked")?;
        }
    }

    Ok(())
}

async fn open_index(
    config: &Config,
    root: &Path,
    rebuild: bool,
) -> anyhow::Result<Arc<IndexCoordinator<BatchingEmbedder>>> {
    let provider = build_provider(&config.embed).await?;
    let store = config.store.build()?;
    let mut coordinator = IndexCoordinator::new(
        provider,
        Arc::new(store),
        Arc::new(FsSource::new(root)),
        config.store.collection.clone(),
        config.index.clone(),
    );

    if let Some(state_path) = &config.index.state_path {
        let state_path = root.join(state_path);
        if let Some(parent) = state_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create state directory")?;
        }
        let state = StateStore::open(&state_path.to_string_lossy())
            .await
            .context("failed to open index state database")?;
        coordinator = coordinator.with_state_store(state);
    }

    if rebuild {
        coordinator.reset().await?;
    }
    coordinator.start().await?;
    Ok(Arc::new(coordinator))
}

fn cancel_on_ctrl_c(coordinator: &IndexCoordinator<BatchingEmbedder>) {
    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, stopping");
            token.cancel();
        }
    });
}

#[cfg(feature = "candle")]
async fn build_provider(config: &EmbedConfig) -> anyhow::Result<BatchingEmbedder> {
    config
        .build()
        .await
        .with_context(|| format!("failed to load embedding model {}", config.model))
}

#[cfg(all(not(feature = "candle"), feature = "mock"))]
async fn build_provider(config: &EmbedConfig) -> anyhow::Result<BatchingEmbedder> {
    tracing::warn!("built without candle, using hashing embeddings");
    Ok(BatchingEmbedder::new(
        seek_embed::mock::HashingBackend::new(384),
        config.batch_size,
        config.queue_capacity,
    ))
}

#[cfg(not(any(feature = "candle", feature = "mock")))]
async fn build_provider(_config: &EmbedConfig) -> anyhow::Result<BatchingEmbedder> {
    anyhow::bail!("seek was built without an embedding backend; enable the `candle` feature")
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_search_arguments() {
        let cli = Cli::parse_from([
            "seek", "--root", "/tmp", "search", "parse config", "-k", "3", "--lang", "rust",
            "--path", "src",
        ]);
        assert_eq!(cli.root, PathBuf::from("/tmp"));
        let Command::Search { query, k, lang, path, min_score } = cli.command else {
            panic!("expected search");
        };
        assert_eq!(query, "parse config");
        assert_eq!(k, Some(3));
        assert_eq!(lang.as_deref(), Some("rust"));
        assert_eq!(path.as_deref(), Some("src"));
        assert_eq!(min_score, None);
    }

    #[test]
    fn parse_index_rebuild() {
        let cli = Cli::parse_from(["seek", "index", "--rebuild"]);
        assert!(matches!(cli.command, Command::Index { rebuild: true }));
    }
}
