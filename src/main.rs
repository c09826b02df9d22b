//! CLI entry point for the hybrid search engine.
//!
//! Provides commands for indexing workspace files, running hybrid searches,
//! and inspecting health, stats and configuration. State is kept in a local
//! key-value snapshot under `.coderecall/`.

use anyhow::{Context, Result, bail};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use coderecall::display::{
    create_cache_table, create_health_table, create_results_table, create_stats_table,
};
use coderecall::embedding::{
    ContextType, EmbeddingProvider, FastEmbedProvider, HashEmbeddingProvider,
};
use coderecall::search::{HybridSearch, MergedResult};
use coderecall::{
    BatchProcessor, MemoryStore, Metadata, SearchCache, Settings, VectorDimension, VectorStore,
    WorkspaceGrep,
};
use ignore::WalkBuilder;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Files larger than this are not indexed.
const MAX_INDEX_FILE_BYTES: u64 = 1024 * 1024;
const PREVIEW_CHARS: usize = 200;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Hybrid semantic and text search over a workspace
#[derive(Parser)]
#[command(
    name = "coderecall",
    version = env!("CARGO_PKG_VERSION"),
    about = "Hybrid semantic and text search over a workspace",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Set up the .coderecall directory with default configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Embed and store files or directories
    Index {
        /// Files or directories to index
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Namespace to store vectors in (defaults to the configured one)
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Run a hybrid search
    #[command(
        after_help = "Examples:\n  coderecall search \"load settings\"\n  coderecall search parser --strategy text_first --top-k 5\n  coderecall search config --context src/main.rs"
    )]
    Search {
        query: String,

        /// combined, parallel, semantic_first or text_first
        #[arg(short, long)]
        strategy: Option<String>,

        /// Number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Semantic share of the score in [0, 1]
        #[arg(short, long)]
        ratio: Option<f32>,

        /// Files being worked on; enables contextual reranking
        #[arg(long = "context")]
        context: Vec<String>,

        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Check the vector store, cache and embedding provider
    Health,

    /// Show vector store and cache statistics
    Stats {
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Display active settings
    Config,

    /// Remove cached embeddings and search results
    ClearCache,
}

/// Collaborators wired from settings.
struct Services {
    kv: Arc<MemoryStore>,
    store: Arc<VectorStore>,
    search: HybridSearch,
}

impl Services {
    fn build(settings: &Settings, namespace: Option<String>) -> Result<Self> {
        let snapshot = settings.snapshot_path();
        let kv = Arc::new(
            MemoryStore::open(&snapshot)
                .with_context(|| format!("failed to open store at {}", snapshot.display()))?,
        );
        let store = Arc::new(VectorStore::new(kv.clone(), settings.vector_store_config()?));
        let cache = Arc::new(SearchCache::new(kv.clone(), settings.cache_config()));
        let provider = build_provider(settings)?;
        let text = Arc::new(WorkspaceGrep::new(settings.resolved_root()));

        let search = HybridSearch::new(
            store.clone(),
            provider,
            text,
            cache,
            settings.hybrid_config(namespace),
        )
        .with_batch_processor(BatchProcessor::new(settings.batch.concurrency));

        Ok(Self { kv, store, search })
    }

    fn flush(&self) -> Result<()> {
        self.kv.flush().context("failed to write store snapshot")
    }
}

fn build_provider(settings: &Settings) -> Result<Arc<dyn EmbeddingProvider>> {
    let dimension = VectorDimension::new(settings.vector_store.dimension)?;
    match settings.embedding.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbeddingProvider::new(dimension))),
        "fastembed" => {
            let provider = FastEmbedProvider::new(&settings.embedding.model)?;
            if provider.dimension() != dimension {
                bail!(
                    "Model {} produces {} dimensions but vector_store.dimension is {}",
                    settings.embedding.model,
                    provider.dimension(),
                    dimension
                );
            }
            Ok(Arc::new(provider))
        }
        other => bail!("Unknown embedding provider '{other}' (expected 'fastembed' or 'hash')"),
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Files under `paths`, honoring ignore rules, in a stable order.
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        let walker = WalkBuilder::new(path)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();
        for entry in walker.flatten() {
            if entry.file_type().is_some_and(|t| t.is_file()) {
                files.push(entry.into_path());
            }
        }
    }
    files
}

fn relative_id(path: &Path, root: &Path) -> String {
    let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    absolute
        .strip_prefix(&root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

async fn run_index(services: &Services, settings: &Settings, paths: &[PathBuf]) -> Result<()> {
    let started = Instant::now();
    let root = settings.resolved_root();
    let files = collect_files(paths);
    info!("Indexing {} files", files.len());

    let (mut indexed, mut skipped) = (0usize, 0usize);
    for file in files {
        let too_large = std::fs::metadata(&file)
            .map(|m| m.len() > MAX_INDEX_FILE_BYTES)
            .unwrap_or(true);
        let content = match std::fs::read_to_string(&file) {
            Ok(content) if !too_large && !content.trim().is_empty() => content,
            _ => {
                debug!("Skipping {}", file.display());
                skipped += 1;
                continue;
            }
        };

        let id = relative_id(&file, &root);
        let extension = file
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let preview: String = content.chars().take(PREVIEW_CHARS).collect();
        let metadata = Metadata::for_file(&id, &preview, &extension);
        let context = ContextType::for_extension(&extension);

        if services
            .search
            .index_text(&id, &content, metadata, context)
            .await
        {
            indexed += 1;
        } else {
            skipped += 1;
        }
    }

    let snapshots = services.store.persist_all().await?;
    services.flush()?;

    println!(
        "Indexed {indexed} files ({skipped} skipped, {snapshots} index snapshots) in {:.2?}",
        started.elapsed()
    );
    Ok(())
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    strategy: &'a str,
    results: &'a [MergedResult],
}

#[derive(Serialize)]
struct StatsOutput {
    vector_store: coderecall::VectorStoreStats,
    cache: coderecall::CacheStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Init { .. }) {
        if let Err(warning) = Settings::check_init() {
            eprintln!("Warning: {warning}");
            eprintln!("Using default configuration for now.");
        }
    }

    // Load configuration
    let settings = match &cli.config {
        Some(config_path) => Settings::load_from(config_path).with_context(|| {
            format!("Configuration error loading from {}", config_path.display())
        })?,
        None => Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        }),
    };
    init_logging(settings.debug);

    match &cli.command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(*force).map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
        }

        Commands::Config => {
            if cli.json {
                print_json(&settings)?;
            } else {
                println!("{}", toml::to_string_pretty(&settings)?);
            }
        }

        Commands::Index { paths, namespace } => {
            let services = Services::build(&settings, namespace.clone())?;
            run_index(&services, &settings, paths).await?;
        }

        Commands::Search {
            query,
            strategy,
            top_k,
            ratio,
            context,
            namespace,
        } => {
            let services = Services::build(&settings, namespace.clone())?;
            let top_k = top_k.unwrap_or(settings.search.default_top_k);
            let (strategy, results) = if context.is_empty() {
                let strategy = strategy
                    .clone()
                    .unwrap_or_else(|| settings.search.default_strategy.clone());
                let results = services.search.search(query, top_k, &strategy, *ratio).await;
                (strategy, results)
            } else {
                let results = services
                    .search
                    .contextual_search(query, context, top_k)
                    .await;
                ("contextual".to_string(), results)
            };
            services.flush()?;

            if cli.json {
                print_json(&SearchOutput {
                    query,
                    strategy: &strategy,
                    results: &results,
                })?;
            } else if results.is_empty() {
                println!("No results for '{query}' ({strategy})");
            } else {
                println!("{}", create_results_table(&results));
            }
        }

        Commands::Health => {
            let services = Services::build(&settings, None)?;
            let report = services.search.health_check().await;
            if cli.json {
                print_json(&report)?;
            } else {
                println!("Status: {}", report.status.as_str());
                println!("{}", create_health_table(&report));
            }
        }

        Commands::Stats { namespace } => {
            let services = Services::build(&settings, None)?;
            let stats = services.store.get_stats(namespace.as_deref()).await?;
            let cache = services.search.get_cache_stats();
            if cli.json {
                print_json(&StatsOutput {
                    vector_store: stats,
                    cache,
                })?;
            } else {
                println!("{}", create_stats_table(&stats));
                println!("{}", create_cache_table(&cache));
            }
        }

        Commands::ClearCache => {
            let services = Services::build(&settings, None)?;
            let removed = services.search.clear_cache().await?;
            services.flush()?;
            println!("Removed {removed} cache entries");
        }
    }

    Ok(())
}
