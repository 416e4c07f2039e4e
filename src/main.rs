use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use trialgraph::build::{
    classify_sources, discover_sources, get_built_hashes, ledger, DocumentBuilder, SourceFile,
};
use trialgraph::db::{migrate, Db};
use trialgraph::graph::{GraphStore, MemoryGraphStore, SqliteGraphStore};
use trialgraph::{Config, CoreNlpClient, IdAllocator};

#[derive(Parser, Debug)]
#[command(name = "trialgraph", version)]
#[command(about = "Build parse-tree and dependency graphs from clinical study records")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Annotate records and write their sentence graphs (incremental by default)
    Build {
        /// Rebuild every record, ignoring the build ledger
        #[arg(short, long)]
        force: bool,

        /// Emit into an in-memory graph instead of the database
        #[arg(long)]
        dry_run: bool,

        /// Records to build; defaults to everything under source_folder
        paths: Vec<PathBuf>,
    },
    /// Print node and edge counts for the graph database
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load()?;
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.trialgraph.log_level),
    )
    .init();

    let db = Db::new(config.db_path());
    db.with_connection(|conn| migrate::run_migrations(conn)).await?;
    log::info!("Database initialized: {}", config.db_path().display());

    match cli.command {
        Command::Build {
            force,
            dry_run,
            paths,
        } => run_build(&config, db, force, dry_run, &paths).await,
        Command::Stats => run_stats(db).await,
    }
}

async fn run_build(
    config: &Config,
    db: Db,
    force: bool,
    dry_run: bool,
    paths: &[PathBuf],
) -> Result<()> {
    log::info!("Starting trialgraph build v{}", env!("CARGO_PKG_VERSION"));

    let files = if paths.is_empty() {
        discover_sources(config.source_folder())?
    } else {
        paths
            .iter()
            .map(|p| SourceFile::from_path(config.source_folder(), p))
            .collect::<trialgraph::Result<Vec<_>>>()?
    };

    if files.is_empty() {
        log::warn!("No study records found. Check source_folder in config.toml.");
        return Ok(());
    }

    let discovered = files.len();
    let files = if force {
        log::info!("Mode: full rebuild ({} records)", discovered);
        files
    } else {
        let classification = classify_sources(&files, &get_built_hashes(&db).await?)?;
        log::info!(
            "Classification: new={}, modified={}, unchanged (skip)={}",
            classification.new_files.len(),
            classification.modified_files.len(),
            classification.unchanged_files.len()
        );
        classification.pending()
    };

    if files.is_empty() {
        log::info!("No new or modified records. Build complete.");
        return Ok(());
    }

    let sqlite = SqliteGraphStore::new(db.clone());
    let memory = MemoryGraphStore::new();
    let first_uid = sqlite.max_uid().await?.map_or(0, |max| max + 1);
    let ids = IdAllocator::starting_at(first_uid);
    log::debug!("Allocating uids from {}", first_uid);

    let annotator = CoreNlpClient::new(&config.annotator)?;
    let store: &dyn GraphStore = if dry_run {
        log::info!("Dry run: graph is kept in memory, ledger untouched");
        &memory
    } else {
        &sqlite
    };

    let mut builder = DocumentBuilder::new(&config.document, &annotator, store, &ids)
        .with_output_dir(config.output_dir());
    if !dry_run {
        builder = builder.with_ledger(db);
    }

    let start = Instant::now();
    let summary = builder.build_batch(&files).await;

    log::info!("=== Build Complete ===");
    log::info!("Records discovered: {}", discovered);
    log::info!(
        "Records processed: {} (success: {}, errors: {})",
        files.len(),
        summary.reports.len(),
        summary.failures.len()
    );
    log::info!("Sentences: {}", summary.sentences());
    log::info!("Node upserts: {}", summary.node_upserts());
    log::info!("Edge upserts: {}", summary.edge_upserts());
    log::info!("Time: {:?}", start.elapsed());

    if !summary.failures.is_empty() {
        for (path, error) in &summary.failures {
            log::warn!("  {}: {}", path, error);
        }
        anyhow::bail!("{} record(s) failed to build", summary.failures.len());
    }

    Ok(())
}

async fn run_stats(db: Db) -> Result<()> {
    let store = SqliteGraphStore::new(db.clone());
    let stats = store.stats().await?;
    let built = ledger::count_built(&db).await?;

    println!("\n=== trialgraph Graph Statistics ===\n");
    println!("Records built: {}", built);
    println!("Highest uid: {}", store.max_uid().await?.map_or("-".to_string(), |u| u.to_string()));

    println!("\nNodes by label:\n");
    println!("{:-<40}", "");
    for (label, count) in &stats.nodes_by_label {
        println!("{:<28} {:>10}", label, count);
    }
    println!("{:-<40}", "");

    println!("\nEdges by relation:\n");
    println!("{:-<40}", "");
    for (relation, count) in &stats.edges_by_relation {
        println!("{:<28} {:>10}", relation, count);
    }
    println!("{:-<40}", "");
    println!();

    Ok(())
}
