use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use naturalfix::cache::{PredictionStore, SqliteStore};
use naturalfix::config::Config;
use naturalfix::lab::corpus::VectorStore;
use naturalfix::lab::harness::{BatchSummary, Evaluation};
use naturalfix::lab::sink::RecordSink;
use naturalfix::lab::{fold_mutants, ingest_dir};
use naturalfix::edit::token_distance;
use naturalfix::pipeline::{load_vocabulary, Pipeline};
use naturalfix::source::{FixEvent, SourceFile};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const LOG_ENV: &str = "NATURALFIX_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "naturalfix-lab",
    about = "Locate and repair single-token syntax errors, and measure how well it works"
)]
struct Cli {
    /// Config file (default: ~/.config/naturalfix/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add the valid source files under a directory to a corpus
    Ingest(IngestArgs),
    /// Mutate one fold of a corpus and score the pipeline on it
    Evaluate(EvaluateArgs),
    /// Rank the positions of one file and suggest fixes
    Fix(FixArgs),
    /// Show the single-token edit that turns one revision into another
    Diff(DiffArgs),
    /// Inspect or purge the durable prediction store
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Args, Debug)]
struct IngestArgs {
    dir: PathBuf,
    #[arg(long)]
    corpus: PathBuf,
    /// Reassign every file to this many folds after ingesting
    #[arg(long)]
    folds: Option<u32>,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    #[arg(long)]
    corpus: PathBuf,
    #[arg(long, default_value_t = 0)]
    fold: u32,
    /// JSONL record file; appended to when it exists
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long, default_value_t = 1)]
    jobs: usize,
    /// Overrides `mutations_per_file` from the config
    #[arg(long)]
    mutations: Option<usize>,
    /// Overrides `seed` from the config
    #[arg(long)]
    seed: Option<u64>,
    /// Stop starting new files after this many seconds
    #[arg(long)]
    time_limit: Option<u64>,
}

#[derive(Args, Debug)]
struct FixArgs {
    file: PathBuf,
    /// Print the ranking and fixes as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct DiffArgs {
    /// The broken revision
    before: PathBuf,
    /// The fixed revision
    after: PathBuf,
}

#[derive(Debug, Serialize)]
struct DiffReport {
    distance: usize,
    fix: Option<FixEvent>,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Entry counts for the configured models
    Stats,
    /// Remove every stored prediction of one model
    Purge { model: String },
}

#[derive(Debug, Serialize)]
struct EvaluateReport {
    timestamp: DateTime<Utc>,
    run_id: String,
    corpus: PathBuf,
    fold: u32,
    seed: u64,
    mutations_per_file: usize,
    records: PathBuf,
    summary: BatchSummary,
}

#[derive(Debug, Serialize)]
struct FixReport<'a> {
    file: &'a Path,
    ranked: Vec<RankedLine>,
    fixes: Vec<FixLine>,
}

#[derive(Debug, Serialize)]
struct RankedLine {
    index: usize,
    line: usize,
    token: String,
    score: f64,
}

#[derive(Debug, Serialize)]
struct FixLine {
    line: usize,
    edit: String,
    kind: &'static str,
    index: usize,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::resolve(cli.config.as_deref())?;
    match cli.command {
        Commands::Ingest(args) => run_ingest(&config, args),
        Commands::Evaluate(args) => run_evaluate(&config, args),
        Commands::Fix(args) => run_fix(&config, args),
        Commands::Diff(args) => run_diff(&config, args),
        Commands::Cache(command) => run_cache(&config, command),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_ingest(config: &Config, args: IngestArgs) -> Result<()> {
    let vocabulary = load_vocabulary(config)?;
    let mut store = VectorStore::open(&args.corpus)?;
    let report = ingest_dir(&args.dir, config.language, &vocabulary, &mut store)?;

    if let Some(folds) = args.folds {
        if folds == 0 {
            anyhow::bail!("--folds must be at least 1");
        }
        let removed = store.destroy_fold_assignments()?;
        let assigned = store.assign_folds(folds)?;
        tracing::info!(removed, assigned, folds, "fold assignments rebuilt");
    } else if store.has_fold_assignments()? {
        let added = store.unassigned_files()?.len();
        if added > 0 {
            tracing::warn!(
                added,
                "new files are not in any fold; rerun with --folds to include them"
            );
        }
    }

    println!("Scanned: {}", report.scanned);
    println!("Inserted: {}", report.inserted);
    println!("Duplicates: {}", report.duplicates);
    println!("Rejected: {}", report.rejected);
    for fold in store.fold_ids()? {
        println!(
            "Fold {}: {} files, {} tokens",
            fold,
            store.hashes_in_fold(fold)?.len(),
            store.ntokens_in_fold(fold)?
        );
    }
    Ok(())
}

fn run_evaluate(config: &Config, args: EvaluateArgs) -> Result<()> {
    if args.jobs == 0 {
        anyhow::bail!("--jobs must be at least 1");
    }
    let run_id = Uuid::new_v4().to_string();
    let seed = args.seed.unwrap_or(config.seed);
    let per_file = args.mutations.unwrap_or(config.mutations_per_file);

    let pipeline = Pipeline::from_config(config)?;
    let store = VectorStore::open(&args.corpus)?;
    if !store.has_fold_assignments()? {
        anyhow::bail!(
            "Corpus '{}' has no folds; run `ingest --folds N` first",
            args.corpus.display()
        );
    }
    let mutants = fold_mutants(
        &store,
        args.fold,
        config.language,
        pipeline.vocabulary(),
        seed,
        per_file,
    )?;
    tracing::info!(fold = args.fold, mutants = mutants.len(), "mutants generated");

    let records = output_path(args.output.as_ref(), &args.corpus, &run_id, "jsonl");
    let sink = RecordSink::open(&records)?;

    let cancel = Arc::new(AtomicBool::new(false));
    if let Some(secs) = args.time_limit {
        let cancel = Arc::clone(&cancel);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            cancel.store(true, Ordering::SeqCst);
        });
    }

    let summary = Evaluation::new(&pipeline).run(&mutants, &sink, &cancel, args.jobs)?;

    let report = EvaluateReport {
        timestamp: Utc::now(),
        run_id: run_id.clone(),
        corpus: args.corpus.clone(),
        fold: args.fold,
        seed,
        mutations_per_file: per_file,
        records: records.clone(),
        summary,
    };
    let report_path = records.with_extension("summary.json");
    write_report_json(&report_path, &report)?;

    let cache = pipeline.cache().stats();
    println!("Run ID: {}", run_id);
    println!(
        "Attempted: {} (failed {})",
        report.summary.attempted, report.summary.failed
    );
    println!("Top-1: {:.3}", report.summary.top1_accuracy);
    println!("MRR: {:.3}", report.summary.mean_reciprocal_rank);
    println!(
        "Fixed: {} (true fixes {})",
        report.summary.fixed, report.summary.true_fixes
    );
    println!(
        "Predictions computed: {} forward, {} backward",
        cache.forward.computed, cache.backward.computed
    );
    if report.summary.cancelled {
        println!("Cancelled: time limit reached");
    }
    println!("Records: {}", records.display());
    println!("Report: {}", report_path.display());
    Ok(())
}

fn run_fix(config: &Config, args: FixArgs) -> Result<()> {
    let source = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read '{}'", args.file.display()))?;
    let pipeline = Pipeline::from_config(config)?;
    let (file, result) = pipeline.rank_source(source, &config.language)?;
    let vocabulary = pipeline.vocabulary();

    let ranked = result
        .ranked
        .iter()
        .take(pipeline.options().top_k)
        .map(|r| -> Result<RankedLine> {
            Ok(RankedLine {
                index: r.index,
                line: file.line_of_index(r.index, None)?,
                token: vocabulary.name_of(r.token).unwrap_or("?").to_string(),
                score: r.score,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let fixes = result
        .fixes
        .iter()
        .map(|fix| -> Result<FixLine> {
            Ok(FixLine {
                line: file.line_of_index(fix.index(), None)?,
                edit: fix.describe(vocabulary),
                kind: fix.kind().code(),
                index: fix.index(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if args.json {
        let report = FixReport {
            file: &args.file,
            ranked,
            fixes,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Most suspicious positions:");
    for r in &ranked {
        println!(
            "  line {:>5}  index {:>6}  score {:.4}  {}",
            r.line, r.index, r.score, r.token
        );
    }
    if fixes.is_empty() {
        println!("No single-token fix found.");
    } else {
        println!("Fixes:");
        for fix in &fixes {
            println!("  line {:>5}  {}", fix.line, fix.edit);
        }
    }
    Ok(())
}

fn run_diff(config: &Config, args: DiffArgs) -> Result<()> {
    let vocabulary = load_vocabulary(config)?;
    let parse = |path: &Path| -> Result<SourceFile> {
        let source =
            std::fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))?;
        SourceFile::parse(source, &config.language, &vocabulary)
            .with_context(|| format!("Failed to tokenize '{}'", path.display()))
    };
    let before = parse(&args.before)?;
    let after = parse(&args.after)?;

    let report = DiffReport {
        distance: token_distance(before.vector().as_slice(), after.vector().as_slice()),
        fix: before.fix_event(&after, &vocabulary),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_cache(config: &Config, command: CacheCommand) -> Result<()> {
    let path = config.store_path()?;
    let store = SqliteStore::open(&path)?;
    match command {
        CacheCommand::Stats => {
            println!("Store: {}", path.display());
            let models = [config.forward.as_ref(), config.backward.as_ref()];
            let mut any = false;
            for command in models.into_iter().flatten() {
                any = true;
                println!("{}: {}", command.model_id, store.count(&command.model_id)?);
            }
            if !any {
                println!("No predictors configured.");
            }
        }
        CacheCommand::Purge { model } => {
            let removed = store.purge(&model)?;
            tracing::info!(model = %model, removed, "purged stored predictions");
            println!("Removed {} entries for {}", removed, model);
        }
    }
    Ok(())
}

fn output_path(requested: Option<&PathBuf>, corpus: &Path, run_id: &str, ext: &str) -> PathBuf {
    match requested {
        Some(path) => path.clone(),
        None => {
            let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
            let short = run_id.chars().take(8).collect::<String>();
            let dir = corpus
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            dir.join("runs")
                .join(format!("evaluate-{}-{}.{}", timestamp, short, ext))
        }
    }
}

fn write_report_json<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create report directory '{}'", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report '{}'", path.display()))?;
    Ok(())
}
