//! Scaffold - write-and-validate runner for generated projects
//!
//! The `scaffold` command materializes a file batch under one base directory,
//! validates it and persists `artifacts/validation.json`.
//!
//! ## Commands
//!
//! - `run`: write a batch (or the bootstrap scaffold), validate, persist the report
//! - `write`: write a batch only and print per-file results as JSON
//! - `validate`: run the validation pipeline on an existing directory
//! - `read`: print a file from under the base directory
//! - `ls`: list a directory under the base directory

mod bootstrap;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use scaffold_core::obs::RunSpan;
use scaffold_core::{
    list_directory, load_requirements, read_text_file, seed_placeholders, write_batch,
    BaseDirectory, BatchWriteResult, FileBatch, PersistedReport, PlaceholderHints, RunContext,
};
use scaffold_validate::{ValidationConfig, ValidationPipeline};
use serde_json::Value;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "scaffold")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Write generated project files safely and validate them", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a batch, validate the result and persist the report
    Run {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        validation: ValidationArgs,
    },

    /// Write a batch without validating it
    Write {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Validate an existing project directory and persist the report
    Validate {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        validation: ValidationArgs,
    },

    /// Print a text file from under the base directory
    Read {
        /// Project output directory
        #[arg(long, env = "SCAFFOLD_BASE_DIR")]
        base_dir: PathBuf,

        /// Path relative to the base directory
        path: String,

        /// Refuse files larger than this many bytes
        #[arg(long)]
        max_bytes: Option<u64>,
    },

    /// List a directory under the base directory
    Ls {
        /// Project output directory
        #[arg(long, env = "SCAFFOLD_BASE_DIR")]
        base_dir: PathBuf,

        /// Path relative to the base directory
        #[arg(default_value = ".")]
        path: String,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Project output directory
    #[arg(long, env = "SCAFFOLD_BASE_DIR")]
    base_dir: PathBuf,

    /// Resolve and log everything, touch nothing
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct SourceArgs {
    /// File batch JSON (mapping, {"files": [...]}, or list of entries)
    #[arg(long, required_unless_present = "bootstrap", conflicts_with = "bootstrap")]
    files: Option<PathBuf>,

    /// Write the deterministic starter project instead of a batch file
    #[arg(long)]
    bootstrap: bool,

    /// Requirements JSON (project metadata and placeholder hints)
    #[arg(long, env = "SCAFFOLD_REQUIREMENTS")]
    requirements: Option<PathBuf>,

    /// Fail files that already exist instead of replacing them
    #[arg(long)]
    no_overwrite: bool,
}

#[derive(Args)]
struct ValidationArgs {
    /// Validation config JSON (timeouts, interpreter, lint mode, env)
    #[arg(long, env = "SCAFFOLD_CONFIG")]
    config: Option<PathBuf>,

    /// Python interpreter for compile check and tests
    #[arg(long, env = "SCAFFOLD_PYTHON")]
    python: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    scaffold_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            target,
            source,
            validation,
        } => cmd_run(&target, &source, &validation).await,
        Commands::Write { target, source } => cmd_write(&target, &source),
        Commands::Validate { target, validation } => cmd_validate(&target, &validation).await,
        Commands::Read {
            base_dir,
            path,
            max_bytes,
        } => cmd_read(&base_dir, &path, max_bytes),
        Commands::Ls { base_dir, path } => cmd_ls(&base_dir, &path),
    }
}

/// Write, seed placeholders, validate and persist
async fn cmd_run(target: &TargetArgs, source: &SourceArgs, validation: &ValidationArgs) -> Result<()> {
    let ctx = prepare_context(target)?;
    let _span = RunSpan::enter(&ctx);

    let written = write_sources(&ctx, source)?;
    print_batch_summary(&written);

    let config = load_validation_config(validation)?;
    let persisted = run_validation(&ctx, &config).await?;
    print_report_summary(&persisted);

    if written.ok && persisted.report().ok() {
        println!("\n✓ All checks passed!");
        Ok(())
    } else {
        anyhow::bail!("Scaffold run failed")
    }
}

/// Write only; results go to stdout as JSON
fn cmd_write(target: &TargetArgs, source: &SourceArgs) -> Result<()> {
    let ctx = prepare_context(target)?;
    let _span = RunSpan::enter(&ctx);

    let written = write_sources(&ctx, source)?;
    println!("{}", serde_json::to_string_pretty(&written)?);

    if written.ok {
        Ok(())
    } else {
        anyhow::bail!("{} file(s) failed to write", written.failed_count())
    }
}

/// Validate and persist without writing anything first
async fn cmd_validate(target: &TargetArgs, validation: &ValidationArgs) -> Result<()> {
    let base = BaseDirectory::open(&target.base_dir).context("Failed to open base directory")?;
    let ctx = RunContext::new(base, target.dry_run);
    let _span = RunSpan::enter(&ctx);

    let config = load_validation_config(validation)?;
    let persisted = run_validation(&ctx, &config).await?;
    print_report_summary(&persisted);

    if persisted.report().ok() {
        Ok(())
    } else {
        anyhow::bail!("Validation failed")
    }
}

fn cmd_read(base_dir: &Path, path: &str, max_bytes: Option<u64>) -> Result<()> {
    let ctx = open_read_only(base_dir)?;
    let file = read_text_file(&ctx, path, max_bytes)
        .with_context(|| format!("Failed to read {path}"))?;
    print!("{}", file.content);
    Ok(())
}

fn cmd_ls(base_dir: &Path, path: &str) -> Result<()> {
    let ctx = open_read_only(base_dir)?;
    let entries = list_directory(&ctx, path).with_context(|| format!("Failed to list {path}"))?;
    for entry in entries {
        let suffix = if entry.is_dir { "/" } else { "" };
        println!("{}{}", entry.name, suffix);
    }
    Ok(())
}

fn prepare_context(target: &TargetArgs) -> Result<RunContext> {
    RunContext::prepare(&target.base_dir, target.dry_run).with_context(|| {
        format!(
            "Failed to prepare base directory {}",
            target.base_dir.display()
        )
    })
}

fn open_read_only(base_dir: &Path) -> Result<RunContext> {
    let base = BaseDirectory::open(base_dir).context("Failed to open base directory")?;
    Ok(RunContext::new(base, false))
}

/// Write the planned batch, then any placeholders the requirements ask for.
///
/// Placeholders go second so they never collide with planned files.
fn write_sources(ctx: &RunContext, source: &SourceArgs) -> Result<BatchWriteResult> {
    let requirements = source
        .requirements
        .as_deref()
        .map(load_requirements)
        .transpose()
        .context("Failed to load requirements")?;

    let batch = plan_batch(source, requirements.as_ref())?;
    info!(files = batch.len(), dry_run = ctx.dry_run(), "Writing file batch");
    let mut written = write_batch(ctx, &batch, !source.no_overwrite);

    if let Some(req) = &requirements {
        let hints = PlaceholderHints::from_requirements(req);
        if !hints.is_empty() {
            let seeded = seed_placeholders(ctx, &hints);
            written.ok &= seeded.iter().all(|r| r.ok);
            written.results.extend(seeded);
        }
    }
    Ok(written)
}

fn plan_batch(source: &SourceArgs, requirements: Option<&Value>) -> Result<FileBatch> {
    if source.bootstrap {
        return bootstrap::plan(requirements).context("Failed to plan bootstrap project");
    }
    let path = source
        .files
        .as_deref()
        .context("Either --files or --bootstrap is required")?;
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file batch {}", path.display()))?;
    FileBatch::from_json_str(&raw)
        .with_context(|| format!("Failed to parse file batch {}", path.display()))
}

fn load_validation_config(args: &ValidationArgs) -> Result<ValidationConfig> {
    let config = match &args.config {
        Some(path) => ValidationConfig::load(path)
            .with_context(|| format!("Failed to load validation config {}", path.display()))?,
        None => ValidationConfig::default(),
    };
    Ok(match &args.python {
        Some(python) => config.with_python(python.clone()),
        None => config,
    })
}

async fn run_validation(ctx: &RunContext, config: &ValidationConfig) -> Result<PersistedReport> {
    let mut pipeline = ValidationPipeline::from_config(config, ctx.base_path());
    pipeline
        .run_and_persist(ctx)
        .await
        .context("Validation pipeline failed to run")
}

fn print_batch_summary(written: &BatchWriteResult) {
    println!("Files: {}/{} ok", written.results.len() - written.failed_count(), written.results.len());
    for result in &written.results {
        let status = if result.ok { "✓" } else { "✗" };
        match &result.error {
            Some(error) => println!("  {} {} ({})", status, result.path, error),
            None => println!("  {} {} ({:?})", status, result.path, result.status),
        }
    }
    println!();
}

fn print_report_summary(persisted: &PersistedReport) {
    let report = persisted.report();
    println!("Run ID: {}", report.run_id());
    println!("Status: {}", if report.ok() { "✓ PASSED" } else { "✗ FAILED" });

    for stage in report.stages() {
        let status = if stage.ok { "✓" } else { "✗" };
        let code = stage
            .return_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {} ({}ms, exit code: {})",
            status, stage.name, stage.duration_ms, code
        );
        for error in &stage.errors {
            println!("      {}", error);
        }
    }

    println!();
    println!(
        "Summary: {}/{} stages passed",
        report.passed_count(),
        report.stages().len()
    );
    match persisted.path() {
        Some(path) => println!("Report: {}", path.display()),
        None => println!("Report: skipped (dry run)"),
    }
}
