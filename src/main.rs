use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use segment_dl::config::DEFAULT_CONFIG_PATH;
use segment_dl::{
    Config, Database, Error, FailureLog, HttpFetcher, Result, RetryPolicy, Scheduler, Status,
    assembler, importer, maintenance,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Resumable downloader for segmented media streams
#[derive(Parser, Debug)]
#[command(name = "segment-dl", version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import segment URIs from a playlist file
    Import {
        /// Playlist file, one URI per line
        file: PathBuf,
    },
    /// Remove every work item from the store
    Purge,
    /// Remove Completed and Failed items and their files
    DeleteTerminal,
    /// Print status counts and every item grouped by status
    List,
    /// Download everything that is New, Queued or Failed
    Run,
    /// Concatenate downloaded segments into one file
    Assemble {
        /// Output file
        output: PathBuf,

        /// Playlist giving the segment order (default: import order)
        #[arg(short, long)]
        playlist: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let started = Local::now();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match init_logging(config.debug, &config.log_dir, started) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match execute(args.command, &config, started).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(&args.config)?;
    if args.debug {
        config.debug = true;
    }
    config.validate()?;
    Ok(config)
}

/// Console logging plus one log file per invocation
fn init_logging(debug: bool, log_dir: &Path, started: DateTime<Local>) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,segment_dl={level}")));

    let file_name = format!("segment-dl_{}.log", started.format("%Y%m%d_%H%M%S"));
    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(debug),
        )
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "Failed to set global default subscriber: {e}"
            )))
        })?;

    Ok(guard)
}

async fn execute(command: Commands, config: &Config, started: DateTime<Local>) -> Result<()> {
    let db = Arc::new(Database::new(&config.database).await?);

    let result = match command {
        Commands::Import { file } => import(&db, &file).await,
        Commands::Purge => purge(&db, &config.database).await,
        Commands::DeleteTerminal => delete_terminal(&db, &config.storage_dir).await,
        Commands::List => list(&db).await,
        Commands::Run => run(&db, config, started).await,
        Commands::Assemble { output, playlist } => {
            assemble(&db, &config.storage_dir, &output, playlist.as_deref()).await
        }
    };

    db.pool().close().await;
    result
}

async fn import(db: &Database, file: &Path) -> Result<()> {
    let report = importer::import_file(db, file).await?;
    println!(
        "Imported {} segments from {} ({} already present)",
        report.inserted,
        file.display(),
        report.skipped
    );
    Ok(())
}

async fn purge(db: &Database, path: &Path) -> Result<()> {
    maintenance::purge(db).await?;
    println!("Database {} purged.", path.display());
    Ok(())
}

async fn delete_terminal(db: &Database, storage_dir: &Path) -> Result<()> {
    let report = maintenance::delete_terminal(db, storage_dir).await?;
    println!(
        "Deleted {} items ({} files removed, {} files already missing)",
        report.rows_deleted, report.files_removed, report.files_missing
    );
    Ok(())
}

async fn list(db: &Database) -> Result<()> {
    let counts = db.status_counts().await?;

    println!("--------------------------------");
    for status in Status::ALL {
        println!("{:<10}= {}", capitalize(&status.to_string()), counts.get(status));
    }
    println!("--------------------------------");

    for status in Status::ALL {
        let items = db.list_by_status(status).await?;
        if items.is_empty() {
            continue;
        }
        println!("{}:", capitalize(&status.to_string()));
        for item in items {
            println!(
                "  [{}] {} | {} | {} | {}",
                item.id, item.name, item.uri, item.status, item.attempts
            );
        }
    }
    Ok(())
}

async fn run(db: &Arc<Database>, config: &Config, started: DateTime<Local>) -> Result<()> {
    let failure_log = Arc::new(FailureLog::for_run(&config.log_dir, started));
    let fetcher = Arc::new(HttpFetcher::new(&config.download)?);

    let scheduler = Scheduler::new(
        Arc::clone(db),
        fetcher,
        Arc::clone(&failure_log),
        &config.storage_dir,
        config.download.effective_parallelism(),
    )
    .with_retry_policy(RetryPolicy::new(&config.retry));

    let summary = scheduler.run().await;
    drop(scheduler);
    let summary = summary?;

    println!(
        "Downloaded {} of {} segments with {} workers in {}",
        summary.succeeded,
        summary.attempted,
        summary.workers,
        format_duration(summary.elapsed)
    );
    if summary.recovered > 0 {
        println!("Recovered {} interrupted segments", summary.recovered);
    }
    if summary.failed > 0 {
        println!(
            "{} segments failed, see {}",
            summary.failed,
            failure_log.path().display()
        );
    }
    if summary.exhausted > 0 {
        println!(
            "{} segments skipped after reaching the attempt limit",
            summary.exhausted
        );
    }

    Ok(())
}

async fn assemble(
    db: &Database,
    storage_dir: &Path,
    output: &Path,
    playlist: Option<&Path>,
) -> Result<()> {
    let order = assembler::assembly_order(db, playlist).await?;
    let bytes = assembler::assemble(&order, storage_dir, output).await?;
    println!(
        "Assembled {} segments into {} ({} bytes)",
        order.len(),
        output.display(),
        bytes
    );
    Ok(())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `850ms`, `12.345s`, `4m 5s`, `1h 2m 3s`
fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    if total == 0 {
        return format!("{}ms", d.as_millis());
    }
    if total < 60 {
        return format!("{:.3}s", d.as_secs_f64());
    }

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else {
        format!("{minutes}m {seconds}s")
    }
}
