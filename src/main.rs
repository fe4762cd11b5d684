use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;

use wearprep::config::{PipelineConfig, RunMode};
use wearprep::constants;
use wearprep::discovery;
use wearprep::error::Result;
use wearprep::logging;
use wearprep::notify::LogNotifier;
use wearprep::pipeline::dedup::ledger::{DuplicateLedger, LedgerConfig};
use wearprep::pipeline::{self, combine, dedup, recombine, stage, RunRequest};
use wearprep::types::StreamKind;

#[derive(Parser)]
#[command(name = "wearprep")]
#[command(about = "Wearable-sensor export deduplication and upload prep")]
#[command(version = "0.1.0")]
struct Cli {
    /// Print debug-level progress information
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy raw export files into the deduplication staging tree
    Stage {
        /// Root of the extracted export to stage
        #[arg(long)]
        root: PathBuf,
        /// Streams to stage (comma-separated). Available: acc, eda, temp
        #[arg(long)]
        streams: Option<String>,
        /// Stage all streams, ignore --streams
        #[arg(long)]
        all_streams: bool,
    },
    /// Classify and remove duplicate rows in the staged files
    Dedup {
        /// Only process files for this month token (8digits_8digits)
        #[arg(long)]
        month: Option<String>,
        /// Streams to process (comma-separated). Available: acc, eda, temp
        #[arg(long)]
        streams: Option<String>,
        /// Process all streams, ignore --streams
        #[arg(long)]
        all_streams: bool,
        /// Count duplicates without dropping any rows
        #[arg(long)]
        scan_only: bool,
        /// Record counts in the sandbox ledger instead of the production one
        #[arg(long)]
        sandbox: bool,
    },
    /// Merge cleaned files into per-stream partition files
    Combine {
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        streams: Option<String>,
        #[arg(long)]
        all_streams: bool,
    },
    /// Repack combined files into size-bounded upload shards
    Recombine {
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        streams: Option<String>,
        #[arg(long)]
        all_streams: bool,
        /// Directory the upload shards are written to
        #[arg(long, default_value = "upload")]
        output_dir: PathBuf,
    },
    /// Run the full pipeline (stage, dedup, combine, recombine)
    Run {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        streams: Option<String>,
        #[arg(long)]
        all_streams: bool,
        #[arg(long, default_value = "upload")]
        output_dir: PathBuf,
        #[arg(long)]
        scan_only: bool,
        #[arg(long)]
        sandbox: bool,
    },
}

fn resolve_streams(streams: Option<String>, all_streams: bool) -> anyhow::Result<Vec<StreamKind>> {
    if all_streams {
        return Ok(StreamKind::ALL.to_vec());
    }
    let Some(list) = streams else {
        anyhow::bail!(
            "You must specify --streams or --all-streams. Available: {}",
            constants::supported_streams().join(", ")
        );
    };
    let mut resolved = Vec::new();
    for name in list.split(',').map(str::trim) {
        match StreamKind::from_name(name) {
            Some(stream) => resolved.push(stream),
            None => anyhow::bail!(
                "Unknown stream: {} (available: {})",
                name,
                constants::supported_streams().join(", ")
            ),
        }
    }
    Ok(resolved)
}

fn open_ledger(config: &PipelineConfig, sandbox: bool) -> Result<DuplicateLedger> {
    let mode = if sandbox {
        RunMode::Sandbox
    } else {
        RunMode::Production
    };
    DuplicateLedger::open(&LedgerConfig {
        dir: config.ledger_dir.clone(),
        mode,
    })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    logging::init_logging(cli.verbose);

    let config = PipelineConfig::load()?;

    match cli.command {
        Commands::Stage {
            root,
            streams,
            all_streams,
        } => {
            println!("📦 Staging raw files from {}...", root.display());
            let streams = resolve_streams(streams, all_streams)?;
            let files = discovery::filter_streams(
                discovery::discover_stream_files(&root)?,
                &streams,
            );
            let report = stage::stage_files(&files, &config.dedup_dir())?;
            println!(
                "✅ Staged {} files ({} bytes) across {} month(s)",
                report.files_copied,
                report.bytes_copied,
                report.months.len()
            );
        }
        Commands::Dedup {
            month,
            streams,
            all_streams,
            scan_only,
            sandbox,
        } => {
            if scan_only {
                println!("🔍 Scanning staged files for duplicates...");
            } else {
                println!("🧹 Deduplicating staged files...");
            }
            let streams = resolve_streams(streams, all_streams)?;
            let ledger = open_ledger(&config, sandbox)?;
            let report = dedup::dedup_staged(&config, month.as_deref(), &streams, &ledger, scan_only)?;

            println!("\n📊 Deduplication results:");
            println!("   Files processed: {}", report.files_processed);
            println!("   Rows seen: {}", report.rows_seen);
            println!("   Rows dropped: {}", report.rows_dropped);
            println!("   Ledger: {}", ledger.path().display());
            if !report.errors.is_empty() {
                println!("\n⚠️  Errors encountered:");
                for error in &report.errors {
                    println!("   - {}", error);
                }
            }
        }
        Commands::Combine {
            month,
            streams,
            all_streams,
        } => {
            println!("🔗 Combining cleaned files...");
            let streams = resolve_streams(streams, all_streams)?;
            let months = match month {
                Some(m) => vec![m],
                None => pipeline::month_dirs(&config.dedup_dir())?,
            };
            if months.is_empty() {
                println!("⚠️  No staged months found under {}", config.dedup_dir().display());
            }
            for month in &months {
                for stream in &streams {
                    match combine::combine_stream(&config, month, *stream) {
                        Ok(report) => println!(
                            "✅ {}/{}: {} files -> {} partitions ({} rows)",
                            month,
                            stream,
                            report.files_in,
                            report.partitions.len(),
                            report.rows
                        ),
                        Err(e) => {
                            error!("Combine failed for {}/{}: {}", month, stream, e);
                            println!("❌ {}/{} failed: {}", month, stream, e);
                        }
                    }
                }
            }
        }
        Commands::Recombine {
            month,
            streams,
            all_streams,
            output_dir,
        } => {
            println!("📤 Repacking combined files into upload shards...");
            let streams = resolve_streams(streams, all_streams)?;
            let months = match month {
                Some(m) => vec![m],
                None => pipeline::month_dirs(&config.pending_dir())?,
            };
            if months.is_empty() {
                println!(
                    "⚠️  No combined months found under {}",
                    config.pending_dir().display()
                );
            }
            for month in &months {
                for stream in &streams {
                    let dir = config.pending_dir().join(month).join(stream.name());
                    let inputs = recombine::partition_files(&dir)?;
                    match recombine::recombine_stream(
                        &inputs,
                        *stream,
                        &output_dir.join(month),
                        config.max_shard_bytes,
                    ) {
                        Ok(report) => println!(
                            "✅ {}/{}: {} files -> {} shards ({} rows)",
                            month,
                            stream,
                            report.files_in,
                            report.shards.len(),
                            report.rows_out
                        ),
                        Err(e) => {
                            error!("Recombine failed for {}/{}: {}", month, stream, e);
                            println!("❌ {}/{} failed: {}", month, stream, e);
                        }
                    }
                }
            }
        }
        Commands::Run {
            root,
            month,
            streams,
            all_streams,
            output_dir,
            scan_only,
            sandbox,
        } => {
            println!("🚀 Running full pipeline...");
            let streams = resolve_streams(streams, all_streams)?;
            let ledger = open_ledger(&config, sandbox)?;
            let request = RunRequest {
                root,
                streams,
                month,
                output_dir,
                scan_only,
            };
            match pipeline::run_full(&config, &request, &ledger, &LogNotifier) {
                Ok(summary) => {
                    println!("\n📊 Pipeline results for run {}:", summary.run_id);
                    println!("   Staged files: {}", summary.staged_files);
                    println!("   Classified files: {}", summary.classified_files);
                    println!("   Rows seen: {}", summary.rows_seen);
                    println!("   Rows dropped: {}", summary.rows_dropped);
                    println!("   Partitions written: {}", summary.partitions_written);
                    println!("   Shards written: {}", summary.shards_written);
                    println!("   Summary file: {}", summary.summary_file);
                    if !summary.errors.is_empty() {
                        println!("\n⚠️  Errors encountered:");
                        for error in &summary.errors {
                            println!("   - {}", error);
                        }
                    }
                }
                Err(e) => {
                    error!("Pipeline failed: {}", e);
                    println!("❌ Pipeline failed: {}", e);
                }
            }
        }
    }
    Ok(())
}
