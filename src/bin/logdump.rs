//! blockwal log dump tool
//!
//! Prints the logical records of a log file, optionally decoding them as
//! write batches.

use std::path::PathBuf;

use blockwal::batch::{Operation, WriteBatch};
use blockwal::wal::{FileSource, LogReader};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

/// blockwal log dump
#[derive(Parser, Debug)]
#[command(name = "logdump")]
#[command(about = "Dump the records of a blockwal log file")]
#[command(version)]
struct Args {
    /// Log file to read
    path: PathBuf,

    /// Decode each record as a write batch
    #[arg(short, long)]
    batches: bool,

    /// Skip checksum verification
    #[arg(long)]
    no_verify: bool,

    /// Start at the first record at or after this byte offset
    #[arg(short, long, default_value = "0")]
    offset: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,blockwal=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        tracing::error!("Dump failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> blockwal::Result<()> {
    tracing::info!("blockwal logdump v{}", blockwal::VERSION);

    let source = FileSource::open(&args.path)?;
    let mut reader = LogReader::new(source, !args.no_verify, args.offset);

    while let Some(record) = reader.read_record()? {
        let offset = reader.last_record_offset();
        println!("--- offset {} length {}", offset, record.len());

        if !args.batches {
            continue;
        }

        match WriteBatch::from_contents(&record).and_then(|batch| batch.operations()) {
            Ok(operations) => {
                for (sequence, op) in operations {
                    match op {
                        Operation::Put { key, value } => {
                            println!("  put    @{} {} => {}", sequence, escape(&key), escape(&value))
                        }
                        Operation::Delete { key } => {
                            println!("  delete @{} {}", sequence, escape(&key))
                        }
                    }
                }
            }
            Err(e) => println!("  ({})", e),
        }
    }

    let stats = reader.stats();
    println!(
        "records: {}  corruptions: {}  bytes dropped: {}  truncated tail: {}",
        stats.records, stats.corruptions, stats.bytes_dropped, stats.truncated_tail
    );

    Ok(())
}

/// Printable form of a key or value
fn escape(bytes: &[u8]) -> String {
    bytes
        .iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect()
}
