//! Timeskip CLI

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context};
use timeskip::config::{Config, ReaderConfig};
use timeskip::storage::{MessageReader, FILE_EXTENSION};
use timeskip::summary::RecordingSummary;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Payload bytes shown per record by `dump`
const PREVIEW_BYTES: usize = 16;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let options = match parse_options(&args[2..]) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{e}");
            print_usage();
            process::exit(1);
        }
    };

    let result = match command {
        "info" => show_info(&options),
        "dump" => dump(&options),
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'timeskip' for usage information.");
            process::exit(1);
        }
    };

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        let truncated = err
            .downcast_ref::<timeskip::Error>()
            .is_some_and(timeskip::Error::is_truncation);
        process::exit(if truncated { 2 } else { 1 });
    }
}

fn print_usage() {
    eprintln!("Timeskip v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: timeskip <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  info <file>                Show header, totals and digest");
    eprintln!("  dump <file> [--limit N]    Print one line per record");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <file>            TOML config ([reader] limits)");
    eprintln!();
    eprintln!("Exit status is 2 when the recording ends in a truncated record.");
}

struct Options {
    file: PathBuf,
    limit: Option<u64>,
    reader: ReaderConfig,
}

fn parse_options(args: &[String]) -> anyhow::Result<Options> {
    let mut file = None;
    let mut limit = None;
    let mut reader = ReaderConfig::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--limit" => {
                let value = iter.next().context("--limit needs a value")?;
                limit = Some(
                    value
                        .parse()
                        .with_context(|| format!("invalid --limit value '{value}'"))?,
                );
            }
            "--config" => {
                let path = iter.next().context("--config needs a file")?;
                reader = Config::from_file(Path::new(path))?.reader;
            }
            _ if file.is_none() => file = Some(PathBuf::from(arg)),
            _ => bail!("unexpected argument '{arg}'"),
        }
    }

    let file: PathBuf = file.context("missing recording file")?;
    if file.extension().and_then(|ext| ext.to_str()) != Some(FILE_EXTENSION) {
        warn!("{} does not have a .{FILE_EXTENSION} extension", file.display());
    }

    Ok(Options {
        file,
        limit,
        reader,
    })
}

fn show_info(options: &Options) -> anyhow::Result<()> {
    let path = options.file.as_path();
    let summary = RecordingSummary::scan_with(path, options.reader.clone())?;

    println!("Recording:      {}", path.display());
    println!("Format version: {}", summary.header.version);
    println!("Start time:     {} ns", summary.header.start_time_ns);
    println!("Messages:       {}", summary.records);
    println!("Payload bytes:  {}", summary.payload_bytes);
    println!("Duration:       {:?}", summary.duration());
    println!("Digest:         {}", summary.digest);

    if !summary.topics.is_empty() {
        println!();
        println!("Topics:");
        for (topic, count) in &summary.topics {
            println!("  {count:>10}  {topic}");
        }
    }

    if let Some(cut) = summary.truncation {
        return Err(timeskip::Error::from(cut).into());
    }

    Ok(())
}

fn dump(options: &Options) -> anyhow::Result<()> {
    let mut reader = MessageReader::open_with(&options.file, options.reader.clone())?;
    println!(
        "# version {} start {} ns",
        reader.header().version,
        reader.start_time_ns()
    );

    let mut shown = 0u64;
    for record in reader.read_all_messages() {
        if options.limit.is_some_and(|limit| shown >= limit) {
            break;
        }
        let record = record?;

        let preview_len = record.payload.len().min(PREVIEW_BYTES);
        let ellipsis = if record.payload.len() > PREVIEW_BYTES { ".." } else { "" };
        println!(
            "{shown:>8}  sent={} received={} topic={} size={} data={}{ellipsis}",
            record.sent_ns,
            record.received_ns,
            record.topic_lossy(),
            record.payload.len(),
            hex::encode(&record.payload[..preview_len]),
        );
        shown += 1;
    }

    Ok(())
}
