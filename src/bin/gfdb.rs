//! GFDB command line
//!
//! Usage:
//!   gfdb ingest <db-path> <file>...
//!   gfdb list   <db-path>
//!   gfdb info   <db-path> <file-id>
//!   gfdb dump   <db-path> <file-id> [limit]
//!   gfdb delete <db-path> <file-id>
//!
//! Logs go to stderr, command output to stdout.

use std::process;

use anyhow::{bail, Context};

use gfdb::{Database, FeatureGroup, FileId, IngestConfig};

fn usage() -> ! {
    eprintln!("Usage: gfdb <command> <db-path> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  ingest <db-path> <file>...           Ingest files (format detected per file)");
    eprintln!("  list   <db-path>                     List ingested file ids");
    eprintln!("  info   <db-path> <file-id>           Show metadata of a file");
    eprintln!("  dump   <db-path> <file-id> [limit]   Print feature groups as JSON lines");
    eprintln!("  delete <db-path> <file-id>           Remove a file and its chunks");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  GFDB_CHUNK_SIZE, GFDB_YIELD_EVERY, GFDB_READ_BUFFER   ingestion settings");
    eprintln!("  GFDB_DEBUG                                            verbose output");
    process::exit(1);
}

fn parse_file_id(arg: Option<&String>) -> anyhow::Result<FileId> {
    let Some(raw) = arg else { usage() };
    raw.parse()
        .map_err(|_| anyhow::anyhow!("invalid file id {:?} (expected 32 hex digits)", raw))
}

fn print_group(group: &FeatureGroup) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(group)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let level = if std::env::var("GFDB_DEBUG").is_ok() {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        usage();
    }
    let command = args[1].as_str();
    let db = Database::open(&args[2])
        .with_context(|| format!("opening database {}", args[2]))?
        .with_config(IngestConfig::from_env());

    match command {
        "ingest" => {
            if args.len() < 4 {
                usage();
            }
            let mut failed = 0usize;
            for path in &args[3..] {
                match db.ingest_path(path).await {
                    Ok(outcome) => println!(
                        "{}\t{}\t{}\t{} groups\t{} chunks",
                        outcome.file_id, path, outcome.format, outcome.total_features, outcome.total_chunks
                    ),
                    Err(e) => {
                        eprintln!("[gfdb] {}: {}", path, e);
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                bail!("{} of {} files failed", failed, args.len() - 3);
            }
        }
        "list" => {
            for file_id in db.list_files().await? {
                println!("{}", file_id);
            }
        }
        "info" => {
            let proxy = db.open_file(parse_file_id(args.get(3))?);
            let state = proxy.load_metadata().await?;
            let record = gfdb::store::MetadataRecord::from(state);
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        "dump" => {
            let proxy = db.open_file(parse_file_id(args.get(3))?);
            let limit = match args.get(4) {
                Some(raw) => raw.parse::<usize>().with_context(|| format!("invalid limit {:?}", raw))?,
                None => usize::MAX,
            };
            let mut cursor = proxy.features().cursor();
            let mut printed = 0usize;
            while printed < limit {
                match cursor.next().await? {
                    Some(group) => print_group(&group)?,
                    None => break,
                }
                printed += 1;
            }
        }
        "delete" => {
            let file_id = parse_file_id(args.get(3))?;
            db.delete_file(file_id).await?;
            println!("deleted {}", file_id);
        }
        _ => usage(),
    }

    Ok(())
}
