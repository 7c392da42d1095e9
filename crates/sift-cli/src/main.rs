//! CLI entry point for Sift: interactive image cleanup assistant, file browser, dev commands.

use std::future::Future;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use sift_core::assistant::mentions_delete;
use sift_core::{
    app_data_dir, delete_files, is_confirmation, load_config, scan_images, set_image_root, status,
    Config, Intent, QueryResult, Session,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sift")]
#[command(about = "Sift: find and clean up desktop images with natural language")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show backend status (for dev).
    Status,
    /// Show where Sift stores its config (app data directory).
    DataDir,
    /// Remember the folder to scan and watch.
    SetRoot {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Scan a directory for images and list them (no captioning).
    Scan {
        /// Root directory to scan. Defaults to the configured root, then the desktop.
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
        /// Print the paths as a JSON array.
        #[arg(long)]
        json: bool,
    },
    /// Caption existing images, watch for new ones and answer queries interactively.
    Run {
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
        /// Skip Ollama entirely: substring search only, no captions.
        #[arg(long)]
        offline: bool,
        /// Maximum results per query.
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Serve a read-only web file browser over a directory.
    Serve {
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
        /// Address to bind, e.g. 127.0.0.1:5000.
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config();

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => {
            println!("Sift backend");
            println!("  core: {}", status());
        }
        Commands::DataDir => match app_data_dir() {
            Some(p) => println!("{}", p.display()),
            None => eprintln!("Could not determine app data directory."),
        },
        Commands::SetRoot { path } => {
            set_image_root(&path).with_context(|| format!("setting root to {}", path.display()))?;
            println!("Image root set to {}", path.display());
        }
        Commands::Scan { path, json } => {
            let root = resolve_root(path, &config)?;
            let images = scan_images(&root, &config.extensions)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&images)?);
            } else {
                println!("Scanned {} image(s) under {}", images.len(), root.display());
                for p in images {
                    println!("  {}", p.display());
                }
            }
        }
        Commands::Run { path, offline, top_k } => {
            let root = resolve_root(path, &config)?;
            let top_k = top_k.unwrap_or(config.top_k);
            run_assistant(&root, config, offline, top_k).await?;
        }
        Commands::Serve { path, addr } => {
            let root = resolve_root(path, &config)?;
            let addr = match addr {
                Some(a) => a,
                None => config
                    .server_addr
                    .parse()
                    .with_context(|| format!("invalid server_addr {:?}", config.server_addr))?,
            };
            println!("Serving {} on http://{}", root.display(), addr);
            sift_core::serve(&root, addr).await?;
        }
    }
    Ok(())
}

fn resolve_root(arg: Option<PathBuf>, config: &Config) -> anyhow::Result<PathBuf> {
    let Some(root) = arg.or_else(|| config.resolve_image_root()) else {
        bail!("no image folder given and none configured (try `sift set-root PATH`)");
    };
    if !root.is_dir() {
        bail!("not a directory: {}", root.display());
    }
    root.canonicalize()
        .with_context(|| format!("resolving {}", root.display()))
}

async fn run_assistant(root: &Path, config: Config, offline: bool, top_k: usize) -> anyhow::Result<()> {
    println!("Initializing image cleanup assistant...");
    let session = Session::connect(config, offline).await;

    println!("Processing existing images...");
    let added = session.index_root(root).await?;
    println!("Found {added} existing image(s)");

    // Held for the whole loop; dropping it stops the watch.
    let _watcher = match session.start_watching(root) {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(error = %e, "live updates disabled");
            None
        }
    };

    println!("\nSift is running!");
    println!("You can now search for and delete images using natural language.");
    println!("Example queries:");
    println!("- Find images from January 2021");
    println!("- Delete all screenshots from last week");
    println!("- Find images containing cats");
    println!("\nType 'exit' to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let Some(query) = prompt(&mut lines, "\nEnter your query: ").await else {
            break;
        };
        let query = query.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("exit") {
            break;
        }
        // Model calls can run up to the timeout; Ctrl+C must still end the loop.
        let round = handle_query(&session, &mut lines, query, top_k);
        if until_interrupted(round, tokio::signal::ctrl_c()).await != Some(true) {
            break;
        }
    }
    println!("\nShutting down...");
    Ok(())
}

/// One query round. Returns false when input ended mid-confirmation.
async fn handle_query(session: &Session, lines: &mut Lines<BufReader<Stdin>>, query: &str, top_k: usize) -> bool {
    let engine = &session.engine;
    let intent = engine.assistant().understand_query(query).await;
    tracing::debug!(?intent, "understood query");

    let results = engine.search(query, top_k).await;
    if results.is_empty() {
        println!("No matching images found.");
        return true;
    }
    print_results(&results);

    if !(mentions_delete(query) || intent.intent == Intent::Delete) {
        return true;
    }
    let message = engine.assistant().confirmation_message(&results, query).await;
    println!("\n{message}");
    let Some(reply) = prompt(lines, "Type 'yes' to confirm deletion: ").await else {
        println!("Deletion cancelled.");
        return false;
    };
    if !is_confirmation(&reply) {
        println!("Deletion cancelled.");
        return true;
    }
    for outcome in delete_files(&results, engine).await {
        match outcome.result {
            Ok(()) => println!("Deleted: {}", outcome.path.display()),
            Err(e) => println!("Error deleting {}: {}", outcome.path.display(), e),
        }
    }
    true
}

/// Output of `work`, or `None` if `interrupt` resolves first.
async fn until_interrupted<T, I>(work: impl Future<Output = T>, interrupt: I) -> Option<T>
where
    I: Future,
{
    tokio::select! {
        out = work => Some(out),
        _ = interrupt => None,
    }
}

fn print_results(results: &[QueryResult]) {
    println!("\nFound matching images:");
    for (i, r) in results.iter().enumerate() {
        println!("\n{}. Path: {}", i + 1, r.record.path.display());
        println!("   Caption: {}", r.record.caption);
        println!("   Date: {} {}", r.record.creation_date, r.record.creation_time);
        println!("   Relevance: {:.2}", r.relevance_score);
    }
}

/// Prints `text` and reads one line. `None` on EOF, read error or Ctrl+C.
async fn prompt(lines: &mut Lines<BufReader<Stdin>>, text: &str) -> Option<String> {
    print!("{text}");
    std::io::stdout().flush().ok();
    tokio::select! {
        line = lines.next_line() => match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "could not read input");
                None
            }
        },
        _ = tokio::signal::ctrl_c() => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn interrupt_cuts_long_work_short() {
        let work = async {
            tokio::time::sleep(Duration::from_secs(120)).await;
            true
        };
        let out = until_interrupted(work, tokio::time::sleep(Duration::from_millis(10))).await;
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn finished_work_is_returned() {
        let out = until_interrupted(async { true }, std::future::pending::<()>()).await;
        assert_eq!(out, Some(true));
    }
}
