//! Bulk model downloader
//!
//! Fetches every supported model into local storage ahead of time so the
//! API server can load them without network access. One model failing does
//! not stop the others; failures are listed in the summary.

use anyhow::Result;
use clap::Parser;
use logprompt::{HubModelLoader, ModelEntry, ModelLoader, ModelRegistry, ModelStorage, accelerator};
use std::path::PathBuf;
use std::time::Instant;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "logprompt-download")]
#[command(about = "Download all supported models before starting the API server")]
#[command(version)]
struct Args {
    /// Models storage directory
    #[arg(long, default_value = "./models")]
    models_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Outcome of a full download run
#[derive(Debug, Default)]
struct DownloadSummary {
    succeeded: Vec<String>,
    failed: Vec<(String, String)>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .with_target(false)
        .init();

    let storage = ModelStorage::new(args.models_dir);
    storage.ensure_root()?;

    let accelerator = *accelerator::get_or_init();
    let root = std::path::absolute(storage.root()).unwrap_or_else(|_| storage.root().to_path_buf());

    println!("LogPrompt Model Downloader");
    println!("{}", "=".repeat(50));
    println!("Downloading {} models...", ModelRegistry::count());
    println!("Storage directory: {}", root.display());
    println!("CUDA available: {}", accelerator.cuda);
    println!();

    let loader = HubModelLoader::with_accelerator(storage.clone(), accelerator);

    let summary = tokio::select! {
        summary = download_all(&loader, ModelRegistry::entries()) => summary,
        _ = signal::ctrl_c() => {
            println!();
            anyhow::bail!("Download interrupted by user");
        }
    };

    print_summary(&summary, &storage, &root);

    Ok(())
}

/// Force a remote load of every entry, collecting per-model failures
async fn download_all(loader: &dyn ModelLoader, entries: &[ModelEntry]) -> DownloadSummary {
    let total = entries.len();
    let mut summary = DownloadSummary::default();

    for (i, entry) in entries.iter().enumerate() {
        println!("[{}/{}] Processing: {}", i + 1, total, entry.name);
        let started = Instant::now();

        match loader.load_remote(entry).await {
            Ok(_) => {
                tracing::info!(
                    model = %entry.name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Successfully downloaded"
                );
                println!("  ok    {}", entry.name);
                summary.succeeded.push(entry.name.to_string());
            }
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::error!(model = %entry.name, error = %message, "Error downloading");
                println!("  fail  {}", entry.name);
                summary.failed.push((entry.name.to_string(), message));
            }
        }
    }

    summary
}

fn print_summary(summary: &DownloadSummary, storage: &ModelStorage, root: &std::path::Path) {
    println!();
    println!("{}", "=".repeat(50));

    for name in &summary.succeeded {
        let size_mb = ModelRegistry::lookup(name)
            .ok()
            .and_then(|entry| storage.stored_size(entry))
            .map(|bytes| bytes as f64 / (1024.0 * 1024.0));
        if let Some(size_mb) = size_mb {
            println!("{}: {:.1} MB", name, size_mb);
        }
    }
    println!();

    if summary.failed.is_empty() {
        println!("All models downloaded successfully!");
    } else {
        println!("{} models failed to download:", summary.failed.len());
        for (name, error) in &summary.failed {
            println!("   - {}: {}", name, error);
        }
        println!();
        println!("{} models downloaded successfully", summary.succeeded.len());
    }

    println!("Models stored in: {}", root.display());
    println!("You can now start the API server with: logprompt");
}
