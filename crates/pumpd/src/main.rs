//! pumpd — announcement subscriber daemon.
//!
//! Reads announcements one per line from the file named by the first
//! argument, or stdin when none is given, and fetches what they describe.
//!
//!   pumpd [<announcements>]
//!   pumpd announce <file> <baseUrl> [<relPath>]
//!
//! Announce mode prints one announcement per block of a local file instead.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};

use pump_core::config::PumpConfig;
use pump_core::wire::Generation;
use pump_services::{BlockTransfer, PluginPipeline, PluginRegistry};

mod announce;
mod ingest;
mod worker;

use worker::{Disposition, Worker};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = PumpConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = PumpConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        PumpConfig::default()
    });
    tracing::info!(
        instance = config.daemon.instance,
        destination = %config.transfer.destination.display(),
        "pumpd starting"
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("announce") {
        return run_announce(&config, &args[1..]).await;
    }

    let transfer = BlockTransfer::new(&config.transfer)?;
    let mut pipeline = PluginPipeline::new(PluginRegistry::with_builtins(), &config.daemon);
    if !pipeline.load_all(&config.plugins) {
        tracing::warn!("some plugins failed to load, continuing without them");
    }
    let worker = Worker::new(transfer, pipeline, config.daemon.post_generation);

    match args.first() {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("failed to open {path}"))?;
            run(&worker, file).await
        }
        None => run(&worker, tokio::io::stdin()).await,
    }
}

async fn run<R: AsyncRead + Unpin>(worker: &Worker, input: R) -> Result<()> {
    let mut lines = BufReader::new(input).lines();
    let mut stdout = tokio::io::stdout();
    let (mut seen, mut done) = (0u64, 0u64);

    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        seen += 1;
        if let Disposition::Done { post, .. } = worker.process_line(&line).await {
            done += 1;
            if let Some(post) = post {
                stdout.write_all(post.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }
    }

    tracing::info!(lines = seen, processed = done, "input exhausted");
    Ok(())
}

async fn run_announce(config: &PumpConfig, args: &[String]) -> Result<()> {
    let (file, base_url) = match args {
        [file, base_url, ..] => (file, base_url),
        _ => anyhow::bail!("usage: pumpd announce <file> <baseUrl> [<relPath>]"),
    };
    let path = std::path::Path::new(file);
    let rel_path = match args.get(2) {
        Some(rel) => rel.clone(),
        None => format!(
            "/{}",
            path.file_name()
                .context("announced path has no file name")?
                .to_string_lossy()
        ),
    };

    let generation = config.daemon.post_generation.unwrap_or(Generation::Current);
    let mut stdout = tokio::io::stdout();
    for msg in announce::announce_file(path, &config.transfer, base_url, &rel_path).await? {
        stdout.write_all(worker::render(&msg, generation)?.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }
    stdout.flush().await?;
    Ok(())
}
