//! Main entry point for ytresolve CLI

use anyhow::{bail, Context};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ytresolve::cli::output::OutputFormatter;
use ytresolve::cli::{Args, VerbosityLevel};
use ytresolve::utils::{extract_video_id, load_cookie_file};
use ytresolve::{Resolution, Resolver, StaticCookies};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbosity_level())?;
    debug!("Starting ytresolve with args: {:?}", args);

    let mut formatter = OutputFormatter::new(args.verbosity_level());

    let mut resolver = Resolver::with_http(args.http_config())
        .context("failed to build HTTP client")?
        .with_chunk_size(args.chunk_size)
        .with_probe_concurrency(args.probe_concurrency);

    if let Some(path) = &args.cookies {
        let cookies = load_cookie_file(path)
            .with_context(|| format!("failed to load cookies from {}", path.display()))?;
        resolver = resolver.with_cookies(Arc::new(StaticCookies::new(cookies)));
    }

    let mut video_ids = Vec::with_capacity(args.inputs.len());
    let mut failures = 0usize;
    for input in &args.inputs {
        match extract_video_id(input) {
            Ok(id) => video_ids.push(id),
            Err(e) => {
                formatter.error(&e.to_string());
                failures += 1;
            }
        }
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, finishing the current video");
            on_interrupt.cancel();
        }
    });

    formatter.start_spinner(&format!("Resolving {} video(s)...", video_ids.len()));
    let results = resolver
        .resolve_many(&video_ids, &args.resolve_options(), &cancel)
        .await;
    formatter.finish_spinner();

    for (video_id, result) in results {
        match result {
            Ok(resolution) => print_resolution(&formatter, &args, &resolution)?,
            Err(e) => {
                formatter.error(&format!("{}: {}", video_id, e));
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} input(s) failed", failures, args.inputs.len());
    }
    Ok(())
}

fn print_resolution(
    formatter: &OutputFormatter,
    args: &Args,
    resolution: &Resolution,
) -> anyhow::Result<()> {
    if args.json {
        formatter.print_json(resolution)?;
        return Ok(());
    }

    match resolution {
        Resolution::Listing { video } => formatter.print_listing(video),
        Resolution::Selected { entry, .. } if args.print_url => formatter.print_urls(entry),
        Resolution::Selected { video, entry } => formatter.print_selection(video, entry),
        Resolution::Live { endpoint } => formatter.print_live(endpoint, args.print_url),
    }
    Ok(())
}

/// Initialize logging system
fn init_logging(verbosity: VerbosityLevel) -> anyhow::Result<()> {
    let default_level = match verbosity {
        VerbosityLevel::Quiet => "error",
        VerbosityLevel::Normal => "info",
        VerbosityLevel::Verbose => "debug",
    };

    // RUST_LOG wins over the command line flags
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());
    let filter = tracing_subscriber::EnvFilter::try_new(&log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .try_init()?;

    Ok(())
}
