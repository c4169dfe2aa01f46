//! ekiden-offline - drive the Ekiden offline agent from the command line.
//!
//! The binary plays the host: it owns the on-disk cache storage and the
//! network, and forwards lifecycle events and requests to the agent.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Method;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ekiden_offline_core::{
    AgentConfig, CacheStorage, DiskCacheStorage, FetchOutcome, Fetcher, Host, HttpFetcher,
    OfflineAgent, Request, Response,
};

const USAGE: &str = "\
Usage: ekiden-offline <command>

Commands:
  install                     Precache the app shell, then remove stale caches
  fetch <url> [--method M]    Route a request through the agent and print the response
  caches                      List cache stores and their entries
  init-config                 Write the default configuration file
  help                        Show this message

Environment:
  EKIDEN_ORIGIN               Override the application origin
  RUST_LOG                    Log filter (default: warn)";

/// Host that reports lifecycle signals to the log.
struct CliHost;

impl Host for CliHost {
    fn skip_waiting(&self) {
        info!("New version will activate immediately");
    }

    fn claim_clients(&self) {
        info!("Claimed open clients");
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    match command.as_str() {
        "install" => install().await,
        "fetch" => fetch(&args[1..]).await,
        "caches" => list_caches().await,
        "init-config" => init_config(),
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

fn build_agent(config: AgentConfig) -> Result<(OfflineAgent, Arc<HttpFetcher>)> {
    let cache_dir = config.cache_dir()?;
    let storage = DiskCacheStorage::new(cache_dir.clone())
        .with_context(|| format!("Failed to open cache storage at {}", cache_dir.display()))?;
    let fetcher = Arc::new(HttpFetcher::with_timeout(Duration::from_secs(
        config.request_timeout_secs,
    ))?);

    let agent = OfflineAgent::new(config, Arc::new(storage), fetcher.clone())?
        .with_host(Arc::new(CliHost));
    Ok((agent, fetcher))
}

async fn install() -> Result<()> {
    let (agent, _) = build_agent(AgentConfig::load()?)?;

    let count = agent.install().await?;
    println!("Cached {} static assets in {}", count, agent.config().caches.static_assets);

    // Install asked to skip waiting, so activation follows right away
    let deleted = agent.activate().await?;
    if deleted.is_empty() {
        println!("No stale caches");
    } else {
        println!("Deleted stale caches: {}", deleted.join(", "));
    }
    Ok(())
}

async fn fetch(args: &[String]) -> Result<()> {
    let mut target = None;
    let mut method = Method::GET;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--method" | "-X" => {
                let value = iter.next().context("--method needs a value")?;
                method = Method::from_bytes(value.to_ascii_uppercase().as_bytes())
                    .with_context(|| format!("Invalid method: {}", value))?;
            }
            _ if target.is_none() => target = Some(arg.clone()),
            _ => bail!("Unexpected argument: {}", arg),
        }
    }
    let Some(target) = target else {
        bail!("fetch needs a URL\n\n{}", USAGE);
    };

    let config = AgentConfig::load()?;
    let url = config
        .origin_url()?
        .join(&target)
        .with_context(|| format!("Invalid URL: {}", target))?;
    let (agent, fetcher) = build_agent(config)?;

    let request = Request::new(method, url);
    let route = agent.route(&request);

    let response = match agent.handle_fetch(&request).await? {
        FetchOutcome::Respond(response) => response,
        // Not intercepted: do what the host would do without an agent
        FetchOutcome::Passthrough => fetcher.fetch(&request).await?,
    };

    print_response(route, response)
}

fn print_response(route: ekiden_offline_core::Route, mut response: Response) -> Result<()> {
    eprintln!(
        "[{}] {} {}",
        route,
        response.status().as_u16(),
        response.status_text()
    );
    for (name, value) in response.headers() {
        eprintln!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()));
    }
    eprintln!();

    let body = response.bytes()?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(&body)?;
    stdout.flush()?;
    Ok(())
}

async fn list_caches() -> Result<()> {
    let config = AgentConfig::load()?;
    let cache_dir = config.cache_dir()?;
    let storage = DiskCacheStorage::new(cache_dir)?;

    let names = storage.keys().await?;
    if names.is_empty() {
        println!("No cache stores");
        return Ok(());
    }

    for name in names {
        let marker = if config.caches.is_current(&name) { "" } else { " (stale)" };
        let entries = storage.entries(&name).await?;
        println!("{}{} - {} entries", name, marker, entries.len());
        for entry in entries {
            println!("  {:>3}  {:<10}  {}", entry.status, entry.age_display(), entry.url);
        }
    }
    Ok(())
}

fn init_config() -> Result<()> {
    let path = AgentConfig::default().save()?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
