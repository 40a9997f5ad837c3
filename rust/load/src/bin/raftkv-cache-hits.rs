//! Print the service's cache-hit counter, optionally resetting it afterwards.

use std::sync::Arc;

use clap::Parser;
use raftkv_error::RaftKvError;

use raftkv_load::cli::{exit_with, load_config_or_exit};
use raftkv_load::{dial, ConnectionLedger};

#[derive(Parser, Debug)]
struct Args {
    /// Service endpoint.
    #[arg(long)]
    addr: Option<String>,
    /// Reset the counter after reading it.
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config_or_exit(|config| {
        if let Some(addr) = args.addr.as_ref() {
            config.client.endpoints = vec![addr.clone()];
        }
    });
    config.tracing().init();

    let Some(endpoint) = config.client.endpoint_for(0) else {
        eprintln!("no endpoint configured");
        std::process::exit(1);
    };
    let ledger = Arc::new(ConnectionLedger::default());
    let connection = match dial(endpoint, &config.client, ledger).await {
        Ok(connection) => connection,
        Err(err) => exit_with("could not connect", err.boxed()),
    };
    match connection.cache_hits().await {
        Ok(hits) => println!("cache hits: {}", hits),
        Err(err) => exit_with("GetCacheHits failed", err.boxed()),
    }
    if args.reset {
        if let Err(err) = connection.reset_cache_hits().await {
            exit_with("ResetCacheHits failed", err.boxed());
        }
        println!("cache hits reset");
    }
}
