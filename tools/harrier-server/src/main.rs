// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `harrier-server <http_port> <num_threads>`
//!
//! HTTP file service on `http_port`, KV service on `http_port + 1`, one
//! shared event loop. Stops on `GET /quit` against either port, or on
//! Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use harrier::io::ServiceManager;
use harrier::service::{HttpService, KvService};
use log::LevelFilter;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "harrier-server",
    version,
    about = "Multi-threaded HTTP/KV server"
)]
struct Args {
    /// Port for the HTTP file service (the KV service takes the next one)
    http_port: u16,

    /// Worker threads serving requests
    num_threads: usize,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> Result<()> {
    let args = Args::parse();
    harrier::logging::init(args.log_level);

    anyhow::ensure!(args.num_threads > 0, "need at least one worker thread");
    anyhow::ensure!(args.http_port < u16::MAX, "no room for the KV port");

    let manager = Arc::new(
        ServiceManager::new(args.num_threads).context("cannot create service manager")?,
    );
    let http = HttpService::new(args.http_port, &manager)
        .with_context(|| format!("cannot bind HTTP service on port {}", args.http_port))?;
    let kv = KvService::new(args.http_port + 1, &manager)
        .with_context(|| format!("cannot bind KV service on port {}", args.http_port + 1))?;

    log::info!(
        "[SERVER] http on {}, kv on {}, {} workers",
        http.port(),
        kv.port(),
        args.num_threads
    );

    {
        let manager = manager.clone();
        ctrlc::set_handler(move || {
            log::info!("[SERVER] interrupted, stopping");
            manager.request_stop();
        })
        .context("cannot install signal handler")?;
    }

    manager.run();
    log::info!("[SERVER] bye");
    Ok(())
}
