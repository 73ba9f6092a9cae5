// Copyright 2025 Rotor Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Rotor CLI Entry Point
//!
//! Main binary for the rotor TCP acceptor.
//!
//! ## Usage
//!
//! ```bash
//! # Start a server on 127.0.0.1:9000 with two workers
//! rotor serve
//!
//! # Custom address, pool size and reply delay
//! rotor serve -a 0.0.0.0 -p 9100 -w 4 --reply-delay-ms 250
//!
//! # Connect and print whatever the server replies
//! rotor probe 127.0.0.1:9000
//! ```
//!
//! Stop a running server with Ctrl-C or SIGTERM. Queued connections receive
//! `UNEXPECTEDLY CLOSED`; connections already being served finish first.

use anyhow::Result;
use argh::FromArgs;
use rotor_common::Probe;
use rotor_server::{HelloHandler, Server, ServerConfig};
use std::time::Duration;

#[derive(FromArgs)]
/// rotor - round-robin TCP acceptor
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Probe(ProbeArgs),
}

/// Arguments for running the server.
///
/// All values are read once at startup.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start the acceptor and its worker pool
struct ServeArgs {
    /// IPv4 address to bind to
    #[argh(option, short = 'a', default = "\"127.0.0.1\".into()")]
    address: String,

    /// TCP port to bind to
    #[argh(option, short = 'p', default = "9000")]
    port: u16,

    /// number of worker threads
    ///
    /// Connections are assigned to workers in strict rotation.
    #[argh(option, short = 'w', default = "2")]
    workers: usize,

    /// listen backlog passed to the kernel
    #[argh(option, long = "backlog", default = "1024")]
    backlog: i32,

    /// delay before each HELLO reply, in milliseconds
    #[argh(option, long = "reply-delay-ms", default = "10000")]
    reply_delay_ms: u64,
}

/// Arguments for probing a running server.
#[derive(FromArgs)]
#[argh(subcommand, name = "probe")]
/// connect to a server and print its reply
struct ProbeArgs {
    /// address of the server, e.g. 127.0.0.1:9000
    #[argh(positional)]
    server_address: String,

    /// connect and read timeout in milliseconds
    #[argh(option, long = "timeout-ms", default = "15000")]
    timeout_ms: u64,
}

fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    match cli.command {
        Commands::Serve(args) => run_serve(args),
        Commands::Probe(args) => run_probe(args),
    }
}

/// Executes the `serve` subcommand.
///
/// Installs the process-wide server, routes SIGINT/SIGTERM to it and blocks
/// until shutdown has joined every worker.
fn run_serve(args: ServeArgs) -> Result<()> {
    // Default to INFO, RUST_LOG overrides
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = ServerConfig::new()
        .with_address(args.address)
        .with_port(args.port)
        .with_workers(args.workers)
        .with_backlog(args.backlog);
    let handler = HelloHandler::new().with_reply_delay(Duration::from_millis(args.reply_delay_ms));

    tracing::info!("Reply delay: {}ms", args.reply_delay_ms);

    let server = Server::install(config, handler)?;
    let signals = rotor_server::signals::install(server.stop_handle())?;

    server.run()?;
    signals.close();

    let metrics = server.metrics();
    tracing::info!(
        "Served {} connection(s), rejected {} during shutdown",
        metrics.completed,
        metrics.drained + metrics.aborted
    );

    Ok(())
}

/// Executes the `probe` subcommand.
///
/// No logging is initialized so stdout carries only the server's reply.
fn run_probe(args: ProbeArgs) -> Result<()> {
    let reply = Probe::new()
        .with_timeout(Duration::from_millis(args.timeout_ms))
        .fetch(&args.server_address)?;

    print!("{}", String::from_utf8_lossy(reply.as_bytes()));
    Ok(())
}
