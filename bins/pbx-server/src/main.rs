use std::net::TcpListener;
use std::path::Path;
use std::process::exit;
use std::sync::Arc;
use std::thread;

use clap::Parser;

use pbx_config::PbxConfig;
use pbx_core::debug;
use pbx_switch::Pbx;

mod adapter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "PBX switch server",
    long_about = "Accepts telephone-unit connections over TCP and runs the PBX call-control \
                  state machine for each one."
)]
struct Args {
    /// TCP port to listen on. May instead be supplied by `--config`'s file.
    #[arg(long)]
    port: Option<u16>,

    /// Upper bound on simultaneously registered extensions.
    #[arg(long)]
    max_extensions: Option<u32>,

    /// Path to a verbose (debug-level) log file. Stdout always gets info level.
    #[arg(long)]
    log_file: Option<String>,

    /// Optional TOML file supplying defaults for any flag not passed on the command line.
    #[arg(long)]
    config: Option<String>,
}

/// Builds the effective configuration: CLI flags first, an optional TOML
/// overlay filling in whatever wasn't passed, validated before use. A port
/// left unset on the CLI is represented as `0` so `--config`'s file can still
/// supply one; `validate()` rejects `0` if neither source ever sets it.
fn resolve_config(args: &Args) -> PbxConfig {
    let mut cfg = PbxConfig::new(args.port.unwrap_or(0));
    if let Some(max_extensions) = args.max_extensions {
        cfg.max_extensions = max_extensions;
    }
    if let Some(log_file) = &args.log_file {
        cfg.log_file = Some(log_file.clone());
    }

    if let Some(path) = &args.config {
        cfg = match pbx_config::toml_config::apply_overlay(cfg, Path::new(path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                println!("Failed to load configuration from {}: {}", path, e);
                exit(1);
            }
        };
    }

    if let Err(e) = cfg.validate() {
        println!("Invalid configuration: {}", e);
        exit(1);
    }
    cfg
}

fn main() -> std::io::Result<()> {
    let args = Args::parse();
    let cfg = resolve_config(&args);
    let _log_guard = debug::setup_logging_default(cfg.log_file.clone());

    let pbx = Arc::new(Pbx::new(cfg.max_extensions));

    let shutdown_pbx = pbx.clone();
    ctrlc::set_handler(move || {
        tracing::info!("signal received, shutting down");
        shutdown_pbx.shutdown();
        exit(0);
    })
    .expect("failed to set signal handler");

    let listener = match TcpListener::bind(("0.0.0.0", cfg.port)) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(port = cfg.port, error = %e, "failed to bind listener");
            exit(1);
        }
    };
    tracing::info!(port = cfg.port, max_extensions = cfg.max_extensions, "pbx-server listening");

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let pbx = pbx.clone();
                let max_extensions = cfg.max_extensions;
                thread::spawn(move || {
                    if let Err(e) = adapter::handle_client(&pbx, stream, max_extensions) {
                        tracing::warn!(error = %e, "client handler exited with error");
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to accept connection");
            }
        }
    }

    Ok(())
}
