// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! dpld: the HTTP server over a local ledger.
//!
//! Usage: `dpld [--base-path DIR] [--participant-id ID] [--bind ADDR]`
//! (environment: `DPL_BASE_DIR`, `DPL_PARTICIPANT_ID`, `DPL_HTTP_PORT`,
//! `DPL_LOG_FILE`).

use dpl_core::LedgerConfig;
use dpl_server::{env, router, AppState};
use fs2::FileExt;
use std::fs::File;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

struct Args {
    base_path: Option<PathBuf>,
    participant_id: Option<String>,
    bind: Option<SocketAddr>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args { base_path: None, participant_id: None, bind: None };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--base-path" => {
                let value = iter.next().ok_or("--base-path needs a value")?;
                args.base_path = Some(PathBuf::from(value));
            }
            "--participant-id" => {
                args.participant_id = Some(iter.next().ok_or("--participant-id needs a value")?);
            }
            "--bind" => {
                let value = iter.next().ok_or("--bind needs a value")?;
                args.bind = Some(value.parse().map_err(|e| format!("invalid bind addr: {e}"))?);
            }
            "--help" | "-h" => {
                return Err(
                    "usage: dpld [--base-path DIR] [--participant-id ID] [--bind ADDR]".into()
                );
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match env::log_file() {
        Some(path) => {
            let dir = path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
            let file = path.file_name().map(PathBuf::from).unwrap_or_else(|| "dpld.log".into());
            let appender = tracing_appender::rolling::never(dir, file);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(appender).init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

/// Take the single-instance lock, writing our pid into it.
fn acquire_pid_lock(base_path: &std::path::Path) -> std::io::Result<File> {
    std::fs::create_dir_all(base_path)?;
    let path = base_path.join("dpld.pid");
    let mut file = File::create(&path)?;
    file.try_lock_exclusive()?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };

    let base_path = match args.base_path.or_else(env::base_dir) {
        Some(path) => path,
        None => {
            eprintln!("could not determine base path; pass --base-path or set DPL_BASE_DIR");
            std::process::exit(2);
        }
    };
    let participant_id = args.participant_id.unwrap_or_else(env::participant_id);
    let bind = args
        .bind
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], env::http_port())));

    // Held for the life of the process
    let _pid_lock = match acquire_pid_lock(&base_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("failed to acquire pid lock (another dpld running?): {e}");
            std::process::exit(1);
        }
    };

    let config = LedgerConfig::new(&base_path);
    if let Err(e) = config.validate() {
        eprintln!("invalid configuration: {e}");
        std::process::exit(2);
    }

    let state = Arc::new(AppState::new(participant_id.clone(), config));
    let app = router(state);

    let listener = match tokio::net::TcpListener::bind(bind).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to bind {bind}: {e}");
            std::process::exit(1);
        }
    };
    info!(
        bind = %bind,
        base = %base_path.display(),
        participant = %participant_id,
        version = env::VERSION,
        "dpld listening"
    );

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
    info!("dpld stopped");
}
