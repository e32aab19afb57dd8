//! toolmesh: MCP server federating local and remote tools
//!
//! Serves one tool catalog, merged from every configured remote MCP
//! endpoint, over stdio and/or streamable HTTP.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Weak};
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use toolmesh::config::{self, Config};
use toolmesh::error::ToolError;
use toolmesh::mcp::federation::Federation;
use toolmesh::mcp::registry::{Arguments, CallScope, ToolCallResult, ToolHandler};
use toolmesh::mcp::schema::{Param, ParamTree, ParamType};
use toolmesh::mcp::session::SessionManager;
use toolmesh::mcp::transport::{http, StdioTransport};
use toolmesh::mcp::Dispatcher;

/// MCP server federating local and remote tools into one catalog.
///
/// Remote MCP endpoints listed in the configuration file are merged under
/// their namespaces and served over stdio and/or HTTP.
#[derive(Parser, Debug)]
#[command(name = "toolmesh")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,

    /// Serve streamable HTTP on this address (overrides the config file)
    #[arg(long, value_name = "ADDR")]
    http: Option<SocketAddr>,

    /// Do not serve on stdin/stdout
    #[arg(long)]
    no_stdio: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the toolmesh server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let mut cfg = match config::load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // CLI overrides
    if let Some(addr) = args.http {
        cfg.transport.http_addr = Some(addr);
    }
    if args.no_stdio {
        cfg.transport.stdio = false;
    }
    if let Err(e) = cfg.validate() {
        eprintln!("Configuration error: {e}");
        return ExitCode::FAILURE;
    }

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    // Display GPL license notice (required by GPLv3 Section 5d)
    eprintln!(
        "toolmesh {}  Copyright (C) 2026  The Embedded Society",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("This program comes with ABSOLUTELY NO WARRANTY.");
    eprintln!("This is free software, licensed under GPL-3.0-or-later.");
    eprintln!("Source: {}", env!("CARGO_PKG_REPOSITORY"));
    eprintln!();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting toolmesh");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg)) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

/// Builds the federation and dispatcher, then runs every enabled transport
/// until shutdown.
async fn run(cfg: Config) -> io::Result<()> {
    let federation = Arc::new(Federation::new());
    register_builtin_tools(&federation).await;

    for remote in &cfg.remotes {
        let endpoint = remote.endpoint().map_err(io::Error::other)?;
        if let Err(e) = federation.register_remote(endpoint).await {
            warn!(endpoint = %remote.url, error = %e, "Skipping remote endpoint");
        }
    }

    let sessions = cfg.session.build();
    let mut dispatcher =
        Dispatcher::new(Arc::clone(&federation)).with_server_info(cfg.server.server_info());
    if let Some(sessions) = &sessions {
        dispatcher = dispatcher.with_sessions(Arc::clone(sessions));
    }
    let dispatcher = Arc::new(dispatcher);

    let shutdown = CancellationToken::new();
    let mut tasks: JoinSet<io::Result<()>> = JoinSet::new();

    if let Some(sessions) = sessions {
        tasks.spawn(sweep_sessions(
            sessions,
            cfg.session.sweep_interval(),
            cfg.session.idle_timeout(),
            shutdown.clone(),
        ));
    }

    let http_enabled = cfg.transport.http_addr.is_some();
    if let Some(addr) = cfg.transport.http_addr {
        let listener = TcpListener::bind(addr).await?;
        let dispatcher = Arc::clone(&dispatcher);
        let path = cfg.transport.http_path.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(async move { http::serve(listener, dispatcher, &path, shutdown).await });
    }

    if cfg.transport.stdio {
        let dispatcher = Arc::clone(&dispatcher);
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            let result = StdioTransport::new()
                .serve(dispatcher, shutdown.clone())
                .await;
            if !http_enabled {
                // Client closed stdin and nothing else is being served.
                shutdown.cancel();
            }
            result
        });
    }

    {
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            tokio::select! {
                result = wait_for_signal() => {
                    shutdown.cancel();
                    result
                }
                () = shutdown.cancelled() => Ok(()),
            }
        });
    }

    let mut outcome = Ok(());
    while let Some(joined) = tasks.join_next().await {
        let result = joined.map_err(io::Error::other).and_then(|r| r);
        if let Err(e) = result {
            error!(error = %e, "Task failed, shutting down");
            shutdown.cancel();
            if outcome.is_ok() {
                outcome = Err(e);
            }
        }
    }
    outcome
}

/// Waits for SIGINT or SIGTERM.
#[cfg(unix)]
async fn wait_for_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
    }
    Ok(())
}

/// Waits for Ctrl+C.
#[cfg(windows)]
async fn wait_for_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, initiating graceful shutdown");
    Ok(())
}

/// Periodically reaps idle sessions.
async fn sweep_sessions(
    sessions: Arc<dyn SessionManager>,
    every: Duration,
    max_idle: Duration,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            _ = ticker.tick() => {
                if let Err(e) = sessions.cleanup_expired_sessions(max_idle).await {
                    warn!(error = %e, "Session sweep failed");
                }
            }
        }
    }
}

/// Registers the server's own administrative tools.
async fn register_builtin_tools(federation: &Arc<Federation>) {
    let weak: Weak<Federation> = Arc::downgrade(federation);
    let refresh: Arc<dyn ToolHandler> = Arc::new(move |_args: Arguments, _scope: CallScope| {
        let weak = weak.clone();
        async move {
            let federation = weak
                .upgrade()
                .ok_or_else(|| ToolError::Internal("server is shutting down".to_string()))?;
            let report = federation.refresh_tools().await;
            let failed: Vec<_> = report
                .failed
                .iter()
                .map(|(url, error)| json!({ "url": url, "error": error }))
                .collect();
            Ok::<_, ToolError>(ToolCallResult::structured(json!({
                "refreshed": report.refreshed,
                "failed": failed,
            })))
        }
    });

    federation
        .register_tool(
            "toolmesh_refresh",
            "Re-fetch the tool lists of all remote endpoints",
            ParamTree::new()
                .output(Param::array("refreshed", ParamType::String).required())
                .output(
                    Param::array("failed", ParamType::Object)
                        .required()
                        .child(Param::string("url").required())
                        .child(Param::string("error").required()),
                ),
            refresh,
        )
        .await;
}
