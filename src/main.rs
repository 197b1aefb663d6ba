use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use sysdb::config::SysdbConfig;
use sysdb::scheduler::Scheduler;
use sysdb::server;
use sysdb::store::Store;

/// SysDB daemon: an in-memory system-information database server.
#[derive(Parser, Debug)]
#[command(name = "sysdbd", version, about)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short = 'C', long = "config", default_value = "/etc/sysdb/sysdbd.conf")]
    config: String,

    /// Do not daemonize (stay in the foreground).
    #[arg(short = 'D', long = "no-daemon")]
    no_daemonize: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sysdb=info,sysdbd=info")))
        .init();

    if cli.no_daemonize {
        tracing::debug!("staying in the foreground (-D)");
    }

    let config = SysdbConfig::load(&cli.config)?;
    if let Some(filter) = &config.log.filter {
        tracing::debug!("config requests log filter override '{filter}', but RUST_LOG (if set) already won at init time");
    }

    let store = Arc::new(Store::new());
    let (running_tx, running_rx) = watch::channel(true);

    let mut scheduler = Scheduler::new();
    if config.collector.enabled {
        let store = store.clone();
        scheduler.register_fn(
            "store-maintenance",
            std::time::Duration::from_secs(config.collector.default_interval_secs),
            move || {
                tracing::debug!("store holds {} hosts", store.host_count());
            },
        );
    }
    let scheduler_handle = tokio::spawn(scheduler.run(running_rx.clone()));

    // SIGPIPE: the Rust runtime already installs SIG_IGN for it before
    // `main` runs, so a write to a peer that closed its read side surfaces
    // as a normal IO error instead of terminating the process; nothing
    // further is needed here.
    let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())?;
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    let config_path = cli.config.clone();
    let signal_running_tx = running_tx.clone();
    let signal_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received SIGINT, shutting down");
                    let _ = signal_running_tx.send(false);
                    return;
                }
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, shutting down");
                    let _ = signal_running_tx.send(false);
                    return;
                }
                _ = sighup.recv() => {
                    tracing::info!("received SIGHUP, reloading configuration");
                    match SysdbConfig::load(&config_path) {
                        Ok(_) => tracing::info!("configuration reloaded (listen addresses take effect on restart)"),
                        Err(e) => tracing::error!("failed to reload configuration: {e}"),
                    }
                }
            }
        }
    });

    let result = server::run(&config, store, running_rx).await;

    scheduler_handle.await?;
    signal_task.abort();

    result
}
