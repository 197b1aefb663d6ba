//! Listener + worker pool (C11): one `UnixListener` per configured
//! `unix:/path` address, a bounded dispatch channel, and a fixed pool of
//! workers that each own one connection for its full read-dispatch-reply
//! cycle. Grounded in the background-task shape the original daemon uses
//! for its periodic workers (`tokio::spawn` + a loop that logs and
//! continues on a per-iteration error) generalized here to N workers
//! draining one channel instead of N independent timers.

use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};

use crate::config::SysdbConfig;
use crate::server::connection;
use crate::store::store::Store;

/// Starts one accept loop per configured address and a fixed worker pool
/// draining their output, returning once `running` observes `false` and
/// every spawned task has been joined.
pub async fn run(config: &SysdbConfig, store: Arc<Store>, running: watch::Receiver<bool>) -> anyhow::Result<()> {
    let addresses = parse_addresses(&config.listen.addresses)?;
    if addresses.is_empty() {
        anyhow::bail!("no listen addresses configured");
    }

    let (tx, rx) = mpsc::channel::<UnixStream>(config.server.dispatch_queue_depth);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let mut tasks = Vec::new();

    for path in &addresses {
        let listener = bind(path)?;
        tracing::info!("listening on unix:{path}");
        let tx = tx.clone();
        let mut running = running.clone();
        let path = path.clone();
        tasks.push(tokio::spawn(async move {
            accept_loop(listener, tx, &mut running, &path).await;
        }));
    }
    drop(tx);

    for _ in 0..config.server.worker_threads.max(1) {
        let rx = rx.clone();
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            worker_loop(rx, store).await;
        }));
    }

    let mut running_shutdown = running.clone();
    let _ = running_shutdown.changed().await;

    for task in tasks {
        let _ = task.await;
    }

    for path in &addresses {
        let _ = std::fs::remove_file(path);
    }

    Ok(())
}

fn parse_addresses(entries: &[String]) -> anyhow::Result<Vec<String>> {
    entries
        .iter()
        .map(|e| {
            e.strip_prefix("unix:")
                .map(|p| p.to_string())
                .ok_or_else(|| anyhow::anyhow!("unsupported listen address '{e}' (only unix:/path is supported)"))
        })
        .collect()
}

fn bind(path: &str) -> anyhow::Result<UnixListener> {
    if std::path::Path::new(path).exists() {
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(UnixListener::bind(path)?)
}

async fn accept_loop(listener: UnixListener, tx: mpsc::Sender<UnixStream>, running: &mut watch::Receiver<bool>, path: &str) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        if tx.send(stream).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => tracing::warn!("accept on unix:{path} failed: {e}"),
                }
            }
            changed = running.changed() => {
                if changed.is_err() || !*running.borrow() {
                    return;
                }
            }
        }
    }
}

async fn worker_loop(rx: Arc<tokio::sync::Mutex<mpsc::Receiver<UnixStream>>>, store: Arc<Store>) {
    loop {
        let stream = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        match stream {
            Some(stream) => connection::handle(stream, store.clone()).await,
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_unix_addresses() {
        let err = parse_addresses(&["tcp:127.0.0.1:9000".to_string()]).unwrap_err();
        assert!(err.to_string().contains("unsupported listen address"));
    }

    #[test]
    fn strips_the_unix_prefix() {
        let addrs = parse_addresses(&["unix:/tmp/sysdbd.sock".to_string()]).unwrap();
        assert_eq!(addrs, vec!["/tmp/sysdbd.sock".to_string()]);
    }
}
