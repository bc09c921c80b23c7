//! Listener/accept loop and per-connection task spawning (spec §4.2). One
//! accept loop runs per `--listen` address, all sharing the same [`Registry`]
//! behind a `std::sync::Mutex` and the same connection-id counter.

pub mod processing;
pub mod thread;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::queue::PersistentQueue;
use crate::registry::Registry;
use crate::types::connection::ConnId;

pub struct Server {
    registry: Arc<Mutex<Registry>>,
    next_conn_id: Arc<AtomicU64>,
}

impl Server {
    pub fn new(config: ServerConfig, queue: Arc<dyn PersistentQueue>) -> Self {
        let mut registry = Registry::new(config, queue);
        registry.replay_queue();
        Self { registry: Arc::new(Mutex::new(registry)), next_conn_id: Arc::new(AtomicU64::new(1)) }
    }

    /// Runs one accept loop per listener until `cancel` fires (immediate
    /// shutdown, SIGINT/SIGTERM) or `graceful` fires (stop accepting, let
    /// in-flight connections finish, SIGUSR1/admin `shutdown graceful`).
    pub async fn run(
        &self,
        listeners: Vec<TcpListener>,
        cancel: CancellationToken,
        graceful: CancellationToken,
    ) {
        let mut handles = Vec::with_capacity(listeners.len());
        for listener in listeners {
            let registry = self.registry.clone();
            let next_conn_id = self.next_conn_id.clone();
            let cancel = cancel.clone();
            let graceful = graceful.clone();
            handles.push(tokio::spawn(accept_loop(registry, next_conn_id, listener, cancel, graceful)));
        }

        for handle in handles {
            if let Err(error) = handle.await {
                error!(%error, "accept loop task panicked");
            }
        }
    }
}

async fn accept_loop(
    registry: Arc<Mutex<Registry>>,
    next_conn_id: Arc<AtomicU64>,
    listener: TcpListener,
    cancel: CancellationToken,
    graceful: CancellationToken,
) {
    let local_addr = listener.local_addr().map(|a| a.to_string()).unwrap_or_else(|_| "?".into());
    info!(addr = %local_addr, "listening");

    loop {
        let accepted = tokio::select! {
            accept = listener.accept() => accept,
            _ = cancel.cancelled() => return,
            _ = graceful.cancelled() => return,
        };

        match accepted {
            Ok((socket, peer)) => {
                let id = ConnId(next_conn_id.fetch_add(1, Ordering::Relaxed));
                tokio::spawn(thread::handle_connection(
                    registry.clone(),
                    id,
                    socket,
                    peer.to_string(),
                    cancel.clone(),
                    graceful.clone(),
                ));
            },
            Err(error) => {
                warn!(%error, "failed to accept connection");
            },
        }
    }
}
