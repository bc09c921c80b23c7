//! The per-connection task: reads decoded packets and hands them to
//! [`processing::handle_event`] under the registry lock, while a companion
//! writer task drains the connection's bounded outbound queue to the socket
//! (spec §4.2/§4.3). Mirrors the teacher's `do_client_loop`, generalized to
//! split the framed stream so other connections can push packets onto this
//! one's queue asynchronously.

use std::sync::{Arc, Mutex};

use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::registry::Registry;
use crate::server::processing;
use crate::types::connection::{ConnId, ConnectionState, OUTBOUND_QUEUE_BOUND};
use crate::wire::admin::AdminCommand;
use crate::wire::decoder;
use crate::wire::events::GearmanEvent;
use crate::wire::protocol::Outbound;

fn deliver(registry: &mut Registry, conn: ConnId, packet: Outbound) {
    if let Some(c) = registry.connection_mut(conn) {
        c.try_send(packet);
    }
}

#[instrument(name = "connection", skip_all, fields(id = id.0, peer = %peer_addr))]
pub async fn handle_connection(
    registry: Arc<Mutex<Registry>>,
    id: ConnId,
    socket: TcpStream,
    peer_addr: String,
    cancel: CancellationToken,
    graceful: CancellationToken,
) {
    if let Err(error) = socket.set_nodelay(true) {
        warn!(%error, "failed to set TCP_NODELAY");
    }

    let framed = crate::wire::framed(socket);
    let (mut sink, mut stream) = framed.split();

    let (tx, mut rx) = mpsc::channel(OUTBOUND_QUEUE_BOUND);
    registry
        .lock()
        .unwrap()
        .register_connection(ConnectionState::new(id, peer_addr.clone(), tx.clone()));

    let writer = tokio::spawn(async move {
        while let Some(packet) = rx.recv().await {
            if sink.send(packet).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    debug!("accepted connection");

    loop {
        let event = tokio::select! {
            x = stream.next() => x,
            _ = cancel.cancelled() => None,
        };

        let Some(event) = event else { break };

        let event = match event {
            Ok(e) => e,
            Err(decoder::Error::IO(error)) => {
                warn!(%error, "connection I/O error");
                break;
            },
            Err(decoder::Error::Client(resp)) => {
                let _ = tx.try_send(Outbound::from(resp));
                break;
            },
        };

        if let GearmanEvent::Admin(AdminCommand::Shutdown { graceful: graceful_flag }) = &event {
            if *graceful_flag {
                graceful.cancel();
            } else {
                cancel.cancel();
            }
        }

        let mut reg = registry.lock().unwrap();
        let outcome = processing::handle_event(&mut reg, id, event);
        if let Some(reply) = outcome.reply {
            deliver(&mut reg, id, reply);
        }
        for (target, packet) in outcome.deliveries {
            deliver(&mut reg, target, packet);
        }

        let backpressured = reg.connection_mut(id).is_some_and(|c| c.close_after_flush);
        drop(reg);
        if backpressured {
            warn!("outbound queue overflowed; no longer reading from this connection");
            break;
        }
    }

    drop(tx);
    {
        let mut reg = registry.lock().unwrap();
        let wakeups = reg.deregister_connection(id);
        for (target, packet) in wakeups {
            deliver(&mut reg, target, packet);
        }
    }

    let _ = writer.await;
    debug!("connection closed");
}
