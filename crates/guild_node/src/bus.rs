//! Cluster bus endpoint: one node's connection to the relay.
//!
//! Outbound messages queue on a channel and survive short relay
//! outages; the connection task reconnects with a fixed delay and
//! replays the handshake each time. Inbound frames are handed to the
//! guild service. Delivery stays best-effort end to end: an unreachable
//! relay means queued messages wait, a full queue means the newest
//! message is dropped with a warning, and receivers self-heal from any
//! gap on the next authoritative read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use guild_service::{BusPublisher, GuildService};
use guild_wire::{read_frame, write_frame, BusMessage, WireError};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Messages that may wait for the relay before publishers see drops.
const OUTBOUND_QUEUE: usize = 256;

/// Outbound half plus the connection task state.
///
/// Construct with [`BusEndpoint::new`], hand the `Arc` to
/// [`GuildService`] as its publisher, then call [`BusEndpoint::start`]
/// once the service exists so inbound frames have somewhere to go.
pub struct BusEndpoint {
    node_id: String,
    channel: String,
    relay_addr: String,
    reconnect: Duration,
    outbound: mpsc::Sender<BusMessage>,
    staged: Mutex<Option<mpsc::Receiver<BusMessage>>>,
}

impl BusEndpoint {
    pub fn new(node_id: impl Into<String>, cluster: &crate::config::ClusterSettings) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        Arc::new(Self {
            node_id: node_id.into(),
            channel: cluster.channel.clone(),
            relay_addr: cluster.relay_addr.clone(),
            reconnect: Duration::from_millis(cluster.reconnect_ms),
            outbound: tx,
            staged: Mutex::new(Some(rx)),
        })
    }

    /// Spawns the connection task. Runs until aborted; reconnects with
    /// the configured delay whenever the relay drops.
    pub fn start(self: &Arc<Self>, service: Arc<GuildService>) -> JoinHandle<()> {
        let endpoint = self.clone();
        tokio::spawn(async move {
            let mut rx = match endpoint.staged.lock().await.take() {
                Some(rx) => rx,
                None => {
                    warn!("bus endpoint started twice; second start ignored");
                    return;
                }
            };

            loop {
                match TcpStream::connect(&endpoint.relay_addr).await {
                    Ok(stream) => {
                        info!(relay = %endpoint.relay_addr, "connected to the guild relay");
                        match endpoint.drive(stream, &service, &mut rx).await {
                            Ok(()) => return,
                            Err(e) => warn!(error = %e, "relay connection lost"),
                        }
                    }
                    Err(e) => {
                        debug!(relay = %endpoint.relay_addr, error = %e, "relay unreachable");
                    }
                }
                tokio::time::sleep(endpoint.reconnect).await;
            }
        })
    }

    /// Pumps one live connection in both directions. Returns `Ok` only
    /// when the outbound channel closes, which means the node is
    /// shutting down.
    async fn drive(
        &self,
        stream: TcpStream,
        service: &Arc<GuildService>,
        rx: &mut mpsc::Receiver<BusMessage>,
    ) -> Result<(), WireError> {
        let (read_half, mut writer) = stream.into_split();

        let hello = BusMessage::Hello {
            node_id: self.node_id.clone(),
            channel: self.channel.clone(),
        }
        .encode()?;
        write_frame(&mut writer, &hello).await?;

        // The reader runs apart so a mid-frame read is never cancelled
        // by outbound traffic; cancelling a partial read would corrupt
        // the framing.
        let service = service.clone();
        let mut reader_task: JoinHandle<WireError> = tokio::spawn(async move {
            let mut reader = read_half;
            loop {
                let payload = match read_frame(&mut reader).await {
                    Ok(payload) => payload,
                    Err(e) => return e,
                };
                if let Err(e) = service.handle_frame(&payload).await {
                    warn!(error = %e, "dropped an unreadable bus frame");
                }
            }
        });

        let result = loop {
            tokio::select! {
                queued = rx.recv() => match queued {
                    Some(message) => {
                        let payload = match message.encode() {
                            Ok(payload) => payload,
                            Err(e) => {
                                warn!(error = %e, tag = message.tag(), "dropped an unencodable bus message");
                                continue;
                            }
                        };
                        if let Err(e) = write_frame(&mut writer, &payload).await {
                            break Err(e);
                        }
                    }
                    None => break Ok(()),
                },
                ended = &mut reader_task => {
                    break match ended {
                        Ok(e) => Err(e),
                        Err(_) => Ok(()),
                    };
                }
            }
        };

        reader_task.abort();
        result
    }
}

#[async_trait]
impl BusPublisher for BusEndpoint {
    async fn publish(&self, message: BusMessage) {
        match self.outbound.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                warn!(tag = message.tag(), "bus queue full; message dropped");
            }
            Err(TrySendError::Closed(message)) => {
                warn!(tag = message.tag(), "bus task gone; message dropped");
            }
        }
    }
}
