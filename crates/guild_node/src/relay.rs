//! Relay tier: the TCP fan-out hub of the guild bus.
//!
//! Every node holds one connection to the relay and announces itself
//! with a handshake frame. Each frame a node sends after that is
//! forwarded verbatim to every other node announced on the same
//! channel; the sender never hears its own frame back. The relay never
//! decodes past the handshake, so protocol growth on the nodes does not
//! require a relay upgrade.
//!
//! Delivery is best-effort: a peer whose outbound queue is full loses
//! the frame. Nodes are built to self-heal from missed messages, so the
//! relay prefers dropping over applying backpressure to the cluster.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use guild_wire::{read_frame, write_frame, BusMessage, WireError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Frames a slow peer may have in flight before the relay drops new ones.
const PEER_QUEUE: usize = 64;

struct Peer {
    node_id: String,
    channel: String,
    outbound: mpsc::Sender<Vec<u8>>,
}

/// The fan-out hub nodes connect to.
pub struct GuildRelay {
    listener: TcpListener,
    local_addr: SocketAddr,
    peers: DashMap<u64, Peer>,
    next_peer: AtomicU64,
}

impl GuildRelay {
    /// Binds the listening socket. `addr` may use port 0 to let the OS
    /// pick; [`GuildRelay::local_addr`] reports the bound address.
    pub async fn bind(addr: &str) -> std::io::Result<Arc<Self>> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Arc::new(Self {
            listener,
            local_addr,
            peers: DashMap::new(),
            next_peer: AtomicU64::new(1),
        }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of nodes currently announced on the relay.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Accept loop. Runs until the listener fails.
    pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
        info!(addr = %self.local_addr, "guild relay listening");
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let relay = self.clone();
            tokio::spawn(async move {
                if let Err(e) = relay.serve_peer(stream, addr).await {
                    debug!(peer = %addr, error = %e, "relay peer connection ended");
                }
            });
        }
    }

    async fn serve_peer(
        self: Arc<Self>,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), WireError> {
        let (mut reader, mut writer) = stream.into_split();

        // The first frame must announce the node; anything else is not
        // a bus peer and gets disconnected.
        let payload = read_frame(&mut reader).await?;
        let (node_id, channel) = match BusMessage::decode(&payload)? {
            BusMessage::Hello { node_id, channel } => (node_id, channel),
            other => {
                warn!(peer = %addr, tag = other.tag(), "peer skipped the handshake; closing");
                return Ok(());
            }
        };

        let key = self.next_peer.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(PEER_QUEUE);
        self.peers.insert(
            key,
            Peer {
                node_id: node_id.clone(),
                channel: channel.clone(),
                outbound: tx,
            },
        );
        info!(node = %node_id, channel = %channel, peer = %addr, "node joined the relay");

        // Writes run apart from reads so one slow direction cannot
        // stall the other.
        let mut writer_task = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if write_frame(&mut writer, &frame).await.is_err() {
                    break;
                }
            }
        });

        let result = loop {
            tokio::select! {
                inbound = read_frame(&mut reader) => match inbound {
                    Ok(frame) => self.fan_out(key, &channel, frame),
                    Err(e) => break e,
                },
                _ = &mut writer_task => break WireError::Eof,
            }
        };

        self.peers.remove(&key);
        writer_task.abort();
        info!(node = %node_id, "node left the relay");

        match result {
            WireError::Eof => Ok(()),
            other => Err(other),
        }
    }

    /// Forwards one frame to every peer on `channel` except the sender.
    fn fan_out(&self, from: u64, channel: &str, frame: Vec<u8>) {
        for peer in self.peers.iter() {
            if *peer.key() == from || peer.channel != channel {
                continue;
            }
            if peer.outbound.try_send(frame.clone()).is_err() {
                warn!(node = %peer.node_id, "peer queue full or gone; frame dropped");
            }
        }
    }
}
