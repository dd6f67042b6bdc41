//! Swarm interfaces consumed by the greeting protocol.
//!
//! The rendezvous layer is an external collaborator; the core
//! only requires that joining a swarm yields a duplex byte
//! channel per peer. [MemorySwarm] backs tests and
//! single-process use.
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, RwLock};

use crate::{Error, Result};
use conclave_protocol::PublicKey;

const CHANNEL_CAPACITY: usize = 64;

/// Duplex byte channel to a single peer.
pub struct PeerChannel {
    /// Identifier the remote peer joined with.
    ///
    /// Greeting sessions are recognized by the invitee joining
    /// with the invitation identifier as its peer id.
    pub peer_id: Vec<u8>,
    tx: mpsc::Sender<Vec<u8>>,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl PeerChannel {
    /// Send a buffer to the peer.
    pub async fn send(&self, buffer: Vec<u8>) -> Result<()> {
        self.tx
            .send(buffer)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// Receive the next buffer from the peer.
    ///
    /// Returns `None` when the peer hung up.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

/// Rendezvous swarm used to connect invitees with greeters.
#[async_trait]
pub trait NetworkSwarm: Send + Sync {
    /// Join a swarm as a connecting peer, yielding a channel to
    /// the listener.
    async fn join(
        &self,
        swarm_key: &PublicKey,
        peer_id: Vec<u8>,
    ) -> Result<PeerChannel>;

    /// Listen on a swarm, yielding one channel per connecting
    /// peer.
    async fn listen(
        &self,
        swarm_key: &PublicKey,
    ) -> Result<mpsc::Receiver<PeerChannel>>;
}

/// In-process swarm connecting peers over channels.
#[derive(Default, Clone)]
pub struct MemorySwarm {
    listeners: Arc<
        RwLock<HashMap<PublicKey, mpsc::Sender<PeerChannel>>>,
    >,
}

impl MemorySwarm {
    /// Create an empty swarm.
    pub fn new() -> Self {
        Default::default()
    }
}

#[async_trait]
impl NetworkSwarm for MemorySwarm {
    async fn join(
        &self,
        swarm_key: &PublicKey,
        peer_id: Vec<u8>,
    ) -> Result<PeerChannel> {
        let listener = {
            let reader = self.listeners.read().await;
            reader.get(swarm_key).cloned().ok_or_else(|| {
                Error::SwarmNotFound(swarm_key.to_string())
            })?
        };

        let (to_listener, from_peer) =
            mpsc::channel(CHANNEL_CAPACITY);
        let (to_peer, from_listener) =
            mpsc::channel(CHANNEL_CAPACITY);

        listener
            .send(PeerChannel {
                peer_id: peer_id.clone(),
                tx: to_peer,
                rx: from_peer,
            })
            .await
            .map_err(|_| Error::ChannelClosed)?;

        Ok(PeerChannel {
            peer_id,
            tx: to_listener,
            rx: from_listener,
        })
    }

    async fn listen(
        &self,
        swarm_key: &PublicKey,
    ) -> Result<mpsc::Receiver<PeerChannel>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut writer = self.listeners.write().await;
        writer.insert(*swarm_key, tx);
        Ok(rx)
    }
}
