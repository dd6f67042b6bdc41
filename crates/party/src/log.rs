//! Log-layer interfaces consumed by the party core.
//!
//! The feed store is an external collaborator; the core only
//! requires acknowledged appends and an ordered merged stream
//! per party. [MemoryLog] backs tests and single-process use.
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::BroadcastStream;

use crate::Result;
use conclave_protocol::{PublicKey, SignedMessage};

/// Writer half of the log layer.
#[async_trait]
pub trait LogWriter: Send + Sync {
    /// Append a message to a party's log.
    ///
    /// The append is acknowledged before the message is visible
    /// to any reader.
    async fn append(
        &self,
        party_key: &PublicKey,
        message: SignedMessage,
    ) -> Result<()>;
}

/// Reader half of the log layer.
#[async_trait]
pub trait LogReader: Send + Sync {
    /// Ordered merged stream of a party's messages: the full
    /// history followed by live appends.
    async fn stream(
        &self,
        party_key: &PublicKey,
    ) -> Result<BoxStream<'static, SignedMessage>>;
}

/// Combined reader and writer halves of the log layer.
pub trait LogStore: LogWriter + LogReader {}

impl<T: LogWriter + LogReader> LogStore for T {}

#[derive(Default)]
struct LogState {
    history: HashMap<PublicKey, Vec<SignedMessage>>,
    channels: HashMap<PublicKey, broadcast::Sender<SignedMessage>>,
}

/// In-memory append-only log.
#[derive(Default, Clone)]
pub struct MemoryLog {
    state: Arc<RwLock<LogState>>,
}

impl MemoryLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Default::default()
    }

    /// Number of messages appended for a party.
    pub async fn len(&self, party_key: &PublicKey) -> usize {
        let reader = self.state.read().await;
        reader
            .history
            .get(party_key)
            .map(|h| h.len())
            .unwrap_or(0)
    }

    /// Whether a party's log is empty.
    pub async fn is_empty(&self, party_key: &PublicKey) -> bool {
        self.len(party_key).await == 0
    }
}

#[async_trait]
impl LogWriter for MemoryLog {
    async fn append(
        &self,
        party_key: &PublicKey,
        message: SignedMessage,
    ) -> Result<()> {
        let mut writer = self.state.write().await;
        writer
            .history
            .entry(*party_key)
            .or_default()
            .push(message.clone());
        if let Some(channel) = writer.channels.get(party_key) {
            // Nobody listening is fine.
            let _ = channel.send(message);
        }
        Ok(())
    }
}

#[async_trait]
impl LogReader for MemoryLog {
    async fn stream(
        &self,
        party_key: &PublicKey,
    ) -> Result<BoxStream<'static, SignedMessage>> {
        let mut writer = self.state.write().await;
        let history = writer
            .history
            .get(party_key)
            .cloned()
            .unwrap_or_default();
        let channel = writer
            .channels
            .entry(*party_key)
            .or_insert_with(|| broadcast::channel(1024).0);
        let live = BroadcastStream::new(channel.subscribe())
            .filter_map(|result| async move { result.ok() });
        Ok(futures::stream::iter(history).chain(live).boxed())
    }
}
