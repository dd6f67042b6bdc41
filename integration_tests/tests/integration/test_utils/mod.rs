use anyhow::{bail, Result};
use std::{sync::Arc, time::Duration};
use tokio::sync::RwLock;

use conclave::{ManagerConfig, PartyManager};
use conclave_greeting::MemorySwarm;
use conclave_keyring::MemoryKeyStore;
use conclave_party::{MemoryLog, PartyState};

#[allow(dead_code)]
pub fn init_tracing() {
    use tracing_subscriber::{
        layer::SubscriberExt, util::SubscriberInitExt,
    };
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "conclave=debug".to_owned());
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init();
}

/// Shared collaborators standing in for the replication and
/// rendezvous layers: every manager created against them sees
/// the same logs and swarms.
pub struct Network {
    pub log: Arc<MemoryLog>,
    pub swarm: Arc<MemorySwarm>,
}

impl Network {
    pub fn new() -> Self {
        Self {
            log: Arc::new(MemoryLog::new()),
            swarm: Arc::new(MemorySwarm::new()),
        }
    }

    /// Manager with its own key store and a fresh identity.
    pub async fn manager(&self) -> Result<PartyManager> {
        let log: Arc<dyn conclave_party::LogStore> =
            self.log.clone();
        let swarm: Arc<dyn conclave_greeting::NetworkSwarm> =
            self.swarm.clone();
        let manager = PartyManager::new(
            ManagerConfig::default(),
            Arc::new(MemoryKeyStore::new()),
            log,
            swarm,
        )
        .await?;
        manager.create_identity().await?;
        Ok(manager)
    }
}

/// Poll a party state until a predicate holds.
pub async fn wait_for_state<F>(
    state: &Arc<RwLock<PartyState>>,
    mut predicate: F,
) -> Result<()>
where
    F: FnMut(&PartyState) -> bool,
{
    for _ in 0..250 {
        {
            let reader = state.read().await;
            if predicate(&reader) {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    bail!("timed out waiting for party state");
}
