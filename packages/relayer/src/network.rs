//! Startup, transfer submission and shutdown of the chain actors

use eyre::{eyre, Result, WrapErr};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use token_bridge::{BridgeInstance, BridgeMessage, ChainId, SendReceipt};

use crate::chain::{connect, ChainActor, ChainHandle};
use crate::config::{Config, TransferConfig};
use crate::store::SnapshotStore;

pub struct RelayNetwork {
    chains: BTreeMap<ChainId, ChainHandle>,
    store: Option<SnapshotStore>,
    resumed: bool,
}

impl RelayNetwork {
    /// Spawn one actor per configured chain, restoring snapshots when present
    pub async fn start(
        config: &Config,
        outbox: mpsc::UnboundedSender<BridgeMessage>,
    ) -> Result<Self> {
        let store = match &config.relayer.state_dir {
            Some(dir) => Some(SnapshotStore::open(dir).await?),
            None => None,
        };

        let mut chains = BTreeMap::new();
        let mut restored = 0;
        for chain in &config.chains {
            let chain_id = chain.chain_id();
            let snapshot = match &store {
                Some(store) => store.load(&chain_id).await?,
                None => None,
            };
            let instance = match snapshot {
                Some(snapshot) => {
                    restored += 1;
                    BridgeInstance::restore(&snapshot)
                        .wrap_err_with(|| format!("Failed to restore chain {}", chain_id))?
                }
                None => BridgeInstance::new(chain.instance_config()?, chain.genesis()?)?,
            };
            let handle = ChainActor::spawn(instance, outbox.clone(), config.relayer.channel_capacity);
            chains.insert(chain_id, handle);
        }

        let resumed = match restored {
            0 => false,
            n if n == config.chains.len() => true,
            n => {
                return Err(eyre!(
                    "State dir holds snapshots for {} of {} chains",
                    n,
                    config.chains.len()
                ))
            }
        };

        // Restored instances keep their pairings
        if !resumed {
            for chain in &config.chains {
                if let Some(home) = &chain.home {
                    let home = lookup(&chains, &ChainId::from_u32(home.chain_id))?;
                    connect(home, lookup(&chains, &chain.chain_id())?).await?;
                }
            }
        }

        tracing::info!(chains = chains.len(), resumed, "Chain actors started");
        Ok(Self {
            chains,
            store,
            resumed,
        })
    }

    pub fn handles(&self) -> BTreeMap<ChainId, ChainHandle> {
        self.chains.clone()
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Submit one configured transfer; a rejected one is logged and skipped
    pub async fn submit(&self, index: usize, transfer: &TransferConfig) -> Result<Option<SendReceipt>> {
        let from = lookup(&self.chains, &ChainId::from_u32(transfer.from))?;
        let to = lookup(&self.chains, &ChainId::from_u32(transfer.to))?;
        let intent = transfer.intent(to.contract, from.token)?;

        match from.send(transfer.sender, intent).await {
            Ok(receipt) => {
                tracing::info!(
                    index,
                    message_id = %receipt.message_id,
                    from = %receipt.source_chain,
                    to = %receipt.final_chain,
                    net = %receipt.net,
                    "Transfer submitted"
                );
                Ok(Some(receipt))
            }
            Err(e) => {
                tracing::warn!(index, error = %e, "Transfer rejected");
                Ok(None)
            }
        }
    }

    /// Re-emit every send no chain has confirmed yet
    ///
    /// Messages queued in the outbox at shutdown are not part of any
    /// snapshot; receivers answer repeats from their records.
    pub async fn resume(&self) -> Result<usize> {
        let mut total = 0;
        for handle in self.chains.values() {
            let count = handle.resume().await?;
            if count > 0 {
                tracing::info!(chain_id = %handle.chain_id, count, "Re-emitted unconfirmed sends");
            }
            total += count;
        }
        Ok(total)
    }

    pub async fn states(&self) -> Result<BTreeMap<ChainId, BridgeInstance>> {
        let mut states = BTreeMap::new();
        for (chain_id, handle) in &self.chains {
            states.insert(*chain_id, handle.state().await?);
        }
        Ok(states)
    }

    /// Write every chain's snapshot, if a state dir is configured
    pub async fn persist(&self) -> Result<()> {
        let store = match &self.store {
            Some(store) => store,
            None => return Ok(()),
        };
        for (chain_id, handle) in &self.chains {
            store.save(chain_id, &handle.snapshot().await?).await?;
        }
        tracing::info!(chains = self.chains.len(), "Snapshots saved");
        Ok(())
    }
}

fn lookup<'a>(
    chains: &'a BTreeMap<ChainId, ChainHandle>,
    chain_id: &ChainId,
) -> Result<&'a ChainHandle> {
    chains
        .get(chain_id)
        .ok_or_else(|| eyre!("chain {} is not running", chain_id))
}
