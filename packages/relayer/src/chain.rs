//! Chain actors
//!
//! Each bridge instance runs in its own task and is only reached through a
//! [`ChainHandle`]. Commands carry a oneshot reply channel; messages the
//! instance emits go onto the shared outbox the relay loop drains.

use alloy_primitives::Address;
use eyre::{eyre, Result, WrapErr};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use token_bridge::{
    BridgeError, BridgeInstance, BridgeMessage, ChainId, Delivery, DeliveryReceipt,
    PairingRegistration, Relay, Scaling, SendReceipt, TransferIntent, TransferState,
};

/// Relay side of an actor: queues emitted messages on the outbox
#[derive(Debug, Clone)]
pub struct OutboxRelay {
    outbox: mpsc::UnboundedSender<BridgeMessage>,
}

impl OutboxRelay {
    pub fn new(outbox: mpsc::UnboundedSender<BridgeMessage>) -> Self {
        Self { outbox }
    }
}

impl Relay for OutboxRelay {
    fn emit(&mut self, message: &BridgeMessage) -> Result<(), BridgeError> {
        self.outbox
            .send(message.clone())
            .map_err(|_| BridgeError::RelayUnavailable {
                reason: "relay outbox closed".to_string(),
            })
    }
}

type Reply<T> = oneshot::Sender<Result<T, BridgeError>>;

/// Requests a chain actor serves
#[derive(Debug)]
pub enum Command {
    Send {
        sender: Address,
        intent: TransferIntent,
        reply: Reply<SendReceipt>,
    },
    Deliver {
        message: BridgeMessage,
        reply: Reply<Delivery>,
    },
    Confirm {
        receipt: DeliveryReceipt,
        reply: Reply<TransferState>,
    },
    Resume {
        reply: Reply<usize>,
    },
    RegisterPairing {
        chain_id: ChainId,
        contract: Address,
        scaling: Scaling,
        reply: Reply<()>,
    },
    Registration {
        reply: Reply<PairingRegistration>,
    },
    Snapshot {
        reply: Reply<String>,
    },
    State {
        reply: oneshot::Sender<BridgeInstance>,
    },
}

/// Owns one instance and serves commands until every handle is dropped
pub struct ChainActor {
    instance: BridgeInstance,
    relay: OutboxRelay,
    commands: mpsc::Receiver<Command>,
}

impl ChainActor {
    /// Start the actor task and return its handle
    pub fn spawn(
        instance: BridgeInstance,
        outbox: mpsc::UnboundedSender<BridgeMessage>,
        capacity: usize,
    ) -> ChainHandle {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = ChainHandle {
            chain_id: instance.chain_id(),
            contract: instance.contract(),
            token: instance.config().asset.token,
            tx,
        };
        let actor = ChainActor {
            instance,
            relay: OutboxRelay::new(outbox),
            commands: rx,
        };
        tokio::spawn(actor.run());
        handle
    }

    async fn run(mut self) {
        let chain_id = self.instance.chain_id();
        debug!(chain_id = %chain_id, "Chain actor started");

        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }

        debug!(chain_id = %chain_id, "Chain actor stopped");
    }

    fn handle(&mut self, command: Command) {
        // A dropped reply receiver means the caller gave up; nothing to do
        match command {
            Command::Send {
                sender,
                intent,
                reply,
            } => {
                let _ = reply.send(self.instance.send(sender, intent, &mut self.relay));
            }
            Command::Deliver { message, reply } => {
                let _ = reply.send(self.instance.deliver(&message, &mut self.relay));
            }
            Command::Confirm { receipt, reply } => {
                let _ = reply.send(self.instance.confirm_delivery(&receipt));
            }
            Command::Resume { reply } => {
                let unconfirmed = self.instance.unconfirmed();
                let result = unconfirmed
                    .iter()
                    .try_for_each(|id| self.instance.reemit(id, &mut self.relay))
                    .map(|()| unconfirmed.len());
                let _ = reply.send(result);
            }
            Command::RegisterPairing {
                chain_id,
                contract,
                scaling,
                reply,
            } => {
                let _ = reply.send(self.instance.register_pairing(chain_id, contract, scaling));
            }
            Command::Registration { reply } => {
                let _ = reply.send(self.instance.registration());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.instance.snapshot());
            }
            Command::State { reply } => {
                let _ = reply.send(self.instance.clone());
            }
        }
    }
}

/// Cloneable access to a chain actor
#[derive(Debug, Clone)]
pub struct ChainHandle {
    pub chain_id: ChainId,
    pub contract: Address,
    /// Asset primary fees are paid in
    pub token: Address,
    tx: mpsc::Sender<Command>,
}

impl ChainHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| eyre!("chain {} actor is not running", self.chain_id))?;
        let result = rx
            .await
            .wrap_err_with(|| format!("chain {} actor dropped the request", self.chain_id))?;
        Ok(result?)
    }

    pub async fn send(&self, sender: Address, intent: TransferIntent) -> Result<SendReceipt> {
        self.request(|reply| Command::Send {
            sender,
            intent,
            reply,
        })
        .await
    }

    pub async fn deliver(&self, message: BridgeMessage) -> Result<Delivery> {
        self.request(|reply| Command::Deliver { message, reply })
            .await
    }

    pub async fn confirm(&self, receipt: DeliveryReceipt) -> Result<TransferState> {
        self.request(|reply| Command::Confirm { receipt, reply })
            .await
    }

    /// Re-emit every unconfirmed send, returning how many went out
    pub async fn resume(&self) -> Result<usize> {
        self.request(|reply| Command::Resume { reply }).await
    }

    pub async fn register_pairing(
        &self,
        chain_id: ChainId,
        contract: Address,
        scaling: Scaling,
    ) -> Result<()> {
        self.request(|reply| Command::RegisterPairing {
            chain_id,
            contract,
            scaling,
            reply,
        })
        .await
    }

    pub async fn registration(&self) -> Result<PairingRegistration> {
        self.request(|reply| Command::Registration { reply }).await
    }

    pub async fn snapshot(&self) -> Result<String> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// A copy of the instance as it is now
    pub async fn state(&self) -> Result<BridgeInstance> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::State { reply })
            .await
            .map_err(|_| eyre!("chain {} actor is not running", self.chain_id))?;
        rx.await
            .wrap_err_with(|| format!("chain {} actor dropped the request", self.chain_id))
    }
}

/// Pair a destination with its home chain, both ways
pub async fn connect(home: &ChainHandle, destination: &ChainHandle) -> Result<()> {
    let registration = destination.registration().await?;
    home.register_pairing(
        registration.chain_id,
        registration.contract,
        registration.scaling,
    )
    .await?;
    destination
        .register_pairing(home.chain_id, home.contract, registration.scaling.inverse())
        .await?;

    info!(
        home = %home.chain_id,
        destination = %destination.chain_id,
        scaling = ?registration.scaling,
        "Chains paired"
    );
    Ok(())
}
