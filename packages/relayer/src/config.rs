//! Relayer configuration: chains, transfers and relay tuning

use alloy_primitives::{Address, U256};
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use token_bridge::{
    AssetMetadata, ChainId, HomeConfig, InstanceConfig, Role, TransferIntent,
    DEFAULT_REQUIRED_GAS_LIMIT,
};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "BRIDGE_CONFIG";
/// Prefix for environment overrides, e.g. `BRIDGE__RELAYER__DELIVERY_DELAY_MS`
pub const ENV_PREFIX: &str = "BRIDGE";

/// Main configuration for the relayer
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relayer: RelayerConfig,
    pub chains: Vec<ChainConfig>,
    /// Transfers submitted on a fresh start
    #[serde(default)]
    pub transfers: Vec<TransferConfig>,
}

/// Delivery and retry settings
#[derive(Debug, Clone, Deserialize)]
pub struct RelayerConfig {
    /// Simulated latency between emission and delivery
    #[serde(default = "default_delivery_delay")]
    pub delivery_delay_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Where instance snapshots are kept; nothing is persisted when unset
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            delivery_delay_ms: default_delivery_delay(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff(),
            max_backoff_ms: default_max_backoff(),
            channel_capacity: default_channel_capacity(),
            state_dir: None,
        }
    }
}

impl RelayerConfig {
    pub fn delivery_delay(&self) -> Duration {
        Duration::from_millis(self.delivery_delay_ms)
    }
}

/// One bridge instance
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u32,
    pub role: Role,
    pub contract: Address,
    pub fee_collector: Address,
    pub asset: AssetConfig,
    /// Required for destinations
    #[serde(default)]
    pub home: Option<HomeChainConfig>,
    /// Pre-existing supply on a destination, decimal string
    #[serde(default)]
    pub initial_reserve_imbalance: Option<String>,
    /// Starting balances
    #[serde(default)]
    pub genesis: Vec<GenesisBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub token: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeChainConfig {
    pub chain_id: u32,
    #[serde(default)]
    pub decimals_shift: u8,
    #[serde(default)]
    pub multiply_on_receive: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenesisBalance {
    pub account: Address,
    pub amount: String,
}

/// A transfer to submit once the network is up
#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    pub from: u32,
    pub to: u32,
    pub sender: Address,
    pub recipient: Address,
    pub amount: String,
    #[serde(default)]
    pub primary_fee: Option<String>,
    #[serde(default)]
    pub secondary_fee: Option<String>,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_gas_limit")]
    pub secondary_gas_limit: u64,
}

/// Default functions
fn default_delivery_delay() -> u64 {
    50
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    5000
}

fn default_channel_capacity() -> usize {
    64
}

fn default_gas_limit() -> u64 {
    DEFAULT_REQUIRED_GAS_LIMIT
}

/// Parse a decimal amount
pub fn parse_amount(field: &str, value: &str) -> Result<U256> {
    value
        .trim()
        .parse::<U256>()
        .wrap_err_with(|| format!("{} must be a decimal amount, got {:?}", field, value))
}

fn parse_optional(field: &str, value: &Option<String>) -> Result<U256> {
    match value {
        Some(v) => parse_amount(field, v),
        None => Ok(U256::ZERO),
    }
}

impl ChainConfig {
    pub fn chain_id(&self) -> ChainId {
        ChainId::from_u32(self.chain_id)
    }

    /// The accounting-core config for this chain
    pub fn instance_config(&self) -> Result<InstanceConfig> {
        let asset = AssetMetadata {
            name: self.asset.name.clone(),
            symbol: self.asset.symbol.clone(),
            decimals: self.asset.decimals,
            token: self.asset.token,
        };

        let config = match self.role {
            Role::Source => {
                InstanceConfig::source(self.chain_id(), self.contract, asset, self.fee_collector)
            }
            Role::Destination => {
                let home = self
                    .home
                    .as_ref()
                    .ok_or_else(|| eyre!("chain {}: destination needs a home", self.chain_id))?;
                InstanceConfig::destination(
                    self.chain_id(),
                    self.contract,
                    asset,
                    self.fee_collector,
                    HomeConfig {
                        chain_id: ChainId::from_u32(home.chain_id),
                        decimals_shift: home.decimals_shift,
                        multiply_on_receive: home.multiply_on_receive,
                    },
                )
            }
        };
        let imbalance = parse_optional(
            &format!("chains[{}].initial_reserve_imbalance", self.chain_id),
            &self.initial_reserve_imbalance,
        )?;
        let config = config.with_reserve_imbalance(imbalance);

        config
            .validate()
            .wrap_err_with(|| format!("chain {} is misconfigured", self.chain_id))?;
        Ok(config)
    }

    pub fn genesis(&self) -> Result<Vec<(Address, U256)>> {
        self.genesis
            .iter()
            .map(|g| {
                let amount = parse_amount(
                    &format!("chains[{}].genesis[{}]", self.chain_id, g.account),
                    &g.amount,
                )?;
                Ok((g.account, amount))
            })
            .collect()
    }
}

impl TransferConfig {
    /// Build the intent; `fee_asset` is the sending chain's token
    pub fn intent(&self, destination_contract: Address, fee_asset: Address) -> Result<TransferIntent> {
        let amount = parse_amount("transfers.amount", &self.amount)?;
        let primary_fee = parse_optional("transfers.primary_fee", &self.primary_fee)?;
        let secondary_fee = parse_optional("transfers.secondary_fee", &self.secondary_fee)?;

        Ok(TransferIntent::new(
            ChainId::from_u32(self.to),
            destination_contract,
            self.recipient,
            amount,
        )
        .with_primary_fee(fee_asset, primary_fee)
        .with_secondary_fee(secondary_fee)
        .with_gas_limits(self.gas_limit, self.secondary_gas_limit))
    }
}

impl Config {
    /// Load configuration from `BRIDGE_CONFIG` (default `relayer.toml`)
    /// Loads .env file if present, then applies `BRIDGE__*` overrides
    pub fn load() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(e).wrap_err("Failed to load .env file");
            }
        }
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "relayer.toml".to_string());
        Self::load_from_file(Path::new(&path))
    }

    /// Load from a specific config file, with environment overrides
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .wrap_err_with(|| format!("Failed to read config from {}", path.display()))?;

        let config: Config = settings
            .try_deserialize()
            .wrap_err("Invalid relayer configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn chain(&self, chain_id: u32) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            return Err(eyre!("at least one chain must be configured"));
        }

        let mut seen = BTreeSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.chain_id) {
                return Err(eyre!("chain {} is configured twice", chain.chain_id));
            }
            chain.instance_config()?;
            chain.genesis()?;
        }

        for chain in &self.chains {
            if let Some(home) = &chain.home {
                let home_chain = self.chain(home.chain_id).ok_or_else(|| {
                    eyre!(
                        "chain {}: home chain {} is not configured",
                        chain.chain_id,
                        home.chain_id
                    )
                })?;
                if home_chain.home.is_some() {
                    return Err(eyre!(
                        "chain {}: home chain {} must be a source",
                        chain.chain_id,
                        home.chain_id
                    ));
                }
            }
        }

        for (index, transfer) in self.transfers.iter().enumerate() {
            for chain_id in [transfer.from, transfer.to] {
                if self.chain(chain_id).is_none() {
                    return Err(eyre!(
                        "transfers[{}]: chain {} is not configured",
                        index,
                        chain_id
                    ));
                }
            }
            parse_amount(&format!("transfers[{}].amount", index), &transfer.amount)?;
        }

        if self.relayer.channel_capacity == 0 {
            return Err(eyre!("relayer.channel_capacity must be greater than zero"));
        }
        if self.relayer.retry_backoff_ms > self.relayer.max_backoff_ms {
            return Err(eyre!(
                "relayer.retry_backoff_ms cannot exceed relayer.max_backoff_ms"
            ));
        }

        Ok(())
    }
}
