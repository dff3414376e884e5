//! Instance configuration
//!
//! Everything fixed at deployment: where the instance lives, which role it
//! plays, the asset it carries and, for destinations, the home chain that
//! backs the representation plus any pre-existing supply.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::scaler::{Scaling, MAX_DECIMALS_SHIFT};
use crate::types::{ChainId, Role};

/// Token metadata carried by an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Token contract on this chain; the only accepted primary fee asset
    pub token: Address,
}

/// The chain whose source instance backs a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeConfig {
    pub chain_id: ChainId,
    /// Applied to amounts arriving from home
    #[serde(default)]
    pub decimals_shift: u8,
    #[serde(default)]
    pub multiply_on_receive: bool,
}

impl HomeConfig {
    pub fn scaling(&self) -> Result<Scaling, BridgeError> {
        Scaling::new(self.decimals_shift, self.multiply_on_receive)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub chain_id: ChainId,
    /// Address of this bridge instance; also its escrow account
    pub contract: Address,
    pub role: Role,
    pub asset: AssetMetadata,
    /// Receives primary and secondary fees
    pub fee_collector: Address,
    /// Required for destinations, absent for sources
    #[serde(default)]
    pub home: Option<HomeConfig>,
    /// Supply that existed on this chain before any bridged value arrived
    #[serde(default)]
    pub initial_reserve_imbalance: U256,
}

impl InstanceConfig {
    pub fn source(
        chain_id: ChainId,
        contract: Address,
        asset: AssetMetadata,
        fee_collector: Address,
    ) -> Self {
        Self {
            chain_id,
            contract,
            role: Role::Source,
            asset,
            fee_collector,
            home: None,
            initial_reserve_imbalance: U256::ZERO,
        }
    }

    pub fn destination(
        chain_id: ChainId,
        contract: Address,
        asset: AssetMetadata,
        fee_collector: Address,
        home: HomeConfig,
    ) -> Self {
        Self {
            chain_id,
            contract,
            role: Role::Destination,
            asset,
            fee_collector,
            home: Some(home),
            initial_reserve_imbalance: U256::ZERO,
        }
    }

    pub fn with_reserve_imbalance(mut self, imbalance: U256) -> Self {
        self.initial_reserve_imbalance = imbalance;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.chain_id.is_zero() {
            return Err(invalid("chain_id cannot be zero"));
        }
        if self.contract == Address::ZERO {
            return Err(invalid("contract address cannot be zero"));
        }
        if self.fee_collector == Address::ZERO {
            return Err(invalid("fee_collector cannot be zero"));
        }
        if self.fee_collector == self.contract {
            return Err(invalid("fee_collector cannot be the escrow account"));
        }
        if self.asset.token == Address::ZERO {
            return Err(invalid("asset token address cannot be zero"));
        }
        if self.asset.decimals > 2 * MAX_DECIMALS_SHIFT {
            return Err(invalid(format!(
                "asset decimals {} out of range",
                self.asset.decimals
            )));
        }

        match (self.role, &self.home) {
            (Role::Source, Some(_)) => {
                return Err(invalid("source instances have no home chain"));
            }
            (Role::Source, None) if !self.initial_reserve_imbalance.is_zero() => {
                return Err(invalid("source instances carry no reserve imbalance"));
            }
            (Role::Destination, None) => {
                return Err(invalid("destination instances need a home chain"));
            }
            (Role::Destination, Some(home)) => {
                if home.chain_id == self.chain_id || home.chain_id.is_zero() {
                    return Err(invalid(format!("invalid home chain {}", home.chain_id)));
                }
                home.scaling()
                    .map_err(|e| invalid(format!("home scaling: {}", e)))?;
            }
            _ => {}
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> BridgeError {
    BridgeError::InvalidConfig {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(decimals: u8) -> AssetMetadata {
        AssetMetadata {
            name: "Wrapped Test".to_string(),
            symbol: "WTST".to_string(),
            decimals,
            token: Address::repeat_byte(0x70),
        }
    }

    fn collector() -> Address {
        Address::repeat_byte(0xfc)
    }

    fn home() -> HomeConfig {
        HomeConfig {
            chain_id: ChainId::from_u32(1),
            decimals_shift: 12,
            multiply_on_receive: true,
        }
    }

    #[test]
    fn test_valid_configs() {
        InstanceConfig::source(ChainId::from_u32(1), Address::repeat_byte(1), asset(6), collector())
            .validate()
            .unwrap();
        InstanceConfig::destination(
            ChainId::from_u32(2),
            Address::repeat_byte(2),
            asset(18),
            collector(),
            home(),
        )
        .with_reserve_imbalance(U256::from(9_000u64))
        .validate()
        .unwrap();
    }

    #[test]
    fn test_role_and_home_must_agree() {
        let mut source =
            InstanceConfig::source(ChainId::from_u32(1), Address::repeat_byte(1), asset(6), collector());
        source.home = Some(home());
        assert!(source.validate().is_err());

        let mut dest = InstanceConfig::destination(
            ChainId::from_u32(2),
            Address::repeat_byte(2),
            asset(18),
            collector(),
            home(),
        );
        dest.home = None;
        assert!(dest.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_ids_and_bad_shift() {
        let config = InstanceConfig::source(ChainId::from_u32(0), Address::repeat_byte(1), asset(6), collector());
        assert!(matches!(
            config.validate(),
            Err(BridgeError::InvalidConfig { .. })
        ));

        let mut bad_home = home();
        bad_home.decimals_shift = MAX_DECIMALS_SHIFT + 1;
        let config = InstanceConfig::destination(
            ChainId::from_u32(2),
            Address::repeat_byte(2),
            asset(18),
            collector(),
            bad_home,
        );
        assert!(config.validate().is_err());

        let config = InstanceConfig::destination(
            ChainId::from_u32(1),
            Address::repeat_byte(2),
            asset(18),
            collector(),
            home(),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fee_collector_must_not_be_escrow() {
        let mut config =
            InstanceConfig::source(ChainId::from_u32(1), Address::repeat_byte(1), asset(6), collector());
        config.fee_collector = config.contract;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_source_rejects_reserve_imbalance() {
        let config = InstanceConfig::source(ChainId::from_u32(1), Address::repeat_byte(1), asset(6), collector())
            .with_reserve_imbalance(U256::from(1u64));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserializes_from_json() {
        let json = r#"{
            "chain_id": "0x00000002",
            "contract": "0x0202020202020202020202020202020202020202",
            "role": "destination",
            "asset": {
                "name": "Wrapped Test",
                "symbol": "WTST",
                "decimals": 18,
                "token": "0x7070707070707070707070707070707070707070"
            },
            "fee_collector": "0x0303030303030303030303030303030303030303",
            "home": { "chain_id": "0x00000001", "decimals_shift": 12, "multiply_on_receive": true }
        }"#;
        let config: InstanceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.role, Role::Destination);
        assert_eq!(config.initial_reserve_imbalance, U256::ZERO);
        config.validate().unwrap();
    }
}
