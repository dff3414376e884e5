//! Per-chain balance ledger
//!
//! Each bridge instance owns the ledger of its asset on its own chain. All
//! mutations go through [`Ledger::mint`], [`Ledger::burn`] and
//! [`Ledger::transfer`]; a debit that would take a balance below zero fails
//! without changing anything.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::BridgeError;
use crate::types::ChainId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    chain_id: ChainId,
    balances: BTreeMap<Address, U256>,
    total_supply: U256,
}

impl Ledger {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            balances: BTreeMap::new(),
            total_supply: U256::ZERO,
        }
    }

    /// Ledger seeded with pre-existing balances
    pub fn with_genesis<I>(chain_id: ChainId, allocations: I) -> Result<Self, BridgeError>
    where
        I: IntoIterator<Item = (Address, U256)>,
    {
        let mut ledger = Self::new(chain_id);
        for (account, amount) in allocations {
            ledger.mint(account, amount)?;
        }
        Ok(ledger)
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn balance_of(&self, account: &Address) -> U256 {
        self.balances.get(account).copied().unwrap_or(U256::ZERO)
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    /// Accounts with a nonzero balance
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &U256)> {
        self.balances.iter()
    }

    /// Fail unless `account` holds at least `amount`
    pub fn ensure_balance(&self, account: &Address, amount: U256) -> Result<(), BridgeError> {
        let balance = self.balance_of(account);
        if balance < amount {
            return Err(BridgeError::InsufficientBalance {
                account: *account,
                balance,
                required: amount,
            });
        }
        Ok(())
    }

    pub fn mint(&mut self, account: Address, amount: U256) -> Result<(), BridgeError> {
        if amount.is_zero() {
            return Ok(());
        }
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(BridgeError::Overflow)?;
        let balance = self
            .balance_of(&account)
            .checked_add(amount)
            .ok_or(BridgeError::Overflow)?;
        self.total_supply = supply;
        self.balances.insert(account, balance);
        Ok(())
    }

    pub fn burn(&mut self, account: Address, amount: U256) -> Result<(), BridgeError> {
        if amount.is_zero() {
            return Ok(());
        }
        self.ensure_balance(&account, amount)?;
        self.set_balance(account, self.balance_of(&account) - amount);
        self.total_supply -= amount;
        Ok(())
    }

    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), BridgeError> {
        if amount.is_zero() || from == to {
            return self.ensure_balance(&from, amount);
        }
        self.ensure_balance(&from, amount)?;
        let credited = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(BridgeError::Overflow)?;
        self.set_balance(from, self.balance_of(&from) - amount);
        self.balances.insert(to, credited);
        Ok(())
    }

    fn set_balance(&mut self, account: Address, balance: U256) {
        if balance.is_zero() {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, balance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    fn alice() -> Address {
        Address::repeat_byte(0xa1)
    }

    fn bob() -> Address {
        Address::repeat_byte(0xb0)
    }

    #[test]
    fn test_genesis_and_supply() {
        let ledger =
            Ledger::with_genesis(ChainId::from_u32(1), [(alice(), u(100)), (bob(), u(50))])
                .unwrap();
        assert_eq!(ledger.balance_of(&alice()), u(100));
        assert_eq!(ledger.total_supply(), u(150));
    }

    #[test]
    fn test_transfer_moves_balance() {
        let mut ledger = Ledger::with_genesis(ChainId::from_u32(1), [(alice(), u(100))]).unwrap();
        ledger.transfer(alice(), bob(), u(40)).unwrap();
        assert_eq!(ledger.balance_of(&alice()), u(60));
        assert_eq!(ledger.balance_of(&bob()), u(40));
        assert_eq!(ledger.total_supply(), u(100));
    }

    #[test]
    fn test_overdraft_rejected_without_mutation() {
        let mut ledger = Ledger::with_genesis(ChainId::from_u32(1), [(alice(), u(10))]).unwrap();
        let before = ledger.clone();

        let err = ledger.transfer(alice(), bob(), u(11)).unwrap_err();
        assert_eq!(
            err,
            BridgeError::InsufficientBalance {
                account: alice(),
                balance: u(10),
                required: u(11)
            }
        );
        assert!(ledger.burn(bob(), u(1)).is_err());
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_burn_reduces_supply_and_prunes_empty_accounts() {
        let mut ledger = Ledger::with_genesis(ChainId::from_u32(1), [(alice(), u(10))]).unwrap();
        ledger.burn(alice(), u(10)).unwrap();
        assert_eq!(ledger.total_supply(), U256::ZERO);
        assert_eq!(ledger.accounts().count(), 0);
    }

    #[test]
    fn test_mint_overflow() {
        let mut ledger = Ledger::with_genesis(ChainId::from_u32(1), [(alice(), U256::MAX)]).unwrap();
        assert_eq!(ledger.mint(bob(), u(1)).unwrap_err(), BridgeError::Overflow);
        assert_eq!(ledger.balance_of(&bob()), U256::ZERO);
    }
}
