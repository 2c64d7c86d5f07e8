//! Latest query snapshots, replaced per key on every query response

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::core::types::{AccountRecord, ContractRecord, Exchange, PositionRecord, Symbol};

type InstrumentKey = (Symbol, Exchange);

/// Cold-path state: query responses, read by the owning application.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    accounts: RwLock<HashMap<String, AccountRecord>>,
    positions: RwLock<HashMap<InstrumentKey, PositionRecord>>,
    contracts: RwLock<HashMap<InstrumentKey, ContractRecord>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the replaced snapshot, if any.
    pub fn update_account(&self, account: AccountRecord) -> Option<AccountRecord> {
        self.accounts
            .write()
            .insert(account.account_id.clone(), account)
    }

    pub fn update_position(&self, position: PositionRecord) -> Option<PositionRecord> {
        let key = (position.symbol.clone(), position.exchange);
        self.positions.write().insert(key, position)
    }

    pub fn update_contract(&self, contract: ContractRecord) -> Option<ContractRecord> {
        let key = (contract.symbol.clone(), contract.exchange);
        self.contracts.write().insert(key, contract)
    }

    pub fn account(&self, account_id: &str) -> Option<AccountRecord> {
        self.accounts.read().get(account_id).cloned()
    }

    pub fn position(&self, symbol: &Symbol, exchange: Exchange) -> Option<PositionRecord> {
        self.positions
            .read()
            .get(&(symbol.clone(), exchange))
            .cloned()
    }

    pub fn contract(&self, symbol: &Symbol, exchange: Exchange) -> Option<ContractRecord> {
        self.contracts
            .read()
            .get(&(symbol.clone(), exchange))
            .cloned()
    }

    pub fn accounts(&self) -> Vec<AccountRecord> {
        self.accounts.read().values().cloned().collect()
    }

    pub fn positions(&self) -> Vec<PositionRecord> {
        self.positions.read().values().cloned().collect()
    }

    pub fn contracts(&self) -> Vec<ContractRecord> {
        self.contracts.read().values().cloned().collect()
    }
}
