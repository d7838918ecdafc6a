use crate::ledger::models::Chain;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Asset symbol → amount. Always read `native` through [`BalanceRecord::native`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BalanceRecord(BTreeMap<String, Decimal>);

impl BalanceRecord {
    pub const NATIVE: &'static str = "native";

    pub fn new(native: Decimal) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(Self::NATIVE.to_string(), native);
        Self(entries)
    }

    pub fn native(&self) -> Decimal {
        self.get(Self::NATIVE).unwrap_or(Decimal::ZERO)
    }

    pub fn get(&self, asset: &str) -> Option<Decimal> {
        self.0.get(asset).copied()
    }

    pub fn with_asset(mut self, asset: &str, amount: Decimal) -> Self {
        self.0.insert(asset.to_string(), amount);
        self
    }

    /// Copy of this record with only the native entry replaced
    pub fn with_native(&self, amount: Decimal) -> Self {
        self.clone().with_asset(Self::NATIVE, amount)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub address: String,
    pub chain: Chain,
    pub balance: BalanceRecord,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(chain: Chain, address: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            address,
            chain,
            balance: BalanceRecord::default(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_balance(mut self, balance: BalanceRecord) -> Self {
        self.balance = balance;
        self
    }
}
