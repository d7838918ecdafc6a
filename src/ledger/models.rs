use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, AppResult, TransactionError};

/// Chains the reconciler knows how to route receipts and balances for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Polygon,
    Solana,
    Stellar,
    Near,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Polygon => "polygon",
            Chain::Solana => "solana",
            Chain::Stellar => "stellar",
            Chain::Near => "near",
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ETH",
            Chain::Polygon => "MATIC",
            Chain::Solana => "SOL",
            Chain::Stellar => "XLM",
            Chain::Near => "NEAR",
        }
    }
}

impl FromStr for Chain {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eth" | "ethereum" => Ok(Chain::Ethereum),
            "matic" | "polygon" => Ok(Chain::Polygon),
            "sol" | "solana" => Ok(Chain::Solana),
            "xlm" | "stellar" => Ok(Chain::Stellar),
            "near" => Ok(Chain::Near),
            other => Err(AppError::UnsupportedChain(other.to_string())),
        }
    }
}

/// Transaction status
///
/// `Pending` is the only status the reconciler polls. `Confirmed` and `Failed`
/// come from the chain; `Stuck` means the retry ceiling was hit and an operator
/// has to look at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
    Stuck,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Valid transitions:
    /// - Pending → Confirmed, Failed, Stuck
    /// - X → X for any terminal X (idempotent rewrite)
    pub fn can_transition_to(&self, to: TransactionStatus) -> bool {
        if self.is_terminal() {
            *self == to
        } else {
            to != TransactionStatus::Pending
        }
    }
}

/// Locally recorded chain transaction
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub hash: Option<String>,
    pub status: TransactionStatus,
    pub metadata: serde_json::Value,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub balance_synced: bool,
    /// Failed balance refreshes since confirmation
    pub balance_attempts: i32,
    pub balance_error: Option<String>,
    pub next_balance_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(wallet_id: Uuid, hash: Option<String>, metadata: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            hash,
            status: TransactionStatus::Pending,
            metadata,
            attempts: 0,
            last_error: None,
            last_attempt_at: None,
            next_attempt_at: None,
            balance_synced: false,
            balance_attempts: 0,
            balance_error: None,
            next_balance_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending, broadcast, and not backing off
    pub fn is_pollable(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::Pending
            && self.hash.is_some()
            && self.next_attempt_at.map_or(true, |at| at <= now)
    }

    /// Confirmed, balance not refreshed yet, under the ceiling and not backing off
    pub fn needs_balance_sync(&self, now: DateTime<Utc>, max_attempts: i32) -> bool {
        self.status == TransactionStatus::Confirmed
            && !self.balance_synced
            && self.balance_attempts < max_attempts
            && self.next_balance_attempt_at.map_or(true, |at| at <= now)
    }

    /// Chain identifier carried in `metadata.chain`
    pub fn chain(&self) -> AppResult<Chain> {
        let raw = self
            .metadata
            .get("chain")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TransactionError::MalformedMetadata {
                id: self.id,
                reason: "missing chain".to_string(),
            })?;

        raw.parse::<Chain>().map_err(|_| {
            TransactionError::MalformedMetadata {
                id: self.id,
                reason: format!("unknown chain '{}'", raw),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chain_aliases() {
        assert_eq!("eth".parse::<Chain>().unwrap(), Chain::Ethereum);
        assert_eq!("Ethereum".parse::<Chain>().unwrap(), Chain::Ethereum);
        assert_eq!("matic".parse::<Chain>().unwrap(), Chain::Polygon);
        assert_eq!("xlm".parse::<Chain>().unwrap(), Chain::Stellar);
        assert!("dogecoin".parse::<Chain>().is_err());
    }

    #[test]
    fn test_status_transitions_are_monotone() {
        use TransactionStatus::*;

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Stuck));
        assert!(!Pending.can_transition_to(Pending));

        assert!(Confirmed.can_transition_to(Confirmed));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Confirmed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Confirmed));
        assert!(!Stuck.can_transition_to(Pending));
    }

    #[test]
    fn test_pollable_requires_hash_and_elapsed_backoff() {
        let now = Utc::now();
        let mut tx = Transaction::new(Uuid::new_v4(), None, json!({"chain": "eth"}));
        assert!(!tx.is_pollable(now));

        tx.hash = Some("0xabc".into());
        assert!(tx.is_pollable(now));

        tx.next_attempt_at = Some(now + chrono::Duration::seconds(60));
        assert!(!tx.is_pollable(now));

        tx.next_attempt_at = Some(now - chrono::Duration::seconds(1));
        assert!(tx.is_pollable(now));

        tx.status = TransactionStatus::Confirmed;
        assert!(!tx.is_pollable(now));
    }

    #[test]
    fn test_chain_from_metadata() {
        let tx = Transaction::new(Uuid::new_v4(), Some("0xabc".into()), json!({"chain": "eth"}));
        assert_eq!(tx.chain().unwrap(), Chain::Ethereum);

        let tx = Transaction::new(Uuid::new_v4(), Some("0xabc".into()), json!({}));
        assert!(matches!(
            tx.chain(),
            Err(AppError::Transaction(TransactionError::MalformedMetadata { .. }))
        ));

        let tx = Transaction::new(Uuid::new_v4(), Some("0xabc".into()), json!({"chain": 7}));
        assert!(tx.chain().is_err());
    }
}
