use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{prelude::FromRow, types::Json, PgPool};
use uuid::Uuid;

use super::models::{BalanceRecord, Wallet};
use super::store::WalletStore;
use crate::error::{AppError, AppResult};

#[derive(FromRow)]
struct WalletRow {
    id: Uuid,
    address: String,
    chain: String,
    balance: Json<BalanceRecord>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WalletRow> for Wallet {
    type Error = AppError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        Ok(Wallet {
            id: row.id,
            address: row.address,
            chain: row.chain.parse()?,
            balance: row.balance.0,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed wallet store
pub struct PgWalletStore {
    pub pool: PgPool,
}

impl PgWalletStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WalletStore for PgWalletStore {
    async fn get_wallet(&self, wallet_id: Uuid) -> AppResult<Wallet> {
        let row = sqlx::query_as::<_, WalletRow>(
            r#"
            SELECT id, address, chain, balance, updated_at
            FROM wallets
            WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Wallet {} not found", wallet_id)))?;

        row.try_into()
    }

    async fn update_balance(&self, wallet_id: Uuid, balance: BalanceRecord) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .bind(Json(balance))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Wallet {} not found", wallet_id)));
        }

        Ok(())
    }
}
