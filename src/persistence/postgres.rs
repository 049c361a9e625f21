//! PostgreSQL implementation of the persistence layer.

use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::PgPool;

use super::models::{
    LISTING_COLUMNS, ListingRow, SWAP_COLUMNS, SwapRow, listing_from_row, swap_from_row,
};
use super::{ListingStore, SwapLog};
use crate::domain::{
    AssetId, Listing, ListingId, ListingStatus, Network, StatusUpdate, SwapRecord, TxRef,
};
use crate::error::GatewayError;

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

fn db_error(err: sqlx::Error) -> GatewayError {
    GatewayError::PersistenceError(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl PgStore {
    /// Creates a store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), GatewayError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| GatewayError::PersistenceError(e.to_string()))
    }
}

#[async_trait]
impl ListingStore for PgStore {
    async fn insert_listing(&self, listing: &Listing) -> Result<(), GatewayError> {
        let result = sqlx::query(
            "INSERT INTO listings (id, network, token_id, seller_address, price, currency, \
             status, buyer_address, created_at, sold_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(listing.id.as_uuid())
        .bind(listing.network.as_str())
        .bind(listing.token_id.as_str())
        .bind(listing.seller_address.as_str())
        .bind(listing.price)
        .bind(&listing.currency)
        .bind(listing.status.as_str())
        .bind(listing.buyer_address.as_ref().map(|a| a.as_str()))
        .bind(listing.created_at)
        .bind(listing.sold_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(GatewayError::DuplicateListing(listing.token_id.clone()))
            }
            Err(e) => Err(db_error(e)),
        }
    }

    async fn get_listing(&self, id: ListingId) -> Result<Option<Listing>, GatewayError> {
        let row = sqlx::query_as::<_, ListingRow>(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(listing_from_row).transpose()
    }

    async fn list_listings(
        &self,
        network: Network,
        status: Option<ListingStatus>,
    ) -> Result<Vec<Listing>, GatewayError> {
        let rows = if let Some(status) = status {
            sqlx::query_as::<_, ListingRow>(&format!(
                "SELECT {LISTING_COLUMNS} FROM listings \
                 WHERE network = $1 AND status = $2 ORDER BY created_at DESC"
            ))
            .bind(network.as_str())
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, ListingRow>(&format!(
                "SELECT {LISTING_COLUMNS} FROM listings \
                 WHERE network = $1 ORDER BY created_at DESC"
            ))
            .bind(network.as_str())
            .fetch_all(&self.pool)
            .await
        }
        .map_err(db_error)?;

        rows.into_iter().map(listing_from_row).collect()
    }

    async fn active_token_ids(&self, network: Network) -> Result<BTreeSet<AssetId>, GatewayError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT token_id FROM listings WHERE network = $1 AND status = 'active'",
        )
        .bind(network.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(|token| {
                AssetId::new(token)
                    .map_err(|e| GatewayError::PersistenceError(format!("corrupt token_id: {e}")))
            })
            .collect()
    }

    async fn transition(
        &self,
        id: ListingId,
        from: ListingStatus,
        update: &StatusUpdate,
    ) -> Result<Option<Listing>, GatewayError> {
        let row = sqlx::query_as::<_, ListingRow>(&format!(
            "UPDATE listings \
             SET status = $1, buyer_address = COALESCE($2, buyer_address), \
                 sold_at = COALESCE($3, sold_at) \
             WHERE id = $4 AND status = $5 \
             RETURNING {LISTING_COLUMNS}"
        ))
        .bind(update.status.as_str())
        .bind(update.buyer_address.as_ref().map(|a| a.as_str()))
        .bind(update.sold_at)
        .bind(id.as_uuid())
        .bind(from.as_str())
        .fetch_optional(&self.pool)
        .await;

        match row {
            Ok(row) => row.map(listing_from_row).transpose(),
            Err(e) if is_unique_violation(&e) => Err(GatewayError::EscrowMismatch(format!(
                "listing {id} conflicts with another active listing for its token"
            ))),
            Err(e) => Err(db_error(e)),
        }
    }

    async fn revert_claim(
        &self,
        id: ListingId,
        claimed: ListingStatus,
    ) -> Result<bool, GatewayError> {
        let result = sqlx::query(
            "UPDATE listings SET status = 'active', buyer_address = NULL, sold_at = NULL \
             WHERE id = $1 AND status = $2",
        )
        .bind(id.as_uuid())
        .bind(claimed.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.rows_affected() == 1),
            Err(e) if is_unique_violation(&e) => match self.get_listing(id).await? {
                Some(listing) => Err(GatewayError::DuplicateListing(listing.token_id)),
                None => Err(db_error(e)),
            },
            Err(e) => Err(db_error(e)),
        }
    }
}

#[async_trait]
impl SwapLog for PgStore {
    async fn append_swaps(&self, records: &[SwapRecord]) -> Result<(), GatewayError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        for record in records {
            sqlx::query(
                "INSERT INTO swap_records (network, from_asset, to_asset, rate, \
                 pool_balance_a, pool_balance_b, volume, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(record.network.as_str())
            .bind(record.from_asset.as_str())
            .bind(record.to_asset.as_str())
            .bind(record.rate)
            .bind(record.pool_balance_a.to_string())
            .bind(record.pool_balance_b.to_string())
            .bind(record.volume.to_string())
            .bind(record.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }
        tx.commit().await.map_err(db_error)
    }

    async fn recent_swaps(
        &self,
        network: Network,
        limit: usize,
    ) -> Result<Vec<SwapRecord>, GatewayError> {
        let rows = sqlx::query_as::<_, SwapRow>(&format!(
            "SELECT {SWAP_COLUMNS} FROM swap_records \
             WHERE network = $1 ORDER BY created_at DESC, id DESC LIMIT $2"
        ))
        .bind(network.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(swap_from_row).collect()
    }

    async fn claim_transfer(&self, network: Network, tx_ref: &TxRef) -> Result<bool, GatewayError> {
        let result = sqlx::query(
            "INSERT INTO settled_transfers (network, tx_ref) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(network.as_str())
        .bind(tx_ref.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_transfer(&self, network: Network, tx_ref: &TxRef) -> Result<(), GatewayError> {
        sqlx::query("DELETE FROM settled_transfers WHERE network = $1 AND tx_ref = $2")
            .bind(network.as_str())
            .bind(tx_ref.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}
