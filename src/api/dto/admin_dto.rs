//! Operator DTOs: reconciliation report and asset recovery.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ListingDto;
use crate::domain::Network;
use crate::service::{ReconciliationReport, RecoveryReceipt};

/// Response body for `GET /api/v1/admin/reconciliation`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResponse {
    /// Ledger network.
    pub network: Network,
    /// Assets in custody without an active listing, sorted.
    pub orphaned_token_ids: Vec<String>,
    /// Active listings whose NFT the anchor does not hold.
    pub unbacked_listings: Vec<ListingDto>,
}

impl From<ReconciliationReport> for ReconciliationResponse {
    fn from(report: ReconciliationReport) -> Self {
        Self {
            network: report.network,
            orphaned_token_ids: report.orphaned.iter().map(ToString::to_string).collect(),
            unbacked_listings: report.unbacked.into_iter().map(ListingDto::from).collect(),
        }
    }
}

/// Request body for `POST /api/v1/admin/recover`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecoverRequest {
    /// Ledger network.
    pub network: Network,
    /// Asset to move out of escrow.
    pub token_id: String,
    /// Destination address.
    pub recipient_address: String,
}

/// Response body for `POST /api/v1/admin/recover`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResponse {
    /// Recovered asset.
    pub token_id: String,
    /// Destination address.
    pub recipient_address: String,
    /// Amount moved.
    pub amount: String,
    /// Recovery transaction hash, or `"unknown"`.
    pub transaction_ref: String,
}

impl From<RecoveryReceipt> for RecoveryResponse {
    fn from(receipt: RecoveryReceipt) -> Self {
        Self {
            token_id: receipt.token_id.to_string(),
            recipient_address: receipt.recipient.to_string(),
            amount: receipt.amount.to_string(),
            transaction_ref: receipt.transaction_ref.to_string(),
        }
    }
}
