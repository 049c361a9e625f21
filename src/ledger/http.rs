//! HTTP adapter for a ledger node's REST API.
//!
//! Endpoints used (relative to the configured base URL):
//!
//! | Method | Path                               | Purpose            |
//! |--------|------------------------------------|--------------------|
//! | GET    | `accounts/{address}/balances`       | all holdings       |
//! | GET    | `accounts/{address}/balances/{id}`  | one balance        |
//! | POST   | `transactions`                      | submit             |
//! | GET    | `transactions/{hash}`               | status lookup      |
//!
//! Transport failures and 5xx answers map to [`LedgerError::Network`]
//! (retryable); 4xx answers to a submission map to
//! [`LedgerError::Rejected`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{Holding, LedgerClient, LedgerError, LedgerTransaction, TransactionInfo, Transfer, TxStatus};
use crate::domain::{AccountAddress, Amount, AssetId, Network, TxRef};

/// Ledger client speaking JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLedger {
    client: Client,
    base_url: Url,
    network: Network,
}

#[derive(Debug, Deserialize)]
struct BalanceDto {
    asset: String,
    amount: Amount,
}

#[derive(Debug, Deserialize)]
struct SubmitDto {
    #[serde(default)]
    hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionDto {
    #[serde(default)]
    hash: Option<String>,
    status: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    legs: Vec<Transfer>,
}

impl HttpLedger {
    /// Creates a client for the node at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Decode`] if the URL cannot be used as a base
    /// and [`LedgerError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, network: Network, timeout: Duration) -> Result<Self, LedgerError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| LedgerError::Decode(format!("invalid ledger url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(LedgerError::Decode(format!(
                "ledger url {base_url} cannot be a base"
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            network,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, LedgerError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| LedgerError::Decode("ledger url cannot be a base".to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Response, LedgerError> {
        self.client.get(url).send().await.map_err(transport)
    }
}

fn transport(err: reqwest::Error) -> LedgerError {
    LedgerError::Network(err.to_string())
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, LedgerError> {
    let status = response.status();
    if status.is_client_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(LedgerError::Rejected(format!("{status}: {body}")));
    }
    if !status.is_success() {
        return Err(LedgerError::Network(format!("ledger node answered {status}")));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| LedgerError::Network(format!("malformed ledger response: {e}")))
}

fn parse_status(dto: &TransactionDto) -> Result<TxStatus, LedgerError> {
    match dto.status.as_str() {
        "pending" => Ok(TxStatus::Pending),
        "final" | "success" | "confirmed" => Ok(TxStatus::Final),
        "failed" => Ok(TxStatus::Failed(
            dto.reason.clone().unwrap_or_else(|| "unspecified".to_string()),
        )),
        other => Err(LedgerError::Network(format!(
            "unknown transaction status {other:?}"
        ))),
    }
}

#[async_trait]
impl LedgerClient for HttpLedger {
    fn network(&self) -> Network {
        self.network
    }

    async fn balance(
        &self,
        account: &AccountAddress,
        asset: &AssetId,
    ) -> Result<Amount, LedgerError> {
        let url = self.endpoint(&["accounts", account.as_str(), "balances", asset.as_str()])?;
        let response = self.get(url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Amount::ZERO);
        }
        let dto: BalanceDto = read_json(response).await?;
        Ok(dto.amount)
    }

    async fn holdings(&self, account: &AccountAddress) -> Result<Vec<Holding>, LedgerError> {
        let url = self.endpoint(&["accounts", account.as_str(), "balances"])?;
        let response = self.get(url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let rows: Vec<BalanceDto> = read_json(response).await?;
        let mut holdings = Vec::with_capacity(rows.len());
        for row in rows {
            if row.amount.is_zero() {
                continue;
            }
            match AssetId::new(row.asset) {
                Ok(asset) => holdings.push(Holding {
                    asset,
                    amount: row.amount,
                }),
                Err(e) => tracing::warn!(network = %self.network, error = %e, "skipping unparseable holding"),
            }
        }
        Ok(holdings)
    }

    async fn submit(&self, transaction: &LedgerTransaction) -> Result<TxRef, LedgerError> {
        let url = self.endpoint(&["transactions"])?;
        let response = self
            .client
            .post(url)
            .json(transaction)
            .send()
            .await
            .map_err(transport)?;
        let dto: SubmitDto = read_json(response).await?;
        let tx_ref = dto.hash.map_or_else(TxRef::unknown, TxRef::new);
        if tx_ref.is_unknown() {
            tracing::warn!(network = %self.network, tx_id = %transaction.id, "ledger accepted transaction without returning a hash");
        }
        Ok(tx_ref)
    }

    async fn transaction(&self, tx_ref: &TxRef) -> Result<Option<TransactionInfo>, LedgerError> {
        let url = self.endpoint(&["transactions", tx_ref.as_str()])?;
        let response = self.get(url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let dto: TransactionDto = read_json(response).await?;
        let status = parse_status(&dto)?;
        Ok(Some(TransactionInfo {
            tx_ref: dto.hash.map_or_else(|| tx_ref.clone(), TxRef::new),
            status,
            legs: dto.legs,
        }))
    }
}
