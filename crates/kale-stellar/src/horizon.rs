// ============================================================================
// KALE-STELLAR - Horizon API Client
// ============================================================================
// HTTP client for Stellar's Horizon API.
// Account reads (sequence + native balance), transaction submission,
// fee stats and testnet friendbot funding.
// ============================================================================

use crate::config::NetworkProfile;
use crate::error::KaleError;
use crate::signing::SignedEnvelope;
use crate::strkey;
use crate::submit::{classify_rejection, SubmissionReceipt, TransactionSubmitter};
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// DATA TYPES
// ============================================================================

/// Account balance line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    /// "native" for XLM, "credit_alphanum4" / "credit_alphanum12" for tokens
    pub asset_type: String,

    #[serde(default)]
    pub asset_code: Option<String>,

    #[serde(default)]
    pub asset_issuer: Option<String>,

    /// Decimal string (Stellar keeps 7 places)
    pub balance: String,
}

impl Balance {
    pub fn is_native(&self) -> bool {
        self.asset_type == "native"
    }
}

/// Horizon account record (fields we consume)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    /// G... address
    pub id: String,

    /// String-encoded int64
    pub sequence: String,

    #[serde(default)]
    pub balances: Vec<Balance>,

    #[serde(default)]
    pub subentry_count: u32,
}

impl AccountInfo {
    /// Native balance as reported, "0" when absent
    pub fn native_balance(&self) -> String {
        self.balances
            .iter()
            .find(|b| b.is_native())
            .map(|b| b.balance.clone())
            .unwrap_or_else(|| "0".to_string())
    }
}

/// Account state read immediately before building an envelope.
///
/// Never cache one across builds: the network consumes sequence numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub address: String,
    /// Last sequence number confirmed by the network
    pub sequence_number: i64,
    /// Native balance as a decimal string
    pub native_balance: String,
}

impl AccountSnapshot {
    pub fn new(address: &str, sequence_number: i64, native_balance: &str) -> Self {
        Self {
            address: address.to_string(),
            sequence_number,
            native_balance: native_balance.to_string(),
        }
    }

    /// Native balance in stroops
    pub fn native_balance_stroops(&self) -> Result<i64> {
        crate::units::to_stroops(&self.native_balance)
    }
}

impl TryFrom<AccountInfo> for AccountSnapshot {
    type Error = KaleError;

    fn try_from(info: AccountInfo) -> Result<Self> {
        let sequence_number = info.sequence.parse::<i64>().map_err(|e| {
            KaleError::Serialization(format!("Invalid sequence '{}': {}", info.sequence, e))
        })?;
        let native_balance = info.native_balance();
        Ok(Self {
            address: info.id,
            sequence_number,
            native_balance,
        })
    }
}

/// Successful `POST /transactions` body
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TransactionResponse {
    pub hash: String,
    pub ledger: u32,
    #[serde(default)]
    pub successful: Option<bool>,
}

/// Horizon problem+json body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HorizonProblem {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub title: Option<String>,
    pub status: Option<u16>,
    pub detail: Option<String>,
    pub extras: Option<HorizonErrorExtras>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HorizonErrorExtras {
    pub envelope_xdr: Option<String>,
    pub result_codes: Option<ResultCodes>,
    pub result_xdr: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultCodes {
    pub transaction: Option<String>,
    pub operations: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeStats {
    pub last_ledger: String,
    pub last_ledger_base_fee: String,
    pub ledger_capacity_usage: String,
    pub fee_charged: FeePercentiles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeePercentiles {
    pub max: String,
    pub min: String,
    pub mode: String,
    pub p50: String,
    pub p90: String,
    pub p99: String,
}

// ============================================================================
// ACCOUNT GATEWAY
// ============================================================================

/// Read-only source of account state
#[async_trait]
pub trait AccountGateway: Send + Sync {
    /// Current snapshot; `AccountNotFound` when the account was never funded
    async fn fetch(&self, address: &str) -> Result<AccountSnapshot>;
}

// ============================================================================
// HORIZON CLIENT
// ============================================================================

/// Client for Stellar Horizon API
pub struct HorizonClient {
    profile: NetworkProfile,
    http: Client,
}

impl HorizonClient {
    /// Create a client; every request is bounded by `timeout`
    pub fn new(profile: NetworkProfile, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KaleError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { profile, http })
    }

    pub fn profile(&self) -> &NetworkProfile {
        &self.profile
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.profile.endpoint_url.trim_end_matches('/'), path)
    }

    // ==================== Account Operations ====================

    /// Load account information
    pub async fn load_account(&self, address: &str) -> Result<AccountInfo> {
        strkey::decode_account(address)?;
        let url = self.url(&format!("accounts/{}", address));

        debug!("Loading account: {}", address);

        let response = self.http.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json::<AccountInfo>().await?),
            StatusCode::NOT_FOUND => Err(KaleError::AccountNotFound(address.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(status_error(status, &body))
            }
        }
    }

    /// Check if account exists
    pub async fn account_exists(&self, address: &str) -> Result<bool> {
        match self.load_account(address).await {
            Ok(_) => Ok(true),
            Err(KaleError::AccountNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Native balance; "0" for an unfunded account
    pub async fn native_balance(&self, address: &str) -> Result<String> {
        match self.load_account(address).await {
            Ok(account) => Ok(account.native_balance()),
            Err(KaleError::AccountNotFound(_)) => Ok("0".to_string()),
            Err(e) => Err(e),
        }
    }

    // ==================== Fees ====================

    /// Get current fee stats
    pub async fn fee_stats(&self) -> Result<FeeStats> {
        let response = self.http.get(self.url("fee_stats")).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json::<FeeStats>().await?),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(status_error(status, &body))
            }
        }
    }

    // ==================== Testnet Only ====================

    /// Fund account using friendbot (testnet only)
    pub async fn friendbot_fund(&self, address: &str) -> Result<()> {
        let friendbot_url = self.profile.friendbot_url().ok_or_else(|| {
            KaleError::Configuration("Friendbot only available on testnet".to_string())
        })?;
        strkey::decode_account(address)?;

        debug!("Requesting friendbot funding for: {}", address);

        let response = self
            .http
            .get(friendbot_url)
            .query(&[("addr", address)])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                debug!("Friendbot funded account: {}", address);
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(status_error(status, &body))
            }
        }
    }
}

#[async_trait]
impl AccountGateway for HorizonClient {
    async fn fetch(&self, address: &str) -> Result<AccountSnapshot> {
        let snapshot = AccountSnapshot::try_from(self.load_account(address).await?)?;
        debug!(
            address = %snapshot.address,
            sequence = snapshot.sequence_number,
            "Fetched account snapshot"
        );
        Ok(snapshot)
    }
}

#[async_trait]
impl TransactionSubmitter for HorizonClient {
    async fn submit(&self, signed: &SignedEnvelope) -> Result<SubmissionReceipt> {
        debug!("Submitting transaction...");

        let response = self
            .http
            .post(self.url("transactions"))
            .form(&[("tx", signed.envelope_xdr())])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let tx: TransactionResponse = response.json().await?;
                if tx.successful == Some(false) {
                    return Err(KaleError::RejectedByOperation {
                        code: "tx_failed".to_string(),
                        detail: Some(tx.hash),
                    });
                }
                debug!("Transaction successful: {}", tx.hash);
                Ok(SubmissionReceipt {
                    hash: tx.hash,
                    ledger: tx.ledger,
                })
            }
            StatusCode::BAD_REQUEST => {
                // A 400 is a rejection even when the body is not problem+json
                let body = response.text().await.unwrap_or_default();
                let problem = serde_json::from_str::<HorizonProblem>(&body).unwrap_or_else(|e| {
                    warn!("Unreadable rejection body ({}): {}", e, body);
                    HorizonProblem::default()
                });
                let err = classify_rejection(&problem);
                warn!("Transaction rejected: {}", err);
                Err(err)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(status_error(status, &body))
            }
        }
    }
}

/// Map a non-success status outside the documented cases
fn status_error(status: StatusCode, body: &str) -> KaleError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        KaleError::NetworkUnreachable(format!("HTTP {}", status.as_u16()))
    } else {
        KaleError::Horizon(format!("HTTP {}: {}", status.as_u16(), body))
    }
}
