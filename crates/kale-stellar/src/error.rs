// ============================================================================
// KALE-STELLAR - Error Types
// ============================================================================
// Every pipeline stage returns a tagged `KaleError` instead of a bare transport
// error. The contract façade wraps the first failure in a `StageError` so the
// caller can tell whether to rebuild, resend, or report to the user.
// ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KaleError {
    // ==================== Configuration ====================
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ==================== Account ====================
    #[error("Account not found (fund it first): {0}")]
    AccountNotFound(String),

    #[error("Another submission is already in flight for {0}")]
    AccountBusy(String),

    // ==================== Encoding / Assembly ====================
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    // ==================== Signing ====================
    #[error("Signing agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("Signing rejected: {0}")]
    Rejected(String),

    #[error("Network mismatch: expected '{expected}', signer used '{actual}'")]
    NetworkMismatch { expected: String, actual: String },

    // ==================== Submission ====================
    /// `max_time` is the envelope's upper time bound, when known
    #[error("Envelope expired{} (rebuild required)", expiry_suffix(.max_time))]
    ExpiredEnvelope { max_time: Option<i64> },

    #[error("Sequence number rejected: {0}")]
    RejectedBySequence(String),

    #[error("Insufficient balance: {0}")]
    RejectedByInsufficientBalance(String),

    #[error("Operation rejected: {code}")]
    RejectedByOperation { code: String, detail: Option<String> },

    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("Horizon API error: {0}")]
    Horizon(String),

    // ==================== Internal ====================
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl KaleError {
    /// Safe to resend the same signed envelope (within its expiry window).
    pub fn is_retryable(&self) -> bool {
        matches!(self, KaleError::NetworkUnreachable(_))
    }

    /// The caller must refetch the account and build a fresh envelope.
    pub fn requires_rebuild(&self) -> bool {
        matches!(
            self,
            KaleError::ExpiredEnvelope { .. } | KaleError::RejectedBySequence(_)
        )
    }

    /// Failures that need the user to act (fund, approve, switch network).
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            KaleError::AccountNotFound(_)
                | KaleError::AgentUnavailable(_)
                | KaleError::Rejected(_)
                | KaleError::NetworkMismatch { .. }
                | KaleError::RejectedByInsufficientBalance(_)
                | KaleError::RejectedByOperation { .. }
        )
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            KaleError::Configuration(_) => "configuration_error",
            KaleError::AccountNotFound(_) => "account_not_found",
            KaleError::AccountBusy(_) => "account_busy",
            KaleError::Encoding(_) => "encoding_error",
            KaleError::InvalidTransaction(_) => "invalid_transaction",
            KaleError::AgentUnavailable(_) => "agent_unavailable",
            KaleError::Rejected(_) => "rejected",
            KaleError::NetworkMismatch { .. } => "network_mismatch",
            KaleError::ExpiredEnvelope { .. } => "expired_envelope",
            KaleError::RejectedBySequence(_) => "rejected_by_sequence",
            KaleError::RejectedByInsufficientBalance(_) => "rejected_by_insufficient_balance",
            KaleError::RejectedByOperation { .. } => "rejected_by_operation",
            KaleError::NetworkUnreachable(_) => "network_unreachable",
            KaleError::Horizon(_) => "horizon_error",
            KaleError::Serialization(_) => "serialization_error",
        }
    }
}

fn expiry_suffix(max_time: &Option<i64>) -> String {
    max_time.map(|t| format!(" at {}", t)).unwrap_or_default()
}

impl From<reqwest::Error> for KaleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            KaleError::Serialization(err.to_string())
        } else {
            KaleError::NetworkUnreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for KaleError {
    fn from(err: serde_json::Error) -> Self {
        KaleError::Serialization(err.to_string())
    }
}

impl From<hex::FromHexError> for KaleError {
    fn from(err: hex::FromHexError) -> Self {
        KaleError::Encoding(err.to_string())
    }
}

impl From<base64::DecodeError> for KaleError {
    fn from(err: base64::DecodeError) -> Self {
        KaleError::Encoding(err.to_string())
    }
}

// ============================================================================
// STAGE TAGGING
// ============================================================================

/// Pipeline stage that produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Admission,
    AccountLookup,
    Encoding,
    Assembly,
    Signing,
    Submission,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Admission => "admission",
            Stage::AccountLookup => "account lookup",
            Stage::Encoding => "encoding",
            Stage::Assembly => "assembly",
            Stage::Signing => "signing",
            Stage::Submission => "submission",
        };
        f.write_str(name)
    }
}

/// First failure of a contract call, with the stage it came from
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{stage} failed: {error}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub error: KaleError,
}

impl StageError {
    pub fn new(stage: Stage, error: KaleError) -> Self {
        Self { stage, error }
    }
}

/// Attach a stage to a `KaleError` result
pub(crate) trait StageExt<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> StageExt<T> for std::result::Result<T, KaleError> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|error| StageError::new(stage, error))
    }
}
