// ============================================================================
// KALE-STELLAR - Submission
// ============================================================================
// Send a signed envelope to the network once and classify the answer.
//
// Classification (first failing operation code wins over the tx code):
//   tx_bad_seq                                          -> RejectedBySequence
//   tx_too_late                                         -> ExpiredEnvelope
//   tx_insufficient_balance, op_underfunded,
//   op_low_reserve                                      -> RejectedByInsufficientBalance
//   anything else                                       -> RejectedByOperation
//   429 / 5xx / transport / timeout                     -> NetworkUnreachable
//
// Retry policy belongs to the caller: rebuild after a sequence or expiry
// failure, resend the same envelope after a transport failure.
// ============================================================================

use crate::config::NetworkProfile;
use crate::error::{KaleError, Stage, StageError};
use crate::horizon::HorizonProblem;
use crate::signing::SignedEnvelope;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub hash: String,
    pub ledger: u32,
}

/// Network endpoint that accepts signed envelopes
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// One round trip, no retry
    async fn submit(&self, signed: &SignedEnvelope) -> Result<SubmissionReceipt>;
}

/// Outcome of a submission attempt, in the shape callers persist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_sequence: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_stage: Option<Stage>,
}

impl SubmissionResult {
    pub fn accepted(receipt: &SubmissionReceipt) -> Self {
        Self {
            success: true,
            transaction_hash: Some(receipt.hash.clone()),
            ledger_sequence: Some(receipt.ledger),
            failure_reason: None,
            failure_stage: None,
        }
    }

    pub fn failed(err: &StageError) -> Self {
        Self {
            success: false,
            transaction_hash: None,
            ledger_sequence: None,
            failure_reason: Some(err.error.to_string()),
            failure_stage: Some(err.stage),
        }
    }
}

impl From<&std::result::Result<SubmissionReceipt, StageError>> for SubmissionResult {
    fn from(outcome: &std::result::Result<SubmissionReceipt, StageError>) -> Self {
        match outcome {
            Ok(receipt) => Self::accepted(receipt),
            Err(err) => Self::failed(err),
        }
    }
}

/// Map a Horizon rejection body to an error class
pub fn classify_rejection(problem: &HorizonProblem) -> KaleError {
    let codes = problem
        .extras
        .as_ref()
        .and_then(|e| e.result_codes.clone())
        .unwrap_or_default();

    let op_code = codes
        .operations
        .as_ref()
        .and_then(|ops| ops.iter().find(|c| c.as_str() != "op_success").cloned());
    let tx_code = codes.transaction.clone();

    let code = match op_code.or(tx_code) {
        Some(code) => code,
        None => {
            return KaleError::RejectedByOperation {
                code: "unknown".to_string(),
                detail: problem.detail.clone().or_else(|| problem.title.clone()),
            };
        }
    };

    match code.as_str() {
        "tx_bad_seq" => KaleError::RejectedBySequence(code),
        "tx_too_late" => KaleError::ExpiredEnvelope { max_time: None },
        "tx_insufficient_balance" | "op_underfunded" | "op_low_reserve" => {
            KaleError::RejectedByInsufficientBalance(code)
        }
        _ => KaleError::RejectedByOperation {
            code,
            detail: problem.detail.clone(),
        },
    }
}

/// Guards and sends signed envelopes for one network
pub struct Submitter {
    profile: NetworkProfile,
    transport: Arc<dyn TransactionSubmitter>,
    resend_on_unreachable: bool,
}

impl Submitter {
    pub fn new(profile: NetworkProfile, transport: Arc<dyn TransactionSubmitter>) -> Self {
        Self {
            profile,
            transport,
            resend_on_unreachable: false,
        }
    }

    /// Resend once after `NetworkUnreachable` while the envelope is still valid
    pub fn with_resend_on_unreachable(mut self, enabled: bool) -> Self {
        self.resend_on_unreachable = enabled;
        self
    }

    /// Submit, consuming the envelope
    pub async fn submit(&self, signed: SignedEnvelope) -> Result<SubmissionReceipt> {
        self.submit_at(signed, chrono::Utc::now().timestamp()).await
    }

    /// Submit with the clock at unix time `now`
    pub async fn submit_at(&self, signed: SignedEnvelope, now: i64) -> Result<SubmissionReceipt> {
        if signed.network_id() != self.profile.network_id() {
            return Err(KaleError::NetworkMismatch {
                expected: self.profile.network_passphrase.clone(),
                actual: signed.network_passphrase().to_string(),
            });
        }

        if now > signed.expires_at() {
            return Err(KaleError::ExpiredEnvelope {
                max_time: Some(signed.expires_at()),
            });
        }

        let result = match self.transport.submit(&signed).await {
            Err(err) if err.is_retryable() && self.resend_on_unreachable => {
                if chrono::Utc::now().timestamp().max(now) > signed.expires_at() {
                    return Err(err);
                }
                warn!("Submission unreachable, resending once: {}", err);
                self.transport.submit(&signed).await
            }
            other => other,
        };

        match result {
            Ok(receipt) => {
                info!(hash = %receipt.hash, ledger = receipt.ledger, "Transaction accepted");
                Ok(receipt)
            }
            Err(KaleError::ExpiredEnvelope { .. }) => Err(KaleError::ExpiredEnvelope {
                max_time: Some(signed.expires_at()),
            }),
            Err(err) => Err(err),
        }
    }
}
