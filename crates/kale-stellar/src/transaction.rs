// ============================================================================
// KALE-STELLAR - Transaction Assembly
// ============================================================================
// Build unsigned Stellar transaction envelopes for a single operation.
//
// A transaction consists of:
// - Source account
// - Sequence number (account's last confirmed + 1)
// - Fee
// - Time bounds (expiry window)
// - Memo (always none here)
// - Exactly one operation (native payment or contract invocation)
//
// The envelope goes to the wallet with an empty signature list.
// ============================================================================

use crate::codec::{self, TypedValue};
use crate::error::KaleError;
use crate::horizon::{AccountSnapshot, FeeStats};
use crate::strkey;
use crate::units::BASE_FEE_STROOPS;
use crate::xdr;
use crate::Result;
use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

pub(crate) const ENVELOPE_TYPE_TX: u32 = 2;
const KEY_TYPE_ED25519: u32 = 0;
const PRECOND_TIME: u32 = 1;
const MEMO_NONE: u32 = 0;
const ASSET_TYPE_NATIVE: u32 = 0;

const OP_PAYMENT: u32 = 1;
const OP_INVOKE_HOST_FUNCTION: u32 = 24;
const HOST_FUNCTION_TYPE_INVOKE_CONTRACT: u32 = 0;

/// Soroban symbols are at most 32 characters
const MAX_SYMBOL_LEN: usize = 32;

// ============================================================================
// OPERATIONS
// ============================================================================

/// The single operation carried by an envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationDescriptor {
    /// Native payment; `amount` is in stroops
    Payment { destination: String, amount: i64 },

    /// Contract entry point call with positional arguments
    ContractInvocation {
        contract: String,
        entry_point: String,
        arguments: Vec<TypedValue>,
    },
}

impl OperationDescriptor {
    pub fn payment(destination: &str, amount: i64) -> Self {
        OperationDescriptor::Payment {
            destination: destination.to_string(),
            amount,
        }
    }

    pub fn invoke(contract: &str, entry_point: &str, arguments: Vec<TypedValue>) -> Self {
        OperationDescriptor::ContractInvocation {
            contract: contract.to_string(),
            entry_point: entry_point.to_string(),
            arguments,
        }
    }

    /// Short label for logs
    pub fn label(&self) -> &str {
        match self {
            OperationDescriptor::Payment { .. } => "payment",
            OperationDescriptor::ContractInvocation { entry_point, .. } => entry_point,
        }
    }
}

// ============================================================================
// FEES
// ============================================================================

/// Fee per operation in stroops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    pub base_fee: u32,
}

impl FeePolicy {
    pub fn fixed(base_fee: u32) -> Self {
        Self { base_fee }
    }

    /// Median charged fee, never below the network base fee
    pub fn from_fee_stats(stats: &FeeStats) -> Self {
        let base = stats.last_ledger_base_fee.parse::<u32>().unwrap_or_else(|_| {
            warn!(
                "Unparseable base fee {:?}, using {}",
                stats.last_ledger_base_fee, BASE_FEE_STROOPS
            );
            BASE_FEE_STROOPS
        });
        let median = stats.fee_charged.p50.parse::<u32>().unwrap_or_else(|_| {
            warn!(
                "Unparseable median fee {:?}, using base fee {}",
                stats.fee_charged.p50, base
            );
            base
        });
        Self {
            base_fee: median.max(base),
        }
    }

    /// Total fee for `operations` operations
    pub fn total(&self, operations: u32) -> Result<u32> {
        self.base_fee
            .checked_mul(operations)
            .ok_or_else(|| KaleError::InvalidTransaction("Fee overflows u32".to_string()))
    }
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self::fixed(BASE_FEE_STROOPS)
    }
}

/// Validity window, unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBounds {
    pub min_time: u64,
    pub max_time: u64,
}

// ============================================================================
// UNSIGNED ENVELOPE
// ============================================================================

/// Unsigned transaction envelope.
///
/// Not `Clone`: it is moved into the signing coordinator and cannot be reused.
#[derive(Debug, PartialEq, Eq)]
pub struct UnsignedEnvelope {
    source_address: String,
    sequence_number: i64,
    fee: u32,
    operation: OperationDescriptor,
    expiry_window_seconds: u64,
    time_bounds: TimeBounds,
    tx_xdr: Vec<u8>,
}

impl UnsignedEnvelope {
    pub fn source_address(&self) -> &str {
        &self.source_address
    }

    /// Sequence this envelope will consume
    pub fn sequence_number(&self) -> i64 {
        self.sequence_number
    }

    pub fn fee(&self) -> u32 {
        self.fee
    }

    pub fn operation(&self) -> &OperationDescriptor {
        &self.operation
    }

    pub fn expiry_window_seconds(&self) -> u64 {
        self.expiry_window_seconds
    }

    pub fn time_bounds(&self) -> TimeBounds {
        self.time_bounds
    }

    /// Last unix second at which the network will accept the envelope
    pub fn expires_at(&self) -> i64 {
        i64::try_from(self.time_bounds.max_time).unwrap_or(i64::MAX)
    }

    /// `Transaction` XDR (no envelope wrapper)
    pub fn transaction_xdr(&self) -> &[u8] {
        &self.tx_xdr
    }

    /// `TransactionEnvelope` XDR with an empty signature list
    pub fn to_xdr(&self) -> Vec<u8> {
        let mut envelope = Vec::with_capacity(self.tx_xdr.len() + 8);
        xdr::write_u32(&mut envelope, ENVELOPE_TYPE_TX);
        envelope.extend_from_slice(&self.tx_xdr);
        xdr::write_u32(&mut envelope, 0);
        envelope
    }

    /// Base64 envelope, the form wallets accept
    pub fn to_xdr_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.to_xdr())
    }

    /// Transaction hash for the given network id
    pub fn hash(&self, network_id: &[u8; 32]) -> [u8; 32] {
        transaction_hash(network_id, &self.tx_xdr)
    }
}

/// sha256(network_id || ENVELOPE_TYPE_TX || tx_xdr)
pub(crate) fn transaction_hash(network_id: &[u8; 32], tx_xdr: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(network_id);
    hasher.update(ENVELOPE_TYPE_TX.to_be_bytes());
    hasher.update(tx_xdr);
    hasher.finalize().into()
}

/// Strip the envelope wrapper from an unsigned envelope, returning the tx XDR
pub(crate) fn unwrap_unsigned_envelope(envelope: &[u8]) -> Result<&[u8]> {
    let invalid = || KaleError::InvalidTransaction("Not an unsigned v1 envelope".to_string());
    if envelope.len() < 8 {
        return Err(invalid());
    }
    let (head, rest) = envelope.split_at(4);
    let (tx, tail) = rest.split_at(rest.len() - 4);
    if head != ENVELOPE_TYPE_TX.to_be_bytes() || tail != [0, 0, 0, 0] {
        return Err(invalid());
    }
    Ok(tx)
}

// ============================================================================
// ASSEMBLER
// ============================================================================

/// Turns an account snapshot plus one operation into an unsigned envelope
pub struct TransactionAssembler;

impl TransactionAssembler {
    /// Assemble against the current clock
    pub fn assemble(
        snapshot: &AccountSnapshot,
        operation: OperationDescriptor,
        fee_policy: &FeePolicy,
        expiry_window_seconds: u64,
    ) -> Result<UnsignedEnvelope> {
        let now = chrono::Utc::now().timestamp();
        Self::assemble_at(snapshot, operation, fee_policy, expiry_window_seconds, now)
    }

    /// Deterministic assembly at unix time `now`
    pub fn assemble_at(
        snapshot: &AccountSnapshot,
        operation: OperationDescriptor,
        fee_policy: &FeePolicy,
        expiry_window_seconds: u64,
        now: i64,
    ) -> Result<UnsignedEnvelope> {
        if expiry_window_seconds == 0 {
            return Err(KaleError::InvalidTransaction(
                "Expiry window must be positive".to_string(),
            ));
        }

        if snapshot.sequence_number < 0 {
            return Err(KaleError::InvalidTransaction(format!(
                "Negative sequence number {}",
                snapshot.sequence_number
            )));
        }

        let sequence_number = snapshot.sequence_number.checked_add(1).ok_or_else(|| {
            KaleError::InvalidTransaction("Sequence number exhausted".to_string())
        })?;

        let fee = fee_policy.total(1)?;

        let max_time = u64::try_from(now)
            .ok()
            .and_then(|n| n.checked_add(expiry_window_seconds))
            .ok_or_else(|| KaleError::InvalidTransaction(format!("Invalid clock {}", now)))?;
        let time_bounds = TimeBounds { min_time: 0, max_time };

        let tx_xdr = write_transaction(
            &snapshot.address,
            fee,
            sequence_number,
            time_bounds,
            &operation,
        )?;

        debug!(
            source = %snapshot.address,
            sequence = sequence_number,
            fee,
            op = operation.label(),
            "Assembled envelope"
        );

        Ok(UnsignedEnvelope {
            source_address: snapshot.address.clone(),
            sequence_number,
            fee,
            operation,
            expiry_window_seconds,
            time_bounds,
            tx_xdr,
        })
    }
}

// ============================================================================
// XDR
// ============================================================================

fn write_transaction(
    source: &str,
    fee: u32,
    sequence: i64,
    bounds: TimeBounds,
    operation: &OperationDescriptor,
) -> Result<Vec<u8>> {
    let mut tx = Vec::new();

    write_muxed_account(&mut tx, source)?;
    xdr::write_u32(&mut tx, fee);
    xdr::write_i64(&mut tx, sequence);

    // Preconditions
    xdr::write_u32(&mut tx, PRECOND_TIME);
    xdr::write_u64(&mut tx, bounds.min_time);
    xdr::write_u64(&mut tx, bounds.max_time);

    xdr::write_u32(&mut tx, MEMO_NONE);

    // Operations array (one)
    xdr::write_u32(&mut tx, 1);
    write_operation(&mut tx, operation)?;

    // Ext
    xdr::write_u32(&mut tx, 0);

    Ok(tx)
}

fn write_muxed_account(xdr_buf: &mut Vec<u8>, address: &str) -> Result<()> {
    let key = strkey::decode_account(address)?;
    xdr::write_u32(xdr_buf, KEY_TYPE_ED25519);
    xdr::write_fixed(xdr_buf, &key);
    Ok(())
}

fn write_operation(tx: &mut Vec<u8>, operation: &OperationDescriptor) -> Result<()> {
    // No per-operation source override
    xdr::write_u32(tx, 0);

    match operation {
        OperationDescriptor::Payment { destination, amount } => {
            if *amount <= 0 {
                return Err(KaleError::InvalidTransaction(format!(
                    "Payment amount must be positive, got {}",
                    amount
                )));
            }
            xdr::write_u32(tx, OP_PAYMENT);
            write_muxed_account(tx, destination)?;
            xdr::write_u32(tx, ASSET_TYPE_NATIVE);
            xdr::write_i64(tx, *amount);
        }

        OperationDescriptor::ContractInvocation {
            contract,
            entry_point,
            arguments,
        } => {
            validate_symbol(entry_point)?;
            xdr::write_u32(tx, OP_INVOKE_HOST_FUNCTION);
            xdr::write_u32(tx, HOST_FUNCTION_TYPE_INVOKE_CONTRACT);
            codec::write_sc_address(tx, contract)?;
            xdr::write_var(tx, entry_point.as_bytes());
            xdr::write_u32(tx, arguments.len() as u32);
            for arg in arguments {
                codec::write_scval(tx, arg)?;
            }
            // Auth entries (none)
            xdr::write_u32(tx, 0);
        }
    }

    Ok(())
}

fn validate_symbol(name: &str) -> Result<()> {
    if name.is_empty()
        || name.len() > MAX_SYMBOL_LEN
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(KaleError::Encoding(format!("Invalid entry point name '{}'", name)));
    }
    Ok(())
}
