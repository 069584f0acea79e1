// ============================================================================
// KALE-STELLAR - Stellar Transaction Pipeline
// ============================================================================
// Build, sign and submit Stellar transactions for the KALE farming contract.
//
// Key insight: the wallet holds the keys, we hold the sequence number.
// Every attempt reads the account fresh, builds exactly one envelope from
// that snapshot, hands it to the wallet, and submits what comes back.
//
// Features:
// - Soroban argument encoding (addresses, i128, u64, u32, BytesN)
// - Envelope assembly with fees and expiry windows
// - Wallet-driven signing with network checks
// - Submission with classified failures (rebuild vs resend)
// - plant / work / harvest / pay through one façade
// ============================================================================

pub mod codec;
pub mod config;
pub mod contract;
pub mod error;
pub mod horizon;
pub mod inflight;
pub mod signing;
pub mod strkey;
pub mod submit;
pub mod transaction;
pub mod units;
mod xdr;

pub use codec::{TypedValue, WireValue};
pub use config::{ClientSettings, Network, NetworkProfile};
pub use contract::{CallResult, ContractClient};
pub use error::{KaleError, Stage, StageError};
pub use horizon::{AccountGateway, AccountSnapshot, HorizonClient};
pub use inflight::{InFlightGuard, InFlightRegistry};
pub use signing::{
    AgentError, LocalKeyAgent, SignRequest, SignResponse, SignedEnvelope, SigningAgent,
    SigningCoordinator, SigningState, WalletConnection,
};
pub use submit::{SubmissionReceipt, SubmissionResult, Submitter, TransactionSubmitter};
pub use transaction::{FeePolicy, OperationDescriptor, TransactionAssembler, UnsignedEnvelope};

/// Re-export for convenience
pub type Result<T> = std::result::Result<T, KaleError>;
