// ============================================================================
// KALE-STELLAR - Contract Client
// ============================================================================
// One method per KALE farming entry point:
//
//   plant(farmer: Address, amount: i128)              stake for the block
//   work(farmer: Address, hash: BytesN<32>, nonce: u64) submit proof of work
//   harvest(farmer: Address, index: u32)              claim the block reward
//
// plus native payments and a generic `invoke`.
//
// Every call runs the same pipeline and stops at the first failure:
//   in-flight marker -> account lookup -> encode -> assemble -> sign -> submit
// ============================================================================

use crate::codec::{self, TypedValue};
use crate::config::{ClientSettings, NetworkProfile};
use crate::error::{KaleError, Stage, StageError, StageExt};
use crate::horizon::{AccountGateway, HorizonClient};
use crate::inflight::InFlightRegistry;
use crate::signing::{SigningAgent, SigningCoordinator};
use crate::submit::{SubmissionReceipt, Submitter, TransactionSubmitter};
use crate::transaction::{FeePolicy, OperationDescriptor, TransactionAssembler};
use crate::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Outcome of one contract call
pub type CallResult = std::result::Result<SubmissionReceipt, StageError>;

/// Façade over the submission pipeline for one network
pub struct ContractClient {
    profile: NetworkProfile,
    settings: ClientSettings,
    gateway: Arc<dyn AccountGateway>,
    coordinator: SigningCoordinator,
    submitter: Submitter,
    in_flight: InFlightRegistry,
}

impl ContractClient {
    /// Horizon-backed client
    pub fn new(
        profile: NetworkProfile,
        settings: ClientSettings,
        agent: Arc<dyn SigningAgent>,
    ) -> Result<Self> {
        profile.validate()?;
        let horizon = Arc::new(HorizonClient::new(profile.clone(), settings.request_timeout())?);
        Ok(Self::with_parts(
            profile,
            settings,
            horizon.clone(),
            horizon,
            agent,
        ))
    }

    /// Client over injected collaborators
    pub fn with_parts(
        profile: NetworkProfile,
        settings: ClientSettings,
        gateway: Arc<dyn AccountGateway>,
        transport: Arc<dyn TransactionSubmitter>,
        agent: Arc<dyn SigningAgent>,
    ) -> Self {
        let coordinator = SigningCoordinator::new(agent, profile.clone());
        let submitter = Submitter::new(profile.clone(), transport)
            .with_resend_on_unreachable(settings.resend_on_unreachable);

        Self {
            profile,
            settings,
            gateway,
            coordinator,
            submitter,
            in_flight: InFlightRegistry::new(),
        }
    }

    pub fn profile(&self) -> &NetworkProfile {
        &self.profile
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }

    pub fn coordinator(&self) -> &SigningCoordinator {
        &self.coordinator
    }

    // ==================== Entry Points ====================

    /// Stake `amount` stroops of KALE for the current block
    pub async fn plant(&self, signer: &str, farmer: &str, amount: i128) -> CallResult {
        self.call(signer, "plant", || {
            if amount < 0 {
                return Err(KaleError::Encoding(format!(
                    "Plant amount must not be negative, got {}",
                    amount
                )));
            }
            Ok(vec![TypedValue::address(farmer)?, TypedValue::I128(amount)])
        })
        .await
    }

    /// Submit a proof-of-work hash (64 hex chars) and its nonce
    pub async fn work(&self, signer: &str, farmer: &str, hash_hex: &str, nonce: u64) -> CallResult {
        self.call(signer, "work", || {
            Ok(vec![
                TypedValue::address(farmer)?,
                TypedValue::fixed_bytes_from_hex(hash_hex, 32)?,
                TypedValue::U64(nonce),
            ])
        })
        .await
    }

    /// Claim the reward for `block_index`
    pub async fn harvest(&self, signer: &str, farmer: &str, block_index: u32) -> CallResult {
        self.call(signer, "harvest", || {
            Ok(vec![TypedValue::address(farmer)?, TypedValue::U32(block_index)])
        })
        .await
    }

    /// Native payment of `amount` stroops
    pub async fn pay(&self, sender: &str, destination: &str, amount: i64) -> CallResult {
        let destination = destination.to_string();
        self.execute(sender, move || {
            crate::strkey::decode_account(&destination)?;
            Ok(OperationDescriptor::Payment { destination, amount })
        })
        .await
    }

    /// Any entry point of the configured contract
    pub async fn invoke(
        &self,
        signer: &str,
        entry_point: &str,
        arguments: Vec<TypedValue>,
    ) -> CallResult {
        self.call(signer, entry_point, move || Ok(arguments)).await
    }

    // ==================== Pipeline ====================

    async fn call<F>(&self, signer: &str, entry_point: &str, arguments: F) -> CallResult
    where
        F: FnOnce() -> Result<Vec<TypedValue>>,
    {
        let contract = self.profile.require_contract().at(Stage::Admission)?.to_string();
        let entry_point = entry_point.to_string();

        self.execute(signer, move || {
            let arguments = arguments()?;
            // Encoded once, by the assembler
            codec::validate_all(&arguments)?;
            debug!("{} argument(s) ready for {}", arguments.len(), entry_point);
            Ok(OperationDescriptor::ContractInvocation {
                contract,
                entry_point,
                arguments,
            })
        })
        .await
    }

    async fn execute<F>(&self, source: &str, operation: F) -> CallResult
    where
        F: FnOnce() -> Result<OperationDescriptor>,
    {
        // Held until this future completes or is dropped
        let _marker = self.in_flight.try_acquire(source).at(Stage::Admission)?;

        let snapshot = self
            .bounded("Account lookup", self.gateway.fetch(source))
            .await
            .at(Stage::AccountLookup)?;

        let operation = operation().at(Stage::Encoding)?;
        let label = operation.label().to_string();

        let envelope = TransactionAssembler::assemble(
            &snapshot,
            operation,
            &FeePolicy::fixed(self.settings.base_fee),
            self.settings.expiry_window_secs,
        )
        .at(Stage::Assembly)?;

        info!(
            source = %source,
            op = %label,
            sequence = envelope.sequence_number(),
            "Requesting signature"
        );

        let signed = self.coordinator.sign(envelope).await.at(Stage::Signing)?;

        let receipt = self
            .bounded("Submission", self.submitter.submit(signed))
            .await
            .at(Stage::Submission)
            .map_err(|e| {
                warn!(op = %label, "Submission failed: {}", e);
                e
            })?;

        info!(
            op = %label,
            hash = %receipt.hash,
            explorer = %self.profile.explorer_tx_url(&receipt.hash),
            "Call accepted"
        );

        Ok(receipt)
    }

    /// Apply the request timeout; elapsed time counts as unreachable
    async fn bounded<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.settings.request_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(KaleError::NetworkUnreachable(format!(
                "{} timed out after {}s",
                what, self.settings.request_timeout_secs
            ))),
        }
    }
}
