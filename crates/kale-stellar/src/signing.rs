// ============================================================================
// KALE-STELLAR - Signing Coordination
// ============================================================================
// The wallet holds the keys. We hand it an unsigned envelope, wait for the
// user to approve or decline, and check the network it signed for.
//
// Per-request states:
//   Idle -> AwaitingAgentDetection -> AwaitingUserDecision
//        -> Signed | Rejected | AgentUnavailable | NetworkMismatch
//
// There is no timeout on the user decision. Dropping the future abandons
// the request.
// ============================================================================

use crate::config::NetworkProfile;
use crate::error::KaleError;
use crate::strkey;
use crate::transaction::{
    transaction_hash, unwrap_unsigned_envelope, UnsignedEnvelope, ENVELOPE_TYPE_TX,
};
use crate::xdr;
use crate::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ============================================================================
// AGENT INTERFACE
// ============================================================================

/// Failure reported by a signing agent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("User rejected: {0}")]
    UserRejected(String),

    #[error("Agent unavailable: {0}")]
    Unavailable(String),

    #[error("Agent error: {0}")]
    Internal(String),
}

/// What the agent is asked to sign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    /// Base64 unsigned envelope
    pub envelope_xdr: String,
    pub network_passphrase: String,
    /// Account expected to sign
    pub address: Option<String>,
}

/// What the agent hands back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    /// Base64 signed envelope
    pub signed_envelope_xdr: String,
    /// Passphrase the agent actually signed for
    pub network_passphrase: String,
    pub signer_address: String,
}

/// External wallet (browser extension, hardware device, local key)
#[async_trait]
pub trait SigningAgent: Send + Sync {
    /// Whether the agent can be reached at all
    async fn is_available(&self) -> bool;

    /// Passphrase the agent is currently set to, if it reports one
    async fn active_network(&self) -> std::result::Result<Option<String>, AgentError> {
        Ok(None)
    }

    /// Connected account (G...)
    async fn public_key(&self) -> std::result::Result<String, AgentError>;

    /// Prompt the user and sign. May wait indefinitely.
    async fn sign_transaction(
        &self,
        request: SignRequest,
    ) -> std::result::Result<SignResponse, AgentError>;
}

/// Account and network reported by a connected agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletConnection {
    pub public_key: String,
    pub network_passphrase: Option<String>,
}

// ============================================================================
// SIGNED ENVELOPE
// ============================================================================

/// Envelope returned by the agent. Consumed by the submitter.
#[derive(Debug, PartialEq, Eq)]
pub struct SignedEnvelope {
    envelope_xdr: String,
    network_passphrase: String,
    signer_address: String,
    expires_at: i64,
}

impl SignedEnvelope {
    /// Wrap an envelope signed elsewhere
    pub fn new(
        envelope_xdr: &str,
        network_passphrase: &str,
        signer_address: &str,
        expires_at: i64,
    ) -> Self {
        Self {
            envelope_xdr: envelope_xdr.to_string(),
            network_passphrase: network_passphrase.to_string(),
            signer_address: signer_address.to_string(),
            expires_at,
        }
    }

    /// Base64 signed envelope
    pub fn envelope_xdr(&self) -> &str {
        &self.envelope_xdr
    }

    pub fn network_passphrase(&self) -> &str {
        &self.network_passphrase
    }

    pub fn signer_address(&self) -> &str {
        &self.signer_address
    }

    /// Unix second after which the network refuses the envelope
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// SHA-256 of the declared passphrase
    pub fn network_id(&self) -> [u8; 32] {
        Sha256::digest(self.network_passphrase.as_bytes()).into()
    }
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Observable state of one signing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningState {
    Idle,
    AwaitingAgentDetection,
    AwaitingUserDecision,
    Signed,
    Rejected,
    AgentUnavailable,
    NetworkMismatch,
}

impl SigningState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SigningState::Signed
                | SigningState::Rejected
                | SigningState::AgentUnavailable
                | SigningState::NetworkMismatch
        )
    }
}

/// Routes envelopes to a signing agent for one network
#[derive(Clone)]
pub struct SigningCoordinator {
    agent: Arc<dyn SigningAgent>,
    profile: NetworkProfile,
}

impl SigningCoordinator {
    pub fn new(agent: Arc<dyn SigningAgent>, profile: NetworkProfile) -> Self {
        Self { agent, profile }
    }

    /// Ask the agent for its account and network
    pub async fn connect(&self) -> Result<WalletConnection> {
        if !self.agent.is_available().await {
            return Err(KaleError::AgentUnavailable("No signing agent detected".to_string()));
        }

        let public_key = self.agent.public_key().await.map_err(agent_failure)?;
        strkey::decode_account(&public_key)?;
        let network_passphrase = self.agent.active_network().await.map_err(agent_failure)?;

        info!("Connected to signing agent: {}", public_key);

        Ok(WalletConnection {
            public_key,
            network_passphrase,
        })
    }

    /// Start a request whose progress can be observed before it runs
    pub fn request(&self, envelope: UnsignedEnvelope) -> SigningRequest {
        let (state, _) = watch::channel(SigningState::Idle);
        SigningRequest {
            id: Uuid::new_v4(),
            agent: Arc::clone(&self.agent),
            profile: self.profile.clone(),
            envelope,
            state,
        }
    }

    /// Sign without observing intermediate states
    pub async fn sign(&self, envelope: UnsignedEnvelope) -> Result<SignedEnvelope> {
        self.request(envelope).run().await
    }
}

/// A single pending signature
pub struct SigningRequest {
    id: Uuid,
    agent: Arc<dyn SigningAgent>,
    profile: NetworkProfile,
    envelope: UnsignedEnvelope,
    state: watch::Sender<SigningState>,
}

impl SigningRequest {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subscribe(&self) -> watch::Receiver<SigningState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SigningState {
        *self.state.borrow()
    }

    fn enter(&self, next: SigningState) {
        debug!(request_id = %self.id, state = ?next, "Signing state");
        self.state.send_replace(next);
    }

    fn fail(&self, next: SigningState, err: KaleError) -> KaleError {
        self.enter(next);
        warn!(request_id = %self.id, "Signing failed: {}", err);
        err
    }

    /// Drive the request to a terminal state
    pub async fn run(self) -> Result<SignedEnvelope> {
        let expected = self.profile.network_passphrase.clone();

        self.enter(SigningState::AwaitingAgentDetection);

        if !self.agent.is_available().await {
            return Err(self.fail(
                SigningState::AgentUnavailable,
                KaleError::AgentUnavailable("No signing agent detected".to_string()),
            ));
        }

        match self.agent.active_network().await {
            Ok(Some(actual)) if actual != expected => {
                return Err(self.fail(
                    SigningState::NetworkMismatch,
                    KaleError::NetworkMismatch { expected, actual },
                ));
            }
            Ok(_) => {}
            Err(e) => {
                return Err(self.fail(SigningState::AgentUnavailable, agent_failure(e)));
            }
        }

        self.enter(SigningState::AwaitingUserDecision);

        let request = SignRequest {
            envelope_xdr: self.envelope.to_xdr_base64(),
            network_passphrase: expected.clone(),
            address: Some(self.envelope.source_address().to_string()),
        };

        info!(
            request_id = %self.id,
            source = %self.envelope.source_address(),
            sequence = self.envelope.sequence_number(),
            "Awaiting signature"
        );

        let response = match self.agent.sign_transaction(request).await {
            Ok(response) => response,
            Err(AgentError::Unavailable(msg)) => {
                return Err(self.fail(SigningState::AgentUnavailable, KaleError::AgentUnavailable(msg)));
            }
            Err(AgentError::UserRejected(msg)) | Err(AgentError::Internal(msg)) => {
                return Err(self.fail(SigningState::Rejected, KaleError::Rejected(msg)));
            }
        };

        if response.network_passphrase != expected {
            return Err(self.fail(
                SigningState::NetworkMismatch,
                KaleError::NetworkMismatch {
                    expected,
                    actual: response.network_passphrase,
                },
            ));
        }

        if let Err(e) = general_purpose::STANDARD.decode(&response.signed_envelope_xdr) {
            return Err(self.fail(
                SigningState::Rejected,
                KaleError::Encoding(format!("Agent returned invalid envelope: {}", e)),
            ));
        }

        self.enter(SigningState::Signed);
        info!(request_id = %self.id, signer = %response.signer_address, "Envelope signed");

        Ok(SignedEnvelope {
            envelope_xdr: response.signed_envelope_xdr,
            network_passphrase: response.network_passphrase,
            signer_address: response.signer_address,
            expires_at: self.envelope.expires_at(),
        })
    }
}

fn agent_failure(err: AgentError) -> KaleError {
    match err {
        AgentError::UserRejected(msg) => KaleError::Rejected(msg),
        AgentError::Unavailable(msg) | AgentError::Internal(msg) => {
            KaleError::AgentUnavailable(msg)
        }
    }
}

// ============================================================================
// LOCAL KEY AGENT
// ============================================================================

/// In-process agent that signs immediately with a held key.
///
/// For headless farming and tests. Follows the requested network unless
/// pinned with [`LocalKeyAgent::on_network`].
pub struct LocalKeyAgent {
    signing_key: SigningKey,
    network_passphrase: Option<String>,
}

impl LocalKeyAgent {
    /// From an S... secret seed
    pub fn from_secret_seed(seed: &str) -> Result<Self> {
        let bytes = strkey::decode_secret_seed(seed)?;
        Ok(Self::from_bytes(&bytes))
    }

    /// From raw 32-byte seed
    pub fn from_bytes(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
            network_passphrase: None,
        }
    }

    /// Always sign for `passphrase`, whatever is requested
    pub fn on_network(mut self, passphrase: &str) -> Self {
        self.network_passphrase = Some(passphrase.to_string());
        self
    }

    /// G... address of the held key
    pub fn address(&self) -> String {
        strkey::encode_account(&self.signing_key.verifying_key().to_bytes())
    }

    fn sign_envelope(&self, envelope_b64: &str, passphrase: &str) -> Result<String> {
        let envelope = general_purpose::STANDARD.decode(envelope_b64)?;
        let tx = unwrap_unsigned_envelope(&envelope)?;

        let network_id: [u8; 32] = Sha256::digest(passphrase.as_bytes()).into();
        let hash = transaction_hash(&network_id, tx);
        let signature = self.signing_key.sign(&hash);

        let public_key = self.signing_key.verifying_key().to_bytes();
        let hint = &public_key[28..];

        let mut signed = Vec::with_capacity(tx.len() + 80);
        xdr::write_u32(&mut signed, ENVELOPE_TYPE_TX);
        signed.extend_from_slice(tx);
        xdr::write_u32(&mut signed, 1);
        xdr::write_fixed(&mut signed, hint);
        xdr::write_var(&mut signed, &signature.to_bytes());

        Ok(general_purpose::STANDARD.encode(signed))
    }
}

#[async_trait]
impl SigningAgent for LocalKeyAgent {
    async fn is_available(&self) -> bool {
        true
    }

    async fn active_network(&self) -> std::result::Result<Option<String>, AgentError> {
        Ok(self.network_passphrase.clone())
    }

    async fn public_key(&self) -> std::result::Result<String, AgentError> {
        Ok(self.address())
    }

    async fn sign_transaction(
        &self,
        request: SignRequest,
    ) -> std::result::Result<SignResponse, AgentError> {
        let passphrase = self
            .network_passphrase
            .clone()
            .unwrap_or(request.network_passphrase);

        let signed = self
            .sign_envelope(&request.envelope_xdr, &passphrase)
            .map_err(|e| AgentError::Internal(e.to_string()))?;

        Ok(SignResponse {
            signed_envelope_xdr: signed,
            network_passphrase: passphrase,
            signer_address: self.address(),
        })
    }
}
