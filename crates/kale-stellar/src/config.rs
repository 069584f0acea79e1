// ============================================================================
// KALE-STELLAR - Configuration
// ============================================================================
// Network profiles for Stellar testnet and mainnet, plus client settings
// (fees, expiry window, request timeout).
// ============================================================================

use crate::error::KaleError;
use crate::strkey::{self, StrKeyKind};
use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const TESTNET_HORIZON: &str = "https://horizon-testnet.stellar.org";
pub const MAINNET_HORIZON: &str = "https://horizon.stellar.org";
pub const TESTNET_PASSPHRASE: &str = "Test SDF Network ; September 2015";
pub const MAINNET_PASSPHRASE: &str = "Public Global Stellar Network ; September 2015";

/// Deployed KALE farming contract (testnet)
pub const KALE_CONTRACT_TESTNET: &str = "CAAMNOJE35WNHCQ5ENHGFCT4ANIH6345IQJLARWNLB5OKRBF7ZGQJ7Q7";

/// Mainnet contract is not deployed yet
pub const KALE_CONTRACT_MAINNET: &str = "";

/// Network selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Default for Network {
    fn default() -> Self {
        // Testnet unless only the mainnet feature is enabled
        if cfg!(all(feature = "mainnet", not(feature = "testnet"))) {
            Network::Mainnet
        } else {
            Network::Testnet
        }
    }
}

// ============================================================================
// NETWORK PROFILE
// ============================================================================

/// Immutable network profile shared by every pipeline component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    /// Network (mainnet or testnet)
    pub network: Network,

    /// Horizon API URL
    pub endpoint_url: String,

    /// Network passphrase; its SHA-256 is the network id signed over
    pub network_passphrase: String,

    pub is_test_environment: bool,

    /// Invocable contract (C... address), if provisioned
    #[serde(default)]
    pub contract_address: Option<String>,
}

impl NetworkProfile {
    /// Bare testnet profile (no contract)
    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            endpoint_url: TESTNET_HORIZON.to_string(),
            network_passphrase: TESTNET_PASSPHRASE.to_string(),
            is_test_environment: true,
            contract_address: None,
        }
    }

    /// Bare mainnet profile (no contract)
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            endpoint_url: MAINNET_HORIZON.to_string(),
            network_passphrase: MAINNET_PASSPHRASE.to_string(),
            is_test_environment: false,
            contract_address: None,
        }
    }

    /// Testnet with the KALE contract
    pub fn for_test_environment() -> Self {
        Self::testnet().with_contract_address(KALE_CONTRACT_TESTNET)
    }

    /// Mainnet with the KALE contract.
    ///
    /// Fails with [`KaleError::Configuration`] until the mainnet contract is deployed.
    pub fn for_production_environment() -> Result<Self> {
        Self::production_with(KALE_CONTRACT_MAINNET)
    }

    fn production_with(contract: &str) -> Result<Self> {
        if contract.is_empty() {
            return Err(KaleError::Configuration(
                "Mainnet contract not yet deployed".to_string(),
            ));
        }
        let profile = Self::mainnet().with_contract_address(contract);
        profile.validate()?;
        Ok(profile)
    }

    /// Profile for the given network
    pub fn for_network(network: Network) -> Result<Self> {
        match network {
            Network::Testnet => Ok(Self::for_test_environment()),
            Network::Mainnet => Self::for_production_environment(),
        }
    }

    pub fn with_contract_address(mut self, contract: &str) -> Self {
        self.contract_address = Some(contract.to_string());
        self
    }

    pub fn with_endpoint(mut self, endpoint_url: &str) -> Self {
        self.endpoint_url = endpoint_url.trim_end_matches('/').to_string();
        self
    }

    /// Load from JSON and validate
    pub fn from_json(json: &str) -> Result<Self> {
        let profile: NetworkProfile = serde_json::from_str(json)
            .map_err(|e| KaleError::Configuration(format!("Invalid network profile: {}", e)))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Reject a profile that cannot be used before any network call is made
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.endpoint_url).map_err(|e| {
            KaleError::Configuration(format!("Invalid endpoint '{}': {}", self.endpoint_url, e))
        })?;

        if self.network_passphrase.trim().is_empty() {
            return Err(KaleError::Configuration(
                "Network passphrase is empty".to_string(),
            ));
        }

        if let Some(contract) = &self.contract_address {
            strkey::decode(StrKeyKind::Contract, contract).map_err(|e| {
                KaleError::Configuration(format!("Invalid contract address: {}", e))
            })?;
        }

        Ok(())
    }

    /// Contract address or a configuration error
    pub fn require_contract(&self) -> Result<&str> {
        self.contract_address
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                KaleError::Configuration("No contract address configured".to_string())
            })
    }

    /// SHA-256 of the passphrase
    pub fn network_id(&self) -> [u8; 32] {
        Sha256::digest(self.network_passphrase.as_bytes()).into()
    }

    /// Get friendbot URL (testnet only)
    pub fn friendbot_url(&self) -> Option<&str> {
        match self.network {
            Network::Testnet => Some("https://friendbot.stellar.org"),
            Network::Mainnet => None,
        }
    }

    /// Get Stellar Expert explorer URL for an address
    pub fn explorer_account_url(&self, address: &str) -> String {
        format!("https://stellar.expert/explorer/{}/account/{}", self.explorer_segment(), address)
    }

    /// Get Stellar Expert explorer URL for a transaction
    pub fn explorer_tx_url(&self, hash: &str) -> String {
        format!("https://stellar.expert/explorer/{}/tx/{}", self.explorer_segment(), hash)
    }

    fn explorer_segment(&self) -> &'static str {
        match self.network {
            Network::Mainnet => "public",
            Network::Testnet => "testnet",
        }
    }
}

impl Default for NetworkProfile {
    fn default() -> Self {
        match Network::default() {
            Network::Testnet => Self::for_test_environment(),
            Network::Mainnet => Self::mainnet(),
        }
    }
}

// ============================================================================
// CLIENT SETTINGS
// ============================================================================

/// Tunables for the submission pipeline.
///
/// ```json
/// { "requestTimeoutSecs": 30, "expiryWindowSecs": 30, "baseFee": 100 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettings {
    /// Bound on account reads and submissions.
    ///
    /// Default: `30`
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long an envelope stays submittable.
    ///
    /// Default: `30`
    #[serde(default = "default_expiry_window")]
    pub expiry_window_secs: u64,

    /// Base fee per operation in stroops.
    ///
    /// Default: `100`
    #[serde(default = "default_base_fee")]
    pub base_fee: u32,

    /// Resend the same signed envelope once after a transport failure.
    ///
    /// Default: `false`
    #[serde(default)]
    pub resend_on_unreachable: bool,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_expiry_window() -> u64 {
    30
}

fn default_base_fee() -> u32 {
    crate::units::BASE_FEE_STROOPS
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            expiry_window_secs: default_expiry_window(),
            base_fee: default_base_fee(),
            resend_on_unreachable: false,
        }
    }
}

impl ClientSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: ClientSettings = serde_json::from_str(json)
            .map_err(|e| KaleError::Configuration(format!("Invalid client settings: {}", e)))?;
        if settings.expiry_window_secs == 0 {
            return Err(KaleError::Configuration(
                "expiryWindowSecs must be positive".to_string(),
            ));
        }
        Ok(settings)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}
