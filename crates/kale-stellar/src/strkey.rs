// ============================================================================
// KALE-STELLAR - StrKey Encoding/Decoding
// ============================================================================
// Stellar "StrKey": version byte + 32-byte payload + CRC16 (little-endian),
// base32 encoded without padding.
//
//   G... account id      (ed25519 public key)
//   C... contract id     (contract hash)
//   S... secret seed     (ed25519 seed)
// ============================================================================

use crate::error::KaleError;
use crate::Result;

/// CRC16-CCITT polynomial
const CRC16_POLY: u16 = 0x1021;

/// Decoded length: version + payload + checksum
const DECODED_LEN: usize = 35;

/// Encoded length in base32 characters
pub const ENCODED_LEN: usize = 56;

/// StrKey flavours used by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrKeyKind {
    Account,
    Contract,
    SecretSeed,
}

impl StrKeyKind {
    fn version_byte(self) -> u8 {
        match self {
            StrKeyKind::Account => 6 << 3,     // 'G'
            StrKeyKind::Contract => 2 << 3,    // 'C'
            StrKeyKind::SecretSeed => 18 << 3, // 'S'
        }
    }

    fn prefix(self) -> char {
        match self {
            StrKeyKind::Account => 'G',
            StrKeyKind::Contract => 'C',
            StrKeyKind::SecretSeed => 'S',
        }
    }

    /// Guess the kind from the leading character
    pub fn of(encoded: &str) -> Option<Self> {
        match encoded.chars().next()? {
            'G' => Some(StrKeyKind::Account),
            'C' => Some(StrKeyKind::Contract),
            'S' => Some(StrKeyKind::SecretSeed),
            _ => None,
        }
    }
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Encode a 32-byte payload as a StrKey of the given kind
pub fn encode(kind: StrKeyKind, payload: &[u8; 32]) -> String {
    let mut data = Vec::with_capacity(DECODED_LEN);
    data.push(kind.version_byte());
    data.extend_from_slice(payload);

    let checksum = crc16(&data);
    data.push((checksum & 0xFF) as u8);
    data.push((checksum >> 8) as u8);

    base32_encode(&data)
}

/// Decode a StrKey, checking prefix, length, version byte and checksum
pub fn decode(kind: StrKeyKind, encoded: &str) -> Result<[u8; 32]> {
    if !encoded.starts_with(kind.prefix()) {
        return Err(KaleError::Encoding(format!(
            "Must start with '{}'",
            kind.prefix()
        )));
    }

    if encoded.len() != ENCODED_LEN {
        return Err(KaleError::Encoding(format!(
            "Expected {} chars, got {}",
            ENCODED_LEN,
            encoded.len()
        )));
    }

    let decoded = base32_decode(encoded)?;
    if decoded.len() != DECODED_LEN {
        return Err(KaleError::Encoding("Invalid decoded length".to_string()));
    }

    if decoded[0] != kind.version_byte() {
        return Err(KaleError::Encoding("Invalid version byte".to_string()));
    }

    let stored = (decoded[33] as u16) | ((decoded[34] as u16) << 8);
    if stored != crc16(&decoded[..33]) {
        return Err(KaleError::Encoding("Checksum mismatch".to_string()));
    }

    let mut payload = [0u8; 32];
    payload.copy_from_slice(&decoded[1..33]);
    Ok(payload)
}

/// Encode raw Ed25519 public key bytes as a G... address
pub fn encode_account(key: &[u8; 32]) -> String {
    encode(StrKeyKind::Account, key)
}

/// Decode a G... address to raw Ed25519 public key bytes
pub fn decode_account(address: &str) -> Result<[u8; 32]> {
    decode(StrKeyKind::Account, address)
}

/// Decode a C... contract id to its 32-byte hash
pub fn decode_contract(address: &str) -> Result<[u8; 32]> {
    decode(StrKeyKind::Contract, address)
}

/// Decode an S... secret seed
pub fn decode_secret_seed(seed: &str) -> Result<[u8; 32]> {
    decode(StrKeyKind::SecretSeed, seed)
        .map_err(|_| KaleError::Configuration("Invalid secret seed".to_string()))
}

// ============================================================================
// BASE32 (RFC 4648 alphabet, no padding)
// ============================================================================

const BASE32_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

fn base32_encode(data: &[u8]) -> String {
    let mut result = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for &byte in data {
        buffer = (buffer << 8) | (byte as u64);
        bits_in_buffer += 8;

        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = ((buffer >> bits_in_buffer) & 0x1F) as usize;
            result.push(BASE32_ALPHABET[index] as char);
        }
    }

    if bits_in_buffer > 0 {
        let index = ((buffer << (5 - bits_in_buffer)) & 0x1F) as usize;
        result.push(BASE32_ALPHABET[index] as char);
    }

    result
}

fn base32_decode(encoded: &str) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(encoded.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for c in encoded.chars() {
        let value = match c {
            'A'..='Z' => (c as u8) - b'A',
            '2'..='7' => (c as u8) - b'2' + 26,
            _ => {
                return Err(KaleError::Encoding(format!(
                    "Invalid base32 character: {}",
                    c
                )))
            }
        };

        buffer = (buffer << 5) | (value as u64);
        bits_in_buffer += 5;

        if bits_in_buffer >= 8 {
            bits_in_buffer -= 8;
            result.push(((buffer >> bits_in_buffer) & 0xFF) as u8);
        }
    }

    Ok(result)
}

// ============================================================================
// CRC16-CCITT (XModem variant used by Stellar)
// ============================================================================

fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;

    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}
