// ============================================================================
// KALE-STELLAR - Contract Value Codec
// ============================================================================
// Convert native values to and from Soroban `ScVal` XDR.
//
// Supported ScVal arms:
// - SCV_U32     (3)   u32
// - SCV_U64     (5)   u64
// - SCV_I128    (10)  hi: i64, lo: u64
// - SCV_BYTES   (13)  var opaque (BytesN on the contract side)
// - SCV_ADDRESS (18)  account (G...) or contract (C...)
//
// Callers must pass arguments in the exact order the entry point declares.
// ============================================================================

use crate::error::KaleError;
use crate::strkey::{self, StrKeyKind};
use crate::xdr::{self, XdrReader};
use crate::Result;
use base64::{engine::general_purpose, Engine as _};
use std::fmt;

const SCV_U32: u32 = 3;
const SCV_U64: u32 = 5;
const SCV_I128: u32 = 10;
const SCV_BYTES: u32 = 13;
const SCV_ADDRESS: u32 = 18;

const SC_ADDRESS_TYPE_ACCOUNT: u32 = 0;
const SC_ADDRESS_TYPE_CONTRACT: u32 = 1;
const PUBLIC_KEY_TYPE_ED25519: u32 = 0;

/// Largest fixed-byte argument accepted
pub const MAX_FIXED_BYTES: usize = 256;

// ============================================================================
// TYPED VALUES
// ============================================================================

/// A contract argument with its declared type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypedValue {
    /// G... account or C... contract address
    Address(String),
    I128(i128),
    U64(u64),
    U32(u32),
    FixedBytes(Vec<u8>),
}

impl TypedValue {
    /// Validated account or contract address
    pub fn address(address: &str) -> Result<Self> {
        let kind = StrKeyKind::of(address)
            .filter(|k| *k != StrKeyKind::SecretSeed)
            .ok_or_else(|| KaleError::Encoding(format!("Not an address: {}", address)))?;
        strkey::decode(kind, address)?;
        Ok(TypedValue::Address(address.to_string()))
    }

    /// Signed 128-bit integer from a decimal literal (no float round trip)
    pub fn i128_from_decimal(literal: &str) -> Result<Self> {
        literal
            .trim()
            .parse::<i128>()
            .map(TypedValue::I128)
            .map_err(|e| KaleError::Encoding(format!("Invalid i128 '{}': {}", literal, e)))
    }

    /// Unsigned 64-bit integer from a decimal literal
    pub fn u64_from_decimal(literal: &str) -> Result<Self> {
        literal
            .trim()
            .parse::<u64>()
            .map(TypedValue::U64)
            .map_err(|e| KaleError::Encoding(format!("Invalid u64 '{}': {}", literal, e)))
    }

    /// Fixed-length bytes from hex (optional 0x prefix); length must match exactly
    pub fn fixed_bytes_from_hex(hex_str: &str, expected_len: usize) -> Result<Self> {
        if expected_len > MAX_FIXED_BYTES {
            return Err(KaleError::Encoding(format!(
                "Declared length {} exceeds maximum {}",
                expected_len, MAX_FIXED_BYTES
            )));
        }

        let clean = hex_str
            .strip_prefix("0x")
            .or_else(|| hex_str.strip_prefix("0X"))
            .unwrap_or(hex_str);

        if clean.len() % 2 != 0 {
            return Err(KaleError::Encoding(format!(
                "Odd-length hex string ({} chars)",
                clean.len()
            )));
        }

        let bytes = hex::decode(clean)?;
        if bytes.len() != expected_len {
            return Err(KaleError::Encoding(format!(
                "Expected {} bytes, got {}",
                expected_len,
                bytes.len()
            )));
        }

        Ok(TypedValue::FixedBytes(bytes))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TypedValue::Address(_) => "address",
            TypedValue::I128(_) => "i128",
            TypedValue::U64(_) => "u64",
            TypedValue::U32(_) => "u32",
            TypedValue::FixedBytes(_) => "bytes",
        }
    }
}

impl From<u32> for TypedValue {
    fn from(value: u32) -> Self {
        TypedValue::U32(value)
    }
}

impl From<u64> for TypedValue {
    fn from(value: u64) -> Self {
        TypedValue::U64(value)
    }
}

impl From<i128> for TypedValue {
    fn from(value: i128) -> Self {
        TypedValue::I128(value)
    }
}

// ============================================================================
// WIRE VALUES
// ============================================================================

/// XDR-encoded `ScVal`
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct WireValue(Vec<u8>);

impl WireValue {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        WireValue(bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        Ok(WireValue(general_purpose::STANDARD.decode(encoded)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.0)
    }
}

impl fmt::Debug for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WireValue({})", self.to_base64())
    }
}

// ============================================================================
// ENCODE
// ============================================================================

/// Encode a typed value as ScVal XDR
pub fn encode(value: &TypedValue) -> Result<WireValue> {
    let mut out = Vec::new();
    write_scval(&mut out, value)?;
    Ok(WireValue(out))
}

/// Encode an ordered argument list
pub fn encode_all(values: &[TypedValue]) -> Result<Vec<WireValue>> {
    values.iter().map(encode).collect()
}

/// Check that `value` will encode, without producing any bytes
pub fn validate(value: &TypedValue) -> Result<()> {
    match value {
        TypedValue::Address(address) => match StrKeyKind::of(address) {
            Some(StrKeyKind::Account) => strkey::decode_account(address).map(drop),
            Some(StrKeyKind::Contract) => strkey::decode_contract(address).map(drop),
            _ => Err(KaleError::Encoding(format!("Not an address: {}", address))),
        },
        TypedValue::FixedBytes(bytes) => check_fixed_len(bytes),
        TypedValue::I128(_) | TypedValue::U64(_) | TypedValue::U32(_) => Ok(()),
    }
}

/// Validate an ordered argument list, stopping at the first bad value
pub fn validate_all(values: &[TypedValue]) -> Result<()> {
    values.iter().try_for_each(validate)
}

fn check_fixed_len(bytes: &[u8]) -> Result<()> {
    if bytes.len() > MAX_FIXED_BYTES {
        return Err(KaleError::Encoding(format!(
            "Byte value of {} exceeds maximum {}",
            bytes.len(),
            MAX_FIXED_BYTES
        )));
    }
    Ok(())
}

/// Append ScVal XDR for `value` to an existing buffer
pub(crate) fn write_scval(out: &mut Vec<u8>, value: &TypedValue) -> Result<()> {
    match value {
        TypedValue::Address(address) => {
            xdr::write_u32(out, SCV_ADDRESS);
            write_sc_address(out, address)?;
        }
        TypedValue::I128(v) => {
            xdr::write_u32(out, SCV_I128);
            xdr::write_i64(out, (*v >> 64) as i64);
            xdr::write_u64(out, *v as u64);
        }
        TypedValue::U64(v) => {
            xdr::write_u32(out, SCV_U64);
            xdr::write_u64(out, *v);
        }
        TypedValue::U32(v) => {
            xdr::write_u32(out, SCV_U32);
            xdr::write_u32(out, *v);
        }
        TypedValue::FixedBytes(bytes) => {
            check_fixed_len(bytes)?;
            xdr::write_u32(out, SCV_BYTES);
            xdr::write_var(out, bytes);
        }
    }
    Ok(())
}

/// `ScAddress` for a G... or C... StrKey
pub(crate) fn write_sc_address(out: &mut Vec<u8>, address: &str) -> Result<()> {
    match StrKeyKind::of(address) {
        Some(StrKeyKind::Account) => {
            let key = strkey::decode_account(address)?;
            xdr::write_u32(out, SC_ADDRESS_TYPE_ACCOUNT);
            xdr::write_u32(out, PUBLIC_KEY_TYPE_ED25519);
            xdr::write_fixed(out, &key);
        }
        Some(StrKeyKind::Contract) => {
            let hash = strkey::decode_contract(address)?;
            xdr::write_u32(out, SC_ADDRESS_TYPE_CONTRACT);
            xdr::write_fixed(out, &hash);
        }
        _ => {
            return Err(KaleError::Encoding(format!("Not an address: {}", address)));
        }
    }
    Ok(())
}

// ============================================================================
// DECODE
// ============================================================================

/// Decode ScVal XDR back to a typed value
pub fn decode(wire: &WireValue) -> Result<TypedValue> {
    let mut reader = XdrReader::new(wire.as_bytes());
    let value = read_scval(&mut reader)?;
    reader.finish()?;
    Ok(value)
}

fn read_scval(reader: &mut XdrReader<'_>) -> Result<TypedValue> {
    match reader.read_u32()? {
        SCV_U32 => Ok(TypedValue::U32(reader.read_u32()?)),
        SCV_U64 => Ok(TypedValue::U64(reader.read_u64()?)),
        SCV_I128 => {
            let hi = reader.read_i64()?;
            let lo = reader.read_u64()?;
            Ok(TypedValue::I128(((hi as i128) << 64) | lo as i128))
        }
        SCV_BYTES => Ok(TypedValue::FixedBytes(reader.read_var(MAX_FIXED_BYTES)?)),
        SCV_ADDRESS => match reader.read_u32()? {
            SC_ADDRESS_TYPE_ACCOUNT => {
                let key_type = reader.read_u32()?;
                if key_type != PUBLIC_KEY_TYPE_ED25519 {
                    return Err(KaleError::Encoding(format!(
                        "Unsupported public key type {}",
                        key_type
                    )));
                }
                let key = reader.read_fixed::<32>()?;
                Ok(TypedValue::Address(strkey::encode_account(&key)))
            }
            SC_ADDRESS_TYPE_CONTRACT => {
                let hash = reader.read_fixed::<32>()?;
                Ok(TypedValue::Address(strkey::encode(StrKeyKind::Contract, &hash)))
            }
            other => Err(KaleError::Encoding(format!("Unknown address type {}", other))),
        },
        other => Err(KaleError::Encoding(format!("Unsupported ScVal type {}", other))),
    }
}

fn mismatch(expected: &str, found: &TypedValue) -> KaleError {
    KaleError::Encoding(format!(
        "Expected {}, found {}",
        expected,
        found.type_name()
    ))
}

pub fn decode_address(wire: &WireValue) -> Result<String> {
    match decode(wire)? {
        TypedValue::Address(address) => Ok(address),
        other => Err(mismatch("address", &other)),
    }
}

pub fn decode_i128(wire: &WireValue) -> Result<i128> {
    match decode(wire)? {
        TypedValue::I128(v) => Ok(v),
        other => Err(mismatch("i128", &other)),
    }
}

pub fn decode_u64(wire: &WireValue) -> Result<u64> {
    match decode(wire)? {
        TypedValue::U64(v) => Ok(v),
        other => Err(mismatch("u64", &other)),
    }
}

pub fn decode_u32(wire: &WireValue) -> Result<u32> {
    match decode(wire)? {
        TypedValue::U32(v) => Ok(v),
        other => Err(mismatch("u32", &other)),
    }
}

/// Decode bytes and require the declared length
pub fn decode_fixed_bytes(wire: &WireValue, expected_len: usize) -> Result<Vec<u8>> {
    match decode(wire)? {
        TypedValue::FixedBytes(bytes) if bytes.len() == expected_len => Ok(bytes),
        TypedValue::FixedBytes(bytes) => Err(KaleError::Encoding(format!(
            "Expected {} bytes, got {}",
            expected_len,
            bytes.len()
        ))),
        other => Err(mismatch("bytes", &other)),
    }
}
