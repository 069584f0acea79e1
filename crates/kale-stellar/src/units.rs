//! KALE / XLM amount units.
//!
//! Requests carry integral stroop counts; display strings are converted
//! exactly, never through `f64`.

use crate::error::KaleError;
use crate::Result;

/// Minor units per display unit (7 decimal places)
pub const STROOPS_PER_UNIT: i64 = 10_000_000;

/// Decimal places of a display amount
pub const DECIMALS: usize = 7;

/// Default base fee per operation
pub const BASE_FEE_STROOPS: u32 = 100;

/// Seconds between KALE farming blocks
pub const BLOCK_INTERVAL_SECS: u64 = 300;

/// Reward per block: 2505 KALE
pub const BLOCK_REWARD_STROOPS: i64 = 2505 * STROOPS_PER_UNIT;

/// 24 * 60 / 5 * 30
pub const BLOCKS_PER_MONTH: u64 = 8640;

/// Parse a display amount ("10", "0.5", "2505.0000001") into stroops
pub fn to_stroops(amount: &str) -> Result<i64> {
    let amount = amount.trim();
    let invalid = || KaleError::Encoding(format!("Invalid amount: '{}'", amount));

    let (negative, digits) = match amount.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, amount),
    };

    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };

    if (whole.is_empty() && frac.is_empty())
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !frac.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }

    if frac.len() > DECIMALS {
        return Err(KaleError::Encoding(format!(
            "Amount '{}' has more than {} decimal places",
            amount, DECIMALS
        )));
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
    let frac: i64 = if frac.is_empty() {
        0
    } else {
        format!("{:0<width$}", frac, width = DECIMALS)
            .parse()
            .map_err(|_| invalid())?
    };

    let stroops = whole
        .checked_mul(STROOPS_PER_UNIT)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| KaleError::Encoding(format!("Amount '{}' overflows", amount)))?;

    Ok(if negative { -stroops } else { stroops })
}

/// Render stroops as a display amount with 7 decimals
pub fn format_stroops(stroops: i64) -> String {
    let sign = if stroops < 0 { "-" } else { "" };
    let abs = stroops.unsigned_abs();
    let per = STROOPS_PER_UNIT as u64;
    format!("{}{}.{:07}", sign, abs / per, abs % per)
}
