//! Fixed-point decimal rescaling.
//!
//! Token amounts travel as integers in their native precision (e.g. 6 for
//! USDC) while the clearing engine accounts everything in
//! [`CLEARING_ENGINE_DECIMALS`]. Converting between the two is lossless when
//! scaling up and follows an explicit [`Rounding`] policy when scaling down.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Decimal precision of clearing engine inventory amounts.
pub const CLEARING_ENGINE_DECIMALS: u8 = 18;

/// Rounding policy applied when precision is lost.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Rounding {
    /// Floor division.
    #[default]
    #[display("down")]
    Down,
    /// Ceiling division.
    #[display("up")]
    Up,
}

impl FromStr for Rounding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "down" => Ok(Rounding::Down),
            "up" => Ok(Rounding::Up),
            _ => Err(Error::invalid(format!("unknown rounding {s:?}"))),
        }
    }
}

/// Converts `amount` from `from_decimals` to `to_decimals`.
///
/// Scaling up multiplies and fails with [`Error::Overflow`] if the result does
/// not fit in 128 bits. Scaling down divides with floor or ceiling rounding.
pub fn rescale(amount: u128, from_decimals: u8, to_decimals: u8, rounding: Rounding) -> Result<u128> {
    use std::cmp::Ordering;

    match to_decimals.cmp(&from_decimals) {
        Ordering::Equal => Ok(amount),
        Ordering::Greater => {
            let exp = u32::from(to_decimals - from_decimals);
            10u128
                .checked_pow(exp)
                .and_then(|factor| amount.checked_mul(factor))
                .ok_or_else(|| {
                    Error::Overflow(format!(
                        "{amount} scaled from {from_decimals} to {to_decimals} decimals"
                    ))
                })
        }
        Ordering::Less => {
            let exp = u32::from(from_decimals - to_decimals);
            let Some(divisor) = 10u128.checked_pow(exp) else {
                // divisor exceeds any u128 amount
                return Ok(match rounding {
                    Rounding::Down => 0,
                    Rounding::Up => u128::from(amount > 0),
                });
            };
            let floor = amount / divisor;
            Ok(match rounding {
                Rounding::Down => floor,
                Rounding::Up => floor + u128::from(amount % divisor != 0),
            })
        }
    }
}

/// Converts a native amount into clearing engine inventory precision.
pub fn to_inventory(amount: u128, decimals: u8, rounding: Rounding) -> Result<u128> {
    rescale(amount, decimals, CLEARING_ENGINE_DECIMALS, rounding)
}

/// Converts an inventory amount back into native precision.
pub fn from_inventory(amount: u128, decimals: u8, rounding: Rounding) -> Result<u128> {
    rescale(amount, CLEARING_ENGINE_DECIMALS, decimals, rounding)
}

/// An amount expressed both in inventory precision and in atomic units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AmountPair {
    /// Amount normalized to [`CLEARING_ENGINE_DECIMALS`].
    pub normalized: u128,
    /// Amount in the token's native precision.
    pub atomic: u128,
}

impl AmountPair {
    /// Builds the pair from an atomic amount.
    pub fn from_atomic(atomic: u128, decimals: u8) -> Result<Self> {
        Ok(Self {
            normalized: to_inventory(atomic, decimals, Rounding::Down)?,
            atomic,
        })
    }

    /// Builds the pair from an inventory amount.
    pub fn from_normalized(normalized: u128, decimals: u8, rounding: Rounding) -> Result<Self> {
        Ok(Self {
            normalized,
            atomic: from_inventory(normalized, decimals, rounding)?,
        })
    }
}

/// Renders an integer amount as a human decimal, e.g. `1_500_000 @ 6 = 1.5`.
pub fn to_decimal(amount: u128, decimals: u8) -> Result<Decimal> {
    let overflow = || Error::Overflow(format!("{amount} at {decimals} decimals"));
    let mantissa = i128::try_from(amount).map_err(|_| overflow())?;
    Decimal::try_from_i128_with_scale(mantissa, u32::from(decimals))
        .map(|d| d.normalize())
        .map_err(|_| overflow())
}

/// Converts a human decimal into an integer amount with `decimals` places.
pub fn from_decimal(value: Decimal, decimals: u8, rounding: Rounding) -> Result<u128> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(Error::Overflow(format!("negative amount {value}")));
    }

    let mantissa = value.mantissa().unsigned_abs();
    let scale = u8::try_from(value.scale()).map_err(|_| Error::Overflow(value.to_string()))?;
    rescale(mantissa, scale, decimals, rounding)
}
