//! `Amount`: a checked-arithmetic nanocoin count (spec.md §3). Bitcoin-scale
//! values never approach `i64::MAX`, so "arbitrary precision, overflow must
//! not silently wrap" is satisfied by erroring on overflow rather than
//! reaching for a bignum type.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::error::WalletError;

/// Nanocoin units; 1e8 per coin, matching the reference network's `COIN`
/// constant.
pub const NANOCOINS_PER_COIN: i64 = 100_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Amount(pub i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn checked_add(self, other: Amount) -> Result<Amount, WalletError> {
        self.0.checked_add(other.0).map(Amount).ok_or(WalletError::AmountOverflow)
    }

    pub fn checked_sub(self, other: Amount) -> Result<Amount, WalletError> {
        self.0.checked_sub(other.0).map(Amount).ok_or(WalletError::AmountOverflow)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Renders as a coin-denominated decimal with two fractional digits,
    /// e.g. `100_000_000` -> `"1.00"`, `-50_000_000` -> `"-0.50"` (spec.md
    /// §8 fixture 2).
    pub fn friendly(self) -> String {
        let negative = self.0 < 0;
        let magnitude = self.0.unsigned_abs();
        let whole = magnitude / NANOCOINS_PER_COIN as u64;
        let fraction = (magnitude % NANOCOINS_PER_COIN as u64) / 1_000_000;
        format!("{}{}.{:02}", if negative { "-" } else { "" }, whole, fraction)
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Amount;
    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.friendly())
    }
}
