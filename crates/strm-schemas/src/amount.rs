//! Fixed-point ledger amount.
//!
//! # Scale
//!
//! The ledger's native precision is 7 decimal places: one whole unit of any
//! streamed asset is `10_000_000` base units. Every amount in this workspace
//! (committed totals, released amounts, claims) is an [`Amount`] at that
//! scale, stored as `i128` to match the contract's integer width.
//!
//! There is intentionally no `From<i128>` impl. Callers must be deliberate
//! about when a raw integer is a count of base units ([`Amount::from_base`])
//! versus whole units ([`Amount::from_units`]).
//!
//! # Wire form
//!
//! Amounts serialize as exact decimal strings (`"75"`, `"0.5"`,
//! `"12.0000001"`). Deserialization accepts the same strings and also bare
//! JSON integers, which are read as whole units.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Decimal places carried by the ledger.
pub const AMOUNT_DECIMALS: u32 = 7;

/// Base units per whole unit (`10^AMOUNT_DECIMALS`).
pub const AMOUNT_SCALE: i128 = 10_000_000;

// ---------------------------------------------------------------------------
// Amount newtype
// ---------------------------------------------------------------------------

/// An asset amount at the ledger's native 1e-7 precision.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Construct from a count of base units (1e-7).
    pub const fn from_base(base: i128) -> Self {
        Amount(base)
    }

    /// Construct from whole units. Returns `None` on overflow.
    pub fn from_units(units: i64) -> Option<Self> {
        (units as i128).checked_mul(AMOUNT_SCALE).map(Amount)
    }

    /// Raw base-unit count, for crossing the ledger wire boundary.
    pub const fn base(self) -> i128 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// `self - rhs`, floored at zero.
    pub fn saturating_sub_floor_zero(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0).max(0))
    }

    /// Clamp into `[lo, hi]`. An empty range (`hi < lo`) yields `lo`.
    pub fn clamp_to(self, lo: Amount, hi: Amount) -> Amount {
        Amount(self.0.min(hi.0).max(lo.0))
    }

    /// `floor(self * num / den)` in base units.
    ///
    /// Exact integer arithmetic: the only rounding is the final floor to the
    /// native precision. Returns `None` when `den == 0` or the intermediate
    /// product overflows `i128`.
    pub fn mul_div_floor(self, num: u64, den: u64) -> Option<Amount> {
        if den == 0 {
            return None;
        }
        let product = self.0.checked_mul(num as i128)?;
        Some(Amount(product.div_euclid(den as i128)))
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

// ---------------------------------------------------------------------------
// Decimal string form
// ---------------------------------------------------------------------------

/// Why a decimal string could not be read as an [`Amount`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountParseError {
    Empty,
    InvalidDigit { raw: String },
    /// More than [`AMOUNT_DECIMALS`] fractional digits.
    TooPrecise { raw: String },
    Overflow { raw: String },
}

impl fmt::Display for AmountParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "amount is empty"),
            Self::InvalidDigit { raw } => write!(f, "amount '{raw}' is not a decimal number"),
            Self::TooPrecise { raw } => write!(
                f,
                "amount '{raw}' has more than {AMOUNT_DECIMALS} fractional digits"
            ),
            Self::Overflow { raw } => write!(f, "amount '{raw}' is out of range"),
        }
    }
}

impl std::error::Error for AmountParseError {}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(AmountParseError::Empty);
        }
        let (negative, digits) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.strip_prefix('+').unwrap_or(raw)),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(AmountParseError::InvalidDigit {
                raw: raw.to_string(),
            });
        }
        let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(AmountParseError::InvalidDigit {
                raw: raw.to_string(),
            });
        }
        if frac_part.len() > AMOUNT_DECIMALS as usize {
            return Err(AmountParseError::TooPrecise {
                raw: raw.to_string(),
            });
        }

        let overflow = || AmountParseError::Overflow {
            raw: raw.to_string(),
        };

        let mut base: i128 = 0;
        for b in int_part.bytes() {
            base = base
                .checked_mul(10)
                .and_then(|v| v.checked_add((b - b'0') as i128))
                .ok_or_else(overflow)?;
        }
        base = base.checked_mul(AMOUNT_SCALE).ok_or_else(overflow)?;

        let mut frac: i128 = 0;
        for b in frac_part.bytes() {
            frac = frac * 10 + (b - b'0') as i128;
        }
        for _ in frac_part.len()..AMOUNT_DECIMALS as usize {
            frac *= 10;
        }
        base = base.checked_add(frac).ok_or_else(overflow)?;

        Ok(Amount(if negative { -base } else { base }))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = AMOUNT_SCALE as u128;
        let whole = abs / scale;
        let frac = abs % scale;
        if frac == 0 {
            return write!(f, "{sign}{whole}");
        }
        let padded = format!("{:0width$}", frac, width = AMOUNT_DECIMALS as usize);
        write!(f, "{sign}{whole}.{}", padded.trim_end_matches('0'))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal amount string or an integer number of whole units")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        Amount::from_units(v).ok_or_else(|| E::custom("amount out of range"))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        let units = i64::try_from(v).map_err(|_| E::custom("amount out of range"))?;
        self.visit_i64(units)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}
