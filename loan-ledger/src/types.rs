//! Core types for the loan ledger
//!
//! All types are designed for:
//! - Exact arithmetic (integer base units for money, truncating division)
//! - Memory safety (no unsafe code)
//! - Read-only snapshots handed out to callers

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Party identity (borrower, lender or any other caller)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyId(String);

impl PartyId {
    /// Create new party ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequential loan identifier, starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(u64);

impl LoanId {
    /// First id handed out by a fresh ledger
    pub const FIRST: LoanId = LoanId(1);

    /// Wrap a raw id
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw numeric value
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Id following this one
    pub fn next(&self) -> Option<LoanId> {
        self.0.checked_add(1).map(LoanId)
    }
}

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unsigned fixed-point value held as an integer count of base units.
///
/// One whole unit is `10^18` base units. Arithmetic never leaves the integer
/// domain, so division truncates exactly like the value layer it models.
///
/// # Example
///
/// ```
/// use loan_ledger::types::Amount;
///
/// let amount: Amount = "0.5".parse().unwrap();
/// assert_eq!(amount.base_units(), 500_000_000_000_000_000);
/// assert_eq!(amount.to_string(), "0.5");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Amount(u128);

impl Amount {
    /// Zero amount
    pub const ZERO: Amount = Amount(0);

    /// Fractional decimal digits of one whole unit
    pub const DECIMALS: u32 = 18;

    /// Base units in one whole unit
    pub const ONE: Amount = Amount(1_000_000_000_000_000_000);

    /// Create from raw base units
    pub const fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    /// Raw base units
    pub const fn base_units(&self) -> u128 {
        self.0
    }

    /// Check if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Convert from an exact decimal.
    ///
    /// Rejects negative values and values finer than one base unit.
    pub fn from_decimal(value: Decimal) -> crate::Result<Self> {
        let value = value.normalize();
        if value.scale() > Self::DECIMALS {
            return Err(crate::Error::InvalidAmount(format!(
                "{} has more than {} fractional digits",
                value,
                Self::DECIMALS
            )));
        }

        let mantissa = u128::try_from(value.mantissa())
            .map_err(|_| crate::Error::InvalidAmount(format!("{} is negative", value)))?;

        10u128
            .checked_pow(Self::DECIMALS - value.scale())
            .and_then(|factor| mantissa.checked_mul(factor))
            .map(Amount)
            .ok_or_else(|| crate::Error::Overflow(format!("{} does not fit in base units", value)))
    }

    /// Convert to an exact decimal, `None` if beyond decimal precision
    pub fn to_decimal(&self) -> Option<Decimal> {
        let units = i128::try_from(self.0).ok()?;
        Decimal::try_from_i128_with_scale(units, Self::DECIMALS)
            .ok()
            .map(|d| d.normalize())
    }

    /// Checked addition
    pub fn checked_add(&self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction
    pub fn checked_sub(&self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Subtraction clamped at zero
    pub fn saturating_sub(&self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// Checked multiplication by an integer factor
    pub fn checked_mul(&self, factor: u128) -> Option<Amount> {
        self.0.checked_mul(factor).map(Amount)
    }

    /// Truncating division by a non-zero integer divisor
    pub fn checked_div(&self, divisor: u128) -> Option<Amount> {
        self.0.checked_div(divisor).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_decimal() {
            Some(d) => write!(f, "{}", d),
            None => write!(f, "{} base units", self.0),
        }
    }
}

// Serialized as a base-unit digit string; JSON numbers cannot carry u128
impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.0.to_string()
    }
}

impl TryFrom<String> for Amount {
    type Error = std::num::ParseIntError;

    fn try_from(units: String) -> Result<Self, Self::Error> {
        units.parse().map(Amount)
    }
}

impl FromStr for Amount {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| crate::Error::InvalidAmount(format!("{}: {}", s, e)))?;
        Amount::from_decimal(value)
    }
}

/// Loan record
///
/// The ledger hands out clones; mutating a clone never affects the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    /// Loan id
    pub id: LoanId,

    /// Borrower, immutable after creation
    pub borrower: PartyId,

    /// Lender, set exactly once when funded
    pub lender: Option<PartyId>,

    /// Collateral held in escrow
    pub collateral_amount: Amount,

    /// Half the collateral, floor division
    pub loan_amount: Amount,

    /// Interest rate in percent
    pub interest_rate: u32,

    /// Loan duration in seconds
    pub duration_secs: u64,

    /// Funding time, origin of the deadline
    pub start_time: Option<DateTime<Utc>>,

    /// Running total of borrower payments
    pub amount_repaid: Amount,

    /// Lender supplied the loan amount
    pub funded: bool,

    /// Repayment obligation satisfied (terminal)
    pub repaid: bool,

    /// Collateral forfeited to the lender (terminal)
    pub claimed: bool,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Loan {
    /// Current lifecycle status
    pub fn status(&self) -> LoanStatus {
        if self.claimed {
            LoanStatus::Claimed
        } else if self.repaid {
            LoanStatus::Repaid
        } else if self.funded {
            LoanStatus::Funded
        } else {
            LoanStatus::Requested
        }
    }

    /// Check if loan is in terminal state
    pub fn is_resolved(&self) -> bool {
        self.repaid || self.claimed
    }

    /// `start_time + duration`, `None` while unfunded or if out of range
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        let start = self.start_time?;
        let secs = i64::try_from(self.duration_secs).ok()?;
        start.checked_add_signed(TimeDelta::try_seconds(secs)?)
    }
}

/// Loan lifecycle status (derived from the loan flags)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LoanStatus {
    /// Collateral escrowed, waiting for a lender
    Requested = 1,
    /// Lender supplied the loan amount
    Funded = 2,
    /// Fully repaid (terminal)
    Repaid = 3,
    /// Collateral claimed by the lender (terminal)
    Claimed = 4,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoanStatus::Requested => "requested",
            LoanStatus::Funded => "funded",
            LoanStatus::Repaid => "repaid",
            LoanStatus::Claimed => "claimed",
        };
        f.write_str(s)
    }
}
