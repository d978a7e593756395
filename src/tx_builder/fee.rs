//! Coin amounts, gas prices and fee derivation
//!
//! Gas prices are decimal amounts (`0.025uatom`). They are held as fixed-point
//! integers with 18 fractional digits so that `ceil(price × gas)` is exact.

use super::errors::{PipelineResult, TxError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fractional digits carried by [`DecCoin`] amounts
pub const DEC_PRECISION: u32 = 18;

const DEC_ONE: u128 = 10u128.pow(DEC_PRECISION);

static COIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]+(?:\.[0-9]+)?)\s*([a-zA-Z][a-zA-Z0-9/:._-]{1,127})$")
        .expect("coin pattern is valid")
});

fn split_coin(s: &str) -> PipelineResult<(&str, &str)> {
    let caps = COIN_RE
        .captures(s.trim())
        .ok_or_else(|| TxError::config(format!("invalid coin expression: {:?}", s)))?;
    match (caps.get(1), caps.get(2)) {
        (Some(amount), Some(denom)) => Ok((amount.as_str(), denom.as_str())),
        _ => Err(TxError::config(format!("invalid coin expression: {:?}", s))),
    }
}

/// An integer amount of a single denomination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: u128,
}

impl Coin {
    pub fn new(amount: u128, denom: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

impl FromStr for Coin {
    type Err = TxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (amount, denom) = split_coin(s)?;
        let amount = amount.parse::<u128>().map_err(|_| {
            TxError::config(format!("coin amount must be an integer: {:?}", s))
        })?;
        Ok(Coin::new(amount, denom))
    }
}

/// A set of coins, sorted by denomination with no duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coins(Vec<Coin>);

impl Coins {
    /// Build from individual coins; rejects duplicate denominations
    pub fn new(mut coins: Vec<Coin>) -> PipelineResult<Self> {
        coins.sort_by(|a, b| a.denom.cmp(&b.denom));
        if let Some(pair) = coins.windows(2).find(|w| w[0].denom == w[1].denom) {
            return Err(TxError::config(format!(
                "duplicate denomination in coins: {}",
                pair[0].denom
            )));
        }
        Ok(Self(coins))
    }

    /// Parse a comma separated list such as `10uatom,5stake`
    ///
    /// An empty string yields an empty set.
    pub fn parse(s: &str) -> PipelineResult<Self> {
        let coins = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Coin::from_str)
            .collect::<PipelineResult<Vec<_>>>()?;
        Self::new(coins)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when there are no coins or every amount is zero
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|c| c.amount == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coin> {
        self.0.iter()
    }

    pub fn amount_of(&self, denom: &str) -> u128 {
        self.0
            .iter()
            .find(|c| c.denom == denom)
            .map(|c| c.amount)
            .unwrap_or(0)
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(Coin::to_string).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// A decimal amount of a single denomination, used for gas prices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecCoin {
    pub denom: String,
    /// Amount scaled by 10^18
    pub scaled_amount: u128,
}

impl DecCoin {
    /// Parse the decimal part of a coin expression into its scaled form
    fn parse_decimal(amount: &str) -> PipelineResult<u128> {
        let (whole, frac) = match amount.split_once('.') {
            Some((w, f)) => (w, f),
            None => (amount, ""),
        };
        if frac.len() > DEC_PRECISION as usize {
            return Err(TxError::config(format!(
                "decimal amount {} has more than {} fractional digits",
                amount, DEC_PRECISION
            )));
        }
        let overflow = || TxError::config(format!("decimal amount {} is too large", amount));
        let whole: u128 = whole.parse().map_err(|_| overflow())?;
        let frac_scaled: u128 = if frac.is_empty() {
            0
        } else {
            let digits: u128 = frac.parse().map_err(|_| overflow())?;
            digits * 10u128.pow(DEC_PRECISION - frac.len() as u32)
        };
        whole
            .checked_mul(DEC_ONE)
            .and_then(|w| w.checked_add(frac_scaled))
            .ok_or_else(overflow)
    }

    /// `ceil(self × gas)` as an integer coin
    pub fn fee_for_gas(&self, gas: u64) -> PipelineResult<Coin> {
        let product = self.scaled_amount.checked_mul(gas as u128).ok_or_else(|| {
            TxError::config(format!("fee overflow for gas price {} × gas {}", self, gas))
        })?;
        let amount = product / DEC_ONE + u128::from(product % DEC_ONE != 0);
        Ok(Coin::new(amount, self.denom.clone()))
    }
}

impl fmt::Display for DecCoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.scaled_amount / DEC_ONE;
        let frac = self.scaled_amount % DEC_ONE;
        if frac == 0 {
            write!(f, "{}{}", whole, self.denom)
        } else {
            let frac = format!("{:018}", frac);
            write!(f, "{}.{}{}", whole, frac.trim_end_matches('0'), self.denom)
        }
    }
}

impl FromStr for DecCoin {
    type Err = TxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (amount, denom) = split_coin(s)?;
        Ok(DecCoin {
            denom: denom.to_string(),
            scaled_amount: Self::parse_decimal(amount)?,
        })
    }
}

/// A set of gas prices, sorted by denomination
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecCoins(Vec<DecCoin>);

impl DecCoins {
    pub fn parse(s: &str) -> PipelineResult<Self> {
        let mut coins = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(DecCoin::from_str)
            .collect::<PipelineResult<Vec<_>>>()?;
        coins.sort_by(|a, b| a.denom.cmp(&b.denom));
        if let Some(pair) = coins.windows(2).find(|w| w[0].denom == w[1].denom) {
            return Err(TxError::config(format!(
                "duplicate denomination in gas prices: {}",
                pair[0].denom
            )));
        }
        Ok(Self(coins))
    }

    /// True when there are no prices or every price is zero
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|c| c.scaled_amount == 0)
    }

    /// Derive the fee `ceil(price × gas)` for every denomination
    pub fn fees_for_gas(&self, gas: u64) -> PipelineResult<Coins> {
        let coins = self
            .0
            .iter()
            .map(|price| price.fee_for_gas(gas))
            .collect::<PipelineResult<Vec<_>>>()?;
        Coins::new(coins)
    }
}

impl fmt::Display for DecCoins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(DecCoin::to_string).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Resolve the fee to put on a transaction
///
/// Explicit fees and non-zero gas prices are mutually exclusive. With only gas
/// prices set, the fee is derived per denomination and rounded up.
pub fn resolve_fee(fees: &Coins, gas_prices: &DecCoins, gas: u64) -> PipelineResult<Coins> {
    match (fees.is_zero(), gas_prices.is_zero()) {
        (false, false) => Err(TxError::ConflictingFeeSpec {
            fees: fees.to_string(),
            gas_prices: gas_prices.to_string(),
        }),
        (true, false) => gas_prices.fees_for_gas(gas),
        _ => Ok(fees.clone()),
    }
}

/// Apply a gas adjustment factor to an estimated gas amount, rounding up
pub fn adjust_gas(estimate: u64, adjustment: f64) -> u64 {
    if adjustment <= 0.0 || !adjustment.is_finite() {
        return estimate;
    }
    (estimate as f64 * adjustment).ceil() as u64
}
