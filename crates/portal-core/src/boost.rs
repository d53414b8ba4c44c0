//! Token-balance boost calculator.
//!
//! A holder qualifies for a boost per token: Token-A and Token-B are
//! threshold-gated (balance at or above a configured minimum), Token-C is
//! presence-gated (any non-zero balance). Only the single best qualifying
//! coefficient applies; boosts never stack. All balance comparisons are done on
//! exact 256-bit integers.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::PortalError;

/// 0.15 Token-A at 18 decimals.
pub const DEFAULT_THRESHOLD_A: u128 = 150_000_000_000_000_000;
/// 1000 Token-B at 18 decimals.
pub const DEFAULT_THRESHOLD_B: u128 = 1_000_000_000_000_000_000_000;
pub const DEFAULT_COEFFICIENT_A: f64 = 1.2;
pub const DEFAULT_COEFFICIENT_B: f64 = 1.5;
pub const DEFAULT_COEFFICIENT_C: f64 = 1.1;
pub const DEFAULT_MAX_COEFFICIENT: f64 = 2.0;

/// Coefficient reported when no token qualifies.
pub const NO_BOOST: f64 = 1.0;

/// Immutable calculator parameters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BoostConfig {
    #[serde(with = "decimal")]
    pub threshold_a: U256,
    #[serde(with = "decimal")]
    pub threshold_b: U256,
    pub coefficient_a: f64,
    pub coefficient_b: f64,
    pub coefficient_c: f64,
    pub max_coefficient: f64,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            threshold_a: U256::from(DEFAULT_THRESHOLD_A),
            threshold_b: U256::from(DEFAULT_THRESHOLD_B),
            coefficient_a: DEFAULT_COEFFICIENT_A,
            coefficient_b: DEFAULT_COEFFICIENT_B,
            coefficient_c: DEFAULT_COEFFICIENT_C,
            max_coefficient: DEFAULT_MAX_COEFFICIENT,
        }
    }
}

impl BoostConfig {
    /// Reject parameter sets under which a boosted holder could be reported
    /// with the identity coefficient, or an empty wallet could be boosted.
    pub fn validate(&self) -> Result<(), PortalError> {
        if self.threshold_a.is_zero() || self.threshold_b.is_zero() {
            return Err(PortalError::InvalidBoostConfig("thresholds must be positive"));
        }
        let coefficients = [
            self.coefficient_a,
            self.coefficient_b,
            self.coefficient_c,
            self.max_coefficient,
        ];
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(PortalError::InvalidBoostConfig("coefficients must be finite"));
        }
        // A boosted holder must never be clamped back to the identity.
        if coefficients.iter().any(|c| *c <= NO_BOOST) {
            return Err(PortalError::InvalidBoostConfig("coefficients must exceed 1.0"));
        }
        Ok(())
    }
}

/// Raw balances in each token's smallest unit.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenBalances {
    #[serde(with = "decimal")]
    pub token_a: U256,
    #[serde(with = "decimal")]
    pub token_b: U256,
    #[serde(with = "decimal")]
    pub token_c: U256,
}

impl TokenBalances {
    pub fn new(token_a: U256, token_b: U256, token_c: U256) -> Self {
        Self {
            token_a,
            token_b,
            token_c,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BoostOutcome {
    pub has_token_a: bool,
    pub has_token_b: bool,
    pub has_token_c: bool,
    pub has_boost_a: bool,
    pub has_boost_b: bool,
    pub has_boost_c: bool,
    pub boost_coefficient: f64,
}

impl BoostOutcome {
    pub fn is_boosted(&self) -> bool {
        self.has_boost_a || self.has_boost_b || self.has_boost_c
    }
}

/// Compute flags and coefficient for one holder.
pub fn calculate_boost(config: &BoostConfig, balances: &TokenBalances) -> BoostOutcome {
    let has_boost_a = balances.token_a >= config.threshold_a;
    let has_boost_b = balances.token_b >= config.threshold_b;
    // Token-C only needs to be held, no minimum.
    let has_boost_c = !balances.token_c.is_zero();

    let best = [
        (has_boost_a, config.coefficient_a),
        (has_boost_b, config.coefficient_b),
        (has_boost_c, config.coefficient_c),
    ]
    .into_iter()
    .filter(|(qualifies, _)| *qualifies)
    .map(|(_, coefficient)| coefficient)
    .reduce(f64::max);

    let boost_coefficient = match best {
        Some(coefficient) => coefficient.min(config.max_coefficient).max(NO_BOOST),
        None => NO_BOOST,
    };

    BoostOutcome {
        has_token_a: !balances.token_a.is_zero(),
        has_token_b: !balances.token_b.is_zero(),
        has_token_c: !balances.token_c.is_zero(),
        has_boost_a,
        has_boost_b,
        has_boost_c,
        boost_coefficient,
    }
}

/// Parse a non-negative base-10 integer of up to 256 bits.
pub fn parse_decimal(raw: &str) -> Result<U256, PortalError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PortalError::InvalidBalance(raw.to_string()));
    }
    U256::from_str_radix(trimmed, 10).map_err(|_| PortalError::InvalidBalance(raw.to_string()))
}

/// Serde adapter that writes `U256` as a decimal string.
pub mod decimal {
    use alloy_primitives::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        super::parse_decimal(&encoded).map_err(D::Error::custom)
    }
}
