use thiserror::Error;

/// Canonical error type exposed by the core primitives.
#[derive(Debug, Error)]
pub enum PortalError {
    /// Input does not look like a 20-byte hex address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Referral code does not have the minted shape.
    #[error("malformed referral code")]
    MalformedReferralCode,

    /// Boost configuration rejected by [`crate::boost::BoostConfig::validate`].
    #[error("invalid boost config: {0}")]
    InvalidBoostConfig(&'static str),

    /// A balance string is not a non-negative decimal integer.
    #[error("invalid balance {0:?}")]
    InvalidBalance(String),

    /// OAuth state token could not be decoded.
    #[error("malformed oauth state: {0}")]
    MalformedState(&'static str),

    /// OAuth state token signature does not verify.
    #[error("oauth state signature mismatch")]
    StateSignature,

    /// OAuth state token is older than the allowed window (or from the future).
    #[error("oauth state expired")]
    StateExpired,

    /// OAuth state claims could not be serialized.
    #[error("state encoding failed: {0}")]
    StateEncoding(#[from] serde_json::Error),

    /// Key material of the wrong size or encoding.
    #[error("invalid key material: {0}")]
    InvalidKey(&'static str),
}
