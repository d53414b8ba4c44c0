use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::PortalError;

pub const CODE_LEN: usize = 6;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Six character referral code, stored uppercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferralCode(String);

impl ReferralCode {
    /// Draw a fresh random code. Uniqueness is the store's job.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..CODE_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Parse user input; surrounding whitespace and casing are ignored.
    pub fn parse(raw: &str) -> Result<Self, PortalError> {
        let trimmed = raw.trim();
        if trimmed.len() != CODE_LEN || !trimmed.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(PortalError::MalformedReferralCode);
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferralCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ReferralCode {
    type Error = PortalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ReferralCode> for String {
    fn from(value: ReferralCode) -> Self {
        value.0
    }
}
