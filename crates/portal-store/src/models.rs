use chrono::{DateTime, Utc};
use portal_core::boost::TokenBalances;
use portal_core::code::ReferralCode;
use portal_core::{boost, Address};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::StoreError;

/// Social platform backing a verification track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Twitter,
    Telegram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Telegram => "telegram",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub(crate) struct ProgressRow {
    address: String,
    twitter_verified: bool,
    twitter_account: Option<String>,
    telegram_verified: bool,
    telegram_account: Option<String>,
    referral_code: Option<String>,
    referral_count: i64,
    referred_by: Option<String>,
    updated_at: DateTime<Utc>,
}

/// Verification and referral state of one user.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ProgressView {
    pub address: Address,
    pub twitter_verified: bool,
    pub twitter_account: Option<String>,
    pub telegram_verified: bool,
    pub telegram_account: Option<String>,
    pub referral_code: Option<ReferralCode>,
    pub referral_count: i64,
    pub referred_by: Option<Address>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ProgressRow> for ProgressView {
    type Error = StoreError;

    fn try_from(row: ProgressRow) -> Result<Self, Self::Error> {
        let referral_code = row
            .referral_code
            .as_deref()
            .map(ReferralCode::parse)
            .transpose()
            .map_err(|_| StoreError::Corrupt(format!("referral code of {}", row.address)))?;
        let referred_by = row.referred_by.as_deref().map(stored_address).transpose()?;
        Ok(Self {
            address: stored_address(&row.address)?,
            twitter_verified: row.twitter_verified,
            twitter_account: row.twitter_account,
            telegram_verified: row.telegram_verified,
            telegram_account: row.telegram_account,
            referral_code,
            referral_count: row.referral_count,
            referred_by,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ReferralRow {
    address: String,
    created_at: DateTime<Utc>,
}

/// One user brought in by a referrer.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ReferralEntry {
    pub referred: Address,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ReferralRow> for ReferralEntry {
    type Error = StoreError;

    fn try_from(row: ReferralRow) -> Result<Self, Self::Error> {
        Ok(Self {
            referred: stored_address(&row.address)?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct BoostRow {
    address: String,
    token_a_balance: String,
    token_b_balance: String,
    token_c_balance: String,
    boost_coefficient: f64,
    has_boost_a: bool,
    has_boost_b: bool,
    has_boost_c: bool,
    updated_at: DateTime<Utc>,
}

/// Last persisted boost computation for a user.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct BoostRecord {
    pub address: Address,
    #[serde(flatten)]
    pub balances: TokenBalances,
    pub boost_coefficient: f64,
    pub has_boost_a: bool,
    pub has_boost_b: bool,
    pub has_boost_c: bool,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BoostRow> for BoostRecord {
    type Error = StoreError;

    fn try_from(row: BoostRow) -> Result<Self, Self::Error> {
        let balance = |raw: &str| {
            boost::parse_decimal(raw)
                .map_err(|_| StoreError::Corrupt(format!("balance of {}: {raw:?}", row.address)))
        };
        let balances = TokenBalances::new(
            balance(&row.token_a_balance)?,
            balance(&row.token_b_balance)?,
            balance(&row.token_c_balance)?,
        );
        Ok(Self {
            address: stored_address(&row.address)?,
            balances,
            boost_coefficient: row.boost_coefficient,
            has_boost_a: row.has_boost_a,
            has_boost_b: row.has_boost_b,
            has_boost_c: row.has_boost_c,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn stored_address(raw: &str) -> Result<Address, StoreError> {
    Address::parse(raw).map_err(|_| StoreError::Corrupt(format!("address {raw:?}")))
}
