use portal_core::PortalError;
use thiserror::Error;

/// Errors surfaced by the store. The first three are user-facing rejections of
/// a referral join and never indicate a storage fault.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("referral code does not belong to any participant")]
    InvalidReferralCode,

    #[error("a participant cannot redeem their own referral code")]
    SelfReferralNotAllowed,

    #[error("address has already been referred")]
    AlreadyReferred,

    #[error("unknown address {0}")]
    UnknownUser(String),

    #[error("missing {0} account id")]
    MissingAccountId(&'static str),

    #[error("{0} account is already linked to another address")]
    SocialAccountTaken(&'static str),

    #[error("no unique referral code found after {0} attempts")]
    CodeSpaceExhausted(usize),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Core(#[from] PortalError),

    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),
}

impl StoreError {
    /// True for the outcomes a caller should show as a plain rejection.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidReferralCode
                | StoreError::SelfReferralNotAllowed
                | StoreError::AlreadyReferred
                | StoreError::SocialAccountTaken(_)
        )
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}
