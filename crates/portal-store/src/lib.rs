//! SQLite persistence for the airdrop portal.
//!
//! * [`store`] — connection pool, users, progress, social verification and
//!   boost records.
//! * [`join`] — the referral join transaction.
//! * [`export`] — flat per-user rows for the admin export.
//!
//! Every multi-statement mutation runs inside a `sqlx` transaction; dropping
//! the transaction without committing rolls it back.

pub mod export;
pub mod join;
pub mod models;
pub mod store;

mod error;
mod schema;

pub use error::StoreError;
pub use join::JoinReceipt;
pub use models::{BoostRecord, Platform, ProgressView, ReferralEntry};
pub use store::Store;
