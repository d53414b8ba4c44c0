//! Core primitives for the airdrop portal.
//!
//! The crate is free of I/O and exposes the building blocks the store and the
//! CLI are assembled from:
//!
//! * [`address`] — canonical (lowercase) EVM wallet addresses.
//! * [`boost`] — the token-balance boost calculator and its configuration.
//! * [`code`] — six character referral codes.
//! * [`oauth`] — PKCE pairs and Ed25519 signed OAuth `state` tokens.

pub mod address;
pub mod boost;
pub mod code;
pub mod oauth;

mod error;

pub use address::Address;
pub use alloy_primitives::U256;
pub use error::PortalError;
