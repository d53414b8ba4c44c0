//! Application layer of the airdrop portal CLI.
//!
//! * [`config`] — JSON configuration with defaults.
//! * [`balances`] — balance sources feeding the boost calculator.
//! * [`sweep`] — batch boost refresh over every known user.

pub mod balances;
pub mod config;
pub mod sweep;
