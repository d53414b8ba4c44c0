//! Where token balances come from.
//!
//! The sweep only needs something that maps an address to its three balances.
//! [`SnapshotBalances`] serves them from a JSONL dump (one holder per line),
//! which is how balances exported from the chain indexers are handed over.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::Context;
use portal_core::boost::{decimal, TokenBalances};
use portal_core::{Address, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum BalanceError {
    #[error("no balances known for {0}")]
    Missing(Address),
    #[error("balance source unavailable: {0}")]
    Unavailable(String),
}

/// Supplies current balances for one address.
pub trait BalanceSource: Send + Sync {
    fn balances(&self, address: &Address) -> Result<TokenBalances, BalanceError>;
}

/// One line of a balance snapshot file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotLine {
    pub address: Address,
    #[serde(with = "decimal")]
    pub token_a: U256,
    #[serde(with = "decimal")]
    pub token_b: U256,
    #[serde(with = "decimal")]
    pub token_c: U256,
}

#[derive(Clone, Debug, Default)]
pub struct SnapshotBalances {
    entries: BTreeMap<Address, TokenBalances>,
}

impl SnapshotBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_jsonl_file(path: &Path) -> anyhow::Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("open balance snapshot {}", path.display()))?;
        Self::from_jsonl(file)
    }

    /// Later lines for the same address replace earlier ones.
    pub fn from_jsonl<R: Read>(reader: R) -> anyhow::Result<Self> {
        let mut snapshot = Self::new();
        for (idx, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: SnapshotLine = serde_json::from_str(&line)
                .with_context(|| format!("balance snapshot line {}", idx + 1))?;
            snapshot.insert(
                parsed.address,
                TokenBalances::new(parsed.token_a, parsed.token_b, parsed.token_c),
            );
        }
        Ok(snapshot)
    }

    pub fn insert(&mut self, address: Address, balances: TokenBalances) {
        self.entries.insert(address, balances);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BalanceSource for SnapshotBalances {
    fn balances(&self, address: &Address) -> Result<TokenBalances, BalanceError> {
        self.entries
            .get(address)
            .cloned()
            .ok_or_else(|| BalanceError::Missing(address.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_jsonl_with_mixed_case_addresses() {
        let input = r#"
{"address":"0x00000000000000000000000000000000000000AA","token_a":"150000000000000000","token_b":"0","token_c":"1"}

{"address":"0x00000000000000000000000000000000000000bb","token_a":"0","token_b":"0","token_c":"0"}
"#;
        let snapshot = SnapshotBalances::from_jsonl(input.as_bytes()).unwrap();
        assert_eq!(snapshot.len(), 2);

        let aa = Address::parse("0x00000000000000000000000000000000000000aa").unwrap();
        let balances = snapshot.balances(&aa).unwrap();
        assert_eq!(balances.token_a, U256::from(150_000_000_000_000_000u128));
        assert_eq!(balances.token_c, U256::from(1u64));

        let unknown = Address::parse("0x00000000000000000000000000000000000000cc").unwrap();
        assert!(matches!(
            snapshot.balances(&unknown),
            Err(BalanceError::Missing(_))
        ));
    }

    #[test]
    fn bad_line_reports_its_number() {
        let input = "{\"address\":\"0x00000000000000000000000000000000000000aa\",\"token_a\":\"1\",\"token_b\":\"2\",\"token_c\":\"3\"}\n{\"address\":\"0xbad\"}\n";
        let err = SnapshotBalances::from_jsonl(input.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }
}
