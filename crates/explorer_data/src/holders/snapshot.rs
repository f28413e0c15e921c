//! Immutable holder snapshot with rank order and an address index.

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use time::OffsetDateTime;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Holder {
    pub address: String,
    #[serde(serialize_with = "decimal_string")]
    pub balance: u128,
    /// 1-based position in descending balance order.
    pub rank: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct SnapshotSummary {
    pub holder_count: usize,
    #[serde(serialize_with = "decimal_string")]
    pub total_supply: u128,
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
}

/// Amounts exceed what JSON numbers carry safely; emit them as decimal strings.
fn decimal_string<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Holders sorted by descending balance (ties by address), never mutated after build.
#[derive(Clone, Debug)]
pub struct HolderSnapshot {
    holders: Vec<Holder>,
    index: HashMap<String, usize>,
    total_supply: u128,
    last_update: OffsetDateTime,
}

impl HolderSnapshot {
    /// Build from raw (address, balance) pairs. Repeated addresses are summed.
    pub fn build(
        balances: impl IntoIterator<Item = (String, u128)>,
        total_supply: u128,
        last_update: OffsetDateTime,
    ) -> Self {
        let mut merged: BTreeMap<String, u128> = BTreeMap::new();
        for (address, balance) in balances {
            let slot = merged.entry(address).or_insert(0);
            *slot = slot.saturating_add(balance);
        }
        let mut sorted: Vec<(String, u128)> = merged.into_iter().collect();
        // BTreeMap order is by address, so a stable sort keeps ties address-ordered.
        sorted.sort_by(|a, b| b.1.cmp(&a.1));

        let holders: Vec<Holder> = sorted
            .into_iter()
            .enumerate()
            .map(|(i, (address, balance))| Holder {
                address,
                balance,
                rank: (i + 1) as u32,
            })
            .collect();
        let index = holders
            .iter()
            .enumerate()
            .map(|(i, h)| (h.address.clone(), i))
            .collect();
        Self {
            holders,
            index,
            total_supply,
            last_update,
        }
    }

    /// Exact-match lookup by address.
    pub fn find_by_key(&self, address: &str) -> Option<&Holder> {
        self.index.get(address).map(|&i| &self.holders[i])
    }

    /// First `n` holders in rank order; shorter if fewer exist.
    pub fn top_n(&self, n: usize) -> &[Holder] {
        &self.holders[..n.min(self.holders.len())]
    }

    pub fn holders(&self) -> &[Holder] {
        &self.holders
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn last_update(&self) -> OffsetDateTime {
        self.last_update
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            holder_count: self.holders.len(),
            total_supply: self.total_supply,
            last_update: self.last_update,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap() -> HolderSnapshot {
        HolderSnapshot::build(
            vec![
                ("z".to_string(), 10),
                ("x".to_string(), 100),
                ("y".to_string(), 50),
            ],
            160,
            OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        )
    }

    #[test]
    fn sorted_descending_with_ranks() {
        let s = snap();
        let order: Vec<_> = s
            .holders()
            .iter()
            .map(|h| (h.address.as_str(), h.balance, h.rank))
            .collect();
        assert_eq!(order, vec![("x", 100, 1), ("y", 50, 2), ("z", 10, 3)]);
    }

    #[test]
    fn find_exact_match() {
        let s = snap();
        let y = s.find_by_key("y").unwrap();
        assert_eq!(y.balance, 50);
        assert_eq!(y.rank, 2);
        assert!(s.find_by_key("Y").is_none());
        assert!(s.find_by_key("w").is_none());
    }

    #[test]
    fn top_n_is_prefix() {
        let s = snap();
        let top = s.top_n(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].address, "x");
        assert_eq!(top[1].address, "y");
        assert_eq!(s.top_n(10).len(), 3);
        assert!(s.top_n(0).is_empty());
    }

    #[test]
    fn duplicates_merge_and_ties_order_by_address() {
        let s = HolderSnapshot::build(
            vec![
                ("b".to_string(), 5),
                ("a".to_string(), 3),
                ("a".to_string(), 2),
                ("c".to_string(), 7),
            ],
            17,
            OffsetDateTime::UNIX_EPOCH,
        );
        let order: Vec<_> = s.holders().iter().map(|h| h.address.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
        assert_eq!(s.find_by_key("a").unwrap().balance, 5);
    }

    #[test]
    fn summary_serializes_rfc3339() {
        let v = serde_json::to_value(snap().summary()).unwrap();
        assert_eq!(v["holder_count"], 3);
        assert_eq!(v["total_supply"], "160");
        assert_eq!(v["last_update"], "2023-11-14T22:13:20Z");
    }
}
