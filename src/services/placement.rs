//! Rendezvous (highest-random-weight) chunk placement.
//!
//! Every chunk is scored against every shard with
//! `hash(chunk) XOR hash(shard_name)` and goes to the highest score. Adding
//! or removing a shard only moves chunks whose winner changes.

use std::fmt;

use thiserror::Error;

/// A storage endpoint addressed by name, host and port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shard {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl Shard {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }

    /// Base URL of the shard's blob endpoint, without trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.host, self.port)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("shard set is empty")]
    Empty,
    #[error("shard `{0}` is configured twice")]
    Duplicate(String),
}

/// Immutable shard membership, loaded once at startup.
///
/// Shards are kept sorted by name. That order is the tie-break order for
/// equal weights, so ties resolve identically across runs.
#[derive(Clone, Debug)]
pub struct ShardSet {
    shards: Vec<Shard>,
    name_hashes: Vec<u64>,
}

impl ShardSet {
    pub fn new(mut shards: Vec<Shard>) -> Result<Self, PlacementError> {
        if shards.is_empty() {
            return Err(PlacementError::Empty);
        }
        shards.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(dup) = shards.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(PlacementError::Duplicate(dup[0].name.clone()));
        }
        let name_hashes = shards.iter().map(|s| weight_hash(s.name.as_bytes())).collect();
        Ok(Self {
            shards,
            name_hashes,
        })
    }

    /// Pick the destination shard for `chunk`.
    ///
    /// `chunk` must be exactly the bytes of the window being stored; hashing
    /// a padded or reused buffer would place identical content differently.
    pub fn select_shard(&self, chunk: &[u8]) -> &Shard {
        let chunk_hash = weight_hash(chunk);
        let mut best = 0;
        let mut best_weight = chunk_hash ^ self.name_hashes[0];
        for (idx, name_hash) in self.name_hashes.iter().enumerate().skip(1) {
            let weight = chunk_hash ^ name_hash;
            if weight > best_weight {
                best = idx;
                best_weight = weight;
            }
        }
        &self.shards[best]
    }

    pub fn get(&self, name: &str) -> Option<&Shard> {
        self.shards
            .binary_search_by(|s| s.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.shards[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shard> {
        self.shards.iter()
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }
}

/// 64-bit weight hash: the leading eight bytes of the MD5 digest.
fn weight_hash(bytes: &[u8]) -> u64 {
    let digest = md5::compute(bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard_set(names: &[&str]) -> ShardSet {
        let shards = names
            .iter()
            .enumerate()
            .map(|(i, name)| Shard::new(*name, *name, 9001 + i as u16))
            .collect();
        ShardSet::new(shards).unwrap()
    }

    fn sample_chunks() -> Vec<Vec<u8>> {
        (0..500u32)
            .map(|i| format!("chunk-payload-{i}").into_bytes())
            .collect()
    }

    #[test]
    fn empty_set_is_rejected() {
        assert_eq!(ShardSet::new(vec![]).unwrap_err(), PlacementError::Empty);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = ShardSet::new(vec![
            Shard::new("s1", "h1", 1),
            Shard::new("s1", "h2", 2),
        ])
        .unwrap_err();
        assert_eq!(err, PlacementError::Duplicate("s1".into()));
    }

    #[test]
    fn selection_is_deterministic() {
        let set = shard_set(&["s1", "s2", "s3"]);
        for chunk in sample_chunks() {
            assert_eq!(set.select_shard(&chunk), set.select_shard(&chunk));
        }
    }

    #[test]
    fn selection_ignores_configuration_order() {
        let forward = shard_set(&["s1", "s2", "s3"]);
        let reverse = shard_set(&["s3", "s2", "s1"]);
        for chunk in sample_chunks() {
            assert_eq!(
                forward.select_shard(&chunk).name,
                reverse.select_shard(&chunk).name
            );
        }
    }

    #[test]
    fn selected_shard_has_maximal_weight() {
        let set = shard_set(&["alpha", "beta", "gamma", "delta"]);
        for chunk in sample_chunks() {
            let chosen = set.select_shard(&chunk);
            let chosen_weight = weight_hash(&chunk) ^ weight_hash(chosen.name.as_bytes());
            for shard in set.iter() {
                assert!(weight_hash(&chunk) ^ weight_hash(shard.name.as_bytes()) <= chosen_weight);
            }
        }
    }

    #[test]
    fn chunks_spread_across_shards() {
        let set = shard_set(&["s1", "s2", "s3"]);
        for shard in set.iter() {
            let hits = sample_chunks()
                .iter()
                .filter(|c| set.select_shard(c).name == shard.name)
                .count();
            assert!(hits > 0, "shard {} received no chunks", shard.name);
        }
    }

    #[test]
    fn removing_a_shard_only_moves_its_chunks() {
        let before = shard_set(&["s1", "s2", "s3"]);
        let after = shard_set(&["s1", "s2"]);
        for chunk in sample_chunks() {
            let old = &before.select_shard(&chunk).name;
            if old != "s3" {
                assert_eq!(old, &after.select_shard(&chunk).name);
            }
        }
    }

    #[test]
    fn adding_a_shard_only_pulls_chunks_onto_it() {
        let before = shard_set(&["s1", "s2"]);
        let after = shard_set(&["s1", "s2", "s3"]);
        for chunk in sample_chunks() {
            let new = &after.select_shard(&chunk).name;
            if new != "s3" {
                assert_eq!(new, &before.select_shard(&chunk).name);
            }
        }
    }

    #[test]
    fn hash_covers_only_the_bytes_given() {
        let set = shard_set(&["s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8"]);
        // A short final window and the same window padded with a previous
        // window's tail are different inputs.
        let exact = b"gh".to_vec();
        let stale = b"ghcdef".to_vec();
        assert_ne!(weight_hash(&exact), weight_hash(&stale));
        assert_eq!(set.select_shard(&exact), set.select_shard(&b"gh"[..]));
    }

    #[test]
    fn lookup_by_name() {
        let set = shard_set(&["s2", "s1"]);
        assert_eq!(set.get("s1").map(|s| s.port), Some(9002));
        assert!(set.get("s9").is_none());
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("s2").unwrap().base_url(), "http://s2:9001");
    }
}
