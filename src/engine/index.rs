use super::domain::DomainName;
use crate::error::IndexError;
use rustc_hash::{FxHashSet, FxHasher};
use std::hash::Hasher;

/// Average number of keys per displacement bucket.
const AVG_BUCKET_SIZE: usize = 4;
/// Displacements tried per bucket before giving up on a seed.
const MAX_DISPLACEMENT: u32 = 1 << 20;
const MAX_SEEDS: u32 = 32;
const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// Immutable static set of domain names.
///
/// Built with hash-and-displace: every key hashes to a bucket, and each bucket
/// stores the displacement that sends all of its keys to distinct free slots.
/// A lookup is one hash, one displacement read and one string compare.
/// The slot table keeps the keys, so absent names never produce false hits.
#[derive(Debug)]
pub struct DomainIndex {
    seed: u64,
    displacements: Box<[u32]>,
    // Empty string marks a free slot; empty keys are rejected at build time.
    slots: Box<[Box<str>]>,
    len: usize,
}

impl DomainIndex {
    /// An index that matches nothing.
    pub fn empty() -> Self {
        Self {
            seed: 0,
            displacements: Box::default(),
            slots: Box::default(),
            len: 0,
        }
    }

    /// Builds an index over `names` exactly as given. Callers normalize
    /// beforehand; duplicates are collapsed.
    pub fn build<I, S>(names: I) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: FxHashSet<Box<str>> = FxHashSet::default();
        for name in names {
            let name = name.as_ref();
            if name.is_empty() {
                return Err(IndexError::EmptyName);
            }
            if !unique.contains(name) {
                unique.insert(name.into());
            }
        }

        if unique.is_empty() {
            return Ok(Self::empty());
        }

        let keys: Vec<Box<str>> = unique.into_iter().collect();
        let n = keys.len();
        // ~90% load keeps displacement searches short for the last buckets.
        let mut table_len = n + n / 9 + 1;

        for attempt in 0..MAX_SEEDS {
            let seed = mix(u64::from(attempt).wrapping_add(1).wrapping_mul(GOLDEN_GAMMA));
            if let Some(placement) = place(&keys, seed, table_len) {
                let mut slots: Vec<Box<str>> = (0..table_len).map(|_| Box::default()).collect();
                for (key, slot) in keys.into_iter().zip(placement.assignment) {
                    slots[slot] = key;
                }
                return Ok(Self {
                    seed,
                    displacements: placement.displacements.into_boxed_slice(),
                    slots: slots.into_boxed_slice(),
                    len: n,
                });
            }
            table_len += table_len / 20 + 1;
        }

        Err(IndexError::Exhausted {
            keys: n,
            attempts: MAX_SEEDS,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Exact membership.
    pub fn contains(&self, name: &str) -> bool {
        if self.len == 0 || name.is_empty() {
            return false;
        }
        let hash = hash_key(self.seed, name);
        let displacement = self.displacements[reduce(hash, self.displacements.len())];
        *self.slots[slot_for(hash, displacement, self.slots.len())] == *name
    }

    /// True if `name` or one of its parents, down to `floor` labels, is listed.
    pub fn contains_with_ancestors(&self, name: &DomainName, floor: usize) -> bool {
        name.ancestors(floor).any(|candidate| self.contains(candidate))
    }
}

struct Placement {
    displacements: Vec<u32>,
    assignment: Vec<usize>,
}

fn place(keys: &[Box<str>], seed: u64, table_len: usize) -> Option<Placement> {
    let bucket_count = keys.len() / AVG_BUCKET_SIZE + 1;
    let hashes: Vec<u64> = keys.iter().map(|k| hash_key(seed, k)).collect();

    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); bucket_count];
    for (i, &hash) in hashes.iter().enumerate() {
        buckets[reduce(hash, bucket_count)].push(i);
    }

    let mut order: Vec<usize> = (0..bucket_count).collect();
    order.sort_unstable_by(|&a, &b| buckets[b].len().cmp(&buckets[a].len()));

    let mut taken = vec![false; table_len];
    let mut displacements = vec![0u32; bucket_count];
    let mut assignment = vec![0usize; keys.len()];
    let mut candidate = Vec::with_capacity(16);

    for bucket in order {
        let members = &buckets[bucket];
        if members.is_empty() {
            break;
        }
        // Two keys with the same full hash can never be separated.
        if has_duplicate_hash(members, &hashes) {
            return None;
        }

        let mut placed = false;
        'search: for displacement in 0..MAX_DISPLACEMENT {
            candidate.clear();
            for &key in members {
                let slot = slot_for(hashes[key], displacement, table_len);
                if taken[slot] || candidate.contains(&slot) {
                    continue 'search;
                }
                candidate.push(slot);
            }
            for (&key, &slot) in members.iter().zip(&candidate) {
                taken[slot] = true;
                assignment[key] = slot;
            }
            displacements[bucket] = displacement;
            placed = true;
            break;
        }

        if !placed {
            return None;
        }
    }

    Some(Placement {
        displacements,
        assignment,
    })
}

fn has_duplicate_hash(members: &[usize], hashes: &[u64]) -> bool {
    members.iter().enumerate().any(|(i, &a)| {
        members[i + 1..]
            .iter()
            .any(|&b| hashes[a] == hashes[b])
    })
}

fn hash_key(seed: u64, key: &str) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write_u64(seed);
    hasher.write_usize(key.len());
    hasher.write(key.as_bytes());
    mix(hasher.finish())
}

fn slot_for(hash: u64, displacement: u32, len: usize) -> usize {
    let offset = u64::from(displacement).wrapping_add(1).wrapping_mul(GOLDEN_GAMMA);
    reduce(mix(hash ^ offset), len)
}

// splitmix64 finalizer
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Maps a hash uniformly onto `0..n` without a division.
fn reduce(hash: u64, n: usize) -> usize {
    ((u128::from(hash) * n as u128) >> 64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> DomainName {
        DomainName::parse(s).unwrap()
    }

    #[test]
    fn test_contains_exact_members_only() {
        let index = DomainIndex::build(["example.org", "totally.cool", "ads.example.net"]).unwrap();

        assert_eq!(index.len(), 3);
        assert!(index.contains("example.org"));
        assert!(index.contains("totally.cool"));
        assert!(index.contains("ads.example.net"));

        assert!(!index.contains("other.org"));
        assert!(!index.contains("sub.example.org"));
        assert!(!index.contains("example.net"));
        assert!(!index.contains(""));
    }

    #[test]
    fn test_duplicates_collapse() {
        let index = DomainIndex::build(["a.com", "b.com", "a.com", "a.com"]).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.contains("a.com"));
        assert!(index.contains("b.com"));
    }

    #[test]
    fn test_empty_list_matches_nothing() {
        let index = DomainIndex::build(Vec::<String>::new()).unwrap();
        assert!(index.is_empty());
        assert!(!index.contains("example.org"));
        assert!(!index.contains_with_ancestors(&name("a.example.org"), 2));
    }

    #[test]
    fn test_empty_entry_is_rejected() {
        let err = DomainIndex::build(["example.org", ""]).unwrap_err();
        assert_eq!(err, IndexError::EmptyName);
    }

    #[test]
    fn test_ancestor_walk() {
        let index = DomainIndex::build(["example.org"]).unwrap();

        assert!(index.contains_with_ancestors(&name("example.org"), 2));
        assert!(index.contains_with_ancestors(&name("sub.example.org"), 2));
        assert!(index.contains_with_ancestors(&name("a.b.c.example.org"), 2));
        assert!(!index.contains_with_ancestors(&name("example.com"), 2));
        assert!(!index.contains_with_ancestors(&name("notexample.org"), 2));
    }

    #[test]
    fn test_bare_tld_only_matches_through_floor_one() {
        let index = DomainIndex::build(["cool"]).unwrap();

        // Listed TLD still matches an identical query.
        assert!(index.contains_with_ancestors(&name("cool"), 2));
        assert!(!index.contains_with_ancestors(&name("totally.cool"), 2));
        assert!(index.contains_with_ancestors(&name("totally.cool"), 1));
    }

    #[test]
    fn test_large_list_has_no_false_positives() {
        let listed: Vec<String> = (0..20_000).map(|i| format!("host{i}.list.example")).collect();
        let index = DomainIndex::build(&listed).unwrap();

        assert_eq!(index.len(), listed.len());
        assert!(listed.iter().all(|d| index.contains(d)));
        assert!((0..20_000).all(|i| !index.contains(&format!("host{i}.other.example"))));
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let listed = ["one.test", "two.test", "three.test"];
        let a = DomainIndex::build(listed).unwrap();
        let b = DomainIndex::build(listed).unwrap();
        for probe in ["one.test", "two.test", "three.test", "four.test", "x.one.test"] {
            assert_eq!(a.contains(probe), b.contains(probe));
        }
    }
}
