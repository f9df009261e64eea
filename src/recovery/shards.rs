// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Secret Shards
//!
//! Offline recovery: an identity's Ed25519 seed is split into `n` shards
//! with Shamir secret sharing over GF(256), any `k` of which rebuild the
//! seed and therefore the same `did:key`. The owner hands the shards to
//! trusted people; the node never keeps them.
//!
//! A shard is written `"<k>-<hex>"`, where `<hex>` is the share's x
//! coordinate byte followed by its 32 y bytes. Carrying `k` lets a restore
//! tell "too few shards" apart from "wrong shards".
//!
//! Shards of different identities combine into *some* seed without error.
//! Pass the expected DID to [`combine`] to catch that.

use std::collections::BTreeMap;

use sharks::{Share, Sharks};

use crate::identity::{Did, Identity, IdentityError, Secret};

/// Shards needed to restore, unless the owner picks otherwise.
pub const DEFAULT_SHARD_THRESHOLD: u8 = 3;

/// Shards issued, unless the owner picks otherwise.
pub const DEFAULT_SHARD_COUNT: u8 = 5;

/// Fewer than two shards would each hold the whole seed.
const MIN_SHARD_THRESHOLD: u8 = 2;

/// One x coordinate byte plus the 32-byte seed.
const SHARE_LEN: usize = 33;

#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    #[error("need 2 <= threshold <= shares <= 255, got {threshold} of {shares}")]
    InvalidParameters { threshold: u32, shares: u32 },

    #[error("only Ed25519 did:key identities can be split into shards")]
    UnsupportedSecret,

    #[error("malformed shard #{index}: {reason}")]
    MalformedShard { index: usize, reason: &'static str },

    #[error("shards were issued with different thresholds")]
    MixedThresholds,

    #[error("{needed} distinct shards are needed, got {got}")]
    InsufficientShards { needed: u8, got: usize },

    #[error("shards do not combine: {0}")]
    Combine(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Split `secret` into `shares` shards, `threshold` of which restore it.
pub fn split(secret: &Secret, threshold: u32, shares: u32) -> Result<Vec<String>, ShardError> {
    let invalid = || ShardError::InvalidParameters { threshold, shares };
    let k = u8::try_from(threshold).map_err(|_| invalid())?;
    let n = u8::try_from(shares).map_err(|_| invalid())?;
    if k < MIN_SHARD_THRESHOLD || k > n {
        return Err(invalid());
    }
    let seed = secret.ed25519_seed().ok_or(ShardError::UnsupportedSecret)?;

    Ok(Sharks(k)
        .dealer(&seed)
        .take(usize::from(n))
        .map(|share| format!("{k}-{}", hex::encode(Vec::from(&share))))
        .collect())
}

/// Rebuild an identity from shards. Duplicate shards count once.
///
/// With `expected`, a rebuilt DID that differs is rejected as
/// [`IdentityError::KeyMismatch`].
pub fn combine<S: AsRef<str>>(shards: &[S], expected: Option<&Did>) -> Result<Identity, ShardError> {
    let mut threshold = None;
    let mut by_x = BTreeMap::new();

    for (index, shard) in shards.iter().enumerate() {
        let (k, bytes) = parse_shard(index, shard.as_ref().trim())?;
        if *threshold.get_or_insert(k) != k {
            return Err(ShardError::MixedThresholds);
        }
        by_x.entry(bytes[0]).or_insert(bytes);
    }

    let Some(threshold) = threshold else {
        return Err(ShardError::InsufficientShards {
            needed: MIN_SHARD_THRESHOLD,
            got: 0,
        });
    };
    if by_x.len() < usize::from(threshold) {
        return Err(ShardError::InsufficientShards {
            needed: threshold,
            got: by_x.len(),
        });
    }

    let shares = by_x
        .values()
        .map(|bytes| {
            Share::try_from(bytes.as_slice()).map_err(|e| ShardError::Combine(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let sharks = Sharks(threshold);
    let seed: [u8; 32] = sharks
        .recover(&shares)
        .map_err(|e| ShardError::Combine(e.to_string()))?
        .try_into()
        .map_err(|_| ShardError::Combine("recovered secret has the wrong length".into()))?;

    let identity = Identity::from_seed(&seed)?;
    if let Some(expected) = expected {
        if identity.did() != expected {
            return Err(IdentityError::KeyMismatch(expected.to_string()).into());
        }
    }
    Ok(identity)
}

fn parse_shard(index: usize, shard: &str) -> Result<(u8, Vec<u8>), ShardError> {
    let malformed = |reason| ShardError::MalformedShard { index, reason };

    let (k, body) = shard
        .split_once('-')
        .ok_or_else(|| malformed("expected <threshold>-<hex>"))?;
    let k: u8 = k.parse().map_err(|_| malformed("threshold is not a number"))?;
    if k < MIN_SHARD_THRESHOLD {
        return Err(malformed("threshold below 2"));
    }
    let bytes = hex::decode(body).map_err(|_| malformed("share is not hex"))?;
    if bytes.len() != SHARE_LEN {
        return Err(malformed("share has the wrong length"));
    }
    if bytes[0] == 0 {
        return Err(malformed("share index 0 is reserved"));
    }
    Ok((k, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_threshold_subset_restores_the_same_did() {
        let identity = Identity::generate().unwrap();
        let shards = split(identity.secret(), 3, 5).unwrap();
        assert_eq!(shards.len(), 5);
        assert!(shards.iter().all(|s| s.starts_with("3-")));

        for subset in [[0, 1, 2], [0, 2, 4], [4, 3, 1]] {
            let picked: Vec<&String> = subset.iter().map(|&i| &shards[i]).collect();
            let restored = combine(&picked, Some(identity.did())).unwrap();
            assert_eq!(restored, identity);
        }

        let restored = combine(&shards, None).unwrap();
        assert_eq!(restored.did(), identity.did());
    }

    #[test]
    fn too_few_shards_fail() {
        let identity = Identity::generate().unwrap();
        let shards = split(identity.secret(), 3, 5).unwrap();

        let err = combine(&shards[..2], None).unwrap_err();
        assert!(matches!(
            err,
            ShardError::InsufficientShards { needed: 3, got: 2 }
        ));

        // Repeating a shard does not make up the difference.
        let repeated = [&shards[0], &shards[0], &shards[1]];
        assert!(matches!(
            combine(&repeated, None),
            Err(ShardError::InsufficientShards { got: 2, .. })
        ));

        let none: [&str; 0] = [];
        assert!(matches!(
            combine(&none, None),
            Err(ShardError::InsufficientShards { got: 0, .. })
        ));
    }

    #[test]
    fn shards_of_another_identity_are_caught_with_expected_did() {
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();
        let shards = split(bob.secret(), 2, 3).unwrap();

        let err = combine(&shards[..2], Some(alice.did())).unwrap_err();
        assert!(matches!(
            err,
            ShardError::Identity(IdentityError::KeyMismatch(_))
        ));
    }

    #[test]
    fn mixed_thresholds_and_garbage_are_rejected() {
        let identity = Identity::generate().unwrap();
        let three = split(identity.secret(), 3, 5).unwrap();
        let two = split(identity.secret(), 2, 3).unwrap();
        assert!(matches!(
            combine(&[&three[0], &two[0], &three[1]], None),
            Err(ShardError::MixedThresholds)
        ));

        for garbage in ["", "3", "x-00", "3-zz", "3-0102", "1-00"] {
            assert!(
                matches!(
                    combine(&[garbage], None),
                    Err(ShardError::MalformedShard { index: 0, .. })
                ),
                "{garbage:?} should be malformed"
            );
        }
    }

    #[test]
    fn split_validates_parameters() {
        let identity = Identity::generate().unwrap();
        for (k, n) in [(1, 5), (6, 5), (0, 0), (3, 256)] {
            assert!(matches!(
                split(identity.secret(), k, n),
                Err(ShardError::InvalidParameters { .. })
            ));
        }
        assert_eq!(split(identity.secret(), 255, 255).unwrap().len(), 255);
    }

    #[test]
    fn opaque_secrets_cannot_be_split() {
        let legacy = Secret::new("not-a-seed");
        assert!(matches!(
            split(&legacy, 3, 5),
            Err(ShardError::UnsupportedSecret)
        ));
    }
}
