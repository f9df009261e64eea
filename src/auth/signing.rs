// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request signatures.
//!
//! ```text
//! signature = hex(HMAC-SHA256(secret, UPPER(method) || path || timestamp))
//! ```
//!
//! The signature is deterministic: identical inputs always produce the same
//! value. Freshness comes only from the timestamp, so a captured request can
//! be replayed inside the window unless the node's replay guard is enabled.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::identity::Secret;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the caller's DID.
pub const DID_HEADER: &str = "x-did";
/// Header carrying the hex signature.
pub const SIGNATURE_HEADER: &str = "x-signature";
/// Header carrying the unix-millisecond timestamp.
pub const TIMESTAMP_HEADER: &str = "x-timestamp";

/// Default freshness window, either direction.
pub const DEFAULT_SIGNATURE_WINDOW_MS: i64 = 300_000;

/// The signed message for a request.
pub fn signing_payload(method: &str, path: &str, timestamp: &str) -> String {
    format!("{}{path}{timestamp}", method.to_ascii_uppercase())
}

fn mac_for(secret: &Secret, method: &str, path: &str, timestamp: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret.expose().as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(signing_payload(method, path, timestamp).as_bytes());
    mac
}

/// Sign a request. Pure and deterministic.
pub fn sign(secret: &Secret, method: &str, path: &str, timestamp: &str) -> String {
    hex::encode(mac_for(secret, method, path, timestamp).finalize().into_bytes())
}

/// Verify a hex signature in constant time.
pub fn verify(secret: &Secret, method: &str, path: &str, timestamp: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    mac_for(secret, method, path, timestamp)
        .verify_slice(&expected)
        .is_ok()
}

/// Whether `timestamp_ms` lies within `window_ms` of `now_ms`.
pub fn is_fresh(timestamp_ms: i64, now_ms: i64, window_ms: i64) -> bool {
    now_ms.abs_diff(timestamp_ms) <= window_ms.unsigned_abs()
}

/// Current time in unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> Secret {
        Secret::new("s3cr3t")
    }

    #[test]
    fn signing_is_deterministic() {
        let a = sign(&secret(), "POST", "/api/recovery/approve", "1700000000000");
        let b = sign(&secret(), "POST", "/api/recovery/approve", "1700000000000");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn method_is_uppercased() {
        assert_eq!(
            sign(&secret(), "post", "/api/guardians", "1"),
            sign(&secret(), "POST", "/api/guardians", "1")
        );
        assert_eq!(signing_payload("get", "/x", "42"), "GET/x42");
    }

    #[test]
    fn any_input_change_changes_signature() {
        let base = sign(&secret(), "POST", "/api/follow/did:key:zA", "1000");
        assert_ne!(base, sign(&secret(), "GET", "/api/follow/did:key:zA", "1000"));
        assert_ne!(base, sign(&secret(), "POST", "/api/unfollow/did:key:zA", "1000"));
        assert_ne!(base, sign(&secret(), "POST", "/api/follow/did:key:zA", "1001"));
        assert_ne!(base, sign(&Secret::new("other"), "POST", "/api/follow/did:key:zA", "1000"));
    }

    #[test]
    fn matches_reference_hmac() {
        // HMAC-SHA256("s3cr3t", "POST/api/recovery/approve1700000000000")
        assert_eq!(
            sign(&secret(), "post", "/api/recovery/approve", "1700000000000"),
            "6e0c6cb493a9b5935cb3e2a0aa15e6791b8ae429b6b3e340e8920eeae0823058"
        );
    }

    #[test]
    fn verify_accepts_valid_and_rejects_tampered() {
        let sig = sign(&secret(), "GET", "/api/guardians", "5");
        assert!(verify(&secret(), "GET", "/api/guardians", "5", &sig));
        assert!(!verify(&secret(), "GET", "/api/guardians", "6", &sig));
        assert!(!verify(&secret(), "GET", "/api/guardians", "5", "zz"));
        assert!(!verify(&secret(), "GET", "/api/guardians", "5", ""));
    }

    #[test]
    fn freshness_window_is_symmetric() {
        let now = 1_700_000_000_000;
        assert!(is_fresh(now, now, DEFAULT_SIGNATURE_WINDOW_MS));
        assert!(is_fresh(now - 300_000, now, DEFAULT_SIGNATURE_WINDOW_MS));
        assert!(is_fresh(now + 300_000, now, DEFAULT_SIGNATURE_WINDOW_MS));
        assert!(!is_fresh(now - 300_001, now, DEFAULT_SIGNATURE_WINDOW_MS));
        assert!(!is_fresh(now + 300_001, now, DEFAULT_SIGNATURE_WINDOW_MS));
    }
}
