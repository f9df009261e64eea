// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! DID-based request signing for the node API.
//!
//! ## Auth Flow
//!
//! 1. The client holds a [`Session`]: its DID and, usually, its secret.
//! 2. Every call carries `X-DID`; with a secret also `X-Signature` and
//!    `X-Timestamp` (see [`signing`]).
//! 3. The node:
//!    - rejects DIDs superseded by a completed recovery
//!    - checks the timestamp against the freshness window
//!    - recomputes the HMAC with the secret from its local keystore
//!    - optionally rejects signatures it has already seen
//!
//! ## Trust levels
//!
//! - Signed callers may do anything their DID owns.
//! - DID-only callers are accepted with degraded trust unless the node runs
//!   with `REQUIRE_SIGNATURES=true`. Handlers that mutate identity state
//!   demand [`SignedCaller`].

pub mod error;
pub mod extractor;
pub mod replay;
pub mod session;
pub mod signing;

pub use error::AuthError;
pub use extractor::{verify_request, Caller, CallerTrust, SignedCaller};
pub use replay::{ReplayGuard, DEFAULT_REPLAY_CAPACITY};
pub use session::{AuthHeaders, Session};
pub use signing::{sign, verify, DEFAULT_SIGNATURE_WINDOW_MS};
