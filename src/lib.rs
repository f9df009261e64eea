// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Social Recovery Node
//!
//! A per-device node that holds DID identities and lets a lost identity be
//! re-bound to a new one once enough guardians from its social graph
//! approve.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Request authentication (X-DID + HMAC signatures)
//! - `client` - Signing HTTP client for a node
//! - `guardians` - Guardian registry (at most 7 per identity)
//! - `recovery` - Threshold recovery state machine and expiry sweeper
//! - `social` - Follow and connection tiers
//! - `storage` - JSON file repositories and audit log

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod content_store;
pub mod error;
pub mod guardians;
pub mod identity;
pub mod logging;
pub mod models;
pub mod recovery;
pub mod social;
pub mod state;
pub mod storage;
