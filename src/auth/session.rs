// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client-side session: the DID a caller acts as, plus its secret if held.

use crate::identity::{Did, Secret};

use super::signing::{sign, DID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};

/// The identity outbound calls are made under.
///
/// A session without a secret still identifies itself with `X-DID`; the node
/// treats such calls as lower trust rather than failing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    did: Did,
    secret: Option<Secret>,
}

/// Authentication headers for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub did: String,
    pub signature: Option<String>,
    pub timestamp: Option<String>,
}

impl AuthHeaders {
    /// Header name/value pairs in the order they are sent.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![(DID_HEADER, self.did.clone())];
        if let (Some(signature), Some(timestamp)) = (&self.signature, &self.timestamp) {
            pairs.push((SIGNATURE_HEADER, signature.clone()));
            pairs.push((TIMESTAMP_HEADER, timestamp.clone()));
        }
        pairs
    }
}

impl Session {
    pub fn new(did: Did, secret: Option<Secret>) -> Self {
        Self { did, secret }
    }

    /// A session that can only identify itself, not sign.
    pub fn did_only(did: Did) -> Self {
        Self::new(did, None)
    }

    pub fn did(&self) -> &Did {
        &self.did
    }

    pub fn can_sign(&self) -> bool {
        self.secret.is_some()
    }

    /// Build the headers for `method path` at `now_ms`.
    ///
    /// Any query string in `path` is ignored; the node verifies the bare path.
    pub fn authenticate(&self, method: &str, path: &str, now_ms: i64) -> AuthHeaders {
        let path = path.split('?').next().unwrap_or(path);
        match &self.secret {
            Some(secret) => {
                let timestamp = now_ms.to_string();
                AuthHeaders {
                    did: self.did.to_string(),
                    signature: Some(sign(secret, method, path, &timestamp)),
                    timestamp: Some(timestamp),
                }
            }
            None => AuthHeaders {
                did: self.did.to_string(),
                signature: None,
                timestamp: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    #[test]
    fn signing_session_sends_three_headers() {
        let identity = Identity::generate().unwrap();
        let headers = identity.session().authenticate("post", "/api/guardians/add", 1_000);

        assert_eq!(headers.did, identity.did().to_string());
        assert_eq!(headers.timestamp.as_deref(), Some("1000"));
        assert_eq!(
            headers.signature.as_deref(),
            Some(sign(identity.secret(), "POST", "/api/guardians/add", "1000").as_str())
        );
        assert_eq!(headers.pairs().len(), 3);
    }

    #[test]
    fn did_only_session_sends_did() {
        let did = Did::parse("did:key:zOnlyDid").unwrap();
        let session = Session::did_only(did.clone());
        let headers = session.authenticate("GET", "/api/guardians", 1_000);

        assert!(!session.can_sign());
        assert_eq!(headers.pairs(), vec![(DID_HEADER, did.to_string())]);
    }

    #[test]
    fn query_string_is_not_signed() {
        let identity = Identity::generate().unwrap();
        let session = identity.session();
        assert_eq!(
            session.authenticate("GET", "/api/recovery/abc?wait_secs=5", 7),
            session.authenticate("GET", "/api/recovery/abc", 7)
        );
    }
}
