// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-side session: `Unauthenticated → Authenticated → Closed`.
//!
//! Transport-agnostic; the caller moves the produced requests and envelopes
//! over whatever channel it uses.

use alloy::primitives::{Address, Bytes};
use k256::ecdsa::{SigningKey, VerifyingKey};

use super::envelope::Envelope;
use super::handshake::{challenge_hash, service_key_from_reply, AuthRequest, AuthResult, SecureRequest};
use crate::crypto::{ecies, pubkey_to_address, sign_hash};
use crate::error::{KeyServiceError, KeyServiceResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Unauthenticated,
    Authenticated { service_key: VerifyingKey },
    Closed,
}

pub struct AdminSession {
    key: SigningKey,
    admin: Address,
    root: Address,
    state: SessionState,
}

impl AdminSession {
    pub fn new(key: SigningKey, root: Address) -> Self {
        let admin = pubkey_to_address(key.verifying_key());
        Self {
            key,
            admin,
            root,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn root(&self) -> Address {
        self.root
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated { .. })
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    fn service_key(&self) -> KeyServiceResult<&VerifyingKey> {
        match &self.state {
            SessionState::Authenticated { service_key } => Ok(service_key),
            SessionState::Unauthenticated => {
                Err(KeyServiceError::InvalidState("session is not authenticated"))
            }
            SessionState::Closed => Err(KeyServiceError::InvalidState("session is closed")),
        }
    }

    /// Sign the challenge for the handshake.
    pub fn auth_request(&self) -> KeyServiceResult<AuthRequest> {
        if self.state != SessionState::Unauthenticated {
            return Err(KeyServiceError::InvalidState("handshake already completed"));
        }
        let hash = challenge_hash();
        let signature = sign_hash(&self.key, &hash)?;
        Ok(AuthRequest {
            hash,
            signature: Bytes::copy_from_slice(&signature),
            root: self.root,
            admin: self.admin,
        })
    }

    /// Accept the handshake reply. The envelope must be signed by the very
    /// key it announces.
    pub fn complete_handshake(&mut self, reply: &Envelope) -> KeyServiceResult<Address> {
        if self.state != SessionState::Unauthenticated {
            return Err(KeyServiceError::InvalidState("handshake already completed"));
        }
        let plaintext = ecies::decrypt(&self.key, &reply.payload)?;
        let service_key = service_key_from_reply(&AuthResult::decode(&plaintext)?)?;
        reply.verify(&service_key)?;

        let service = pubkey_to_address(&service_key);
        self.state = SessionState::Authenticated { service_key };
        Ok(service)
    }

    /// Seal a request body for the service.
    pub fn seal_request(&self, payload: &[u8], now: u64) -> KeyServiceResult<SecureRequest> {
        let envelope = Envelope::seal(&self.key, self.service_key()?, payload, now)?;
        Ok(SecureRequest {
            root: self.root,
            admin: self.admin,
            envelope,
        })
    }

    /// Verify and decrypt a service reply.
    pub fn open_response(&self, reply: &Envelope) -> KeyServiceResult<Vec<u8>> {
        reply.open(&self.key, self.service_key()?)
    }

    /// End the session. Sessions hold no server state, so this is local only.
    pub fn close(&mut self) -> KeyServiceResult<()> {
        if self.state == SessionState::Closed {
            return Err(KeyServiceError::InvalidState("session is closed"));
        }
        self.state = SessionState::Closed;
        Ok(())
    }
}
