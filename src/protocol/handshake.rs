// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Server side of the admin handshake and of envelope-wrapped requests.
//!
//! Authentication is stateless: every call proves itself with a signature.
//! The handshake only hands the caller the service's public key; each later
//! request is a fresh envelope signed by the admin and encrypted to that key.

use std::fmt;

use alloy::primitives::{keccak256, Address, Bytes, B256};
use alloy::rlp::{Decodable, Encodable};
use k256::ecdsa::{SigningKey, VerifyingKey};
use k256::elliptic_curve::rand_core::OsRng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::envelope::{Envelope, EnvelopePolicy};
use crate::crypto::{ecies, parse_public_key, public_key_bytes, pubkey_to_address, recover_public_key};
use crate::error::{KeyServiceError, KeyServiceResult};
use crate::keys::Registry;
use crate::storage::codec::{encode_rlp_list, finish_rlp_list, rlp_list_payload};

/// Message every admin signs to open a handshake.
pub const CHALLENGE: &[u8] = b"hello server";

pub fn challenge_hash() -> B256 {
    keccak256(CHALLENGE)
}

/// The service's session key pair. Generated at startup, never persisted.
pub struct ServiceIdentity {
    key: SigningKey,
    address: Address,
}

impl ServiceIdentity {
    pub fn generate() -> Self {
        Self::from_key(SigningKey::random(&mut OsRng))
    }

    pub fn from_key(key: SigningKey) -> Self {
        let address = pubkey_to_address(key.verifying_key());
        Self { key, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn public_key(&self) -> &VerifyingKey {
        self.key.verifying_key()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.key
    }
}

impl fmt::Debug for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceIdentity")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Handshake request: the challenge hash signed by an admin of `root`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    #[schema(value_type = String)]
    pub hash: B256,
    #[schema(value_type = String)]
    pub signature: Bytes,
    #[schema(value_type = String)]
    pub root: Address,
    #[schema(value_type = String)]
    pub admin: Address,
}

/// Handshake reply body, RLP-encoded inside the returned envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    pub service_key: Vec<u8>,
}

impl AuthResult {
    pub fn encode(&self) -> Vec<u8> {
        encode_rlp_list(|out| self.service_key.as_slice().encode(out))
    }

    pub fn decode(bytes: &[u8]) -> KeyServiceResult<Self> {
        let malformed = |_| KeyServiceError::InvalidRequest("malformed handshake reply".into());
        let mut buf = bytes;
        let mut payload = rlp_list_payload(&mut buf).map_err(malformed)?;
        let service_key = Bytes::decode(&mut payload).map_err(malformed)?;
        finish_rlp_list(payload).map_err(malformed)?;
        Ok(Self {
            service_key: service_key.to_vec(),
        })
    }
}

/// An envelope-wrapped admin request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecureRequest {
    #[schema(value_type = String)]
    pub root: Address,
    #[schema(value_type = String)]
    pub admin: Address,
    pub envelope: Envelope,
}

/// A request that passed signature, trust and freshness checks.
pub struct OpenedRequest {
    pub caller: VerifyingKey,
    pub admin: Address,
    pub payload: Vec<u8>,
}

/// Recover the caller and make sure they are the declared, trusted admin.
fn authorize(
    registry: &Registry,
    caller: &VerifyingKey,
    root: Address,
    admin: Address,
) -> KeyServiceResult<()> {
    if pubkey_to_address(caller) != admin {
        return Err(KeyServiceError::BadSignature);
    }
    if !registry.is_trusted_admin(root, &admin)? {
        tracing::warn!(root = %root, admin = %admin, "Untrusted admin rejected");
        return Err(KeyServiceError::BadSignature);
    }
    Ok(())
}

/// Handle a handshake: verify the challenge signature and return the service
/// public key sealed to the caller.
pub fn authenticate(
    registry: &Registry,
    identity: &ServiceIdentity,
    request: &AuthRequest,
    now: u64,
) -> KeyServiceResult<Envelope> {
    if request.hash != challenge_hash() {
        return Err(KeyServiceError::BadSignature);
    }
    let caller = recover_public_key(&request.hash, &request.signature)
        .map_err(|_| KeyServiceError::BadSignature)?;
    authorize(registry, &caller, request.root, request.admin)?;

    let reply = AuthResult {
        service_key: public_key_bytes(identity.public_key()).to_vec(),
    };
    Envelope::seal(identity.signing_key(), &caller, &reply.encode(), now)
}

/// Verify and decrypt an inbound secure request.
pub fn open_request(
    registry: &Registry,
    identity: &ServiceIdentity,
    policy: &EnvelopePolicy,
    request: &SecureRequest,
    now: u64,
) -> KeyServiceResult<OpenedRequest> {
    let caller = request.envelope.recover_sender()?;
    authorize(registry, &caller, request.root, request.admin)?;
    policy.check(request.envelope.created_at, now)?;

    let payload = ecies::decrypt(identity.signing_key(), &request.envelope.payload)?;
    Ok(OpenedRequest {
        caller,
        admin: request.admin,
        payload,
    })
}

/// Seal a reply to the caller of an opened request.
pub fn seal_response(
    identity: &ServiceIdentity,
    request: &OpenedRequest,
    payload: &[u8],
    now: u64,
) -> KeyServiceResult<Envelope> {
    Envelope::seal(identity.signing_key(), &request.caller, payload, now)
}

/// Parse the service key out of a handshake reply.
pub fn service_key_from_reply(reply: &AuthResult) -> KeyServiceResult<VerifyingKey> {
    Ok(parse_public_key(&reply.service_key)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RootConfig;
    use crate::crypto::sign_hash;
    use crate::keys::MasterKey;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    struct Fixture {
        registry: Registry,
        identity: ServiceIdentity,
        root: Address,
        admin_key: SigningKey,
    }

    fn fixture() -> Fixture {
        let master = MasterKey::new(SigningKey::from_slice(&[0x31; 32]).unwrap());
        let root = master.address();
        let admin_key = SigningKey::random(&mut OsRng);
        let config = RootConfig {
            root,
            admins: vec![pubkey_to_address(admin_key.verifying_key())],
        };
        let registry =
            Registry::initialize(&[master], &[config], Arc::new(MemoryStore::new())).unwrap();
        Fixture {
            registry,
            identity: ServiceIdentity::generate(),
            root,
            admin_key,
        }
    }

    fn auth_request(fx: &Fixture, key: &SigningKey) -> AuthRequest {
        let hash = challenge_hash();
        AuthRequest {
            hash,
            signature: Bytes::copy_from_slice(&sign_hash(key, &hash).unwrap()),
            root: fx.root,
            admin: pubkey_to_address(key.verifying_key()),
        }
    }

    #[test]
    fn handshake_returns_service_key_to_admin() {
        let fx = fixture();
        let envelope =
            authenticate(&fx.registry, &fx.identity, &auth_request(&fx, &fx.admin_key), 100)
                .unwrap();

        assert_eq!(envelope.recover_sender().unwrap(), *fx.identity.public_key());
        let plaintext = envelope
            .open(&fx.admin_key, fx.identity.public_key())
            .unwrap();
        let reply = AuthResult::decode(&plaintext).unwrap();
        assert_eq!(
            service_key_from_reply(&reply).unwrap(),
            *fx.identity.public_key()
        );
    }

    #[test]
    fn untrusted_or_mismatched_admin_is_rejected() {
        let fx = fixture();
        let stranger = SigningKey::random(&mut OsRng);
        assert!(matches!(
            authenticate(&fx.registry, &fx.identity, &auth_request(&fx, &stranger), 100),
            Err(KeyServiceError::BadSignature)
        ));

        // Signed by a stranger but claiming to be the trusted admin
        let mut spoofed = auth_request(&fx, &stranger);
        spoofed.admin = pubkey_to_address(fx.admin_key.verifying_key());
        assert!(matches!(
            authenticate(&fx.registry, &fx.identity, &spoofed, 100),
            Err(KeyServiceError::BadSignature)
        ));

        let mut wrong_hash = auth_request(&fx, &fx.admin_key);
        wrong_hash.hash = keccak256(b"hello client");
        assert!(authenticate(&fx.registry, &fx.identity, &wrong_hash, 100).is_err());
    }

    #[test]
    fn unknown_root_surfaces() {
        let fx = fixture();
        let mut request = auth_request(&fx, &fx.admin_key);
        request.root = Address::repeat_byte(0x99);
        assert!(matches!(
            authenticate(&fx.registry, &fx.identity, &request, 100),
            Err(KeyServiceError::UnknownRoot(_))
        ));
    }

    #[test]
    fn secure_request_round_trip() {
        let fx = fixture();
        let envelope =
            Envelope::seal(&fx.admin_key, fx.identity.public_key(), b"ping", 1_000).unwrap();
        let request = SecureRequest {
            root: fx.root,
            admin: pubkey_to_address(fx.admin_key.verifying_key()),
            envelope,
        };

        let opened = open_request(
            &fx.registry,
            &fx.identity,
            &EnvelopePolicy::default(),
            &request,
            1_010,
        )
        .unwrap();
        assert_eq!(opened.payload, b"ping");

        let reply = seal_response(&fx.identity, &opened, b"pong", 1_011).unwrap();
        assert_eq!(
            reply.open(&fx.admin_key, fx.identity.public_key()).unwrap(),
            b"pong"
        );
    }

    #[test]
    fn stale_secure_request_is_rejected() {
        let fx = fixture();
        let envelope =
            Envelope::seal(&fx.admin_key, fx.identity.public_key(), b"ping", 1_000).unwrap();
        let request = SecureRequest {
            root: fx.root,
            admin: pubkey_to_address(fx.admin_key.verifying_key()),
            envelope,
        };
        assert!(matches!(
            open_request(
                &fx.registry,
                &fx.identity,
                &EnvelopePolicy::default(),
                &request,
                2_000
            ),
            Err(KeyServiceError::StaleEnvelope)
        ));
        assert!(open_request(
            &fx.registry,
            &fx.identity,
            &EnvelopePolicy::disabled(),
            &request,
            2_000
        )
        .is_ok());
    }

    #[test]
    fn secure_request_for_other_service_key_fails_decrypt() {
        let fx = fixture();
        let other = ServiceIdentity::generate();
        let envelope =
            Envelope::seal(&fx.admin_key, other.public_key(), b"ping", 1_000).unwrap();
        let request = SecureRequest {
            root: fx.root,
            admin: pubkey_to_address(fx.admin_key.verifying_key()),
            envelope,
        };
        assert!(matches!(
            open_request(
                &fx.registry,
                &fx.identity,
                &EnvelopePolicy::default(),
                &request,
                1_000
            ),
            Err(KeyServiceError::DecryptFailed)
        ));
    }
}
