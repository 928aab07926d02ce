// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Encrypted Envelope Protocol
//!
//! An admin proves itself by signing a fixed challenge, receives the service
//! session key in an envelope, then wraps every request in an envelope
//! encrypted to that key and signed with its own.
//!
//! - `envelope` - sealed message unit and freshness policy
//! - `handshake` - service side: challenge check, request opening, replies
//! - `session` - admin side state machine
//! - `messages` - RLP request/reply bodies

pub mod envelope;
pub mod handshake;
pub mod messages;
pub mod session;

pub use envelope::{unix_now, Envelope, EnvelopePolicy};
pub use handshake::{
    authenticate, challenge_hash, open_request, seal_response, AuthRequest, OpenedRequest,
    SecureRequest, ServiceIdentity,
};
pub use session::AdminSession;
