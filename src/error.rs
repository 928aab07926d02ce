// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Service error taxonomy and its HTTP mapping.

use alloy::primitives::Address;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::crypto::CryptoError;
use crate::storage::StorageError;

/// Errors surfaced by the key service core.
///
/// Lookup and validation failures carry their detail. Cryptographic failures
/// (`BadSignature`, `DecryptFailed`) never echo internal state.
#[derive(Debug, thiserror::Error)]
pub enum KeyServiceError {
    #[error("invalid tenant identifier: {0}")]
    InvalidIdentifier(String),

    #[error("unknown root wallet {0}")]
    UnknownRoot(Address),

    #[error("no signing key held for fee payer {0}")]
    UnknownPayer(Address),

    #[error("bad signature")]
    BadSignature,

    #[error("decryption failed")]
    DecryptFailed,

    #[error("envelope timestamp outside the accepted window")]
    StaleEnvelope,

    #[error("key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid session state: {0}")]
    InvalidState(&'static str),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl KeyServiceError {
    /// Stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            KeyServiceError::InvalidIdentifier(_) => "invalid_identifier",
            KeyServiceError::UnknownRoot(_) => "unknown_root",
            KeyServiceError::UnknownPayer(_) => "unknown_payer",
            KeyServiceError::BadSignature => "bad_signature",
            KeyServiceError::DecryptFailed => "decrypt_failed",
            KeyServiceError::StaleEnvelope => "stale_envelope",
            KeyServiceError::DerivationFailed(_) => "derivation_failed",
            KeyServiceError::InvalidRequest(_) => "invalid_request",
            KeyServiceError::InvalidState(_) => "invalid_state",
            KeyServiceError::Storage(_) => "storage_error",
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            KeyServiceError::InvalidIdentifier(_) | KeyServiceError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            KeyServiceError::UnknownRoot(_) | KeyServiceError::UnknownPayer(_) => {
                StatusCode::NOT_FOUND
            }
            KeyServiceError::BadSignature
            | KeyServiceError::DecryptFailed
            | KeyServiceError::StaleEnvelope => StatusCode::UNAUTHORIZED,
            KeyServiceError::DerivationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            KeyServiceError::InvalidState(_) => StatusCode::CONFLICT,
            KeyServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CryptoError> for KeyServiceError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Decrypt => KeyServiceError::DecryptFailed,
            CryptoError::InvalidKey(_) | CryptoError::InvalidSignature => {
                KeyServiceError::BadSignature
            }
            CryptoError::InvalidChainId(chain_id) => {
                KeyServiceError::InvalidRequest(format!("chain id {chain_id} is out of range"))
            }
            CryptoError::Encrypt | CryptoError::Signing => {
                KeyServiceError::InvalidRequest("cryptographic operation failed".to_string())
            }
        }
    }
}

pub type KeyServiceResult<T> = Result<T, KeyServiceError>;

// =============================================================================
// HTTP error body
// =============================================================================

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl From<KeyServiceError> for ApiError {
    fn from(err: KeyServiceError) -> Self {
        let message = match &err {
            KeyServiceError::Storage(inner) => {
                tracing::error!(error = %inner, "Storage failure while serving request");
                "storage failure".to_string()
            }
            other => other.to_string(),
        };
        Self::new(err.status_code(), err.error_code(), message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code,
        });
        (self.status, body).into_response()
    }
}
