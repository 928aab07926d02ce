// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use alloy::primitives::Address;

use crate::error::{KeyServiceError, KeyServiceResult};
use crate::keys::Registry;
use crate::protocol::{EnvelopePolicy, ServiceIdentity};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub identity: Arc<ServiceIdentity>,
    pub policy: EnvelopePolicy,
    /// Root used by plain routes that do not name one.
    pub default_root: Option<Address>,
    /// Whether the unauthenticated plain routes are mounted.
    pub plain_routes: bool,
}

impl AppState {
    pub fn new(registry: Arc<Registry>, policy: EnvelopePolicy) -> Self {
        Self {
            registry,
            identity: Arc::new(ServiceIdentity::generate()),
            policy,
            default_root: None,
            plain_routes: false,
        }
    }

    pub fn with_default_root(mut self, root: Option<Address>) -> Self {
        self.default_root = root;
        self
    }

    pub fn with_plain_routes(mut self, enabled: bool) -> Self {
        self.plain_routes = enabled;
        self
    }

    /// Pick the requested root, else the configured default, else the only
    /// loaded root.
    pub fn root_for(&self, requested: Option<Address>) -> KeyServiceResult<Address> {
        if let Some(root) = requested.or(self.default_root) {
            return Ok(root);
        }
        match self.registry.roots().as_slice() {
            [only] => Ok(*only),
            [] => Err(KeyServiceError::InvalidRequest("no root wallet loaded".into())),
            _ => Err(KeyServiceError::InvalidRequest(
                "root must be given when several roots are loaded".into(),
            )),
        }
    }
}
