// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Every registration, handshake and signing call produces one event on the
//! `audit` tracing target. Events never carry key material or decrypted
//! payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Tracing target for audit events.
pub const AUDIT_TARGET: &str = "audit";

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Tenant events
    TenantRegistered,

    // Signing events
    TransactionSigned,

    // Auth events
    AuthSuccess,
    AuthFailure,

    // Lifecycle events
    ServiceStarted,
    RegistryFlushed,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// Admin address or `plain` for unauthenticated routes.
    pub actor: Option<String>,
    /// Root wallet the event concerns.
    pub root: Option<String>,
    pub tenant_id: Option<u64>,
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    pub success: bool,
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            actor: None,
            root: None,
            tenant_id: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_actor(mut self, actor: impl ToString) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    pub fn with_root(mut self, root: impl ToString) -> Self {
        self.root = Some(root.to_string());
        self
    }

    pub fn with_tenant(mut self, tenant_id: u64) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    /// Record the outcome of `result`, keeping it intact for the caller.
    pub fn outcome<T, E: std::fmt::Display>(self, result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => self,
            Err(e) => self.failed(e.to_string()),
        }
    }

    /// Emit as a JSON line on the audit target.
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) if self.success => {
                tracing::info!(target: AUDIT_TARGET, event_type = ?self.event_type, "{json}")
            }
            Ok(json) => {
                tracing::warn!(target: AUDIT_TARGET, event_type = ?self.event_type, "{json}")
            }
            Err(e) => tracing::error!(error = %e, "Failed to serialize audit event"),
        }
    }
}
