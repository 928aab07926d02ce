// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! RLP bodies carried inside secure envelopes.

use alloy::primitives::Address;
use alloy::rlp::{Decodable, Encodable};

use crate::error::{KeyServiceError, KeyServiceResult};
use crate::storage::codec::{encode_rlp_list, finish_rlp_list, rlp_list_payload};

fn malformed(what: &'static str) -> impl Fn(alloy::rlp::Error) -> KeyServiceError {
    move |e| KeyServiceError::InvalidRequest(format!("malformed {what}: {e}"))
}

/// Register a tenant under the envelope's root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterTenant {
    pub tenant_id: u64,
}

impl RegisterTenant {
    pub fn encode(&self) -> Vec<u8> {
        encode_rlp_list(|out| self.tenant_id.encode(out))
    }

    pub fn decode(bytes: &[u8]) -> KeyServiceResult<Self> {
        let err = malformed("tenant registration");
        let mut buf = bytes;
        let mut payload = rlp_list_payload(&mut buf).map_err(&err)?;
        let tenant_id = u64::decode(&mut payload).map_err(&err)?;
        finish_rlp_list(payload).map_err(&err)?;
        Ok(Self { tenant_id })
    }
}

/// Reply to [`RegisterTenant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantRegistered {
    pub tenant_id: u64,
    pub address: Address,
}

impl TenantRegistered {
    pub fn encode(&self) -> Vec<u8> {
        encode_rlp_list(|out| {
            self.tenant_id.encode(out);
            self.address.encode(out);
        })
    }

    pub fn decode(bytes: &[u8]) -> KeyServiceResult<Self> {
        let err = malformed("registration reply");
        let mut buf = bytes;
        let mut payload = rlp_list_payload(&mut buf).map_err(&err)?;
        let reply = Self {
            tenant_id: u64::decode(&mut payload).map_err(&err)?,
            address: Address::decode(&mut payload).map_err(&err)?,
        };
        finish_rlp_list(payload).map_err(&err)?;
        Ok(reply)
    }
}
