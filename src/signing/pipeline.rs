// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tenant transaction signing with an optional fee-payer co-signature.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rlp::{Decodable, Encodable};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::transaction::{
    decode_optional_address, encode_optional_address, PayerTransaction, MAX_CHAIN_ID,
};
use crate::error::{KeyServiceError, KeyServiceResult};
use crate::keys::Registry;
use crate::storage::codec::{encode_rlp_list, finish_rlp_list, rlp_list_payload};

/// Caller-supplied transaction parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TxParams {
    pub nonce: u64,
    /// Recipient; omitted for contract creation.
    #[schema(value_type = Option<String>)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[schema(value_type = String)]
    pub value: U256,
    #[schema(value_type = String)]
    pub gas_price: U256,
    pub gas_limit: u64,
    pub chain_id: u64,
    #[schema(value_type = String)]
    #[serde(default)]
    pub input: Bytes,
    #[schema(value_type = Option<String>)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<U256>,
    /// Fee payer whose master key co-signs.
    #[schema(value_type = Option<String>)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<Address>,
}

impl TxParams {
    fn to_transaction(&self) -> PayerTransaction {
        PayerTransaction {
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: self.to,
            value: self.value,
            input: self.input.clone(),
            payer: self.payer,
            fee: self.fee.unwrap_or_default(),
            signature: None,
            payer_signature: None,
        }
    }
}

/// A tenant signing request as carried inside a secure envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    pub tenant_id: u64,
    pub params: TxParams,
}

impl SignRequest {
    pub fn encode(&self) -> Vec<u8> {
        let p = &self.params;
        encode_rlp_list(|out| {
            self.tenant_id.encode(out);
            p.nonce.encode(out);
            encode_optional_address(&p.to, out);
            p.value.encode(out);
            p.gas_price.encode(out);
            p.gas_limit.encode(out);
            p.chain_id.encode(out);
            p.input.encode(out);
            p.fee.unwrap_or_default().encode(out);
            encode_optional_address(&p.payer, out);
        })
    }

    /// Absent `to` and `payer` travel as empty strings; a zero `fee` decodes
    /// as absent.
    pub fn decode(bytes: &[u8]) -> KeyServiceResult<Self> {
        let malformed =
            |e: alloy::rlp::Error| KeyServiceError::InvalidRequest(format!("malformed sign request: {e}"));
        let mut buf = bytes;
        let mut payload = rlp_list_payload(&mut buf).map_err(malformed)?;
        let p = &mut payload;

        let tenant_id = u64::decode(p).map_err(malformed)?;
        let params = TxParams {
            nonce: u64::decode(p).map_err(malformed)?,
            to: decode_optional_address(p).map_err(malformed)?,
            value: U256::decode(p).map_err(malformed)?,
            gas_price: U256::decode(p).map_err(malformed)?,
            gas_limit: u64::decode(p).map_err(malformed)?,
            chain_id: u64::decode(p).map_err(malformed)?,
            input: Bytes::decode(p).map_err(malformed)?,
            fee: Some(U256::decode(p).map_err(malformed)?).filter(|f| !f.is_zero()),
            payer: decode_optional_address(p).map_err(malformed)?,
        };
        finish_rlp_list(payload).map_err(malformed)?;
        Ok(Self { tenant_id, params })
    }
}

/// Output of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    /// RLP wire bytes.
    #[schema(value_type = String)]
    pub raw: Bytes,
    #[schema(value_type = String)]
    pub hash: B256,
    #[schema(value_type = String)]
    pub from: Address,
    #[schema(value_type = Option<String>)]
    pub payer: Option<Address>,
    #[schema(value_type = String)]
    pub cost: U256,
}

/// Sign `params` for a tenant, deriving the tenant on first use.
///
/// The chain id and payer are checked before the tenant is touched, so a
/// rejected request has no side effects and never yields a half-signed
/// transaction.
pub fn sign_for_tenant(
    registry: &Registry,
    root: Address,
    tenant_id: u64,
    params: &TxParams,
) -> KeyServiceResult<SignedTransaction> {
    if params.chain_id > MAX_CHAIN_ID {
        return Err(KeyServiceError::InvalidRequest(format!(
            "chain id {} is out of range",
            params.chain_id
        )));
    }
    if let Some(payer) = params.payer {
        if !registry.has_payer(&payer) {
            return Err(KeyServiceError::UnknownPayer(payer));
        }
    }

    let mut tx = params.to_transaction();
    let from = registry.with_tenant_key(root, tenant_id, |info, key| {
        tx.sign(key, params.chain_id).map(|_| info.address)
    })??;

    if let Some(payer) = params.payer {
        registry.with_payer_key(payer, |key| tx.sign_as_payer(key, params.chain_id))??;
    }

    let raw = tx.encode();
    tracing::info!(
        root = %root,
        tenant_id,
        from = %from,
        payer = ?params.payer,
        chain_id = params.chain_id,
        nonce = params.nonce,
        "Transaction signed"
    );

    Ok(SignedTransaction {
        hash: alloy::primitives::keccak256(&raw),
        raw: raw.into(),
        from,
        payer: params.payer,
        cost: tx.cost(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RootConfig;
    use crate::keys::MasterKey;
    use crate::storage::MemoryStore;
    use alloy::rlp::BufMut;
    use k256::ecdsa::SigningKey;
    use std::sync::Arc;

    struct Fixture {
        registry: Registry,
        root: Address,
        payer: Address,
    }

    fn fixture() -> Fixture {
        let root_key = MasterKey::new(SigningKey::from_slice(&[0x51; 32]).unwrap());
        let payer_key = MasterKey::new(SigningKey::from_slice(&[0x52; 32]).unwrap());
        let (root, payer) = (root_key.address(), payer_key.address());
        let registry = Registry::initialize(
            &[root_key, payer_key],
            &[RootConfig {
                root,
                admins: vec![],
            }],
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        Fixture {
            registry,
            root,
            payer,
        }
    }

    fn params() -> TxParams {
        TxParams {
            nonce: 0,
            to: Some(Address::repeat_byte(0x35)),
            value: U256::from(1000),
            gas_price: U256::from(100),
            gas_limit: 1000,
            chain_id: 1,
            input: Bytes::new(),
            fee: Some(U256::from(50)),
            payer: None,
        }
    }

    #[test]
    fn tenant_signature_recovers_to_tenant() {
        let fx = fixture();
        let signed = sign_for_tenant(&fx.registry, fx.root, 42, &params()).unwrap();

        let tenant = fx.registry.resolve(fx.root, 42).unwrap().unwrap();
        let tx = PayerTransaction::decode(&signed.raw).unwrap();
        assert_eq!(tx.recover_sender().unwrap(), tenant.address);
        assert_eq!(signed.from, tenant.address);
        assert_eq!(tx.payer_signature, None);
        assert_eq!(signed.cost, U256::from(101_050));
    }

    #[test]
    fn dual_signature_recovers_to_tenant_and_payer() {
        let fx = fixture();
        let request = TxParams {
            payer: Some(fx.payer),
            chain_id: 1337,
            ..params()
        };
        let signed = sign_for_tenant(&fx.registry, fx.root, 18682003824, &request).unwrap();

        let tx = PayerTransaction::decode(&signed.raw).unwrap();
        assert_eq!(tx.recover_sender().unwrap(), signed.from);
        assert_eq!(tx.recover_payer().unwrap(), fx.payer);
        assert_eq!(tx.fee, U256::from(50));
        assert_eq!(signed.hash, tx.hash());
    }

    #[test]
    fn unknown_payer_signs_nothing() {
        let fx = fixture();
        let stranger = Address::repeat_byte(0x77);
        let request = TxParams {
            payer: Some(stranger),
            ..params()
        };
        assert!(matches!(
            sign_for_tenant(&fx.registry, fx.root, 7, &request),
            Err(KeyServiceError::UnknownPayer(addr)) if addr == stranger
        ));
        assert_eq!(fx.registry.resolve(fx.root, 7).unwrap(), None);
        assert_eq!(fx.registry.derivations(), 0);
    }

    #[test]
    fn unknown_root_is_rejected() {
        let fx = fixture();
        assert!(matches!(
            sign_for_tenant(&fx.registry, Address::repeat_byte(0x01), 7, &params()),
            Err(KeyServiceError::UnknownRoot(_))
        ));
    }

    #[test]
    fn sign_request_body_decodes() {
        let request = SignRequest {
            tenant_id: 18682003824,
            params: TxParams {
                payer: Some(Address::repeat_byte(0x52)),
                input: Bytes::from_static(b"\x01\x02"),
                ..params()
            },
        };
        assert_eq!(SignRequest::decode(&request.encode()).unwrap(), request);

        let creation = SignRequest {
            tenant_id: 1,
            params: TxParams {
                to: None,
                fee: None,
                ..params()
            },
        };
        assert_eq!(SignRequest::decode(&creation.encode()).unwrap(), creation);
    }

    #[test]
    fn zero_recipient_is_not_contract_creation() {
        let request = SignRequest {
            tenant_id: 3,
            params: TxParams {
                to: Some(Address::ZERO),
                payer: Some(Address::ZERO),
                ..params()
            },
        };
        let decoded = SignRequest::decode(&request.encode()).unwrap();
        assert_eq!(decoded.params.to, Some(Address::ZERO));
        assert_eq!(decoded.params.payer, Some(Address::ZERO));
    }

    #[test]
    fn sign_request_rejects_trailing_fields() {
        let request = SignRequest {
            tenant_id: 3,
            params: params(),
        };
        let encoded = request.encode();
        let mut buf = encoded.as_slice();
        let body = rlp_list_payload(&mut buf).unwrap();
        let padded = encode_rlp_list(|out| {
            out.put_slice(body);
            7u64.encode(out);
        });
        assert!(matches!(
            SignRequest::decode(&padded),
            Err(KeyServiceError::InvalidRequest(_))
        ));
    }

    #[test]
    fn out_of_range_chain_id_is_refused_before_derivation() {
        let fx = fixture();
        let request = TxParams {
            chain_id: u64::MAX,
            ..params()
        };
        assert!(matches!(
            sign_for_tenant(&fx.registry, fx.root, 11, &request),
            Err(KeyServiceError::InvalidRequest(_))
        ));
        assert_eq!(fx.registry.derivations(), 0);
        assert_eq!(fx.registry.resolve(fx.root, 11).unwrap(), None);
    }

    #[test]
    fn params_accept_json_hex_quantities() {
        let json = serde_json::json!({
            "nonce": 1,
            "to": "0x3535353535353535353535353535353535353535",
            "value": "0x3e8",
            "gasPrice": "0x64",
            "gasLimit": 1000,
            "chainId": 1
        });
        let parsed: TxParams = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.value, U256::from(1000));
        assert_eq!(parsed.gas_price, U256::from(100));
        assert_eq!(parsed.payer, None);
        assert!(parsed.input.is_empty());
    }
}
