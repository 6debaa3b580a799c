//! Sales record carried on the transport.
//!
//! Field names match the wire format published by the generator and ingested
//! by the store, so they keep their Portuguese names.
//!
//! # Example
//!
//! ```rust
//! use sales_pipeline::record::SalesRecord;
//!
//! let json = r#"{"id_venda":"v1","valor_total":150.0,"categoria":"Livros"}"#;
//! let record = SalesRecord::decode(json.as_bytes()).unwrap();
//! assert_eq!(record.id_venda, "v1");
//! assert_eq!(record.categoria.as_deref(), Some("Livros"));
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while decoding a record payload.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The message carried no payload at all.
    #[error("message has no payload")]
    EmptyPayload,

    /// The payload is not a structurally valid sales record.
    #[error("invalid sales record: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// One sale.
///
/// Only `id_venda` and `valor_total` are required; every other attribute is
/// optional so partially populated records still decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    /// Sale identifier.
    pub id_venda: String,

    /// Epoch milliseconds of the sale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    /// ISO-8601 local date-time of the sale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_hora: Option<String>,

    /// Customer identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_cliente: Option<String>,

    /// Customer name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nome_cliente: Option<String>,

    /// Customer e-mail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_cliente: Option<String>,

    /// Product name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produto: Option<String>,

    /// Product category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categoria: Option<String>,

    /// Unit price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preco: Option<f64>,

    /// Units sold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantidade: Option<i32>,

    /// Sale total.
    pub valor_total: f64,

    /// Payment method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forma_pagamento: Option<String>,

    /// Store identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loja: Option<String>,

    /// Store city.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidade: Option<String>,

    /// Store state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estado: Option<String>,
}

impl SalesRecord {
    /// Decodes a record from a raw transport payload.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::EmptyPayload`] for an empty payload and
    /// [`DecodeError::Invalid`] for anything that is not a valid record.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }
        Ok(serde_json::from_slice(payload)?)
    }

    /// Encodes the record as a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns the underlying serializer error.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_record() {
        let json = r#"{
            "id_venda": "0b9e",
            "timestamp": 1718000000000,
            "data_hora": "2024-06-10T09:13:20",
            "id_cliente": "c-1",
            "nome_cliente": "Ana Souza",
            "email_cliente": "ana@example.com",
            "produto": "Notebook",
            "categoria": "Eletrônicos",
            "preco": 2500.5,
            "quantidade": 2,
            "valor_total": 5001.0,
            "forma_pagamento": "PIX",
            "loja": "Campinas-3",
            "cidade": "Campinas",
            "estado": "SP"
        }"#;

        let record = SalesRecord::decode(json.as_bytes()).unwrap();
        assert_eq!(record.id_venda, "0b9e");
        assert_eq!(record.timestamp, Some(1_718_000_000_000));
        assert_eq!(record.quantidade, Some(2));
        assert_eq!(record.valor_total, 5001.0);
        assert_eq!(record.estado.as_deref(), Some("SP"));
    }

    #[test]
    fn test_decode_requires_total() {
        let result = SalesRecord::decode(br#"{"id_venda":"v1"}"#);
        assert!(matches!(result, Err(DecodeError::Invalid(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            SalesRecord::decode(b"not json"),
            Err(DecodeError::Invalid(_))
        ));
        assert!(matches!(
            SalesRecord::decode(b""),
            Err(DecodeError::EmptyPayload)
        ));
    }

    #[test]
    fn test_encode_skips_missing_fields() {
        let record = SalesRecord::decode(br#"{"id_venda":"v1","valor_total":150.0}"#).unwrap();
        let json = String::from_utf8(record.encode().unwrap()).unwrap();
        assert_eq!(json, r#"{"id_venda":"v1","valor_total":150.0}"#);
    }
}
