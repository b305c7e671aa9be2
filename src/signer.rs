//! Signing safety gate for arbitrary data.
//!
//! Extended keys of the wallet tree sign two families of payloads:
//! ledger transactions, which already carry their domain separation
//! prefix, and arbitrary application data. The gate in this module
//! keeps the two families disjoint: arbitrary data is refused whenever
//! its bytes (or, for base64 input, its decoded bytes) are prefixed
//! like a consensus object, and must validate against a caller-supplied
//! schema before any signature is produced.

use base64;
use rmp_serde;
use serde_json::Value;

use std::{fmt, result};

use hdwallet::{Signature, XPrv};
use schema::Validator;
use tags::DomainTag;

/// marker for signatures produced over schema-validated data
pub struct Data;
/// marker for signatures produced over prefix-carrying transactions
pub struct Transaction;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// the payload starts with a consensus domain tag and must not be
    /// signed as arbitrary data
    DataIsTransactionLike(DomainTag),
    /// the payload could not be decoded with the declared encoding
    InvalidEncoding,
    /// the decoded payload does not conform to the declared schema
    InvalidSchema,
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &Error::DataIsTransactionLike(tag) => {
                write!(f, "refusing to sign data carrying the consensus prefix {:?}", tag)
            }
            &Error::InvalidEncoding => write!(f, "data does not decode with the declared encoding"),
            &Error::InvalidSchema => write!(f, "decoded data does not conform to the schema"),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

/// declared encoding of a payload handed to [`sign_data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    /// raw bytes
    None,
    /// base64 encoded bytes
    Base64,
    /// a msgpack encoded structure
    Msgpack,
}

/// how a payload is to be decoded and validated before signing
pub struct SignMetadata<'a, V: 'a> {
    pub encoding: Encoding,
    pub schema: &'a V,
}

fn reject_tagged(data: &[u8]) -> Result<()> {
    match DomainTag::matching(data) {
        Some(tag) => Err(Error::DataIsTransactionLike(tag)),
        None => Ok(()),
    }
}

fn bytes_value(bytes: &[u8]) -> Value {
    Value::Array(bytes.iter().map(|b| Value::from(*b)).collect())
}

/// decode a payload to the value form the schema is checked against
///
/// Raw and base64 payloads validate as arrays of byte values, msgpack
/// payloads as the structure they encode. Base64 payloads are checked
/// again for consensus prefixes after decoding.
fn decode(data: &[u8], encoding: Encoding) -> Result<Value> {
    match encoding {
        Encoding::None => Ok(bytes_value(data)),
        Encoding::Base64 => {
            let decoded = base64::decode(data).map_err(|_| Error::InvalidEncoding)?;
            reject_tagged(&decoded)?;
            Ok(bytes_value(&decoded))
        }
        Encoding::Msgpack => rmp_serde::from_slice(data).map_err(|_| Error::InvalidEncoding),
    }
}

/// sign arbitrary data with the given leaf key
///
/// The pipeline is evaluated in order: outer tag rejection, decoding
/// (with inner tag rejection for base64), schema validation, then
/// signing of the bytes exactly as given.
pub fn sign_data<V: Validator>(
    leaf: &XPrv,
    data: &[u8],
    metadata: &SignMetadata<V>,
) -> Result<Signature<Data>> {
    reject_tagged(data)?;
    let decoded = decode(data, metadata.encoding)?;
    if !metadata.schema.validate(&decoded) {
        return Err(Error::InvalidSchema);
    }
    Ok(leaf.sign(data))
}

/// sign a transaction already carrying its domain separation prefix
///
/// The bytes are signed as given; the caller is responsible for the
/// prefix and the encoding of the transaction itself.
pub fn sign_transaction(leaf: &XPrv, prefix_encoded_tx: &[u8]) -> Signature<Transaction> {
    leaf.sign(prefix_encoded_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdwallet::{Seed, XPrv, SEED_SIZE};
    use schema::JsonSchema;
    use tags;

    fn test_key() -> XPrv {
        XPrv::generate_from_seed(&Seed::from_bytes([1u8; SEED_SIZE])).unwrap()
    }

    fn any_bytes_schema() -> JsonSchema {
        JsonSchema::new(json!({ "type": "array", "items": { "type": "integer" } }))
    }

    #[test]
    fn raw_bytes_sign_and_verify() {
        let key = test_key();
        let schema = any_bytes_schema();
        let metadata = SignMetadata {
            encoding: Encoding::None,
            schema: &schema,
        };
        let data = b"challenge response";
        let signature = sign_data(&key, data, &metadata).unwrap();
        assert!(key.public().verify(data, &signature));
    }

    #[test]
    fn outer_tags_are_rejected() {
        let key = test_key();
        let schema = JsonSchema::new(Value::Bool(true));
        let metadata = SignMetadata {
            encoding: Encoding::None,
            schema: &schema,
        };
        for tag in tags::ALL.iter() {
            let mut data = tag.prefix().to_vec();
            data.extend_from_slice(b" payload");
            assert_eq!(
                sign_data(&key, &data, &metadata).unwrap_err(),
                Error::DataIsTransactionLike(*tag)
            );
        }
    }

    #[test]
    fn inner_tags_are_rejected_after_base64_decoding() {
        let key = test_key();
        let schema = JsonSchema::new(Value::Bool(true));
        let metadata = SignMetadata {
            encoding: Encoding::Base64,
            schema: &schema,
        };
        for tag in tags::ALL.iter() {
            let mut inner = tag.prefix().to_vec();
            inner.extend_from_slice(b" payload");
            let data = base64::encode(&inner).into_bytes();
            assert_eq!(
                sign_data(&key, &data, &metadata).unwrap_err(),
                Error::DataIsTransactionLike(*tag)
            );
        }
    }

    #[test]
    fn base64_payload_signs_original_bytes() {
        let key = test_key();
        let schema = JsonSchema::new(json!({
            "type": "array",
            "minItems": 9,
            "maxItems": 9,
            "items": { "type": "integer", "minimum": 0, "maximum": 255 },
        }));
        let metadata = SignMetadata {
            encoding: Encoding::Base64,
            schema: &schema,
        };
        let data = base64::encode(b"challenge").into_bytes();
        let signature = sign_data(&key, &data, &metadata).unwrap();
        // the signature covers the base64 bytes, not the decoded form
        assert!(key.public().verify(&data, &signature));
        assert!(!key.public().verify(b"challenge", &signature));
    }

    #[test]
    fn invalid_base64_is_an_encoding_error() {
        let key = test_key();
        let schema = JsonSchema::new(Value::Bool(true));
        let metadata = SignMetadata {
            encoding: Encoding::Base64,
            schema: &schema,
        };
        assert_eq!(
            sign_data(&key, b"!!! not base64 !!!", &metadata).unwrap_err(),
            Error::InvalidEncoding
        );
    }

    #[test]
    fn msgpack_payload_validates_its_structure() {
        let key = test_key();
        let schema = JsonSchema::new(json!({
            "type": "object",
            "properties": { "challenge": { "type": "string" } },
            "required": ["challenge"],
        }));
        let metadata = SignMetadata {
            encoding: Encoding::Msgpack,
            schema: &schema,
        };
        let payload = rmp_serde::to_vec_named(&json!({ "challenge": "abc" })).unwrap();
        assert!(sign_data(&key, &payload, &metadata).is_ok());

        let wrong = rmp_serde::to_vec_named(&json!({ "other": 1 })).unwrap();
        assert_eq!(sign_data(&key, &wrong, &metadata).unwrap_err(), Error::InvalidSchema);
    }

    #[test]
    fn garbage_msgpack_is_an_encoding_error() {
        let key = test_key();
        let schema = JsonSchema::new(Value::Bool(true));
        let metadata = SignMetadata {
            encoding: Encoding::Msgpack,
            schema: &schema,
        };
        assert_eq!(
            sign_data(&key, &[0xc1, 0xff, 0xff], &metadata).unwrap_err(),
            Error::InvalidEncoding
        );
    }

    #[test]
    fn schema_failures_do_not_sign() {
        let key = test_key();
        let schema = JsonSchema::new(json!({
            "type": "array",
            "maxItems": 4,
        }));
        let metadata = SignMetadata {
            encoding: Encoding::None,
            schema: &schema,
        };
        assert_eq!(
            sign_data(&key, b"way too long", &metadata).unwrap_err(),
            Error::InvalidSchema
        );
    }

    #[test]
    fn transactions_sign_as_given() {
        let key = test_key();
        let tx = b"TX\x81\xa3amt\xcd\x03\xe8";
        let signature = sign_transaction(&key, tx);
        assert!(key.public().verify(tx, &signature));
    }
}
