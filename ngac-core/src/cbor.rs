// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encoding of event payloads in [CBOR] format.
//!
//! Policy events are stored in the event log as CBOR bytes. Decoding errors keep the position
//! reported by the parser, so a corrupt record can be located when a replica locks down.
//!
//! [CBOR]: https://cbor.io/
use ciborium::de::Error as DeserializeError;
use ciborium::ser::Error as SerializeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Encodes a payload into CBOR bytes.
pub fn encode_cbor<T: Serialize>(payload: &T) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(payload, &mut bytes)?;
    Ok(bytes)
}

/// Decodes a payload from CBOR bytes.
pub fn decode_cbor<T: for<'a> Deserialize<'a>>(bytes: &[u8]) -> Result<T, DecodeError> {
    Ok(ciborium::from_reader::<T, _>(bytes)?)
}

/// Payload could not be encoded.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Writing into the byte buffer failed.
    #[error("could not write payload bytes: {0}")]
    Io(std::io::Error),

    /// Serde rejected the payload, contains its description of the problem.
    #[error("could not serialize payload: {0}")]
    Value(String),
}

impl From<SerializeError<std::io::Error>> for EncodeError {
    fn from(value: SerializeError<std::io::Error>) -> Self {
        match value {
            SerializeError::Io(err) => EncodeError::Io(err),
            SerializeError::Value(err) => EncodeError::Value(err),
        }
    }
}

/// Payload could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Reading the payload bytes failed.
    #[error("could not read payload bytes: {0}")]
    Io(std::io::Error),

    /// Bytes are not valid CBOR, contains the offset of the first invalid byte.
    #[error("invalid payload bytes at position {0}")]
    Syntax(usize),

    /// Valid CBOR which does not describe the expected type, for example a missing field.
    /// Contains the offset of the offending item if known.
    #[error("unexpected payload value at position {0:?}: {1}")]
    Semantic(Option<usize>, String),

    /// Payload is nested too deeply to be decoded safely.
    #[error("payload nested too deeply")]
    RecursionLimitExceeded,

    /// Payload decoded fine but describes another event than the record claims.
    #[error("record of type {expected} contains {actual} payload")]
    SchemaMismatch { expected: String, actual: String },
}

impl From<DeserializeError<std::io::Error>> for DecodeError {
    fn from(value: DeserializeError<std::io::Error>) -> Self {
        match value {
            DeserializeError::Io(err) => DecodeError::Io(err),
            DeserializeError::Syntax(offset) => DecodeError::Syntax(offset),
            DeserializeError::Semantic(offset, description) => {
                DecodeError::Semantic(offset, description)
            }
            DeserializeError::RecursionLimitExceeded => DecodeError::RecursionLimitExceeded,
        }
    }
}
