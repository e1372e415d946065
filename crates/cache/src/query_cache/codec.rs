//! Binary encoding of [`QueryResult`]s.
//!
//! Payloads are a 4 byte header (`QC`, format version, reserved) followed by the bincode
//! encoding of the result with varint integers. Trailing bytes are rejected.

use bincode::Options;
use bytes::Bytes;

use super::QueryResult;
use crate::error::SerializationError;

const MAGIC: [u8; 2] = *b"QC";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 4;

fn options() -> impl Options {
    bincode::DefaultOptions::new().with_varint_encoding().reject_trailing_bytes()
}

pub fn encode(result: &QueryResult) -> Result<Bytes, SerializationError> {
    let mut buf = Vec::with_capacity(HEADER_LEN + 64 * (result.rows.len() + 1));
    buf.extend_from_slice(&MAGIC);
    buf.push(VERSION);
    buf.push(0);
    options().serialize_into(&mut buf, result).map_err(SerializationError::Encode)?;
    Ok(Bytes::from(buf))
}

pub fn decode(data: &[u8]) -> Result<QueryResult, SerializationError> {
    if data.len() < HEADER_LEN || data[..MAGIC.len()] != MAGIC {
        return Err(SerializationError::InvalidHeader);
    }
    if data[2] != VERSION {
        return Err(SerializationError::UnsupportedVersion(data[2]));
    }

    options().deserialize(&data[HEADER_LEN..]).map_err(SerializationError::Decode)
}
