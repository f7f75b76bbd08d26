//! Reply framing on the worker's stdout.
//!
//! A frame is the CBOR-encoded [`Reply`], then its length as a little-endian
//! `u64`, then [`MAGIC`]. The frame is the last thing the worker writes, so
//! anything the job printed before it can be told apart and skipped.
use std::io::{self, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Stage;

pub(crate) const MAGIC: &[u8; 8] = b"DEFERRAL";

const TRAILER_LEN: usize = 16;

/// What a worker sends back.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) enum Reply<T, E> {
    Ok(T),
    Err(E),
    Panic(String),
    Transfer { stage: Stage, message: String },
}

impl<T, E> Reply<T, E> {
    /// What a failure to encode this reply is reported as.
    pub(crate) fn stage(&self) -> Stage {
        match self {
            Reply::Ok(_) => Stage::Result,
            Reply::Err(_) | Reply::Panic(_) => Stage::Error,
            Reply::Transfer { stage, .. } => *stage,
        }
    }
}

pub(crate) fn encode<V: Serialize>(value: &V) -> Result<Vec<u8>, String> {
    let mut buffer = Vec::new();
    ciborium::into_writer(value, &mut buffer).map_err(|err| err.to_string())?;
    Ok(buffer)
}

pub(crate) fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<V, String> {
    ciborium::from_reader(bytes).map_err(|err| err.to_string())
}

pub(crate) fn write_frame<W: Write>(mut out: W, payload: &[u8]) -> io::Result<()> {
    out.write_all(payload)?;
    out.write_all(&(payload.len() as u64).to_le_bytes())?;
    out.write_all(MAGIC)?;
    out.flush()
}

/// Splits captured stdout into `(stray, payload)`, or `None` if it doesn't
/// end with a well-formed frame.
pub(crate) fn split_frame(stdout: &[u8]) -> Option<(&[u8], &[u8])> {
    let body_end = stdout.len().checked_sub(TRAILER_LEN)?;
    let (body, trailer) = stdout.split_at(body_end);
    let (len, magic) = trailer.split_at(8);

    if magic != MAGIC {
        return None;
    }

    let len = u64::from_le_bytes(len.try_into().ok()?);
    let start = body.len().checked_sub(usize::try_from(len).ok()?)?;

    Some(body.split_at(start))
}
