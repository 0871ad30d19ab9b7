//! Byte-shape helpers for the persisted queue entry record.
//!
//! Durable backends persist entries with bincode; the encoded shape must
//! round-trip exactly across a process restart.

use courier_common::QueueEntry;

use crate::error::{Result, SerializationError};

/// Encode an entry into its durable byte representation.
///
/// # Errors
/// Returns an error if bincode encoding fails.
pub fn encode(entry: &QueueEntry) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(entry, bincode::config::standard())
        .map_err(|e| SerializationError::from(e).into())
}

/// Decode an entry from its durable byte representation.
///
/// # Errors
/// Returns an error if the bytes do not decode cleanly, or if trailing
/// garbage follows the record.
pub fn decode(bytes: &[u8]) -> Result<QueueEntry> {
    let (entry, consumed): (QueueEntry, usize) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(SerializationError::from)?;

    if consumed != bytes.len() {
        return Err(SerializationError::Corrupted(format!(
            "{} trailing bytes after record",
            bytes.len() - consumed
        ))
        .into());
    }

    Ok(entry)
}
