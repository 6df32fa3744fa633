// crates/responder-core/src/core/hashing.rs
// ============================================================================
// Module: Responder Hashing
// Description: Canonical JSON hashing primitives for audit chains and snapshots.
// Purpose: Provide deterministic, byte-stable digests for tamper evidence.
// Dependencies: serde, serde_jcs, serde_json, sha2
// ============================================================================

//! ## Overview
//! Responder hashes canonical JSON bytes so digests are byte-stable across
//! serialize/deserialize round-trips. The audit chain digest concatenates the
//! previous hash, event type, execution identifier, details JSON, and
//! timestamp with a `|` delimiter before hashing, so any mutation of a stored
//! row breaks every subsequent link.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Hash Algorithm
// ============================================================================

/// Hash algorithms supported by Responder stores and audit chains.
///
/// # Invariants
/// - Labels are stable for persistence and verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-256 (the only algorithm currently deployed).
    Sha256,
}

impl HashAlgorithm {
    /// Returns the stable label stored alongside digests.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }
}

/// Default hash algorithm for new digests.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

/// Hash digest with its algorithm label.
///
/// # Invariants
/// - `value` is lowercase hex of the digest bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashDigest {
    /// Algorithm used to compute the digest.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest value.
    pub value: String,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced by canonical hashing helpers.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum HashingError {
    /// Canonical JSON serialization failed.
    #[error("canonical json serialization failed: {0}")]
    Canonicalize(String),
}

// ============================================================================
// SECTION: Hash Functions
// ============================================================================

/// Hashes raw bytes with the given algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            let value = hex_encode(&hasher.finalize());
            HashDigest {
                algorithm,
                value,
            }
        }
    }
}

/// Serializes a value to canonical (JCS) JSON bytes.
///
/// # Errors
///
/// Returns [`HashingError`] when the value cannot be serialized.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, HashingError> {
    serde_jcs::to_vec(value).map_err(|err| HashingError::Canonicalize(err.to_string()))
}

/// Hashes a value's canonical JSON form.
///
/// # Errors
///
/// Returns [`HashingError`] when the value cannot be serialized.
pub fn hash_canonical_json<T: Serialize>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashingError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

/// Computes the audit chain digest for one entry.
///
/// The preimage is `prev_hash|event_type|execution_id|details_json|timestamp`
/// where `prev_hash` is empty for the first entry of an execution.
#[must_use]
pub fn audit_entry_hash(
    prev_hash: &str,
    event_type: &str,
    execution_id: &str,
    details_json: &str,
    timestamp: &str,
) -> String {
    let preimage = format!("{prev_hash}|{event_type}|{execution_id}|{details_json}|{timestamp}");
    hash_bytes(DEFAULT_HASH_ALGORITHM, preimage.as_bytes()).value
}

/// Encodes bytes as lowercase hex.
fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
