//! Integrity primitives for proof packs.
//!
//! Every artifact placed in a pack carries a SHA-256 hash computed over the
//! exact bytes that end up in the archive. This module provides the pieces
//! that produce and check those hashes:
//!
//! - [`canonical`]: deterministic JSON serialization and SHA-256 hex digests
//! - [`hasher`]: streaming hash of files persisted by the ledger store
//! - [`verifier`]: re-hashing of stored packs, runs, and downloaded archives
//!
//! ## Hash Format
//!
//! Hashes are always rendered as 64 lowercase hexadecimal characters. Use
//! [`canonical::is_sha256_hex`] to validate hashes coming from outside.
//!
//! ## Edge Cases & Limitations
//!
//! - **Byte sensitivity**: artifact hashes cover raw bytes, so re-encoding a
//!   CSV (line endings, BOM) after download fails verification
//! - **Manifest**: the manifest is never part of its own hash domain; the
//!   evidence index artifact is the hashed summary of a pack

pub mod canonical;
pub mod hasher;
pub mod verifier;

pub use canonical::{canonicalize, canonicalize_serializable, hash_bytes, hash_value, is_sha256_hex};
pub use hasher::compute_file_hash;
pub use verifier::{ArtifactCheck, VerificationReport, verify_archive_bytes, verify_pack, verify_run};
