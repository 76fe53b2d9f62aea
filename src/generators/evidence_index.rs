//! Evidence index: a canonical JSON listing of every other pack artifact.
//!
//! The index is pack-independent. It names artifacts by file stem rather
//! than by their pack-specific file name and carries no timestamps, so two
//! packs built from the same rows and filters produce the same index bytes
//! and therefore the same index hash.

use super::{ArtifactFormat, ArtifactKind, GeneratedDocument};
use crate::error::Result;
use crate::integrity::canonicalize_serializable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version tag written into the index document.
pub const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub kind: ArtifactKind,
    #[serde(rename = "type")]
    pub format: ArtifactFormat,
    pub filename_stem: String,
    pub record_count: u64,
    pub hash_sha256: String,
}

#[derive(Debug, Serialize)]
struct IndexDocument<'a> {
    version: u32,
    artifact_count: usize,
    artifacts: &'a [IndexEntry],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EvidenceIndex;

impl EvidenceIndex {
    /// Build the index over already-hashed artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::PackError::Canonical`] if serialization fails.
    pub fn generate(&self, entries: &[IndexEntry]) -> Result<GeneratedDocument> {
        let bytes = canonicalize_serializable(&IndexDocument {
            version: INDEX_VERSION,
            artifact_count: entries.len(),
            artifacts: entries,
        })?;

        Ok(GeneratedDocument {
            kind: ArtifactKind::EvidenceIndex,
            format: ArtifactFormat::Json,
            bytes,
            record_count: entries.len() as u64,
            metrics: BTreeMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::hash_bytes;

    fn entry(kind: ArtifactKind, body: &[u8]) -> IndexEntry {
        IndexEntry {
            kind,
            format: ArtifactFormat::Csv,
            filename_stem: kind.file_stem().to_owned(),
            record_count: 1,
            hash_sha256: hash_bytes(body),
        }
    }

    #[test]
    fn test_index_is_canonical_json() {
        let entries = vec![entry(ArtifactKind::Controls, b"a")];
        let doc = EvidenceIndex.generate(&entries).unwrap();
        let text = String::from_utf8(doc.bytes).unwrap();

        assert!(text.starts_with(r#"{"artifact_count":1,"artifacts":[{"filename_stem":"controls""#));
        assert!(text.contains(r#""type":"csv""#));
        assert_eq!(doc.record_count, 1);
    }

    #[test]
    fn test_index_hash_tracks_artifact_hashes() {
        let a = EvidenceIndex
            .generate(&[entry(ArtifactKind::Controls, b"a")])
            .unwrap();
        let b = EvidenceIndex
            .generate(&[entry(ArtifactKind::Controls, b"b")])
            .unwrap();
        assert_ne!(hash_bytes(&a.bytes), hash_bytes(&b.bytes));
    }
}
