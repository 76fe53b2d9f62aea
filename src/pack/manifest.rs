//! Pack manifest: the JSON index of every artifact in a pack.
//!
//! The manifest records, per artifact, the exact byte length and SHA-256 of
//! the bytes that go into the archive, plus a summary whose totals equal the
//! record counts of the controls and attestations exports. The manifest is
//! never listed in its own `contents` and never hashes itself.

use super::request::{PackFilters, PackRequest, TimeRange};
use crate::error::{PackError, Result};
use crate::generators::{
    ArtifactFormat, ArtifactKind, EvidenceIndex, GeneratedDocument, IndexEntry,
};
use crate::integrity::{hash_bytes, is_sha256_hex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Archive entry name of the manifest for `pack_id`.
pub fn manifest_filename(pack_id: &str) -> String {
    format!("manifest_{pack_id}.json")
}

/// Archive entry name of an artifact, e.g. `controls_<packId>.csv`.
pub fn artifact_filename(kind: ArtifactKind, format: ArtifactFormat, pack_id: &str) -> String {
    format!("{}_{pack_id}.{}", kind.file_stem(), format.extension())
}

/// One line of the manifest's `contents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub filename: String,
    #[serde(rename = "type")]
    pub format: ArtifactFormat,
    pub kind: ArtifactKind,
    pub record_count: u64,
    pub byte_length: u64,
    pub hash_sha256: String,
}

impl ArtifactDescriptor {
    /// Describe finalized bytes. The hash is taken over exactly `bytes`.
    pub fn describe(
        filename: impl Into<String>,
        kind: ArtifactKind,
        format: ArtifactFormat,
        record_count: u64,
        bytes: &[u8],
    ) -> Self {
        Self {
            filename: filename.into(),
            format,
            kind,
            record_count,
            byte_length: bytes.len() as u64,
            hash_sha256: hash_bytes(bytes),
        }
    }

    /// True when `bytes` are the bytes this descriptor was made from.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        self.byte_length == bytes.len() as u64 && self.hash_sha256 == hash_bytes(bytes)
    }
}

/// A described artifact together with its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackArtifact {
    pub descriptor: ArtifactDescriptor,
    pub bytes: Vec<u8>,
}

/// Aggregate KPIs over the exported rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackSummary {
    pub total_controls: u64,
    pub total_attestations: u64,
    pub controls_completed: u64,
    pub controls_overdue: u64,
    pub controls_high_severity: u64,
    pub attestations_signed: u64,
    pub attestations_pending: u64,
}

impl PackSummary {
    /// Aggregate from the controls and attestations exports.
    pub fn from_documents(documents: &[GeneratedDocument]) -> Self {
        let mut summary = Self::default();
        for doc in documents {
            match doc.kind {
                ArtifactKind::Controls => {
                    summary.total_controls = doc.record_count;
                    summary.controls_completed = doc.metric("completed");
                    summary.controls_overdue = doc.metric("overdue");
                    summary.controls_high_severity = doc.metric("high_severity");
                }
                ArtifactKind::Attestations => {
                    summary.total_attestations = doc.record_count;
                    summary.attestations_signed = doc.metric("signed");
                    summary.attestations_pending = doc.metric("pending");
                }
                ArtifactKind::ComplianceReport
                | ArtifactKind::EvidenceIndex
                | ArtifactKind::Attachment => {}
            }
        }
        summary
    }
}

/// The pack manifest. Field names and order are part of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackManifest {
    pub pack_id: String,
    pub generated_at: DateTime<Utc>,
    pub generated_by: String,
    pub generated_by_role: String,
    pub generated_by_user_id: String,
    pub organization: String,
    pub organization_id: String,
    pub time_range: TimeRange,
    pub filters: PackFilters,
    pub contents: Vec<ArtifactDescriptor>,
    pub summary: PackSummary,
}

impl PackManifest {
    pub fn filename(&self) -> String {
        manifest_filename(&self.pack_id)
    }

    /// Pretty JSON as stored in the archive.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Parse a manifest read back from an archive.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Archive`] if the bytes are not a manifest.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| PackError::Archive(format!("manifest is not well-formed: {e}")))
    }

    pub fn find(&self, kind: ArtifactKind) -> Option<&ArtifactDescriptor> {
        self.contents.iter().find(|c| c.kind == kind)
    }

    /// Check the manifest's structural guarantees.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Other`] naming the first violated guarantee:
    /// malformed hash, file name without the pack id, duplicate file name,
    /// self-listing, or a summary total that differs from its export's
    /// record count.
    pub fn check_invariants(&self) -> Result<()> {
        let own_name = self.filename();
        let mut seen = HashSet::new();

        for item in &self.contents {
            if !is_sha256_hex(&item.hash_sha256) {
                return Err(PackError::Other(format!(
                    "artifact {} has malformed hash '{}'",
                    item.filename, item.hash_sha256
                )));
            }
            if !item.filename.contains(&self.pack_id) {
                return Err(PackError::Other(format!(
                    "artifact {} does not embed pack id {}",
                    item.filename, self.pack_id
                )));
            }
            if item.filename == own_name {
                return Err(PackError::Other("manifest lists itself".to_owned()));
            }
            if !seen.insert(item.filename.as_str()) {
                return Err(PackError::Other(format!(
                    "artifact {} listed twice",
                    item.filename
                )));
            }
        }

        let count_of = |kind| self.find(kind).map_or(0, |c| c.record_count);
        let controls = count_of(ArtifactKind::Controls);
        let attestations = count_of(ArtifactKind::Attestations);

        if self.summary.total_controls != controls {
            return Err(PackError::Other(format!(
                "summary.total_controls is {} but the controls export has {controls} rows",
                self.summary.total_controls
            )));
        }
        if self.summary.total_attestations != attestations {
            return Err(PackError::Other(format!(
                "summary.total_attestations is {} but the attestations export has {attestations} rows",
                self.summary.total_attestations
            )));
        }

        Ok(())
    }
}

/// Header fields of a manifest that do not come from the artifacts.
#[derive(Debug, Clone, Copy)]
pub struct ManifestMeta<'a> {
    pub pack_id: &'a str,
    pub organization_name: &'a str,
    pub generated_at: DateTime<Utc>,
}

/// Hash every generated document, add the evidence index, and build the
/// manifest over the result.
///
/// Documents are consumed in order; their manifest order is preserved and
/// the evidence index is appended last.
///
/// # Errors
///
/// Fails if the evidence index cannot be serialized or the finished manifest
/// violates [`PackManifest::check_invariants`].
pub fn build_manifest(
    documents: Vec<GeneratedDocument>,
    request: &PackRequest,
    meta: ManifestMeta<'_>,
) -> Result<(PackManifest, Vec<PackArtifact>)> {
    let summary = PackSummary::from_documents(&documents);

    let mut artifacts: Vec<PackArtifact> = documents
        .into_iter()
        .map(|doc| PackArtifact {
            descriptor: ArtifactDescriptor::describe(
                artifact_filename(doc.kind, doc.format, meta.pack_id),
                doc.kind,
                doc.format,
                doc.record_count,
                &doc.bytes,
            ),
            bytes: doc.bytes,
        })
        .collect();

    let entries: Vec<IndexEntry> = artifacts
        .iter()
        .map(|a| IndexEntry {
            kind: a.descriptor.kind,
            format: a.descriptor.format,
            filename_stem: a.descriptor.kind.file_stem().to_owned(),
            record_count: a.descriptor.record_count,
            hash_sha256: a.descriptor.hash_sha256.clone(),
        })
        .collect();
    let index = EvidenceIndex.generate(&entries)?;
    artifacts.push(PackArtifact {
        descriptor: ArtifactDescriptor::describe(
            artifact_filename(index.kind, index.format, meta.pack_id),
            index.kind,
            index.format,
            index.record_count,
            &index.bytes,
        ),
        bytes: index.bytes,
    });

    let requester = &request.requested_by;
    let manifest = PackManifest {
        pack_id: meta.pack_id.to_owned(),
        generated_at: meta.generated_at,
        generated_by: requester.name.clone(),
        generated_by_role: requester.role.as_str().to_owned(),
        generated_by_user_id: requester.user_id.clone(),
        organization: meta.organization_name.to_owned(),
        organization_id: request.organization_id.clone(),
        time_range: request.time_range,
        filters: request.filters.clone(),
        contents: artifacts.iter().map(|a| a.descriptor.clone()).collect(),
        summary,
    };
    manifest.check_invariants()?;

    Ok((manifest, artifacts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::request::{Requester, Role, TimeRangePreset};
    use std::collections::BTreeMap;

    fn doc(kind: ArtifactKind, format: ArtifactFormat, count: u64, body: &[u8]) -> GeneratedDocument {
        GeneratedDocument {
            kind,
            format,
            bytes: body.to_vec(),
            record_count: count,
            metrics: BTreeMap::new(),
        }
    }

    fn request() -> PackRequest {
        let now = Utc::now();
        PackRequest {
            organization_id: "org-1".to_owned(),
            requested_by: Requester {
                user_id: "u-1".to_owned(),
                name: "Avery".to_owned(),
                role: Role::SafetyLead,
            },
            time_range: TimeRange {
                preset: TimeRangePreset::Last30Days,
                start: now,
                end: now,
            },
            filters: PackFilters::default(),
        }
    }

    fn meta(pack_id: &str) -> ManifestMeta<'_> {
        ManifestMeta {
            pack_id,
            organization_name: "Northwind",
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_manifest_describes_every_artifact() {
        let documents = vec![
            doc(ArtifactKind::ComplianceReport, ArtifactFormat::Pdf, 5, b"%PDF"),
            doc(ArtifactKind::Controls, ArtifactFormat::Csv, 3, b"controls"),
            doc(ArtifactKind::Attestations, ArtifactFormat::Csv, 2, b"attestations"),
        ];
        let (manifest, artifacts) = build_manifest(documents, &request(), meta("p1")).unwrap();

        assert_eq!(manifest.contents.len(), 4);
        assert_eq!(artifacts.len(), 4);
        assert_eq!(manifest.summary.total_controls, 3);
        assert_eq!(manifest.summary.total_attestations, 2);
        assert_eq!(manifest.generated_by_role, "safety_lead");

        let controls = manifest.find(ArtifactKind::Controls).unwrap();
        assert_eq!(controls.filename, "controls_p1.csv");
        assert_eq!(controls.hash_sha256, hash_bytes(b"controls"));
        assert_eq!(controls.byte_length, 8);

        for artifact in &artifacts {
            assert!(artifact.descriptor.matches(&artifact.bytes));
        }
        assert_eq!(
            manifest.contents.last().unwrap().kind,
            ArtifactKind::EvidenceIndex
        );
    }

    #[test]
    fn test_manifest_json_field_names() {
        let (manifest, _) = build_manifest(Vec::new(), &request(), meta("p2")).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&manifest.to_bytes().unwrap()).unwrap();

        for field in [
            "pack_id",
            "generated_at",
            "generated_by",
            "generated_by_role",
            "generated_by_user_id",
            "organization",
            "organization_id",
            "time_range",
            "filters",
            "contents",
            "summary",
        ] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        let first = &value["contents"][0];
        for field in ["filename", "type", "kind", "record_count", "byte_length", "hash_sha256"] {
            assert!(first.get(field).is_some(), "missing content field {field}");
        }
        assert_eq!(value["summary"]["total_controls"], 0);
    }

    #[test]
    fn test_summary_mismatch_is_detected() {
        let documents = vec![doc(ArtifactKind::Controls, ArtifactFormat::Csv, 3, b"c")];
        let (mut manifest, _) = build_manifest(documents, &request(), meta("p3")).unwrap();

        manifest.summary.total_controls = 4;
        let err = manifest.check_invariants().unwrap_err();
        assert!(err.to_string().contains("total_controls"));
    }

    #[test]
    fn test_foreign_filename_is_detected() {
        let (mut manifest, _) = build_manifest(Vec::new(), &request(), meta("p4")).unwrap();
        manifest.contents[0].filename = "evidence_index.json".to_owned();
        assert!(manifest.check_invariants().is_err());
    }

    #[test]
    fn test_manifest_round_trips_from_bytes() {
        let (manifest, _) = build_manifest(Vec::new(), &request(), meta("p5")).unwrap();
        let parsed = PackManifest::from_bytes(&manifest.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, manifest);
        assert!(PackManifest::from_bytes(b"{}").is_err());
    }
}
