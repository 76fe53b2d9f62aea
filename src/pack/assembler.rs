//! ZIP assembly of a finished pack.

use super::manifest::{PackArtifact, PackManifest};
use crate::error::{PackError, Result, ResultExt as _};
use crate::integrity::hash_bytes;
use chrono::{DateTime, Datelike as _, Timelike as _, Utc};
use std::io::{Cursor, Read as _, Write as _};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Media type of an assembled pack.
pub const CONTENT_TYPE: &str = "application/zip";

/// Per-entry ceiling when reading archives back.
const MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

/// A pack archive ready to serve or persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPack {
    pub pack_id: String,
    pub bytes: Vec<u8>,
    /// SHA-256 of the whole archive.
    pub sha256: String,
    pub download_name: String,
}

impl AssembledPack {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.download_name)
    }
}

/// File name offered to clients for `pack_id`.
pub fn download_name(pack_id: &str) -> String {
    format!("audit-pack-{pack_id}.zip")
}

fn entry_time(ts: DateTime<Utc>) -> zip::DateTime {
    let converted = u16::try_from(ts.year()).ok().and_then(|year| {
        zip::DateTime::from_date_and_time(
            year,
            u8::try_from(ts.month()).ok()?,
            u8::try_from(ts.day()).ok()?,
            u8::try_from(ts.hour()).ok()?,
            u8::try_from(ts.minute()).ok()?,
            u8::try_from(ts.second()).ok()?,
        )
        .ok()
    });
    converted.unwrap_or_default()
}

/// Write the manifest and artifacts into a ZIP archive.
///
/// The manifest is always the first entry; artifacts follow in manifest
/// order. Entry timestamps come from the manifest's `generated_at`, so the
/// archive bytes are a function of the manifest and artifacts alone.
///
/// # Errors
///
/// Returns [`PackError::Archive`] if the artifacts do not line up with the
/// manifest, any artifact's bytes do not hash to its recorded value, or the
/// archive cannot be written.
pub fn assemble(manifest: &PackManifest, artifacts: &[PackArtifact]) -> Result<AssembledPack> {
    manifest
        .check_invariants()
        .map_err(|e| PackError::Archive(format!("refusing to assemble pack: {e}")))?;

    if manifest.contents.len() != artifacts.len() {
        return Err(PackError::Archive(format!(
            "manifest lists {} artifacts but {} were supplied",
            manifest.contents.len(),
            artifacts.len()
        )));
    }
    for (listed, artifact) in manifest.contents.iter().zip(artifacts) {
        if *listed != artifact.descriptor {
            return Err(PackError::Archive(format!(
                "artifact {} does not match its manifest entry",
                artifact.descriptor.filename
            )));
        }
        if !listed.matches(&artifact.bytes) {
            return Err(PackError::Archive(format!(
                "artifact {} changed after hashing",
                listed.filename
            )));
        }
    }

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(entry_time(manifest.generated_at))
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file(manifest.filename(), options)?;
    zip.write_all(&manifest.to_bytes()?)
        .context("Failed to write manifest entry")?;

    for artifact in artifacts {
        zip.start_file(artifact.descriptor.filename.as_str(), options)?;
        zip.write_all(&artifact.bytes)
            .with_context(|| format!("Failed to write {}", artifact.descriptor.filename))?;
    }

    let bytes = zip.finish()?.into_inner();
    let sha256 = hash_bytes(&bytes);

    tracing::debug!(
        pack_id = %manifest.pack_id,
        entries = artifacts.len() + 1,
        bytes = bytes.len(),
        "assembled pack archive"
    );

    Ok(AssembledPack {
        pack_id: manifest.pack_id.clone(),
        download_name: download_name(&manifest.pack_id),
        bytes,
        sha256,
    })
}

/// Read every entry of an archive as `(name, bytes)`, in archive order.
///
/// # Errors
///
/// Returns [`PackError::Archive`] for unreadable archives, entry names with
/// path components, or entries over the size ceiling.
pub fn read_archive(bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let name = file.name().to_owned();

        if name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(PackError::Archive(format!("unexpected entry path '{name}'")));
        }
        if file.size() > MAX_ENTRY_BYTES {
            return Err(PackError::Archive(format!("entry '{name}' is too large")));
        }

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| PackError::Archive(format!("failed to read entry '{name}': {e}")))?;
        entries.push((name, buf));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{ArtifactFormat, ArtifactKind, GeneratedDocument};
    use crate::pack::manifest::{ManifestMeta, build_manifest};
    use crate::pack::request::{PackFilters, PackRequest, Requester, Role, TimeRange, TimeRangePreset};
    use std::collections::BTreeMap;

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-10T12:30:45Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn built(pack_id: &str) -> (PackManifest, Vec<PackArtifact>) {
        let request = PackRequest {
            organization_id: "org-1".to_owned(),
            requested_by: Requester {
                user_id: "u-1".to_owned(),
                name: "Avery".to_owned(),
                role: Role::Owner,
            },
            time_range: TimeRange {
                preset: TimeRangePreset::Last7Days,
                start: fixed_time(),
                end: fixed_time(),
            },
            filters: PackFilters::default(),
        };
        let documents = vec![GeneratedDocument {
            kind: ArtifactKind::Controls,
            format: ArtifactFormat::Csv,
            bytes: b"Control ID\n# No records for this filter\n".to_vec(),
            record_count: 0,
            metrics: BTreeMap::new(),
        }];
        build_manifest(
            documents,
            &request,
            ManifestMeta {
                pack_id,
                organization_name: "Northwind",
                generated_at: fixed_time(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_manifest_is_first_entry() {
        let (manifest, artifacts) = built("p1");
        let pack = assemble(&manifest, &artifacts).unwrap();

        let entries = read_archive(&pack.bytes).unwrap();
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["manifest_p1.json", "controls_p1.csv", "evidence_index_p1.json"]);
        assert_eq!(pack.sha256, hash_bytes(&pack.bytes));
        assert_eq!(
            pack.content_disposition(),
            "attachment; filename=\"audit-pack-p1.zip\""
        );
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let (manifest, artifacts) = built("p2");
        let a = assemble(&manifest, &artifacts).unwrap();
        let b = assemble(&manifest, &artifacts).unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_tampered_artifact_is_refused() {
        let (manifest, mut artifacts) = built("p3");
        artifacts[0].bytes.push(b'!');
        let err = assemble(&manifest, &artifacts).unwrap_err();
        assert!(matches!(err, PackError::Archive(ref m) if m.contains("changed after hashing")));
    }

    #[test]
    fn test_missing_artifact_is_refused() {
        let (manifest, mut artifacts) = built("p4");
        artifacts.pop();
        assert!(assemble(&manifest, &artifacts).is_err());
    }

    #[test]
    fn test_entry_time_comes_from_manifest() {
        let dt = entry_time(fixed_time());
        assert_eq!(dt.year(), 2026);
        assert_eq!(dt.month(), 3);
        assert_eq!(dt.hour(), 12);
    }

    #[test]
    fn test_garbage_is_not_an_archive() {
        assert!(matches!(
            read_archive(b"not a zip").unwrap_err(),
            PackError::Archive(_)
        ));
    }
}
