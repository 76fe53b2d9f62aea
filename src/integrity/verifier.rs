//! Verification of stored packs, report runs, and downloaded archives.
//!
//! Verification re-reads bytes from storage, recomputes SHA-256 hashes and
//! compares them against what was recorded at generation time. It never
//! writes: running it any number of times leaves storage untouched and
//! yields the same report.

use crate::error::{PackError, Result};
use crate::integrity::canonical::{hash_bytes, hash_value};
use crate::integrity::hasher::compute_file_hash;
use crate::ledger::LedgerStore;
use crate::pack::manifest::{ArtifactDescriptor, PackManifest};
use crate::pack::read_archive;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

/// Outcome for a single artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCheck {
    pub filename: String,
    pub stored_hash: String,
    /// `None` when the bytes could not be found.
    pub recomputed_hash: Option<String>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ArtifactCheck {
    fn compare(descriptor: &ArtifactDescriptor, bytes: Option<&[u8]>) -> Self {
        let Some(bytes) = bytes else {
            return Self {
                filename: descriptor.filename.clone(),
                stored_hash: descriptor.hash_sha256.clone(),
                recomputed_hash: None,
                ok: false,
                message: Some("artifact missing".to_owned()),
            };
        };

        let recomputed = hash_bytes(bytes);
        let ok = recomputed == descriptor.hash_sha256;
        Self {
            filename: descriptor.filename.clone(),
            stored_hash: descriptor.hash_sha256.clone(),
            recomputed_hash: Some(recomputed),
            ok,
            message: (!ok).then(|| "hash mismatch".to_owned()),
        }
    }

    fn failed(filename: &str, message: impl Into<String>) -> Self {
        Self {
            filename: filename.to_owned(),
            stored_hash: String::new(),
            recomputed_hash: None,
            ok: false,
            message: Some(message.into()),
        }
    }
}

/// Result of verifying a pack, run, or archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub ok: bool,
    /// Pack id or run id.
    pub id: String,
    pub recomputed_hash: Option<String>,
    pub stored_hash: Option<String>,
    pub checks: Vec<ArtifactCheck>,
    pub message: String,
}

impl VerificationReport {
    fn conclude(
        id: &str,
        recomputed_hash: Option<String>,
        stored_hash: Option<String>,
        checks: Vec<ArtifactCheck>,
    ) -> Self {
        let hashes_agree = match (&recomputed_hash, &stored_hash) {
            (Some(r), Some(s)) => r == s,
            (None, Some(_)) => false,
            (_, None) => true,
        };
        let failures = checks.iter().filter(|c| !c.ok).count();
        let ok = hashes_agree && failures == 0;

        let message = if ok {
            format!("{id} verified: {} artifact(s) match", checks.len())
        } else if !hashes_agree {
            format!("{id} failed verification: stored hash does not match recomputed hash")
        } else {
            format!("{id} failed verification: {failures} artifact(s) do not match")
        };

        Self {
            ok,
            id: id.to_owned(),
            recomputed_hash,
            stored_hash,
            checks,
            message,
        }
    }

    /// Format for terminal display.
    pub fn format_cli(&self) -> String {
        let mut out = if self.ok {
            format!("✓ PASS: {}\n", self.message)
        } else {
            format!("✗ FAIL: {}\n", self.message)
        };

        if let Some(stored) = &self.stored_hash {
            out.push_str(&format!("  Stored:     {stored}\n"));
        }
        if let Some(recomputed) = &self.recomputed_hash {
            out.push_str(&format!("  Recomputed: {recomputed}\n"));
        }
        for check in &self.checks {
            let mark = if check.ok { '✓' } else { '✗' };
            out.push_str(&format!("  {mark} {}", check.filename));
            if let Some(message) = &check.message {
                out.push_str(&format!(" ({message})"));
            }
            out.push('\n');
        }
        out
    }
}

/// Re-verify a recorded pack against its ledger entry.
///
/// Checks the whole-archive hash, that the bundled manifest is present and
/// agrees with the ledger, and every artifact's hash.
///
/// # Errors
///
/// [`PackError::NotFound`] if no ledger entry exists for `pack_id`;
/// [`PackError::InvalidFormat`] for a malformed id. Damage to the stored
/// archive is reported in the returned report, not as an error.
pub fn verify_pack(store: &LedgerStore, pack_id: &str) -> Result<VerificationReport> {
    let entry = store.load_pack(pack_id)?;
    let path = store.pack_archive_path(pack_id)?;
    let stored = Some(entry.archive_sha256.clone());

    if !path.exists() {
        let checks = vec![ArtifactCheck::failed(&entry.archive_filename, "archive missing")];
        return Ok(VerificationReport::conclude(pack_id, None, stored, checks));
    }

    let bytes = store.load_pack_archive(pack_id)?;
    let recomputed = hash_bytes(&bytes);

    let entries: HashMap<String, Vec<u8>> = match read_archive(&bytes) {
        Ok(entries) => entries.into_iter().collect(),
        Err(e) => {
            let checks = vec![ArtifactCheck::failed(&entry.archive_filename, e.to_string())];
            return Ok(VerificationReport::conclude(pack_id, Some(recomputed), stored, checks));
        }
    };

    let mut checks = Vec::with_capacity(entry.contents.len() + 1);
    checks.push(match entries.get(&entry.manifest_filename) {
        None => ArtifactCheck::failed(&entry.manifest_filename, "manifest missing from archive"),
        Some(raw) => match PackManifest::from_bytes(raw) {
            Ok(m) if m.contents == entry.contents && m.pack_id == entry.pack_id => ArtifactCheck {
                filename: entry.manifest_filename.clone(),
                stored_hash: String::new(),
                recomputed_hash: None,
                ok: true,
                message: None,
            },
            Ok(_) => ArtifactCheck::failed(&entry.manifest_filename, "manifest disagrees with ledger"),
            Err(e) => ArtifactCheck::failed(&entry.manifest_filename, e.to_string()),
        },
    });

    for descriptor in &entry.contents {
        checks.push(ArtifactCheck::compare(
            descriptor,
            entries.get(&descriptor.filename).map(Vec::as_slice),
        ));
    }

    let mut unlisted: Vec<&String> = entries
        .keys()
        .filter(|name| {
            **name != entry.manifest_filename && entry.contents.iter().all(|c| &c.filename != *name)
        })
        .collect();
    unlisted.sort();
    for name in unlisted {
        checks.push(ArtifactCheck::failed(name, "entry not listed in ledger"));
    }

    let report = VerificationReport::conclude(pack_id, Some(recomputed), stored, checks);
    tracing::info!(pack_id, ok = report.ok, "verified pack");
    Ok(report)
}

/// Digest over a run's `(filename, hash)` list, in attachment order.
fn run_digest<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> Result<String> {
    let list: Vec<_> = pairs
        .map(|(filename, hash)| json!({"filename": filename, "hash_sha256": hash}))
        .collect();
    hash_value(&json!(list))
}

/// Re-hash every stored artifact of a report run.
///
/// The report's stored and recomputed hashes are digests over the run's
/// artifact list, so a single comparison covers the whole run.
///
/// # Errors
///
/// [`PackError::NotFound`] for an unknown run.
pub fn verify_run(store: &LedgerStore, run_id: &str) -> Result<VerificationReport> {
    let run = store.load_run(run_id)?;

    let mut checks = Vec::with_capacity(run.artifacts.len());
    for descriptor in &run.artifacts {
        let path = store.run_artifact_path(run_id, &descriptor.filename)?;
        let check = if path.exists() {
            let recomputed = compute_file_hash(&path)?;
            let ok = recomputed == descriptor.hash_sha256;
            ArtifactCheck {
                filename: descriptor.filename.clone(),
                stored_hash: descriptor.hash_sha256.clone(),
                recomputed_hash: Some(recomputed),
                ok,
                message: (!ok).then(|| "hash mismatch".to_owned()),
            }
        } else {
            ArtifactCheck::compare(descriptor, None)
        };
        checks.push(check);
    }

    let stored = run_digest(
        run.artifacts
            .iter()
            .map(|a| (a.filename.as_str(), a.hash_sha256.as_str())),
    )?;
    let recomputed = if checks.iter().all(|c| c.recomputed_hash.is_some()) {
        Some(run_digest(checks.iter().map(|c| {
            (
                c.filename.as_str(),
                c.recomputed_hash.as_deref().unwrap_or_default(),
            )
        }))?)
    } else {
        None
    };

    let report = VerificationReport::conclude(run_id, recomputed, Some(stored), checks);
    tracing::info!(run_id, status = %run.status, ok = report.ok, "verified run");
    Ok(report)
}

/// Verify a downloaded archive against the manifest inside it.
///
/// # Errors
///
/// [`PackError::Archive`] if the bytes are not a ZIP archive or contain no
/// manifest. Hash mismatches are reported, not raised.
pub fn verify_archive_bytes(bytes: &[u8]) -> Result<VerificationReport> {
    let entries = read_archive(bytes)?;

    let (manifest_name, manifest_bytes) = entries
        .iter()
        .find(|(name, _)| name.starts_with("manifest_") && name.ends_with(".json"))
        .ok_or_else(|| PackError::Archive("archive contains no manifest".to_owned()))?;
    let manifest = PackManifest::from_bytes(manifest_bytes)?;

    let by_name: HashMap<&str, &[u8]> = entries
        .iter()
        .map(|(name, data)| (name.as_str(), data.as_slice()))
        .collect();

    let mut checks = Vec::with_capacity(manifest.contents.len() + 1);
    if let Err(e) = manifest.check_invariants() {
        checks.push(ArtifactCheck::failed(manifest_name, e.to_string()));
    }

    for descriptor in &manifest.contents {
        let mut check = ArtifactCheck::compare(descriptor, by_name.get(descriptor.filename.as_str()).copied());
        if check.ok
            && by_name
                .get(descriptor.filename.as_str())
                .is_some_and(|data| data.len() as u64 != descriptor.byte_length)
        {
            check.ok = false;
            check.message = Some("byte length mismatch".to_owned());
        }
        checks.push(check);
    }

    for (name, _) in &entries {
        if name != manifest_name && manifest.contents.iter().all(|c| &c.filename != name) {
            checks.push(ArtifactCheck::failed(name, "entry not listed in manifest"));
        }
    }

    Ok(VerificationReport::conclude(
        &manifest.pack_id,
        Some(hash_bytes(bytes)),
        None,
        checks,
    ))
}
