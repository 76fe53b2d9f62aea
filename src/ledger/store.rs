//! File-backed ledger storage.
//!
//! Layout under the data directory:
//!
//! ```text
//! packs/<pack_id>.zip            archive bytes as served
//! packs/<pack_id>.json           LedgerEntry (write-once)
//! runs/<run_id>/run.json         ReportRun (rewritten atomically)
//! runs/<run_id>/artifacts/<name> attached artifact bytes (write-once)
//! ```

use super::{LedgerEntry, ReportRun, RunStatus};
use crate::error::{PackError, Result, ResultExt as _};
use crate::generators::ArtifactFormat;
use crate::pack::request::validate_identifier;
use crate::pack::{AssembledPack, PackArtifact, PackManifest};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub const PACKS_DIR: &str = "packs";
pub const RUNS_DIR: &str = "runs";
const RUN_FILE: &str = "run.json";
const ARTIFACTS_DIR: &str = "artifacts";
const MAX_FILENAME_LEN: usize = 128;

/// Validate an artifact file name and return its format.
///
/// # Errors
///
/// Returns [`PackError::InvalidFormat`] unless the name is a plain file
/// name of ASCII letters, digits, `.`, `-` or `_`, does not start with a
/// dot, and ends in `.pdf`, `.csv` or `.json`.
pub fn validate_filename(name: &str) -> Result<ArtifactFormat> {
    let plain = !name.is_empty()
        && name.len() <= MAX_FILENAME_LEN
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'));
    if !plain {
        return Err(PackError::InvalidFormat(format!(
            "malformed artifact file name '{name}'"
        )));
    }

    name.rsplit_once('.')
        .and_then(|(_, ext)| ArtifactFormat::from_extension(ext))
        .ok_or_else(|| {
            PackError::InvalidFormat(format!(
                "artifact '{name}' must be a .pdf, .csv or .json file"
            ))
        })
}

/// Create `path` and write `bytes`, failing if it already exists.
fn write_new(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(PackError::InvalidState(format!(
                "{} already exists and is immutable",
                path.display()
            )));
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to create {}", path.display()));
        }
    };
    file.write_all(bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync {}", path.display()))
}

/// Replace `path` via a sibling temp file and rename.
fn write_replace(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))
}

fn read_file(path: &Path, what: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            PackError::NotFound(what.to_owned())
        } else {
            PackError::Other(format!("Failed to read {}: {e}", path.display()))
        }
    })
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let bytes = read_file(path, what)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| PackError::Other(format!("{} is corrupt: {e}", path.display())))
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Ledger and report-run storage rooted at a data directory.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles on `run.json`.
    run_lock: Arc<Mutex<()>>,
}

impl LedgerStore {
    /// Open (creating if needed) a store under `root`.
    ///
    /// # Errors
    ///
    /// Returns error if the directories cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [root.join(PACKS_DIR), root.join(RUNS_DIR)] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create ledger directory: {}", dir.display()))?;
        }
        Ok(Self {
            root,
            run_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pack_entry_path(&self, pack_id: &str) -> PathBuf {
        self.root.join(PACKS_DIR).join(format!("{pack_id}.json"))
    }

    /// Location of the stored archive for `pack_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::InvalidFormat`] for a malformed id.
    pub fn pack_archive_path(&self, pack_id: &str) -> Result<PathBuf> {
        validate_identifier("pack id", pack_id)?;
        Ok(self.root.join(PACKS_DIR).join(format!("{pack_id}.zip")))
    }

    /// Persist a fully assembled pack and its ledger entry.
    ///
    /// The archive is written first and the entry last, so an entry on disk
    /// always has its archive beside it.
    ///
    /// # Errors
    ///
    /// [`PackError::InvalidState`] if the pack id was already recorded;
    /// I/O errors otherwise.
    pub fn record_pack(&self, manifest: &PackManifest, archive: &AssembledPack) -> Result<LedgerEntry> {
        let archive_path = self.pack_archive_path(&manifest.pack_id)?;
        let entry = LedgerEntry::new(manifest, archive);

        write_new(&archive_path, &archive.bytes)?;
        write_new(&self.pack_entry_path(&manifest.pack_id), &to_json(&entry)?)?;

        tracing::info!(
            pack_id = %entry.pack_id,
            organization_id = %entry.organization_id,
            archive_sha256 = %entry.archive_sha256,
            "recorded ledger entry"
        );
        Ok(entry)
    }

    /// # Errors
    ///
    /// [`PackError::NotFound`] for an unknown pack.
    pub fn load_pack(&self, pack_id: &str) -> Result<LedgerEntry> {
        validate_identifier("pack id", pack_id)?;
        read_json(&self.pack_entry_path(pack_id), &format!("pack {pack_id}"))
    }

    /// # Errors
    ///
    /// [`PackError::NotFound`] if the archive is missing.
    pub fn load_pack_archive(&self, pack_id: &str) -> Result<Vec<u8>> {
        read_file(
            &self.pack_archive_path(pack_id)?,
            &format!("archive for pack {pack_id}"),
        )
    }

    /// Ledger entries of one organization, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the packs directory cannot be read.
    pub fn list_packs(&self, organization_id: &str) -> Result<Vec<LedgerEntry>> {
        let dir = self.root.join(PACKS_DIR);
        let mut entries = Vec::new();

        for item in fs::read_dir(&dir)
            .with_context(|| format!("Failed to read {}", dir.display()))?
            .filter_map(std::result::Result::ok)
        {
            let path = item.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match read_json::<LedgerEntry>(&path, "ledger entry") {
                Ok(entry) if entry.organization_id == organization_id => entries.push(entry),
                Ok(_) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable ledger entry"),
            }
        }

        entries.sort_by(|a, b| {
            b.generated_at
                .cmp(&a.generated_at)
                .then_with(|| a.pack_id.cmp(&b.pack_id))
        });
        Ok(entries)
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        validate_identifier("run id", run_id)?;
        Ok(self.root.join(RUNS_DIR).join(run_id))
    }

    /// Path of an attached artifact.
    ///
    /// # Errors
    ///
    /// [`PackError::InvalidFormat`] for a malformed id or file name.
    pub fn run_artifact_path(&self, run_id: &str, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;
        Ok(self.run_dir(run_id)?.join(ARTIFACTS_DIR).join(filename))
    }

    /// Create a run with its initial artifacts.
    ///
    /// # Errors
    ///
    /// [`PackError::InvalidState`] if the run id exists; validation errors
    /// for bad artifact names.
    pub fn create_run(&self, mut run: ReportRun, artifacts: Vec<PackArtifact>) -> Result<ReportRun> {
        let dir = self.run_dir(&run.run_id)?;
        let _guard = self.run_lock.lock().unwrap_or_else(PoisonError::into_inner);

        fs::create_dir(&dir).map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                PackError::InvalidState(format!("run {} already exists", run.run_id))
            } else {
                PackError::Other(format!("Failed to create {}: {e}", dir.display()))
            }
        })?;
        fs::create_dir_all(dir.join(ARTIFACTS_DIR))
            .with_context(|| format!("Failed to create artifacts directory for run {}", run.run_id))?;

        for artifact in artifacts {
            let path = self.run_artifact_path(&run.run_id, &artifact.descriptor.filename)?;
            run.attach(artifact.descriptor, run.created_at)?;
            write_new(&path, &artifact.bytes)?;
        }

        write_new(&dir.join(RUN_FILE), &to_json(&run)?)?;
        tracing::info!(run_id = %run.run_id, artifacts = run.artifacts.len(), "created report run");
        Ok(run)
    }

    /// # Errors
    ///
    /// [`PackError::NotFound`] for an unknown run.
    pub fn load_run(&self, run_id: &str) -> Result<ReportRun> {
        read_json(&self.run_dir(run_id)?.join(RUN_FILE), &format!("run {run_id}"))
    }

    /// # Errors
    ///
    /// [`PackError::NotFound`] if the artifact was never stored.
    pub fn load_run_artifact(&self, run_id: &str, filename: &str) -> Result<Vec<u8>> {
        read_file(
            &self.run_artifact_path(run_id, filename)?,
            &format!("artifact {filename} of run {run_id}"),
        )
    }

    /// Attach an artifact to a run that still accepts writes.
    ///
    /// Final runs are rejected before anything touches disk.
    ///
    /// # Errors
    ///
    /// [`PackError::RunFinalized`] for a final run, [`PackError::InvalidState`]
    /// for a duplicate name, [`PackError::NotFound`] for an unknown run.
    pub fn attach_artifact(
        &self,
        run_id: &str,
        artifact: PackArtifact,
        now: DateTime<Utc>,
    ) -> Result<ReportRun> {
        let path = self.run_artifact_path(run_id, &artifact.descriptor.filename)?;
        let _guard = self.run_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut run = self.load_run(run_id)?;
        run.attach(artifact.descriptor, now)?;
        write_new(&path, &artifact.bytes)?;
        write_replace(&self.run_dir(run_id)?.join(RUN_FILE), &to_json(&run)?)?;

        tracing::info!(run_id, artifacts = run.artifacts.len(), "attached artifact to run");
        Ok(run)
    }

    /// Move a run to its next status.
    ///
    /// # Errors
    ///
    /// [`PackError::RunFinalized`] for a final run, [`PackError::InvalidState`]
    /// for a disallowed transition, [`PackError::NotFound`] for an unknown run.
    pub fn transition_run(&self, run_id: &str, next: RunStatus, now: DateTime<Utc>) -> Result<ReportRun> {
        let _guard = self.run_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut run = self.load_run(run_id)?;
        let previous = run.status;
        run.transition(next, now)?;
        write_replace(&self.run_dir(run_id)?.join(RUN_FILE), &to_json(&run)?)?;

        tracing::info!(run_id, from = %previous, to = %next, "run status changed");
        Ok(run)
    }
}
