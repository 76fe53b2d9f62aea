//! Audit-trail persistence.
//!
//! Two record types live here:
//!
//! - [`LedgerEntry`]: the immutable record that a pack was generated, by
//!   whom, and with which hashes. Written once, after the archive is fully
//!   assembled, and never rewritten.
//! - [`ReportRun`]: a report that collects artifacts and signatures over
//!   time and moves `draft → ready_for_signatures → final`. Final runs
//!   reject every write.
//!
//! Both are stored as JSON under a data directory by [`LedgerStore`].

pub mod run;
pub mod store;

pub use run::{ReportRun, RunStatus};
pub use store::LedgerStore;

use crate::pack::{ArtifactDescriptor, AssembledPack, PackManifest, PackSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record of one generated pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub pack_id: String,
    pub organization_id: String,
    pub generated_by_user_id: String,
    pub generated_by_role: String,
    pub generated_at: DateTime<Utc>,
    pub archive_filename: String,
    pub archive_sha256: String,
    pub archive_bytes: u64,
    pub manifest_filename: String,
    pub contents: Vec<ArtifactDescriptor>,
    pub summary: PackSummary,
}

impl LedgerEntry {
    pub fn new(manifest: &PackManifest, archive: &AssembledPack) -> Self {
        Self {
            pack_id: manifest.pack_id.clone(),
            organization_id: manifest.organization_id.clone(),
            generated_by_user_id: manifest.generated_by_user_id.clone(),
            generated_by_role: manifest.generated_by_role.clone(),
            generated_at: manifest.generated_at,
            archive_filename: archive.download_name.clone(),
            archive_sha256: archive.sha256.clone(),
            archive_bytes: archive.bytes.len() as u64,
            manifest_filename: manifest.filename(),
            contents: manifest.contents.clone(),
            summary: manifest.summary,
        }
    }
}
