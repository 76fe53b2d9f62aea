//! Pack orchestration.
//!
//! [`PackService::build_pack`] runs one request end to end:
//!
//! 1. fetch the organization and its rows concurrently
//! 2. decode rows once into typed records
//! 3. run every generator on the blocking pool and join them all
//! 4. hash, index, build the manifest, assemble the archive
//! 5. persist the ledger entry
//!
//! Steps 1 to 4 share one deadline. If it expires, or any step fails,
//! nothing is persisted and no archive is returned.

use super::assembler::{AssembledPack, assemble};
use super::manifest::{ArtifactDescriptor, ManifestMeta, PackArtifact, PackManifest, artifact_filename, build_manifest};
use super::request::{PackRequest, validate_identifier};
use crate::config::ExportSettings;
use crate::datasource::DataSource;
use crate::error::{PackError, Result};
use crate::generators::{
    ComplianceReportPdf, DocumentGenerator, GeneratedDocument, GenerationContext,
    standard_generators,
};
use crate::integrity::{self, VerificationReport};
use crate::ledger::{LedgerEntry, LedgerStore, ReportRun, RunStatus};
use crate::rows::RowSet;
use crate::sanitize::Sanitizer;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument as _;
use uuid::Uuid;

/// A generated, persisted pack.
#[derive(Debug, Clone)]
pub struct BuiltPack {
    pub manifest: PackManifest,
    pub archive: AssembledPack,
    pub entry: LedgerEntry,
}

/// New identifier of the form `<prefix>-<YYYYMMDD>-<12 hex>`.
pub fn new_id(prefix: &str, now: DateTime<Utc>) -> String {
    let random: String = Uuid::new_v4().simple().to_string().chars().take(12).collect();
    format!("{prefix}-{}-{random}", now.format("%Y%m%d"))
}

/// Run generators on the blocking pool and wait for all of them.
///
/// Output order follows `generators`, regardless of completion order.
///
/// # Errors
///
/// The first generator error, in generator order.
pub async fn render_documents(
    generators: Vec<Box<dyn DocumentGenerator>>,
    rows: Arc<RowSet>,
    ctx: Arc<GenerationContext>,
) -> Result<Vec<GeneratedDocument>> {
    let handles: Vec<_> = generators
        .into_iter()
        .map(|generator| {
            let rows = Arc::clone(&rows);
            let ctx = Arc::clone(&ctx);
            tokio::task::spawn_blocking(move || generator.generate(&rows, &ctx))
        })
        .collect();

    let mut documents = Vec::with_capacity(handles.len());
    for handle in handles {
        documents.push(handle.await??);
    }
    Ok(documents)
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Builds packs from a [`DataSource`] and records them in a [`LedgerStore`].
#[derive(Clone)]
pub struct PackService {
    source: Arc<dyn DataSource>,
    store: LedgerStore,
    settings: ExportSettings,
}

impl PackService {
    pub fn new(source: Arc<dyn DataSource>, store: LedgerStore, settings: ExportSettings) -> Self {
        Self {
            source,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    fn deadline(&self) -> Duration {
        Duration::from_secs(self.settings.timeout_secs)
    }

    fn timed_out(&self, what: &str) -> PackError {
        PackError::Timeout(format!(
            "{what} exceeded the {}s deadline",
            self.settings.timeout_secs
        ))
    }

    /// Fetch and decode everything generation needs.
    async fn load_inputs(
        &self,
        request: &PackRequest,
        now: DateTime<Utc>,
    ) -> Result<(Arc<RowSet>, Arc<GenerationContext>)> {
        let (organization, raw_rows) = tokio::try_join!(
            self.source.organization(&request.organization_id),
            self.source
                .fetch_rows(&request.organization_id, &request.time_range),
        )?;

        let rows = RowSet::decode(raw_rows)?;
        tracing::debug!(
            controls = rows.controls.len(),
            attestations = rows.attestations.len(),
            "decoded rows"
        );

        let ctx = GenerationContext {
            organization_name: organization.name,
            filters: request.filters.clone(),
            time_range_label: request.time_range.label(),
            as_of: now.date_naive(),
            sanitizer: Sanitizer::new(self.settings.sanitize_mode),
            theme: self.settings.theme.clone(),
        };
        Ok((Arc::new(rows), Arc::new(ctx)))
    }

    async fn generate(
        &self,
        pack_id: &str,
        request: &PackRequest,
        now: DateTime<Utc>,
    ) -> Result<(PackManifest, AssembledPack)> {
        let (rows, ctx) = self.load_inputs(request, now).await?;
        let documents = render_documents(standard_generators(), rows, Arc::clone(&ctx)).await?;

        let pack_id = pack_id.to_owned();
        let request = request.clone();
        blocking(move || {
            let (manifest, artifacts) = build_manifest(
                documents,
                &request,
                ManifestMeta {
                    pack_id: &pack_id,
                    organization_name: &ctx.organization_name,
                    generated_at: now,
                },
            )?;
            let archive = assemble(&manifest, &artifacts)?;
            Ok((manifest, archive))
        })
        .await
    }

    /// Generate, assemble and record a pack.
    ///
    /// # Errors
    ///
    /// [`PackError::Timeout`] when the deadline passes, otherwise whatever
    /// failed first. In every error case the ledger is left untouched.
    pub async fn build_pack(&self, request: PackRequest, now: DateTime<Utc>) -> Result<BuiltPack> {
        let pack_id = new_id("pack", now);
        let span = tracing::info_span!(
            "build_pack",
            pack_id = %pack_id,
            organization_id = %request.organization_id,
            time_range = request.time_range.preset.as_str(),
        );

        async {
            let started = std::time::Instant::now();
            let (manifest, archive) =
                tokio::time::timeout(self.deadline(), self.generate(&pack_id, &request, now))
                    .await
                    .map_err(|_elapsed| self.timed_out("pack generation"))??;

            let store = self.store.clone();
            let (m, a) = (manifest.clone(), archive.clone());
            let entry = blocking(move || store.record_pack(&m, &a)).await?;

            tracing::info!(
                total_controls = manifest.summary.total_controls,
                total_attestations = manifest.summary.total_attestations,
                archive_bytes = archive.bytes.len(),
                elapsed_ms = started.elapsed().as_millis(),
                "pack generated"
            );
            Ok(BuiltPack {
                manifest,
                archive,
                entry,
            })
        }
        .instrument(span)
        .await
    }

    /// Create a draft report run seeded with the compliance report PDF.
    ///
    /// # Errors
    ///
    /// As for [`PackService::build_pack`]; the run is only created once the
    /// report has rendered.
    pub async fn create_run(&self, request: PackRequest, now: DateTime<Utc>) -> Result<ReportRun> {
        let run_id = new_id("run", now);

        let report = tokio::time::timeout(self.deadline(), async {
            let (rows, ctx) = self.load_inputs(&request, now).await?;
            let generators: Vec<Box<dyn DocumentGenerator>> = vec![Box::new(ComplianceReportPdf)];
            let mut docs = render_documents(generators, rows, ctx).await?;
            docs.pop()
                .ok_or_else(|| PackError::Other("report generator produced nothing".to_owned()))
        })
        .await
        .map_err(|_elapsed| self.timed_out("report generation"))??;

        let artifact = PackArtifact {
            descriptor: ArtifactDescriptor::describe(
                artifact_filename(report.kind, report.format, &run_id),
                report.kind,
                report.format,
                report.record_count,
                &report.bytes,
            ),
            bytes: report.bytes,
        };
        let run = ReportRun::new(
            run_id,
            request.organization_id,
            request.requested_by.user_id,
            now,
        );

        let store = self.store.clone();
        blocking(move || store.create_run(run, vec![artifact])).await
    }

    /// Load a run, hiding runs of other organizations.
    async fn run_for(&self, organization_id: &str, run_id: &str) -> Result<ReportRun> {
        validate_identifier("run id", run_id)?;
        let store = self.store.clone();
        let id = run_id.to_owned();
        let run = blocking(move || store.load_run(&id)).await?;
        if run.organization_id == organization_id {
            Ok(run)
        } else {
            Err(PackError::NotFound(format!("run {run_id}")))
        }
    }

    /// # Errors
    ///
    /// [`PackError::NotFound`] for unknown runs and for runs of other
    /// organizations.
    pub async fn run(&self, organization_id: &str, run_id: &str) -> Result<ReportRun> {
        self.run_for(organization_id, run_id).await
    }

    /// Attach uploaded bytes to a run.
    ///
    /// # Errors
    ///
    /// [`PackError::RunFinalized`] for a final run, plus the errors of
    /// [`LedgerStore::attach_artifact`].
    pub async fn attach_artifact(
        &self,
        organization_id: &str,
        run_id: &str,
        artifact: PackArtifact,
        now: DateTime<Utc>,
    ) -> Result<ReportRun> {
        self.run_for(organization_id, run_id).await?;
        let store = self.store.clone();
        let id = run_id.to_owned();
        blocking(move || store.attach_artifact(&id, artifact, now)).await
    }

    /// # Errors
    ///
    /// See [`LedgerStore::transition_run`].
    pub async fn transition_run(
        &self,
        organization_id: &str,
        run_id: &str,
        next: RunStatus,
        now: DateTime<Utc>,
    ) -> Result<ReportRun> {
        self.run_for(organization_id, run_id).await?;
        let store = self.store.clone();
        let id = run_id.to_owned();
        blocking(move || store.transition_run(&id, next, now)).await
    }

    /// Ledger entry of a pack owned by `organization_id`.
    ///
    /// # Errors
    ///
    /// [`PackError::NotFound`] for unknown packs and for packs of other
    /// organizations.
    pub async fn pack_entry(&self, organization_id: &str, pack_id: &str) -> Result<LedgerEntry> {
        validate_identifier("pack id", pack_id)?;
        let store = self.store.clone();
        let id = pack_id.to_owned();
        let entry = blocking(move || store.load_pack(&id)).await?;
        if entry.organization_id == organization_id {
            Ok(entry)
        } else {
            Err(PackError::NotFound(format!("pack {pack_id}")))
        }
    }

    /// Ledger entry and stored archive bytes of a pack.
    ///
    /// # Errors
    ///
    /// [`PackError::NotFound`] for unknown or foreign packs.
    pub async fn pack_archive(
        &self,
        organization_id: &str,
        pack_id: &str,
    ) -> Result<(LedgerEntry, Vec<u8>)> {
        let entry = self.pack_entry(organization_id, pack_id).await?;
        let store = self.store.clone();
        let id = pack_id.to_owned();
        let bytes = blocking(move || store.load_pack_archive(&id)).await?;
        Ok((entry, bytes))
    }

    /// # Errors
    ///
    /// Returns error if the ledger cannot be read.
    pub async fn list_packs(&self, organization_id: &str) -> Result<Vec<LedgerEntry>> {
        let store = self.store.clone();
        let org = organization_id.to_owned();
        blocking(move || store.list_packs(&org)).await
    }

    /// # Errors
    ///
    /// [`PackError::NotFound`] for unknown or foreign packs.
    pub async fn verify_pack(&self, organization_id: &str, pack_id: &str) -> Result<VerificationReport> {
        self.pack_entry(organization_id, pack_id).await?;
        let store = self.store.clone();
        let id = pack_id.to_owned();
        blocking(move || integrity::verify_pack(&store, &id)).await
    }

    /// # Errors
    ///
    /// [`PackError::NotFound`] for unknown or foreign runs.
    pub async fn verify_run(&self, organization_id: &str, run_id: &str) -> Result<VerificationReport> {
        self.run_for(organization_id, run_id).await?;
        let store = self.store.clone();
        let id = run_id.to_owned();
        blocking(move || integrity::verify_run(&store, &id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_valid_identifiers() {
        let now = Utc::now();
        let id = new_id("pack", now);
        assert!(validate_identifier("pack id", &id).is_ok());
        assert!(id.starts_with(&format!("pack-{}-", now.format("%Y%m%d"))));
        assert_ne!(new_id("pack", now), id);
    }
}
