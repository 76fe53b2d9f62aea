//! # proofpack - compliance proof packs with verifiable integrity
//!
//! `proofpack` turns an organization's compliance records (controls and
//! attestations) into an audit-ready ZIP archive: a PDF report, CSV exports,
//! an evidence index, and a manifest listing the SHA-256 hash of every
//! artifact. Generated packs are recorded in an append-only ledger and can be
//! re-verified at any time.
//!
//! ## Quick Start
//!
//! ```no_run
//! use chrono::Utc;
//! use proofpack::config::ExportSettings;
//! use proofpack::datasource::FixtureSource;
//! use proofpack::ledger::LedgerStore;
//! use proofpack::pack::{ExportPackBody, PackRequest, PackService, Requester, Role, TimeRangePreset};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> proofpack::error::Result<()> {
//! let source = FixtureSource::load(Path::new("dataset.json"))?;
//! let store = LedgerStore::open("data")?;
//! let service = PackService::new(Arc::new(source), store, ExportSettings::default());
//!
//! let requester = Requester {
//!     user_id: "u-1".to_owned(),
//!     name: "Dana".to_owned(),
//!     role: Role::Admin,
//! };
//! let body = ExportPackBody {
//!     time_range: TimeRangePreset::Last30Days,
//!     start_date: None,
//!     end_date: None,
//!     filters: None,
//! };
//! let now = Utc::now();
//! let request = PackRequest::validate("org-1", requester, body, now)?;
//! let built = service.build_pack(request, now).await?;
//! println!("{} ({} bytes)", built.archive.download_name, built.archive.bytes.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`pack`]: request validation, manifest, archive assembly, orchestration
//! - [`generators`]: controls CSV, attestations CSV, PDF report, evidence index
//! - [`integrity`]: canonical hashing and verification
//! - [`ledger`]: pack ledger entries and report runs
//! - [`rows`]: typed compliance records
//! - [`sanitize`]: text cleanup applied to every exported field
//! - [`datasource`]: the seam to the compliance data store
//! - [`http`]: the axum service
//! - [`config`], [`logging`], [`error`]: ambient infrastructure
//!
//! ## Determinism
//!
//! Two packs built from the same rows, filters, and time range differ only
//! in their pack id, which appears in the manifest and in file names. Every
//! artifact body hashes identically.

#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod datasource;
pub mod error;
pub mod generators;
pub mod http;
pub mod integrity;
pub mod ledger;
pub mod logging;
pub mod pack;
pub mod rows;
pub mod sanitize;
