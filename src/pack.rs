//! Proof-pack construction: request validation, manifest, archive, and the
//! service that ties them to a data source and the ledger.
//!
//! A pack is all-or-nothing. Generators run to completion, every artifact is
//! hashed, the manifest is built over those hashes, the archive is written,
//! and only then is a ledger entry persisted.

pub mod assembler;
pub mod manifest;
pub mod request;
pub mod service;

pub use assembler::{AssembledPack, CONTENT_TYPE, assemble, read_archive};
pub use manifest::{ArtifactDescriptor, PackArtifact, PackManifest, PackSummary, build_manifest};
pub use request::{
    ExportPackBody, FilterParams, PackFilters, PackRequest, Requester, Role, TimeRange, TimeRangePreset,
    validate_identifier,
};
pub use service::{BuiltPack, PackService};
