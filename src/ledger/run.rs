//! Report runs and their status machine.

use crate::error::{PackError, Result};
use crate::pack::ArtifactDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Draft,
    ReadyForSignatures,
    Final,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::ReadyForSignatures => "ready_for_signatures",
            Self::Final => "final",
        }
    }

    /// Only forward, single-step moves are allowed.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::ReadyForSignatures) | (Self::ReadyForSignatures, Self::Final)
        )
    }

    pub fn accepts_writes(self) -> bool {
        !matches!(self, Self::Final)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A report run and the artifacts attached to it so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRun {
    pub run_id: String,
    pub organization_id: String,
    pub created_by: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub artifacts: Vec<ArtifactDescriptor>,
}

impl ReportRun {
    pub fn new(
        run_id: impl Into<String>,
        organization_id: impl Into<String>,
        created_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            organization_id: organization_id.into(),
            created_by: created_by.into(),
            status: RunStatus::Draft,
            created_at: now,
            updated_at: now,
            artifacts: Vec::new(),
        }
    }

    /// # Errors
    ///
    /// Returns [`PackError::RunFinalized`] if the run is final.
    pub fn ensure_writable(&self) -> Result<()> {
        if self.status.accepts_writes() {
            Ok(())
        } else {
            Err(PackError::RunFinalized(format!(
                "run {} is final and cannot be modified",
                self.run_id
            )))
        }
    }

    /// Record a new artifact on the run.
    ///
    /// # Errors
    ///
    /// [`PackError::RunFinalized`] on a final run; [`PackError::InvalidState`]
    /// if an artifact with the same file name is already attached.
    pub fn attach(&mut self, descriptor: ArtifactDescriptor, now: DateTime<Utc>) -> Result<()> {
        self.ensure_writable()?;
        if self
            .artifacts
            .iter()
            .any(|a| a.filename == descriptor.filename)
        {
            return Err(PackError::InvalidState(format!(
                "run {} already has an artifact named {}",
                self.run_id, descriptor.filename
            )));
        }
        self.artifacts.push(descriptor);
        self.updated_at = now;
        Ok(())
    }

    /// Move the run to `next`.
    ///
    /// # Errors
    ///
    /// [`PackError::RunFinalized`] on a final run; [`PackError::InvalidState`]
    /// for any move other than the next forward step.
    pub fn transition(&mut self, next: RunStatus, now: DateTime<Utc>) -> Result<()> {
        self.ensure_writable()?;
        if !self.status.can_transition_to(next) {
            return Err(PackError::InvalidState(format!(
                "run {} cannot move from {} to {next}",
                self.run_id, self.status
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}
