//! Query-layer seam.
//!
//! Pack generation reads organizations and raw rows through [`DataSource`].
//! Production deployments put the relational store behind this trait; the
//! crate ships [`FixtureSource`], which serves a JSON dataset file and is
//! what the CLI and the tests run against.

use crate::error::{PackError, Result, ResultExt as _};
use crate::pack::request::TimeRange;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
}

/// Source of organizations and compliance rows.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Look up an organization.
    ///
    /// # Errors
    ///
    /// [`PackError::NotFound`] for an unknown id, [`PackError::Query`] when
    /// the backing store fails.
    async fn organization(&self, organization_id: &str) -> Result<Organization>;

    /// Raw rows for `organization_id` inside `range`, shaped as tagged JSON
    /// objects (`"kind": "control" | "attestation"`).
    ///
    /// # Errors
    ///
    /// [`PackError::Query`] when the backing store fails.
    async fn fetch_rows(&self, organization_id: &str, range: &TimeRange) -> Result<Vec<Value>>;
}

/// On-disk dataset layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default)]
    pub rows: Vec<Value>,
}

/// A [`DataSource`] backed by an in-memory [`Dataset`].
#[derive(Debug, Clone, Default)]
pub struct FixtureSource {
    dataset: Arc<Dataset>,
}

impl FixtureSource {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset: Arc::new(dataset),
        }
    }

    /// Load a dataset file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a dataset.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("Failed to read dataset: {}", path.display()))?;
        let dataset: Dataset = serde_json::from_slice(&raw)
            .map_err(|e| PackError::Config(format!("{} is not a dataset: {e}", path.display())))?;

        tracing::info!(
            path = %path.display(),
            organizations = dataset.organizations.len(),
            rows = dataset.rows.len(),
            "loaded dataset"
        );
        Ok(Self::new(dataset))
    }
}

/// Timestamp that places a row in a reporting window.
fn row_timestamp(row: &Value) -> Option<DateTime<Utc>> {
    let field = match row.get("kind").and_then(Value::as_str)? {
        "control" => "updated_at",
        "attestation" => "created_at",
        _ => return None,
    };
    let raw = row.get(field).and_then(Value::as_str)?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[async_trait]
impl DataSource for FixtureSource {
    async fn organization(&self, organization_id: &str) -> Result<Organization> {
        self.dataset
            .organizations
            .iter()
            .find(|org| org.id == organization_id)
            .cloned()
            .ok_or_else(|| PackError::NotFound(format!("organization {organization_id}")))
    }

    async fn fetch_rows(&self, organization_id: &str, range: &TimeRange) -> Result<Vec<Value>> {
        let rows = self
            .dataset
            .rows
            .iter()
            .filter(|row| {
                row.get("organization_id").and_then(Value::as_str) == Some(organization_id)
            })
            // Rows without a usable timestamp pass through so decoding can
            // report them rather than silently dropping them.
            .filter(|row| row_timestamp(row).is_none_or(|ts| range.contains(ts)))
            .cloned()
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::request::TimeRangePreset;
    use serde_json::json;

    fn source() -> FixtureSource {
        FixtureSource::new(Dataset {
            organizations: vec![Organization {
                id: "org-1".to_owned(),
                name: "Northwind".to_owned(),
            }],
            rows: vec![
                json!({"kind": "control", "organization_id": "org-1", "id": "c1",
                       "title": "t", "updated_at": "2026-03-01T00:00:00Z"}),
                json!({"kind": "control", "organization_id": "org-1", "id": "c2",
                       "title": "t", "updated_at": "2025-01-01T00:00:00Z"}),
                json!({"kind": "attestation", "organization_id": "org-2", "id": "a1",
                       "title": "t", "created_at": "2026-03-01T00:00:00Z"}),
            ],
        })
    }

    fn march() -> TimeRange {
        TimeRange {
            preset: TimeRangePreset::Custom,
            start: DateTime::parse_from_rfc3339("2026-02-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            end: DateTime::parse_from_rfc3339("2026-03-31T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[tokio::test]
    async fn test_rows_scoped_by_org_and_window() {
        let rows = source().fetch_rows("org-1", &march()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "c1");
    }

    #[tokio::test]
    async fn test_unknown_organization() {
        let err = source().organization("org-9").await.unwrap_err();
        assert!(matches!(err, PackError::NotFound(_)));
    }

    #[test]
    fn test_load_rejects_non_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(
            FixtureSource::load(&path).unwrap_err(),
            PackError::Config(_)
        ));
    }
}
