//! Shared fixtures for the integration tests.

use chrono::{DateTime, Duration, Utc};
use proofpack::config::ExportSettings;
use proofpack::datasource::{DataSource, Dataset, FixtureSource, Organization};
use proofpack::ledger::LedgerStore;
use proofpack::pack::{
    ExportPackBody, FilterParams, PackRequest, PackService, Requester, Role, TimeRangePreset,
    read_archive,
};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;

pub const ORG: &str = "org-northwind";
pub const OTHER_ORG: &str = "org-contoso";

fn stamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Scenario A data for [`ORG`], relative to `now`:
/// controls c-1 and c-2 completed (c-2 as `"COMPLETED"`), c-3 open and past
/// due; attestations a-1 signed and a-2 pending. [`OTHER_ORG`] has one
/// control of its own.
pub fn dataset(now: DateTime<Utc>) -> Dataset {
    let recent = stamp(now - Duration::days(2));
    let past_due = (now - Duration::days(10)).date_naive().to_string();
    let later = (now + Duration::days(20)).date_naive().to_string();

    let rows: Vec<Value> = vec![
        json!({"kind": "control", "organization_id": ORG, "id": "c-1",
               "title": "Guardrails inspected", "status": "completed", "severity": "low",
               "owner": "Sam Ortiz", "due_date": later, "updated_at": recent,
               "job_id": "job-1", "job_type": "roofing"}),
        json!({"kind": "control", "organization_id": ORG, "id": "c-2",
               "title": "Harness certification", "status": "COMPLETED", "severity": "high",
               "owner": "Ana Lee", "due_date": past_due, "updated_at": recent,
               "job_id": "job-1", "job_type": "roofing"}),
        json!({"kind": "control", "organization_id": ORG, "id": "c-3",
               "title": "Ladder tie-off", "status": "pending", "severity": "medium",
               "owner": "Sam Ortiz", "due_date": past_due, "updated_at": recent,
               "job_id": "job-2", "job_type": "electrical"}),
        json!({"kind": "attestation", "organization_id": ORG, "id": "a-1",
               "title": "Site supervisor sign-off", "status": "signed",
               "signer": "Ana Lee", "signer_role": "safety_lead",
               "signed_at": stamp(now - Duration::days(1)),
               "created_at": stamp(now - Duration::days(3)), "job_id": "job-1"}),
        json!({"kind": "attestation", "organization_id": ORG, "id": "a-2",
               "title": "Crew briefing acknowledgement", "status": "pending",
               "created_at": stamp(now - Duration::days(4)), "job_id": "job-2"}),
        json!({"kind": "control", "organization_id": OTHER_ORG, "id": "x-1",
               "title": "Other tenant control", "status": "pending", "severity": "critical",
               "updated_at": recent}),
    ];

    Dataset {
        organizations: vec![
            Organization {
                id: ORG.to_owned(),
                name: "Northwind Roofing".to_owned(),
            },
            Organization {
                id: OTHER_ORG.to_owned(),
                name: "Contoso Electric".to_owned(),
            },
        ],
        rows,
    }
}

pub fn fixture_source(now: DateTime<Utc>) -> Arc<dyn DataSource> {
    Arc::new(FixtureSource::new(dataset(now)))
}

pub fn service_with(dir: &Path, source: Arc<dyn DataSource>, settings: ExportSettings) -> PackService {
    PackService::new(source, LedgerStore::open(dir).unwrap(), settings)
}

pub fn service(dir: &Path, now: DateTime<Utc>) -> PackService {
    service_with(dir, fixture_source(now), ExportSettings::default())
}

pub fn requester(role: Role) -> Requester {
    Requester {
        user_id: "u-100".to_owned(),
        name: "Dana Whitfield".to_owned(),
        role,
    }
}

pub fn body(preset: TimeRangePreset) -> ExportPackBody {
    ExportPackBody {
        time_range: preset,
        start_date: None,
        end_date: None,
        filters: None,
    }
}

pub fn body_with_filters(preset: TimeRangePreset, filters: FilterParams) -> ExportPackBody {
    ExportPackBody {
        filters: Some(filters),
        ..body(preset)
    }
}

pub fn request(body: ExportPackBody, now: DateTime<Utc>) -> PackRequest {
    PackRequest::validate(ORG, requester(Role::Admin), body, now).unwrap()
}

/// Entry `name` of a ZIP archive as UTF-8 text.
pub fn entry_text(archive: &[u8], name: &str) -> String {
    let entries = read_archive(archive).unwrap();
    let (_, bytes) = entries
        .into_iter()
        .find(|(entry, _)| entry == name)
        .unwrap_or_else(|| panic!("archive has no entry {name}"));
    String::from_utf8(bytes).unwrap()
}

/// Data lines of a CSV export, header excluded.
pub fn data_lines(csv: &str) -> Vec<&str> {
    csv.lines().skip(1).filter(|l| !l.is_empty()).collect()
}
