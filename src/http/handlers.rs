//! Route handlers.
//!
//! Caller identity comes from headers set by the trusted gateway in front of
//! the service; see [`Identity`].

use super::AppState;
use super::error_response::ApiError;
use crate::error::PackError;
use crate::generators::ArtifactKind;
use crate::integrity::VerificationReport;
use crate::ledger::store::validate_filename;
use crate::ledger::{LedgerEntry, ReportRun, RunStatus};
use crate::pack::{
    ArtifactDescriptor, CONTENT_TYPE, ExportPackBody, PackArtifact, PackRequest, Requester,
    validate_identifier,
};
use axum::Json;
use axum::async_trait;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const X_ORGANIZATION_ID: &str = "x-organization-id";
pub const X_USER_ID: &str = "x-user-id";
pub const X_USER_ROLE: &str = "x-user-role";
pub const X_USER_NAME: &str = "x-user-name";
pub const X_PACK_ID: &str = "x-pack-id";
pub const X_PACK_SHA256: &str = "x-pack-sha256";

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Authenticated caller and the organization it acts for.
#[derive(Debug, Clone)]
pub struct Identity {
    pub organization_id: String,
    pub requester: Requester,
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl Identity {
    /// # Errors
    ///
    /// [`PackError::Unauthorized`] when a required header is missing,
    /// [`PackError::InvalidFormat`] for a malformed organization id,
    /// [`PackError::Forbidden`] for an unknown role.
    pub fn from_headers(headers: &HeaderMap) -> crate::error::Result<Self> {
        let missing = |name: &str| PackError::Unauthorized(format!("missing {name} header"));

        let organization_id =
            header_text(headers, X_ORGANIZATION_ID).ok_or_else(|| missing(X_ORGANIZATION_ID))?;
        let user_id = header_text(headers, X_USER_ID).ok_or_else(|| missing(X_USER_ID))?;
        let role = header_text(headers, X_USER_ROLE).ok_or_else(|| missing(X_USER_ROLE))?;
        validate_identifier("organization id", organization_id)?;

        Ok(Self {
            organization_id: organization_id.to_owned(),
            requester: Requester {
                user_id: user_id.to_owned(),
                name: header_text(headers, X_USER_NAME)
                    .unwrap_or(user_id)
                    .to_owned(),
                role: role.parse()?,
            },
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> ApiResult<Self> {
        Ok(Self::from_headers(&parts.headers)?)
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /api/audit/export/pack`
pub async fn export_pack(
    State(state): State<AppState>,
    identity: Identity,
    body: std::result::Result<Json<ExportPackBody>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body?;
    let now = Utc::now();
    let request = PackRequest::validate(&identity.organization_id, identity.requester, body, now)?;

    let built = state.service.build_pack(request, now).await?;
    let archive = built.archive;
    let disposition = archive.content_disposition();

    let mut response = Response::new(Body::from(archive.bytes));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
    insert_text(headers, header::CONTENT_DISPOSITION, &disposition);
    insert_text(headers, HeaderName::from_static(X_PACK_ID), &archive.pack_id);
    insert_text(headers, HeaderName::from_static(X_PACK_SHA256), &archive.sha256);
    Ok(response)
}

fn insert_text(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(e) => tracing::warn!(header = %name, error = %e, "dropping unrepresentable header"),
    }
}

#[derive(Debug, Serialize)]
pub struct PackList {
    pub packs: Vec<LedgerEntry>,
}

/// `GET /api/audit/packs`
pub async fn list_packs(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<Json<PackList>> {
    let packs = state.service.list_packs(&identity.organization_id).await?;
    Ok(Json(PackList { packs }))
}

/// `GET /api/audit/packs/:pack_id`
pub async fn get_pack(
    State(state): State<AppState>,
    identity: Identity,
    Path(pack_id): Path<String>,
) -> ApiResult<Json<LedgerEntry>> {
    let entry = state
        .service
        .pack_entry(&identity.organization_id, &pack_id)
        .await?;
    Ok(Json(entry))
}

/// `GET /api/audit/packs/:pack_id/download`
pub async fn download_pack(
    State(state): State<AppState>,
    identity: Identity,
    Path(pack_id): Path<String>,
) -> ApiResult<Response> {
    let (entry, bytes) = state
        .service
        .pack_archive(&identity.organization_id, &pack_id)
        .await?;

    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
    insert_text(
        headers,
        header::CONTENT_DISPOSITION,
        &format!("attachment; filename=\"{}\"", entry.archive_filename),
    );
    insert_text(headers, HeaderName::from_static(X_PACK_ID), &entry.pack_id);
    insert_text(headers, HeaderName::from_static(X_PACK_SHA256), &entry.archive_sha256);
    Ok(response)
}

/// `GET /api/audit/packs/:pack_id/verify`
pub async fn verify_pack(
    State(state): State<AppState>,
    identity: Identity,
    Path(pack_id): Path<String>,
) -> ApiResult<Json<VerificationReport>> {
    let report = state
        .service
        .verify_pack(&identity.organization_id, &pack_id)
        .await?;
    Ok(Json(report))
}

/// `POST /api/reports/runs`
pub async fn create_run(
    State(state): State<AppState>,
    identity: Identity,
    body: std::result::Result<Json<ExportPackBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ReportRun>)> {
    let Json(body) = body?;
    let now = Utc::now();
    let request = PackRequest::validate(&identity.organization_id, identity.requester, body, now)?;
    let run = state.service.create_run(request, now).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

/// `GET /api/reports/runs/:run_id`
pub async fn get_run(
    State(state): State<AppState>,
    identity: Identity,
    Path(run_id): Path<String>,
) -> ApiResult<Json<ReportRun>> {
    let run = state.service.run(&identity.organization_id, &run_id).await?;
    Ok(Json(run))
}

#[derive(Debug, Deserialize)]
pub struct AttachBody {
    pub filename: String,
    pub content_base64: String,
    #[serde(default)]
    pub record_count: Option<u64>,
}

impl AttachBody {
    /// # Errors
    ///
    /// [`PackError::InvalidFormat`] for a bad file name or undecodable
    /// content.
    pub fn into_artifact(self) -> crate::error::Result<PackArtifact> {
        let format = validate_filename(&self.filename)?;
        let bytes = STANDARD
            .decode(self.content_base64.trim())
            .map_err(|e| PackError::InvalidFormat(format!("content_base64: {e}")))?;
        Ok(PackArtifact {
            descriptor: ArtifactDescriptor::describe(
                self.filename,
                ArtifactKind::Attachment,
                format,
                self.record_count.unwrap_or(0),
                &bytes,
            ),
            bytes,
        })
    }
}

/// `POST /api/reports/runs/:run_id/artifacts`
pub async fn attach_artifact(
    State(state): State<AppState>,
    identity: Identity,
    Path(run_id): Path<String>,
    body: std::result::Result<Json<AttachBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ReportRun>)> {
    let Json(body) = body?;
    identity.requester.ensure_can_export()?;
    let artifact = body.into_artifact()?;
    let run = state
        .service
        .attach_artifact(&identity.organization_id, &run_id, artifact, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(run)))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: RunStatus,
}

/// `POST /api/reports/runs/:run_id/status`
pub async fn transition_run(
    State(state): State<AppState>,
    identity: Identity,
    Path(run_id): Path<String>,
    body: std::result::Result<Json<StatusBody>, JsonRejection>,
) -> ApiResult<Json<ReportRun>> {
    let Json(body) = body?;
    identity.requester.ensure_can_export()?;
    let run = state
        .service
        .transition_run(&identity.organization_id, &run_id, body.status, Utc::now())
        .await?;
    Ok(Json(run))
}

/// `GET /api/reports/runs/:run_id/verify`
pub async fn verify_run(
    State(state): State<AppState>,
    identity: Identity,
    Path(run_id): Path<String>,
) -> ApiResult<Json<VerificationReport>> {
    let report = state
        .service
        .verify_run(&identity.organization_id, &run_id)
        .await?;
    Ok(Json(report))
}

/// Fallback for unknown routes, rendered through the error contract.
pub async fn not_found() -> impl IntoResponse {
    ApiError(PackError::NotFound("no such route".to_owned()))
}

pub async fn method_not_allowed(method: Method) -> impl IntoResponse {
    ApiError(PackError::MethodNotAllowed(format!("{method} is not supported on this route")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::Role;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_identity_from_headers() {
        let identity = Identity::from_headers(&headers(&[
            (X_ORGANIZATION_ID, "org-1"),
            (X_USER_ID, "u-7"),
            (X_USER_ROLE, "Safety-Lead"),
        ]))
        .unwrap();
        assert_eq!(identity.organization_id, "org-1");
        assert_eq!(identity.requester.role, Role::SafetyLead);
        assert_eq!(identity.requester.name, "u-7");
    }

    #[test]
    fn test_identity_missing_header() {
        let err = Identity::from_headers(&headers(&[(X_ORGANIZATION_ID, "org-1")])).unwrap_err();
        assert!(matches!(err, PackError::Unauthorized(_)));
    }

    #[test]
    fn test_identity_unknown_role() {
        let err = Identity::from_headers(&headers(&[
            (X_ORGANIZATION_ID, "org-1"),
            (X_USER_ID, "u-7"),
            (X_USER_ROLE, "superuser"),
        ]))
        .unwrap_err();
        assert!(matches!(err, PackError::Forbidden(_)));
    }

    #[test]
    fn test_attach_body_decoding() {
        let body = AttachBody {
            filename: "signoff.pdf".to_owned(),
            content_base64: STANDARD.encode(b"%PDF-1.5 signed"),
            record_count: Some(1),
        };
        let artifact = body.into_artifact().unwrap();
        assert_eq!(artifact.bytes, b"%PDF-1.5 signed");
        assert_eq!(artifact.descriptor.record_count, 1);
        assert!(artifact.descriptor.matches(&artifact.bytes));

        let bad = AttachBody {
            filename: "../escape.pdf".to_owned(),
            content_base64: String::new(),
            record_count: None,
        };
        assert!(matches!(bad.into_artifact(), Err(PackError::InvalidFormat(_))));

        let garbage = AttachBody {
            filename: "notes.csv".to_owned(),
            content_base64: "***".to_owned(),
            record_count: None,
        };
        assert!(matches!(garbage.into_artifact(), Err(PackError::InvalidFormat(_))));
    }
}
