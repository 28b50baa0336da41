//! HTTP client for the managed document API.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Fields, RecordKind};
use crate::util::{compact_text, is_http_url, normalize_text_option, parse_rfc3339};

use super::{CommittedWrite, RemoteRecord, RemoteStore, RemoteWrite, Session};

/// Document-store client over the managed HTTP API.
///
/// Collections are namespaced per user:
/// `GET  {base}/v1/users/{uid}/collections/{kind}` reads all documents,
/// `POST {base}/v1/users/{uid}/collections/{kind}/batch` commits a batch.
#[derive(Clone)]
pub struct HttpRemoteStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemoteStore {
    /// Build a client for the given API base URL. Every request carries
    /// the same overall timeout so a stalled connection cannot hang a
    /// sync pass.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| Error::RemoteUnavailable(error.to_string()))?;
        Ok(Self { base_url, client })
    }

    fn collection_url(&self, session: &Session, kind: RecordKind) -> String {
        format!(
            "{}/v1/users/{}/collections/{kind}",
            self.base_url, session.user_id
        )
    }
}

impl RemoteStore for HttpRemoteStore {
    async fn fetch_all(&self, session: &Session, kind: RecordKind) -> Result<Vec<RemoteRecord>> {
        let response = self
            .client
            .get(self.collection_url(session, kind))
            .bearer_auth(&session.access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let response = ensure_success(response).await?;
        let payload = response
            .json::<FetchResponse>()
            .await
            .map_err(transport_error)?;

        payload
            .documents
            .into_iter()
            .map(RemoteRecord::try_from)
            .collect()
    }

    async fn batch_write(
        &self,
        session: &Session,
        kind: RecordKind,
        writes: Vec<RemoteWrite>,
    ) -> Result<Vec<CommittedWrite>> {
        if writes.is_empty() {
            return Ok(Vec::new());
        }

        let body = BatchRequest {
            writes: writes
                .iter()
                .map(|write| WriteDto {
                    id: write.id.as_deref(),
                    fields: &write.fields,
                    deleted: write.deleted,
                })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/batch", self.collection_url(session, kind)))
            .bearer_auth(&session.access_token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let response = ensure_success(response).await?;
        let payload = response
            .json::<BatchResponse>()
            .await
            .map_err(transport_error)?;

        if payload.results.len() != writes.len() {
            return Err(Error::RemoteUnavailable(format!(
                "batch commit acknowledged {} of {} writes",
                payload.results.len(),
                writes.len()
            )));
        }

        payload
            .results
            .into_iter()
            .map(CommittedWrite::try_from)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    documents: Vec<DocumentDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentDto {
    id: String,
    #[serde(default)]
    fields: Fields,
    #[serde(default)]
    deleted: bool,
    last_modified: String,
}

impl TryFrom<DocumentDto> for RemoteRecord {
    type Error = Error;

    fn try_from(value: DocumentDto) -> Result<Self> {
        let last_modified = parse_rfc3339(&value.last_modified).map_err(|_| {
            Error::RemoteUnavailable(format!(
                "document {} carries invalid lastModified '{}'",
                value.id, value.last_modified
            ))
        })?;
        Ok(Self {
            id: value.id,
            fields: value.fields,
            deleted: value.deleted,
            last_modified,
        })
    }
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    writes: Vec<WriteDto<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WriteDto<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    fields: &'a Fields,
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    results: Vec<CommitDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitDto {
    id: String,
    last_modified: String,
}

impl TryFrom<CommitDto> for CommittedWrite {
    type Error = Error;

    fn try_from(value: CommitDto) -> Result<Self> {
        let last_modified = parse_rfc3339(&value.last_modified).map_err(|_| {
            Error::RemoteUnavailable(format!(
                "commit for {} carries invalid lastModified '{}'",
                value.id, value.last_modified
            ))
        })?;
        Ok(Self {
            id: value.id,
            last_modified,
        })
    }
}

fn transport_error(error: reqwest::Error) -> Error {
    Error::RemoteUnavailable(error.to_string())
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::AuthRequired);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::RemoteUnavailable(parse_api_error(status, &body)))
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        Error::InvalidInput("remote API base URL must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "remote API base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("api.example.com".to_string()).is_err());
        assert_eq!(
            normalize_base_url("https://api.example.com/".to_string()).unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn document_dto_parses_and_converts() {
        let dto: DocumentDto = serde_json::from_value(json!({
            "id": "doc-1",
            "fields": {"title": "Run", "progress": 10},
            "lastModified": "2026-03-01T10:00:00.000Z"
        }))
        .unwrap();

        let record = RemoteRecord::try_from(dto).unwrap();
        assert_eq!(record.id, "doc-1");
        assert!(!record.deleted);
        assert_eq!(record.fields["progress"], json!(10));
    }

    #[test]
    fn document_with_bad_timestamp_is_remote_unavailable() {
        let dto: DocumentDto = serde_json::from_value(json!({
            "id": "doc-2",
            "lastModified": "not-a-timestamp"
        }))
        .unwrap();

        assert!(matches!(
            RemoteRecord::try_from(dto),
            Err(Error::RemoteUnavailable(_))
        ));
    }

    #[test]
    fn write_dto_omits_absent_id() {
        let fields = Fields::new();
        let dto = WriteDto {
            id: None,
            fields: &fields,
            deleted: false,
        };
        let value = serde_json::to_value(&dto).unwrap();
        assert!(value.get("id").is_none());
    }

    #[test]
    fn parse_api_error_prefers_structured_message() {
        let message = parse_api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"message": "quota exceeded"}"#,
        );
        assert_eq!(message, "quota exceeded (500)");

        let fallback = parse_api_error(StatusCode::BAD_GATEWAY, "");
        assert_eq!(fallback, "HTTP 502");
    }
}
