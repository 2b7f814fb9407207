use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::timeout;
use tracing::debug;

use super::wire::DrillDownResponse;
use super::{
    DeleteRequest, Document, DocumentSummary, DrillDownRequest, DrillDownResult, DrillService,
    Health, InsertRequest, Metadata, MutationAck, NewDocument, ReorderRequest, ServiceError,
    SharedWord, WordOccurrence, WordQuery,
};
use crate::config::ClientSettings;

const ERROR_MESSAGE_FIELDS: [&str; 3] = ["detail", "error", "message"];

#[derive(Debug, Clone)]
pub struct HttpServiceClient {
    http_client: reqwest::Client,
    base_url: Url,
    request_timeout_ms: u64,
}

impl HttpServiceClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, ServiceError> {
        let base_url = Url::parse(settings.base_url.trim_end_matches('/')).map_err(|error| {
            ServiceError::Configuration(format!(
                "invalid base url `{}`: {error}",
                settings.base_url
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::Configuration(format!(
                "base url `{}` cannot carry a path",
                settings.base_url
            )));
        }

        Ok(Self {
            http_client: reqwest::Client::new(),
            base_url,
            request_timeout_ms: settings.request_timeout_ms,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ServiceError::Configuration(format!(
                    "base url `{}` cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ServiceError> {
        self.within_timeout(async {
            let response = self.send(Method::GET, url, None::<&()>).await?;
            Ok(response.json().await?)
        })
        .await
    }

    async fn send_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<T, ServiceError> {
        self.within_timeout(async {
            let response = self.send(method, url, Some(body)).await?;
            Ok(response.json().await?)
        })
        .await
    }

    /// Bounds a whole call, body read and decode included, by the request timeout.
    async fn within_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, ServiceError> {
        let timeout_duration = Duration::from_millis(self.request_timeout_ms);
        match timeout(timeout_duration, call).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout {
                timeout_ms: self.request_timeout_ms,
            }),
        }
    }

    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ServiceError> {
        debug!(method = %method, url = %url, "sending service request");

        let mut request = self.http_client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        ensure_success(request.send().await?).await
    }
}

#[async_trait]
impl DrillService for HttpServiceClient {
    async fn health(&self) -> Result<Health, ServiceError> {
        self.get_json(self.endpoint(&["health"])?).await
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, ServiceError> {
        self.get_json(self.endpoint(&["api", "documents"])?).await
    }

    async fn get_document(&self, document_id: &str) -> Result<Document, ServiceError> {
        self.get_json(self.endpoint(&["api", "documents", document_id])?)
            .await
    }

    async fn create_document(&self, document: &NewDocument) -> Result<Document, ServiceError> {
        self.send_json(Method::POST, self.endpoint(&["api", "documents"])?, document)
            .await
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), ServiceError> {
        let url = self.endpoint(&["api", "documents", document_id])?;
        self.within_timeout(async {
            self.send(Method::DELETE, url, None::<&()>).await?;
            Ok(())
        })
        .await
    }

    async fn get_metadata(&self, document_id: &str) -> Result<Metadata, ServiceError> {
        self.get_json(self.endpoint(&["api", "documents", document_id, "metadata"])?)
            .await
    }

    async fn update_metadata(
        &self,
        document_id: &str,
        metadata: &Metadata,
    ) -> Result<Metadata, ServiceError> {
        let url = self.endpoint(&["api", "documents", document_id, "metadata"])?;
        let payload: Value = self.send_json(Method::PUT, url, metadata).await?;
        match payload.get("metadata") {
            Some(Value::Object(updated)) => Ok(updated.clone()),
            _ => Err(ServiceError::ResponseFormat(
                "metadata update response is missing `metadata`".to_owned(),
            )),
        }
    }

    async fn drill_down(
        &self,
        request: &DrillDownRequest,
    ) -> Result<DrillDownResult, ServiceError> {
        let response: DrillDownResponse = self
            .send_json(Method::POST, self.endpoint(&["api", "drilldown"])?, request)
            .await?;
        response.into_result()
    }

    async fn insert(&self, request: &InsertRequest) -> Result<MutationAck, ServiceError> {
        self.send_json(
            Method::POST,
            self.endpoint(&["api", "mutate", "insert"])?,
            request,
        )
        .await
    }

    async fn delete(&self, request: &DeleteRequest) -> Result<MutationAck, ServiceError> {
        self.send_json(
            Method::POST,
            self.endpoint(&["api", "mutate", "delete"])?,
            request,
        )
        .await
    }

    async fn reorder(&self, request: &ReorderRequest) -> Result<MutationAck, ServiceError> {
        self.send_json(
            Method::POST,
            self.endpoint(&["api", "mutate", "reorder"])?,
            request,
        )
        .await
    }

    async fn shared_words(&self) -> Result<Vec<SharedWord>, ServiceError> {
        self.get_json(self.endpoint(&["api", "crosslinks"])?).await
    }

    async fn traverse_word(&self, query: &WordQuery) -> Result<Vec<WordOccurrence>, ServiceError> {
        self.send_json(
            Method::POST,
            self.endpoint(&["api", "crosslinks", "traverse"])?,
            query,
        )
        .await
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::from_status(
        status,
        extract_error_message(status, &body),
    ))
}

fn extract_error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ERROR_MESSAGE_FIELDS
                .iter()
                .find_map(|field| value.get(*field).and_then(message_text))
        })
        .unwrap_or_else(|| generic_status_message(status))
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
        // Validation failures arrive as a list of `{loc, msg}` entries.
        Value::Array(entries) => {
            let messages = entries
                .iter()
                .filter_map(|entry| entry.get("msg").and_then(Value::as_str))
                .collect::<Vec<_>>();
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
        _ => None,
    }
}

fn generic_status_message(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;
    use std::time::Instant;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::time::sleep;

    use super::*;

    #[test]
    fn error_message_prefers_structured_detail() {
        let body = r#"{"detail": "Document 'ghost' not found"}"#;
        assert_eq!(
            extract_error_message(StatusCode::NOT_FOUND, body),
            "Document 'ghost' not found"
        );
    }

    #[test]
    fn error_message_joins_validation_entries() {
        let body = r#"{"detail": [{"loc": ["body", "level"], "msg": "must be <= 3"}, {"msg": "field required"}]}"#;
        assert_eq!(
            extract_error_message(StatusCode::UNPROCESSABLE_ENTITY, body),
            "must be <= 3; field required"
        );
    }

    #[test]
    fn error_message_falls_back_to_status_description() {
        assert_eq!(
            extract_error_message(StatusCode::BAD_GATEWAY, "<html>upstream down</html>"),
            "502 Bad Gateway"
        );
        assert_eq!(
            extract_error_message(StatusCode::INTERNAL_SERVER_ERROR, r#"{"detail": "  "}"#),
            "500 Internal Server Error"
        );
    }

    #[test]
    fn endpoints_escape_document_ids() {
        let client = HttpServiceClient::new(&ClientSettings::for_base_url("http://localhost:8000/"))
            .expect("client should build");

        let url = client
            .endpoint(&["api", "documents", "notes/today"])
            .expect("endpoint should build");
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/documents/notes%2Ftoday"
        );
    }

    #[test]
    fn endpoints_keep_base_path_prefix() {
        let client =
            HttpServiceClient::new(&ClientSettings::for_base_url("http://host:9000/drill"))
                .expect("client should build");

        let url = client
            .endpoint(&["api", "drilldown"])
            .expect("endpoint should build");
        assert_eq!(url.as_str(), "http://host:9000/drill/api/drilldown");
    }

    #[test]
    fn invalid_base_url_is_a_configuration_error() {
        let error = HttpServiceClient::new(&ClientSettings::for_base_url("not a url"))
            .expect_err("client should reject url");
        assert!(matches!(error, ServiceError::Configuration(_)));
    }

    #[tokio::test]
    async fn stalled_response_body_counts_against_the_timeout() {
        let listener = match TcpListener::bind("127.0.0.1:0").await {
            Ok(listener) => listener,
            Err(error) if error.kind() == ErrorKind::PermissionDenied => {
                eprintln!("skipping: local TCP bind is not permitted in this environment");
                return;
            }
            Err(error) => panic!("failed to bind test listener: {error}"),
        };
        let addr = listener
            .local_addr()
            .expect("listener should have a local address");
        tokio::spawn(async move {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut request = [0_u8; 1024];
            let _ = stream.read(&mut request).await;
            let _ = stream
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n{\"status\":",
                )
                .await;
            sleep(Duration::from_secs(5)).await;
        });

        let mut settings = ClientSettings::for_base_url(format!("http://{addr}"));
        settings.request_timeout_ms = 200;
        let client = HttpServiceClient::new(&settings).expect("client should build");

        let started = Instant::now();
        let error = client.health().await.expect_err("health should time out");
        assert!(
            matches!(error, ServiceError::Timeout { timeout_ms: 200 }),
            "unexpected error: {error:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
