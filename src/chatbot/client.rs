use async_trait::async_trait;
use std::time::Duration;

use crate::chatbot::types::{CourseSettingsMetadata, MetadataBody};
use crate::error::AppError;

/// Header carrying the shared service key.
const API_KEY_HEADER: &str = "HMS-API-KEY";

// ============================================================================
// Trait
// ============================================================================

/// The chatbot service's course-settings endpoints.
///
/// Errors are `AppError::ChatbotApi { status, .. }` for non-success
/// responses and `AppError::NetworkOffline` when no response arrived.
#[async_trait]
pub trait ChatbotSettingsApi: Send + Sync {
    async fn create(
        &self,
        course_id: i64,
        metadata: &CourseSettingsMetadata,
    ) -> Result<(), AppError>;

    async fn update(
        &self,
        course_id: i64,
        metadata: &CourseSettingsMetadata,
    ) -> Result<(), AppError>;

    async fn delete(&self, course_id: i64) -> Result<(), AppError>;
}

// ============================================================================
// ChatbotClient
// ============================================================================

/// HTTP client for the chatbot service's settings API.
pub struct ChatbotClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ChatbotClient {
    /// Create a client for `base_url`; every request uses `timeout`.
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build reqwest client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    // --------------------------------------------------------------------
    // Private HTTP helpers
    // --------------------------------------------------------------------

    fn authed(&self, method: reqwest::Method, course_id: i64) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/course-setting/{}", self.base_url, course_id))
            .header(API_KEY_HEADER, &self.api_key)
    }

    /// Send a request and discard the response body, classifying failures.
    async fn send_ok(&self, req: reqwest::RequestBuilder) -> Result<(), AppError> {
        let resp = req
            .send()
            .await
            .map_err(|e| AppError::NetworkOffline(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(AppError::ChatbotApi {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChatbotSettingsApi for ChatbotClient {
    /// `POST /course-setting/{course_id}`
    async fn create(
        &self,
        course_id: i64,
        metadata: &CourseSettingsMetadata,
    ) -> Result<(), AppError> {
        let req = self
            .authed(reqwest::Method::POST, course_id)
            .json(&MetadataBody { metadata });
        self.send_ok(req).await
    }

    /// `PATCH /course-setting/{course_id}`
    async fn update(
        &self,
        course_id: i64,
        metadata: &CourseSettingsMetadata,
    ) -> Result<(), AppError> {
        let req = self
            .authed(reqwest::Method::PATCH, course_id)
            .json(&MetadataBody { metadata });
        self.send_ok(req).await
    }

    /// `DELETE /course-setting/{course_id}`
    async fn delete(&self, course_id: i64) -> Result<(), AppError> {
        self.send_ok(self.authed(reqwest::Method::DELETE, course_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatbot::types::OrganizationDescriptor;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<(String, i64, Option<serde_json::Value>)>>>;

    fn status_for(course_id: i64, headers: &HeaderMap) -> StatusCode {
        if headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) != Some("secret") {
            return StatusCode::UNAUTHORIZED;
        }
        match course_id {
            500 => StatusCode::INTERNAL_SERVER_ERROR,
            422 => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::OK,
        }
    }

    async fn create_handler(
        State(calls): State<Calls>,
        Path(course_id): Path<i64>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        calls.lock().unwrap().push(("POST".into(), course_id, Some(body)));
        status_for(course_id, &headers)
    }

    async fn update_handler(
        State(calls): State<Calls>,
        Path(course_id): Path<i64>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        calls.lock().unwrap().push(("PATCH".into(), course_id, Some(body)));
        status_for(course_id, &headers)
    }

    async fn delete_handler(
        State(calls): State<Calls>,
        Path(course_id): Path<i64>,
        headers: HeaderMap,
    ) -> StatusCode {
        calls.lock().unwrap().push(("DELETE".into(), course_id, None));
        status_for(course_id, &headers)
    }

    async fn spawn_service() -> (String, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/course-setting/{course_id}",
                post(create_handler).patch(update_handler).delete(delete_handler),
            )
            .with_state(calls.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/"), calls)
    }

    fn metadata() -> CourseSettingsMetadata {
        CourseSettingsMetadata {
            organization_settings: OrganizationDescriptor {
                id: "os".into(),
                organization_id: 1,
                default_provider_id: None,
            },
            model: None,
            prompt: "p".into(),
            temperature: 0.5,
            top_k: 5,
            similarity_threshold_documents: 0.55,
            similarity_threshold_questions: 0.9,
        }
    }

    #[tokio::test]
    async fn test_calls_reach_service_with_key() {
        let (url, calls) = spawn_service().await;
        let client = ChatbotClient::new(url, "secret".into(), Duration::from_secs(5)).unwrap();

        client.create(12, &metadata()).await.unwrap();
        client.update(12, &metadata()).await.unwrap();
        client.delete(12).await.unwrap();

        let calls = calls.lock().unwrap();
        let methods: Vec<&str> = calls.iter().map(|(m, _, _)| m.as_str()).collect();
        assert_eq!(methods, vec!["POST", "PATCH", "DELETE"]);
        assert_eq!(calls[0].1, 12);
        assert_eq!(calls[0].2.as_ref().unwrap()["metadata"]["temperature"], 0.5);
    }

    #[tokio::test]
    async fn test_status_classification() {
        let (url, _calls) = spawn_service().await;
        let client =
            ChatbotClient::new(url.clone(), "secret".into(), Duration::from_secs(5)).unwrap();

        let err = client.update(500, &metadata()).await.unwrap_err();
        assert!(err.is_service_unreachable());

        let err = client.update(422, &metadata()).await.unwrap_err();
        assert!(matches!(err, AppError::ChatbotApi { status: 422, .. }));
        assert!(!err.is_service_unreachable());

        let wrong_key = ChatbotClient::new(url, "nope".into(), Duration::from_secs(5)).unwrap();
        let err = wrong_key.delete(1).await.unwrap_err();
        assert!(matches!(err, AppError::ChatbotApi { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_offline() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            ChatbotClient::new(format!("http://{addr}"), "secret".into(), Duration::from_secs(2))
                .unwrap();
        let err = client.delete(1).await.unwrap_err();
        assert!(matches!(err, AppError::NetworkOffline(_)));
        assert!(err.is_service_unreachable());
    }
}
