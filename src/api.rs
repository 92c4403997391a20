use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::handlers::TriggerOutcome;
use crate::models::SessionSnapshot;

/// Reply to every presentation event: what the event did, and the state the
/// UI should render next.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventResponse {
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub snapshot: SessionSnapshot,
}

impl EventResponse {
    pub fn applied(applied: bool, snapshot: SessionSnapshot) -> Self {
        Self {
            outcome: if applied { "applied" } else { "ignored" }.to_string(),
            error_kind: None,
            snapshot,
        }
    }

    pub fn from_trigger(outcome: TriggerOutcome, snapshot: SessionSnapshot) -> Self {
        let (label, error_kind) = match outcome {
            TriggerOutcome::Ignored => ("ignored", None),
            TriggerOutcome::Ready { degraded: false } => ("ready", None),
            TriggerOutcome::Ready { degraded: true } => ("ready_degraded", None),
            TriggerOutcome::Failed(kind) => ("failed", Some(kind)),
        };

        Self {
            outcome: label.to_string(),
            error_kind,
            snapshot,
        }
    }
}

// Axum integration (optional - requires axum dependency)
#[cfg(feature = "http-server")]
pub mod server {
    use super::*;
    use axum::{
        body::Bytes,
        extract::{DefaultBodyLimit, Multipart, Path, State},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };
    use std::sync::Arc;

    use crate::handlers::AnalysisSession;
    use crate::models::ResultTab;
    use crate::services::UploadedFile;

    pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

    pub struct AppState {
        pub session: Arc<AnalysisSession>,
        pub access_token: Option<String>,
    }

    pub fn create_api_router(
        session: Arc<AnalysisSession>,
        access_token: Option<String>,
        max_upload_bytes: usize,
    ) -> Router {
        let state = Arc::new(AppState {
            session,
            access_token,
        });

        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_check))
            .route("/api/state", get(state_handler))
            .route("/api/camera/start", post(start_camera_handler))
            .route("/api/camera/cancel", post(cancel_camera_handler))
            .route("/api/capture", post(capture_handler))
            .route("/api/upload", post(upload_handler))
            .route("/api/tab/:tab", post(tab_handler))
            // multipart framing on top of the image itself
            .layer(DefaultBodyLimit::max(max_upload_bytes + 64 * 1024))
            .with_state(state)
    }

    /// Verify access token when one is configured
    fn authorize(headers: &HeaderMap, state: &AppState) -> Result<(), StatusCode> {
        let Some(expected) = state.access_token.as_deref() else {
            return Ok(());
        };

        let provided = headers
            .get(ACCESS_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if provided == expected {
            Ok(())
        } else {
            log::warn!("⚠️ Rejected request with missing or wrong access token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }

    fn status_for(outcome: TriggerOutcome) -> StatusCode {
        match outcome {
            TriggerOutcome::Ready { .. } => StatusCode::OK,
            TriggerOutcome::Ignored => StatusCode::CONFLICT,
            TriggerOutcome::Failed(kind) => match kind {
                ErrorKind::UnreadableFile | ErrorKind::UnsupportedFormat => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                ErrorKind::TransportError | ErrorKind::ProviderError => StatusCode::BAD_GATEWAY,
                ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            },
        }
    }

    fn trigger_response(state: &AppState, outcome: TriggerOutcome) -> Response {
        let body = EventResponse::from_trigger(outcome, state.session.snapshot());
        (status_for(outcome), Json(body)).into_response()
    }

    async fn state_handler(
        headers: HeaderMap,
        State(state): State<Arc<AppState>>,
    ) -> Result<Json<SessionSnapshot>, StatusCode> {
        authorize(&headers, &state)?;
        Ok(Json(state.session.snapshot()))
    }

    async fn start_camera_handler(
        headers: HeaderMap,
        State(state): State<Arc<AppState>>,
    ) -> Result<Json<EventResponse>, StatusCode> {
        authorize(&headers, &state)?;
        let applied = state.session.start_camera();
        Ok(Json(EventResponse::applied(applied, state.session.snapshot())))
    }

    async fn cancel_camera_handler(
        headers: HeaderMap,
        State(state): State<Arc<AppState>>,
    ) -> Result<Json<EventResponse>, StatusCode> {
        authorize(&headers, &state)?;
        let applied = state.session.cancel_camera();
        Ok(Json(EventResponse::applied(applied, state.session.snapshot())))
    }

    async fn capture_handler(
        headers: HeaderMap,
        State(state): State<Arc<AppState>>,
        body: Bytes,
    ) -> Response {
        if let Err(status) = authorize(&headers, &state) {
            return status.into_response();
        }

        log::info!("📷 Capture received: {} bytes", body.len());
        let outcome = state.session.capture_and_analyze(body.to_vec()).await;
        trigger_response(&state, outcome)
    }

    async fn upload_handler(
        headers: HeaderMap,
        State(state): State<Arc<AppState>>,
        mut multipart: Multipart,
    ) -> Response {
        if let Err(status) = authorize(&headers, &state) {
            return status.into_response();
        }

        let mut files = Vec::new();
        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    log::error!("❌ Failed to read multipart field: {}", e);
                    return (StatusCode::BAD_REQUEST, format!("Invalid multipart body: {}", e))
                        .into_response();
                }
            };

            // Plain form fields carry no file name.
            let Some(file_name) = field.file_name().map(|n| n.to_string()) else {
                continue;
            };
            if !files.is_empty() {
                log::debug!("Ignoring extra uploaded file '{}'", file_name);
                continue;
            }

            let content_type = field.content_type().map(|c| c.to_string());
            match field.bytes().await {
                Ok(bytes) => {
                    files.push(UploadedFile::from_bytes(file_name, content_type, bytes.to_vec()))
                }
                Err(e) => {
                    log::error!("❌ Failed to read uploaded file: {}", e);
                    return (StatusCode::BAD_REQUEST, format!("Could not read file: {}", e))
                        .into_response();
                }
            }
        }

        log::info!("📁 Upload received: {} file(s)", files.len());
        let outcome = state.session.upload_and_analyze(files).await;
        trigger_response(&state, outcome)
    }

    async fn tab_handler(
        headers: HeaderMap,
        State(state): State<Arc<AppState>>,
        Path(tab): Path<String>,
    ) -> Result<Json<EventResponse>, StatusCode> {
        authorize(&headers, &state)?;
        let tab = ResultTab::from_string(&tab).ok_or(StatusCode::BAD_REQUEST)?;
        state.session.select_tab(tab);
        Ok(Json(EventResponse::applied(true, state.session.snapshot())))
    }

    async fn root_handler() -> &'static str {
        "Medicine Scanner - POST an image to /api/capture or /api/upload"
    }

    async fn health_check() -> &'static str {
        "OK"
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::error::AnalysisResult;
        use crate::models::{AnalysisRequest, SessionState};
        use crate::services::{ImageSource, VisionService};
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        struct FixedVision(&'static str);

        #[async_trait::async_trait]
        impl VisionService for FixedVision {
            async fn analyze(&self, _request: &AnalysisRequest) -> AnalysisResult<String> {
                Ok(self.0.to_string())
            }
        }

        fn router(token: Option<&str>) -> Router {
            let session = Arc::new(AnalysisSession::new(
                Arc::new(FixedVision("Medicine Name: Aspirin\nSafety Rating: 7/10")),
                ImageSource::default(),
            ));
            create_api_router(session, token.map(|t| t.to_string()), 1024 * 1024)
        }

        fn multipart_request(file_name: &str, content_type: &str, data: &str) -> Request<Body> {
            let boundary = "SCANNERBOUNDARY";
            let body = format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
                 Content-Type: {c}\r\n\r\n{d}\r\n--{b}--\r\n",
                b = boundary,
                f = file_name,
                c = content_type,
                d = data
            );

            Request::builder()
                .method("POST")
                .uri("/api/upload")
                .header("content-type", format!("multipart/form-data; boundary={}", boundary))
                .body(Body::from(body))
                .unwrap()
        }

        async fn read_json(response: Response) -> EventResponse {
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            serde_json::from_slice(&bytes).unwrap()
        }

        #[tokio::test]
        async fn test_health() {
            let response = router(None)
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        #[tokio::test]
        async fn test_capture_returns_analysis() {
            let request = Request::builder()
                .method("POST")
                .uri("/api/capture")
                .body(Body::from(vec![0xff, 0xd8, 0xff]))
                .unwrap();

            let response = router(None).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let body = read_json(response).await;
            assert_eq!(body.outcome, "ready_degraded");
            assert_eq!(body.snapshot.analysis.unwrap().name, "Aspirin");
        }

        #[tokio::test]
        async fn test_bmp_upload_is_unprocessable() {
            let response = router(None)
                .oneshot(multipart_request("box.bmp", "image/bmp", "BM"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

            let body = read_json(response).await;
            assert_eq!(body.error_kind, Some(ErrorKind::UnsupportedFormat));
            assert_eq!(body.snapshot.state, SessionState::Failed(ErrorKind::UnsupportedFormat));
        }

        #[tokio::test]
        async fn test_png_upload() {
            let response = router(None)
                .oneshot(multipart_request("box.png", "image/png", "PNGDATA"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        #[tokio::test]
        async fn test_unknown_tab() {
            let request = Request::builder()
                .method("POST")
                .uri("/api/tab/history")
                .body(Body::empty())
                .unwrap();
            let response = router(None).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        #[tokio::test]
        async fn test_access_token_required() {
            let request = Request::builder().uri("/api/state").body(Body::empty()).unwrap();
            let response = router(Some("secret")).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

            let request = Request::builder()
                .uri("/api/state")
                .header(ACCESS_TOKEN_HEADER, "secret")
                .body(Body::empty())
                .unwrap();
            let response = router(Some("secret")).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
