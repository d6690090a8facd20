// Voice Calculator - Web Server
// REST API with Axum

use anyhow::anyhow;
use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use voice_calculator::{
    clear_history, constants_list, delete_calculation, functions_list, get_history,
    get_history_count, get_statistics, is_allowed_audio_file, normalize_voice_text,
    supported_languages, CalculationRecord, CalculationRequest, CalculatorService, Config,
    ExportFormat, HealthStatus, ServiceError,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    service: Arc<CalculatorService>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(message: impl Into<String>, kind: Option<&'static str>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            kind,
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
enum ApiError {
    BadRequest {
        message: String,
        kind: Option<&'static str>,
    },
    NotFound(String),
    Unavailable(String),
    Internal(anyhow::Error),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            kind: None,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Calculation(calc) => ApiError::BadRequest {
                message: calc.to_string(),
                kind: Some(calc.kind()),
            },
            ServiceError::Internal(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest { message, kind } => {
                (StatusCode::BAD_REQUEST, ApiResponse::failure(message, kind))
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, ApiResponse::failure(message, None)),
            ApiError::Unavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, ApiResponse::failure(message, None))
            }
            ApiError::Internal(e) => {
                error!("Request failed: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiResponse::failure("Internal server error", None),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Run blocking work (SQLite, subprocesses, files) off the async workers
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&CalculatorService) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let service = state.service.clone();
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| ApiError::Internal(anyhow!("Blocking task failed: {}", e)))?
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-session-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn audio_url(filename: &str) -> String {
    format!("/api/audio/{}", filename)
}

// ============================================================================
// Request / Response bodies
// ============================================================================

#[derive(Deserialize)]
struct CalculateBody {
    #[serde(default)]
    expression: String,
    #[serde(default)]
    generate_audio: bool,
    #[serde(default)]
    voice_input: Option<String>,
}

#[derive(Serialize)]
struct CalculateResponse {
    result: voice_calculator::Number,
    expression: String,
    audio_url: Option<String>,
    history_id: i64,
    timestamp: String,
}

#[derive(Deserialize)]
struct TextBody {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct NormalizeResponse {
    text: String,
    expression: String,
}

#[derive(Serialize)]
struct VoiceResponse {
    transcribed_text: String,
    expression: String,
    timestamp: String,
}

#[derive(Serialize)]
struct SpeechResponse {
    audio_url: String,
    filename: String,
}

#[derive(Deserialize)]
struct HistoryQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Serialize)]
struct HistoryResponse {
    history: Vec<CalculationRecord>,
    total: i64,
    page: u32,
    limit: u32,
    has_more: bool,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    version: &'static str,
    services: HealthStatus,
}

// ============================================================================
// API Handlers
// ============================================================================

/// POST /api/calculate - Evaluate and record an expression
async fn calculate(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<CalculateBody>,
) -> ApiResult<CalculateResponse> {
    if body.expression.trim().is_empty() {
        return Err(ApiError::bad_request("Expression is required"));
    }

    let request = CalculationRequest {
        expression: body.expression,
        voice_input: body.voice_input,
        session_id: session_id(&headers),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        ip_address: peer.map(|ConnectInfo(addr)| addr.ip().to_string()),
        generate_audio: body.generate_audio,
    };

    let outcome = blocking(&state, move |service| Ok(service.calculate(request)?)).await?;

    Ok(Json(ApiResponse::ok(CalculateResponse {
        result: outcome.result,
        expression: outcome.expression,
        audio_url: outcome.audio_filename.as_deref().map(audio_url),
        history_id: outcome.history_id,
        timestamp: outcome.timestamp.to_rfc3339(),
    })))
}

/// POST /api/normalize - Spoken text to expression, without evaluating
async fn normalize(Json(body): Json<TextBody>) -> ApiResult<NormalizeResponse> {
    let expression = normalize_voice_text(&body.text);
    Ok(Json(ApiResponse::ok(NormalizeResponse {
        text: body.text,
        expression,
    })))
}

/// POST /api/voice-to-text - Multipart upload, field `audio`
async fn voice_to_text(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<VoiceResponse> {
    if !state.service.speech().transcriber.is_available() {
        return Err(ApiError::Unavailable("Speech recognition is not available".to_string()));
    }

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed upload: {}", e)))?
    {
        if field.name() != Some("audio") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Malformed upload: {}", e)))?;
        upload = Some((filename, bytes));
        break;
    }

    let Some((filename, audio)) = upload.filter(|(name, _)| is_allowed_audio_file(name)) else {
        return Err(ApiError::bad_request("Invalid or missing audio file"));
    };
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let voice = blocking(&state, move |service| {
        Ok(service.voice_to_expression(&audio, &extension)?)
    })
    .await?;

    Ok(Json(ApiResponse::ok(VoiceResponse {
        transcribed_text: voice.transcribed_text,
        expression: voice.expression,
        timestamp: Utc::now().to_rfc3339(),
    })))
}

/// POST /api/text-to-speech - Synthesize arbitrary text
async fn text_to_speech(
    State(state): State<AppState>,
    Json(body): Json<TextBody>,
) -> ApiResult<SpeechResponse> {
    if body.text.trim().is_empty() {
        return Err(ApiError::bad_request("Text is required"));
    }
    if !state.service.speech().synthesizer.is_available() {
        return Err(ApiError::Unavailable("Text-to-speech is not available".to_string()));
    }

    let filename = blocking(&state, move |service| Ok(service.speak(&body.text)?)).await?;

    Ok(Json(ApiResponse::ok(SpeechResponse {
        audio_url: audio_url(&filename),
        filename,
    })))
}

/// GET /api/audio/:filename - Stored audio
async fn serve_audio(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    // Decode URL-encoded filename
    let decoded = urlencoding::decode(&filename)
        .map(|name| name.into_owned())
        .unwrap_or(filename);

    if state.service.audio().resolve(&decoded).is_none() {
        return Err(ApiError::bad_request("Invalid file format"));
    }

    let content_type = match decoded.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "wav" => "audio/wav",
        Some(ext) if ext == "flac" => "audio/flac",
        Some(ext) if ext == "m4a" => "audio/mp4",
        _ => "audio/mpeg",
    };

    let audio = blocking(&state, move |service| Ok(service.audio().load(&decoded)?)).await?;

    match audio {
        Some(bytes) => Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response()),
        None => Err(ApiError::NotFound("File not found".to_string())),
    }
}

/// GET /api/history?page&limit - Paged history for the caller's session
async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<HistoryResponse> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let session = session_id(&headers);

    let (history, total) = blocking(&state, move |service| {
        Ok(service.with_db(|conn| {
            let history = get_history(conn, page, limit, session.as_deref())?;
            let total = get_history_count(conn, session.as_deref())?;
            Ok((history, total))
        })?)
    })
    .await?;

    Ok(Json(ApiResponse::ok(HistoryResponse {
        history,
        total,
        page,
        limit,
        has_more: i64::from(page) * i64::from(limit) < total,
    })))
}

/// DELETE /api/history/:id
async fn delete_history_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<MessageResponse> {
    let deleted = blocking(&state, move |service| {
        Ok(service.with_db(|conn| delete_calculation(conn, id))?)
    })
    .await?;

    if !deleted {
        return Err(ApiError::NotFound("Not found".to_string()));
    }
    Ok(Json(ApiResponse::ok(MessageResponse {
        message: "Deleted".to_string(),
    })))
}

/// DELETE /api/history - Clear the caller's session (or everything)
async fn clear_history_items(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<MessageResponse> {
    let session = session_id(&headers);
    let removed = blocking(&state, move |service| {
        Ok(service.with_db(|conn| clear_history(conn, session.as_deref()))?)
    })
    .await?;

    Ok(Json(ApiResponse::ok(MessageResponse {
        message: format!("History cleared ({} calculations)", removed),
    })))
}

/// GET /api/export-history?format=json|csv - Download as attachment
async fn export_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let format: ExportFormat = query
        .format
        .as_deref()
        .unwrap_or("json")
        .parse()
        .map_err(|e: anyhow::Error| ApiError::bad_request(e.to_string()))?;
    let session = session_id(&headers);

    let (filename, bytes) = blocking(&state, move |service| {
        let path = service.export(format, session.as_deref())?;
        let bytes = std::fs::read(&path).map_err(anyhow::Error::from)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok((filename, bytes))
    })
    .await?;

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// GET /api/functions
async fn functions() -> impl IntoResponse {
    Json(ApiResponse::ok(functions_list()))
}

/// GET /api/constants
async fn constants() -> impl IntoResponse {
    Json(ApiResponse::ok(constants_list()))
}

/// GET /api/languages
async fn languages() -> impl IntoResponse {
    Json(ApiResponse::ok(supported_languages()))
}

/// GET /api/stats - History statistics
async fn stats(State(state): State<AppState>) -> ApiResult<voice_calculator::HistoryStatistics> {
    let stats = blocking(&state, |service| Ok(service.with_db(get_statistics)?)).await?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// GET /api/health - Health check
async fn health_check(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    let services = blocking(&state, |service| Ok(service.health())).await?;

    Ok(Json(ApiResponse::ok(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
        version: voice_calculator::VERSION,
        services,
    })))
}

// ============================================================================
// Router
// ============================================================================

fn build_router(state: AppState, config: &Config) -> Router {
    let api_routes = Router::new()
        .route("/calculate", post(calculate))
        .route("/normalize", post(normalize))
        .route("/voice-to-text", post(voice_to_text))
        .route("/text-to-speech", post(text_to_speech))
        .route("/audio/:filename", get(serve_audio))
        .route("/history", get(history).delete(clear_history_items))
        .route("/history/:id", delete(delete_history_item))
        .route("/export-history", get(export_history))
        .route("/functions", get(functions))
        .route("/constants", get(constants))
        .route("/languages", get(languages))
        .route("/stats", get(stats))
        .route("/health", get(health_check))
        .fallback(|| async { ApiError::NotFound("Endpoint not found".to_string()) })
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .fallback_service(ServeDir::new(&config.web_dir))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes))
        .layer(CorsLayer::permissive())
}

/// Hourly purge of stored audio past its age limit
fn spawn_audio_cleanup(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        loop {
            ticker.tick().await;
            match blocking(&state, |service| Ok(service.audio().cleanup_old_files()?)).await {
                Ok(0) => {}
                Ok(removed) => info!("Removed {} old audio files", removed),
                Err(e) => warn!("Audio cleanup failed: {:?}", e),
            }
        }
    });
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("voice_calculator=info,calc_server=info")),
        )
        .init();

    info!("🌐 Voice Calculator - Web Server v{}", voice_calculator::VERSION);

    let config = Config::from_env()?;
    let service = CalculatorService::from_config(&config)?;

    let state = AppState {
        service: Arc::new(service),
    };
    spawn_audio_cleanup(state.clone());

    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("🚀 Server running on http://{}", config.bind_addr);
    info!("   Frontend: {:?}", config.web_dir);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use rusqlite::Connection;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use voice_calculator::{setup_database, AudioStore, SpeechServices, Transcriber};

    struct FixedTranscript;

    impl Transcriber for FixedTranscript {
        fn backend(&self) -> Option<&str> {
            Some("fixed")
        }

        fn transcribe(&self, _audio: &[u8], _extension: &str) -> anyhow::Result<String> {
            Ok("what is five plus three".to_string())
        }
    }

    fn test_app(speech: SpeechServices) -> Router {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let root = std::env::temp_dir().join(format!("calc_server_{}", uuid::Uuid::new_v4()));
        let config = Config {
            audio_dir: root.join("voice"),
            export_dir: root.join("history"),
            web_dir: root.join("frontend"),
            ..Config::default()
        };

        let audio = AudioStore::new(&config.audio_dir, config.audio_max_age_hours).unwrap();
        let service = CalculatorService::new(conn, speech, audio, &config.export_dir);
        let state = AppState {
            service: Arc::new(service),
        };
        build_router(state, &config)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value, session: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(session) = session {
            builder = builder.header("X-Session-ID", session);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_req(uri: &str, session: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(session) = session {
            builder = builder.header("X-Session-ID", session);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn multipart(field: &str, filename: &str) -> Request<Body> {
        let boundary = "calcboundary";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\nRIFF\r\n--{b}--\r\n",
            b = boundary,
            field = field,
            filename = filename,
        );
        Request::builder()
            .method("POST")
            .uri("/api/voice-to-text")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_calculate_and_history() {
        let app = test_app(SpeechServices::unavailable());

        let (status, body) =
            send(&app, post_json("/api/calculate", json!({"expression": "2+3*4"}), Some("s1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["result"], json!(14));
        assert_eq!(body["data"]["audio_url"], Value::Null);

        send(&app, post_json("/api/calculate", json!({"expression": "1+1"}), Some("s2"))).await;

        let (status, body) = send(&app, get_req("/api/history?page=1&limit=10", Some("s1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], json!(1));
        assert_eq!(body["data"]["history"][0]["expression"], json!("2+3*4"));
        assert_eq!(body["data"]["has_more"], json!(false));
    }

    #[tokio::test]
    async fn test_calculation_errors_are_bad_requests() {
        let app = test_app(SpeechServices::unavailable());

        let (status, body) =
            send(&app, post_json("/api/calculate", json!({"expression": "10/0"}), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["kind"], json!("division_by_zero"));
        assert_eq!(body["error"], json!("Division by zero"));

        let (status, body) =
            send(&app, post_json("/api/calculate", json!({"expression": "__import__('os')"}), None))
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], json!("unsafe_expression"));

        let (status, body) = send(&app, post_json("/api/calculate", json!({}), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Expression is required"));
    }

    #[tokio::test]
    async fn test_normalize() {
        let app = test_app(SpeechServices::unavailable());
        let (status, body) = send(
            &app,
            post_json("/api/normalize", json!({"text": "twenty-five times two"}), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["expression"], json!("25*2"));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let app = test_app(SpeechServices::unavailable());
        let (_, body) =
            send(&app, post_json("/api/calculate", json!({"expression": "6*7"}), None)).await;
        let id = body["data"]["history_id"].as_i64().unwrap();

        let delete_req = |uri: String| {
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap()
        };

        let (status, _) = send(&app, delete_req(format!("/api/history/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, delete_req(format!("/api/history/{}", id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, delete_req("/api/history".to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
    }

    #[tokio::test]
    async fn test_voice_to_text() {
        let silent = test_app(SpeechServices::unavailable());
        let (status, _) = send(&silent, multipart("audio", "clip.wav")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let app = test_app(SpeechServices {
            transcriber: Arc::new(FixedTranscript),
            synthesizer: Arc::new(voice_calculator::Unavailable),
        });

        let (status, body) = send(&app, multipart("audio", "clip.wav")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["transcribed_text"], json!("what is five plus three"));
        assert_eq!(body["data"]["expression"], json!("5+3"));

        let (status, _) = send(&app, multipart("audio", "clip.exe")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, multipart("file", "clip.wav")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_text_to_speech_unavailable() {
        let app = test_app(SpeechServices::unavailable());
        let (status, _) =
            send(&app, post_json("/api/text-to-speech", json!({"text": "hello"}), None)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) =
            send(&app, post_json("/api/text-to-speech", json!({"text": "  "}), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_audio_filename_checks() {
        let app = test_app(SpeechServices::unavailable());
        let (status, _) = send(&app, get_req("/api/audio/notes.txt", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, get_req("/api/audio/missing.wav", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_export_history() {
        let app = test_app(SpeechServices::unavailable());
        send(&app, post_json("/api/calculate", json!({"expression": "sqrt(16)"}), None)).await;

        let response = app
            .clone()
            .oneshot(get_req("/api/export-history?format=csv", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.contains("calculator_history_"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("sqrt(16)"));

        let (status, _) = send(&app, get_req("/api/export-history?format=xml", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_catalog_endpoints_and_health() {
        let app = test_app(SpeechServices::unavailable());

        let (_, body) = send(&app, get_req("/api/functions", None)).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 13);

        let (_, body) = send(&app, get_req("/api/constants", None)).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 3);

        let (_, body) = send(&app, get_req("/api/languages", None)).await;
        assert_eq!(body["data"][0]["code"], json!("en-US"));

        let (status, body) = send(&app, get_req("/api/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["services"]["database"], json!(true));
        assert_eq!(body["data"]["services"]["tts"], json!(false));

        let (status, _) = send(&app, get_req("/api/nope", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stats() {
        let app = test_app(SpeechServices::unavailable());
        send(&app, post_json("/api/calculate", json!({"expression": "1+1"}), Some("s1"))).await;
        send(&app, post_json("/api/calculate", json!({"expression": "1+1"}), Some("s1"))).await;

        let (status, body) = send(&app, get_req("/api/stats", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_calculations"], json!(2));
        assert_eq!(body["data"]["total_sessions"], json!(1));
        assert_eq!(body["data"]["popular_expressions"][0]["expression"], json!("1+1"));
    }
}
