// Main entry point for the road hazard detection service

use roadeye_detect::{
    core::{
        types::{DetectionRequest, DetectionResponse},
        Config, PipelineError,
    },
    pipeline::DetectionPipeline,
    services::{ObjectDetector, OnnxFaceDetector, OnnxObjectDetector},
    utils::Metrics,
};

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "RoadEye AI Detection Service";

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    pipeline: Arc<DetectionPipeline>,
    metrics: Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().context("Failed to load configuration")?);

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "roadeye_detect={},ort=off",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== {} ===", SERVICE_NAME);
    info!(
        "Config: floor={} iou={} target={} blur_sigma={}",
        config.confidence_floor(),
        config.iou_threshold(),
        config.target_size(),
        config.blur_sigma()
    );

    // The face capability is required; the service refuses to start without
    // it so no un-redacted image can ever reach detection.
    let face_detector = Arc::new(
        OnnxFaceDetector::load(&config).context("Failed to load face detection model")?,
    );

    // The object detector is allowed to be absent: the service stays up,
    // reports model_loaded=false, and answers /detect with 503.
    let detector: Option<Arc<dyn ObjectDetector>> = match OnnxObjectDetector::load(&config) {
        Ok(detector) => Some(Arc::new(detector)),
        Err(e) => {
            error!("Failed to load detection model: {}", e);
            None
        }
    };

    let metrics = Metrics::new();
    let pipeline = Arc::new(DetectionPipeline::new(
        config.clone(),
        detector,
        face_detector,
    ));
    let state = AppState {
        pipeline,
        metrics,
    };

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/detect", post(detect))
        .with_state(state)
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // one encoded image
        .layer(cors);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("Server starting on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /         - Service identity");
    info!("  GET  /health   - Health check");
    info!("  GET  /metrics  - Prometheus metrics");
    info!("  GET  /stats    - Detailed statistics");
    info!("  POST /detect   - Detect road hazards (JSON)");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "model_loaded": state.pipeline.model_loaded(),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let snapshot = state.metrics.snapshot();
    serde_json::to_value(snapshot).map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize metrics: {}", e),
        )
    })
}

/// Detect road hazards in a base64-encoded image
///
/// # Request Format:
/// - JSON body: {"imageBase64": string, "latitude": float, "longitude": float}
///
/// # Response:
/// - DetectionResponse JSON; detected=false is still a 200
async fn detect(
    State(state): State<AppState>,
    Json(request): Json<DetectionRequest>,
) -> Result<Json<DetectionResponse>, (StatusCode, Json<serde_json::Value>)> {
    let start_time = std::time::Instant::now();

    info!(
        "Received detect request at ({:.5}, {:.5})",
        request.latitude, request.longitude
    );

    match state.pipeline.handle(request).await {
        Ok(response) => {
            state.metrics.record_request(true, start_time.elapsed());
            if let Some(hazard) = &response.hazard {
                state.metrics.record_hazard(hazard.category.as_str());
            }
            info!(
                "Request completed in {:.2}s: detected={} confidence={:.3}",
                start_time.elapsed().as_secs_f64(),
                response.detected,
                response.confidence
            );
            Ok(Json(response))
        }
        Err(e) => {
            state.metrics.record_request(false, start_time.elapsed());
            Err(error_response(e))
        }
    }
}

/// Map pipeline failures to status codes once, at the boundary. Internal
/// causes are logged here and never exposed in the response body.
fn error_response(error: PipelineError) -> (StatusCode, Json<serde_json::Value>) {
    let (status, detail) = match &error {
        PipelineError::InvalidImage(cause) => {
            warn!("Rejected image payload: {}", cause);
            (StatusCode::BAD_REQUEST, "Invalid base64 image")
        }
        PipelineError::ModelUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "Model not loaded"),
        other => {
            error!("Detection error: {}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "Detection failed")
        }
    };
    (status, Json(serde_json::json!({ "detail": detail })))
}
