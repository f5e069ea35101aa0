pub mod config;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod validation;

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path as UrlPath, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use hits_core::{plot, HitEstimate, HitEstimator};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::metrics::{AppMetrics, MetricsResponse, SystemStats};
use crate::validation::{
    sanitize_filename, validate_extension, validate_file_size, validate_link,
};

static START_TIME: OnceLock<Instant> = OnceLock::new();

#[derive(Clone)]
pub struct AppState {
    pub estimator: Arc<dyn HitEstimator>,
    pub metrics: Arc<AppMetrics>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let estimator: Arc<dyn HitEstimator> = Arc::from(config.estimator.build());
        Self {
            estimator,
            metrics: Arc::new(AppMetrics::default()),
            config,
        }
    }
}

#[derive(Serialize)]
pub struct ProcessResponse {
    message: String,
    file: String,
    estimated_hits: usize,
    plot_url: String,
}

#[derive(Deserialize)]
pub struct LinkRequest {
    link: String,
}

/// Build the application router with the full middleware stack.
pub fn build_router(state: AppState) -> Router {
    let _ = START_TIME.get_or_init(Instant::now);

    let config = &state.config;

    // CORS configuration - environment-aware
    let cors = if let Some(ref allowed_origins) = config.cors_allowed_origins {
        let origins: Vec<axum::http::HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin: &String| origin.parse::<axum::http::HeaderValue>().ok())
            .collect();

        if origins.is_empty() {
            warn!("CORS_ALLOWED_ORIGINS is empty, falling back to permissive CORS");
            permissive_cors()
        } else {
            info!("CORS configured for {} origin(s)", origins.len());
            CorsLayer::new()
                .allow_origin(tower_http::cors::AllowOrigin::list(origins))
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(tower_http::cors::Any)
                .allow_credentials(false)
        }
    } else {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        permissive_cors()
    };

    // Global rate limit; all requests share one bucket, which behaves
    // predictably behind Docker/proxy setups where per-IP keys do not
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second((config.rate_limit_per_minute / 60).max(1) as u64)
            .burst_size(config.rate_limit_per_minute.max(1))
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .unwrap(),
    );

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors)
        .into_inner();

    let public_api = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/upload-audio", post(upload_audio))
        .route("/process-link", post(process_link))
        .route("/plots/{file}", get(get_plot));

    // Metrics endpoint - consider adding authentication in production
    let metrics_api = Router::new().route("/metrics", get(metrics_endpoint));

    let api = Router::new().merge(public_api).merge(metrics_api);

    // Multipart encoding overhead on top of the raw file cap
    let body_limit = state.config.max_upload_bytes + 64 * 1024;

    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware_stack)
        .with_state(state)
}

fn permissive_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::Any)
        .allow_credentials(false)
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    request.headers_mut().insert(
        "x-request-id",
        axum::http::HeaderValue::from_str(&request_id).unwrap(),
    );
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        "x-request-id",
        axum::http::HeaderValue::from_str(&request_id).unwrap(),
    );
    response
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn upload_audio(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ProcessResponse>, ApiError> {
    let started = Instant::now();
    let result = handle_upload(&state, multipart).await;
    match result {
        Ok(response) => {
            state
                .metrics
                .upload
                .record_request(started.elapsed().as_millis() as u64);
            Ok(response)
        }
        Err(e) => {
            state.metrics.upload.record_error();
            Err(e)
        }
    }
}

async fn handle_upload(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<Json<ProcessResponse>, ApiError> {
    let mut stored: Option<(PathBuf, String, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(format!("Invalid multipart data: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name != "file" {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .ok_or_else(|| ApiError::InvalidInput("Missing filename".to_string()))?;

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::InvalidInput(format!("Failed to read file: {e}")))?;

        validate_extension(&filename)?;
        validate_file_size(data.len(), state.config.max_upload_bytes)?;

        let stored_name = format!("{}_{}", Uuid::new_v4(), sanitize_filename(&filename));
        let path = state.config.upload_dir.join(&stored_name);

        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| ApiError::InternalError(format!("Failed to save upload: {e}")))?;

        info!("Upload stored: {} ({} bytes)", path.display(), data.len());
        stored = Some((path, stored_name, filename));
    }

    let (path, stored_name, original_name) =
        stored.ok_or_else(|| ApiError::InvalidInput("No file field in request".to_string()))?;

    let (estimated_hits, plot_url) = analyze_and_plot(state, path, &stored_name).await?;

    Ok(Json(ProcessResponse {
        message: "Audio received and processed".to_string(),
        file: original_name,
        estimated_hits,
        plot_url,
    }))
}

pub async fn process_link(
    State(state): State<AppState>,
    Form(req): Form<LinkRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let started = Instant::now();
    let result = handle_link(&state, req).await;
    match result {
        Ok(response) => {
            state
                .metrics
                .link
                .record_request(started.elapsed().as_millis() as u64);
            Ok(response)
        }
        Err(e) => {
            state.metrics.link.record_error();
            Err(e)
        }
    }
}

async fn handle_link(state: &AppState, req: LinkRequest) -> Result<Json<ProcessResponse>, ApiError> {
    validate_link(&req.link)?;

    let (path, stored_name) = fetch::fetch_remote(&req.link, &state.config).await?;
    let (estimated_hits, plot_url) = analyze_and_plot(state, path, &stored_name).await?;

    Ok(Json(ProcessResponse {
        message: "Link received and processed".to_string(),
        file: stored_name,
        estimated_hits,
        plot_url,
    }))
}

/// Decode, estimate, and render the scatter plot for a stored file. The
/// CPU-bound pipeline runs on the blocking pool.
async fn analyze_and_plot(
    state: &AppState,
    path: PathBuf,
    stored_name: &str,
) -> Result<(usize, String), ApiError> {
    let stem = Path::new(stored_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(stored_name);
    let plot_name = format!("{stem}_plot.png");
    let plot_path = state.config.plot_dir.join(&plot_name);

    let estimator = state.estimator.clone();
    let started = Instant::now();

    let estimate = tokio::task::spawn_blocking(move || -> anyhow::Result<HitEstimate> {
        let clip = hits_core::decode_file(&path)?;
        let estimate = estimator.estimate(&clip)?;
        plot::render_scatter(&estimate, clip.duration_secs(), &plot_path)?;
        Ok(estimate)
    })
    .await
    .map_err(|e| ApiError::InternalError(format!("Task join error: {e}")))??;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    state
        .metrics
        .analysis
        .record_analysis(elapsed_ms, estimate.count);

    info!(
        "Analyzed {} with {}: {} hits in {}ms",
        stored_name,
        state.estimator.name(),
        estimate.count,
        elapsed_ms
    );

    Ok((estimate.count, format!("/plots/{plot_name}")))
}

pub async fn get_plot(
    State(state): State<AppState>,
    UrlPath(file): UrlPath<String>,
) -> Result<Response, ApiError> {
    // The stored names are already sanitized; anything that changes under
    // sanitization is not one of ours
    if sanitize_filename(&file) != file {
        return Err(ApiError::InvalidInput("Invalid plot name".to_string()));
    }

    let path = state.config.plot_dir.join(&file);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("No plot named {file}")))?;

    Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let cpu_usage = system.global_cpu_info().cpu_usage();
    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    let system_load = {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/proc/loadavg")
                .ok()
                .and_then(|loadavg| {
                    loadavg
                        .split_whitespace()
                        .next()
                        .and_then(|s| s.parse::<f64>().ok())
                })
        }
        #[cfg(not(unix))]
        None
    };

    Json(MetricsResponse {
        timestamp: chrono::Utc::now(),
        system: SystemStats {
            cpu_usage_percent: cpu_usage,
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            uptime_seconds: uptime,
            system_load,
        },
        upload: state.metrics.upload.snapshot(),
        link: state.metrics.link.snapshot(),
        analysis: state.metrics.analysis.snapshot(),
    })
}
