//! HTTP request handlers for the gateway API.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use gateway_core::ChatRequest;
use gateway_providers::{PoolStats, ProviderEntry};
use gateway_telemetry::{DbUsage, Stats};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    chat::DEFAULT_PROVIDER,
    error::ApiError,
    extractors::{JsonBody, RequestId},
    state::AppState,
};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Version
    pub version: String,
}

/// Liveness probe
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Chat request body
#[derive(Debug, Clone, Deserialize)]
pub struct ChatBody {
    /// Provider id, `ddg` when absent
    #[serde(default)]
    pub provider: Option<String>,
    /// The request proper
    #[serde(flatten)]
    pub request: ChatRequest,
}

/// `POST /api/chat`
#[instrument(skip(state, body), fields(model = %body.request.model))]
pub async fn chat(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    JsonBody(body): JsonBody<ChatBody>,
) -> Result<Response, ApiError> {
    let provider = body
        .provider
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
    let request = body.request;

    debug!(
        request_id = %request_id,
        provider = %provider,
        streaming = request.stream,
        messages = request.messages.len(),
        "Processing chat request"
    );

    if request.stream {
        let receiver = state.chat.stream(&provider, &request).await?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(receiver.into_body_stream()))
            .map_err(|e| ApiError::internal(format!("Failed to build response: {e}")))?;
        Ok(response)
    } else {
        let reply = state.chat.complete(&provider, &request).await?;
        Ok(Json(reply).into_response())
    }
}

/// Stats aggregate plus pool occupancy and store usage
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    /// Aggregate counters and recent log
    #[serde(flatten)]
    pub stats: Stats,
    /// Outbound connection pool occupancy
    pub connection_stats: PoolStats,
    /// Persistent store usage
    pub db_usage: DbUsage,
}

/// `GET /api/stats`
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let (stats, db_usage) = tokio::join!(state.stats.get_stats(), state.stats.db_usage());
    Json(StatsResponse {
        stats,
        connection_stats: state.http.pool_stats(),
        db_usage,
    })
}

/// Flush confirmation
#[derive(Debug, Serialize)]
pub struct FlushResponse {
    /// Always true
    pub success: bool,
    /// Confirmation text
    pub message: String,
}

/// `DELETE /api/stats`
pub async fn flush_stats(State(state): State<AppState>) -> Result<Json<FlushResponse>, ApiError> {
    state.stats.flush_all().await.map_err(|e| {
        error!(error = %e, "Stats flush failed");
        ApiError::internal(format!("Failed to flush database: {e}"))
    })?;
    info!("Stats database flushed");
    Ok(Json(FlushResponse {
        success: true,
        message: "Database flushed".to_string(),
    }))
}

/// Keep-alive answer
#[derive(Debug, Serialize)]
pub struct KeepAliveResponse {
    /// Always `alive`
    pub status: &'static str,
    /// `deep-warmup` when the pool was exercised, `basic` otherwise
    pub mode: &'static str,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

/// `GET /keep-alive`: open short requests to the text provider so the pool
/// keeps hot sockets
pub async fn keep_alive(State(state): State<AppState>) -> Json<KeepAliveResponse> {
    let http = state.config.http.clone();
    let target = state.config.pollinations.base_url.clone();

    let mode = match state
        .http
        .warm_up(&target, http.warmup_requests, http.warmup_timeout)
        .await
    {
        Ok(succeeded) => {
            debug!(target = %target, succeeded, "Deep warm-up finished");
            "deep-warmup"
        }
        Err(e) => {
            warn!(target = %target, error = %e, "Deep warm-up unavailable");
            "basic"
        }
    };

    Json(KeepAliveResponse {
        status: "alive",
        mode,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

/// Query for `GET /api/providers`
#[derive(Debug, Deserialize)]
pub struct ProvidersQuery {
    /// Model to report budgets for
    #[serde(default)]
    pub model: String,
}

/// Provider listing
#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    /// Model the budgets refer to
    pub model: String,
    /// Registered providers in registration order
    pub providers: Vec<ProviderEntry>,
}

/// `GET /api/providers?model=`
pub async fn list_providers(
    State(state): State<AppState>,
    Query(query): Query<ProvidersQuery>,
) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: state.providers.support_for(&query.model),
        model: query.model,
    })
}
