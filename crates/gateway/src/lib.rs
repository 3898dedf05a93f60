//! # Crosslink Gateway
//!
//! The validator's HTTP control surface: health, batch and proof queries,
//! the on-demand intake, and the peer attestation endpoint.
#![forbid(unsafe_code)]

/// Component health aggregation.
pub mod health;

use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    extract::{ConnectInfo, Path, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use crosslink_api::peers::{AttestationRequest, AttestationResponse, PeerAttestation};
use crosslink_crypto::{DomainTag, KeyManager};
use crosslink_engine::commitments::attestation_message;
use crosslink_engine::BatchEngine;
use crosslink_storage::LedgerStore;
use crosslink_telemetry::rpc_metrics;
use crosslink_types::batch::BatchMode;
use crosslink_types::config::GatewayConfig;
use crosslink_types::Hash32;
use crosslink_validator::orchestration::ProofIndex;
use dashmap::DashMap;
use health::{HealthLevel, HealthRegistry};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::{
    net::{IpAddr, SocketAddr},
    str::FromStr,
    sync::Arc,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use tokio::sync::watch;
use tower::{
    limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer, BoxError,
    ServiceBuilder,
};
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

// --- Error handling ---

pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg, code) = match self {
            AppError::BadRequest(s) => (StatusCode::BAD_REQUEST, s, "INVALID_REQUEST"),
            AppError::NotFound(s) => (StatusCode::NOT_FOUND, s, "NOT_FOUND"),
            AppError::Internal(e) => {
                tracing::error!(target: "gateway", "internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                    "INTERNAL_ERROR",
                )
            }
        };
        (
            status,
            Json(serde_json::json!({ "error": { "code": code, "message": msg } })),
        )
            .into_response()
    }
}

// --- Shared state ---

/// Everything the handlers reach.
pub struct GatewayContext {
    pub batcher: Arc<BatchEngine>,
    pub store: LedgerStore,
    pub key_manager: Arc<KeyManager>,
    pub proofs: Arc<ProofIndex>,
    pub health: Arc<HealthRegistry>,
    pub validator_id: String,
}

// --- Rate limiter ---

#[derive(Clone)]
struct IpLimiter {
    buckets: Arc<DashMap<IpAddr, Bucket>>,
    rps: f64,
    burst: f64,
    trusted_proxy_cidrs: Arc<Vec<IpNetwork>>,
}

#[derive(Clone)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

impl IpLimiter {
    fn new(rps: u32, burst: u32, trusted_proxy_cidrs: Arc<Vec<IpNetwork>>) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            rps: rps as f64,
            burst: burst as f64,
            trusted_proxy_cidrs,
        }
    }

    fn client_ip<B>(&self, req: &Request<B>) -> IpAddr {
        if let Some(peer_ip) = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|c| c.0.ip())
        {
            if self
                .trusted_proxy_cidrs
                .iter()
                .any(|cidr| cidr.contains(peer_ip))
            {
                if let Some(xff) = req
                    .headers()
                    .get("x-forwarded-for")
                    .and_then(|h| h.to_str().ok())
                {
                    if let Some(first) = xff.split(',').next() {
                        if let Ok(ip) = first.trim().parse::<IpAddr>() {
                            return ip;
                        }
                    }
                }
            }
            return peer_ip;
        }
        IpAddr::from([127, 0, 0, 1])
    }

    fn allow<B>(&self, req: &Request<B>) -> bool {
        let ip = self.client_ip(req);
        let now = Instant::now();
        let mut entry = self.buckets.entry(ip).or_insert_with(|| Bucket {
            tokens: self.burst,
            last: now,
        });
        let elapsed = now.duration_since(entry.last).as_secs_f64();
        entry.tokens = (entry.tokens + elapsed * self.rps).min(self.burst);
        entry.last = now;
        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

async fn rate_limit_middleware(
    State(limiter): State<IpLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if limiter.allow(&req) {
        next.run(req).await
    } else {
        (StatusCode::TOO_MANY_REQUESTS, "too many requests").into_response()
    }
}

async fn map_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(serde_json::json!({
                "error": { "code": "TIMEOUT", "message": "request timed out" }
            })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": { "code": "OVERLOADED", "message": err.to_string() }
            })),
        )
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// --- Request/response types ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnDemandTx {
    tx_hash: Hash32,
    account_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnDemandRequest {
    transactions: Vec<OnDemandTx>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OnDemandResponse {
    accepted: usize,
    batch_ids: Vec<Uuid>,
}

// --- Handlers ---

async fn health_handler(State(ctx): State<Arc<GatewayContext>>) -> Response {
    let (level, components) = ctx.health.aggregate();
    let consensus_height = ctx.store.abci_state().ok().map(|s| s.last_block_height);
    let body = Json(serde_json::json!({
        "status": level,
        "components": components,
        "validatorId": ctx.validator_id,
        "lastConsensusHeight": consensus_height,
    }));
    match level {
        HealthLevel::Ok | HealthLevel::Degraded => (StatusCode::OK, body).into_response(),
        HealthLevel::Error => (StatusCode::SERVICE_UNAVAILABLE, body).into_response(),
    }
}

async fn on_demand_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Json(payload): Json<OnDemandRequest>,
) -> Result<Json<OnDemandResponse>, AppError> {
    if payload.transactions.is_empty() {
        return Err(AppError::BadRequest("no transactions supplied".into()));
    }
    let mut batch_ids = Vec::with_capacity(payload.transactions.len());
    for tx in &payload.transactions {
        if !tx.account_url.starts_with("acc://") {
            return Err(AppError::BadRequest(format!(
                "account url {:?} is out of scope",
                tx.account_url
            )));
        }
        let id = ctx
            .batcher
            .submit(tx.tx_hash, tx.account_url.clone(), BatchMode::OnDemand)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
        batch_ids.push(id);
    }
    batch_ids.dedup();
    Ok(Json(OnDemandResponse {
        accepted: payload.transactions.len(),
        batch_ids,
    }))
}

async fn current_batches_handler(State(ctx): State<Arc<GatewayContext>>) -> Response {
    Json(ctx.batcher.open_batches()).into_response()
}

async fn batch_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = Uuid::from_str(&id).map_err(|e| AppError::BadRequest(format!("batch id: {}", e)))?;
    let batch = ctx
        .batcher
        .batch(&id)
        .ok_or_else(|| AppError::NotFound(format!("no batch {}", id)))?;
    Ok(Json(batch).into_response())
}

async fn proof_by_tx_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Path(hash): Path<String>,
) -> Result<Response, AppError> {
    let tx = Hash32::from_hex(&hash).map_err(|e| AppError::BadRequest(format!("tx hash: {}", e)))?;
    let proof = ctx
        .proofs
        .by_tx(&tx)
        .ok_or_else(|| AppError::NotFound(format!("no proof for {}", tx)))?;
    Ok(Json(proof.as_ref().clone()).into_response())
}

async fn proofs_by_account_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Path(url): Path<String>,
) -> Result<Response, AppError> {
    if !url.starts_with("acc://") {
        return Err(AppError::BadRequest(format!(
            "account url {:?} is out of scope",
            url
        )));
    }
    let proofs: Vec<_> = ctx
        .proofs
        .by_account(&url)
        .into_iter()
        .map(|p| p.as_ref().clone())
        .collect();
    Ok(Json(proofs).into_response())
}

async fn attestation_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Json(request): Json<AttestationRequest>,
) -> Json<AttestationResponse> {
    let started = Instant::now();
    if request.expires_at < unix_now() {
        return Json(AttestationResponse {
            success: false,
            attestation: None,
            error: Some("request expired".into()),
        });
    }
    let message = attestation_message(
        &request.batch_id,
        &request.merkle_root,
        request.tx_count,
        request.block_height,
    );
    let response = match ctx
        .key_manager
        .sign_with_domain(DomainTag::Attestation, message.as_bytes())
    {
        Ok(signature) => {
            info!(
                target: "gateway",
                batch = %request.batch_id,
                requester = %request.requester_id,
                "attestation signed"
            );
            AttestationResponse {
                success: true,
                attestation: Some(PeerAttestation {
                    signature: signature.to_bytes().to_vec(),
                    public_key: ctx.key_manager.public_key().to_bytes().to_vec(),
                }),
                error: None,
            }
        }
        Err(e) => AttestationResponse {
            success: false,
            attestation: None,
            error: Some(e.to_string()),
        },
    };
    rpc_metrics().observe_request_duration(
        "/api/attestations/bls/request",
        started.elapsed().as_secs_f64(),
    );
    Json(response)
}

async fn metrics_handler() -> ([(axum::http::HeaderName, String); 1], axum::body::Bytes) {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::with_capacity(1 << 16);
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::error!(target: "gateway", error = %e, "failed to encode metrics");
    }
    (
        [(
            axum::http::header::CONTENT_TYPE,
            encoder.format_type().to_string(),
        )],
        buf.into(),
    )
}

// --- Server ---

/// Builds the full router. Exposed separately for tests.
pub fn router(ctx: Arc<GatewayContext>, config: &GatewayConfig) -> Router {
    let cidrs = Arc::new(
        config
            .trusted_proxies
            .iter()
            .filter_map(|s| IpNetwork::from_str(s).ok())
            .collect::<Vec<_>>(),
    );
    let limiter = IpLimiter::new(config.rps, config.burst, cidrs);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/anchors/on-demand", post(on_demand_handler))
        .route("/api/batches/current", get(current_batches_handler))
        .route("/api/batches/:id", get(batch_handler))
        .route("/api/proofs/by-tx/:hash", get(proof_by_tx_handler))
        .route("/api/proofs/by-account/*url", get(proofs_by_account_handler))
        .route("/api/attestations/bls/request", post(attestation_handler))
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ))
        .with_state(ctx)
        // HandleErrorLayer must wrap the fallible layers so the service is
        // infallible at the edge.
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(map_middleware_error))
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(128))
                .layer(TimeoutLayer::new(Duration::from_secs(10))),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.body_limit_kb * 1024))
}

/// Serves the control surface until shutdown flips.
pub async fn run_server(
    config: GatewayConfig,
    ctx: Arc<GatewayContext>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let app = router(ctx, &config);
    let addr: SocketAddr = config.listen_addr.parse()?;
    info!(target: "gateway", %addr, "control surface listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_rx.changed().await.ok();
        info!(target: "gateway", "shutting down gracefully");
    });

    if let Err(e) = server.await {
        tracing::error!(target: "gateway", error = %e, "server error");
    }
    Ok(())
}
