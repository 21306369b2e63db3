use crate::errors::WalletError;
use crate::metrics::{self, OPERATION_DURATION, WALLETS_CREATED};
use crate::models::{CreateTransactionRequest, CreateWalletRequest, WalletId};
use crate::retry::RetryStrategy;
use crate::services::WalletService;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Shared state of the HTTP boundary
pub struct AppState {
    pub service: Arc<WalletService>,
    /// Applied to transaction appends that lose a concurrency race
    pub retry: RetryStrategy,
}

impl AppState {
    pub fn new(service: Arc<WalletService>, retry: RetryStrategy) -> Self {
        AppState { service, retry }
    }
}

/// Health check endpoint
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    match state.service.health_check().await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "status": "healthy",
            "service": "wallet-engine",
            "version": env!("CARGO_PKG_VERSION")
        })),
        Err(e) => {
            warn!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "unhealthy",
                "service": "wallet-engine",
                "version": env!("CARGO_PKG_VERSION")
            }))
        }
    }
}

pub async fn create_wallet(
    state: web::Data<AppState>,
    request: web::Json<CreateWalletRequest>,
) -> Result<HttpResponse, WalletError> {
    let timer = OPERATION_DURATION
        .with_label_values(&["create_wallet"])
        .start_timer();
    let wallet = state.service.create_wallet(request.into_inner()).await?;
    timer.observe_duration();

    WALLETS_CREATED.inc();
    Ok(HttpResponse::Created().json(wallet))
}

pub async fn get_wallet(
    state: web::Data<AppState>,
    wallet_id: web::Path<WalletId>,
) -> Result<HttpResponse, WalletError> {
    let wallet = state.service.get_wallet(*wallet_id).await?;
    Ok(HttpResponse::Ok().json(wallet))
}

/// Responds with the bare balance amount
pub async fn get_wallet_balance(
    state: web::Data<AppState>,
    wallet_id: web::Path<WalletId>,
) -> Result<HttpResponse, WalletError> {
    let balance = state.service.get_wallet_balance(*wallet_id).await?;
    Ok(HttpResponse::Ok().json(balance))
}

pub async fn create_transaction(
    state: web::Data<AppState>,
    wallet_id: web::Path<WalletId>,
    request: web::Json<CreateTransactionRequest>,
) -> Result<HttpResponse, WalletError> {
    let wallet_id = wallet_id.into_inner();
    let request = request.into_inner();
    let service = &state.service;
    let request = &request;

    let timer = OPERATION_DURATION
        .with_label_values(&["create_transaction"])
        .start_timer();
    let result = state
        .retry
        .execute(
            move || service.create_transaction(wallet_id, request.clone()),
            "create_transaction",
        )
        .await;
    timer.observe_duration();

    metrics::record_transaction_outcome(&result);
    Ok(HttpResponse::Created().json(result?))
}

pub async fn get_latest_transaction(
    state: web::Data<AppState>,
    wallet_id: web::Path<WalletId>,
) -> Result<HttpResponse, WalletError> {
    let transaction = state.service.get_latest_transaction(*wallet_id).await?;
    Ok(HttpResponse::Ok().json(transaction))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint() -> HttpResponse {
    match metrics::metrics_handler() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Failed to gather metrics",
            "details": e.to_string()
        })),
    }
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| WalletError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| WalletError::Validation(err.to_string()).into()),
    )
    .service(
        web::scope("/api/v1/wallets")
            .route("", web::post().to(create_wallet))
            .route("/{id}", web::get().to(get_wallet))
            .route("/{id}/balance", web::get().to(get_wallet_balance))
            .route("/{id}/transactions", web::post().to(create_transaction))
            .route(
                "/{id}/transactions/latest",
                web::get().to(get_latest_transaction),
            ),
    )
    .route("/metrics", web::get().to(metrics_endpoint))
    .route("/health", web::get().to(health_check));
}
