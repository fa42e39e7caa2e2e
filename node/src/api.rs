//! # REST API
//!
//! Builds the axum router that exposes the settlement service over HTTP.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                        | Description                       |
//! |--------|-----------------------------|-----------------------------------|
//! | GET    | `/health`                   | Liveness probe                    |
//! | GET    | `/assets`                   | Supported assets                  |
//! | GET    | `/vaults`                   | Vault list                        |
//! | POST   | `/vaults`                   | Create a vault                    |
//! | GET    | `/vaults/:symbol`           | Vault composition                 |
//! | GET    | `/vaults/:symbol/holders`   | Holders and shares balances       |
//! | GET    | `/vaults/:symbol/valuation` | AUM and NAV against live prices   |
//! | POST   | `/vaults/:symbol/deposit`   | Deposit and mint shares           |
//! | POST   | `/vaults/:symbol/withdraw`  | Burn shares and pay out           |
//! | PUT    | `/prices/:feed_id`          | Publish a price quote             |
//! | POST   | `/wallets/:owner/fund`      | Devnet faucet                     |

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use index_vault::prelude::*;
use index_vault::service::{HolderView, VaultComposition};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Settlement engine holding every vault.
    pub service: Arc<SettlementService>,
    /// Prices pushed through `PUT /prices/:feed_id`.
    pub prices: Arc<StaticPriceFeed>,
    /// Wallets and shares tokens. Same instance the service settles against.
    pub custody: Arc<InMemoryCustody>,
    /// Whether `POST /wallets/:owner/fund` is served.
    pub faucet_enabled: bool,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/assets", get(assets_handler))
        .route("/vaults", get(list_vaults_handler).post(create_vault_handler))
        .route("/vaults/:symbol", get(composition_handler))
        .route("/vaults/:symbol/holders", get(holders_handler))
        .route("/vaults/:symbol/valuation", get(valuation_handler))
        .route("/vaults/:symbol/deposit", post(deposit_handler))
        .route("/vaults/:symbol/withdraw", post(withdraw_handler))
        .route("/prices/:feed_id", put(publish_price_handler))
        .route("/wallets/:owner/fund", post(fund_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /vaults`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateVaultRequest {
    pub creator: String,
    pub name: String,
    pub symbol: String,
}

/// Body of `POST /vaults/:symbol/deposit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DepositRequest {
    pub holder: String,
    pub asset: AssetTypeId,
    pub amount: u64,
}

/// Body of `POST /vaults/:symbol/withdraw`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub holder: String,
    /// Share of the holder's balance to redeem, `1..=10000`.
    pub percentage_bps: u64,
    /// Candidate payout assets in priority order.
    pub assets: Vec<AssetTypeId>,
}

/// Body of `PUT /prices/:feed_id`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PriceUpdateRequest {
    pub mantissa: i64,
    pub exponent: i32,
}

/// Body of `POST /wallets/:owner/fund`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FundRequest {
    pub asset: AssetTypeId,
    pub amount: u64,
}

/// Response of `POST /wallets/:owner/fund`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FundResponse {
    pub owner: String,
    pub asset: AssetTypeId,
    pub balance: u64,
}

/// Standard error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message.
    pub error: String,
    /// Machine-readable error tag.
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// An engine error on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub VaultError);

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            VaultError::VaultNotFound(_) | VaultError::NotSupportedAsset(_) => {
                StatusCode::NOT_FOUND
            }
            VaultError::DuplicateVault(_) | VaultError::AssetAlreadySupported(_) => {
                StatusCode::CONFLICT
            }
            VaultError::NotCreator { .. } => StatusCode::FORBIDDEN,
            VaultError::Pricing(_) => StatusCode::SERVICE_UNAVAILABLE,
            VaultError::Custody(_) => StatusCode::BAD_GATEWAY,
            VaultError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn plain_error(status: StatusCode, kind: &str, message: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message,
            kind: kind.to_string(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "version": state.version,
            "vaults": state.service.vault_count(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

/// `GET /assets`
async fn assets_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.list_supported_assets())
}

/// `GET /vaults`
async fn list_vaults_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.list_vaults())
}

/// `POST /vaults`: creates an empty vault. Returns 201 with its summary.
async fn create_vault_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateVaultRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .service
        .create_vault(&req.creator, &req.name, &req.symbol)
        .map_err(|e| {
            state.metrics.record_failure("create_vault", e.kind());
            e
        })?;
    state.metrics.vaults.set(state.service.vault_count() as i64);
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn composition_handler(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<VaultComposition>, ApiError> {
    Ok(Json(state.service.vault_composition(&symbol)?))
}

async fn holders_handler(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<HolderView>>, ApiError> {
    Ok(Json(state.service.vault_holders(&symbol)?))
}

/// `GET /vaults/:symbol/valuation`: AUM, NAV and per-asset values against
/// the latest published prices.
async fn valuation_handler(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Valuation>, ApiError> {
    Ok(Json(state.service.valuation(&symbol, state.prices.as_ref())?))
}

/// `POST /vaults/:symbol/deposit`
async fn deposit_handler(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<DepositReceipt>, ApiError> {
    let started = Instant::now();
    let result = state.service.deposit(
        &symbol,
        &req.holder,
        &req.asset,
        req.amount,
        state.prices.as_ref(),
    );
    state
        .metrics
        .settlement_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(receipt) => {
            state.metrics.deposits_total.inc();
            state.metrics.shares_minted_total.inc_by(receipt.minted_shares);
            Ok(Json(receipt))
        }
        Err(e) => {
            state.metrics.record_failure("deposit", e.kind());
            Err(e.into())
        }
    }
}

/// `POST /vaults/:symbol/withdraw`
async fn withdraw_handler(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<WithdrawalReceipt>, ApiError> {
    let started = Instant::now();
    let result = state.service.withdraw(
        &symbol,
        &req.holder,
        req.percentage_bps,
        &req.assets,
        state.prices.as_ref(),
    );
    state
        .metrics
        .settlement_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(receipt) => {
            state.metrics.withdrawals_total.inc();
            state.metrics.shares_burned_total.inc_by(receipt.shares_burned);
            Ok(Json(receipt))
        }
        Err(e) => {
            state.metrics.record_failure("withdraw", e.kind());
            Err(e.into())
        }
    }
}

/// `PUT /prices/:feed_id`: replaces the feed's quote, stamped now.
async fn publish_price_handler(
    Path(feed_id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<PriceUpdateRequest>,
) -> Response {
    if req.mantissa <= 0 {
        return plain_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_price",
            format!("mantissa must be positive, got {}", req.mantissa),
        );
    }
    state
        .prices
        .publish(feed_id.as_str(), req.mantissa, req.exponent);
    state.metrics.price_updates_total.inc();
    tracing::debug!(feed = %feed_id, mantissa = req.mantissa, exponent = req.exponent, "price published");
    StatusCode::NO_CONTENT.into_response()
}

/// `POST /wallets/:owner/fund`: credits a wallet out of thin air. Devnet only.
async fn fund_handler(
    Path(owner): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<FundRequest>,
) -> Response {
    if !state.faucet_enabled {
        return plain_error(
            StatusCode::FORBIDDEN,
            "faucet_disabled",
            "faucet is disabled on this node".into(),
        );
    }
    if !state.service.is_supported(&req.asset) {
        return ApiError(VaultError::NotSupportedAsset(req.asset)).into_response();
    }
    match state.custody.fund(&owner, &req.asset, req.amount) {
        Ok(balance) => {
            tracing::info!(owner = %owner, asset = %req.asset, amount = req.amount, "wallet funded");
            Json(FundResponse {
                owner,
                asset: req.asset,
                balance,
            })
            .into_response()
        }
        Err(e) => ApiError(VaultError::Custody(e)).into_response(),
    }
}
