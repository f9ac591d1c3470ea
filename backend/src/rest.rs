use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use shared::{
    Backup, BackupListResponse, Balance, CreateLoanRequest, CreateTransactionRequest,
    RepayLoanRequest, TransactionListRequest,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::db::DbConnection;
use crate::domain::{LedgerService, ValidationError};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ledger: LedgerService<DbConnection>,
}

impl AppState {
    pub fn new(ledger: LedgerService<DbConnection>) -> Self {
        Self { ledger }
    }
}

/// Build the `/api` router around `state`
pub fn create_router(state: AppState, cors: CorsLayer) -> Router {
    let api_routes = Router::new()
        .route("/ledger", get(get_ledger))
        .route("/transactions", get(list_transactions).post(create_transaction))
        .route("/transactions/:id", delete(delete_transaction))
        .route("/balance/initial", put(update_initial_balance))
        .route("/balance/reset", post(reset_balance))
        .route("/loans", get(get_loans).post(create_loan))
        .route("/loans/:id/repay", post(repay_loan))
        .route("/backups", get(list_backups).post(create_backup))
        .route("/backups/restore", post(restore_backup))
        .route("/data", delete(clear_data));

    Router::new()
        .nest("/api", api_routes)
        .layer(cors)
        .with_state(state)
}

/// CORS setup allowing a browser frontend served from `origin`
pub fn cors_layer(origin: &str) -> Result<CorsLayer> {
    let origin = origin
        .parse::<HeaderValue>()
        .with_context(|| format!("invalid allowed origin {:?}", origin))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any))
}

fn validation_response(e: ValidationError) -> Response {
    let status = match e {
        ValidationError::LoanNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, e.to_string()).into_response()
}

/// Axum handler function for GET /api/ledger
pub async fn get_ledger(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/ledger");
    Json(state.ledger.summary().await)
}

/// Axum handler function for GET /api/transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionListRequest>,
) -> impl IntoResponse {
    info!("GET /api/transactions - query: {:?}", query);
    Json(state.ledger.list_transactions(&query).await)
}

/// Axum handler function for POST /api/transactions
pub async fn create_transaction(
    State(state): State<AppState>,
    Json(request): Json<CreateTransactionRequest>,
) -> Response {
    info!("POST /api/transactions - request: {:?}", request);

    match state.ledger.record_transaction(request).await {
        Ok(transaction) => (StatusCode::CREATED, Json(transaction)).into_response(),
        Err(e) => validation_response(e),
    }
}

/// Axum handler function for DELETE /api/transactions/:id
pub async fn delete_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    info!("DELETE /api/transactions/{}", id);

    if state.ledger.delete_transaction(&id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (StatusCode::NOT_FOUND, "Transaction not found").into_response()
    }
}

/// Axum handler function for PUT /api/balance/initial
pub async fn update_initial_balance(
    State(state): State<AppState>,
    Json(balance): Json<Balance>,
) -> Response {
    info!("PUT /api/balance/initial - {:?}", balance);

    if balance.is_negative_in_any() {
        return validation_response(ValidationError::NegativeAmount);
    }
    state.ledger.update_initial_balance(balance).await;
    Json(state.ledger.summary().await).into_response()
}

/// Axum handler function for POST /api/balance/reset
pub async fn reset_balance(
    State(state): State<AppState>,
    Json(balance): Json<Balance>,
) -> Response {
    info!("POST /api/balance/reset - {:?}", balance);

    if balance.is_negative_in_any() {
        return validation_response(ValidationError::NegativeAmount);
    }
    state.ledger.set_current_balance(balance).await;
    Json(state.ledger.summary().await).into_response()
}

/// Axum handler function for GET /api/loans
pub async fn get_loans(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/loans");
    Json(state.ledger.loan_book().await)
}

/// Axum handler function for POST /api/loans
pub async fn create_loan(
    State(state): State<AppState>,
    Json(request): Json<CreateLoanRequest>,
) -> Response {
    info!("POST /api/loans - lender: {}", request.lender_name);

    match state.ledger.borrow(request).await {
        Ok(movement) => (StatusCode::CREATED, Json(movement)).into_response(),
        Err(e) => validation_response(e),
    }
}

/// Axum handler function for POST /api/loans/:id/repay
pub async fn repay_loan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RepayLoanRequest>,
) -> Response {
    info!("POST /api/loans/{}/repay - request: {:?}", id, request);

    match state.ledger.repay(&id, request).await {
        Ok(movement) => Json(movement).into_response(),
        Err(e) => validation_response(e),
    }
}

/// Axum handler function for GET /api/backups
pub async fn list_backups(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/backups");
    Json(BackupListResponse {
        backups: state.ledger.get_backups().await,
    })
}

/// Axum handler function for POST /api/backups
pub async fn create_backup(State(state): State<AppState>) -> Response {
    info!("POST /api/backups");

    match state.ledger.create_backup().await {
        Ok(backup) => (StatusCode::CREATED, Json(backup)).into_response(),
        Err(e) => {
            error!("Error creating backup: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create backup").into_response()
        }
    }
}

/// Axum handler function for POST /api/backups/restore
pub async fn restore_backup(
    State(state): State<AppState>,
    Json(backup): Json<Backup>,
) -> impl IntoResponse {
    info!("POST /api/backups/restore - timestamp: {}", backup.timestamp);
    state.ledger.restore_backup(backup).await;
    Json(state.ledger.summary().await)
}

/// Axum handler function for DELETE /api/data
pub async fn clear_data(State(state): State<AppState>) -> Response {
    info!("DELETE /api/data");

    match state.ledger.clear_all_data().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("Error clearing data: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to clear data").into_response()
        }
    }
}
