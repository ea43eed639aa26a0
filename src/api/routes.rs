//! API Routes
//!
//! HTTP endpoint definitions.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        Extension, State,
    },
    http::StatusCode,
    middleware,
    routing::{get, post},
    Form, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::auth::AuthError;
use crate::domain::{Balance, BalanceId, OperationContext, Transaction, TransactionId};
use crate::error::{AppError, AppResult};
use crate::handlers::TransferCommand;

use super::metrics::{metrics_handler, metrics_middleware, METRICS_PATH};
use super::middleware::{jwt_auth_middleware, logging_middleware};
use super::state::AppState;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub id: BalanceId,
    pub currency: String,
    /// Decimal string, scaled to the currency's minor unit
    pub balance: String,
}

impl From<Balance> for BalanceResponse {
    fn from(balance: Balance) -> Self {
        Self {
            id: balance.id,
            currency: balance.currency.code().to_string(),
            balance: format!(
                "{:.*}",
                balance.currency.minor_units() as usize,
                balance.amount
            ),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub id: TransactionId,
    pub sender_balance_id: BalanceId,
    pub receiver_balance_id: BalanceId,
    pub amount: String,
    pub currency: String,
    pub date: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            sender_balance_id: tx.sender_balance_id,
            receiver_balance_id: tx.receiver_balance_id,
            amount: format!("{:.*}", tx.currency.minor_units() as usize, tx.amount),
            currency: tx.currency.code().to_string(),
            date: tx.occurred_at,
        }
    }
}

// =========================================================================
// API Router
// =========================================================================

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/balances", get(list_balances))
        .route("/transactions", get(list_transactions).post(create_transaction))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    Router::new()
        // Health check (no auth)
        .route("/health", get(health_check))
        .route("/login", post(login))
        .route(METRICS_PATH, get(metrics_handler))
        .nest("/api/v1", protected_routes)
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

// =========================================================================
// POST /login
// =========================================================================

/// Exchange form credentials for a bearer token
async fn login(
    State(state): State<Arc<AppState>>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> AppResult<(StatusCode, Json<LoginResponse>)> {
    // Malformed or missing form fields get the same answer as bad credentials
    let Form(form) = form.map_err(|_| AuthError::InvalidCredentials)?;
    let username = form.username.unwrap_or_default();
    let password = form.password.unwrap_or_default();

    let token = state.auth.login(username.trim(), &password).await?;

    Ok((StatusCode::CREATED, Json(LoginResponse { token })))
}

// =========================================================================
// GET /api/v1/balances
// =========================================================================

async fn list_balances(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<OperationContext>,
) -> AppResult<Json<Vec<BalanceResponse>>> {
    let caller = context.require_caller()?;
    let balances = state.queries.get_by_user_id(caller).await?;
    Ok(Json(balances.into_iter().map(Into::into).collect()))
}

// =========================================================================
// GET /api/v1/transactions
// =========================================================================

async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<OperationContext>,
) -> AppResult<Json<Vec<TransactionResponse>>> {
    let caller = context.require_caller()?;
    let transactions = state.queries.retrieve(caller).await?;
    Ok(Json(transactions.into_iter().map(Into::into).collect()))
}

// =========================================================================
// POST /api/v1/transactions
// =========================================================================

async fn create_transaction(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<TransferCommand>, JsonRejection>,
) -> AppResult<(StatusCode, Json<TransactionResponse>)> {
    let Json(command) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    let request = command.into_request()?;

    let transaction = state
        .transfers
        .execute_with_context(&context, request)
        .await?;

    Ok((StatusCode::CREATED, Json(transaction.into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_response_formats_amount() {
        let response = BalanceResponse::from(Balance::new(1, 7, Currency::Sgd, dec!(988.5)));
        assert_eq!(response.balance, "988.50");
        assert_eq!(response.currency, "SGD");
    }

    #[test]
    fn test_transaction_response_json_names() {
        let tx = Transaction {
            id: 9,
            sender_balance_id: 1,
            receiver_balance_id: 2,
            amount: dec!(11.49),
            currency: Currency::Sgd,
            occurred_at: Utc::now(),
        };
        let json = serde_json::to_value(TransactionResponse::from(tx)).unwrap();

        assert_eq!(json["senderBalanceId"], 1);
        assert_eq!(json["receiverBalanceId"], 2);
        assert_eq!(json["amount"], "11.49");
        assert_eq!(json["currency"], "SGD");
        assert!(json.get("date").is_some());
    }
}
