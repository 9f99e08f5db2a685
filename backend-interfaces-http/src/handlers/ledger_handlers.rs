use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use backend_application::commands::ledger_commands;
use backend_application::queries::account_queries;
use backend_application::AppState;
use backend_domain::{Account, NewAccount, Transaction, TransactionDraft};

use crate::error::HttpError;

pub async fn open_account(
    State(state): State<AppState>,
    Json(payload): Json<NewAccount>,
) -> Result<(StatusCode, Json<Account>), HttpError> {
    let account = ledger_commands::open_account(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<Account>, HttpError> {
    let account = account_queries::get_account(&state, &account_id).await?;
    Ok(Json(account))
}

pub async fn record_transaction(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(payload): Json<TransactionDraft>,
) -> Result<(StatusCode, Json<Transaction>), HttpError> {
    let transaction = ledger_commands::record_transaction(&state, &account_id, payload).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}
