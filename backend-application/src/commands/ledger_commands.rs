use tracing::{debug, info};

use backend_domain::{
    check_money_scale, current_millis, normalize_account_id, Account, NewAccount, Transaction, TransactionDraft,
};

use crate::{AppError, AppState};

pub async fn open_account(state: &AppState, request: NewAccount) -> Result<Account, AppError> {
    let account_id = normalize_account_id(&request.account_id).ok_or_else(|| {
        AppError::BadRequest(
            "account_id must be 1-128 characters of [A-Za-z0-9_-]".to_string(),
        )
    })?;
    check_money_scale(request.opening_balance, "opening balance")?;
    let account = Account::open(
        NewAccount {
            account_id,
            ..request
        },
        current_millis(),
    );
    state.store.insert_account(&account).await?;
    info!(
        account_id = %account.account_id,
        account_type = %account.account_type,
        "account opened with balance {}",
        account.balance
    );
    Ok(account)
}

/// Books a transaction: appends the row, moves the balance and marks the account dirty.
pub async fn record_transaction(
    state: &AppState,
    account_id: &str,
    draft: TransactionDraft,
) -> Result<Transaction, AppError> {
    let _guard = state.ledger_lock.lock().await;

    let mut account = state.store.get_account(account_id).await?;
    let transaction = account.apply(draft, current_millis())?;

    state.store.insert_transaction(&transaction).await?;
    state.store.put_account(&account).await?;
    state.metrics.record_transaction();

    debug!(
        account_id = %account.account_id,
        transaction_id = %transaction.transaction_id,
        transaction_type = %transaction.transaction_type,
        "transaction recorded, balance now {}",
        transaction.balance_after
    );
    Ok(transaction)
}
