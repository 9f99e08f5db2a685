use backend_domain::Account;

use crate::{AppError, AppState};

pub async fn get_account(state: &AppState, account_id: &str) -> Result<Account, AppError> {
    Ok(state.store.get_account(account_id).await?)
}
