use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::Expense;

#[derive(Debug, Default, Deserialize)]
pub struct ExpenseFilter {
    pub user: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CreatedExpenseResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ExpenseView {
    #[serde(flatten)]
    pub expense: Expense,
    pub receipt_url: Option<String>,
}
