use sqlx::PgExecutor;
use uuid::Uuid;

use super::repo_types::{Expense, ExpenseRow, NewExpense};
use crate::error::AppResult;

const EXPENSE_COLUMNS: &str =
    "id, trip_id, user_id, file_path, amount, currency, category, note, created_at, status";

pub async fn insert<'e>(db: impl PgExecutor<'e>, new: NewExpense<'_>) -> AppResult<Expense> {
    let row = sqlx::query_as::<_, ExpenseRow>(&format!(
        r#"
        INSERT INTO expenses (id, trip_id, user_id, file_path, amount, currency, category, note)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {EXPENSE_COLUMNS}
        "#
    ))
    .bind(new.id)
    .bind(new.trip_id)
    .bind(new.user_id)
    .bind(new.file_path)
    .bind(new.amount)
    .bind(new.currency)
    .bind(new.category.map(|c| c.as_str()))
    .bind(new.note)
    .fetch_one(db)
    .await?;
    Ok(Expense::try_from(row)?)
}

/// Receipts of a trip, oldest first, optionally for one uploader.
pub async fn list_for_trip<'e>(
    db: impl PgExecutor<'e>,
    trip_id: Uuid,
    user_id: Option<Uuid>,
) -> AppResult<Vec<Expense>> {
    let rows = sqlx::query_as::<_, ExpenseRow>(&format!(
        r#"
        SELECT {EXPENSE_COLUMNS}
          FROM expenses
         WHERE trip_id = $1
           AND ($2::uuid IS NULL OR user_id = $2)
         ORDER BY created_at ASC
        "#
    ))
    .bind(trip_id)
    .bind(user_id)
    .fetch_all(db)
    .await?;
    rows.into_iter()
        .map(|r| Expense::try_from(r).map_err(Into::into))
        .collect()
}
