use std::future::Future;

use anyhow::Context;
use bytes::Bytes;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{error, info};
use uuid::Uuid;

use super::repo;
use super::repo_types::{Expense, ExpenseCategory, NewExpense};
use crate::access::Identity;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::storage::StorageClient;
use crate::trips;

/// Presigned receipt links stay valid this long.
pub const RECEIPT_URL_TTL_SECS: u64 = 10 * 60;

pub struct ReceiptUpload {
    pub body: Bytes,
    pub content_type: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Default)]
pub struct ExpenseInput {
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub category: Option<ExpenseCategory>,
    pub note: Option<String>,
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "application/pdf" => Some("pdf"),
        _ => None,
    }
}

fn ext_from_name(name: &str) -> Option<&'static str> {
    let (_, suffix) = name.rsplit_once('.')?;
    match suffix.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("jpg"),
        "png" => Some("png"),
        "pdf" => Some("pdf"),
        _ => None,
    }
}

fn mime_for(ext: &str) -> &'static str {
    match ext {
        "jpg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/pdf",
    }
}

/// Receipts are PNG, JPEG or PDF; the declared type wins over the file name.
pub(crate) fn receipt_ext(content_type: &str, file_name: Option<&str>) -> Option<&'static str> {
    ext_from_mime(content_type).or_else(|| file_name.and_then(ext_from_name))
}

pub(crate) fn receipt_key(trip_id: Uuid, user_id: Uuid, unix_ts: i64, expense_id: Uuid, ext: &str) -> String {
    format!("receipts/{trip_id}/user{user_id}_{unix_ts}-{expense_id}.{ext}")
}

pub(crate) fn validate_amount(amount: Option<f64>) -> AppResult<()> {
    match amount {
        Some(a) if !a.is_finite() || a < 0.0 => {
            Err(AppError::validation("amount must be a non-negative number"))
        }
        _ => Ok(()),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Writes the object, then runs `record`. A failed `record` removes the object again.
async fn store_then_record<T, Fut>(
    storage: &dyn StorageClient,
    key: &str,
    body: Bytes,
    content_type: &str,
    record: Fut,
) -> AppResult<T>
where
    Fut: Future<Output = AppResult<T>>,
{
    storage
        .put_object(key, body, content_type)
        .await
        .with_context(|| format!("put_object {key}"))?;
    match record.await {
        Ok(v) => Ok(v),
        Err(e) => {
            if let Err(cleanup) = storage.delete_object(key).await {
                error!(error = %cleanup, %key, "failed to remove orphaned receipt");
            }
            Err(e)
        }
    }
}

pub async fn record_expense(
    state: &AppState,
    identity: &Identity,
    trip_id: Uuid,
    upload: ReceiptUpload,
    input: ExpenseInput,
) -> AppResult<Uuid> {
    if upload.body.is_empty() {
        return Err(AppError::validation("receipt file is empty"));
    }
    let max = state.config.storage.receipt_max_bytes;
    if upload.body.len() > max {
        return Err(AppError::validation(format!("receipt exceeds {max} bytes")));
    }
    let ext = receipt_ext(&upload.content_type, upload.file_name.as_deref())
        .ok_or_else(|| AppError::validation("receipts must be PNG, JPEG or PDF"))?;
    validate_amount(input.amount)?;

    if trips::repo::find(&state.db, trip_id).await?.is_none() {
        return Err(AppError::not_found(format!("Trip {trip_id}")));
    }
    if !trips::repo::is_participant(&state.db, trip_id, identity.id).await? {
        return Err(AppError::forbidden("only participants can upload receipts"));
    }

    let id = Uuid::new_v4();
    let key = receipt_key(
        trip_id,
        identity.id,
        OffsetDateTime::now_utc().unix_timestamp(),
        id,
        ext,
    );
    let new = NewExpense {
        id,
        trip_id,
        user_id: identity.id,
        file_path: &key,
        amount: input.amount,
        currency: non_blank(input.currency.as_deref()),
        category: input.category,
        note: non_blank(input.note.as_deref()),
    };
    let expense = store_then_record(
        state.storage.as_ref(),
        &key,
        upload.body,
        mime_for(ext),
        repo::insert(&state.db, new),
    )
    .await?;

    info!(expense_id = %expense.id, %trip_id, user_id = %identity.id, "expense recorded");
    Ok(expense.id)
}

/// Participants read their own receipts; the trip creator and global scope
/// read all of them, or one uploader's when `user` is set.
pub async fn expenses_for_trip(
    db: &PgPool,
    identity: &Identity,
    trip_id: Uuid,
    user: Option<Uuid>,
) -> AppResult<Vec<Expense>> {
    let trip = trips::repo::find(db, trip_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Trip {trip_id}")))?;

    if identity.can_administer_trip(trip.created_by) {
        return repo::list_for_trip(db, trip_id, user).await;
    }
    if user.is_some_and(|u| u != identity.id) {
        return Err(AppError::forbidden("you can only see your own receipts"));
    }
    if !trips::repo::is_participant(db, trip_id, identity.id).await? {
        return Err(AppError::forbidden("you are not part of this trip"));
    }
    repo::list_for_trip(db, trip_id, Some(identity.id)).await
}

pub async fn receipt_url(storage: &dyn StorageClient, expense: &Expense) -> AppResult<String> {
    let url = storage
        .presign_get(&expense.file_path, RECEIPT_URL_TTL_SECS)
        .await
        .with_context(|| format!("presign receipt {}", expense.id))?;
    Ok(url)
}


#[cfg(test)]
mod db_tests {
    use super::*;
    use crate::test_support::test_db;
    use crate::trips::services::{create_trip, db_tests::zurich, delete_trip};
    use crate::users::services::db_tests::{child, root};

    fn state_with(db: PgPool) -> AppState {
        AppState {
            db,
            ..AppState::fake()
        }
    }

    fn png() -> ReceiptUpload {
        ReceiptUpload {
            body: Bytes::from_static(b"\x89PNG fake"),
            content_type: "image/png".into(),
            file_name: Some("lunch.png".into()),
        }
    }

    fn lunch() -> ExpenseInput {
        ExpenseInput {
            amount: Some(23.5),
            currency: Some("CHF".into()),
            category: Some(ExpenseCategory::Meal),
            note: None,
        }
    }

    #[tokio::test]
    async fn participants_record_and_read_their_own() {
        let Some(db) = test_db().await else { return };
        let state = state_with(db.clone());
        let alice = root(&db, "alice", "Manager").await;
        let bob = child(&db, &alice, "bob", "User").await;
        let carl = child(&db, &alice, "carl", "User").await;
        let dora = child(&db, &alice, "dora", "User").await;
        let trip = create_trip(&db, &alice, zurich(vec![bob.id, carl.id])).await.unwrap();

        record_expense(&state, &bob, trip, png(), lunch()).await.unwrap();
        record_expense(&state, &carl, trip, png(), ExpenseInput::default()).await.unwrap();

        let err = record_expense(&state, &dora, trip, png(), lunch()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let own = expenses_for_trip(&db, &bob, trip, None).await.unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].amount, Some(23.5));
        assert_eq!(own[0].status, crate::expenses::repo_types::ExpenseStatus::Pending);

        let err = expenses_for_trip(&db, &bob, trip, Some(carl.id)).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        assert_eq!(expenses_for_trip(&db, &alice, trip, None).await.unwrap().len(), 2);
        assert_eq!(
            expenses_for_trip(&db, &alice, trip, Some(carl.id)).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn receipt_starts_pending() {
        let Some(db) = test_db().await else { return };
        let state = state_with(db.clone());
        let alice = root(&db, "alice", "Manager").await;
        let bob = child(&db, &alice, "bob", "User").await;
        let trip = create_trip(&db, &alice, zurich(vec![bob.id])).await.unwrap();

        let input = ExpenseInput {
            amount: Some(45.50),
            currency: Some("CHF".into()),
            category: Some(ExpenseCategory::Transport),
            note: Some("train to Zurich".into()),
        };
        let id = record_expense(&state, &bob, trip, png(), input).await.unwrap();

        let listed = expenses_for_trip(&db, &bob, trip, None).await.unwrap();
        assert_eq!(listed.len(), 1);
        let json = serde_json::to_value(&listed[0]).unwrap();
        assert_eq!(json["id"], id.to_string());
        assert_eq!(json["amount"], 45.5);
        assert_eq!(json["currency"], "CHF");
        assert_eq!(json["status"], "pending");
        assert!(json.get("file_path").is_none());
    }

    #[tokio::test]
    async fn manager_uploads_to_own_trip() {
        let Some(db) = test_db().await else { return };
        let state = state_with(db.clone());
        let alice = root(&db, "alice", "Manager").await;
        let trip = create_trip(&db, &alice, zurich(vec![alice.id])).await.unwrap();

        record_expense(&state, &alice, trip, png(), lunch()).await.unwrap();
        assert_eq!(expenses_for_trip(&db, &alice, trip, Some(alice.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn expenses_cascade_with_their_trip() {
        let Some(db) = test_db().await else { return };
        let state = state_with(db.clone());
        let alice = root(&db, "alice", "Manager").await;
        let bob = child(&db, &alice, "bob", "User").await;
        let trip = create_trip(&db, &alice, zurich(vec![bob.id])).await.unwrap();
        record_expense(&state, &bob, trip, png(), lunch()).await.unwrap();

        delete_trip(&db, &alice, trip).await.unwrap();
        assert!(repo::list_for_trip(&db, trip, None).await.unwrap().is_empty());
    }
}
