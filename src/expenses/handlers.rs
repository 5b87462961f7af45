use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{
    dto::{CreatedExpenseResponse, ExpenseFilter, ExpenseView},
    repo_types::ExpenseCategory,
    services::{self, ExpenseInput, ReceiptUpload},
};
use crate::{
    auth::extractors::Session,
    error::{AppError, AppResult},
    state::AppState,
};

/// Hard cap on the request body; the configured receipt limit is checked later.
const UPLOAD_BODY_LIMIT: usize = 20 * 1024 * 1024;

pub fn expenses_routes() -> Router<AppState> {
    Router::new()
        .route("/trips/:id/expenses", get(list_expenses).post(upload_expense))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
}

#[instrument(skip(state))]
pub async fn list_expenses(
    State(state): State<AppState>,
    Session(identity): Session,
    Path(trip_id): Path<Uuid>,
    Query(filter): Query<ExpenseFilter>,
) -> AppResult<Json<Vec<ExpenseView>>> {
    let expenses = services::expenses_for_trip(&state.db, &identity, trip_id, filter.user).await?;
    let mut out = Vec::with_capacity(expenses.len());
    for expense in expenses {
        let receipt_url = match services::receipt_url(state.storage.as_ref(), &expense).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, expense_id = %expense.id, "receipt link unavailable");
                None
            }
        };
        out.push(ExpenseView {
            expense,
            receipt_url,
        });
    }
    Ok(Json(out))
}

/// POST /trips/:id/expenses (multipart)
/// Fields: `file` (required), `amount`, `currency`, `category`, `note`.
#[instrument(skip(state, mp))]
pub async fn upload_expense(
    State(state): State<AppState>,
    Session(identity): Session,
    Path(trip_id): Path<Uuid>,
    mp: Multipart,
) -> AppResult<(StatusCode, Json<CreatedExpenseResponse>)> {
    let (upload, input) = read_upload(mp).await?;
    let id = services::record_expense(&state, &identity, trip_id, upload, input).await?;
    Ok((StatusCode::CREATED, Json(CreatedExpenseResponse { id })))
}

fn malformed(e: impl std::fmt::Display) -> AppError {
    AppError::validation(format!("malformed upload: {e}"))
}

async fn read_upload(mut mp: Multipart) -> AppResult<(ReceiptUpload, ExpenseInput)> {
    let mut upload = None;
    let mut input = ExpenseInput::default();

    while let Some(field) = mp.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let file_name = field.file_name().map(str::to_string);
            let body = field.bytes().await.map_err(malformed)?;
            upload = Some(ReceiptUpload {
                body,
                content_type,
                file_name,
            });
            continue;
        }

        let text = field.text().await.map_err(malformed)?;
        let value = text.trim();
        if value.is_empty() {
            continue;
        }
        match name.as_str() {
            "amount" => {
                let amount = value
                    .parse::<f64>()
                    .map_err(|_| AppError::validation("amount must be a number"))?;
                input.amount = Some(amount);
            }
            "currency" => input.currency = Some(value.to_string()),
            "category" => input.category = Some(value.parse::<ExpenseCategory>()?),
            "note" => input.note = Some(value.to_string()),
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| AppError::validation("file is required"))?;
    Ok((upload, input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::FromRequest, http::Request};

    const BOUNDARY: &str = "XBOUNDARYX";

    async fn multipart(parts: &[(&str, Option<(&str, &str)>, &str)]) -> Multipart {
        let mut body = String::new();
        for (name, file, value) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match file {
                Some((file_name, ct)) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {ct}\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        let req = Request::builder()
            .method("POST")
            .uri("/trips/x/expenses")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(req, &()).await.unwrap()
    }

    #[tokio::test]
    async fn reads_file_and_metadata() {
        let mp = multipart(&[
            ("file", Some(("lunch.png", "image/png")), "PNGDATA"),
            ("amount", None, " 23.50 "),
            ("currency", None, "CHF"),
            ("category", None, "Meal"),
            ("note", None, ""),
        ])
        .await;
        let (upload, input) = read_upload(mp).await.unwrap();
        assert_eq!(upload.body.as_ref(), b"PNGDATA");
        assert_eq!(upload.content_type, "image/png");
        assert_eq!(upload.file_name.as_deref(), Some("lunch.png"));
        assert_eq!(input.amount, Some(23.5));
        assert_eq!(input.currency.as_deref(), Some("CHF"));
        assert_eq!(input.category, Some(ExpenseCategory::Meal));
        assert_eq!(input.note, None);
    }

    #[tokio::test]
    async fn file_is_required() {
        let mp = multipart(&[("amount", None, "5")]).await;
        assert!(matches!(read_upload(mp).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn bad_amount_and_category_are_rejected() {
        let mp = multipart(&[
            ("file", Some(("a.pdf", "application/pdf")), "PDF"),
            ("amount", None, "twelve"),
        ])
        .await;
        assert!(matches!(read_upload(mp).await, Err(AppError::Validation(_))));

        let mp = multipart(&[
            ("file", Some(("a.pdf", "application/pdf")), "PDF"),
            ("category", None, "Spa"),
        ])
        .await;
        assert!(matches!(read_upload(mp).await, Err(AppError::Validation(_))));
    }
}
