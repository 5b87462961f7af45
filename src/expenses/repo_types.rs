use std::{fmt, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseCategory {
    Meal,
    Transport,
    Hotel,
    Other,
}

impl ExpenseCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meal => "Meal",
            Self::Transport => "Transport",
            Self::Hotel => "Hotel",
            Self::Other => "Other",
        }
    }
}

impl FromStr for ExpenseCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Meal" => Ok(Self::Meal),
            "Transport" => Ok(Self::Transport),
            "Hotel" => Ok(Self::Hotel),
            "Other" => Ok(Self::Other),
            other => Err(AppError::validation(format!("unknown expense category `{other}`"))),
        }
    }
}

/// Review state of a receipt. Every receipt starts as `Pending`.
// TODO: manager approval endpoint moving receipts to approved/rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpenseStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(anyhow!("unknown expense status `{other}`")),
        }
    }
}

/// Raw row; text columns are checked by the table constraints.
#[derive(Debug, FromRow)]
pub struct ExpenseRow {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub user_id: Uuid,
    pub file_path: String,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub category: Option<String>,
    pub note: Option<String>,
    pub created_at: OffsetDateTime,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Expense {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub category: Option<ExpenseCategory>,
    pub note: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub status: ExpenseStatus,
}

impl TryFrom<ExpenseRow> for Expense {
    type Error = anyhow::Error;

    fn try_from(row: ExpenseRow) -> Result<Self, Self::Error> {
        let category = row
            .category
            .as_deref()
            .map(str::parse::<ExpenseCategory>)
            .transpose()
            .map_err(|e| anyhow!("expense {}: {e}", row.id))?;
        Ok(Self {
            id: row.id,
            trip_id: row.trip_id,
            user_id: row.user_id,
            file_path: row.file_path,
            amount: row.amount,
            currency: row.currency,
            category,
            note: row.note,
            created_at: row.created_at,
            status: row.status.parse()?,
        })
    }
}

pub struct NewExpense<'a> {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub user_id: Uuid,
    pub file_path: &'a str,
    pub amount: Option<f64>,
    pub currency: Option<&'a str>,
    pub category: Option<ExpenseCategory>,
    pub note: Option<&'a str>,
}
