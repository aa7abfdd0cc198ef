use chrono::{NaiveDate, TimeZone, Utc};
use log::debug;
use std::str::FromStr;

use crate::{
    error::{optional, required, ApiError},
    models::expense::{
        Expense, ExpenseChanges, ExpenseFilter, ExpenseStatus, InstallmentPlan, NewExpense,
    },
    routes::{ExpenseQuery, ExpenseRequest, InstallmentsRequest},
    State,
};

pub const MAX_INSTALLMENTS: i32 = 120;

fn validate_amount(amount: f64) -> anyhow::Result<f64> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ApiError::invalid("amount"));
    }

    Ok(amount)
}

/// Blank means no status given, like an empty filter from the frontend.
fn parse_status(status: Option<String>) -> anyhow::Result<Option<ExpenseStatus>> {
    match status.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => ExpenseStatus::from_str(s)
            .map(Some)
            .map_err(|_| ApiError::invalid("status")),
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub async fn list_expenses(state: &State, query: ExpenseQuery) -> anyhow::Result<Vec<Expense>> {
    let filter = ExpenseFilter {
        owner: query
            .owner
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty()),
        status: parse_status(query.status)?,
    };

    state.db.get_expenses(filter)
}

pub async fn create_expense(state: &State, req: ExpenseRequest) -> anyhow::Result<Expense> {
    let new_expense = NewExpense {
        description: required(req.description, "description")?,
        amount: validate_amount(req.amount.ok_or(ApiError::missing("amount"))?)?,
        category: required(req.category, "category")?,
        payment_method: required(req.payment_method, "payment_method")?,
        owner: required(req.owner, "owner")?,
        status: parse_status(req.status)?.unwrap_or_default().to_string(),
        date: req.date.unwrap_or_else(today),
    };
    debug!("creating expense for {}", new_expense.owner);

    state.db.insert_new_expense(new_expense)
}

pub async fn update_expense(
    state: &State,
    id: i32,
    req: ExpenseRequest,
) -> anyhow::Result<Expense> {
    let changes = ExpenseChanges {
        description: optional(req.description, "description")?,
        amount: req.amount.map(validate_amount).transpose()?,
        category: optional(req.category, "category")?,
        payment_method: optional(req.payment_method, "payment_method")?,
        owner: optional(req.owner, "owner")?,
        status: parse_status(req.status)?.map(|s| s.to_string()),
        date: req.date,
    };

    if changes.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()).into());
    }

    state
        .db
        .update_expense(id, changes)?
        .ok_or(ApiError::NotFound.into())
}

pub async fn delete_expense(state: &State, id: i32) -> anyhow::Result<()> {
    if !state.db.delete_expense(id)? {
        return Err(ApiError::NotFound.into());
    }

    Ok(())
}

/// Splits a purchase into monthly installments inside the database.
pub async fn create_installments(state: &State, req: InstallmentsRequest) -> anyhow::Result<i32> {
    let installments = req.installments.ok_or(ApiError::missing("installments"))?;
    if !(1..=MAX_INSTALLMENTS).contains(&installments) {
        return Err(ApiError::invalid("installments"));
    }

    let plan = InstallmentPlan {
        description: required(req.description, "description")?,
        total_amount: validate_amount(req.amount.ok_or(ApiError::missing("amount"))?)?,
        installments,
        category: required(req.category, "category")?,
        payment_method: required(req.payment_method, "payment_method")?,
        owner: required(req.owner, "owner")?,
        first_date: req.date.unwrap_or_else(today),
    };

    state.db.create_installments(plan)
}

/// Fixed data for building the dashboards without a database.
pub fn sample_expenses() -> Vec<Expense> {
    let created_at = Utc
        .with_ymd_and_hms(2024, 1, 15, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    let date = |d: u32| NaiveDate::from_ymd_opt(2024, 1, d).unwrap_or_default();

    let rows = [
        (1, "Supermercado", 245.90, "alimentacao", "cartao", "felipe", 15),
        (2, "Conta de luz", 189.35, "contas", "pix", "leticia", 10),
        (3, "Gasolina", 150.00, "transporte", "debito", "felipe", 8),
        (4, "Restaurante", 98.50, "lazer", "cartao", "compartilhado", 6),
        (5, "Farmacia", 42.70, "saude", "dinheiro", "leticia", 3),
    ];

    rows.into_iter()
        .map(
            |(id, description, amount, category, payment_method, owner, day)| Expense {
                id,
                description: description.to_string(),
                amount,
                category: category.to_string(),
                payment_method: payment_method.to_string(),
                owner: owner.to_string(),
                status: ExpenseStatus::Confirmed.to_string(),
                date: date(day),
                created_at,
            },
        )
        .collect()
}
