use crate::models::schema::expenses;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Date, Double, Integer, Text};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseStatus {
    /// Registered but not yet confirmed by the owner, e.g. parsed from a message.
    Pending,
    #[default]
    Confirmed,
    Cancelled,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::Pending => "pending",
            ExpenseStatus::Confirmed => "confirmed",
            ExpenseStatus::Cancelled => "cancelled",
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
            "pending" => Ok(ExpenseStatus::Pending),
            "confirmed" => Ok(ExpenseStatus::Confirmed),
            "cancelled" => Ok(ExpenseStatus::Cancelled),
            other => Err(anyhow::anyhow!("Unknown expense status: {other}")),
        }
    }
}

#[derive(QueryableByName, Queryable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(table_name = expenses)]
pub struct Expense {
    pub id: i32,
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub payment_method: String,
    pub owner: String,
    pub status: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseFilter {
    pub owner: Option<String>,
    pub status: Option<ExpenseStatus>,
}

impl Expense {
    pub fn list(conn: &mut PgConnection, filter: ExpenseFilter) -> anyhow::Result<Vec<Expense>> {
        let mut query = expenses::table.into_boxed();
        if let Some(owner) = filter.owner {
            query = query.filter(expenses::owner.eq(owner));
        }
        if let Some(status) = filter.status {
            query = query.filter(expenses::status.eq(status.as_str()));
        }

        Ok(query
            .order((expenses::date.desc(), expenses::id.desc()))
            .load::<Expense>(conn)?)
    }

    pub fn update(
        conn: &mut PgConnection,
        expense_id: i32,
        changes: ExpenseChanges,
    ) -> anyhow::Result<Option<Expense>> {
        Ok(diesel::update(expenses::table.filter(expenses::id.eq(expense_id)))
            .set(&changes)
            .get_result::<Expense>(conn)
            .optional()?)
    }

    pub fn delete(conn: &mut PgConnection, expense_id: i32) -> anyhow::Result<bool> {
        let deleted = diesel::delete(expenses::table.filter(expenses::id.eq(expense_id)))
            .execute(conn)?;

        Ok(deleted > 0)
    }
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = expenses)]
pub struct NewExpense {
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub payment_method: String,
    pub owner: String,
    pub status: String,
    pub date: NaiveDate,
}

impl NewExpense {
    pub fn insert(&self, conn: &mut PgConnection) -> anyhow::Result<Expense> {
        diesel::insert_into(expenses::table)
            .values(self)
            .get_result::<Expense>(conn)
            .map_err(|e| e.into())
    }
}

/// Partial update, `None` fields are left untouched.
#[derive(AsChangeset, Debug, Clone, Default, PartialEq)]
#[diesel(table_name = expenses)]
pub struct ExpenseChanges {
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub payment_method: Option<String>,
    pub owner: Option<String>,
    pub status: Option<String>,
    pub date: Option<NaiveDate>,
}

impl ExpenseChanges {
    pub fn is_empty(&self) -> bool {
        self == &ExpenseChanges::default()
    }
}

/// Arguments of the `create_installments` database function.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallmentPlan {
    pub description: String,
    pub total_amount: f64,
    pub installments: i32,
    pub category: String,
    pub payment_method: String,
    pub owner: String,
    pub first_date: NaiveDate,
}

#[derive(QueryableByName)]
struct InstallmentsCreated {
    #[diesel(sql_type = Integer)]
    created: i32,
}

impl InstallmentPlan {
    pub fn call(self, conn: &mut PgConnection) -> anyhow::Result<i32> {
        let res = diesel::sql_query(
            "SELECT create_installments($1, $2, $3, $4, $5, $6, $7) AS created",
        )
        .bind::<Text, _>(self.description)
        .bind::<Double, _>(self.total_amount)
        .bind::<Integer, _>(self.installments)
        .bind::<Text, _>(self.category)
        .bind::<Text, _>(self.payment_method)
        .bind::<Text, _>(self.owner)
        .bind::<Date, _>(self.first_date)
        .get_result::<InstallmentsCreated>(conn)?;

        Ok(res.created)
    }
}
