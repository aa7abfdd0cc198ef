use chrono::{DateTime, Utc};
use diesel::{pg::PgConnection, r2d2::ConnectionManager, r2d2::Pool};
use std::sync::Arc;

#[cfg(test)]
use mockall::{automock, predicate::*};

use crate::models::{
    conversation_state::ConversationState,
    expense::{Expense, ExpenseChanges, ExpenseFilter, InstallmentPlan, NewExpense},
    interested_user::{InterestedUser, NewInterestedUser},
    notification::{NewNotification, Notification},
};

#[cfg_attr(test, automock)]
pub(crate) trait DBConnection {
    fn get_expenses(&self, filter: ExpenseFilter) -> anyhow::Result<Vec<Expense>>;
    fn insert_new_expense(&self, expense: NewExpense) -> anyhow::Result<Expense>;
    fn update_expense(&self, id: i32, changes: ExpenseChanges) -> anyhow::Result<Option<Expense>>;
    fn delete_expense(&self, id: i32) -> anyhow::Result<bool>;
    fn create_installments(&self, plan: InstallmentPlan) -> anyhow::Result<i32>;
    fn get_notifications(&self, user_id: String) -> anyhow::Result<Vec<Notification>>;
    fn insert_new_notification(&self, n: NewNotification) -> anyhow::Result<Notification>;
    fn mark_notification_read(&self, id: i32) -> anyhow::Result<Option<Notification>>;
    fn delete_notification(&self, id: i32) -> anyhow::Result<bool>;
    fn count_interested_users(&self) -> anyhow::Result<i64>;
    fn insert_interested_user(&self, user: NewInterestedUser) -> anyhow::Result<bool>;
    fn record_conversation_message(
        &self,
        phone: String,
        message: String,
        at: DateTime<Utc>,
    ) -> anyhow::Result<ConversationState>;
}

pub(crate) struct PostgresConnection {
    db: Pool<ConnectionManager<PgConnection>>,
}

impl DBConnection for PostgresConnection {
    fn get_expenses(&self, filter: ExpenseFilter) -> anyhow::Result<Vec<Expense>> {
        let conn = &mut self.db.get()?;
        Expense::list(conn, filter)
    }

    fn insert_new_expense(&self, expense: NewExpense) -> anyhow::Result<Expense> {
        let conn = &mut self.db.get()?;
        expense.insert(conn)
    }

    fn update_expense(&self, id: i32, changes: ExpenseChanges) -> anyhow::Result<Option<Expense>> {
        let conn = &mut self.db.get()?;
        Expense::update(conn, id, changes)
    }

    fn delete_expense(&self, id: i32) -> anyhow::Result<bool> {
        let conn = &mut self.db.get()?;
        Expense::delete(conn, id)
    }

    fn create_installments(&self, plan: InstallmentPlan) -> anyhow::Result<i32> {
        let conn = &mut self.db.get()?;
        plan.call(conn)
    }

    fn get_notifications(&self, user_id: String) -> anyhow::Result<Vec<Notification>> {
        let conn = &mut self.db.get()?;
        Notification::get_by_user(conn, user_id)
    }

    fn insert_new_notification(&self, n: NewNotification) -> anyhow::Result<Notification> {
        let conn = &mut self.db.get()?;
        n.insert(conn)
    }

    fn mark_notification_read(&self, id: i32) -> anyhow::Result<Option<Notification>> {
        let conn = &mut self.db.get()?;
        Notification::mark_read(conn, id)
    }

    fn delete_notification(&self, id: i32) -> anyhow::Result<bool> {
        let conn = &mut self.db.get()?;
        Notification::delete(conn, id)
    }

    fn count_interested_users(&self) -> anyhow::Result<i64> {
        let conn = &mut self.db.get()?;
        InterestedUser::count(conn)
    }

    fn insert_interested_user(&self, user: NewInterestedUser) -> anyhow::Result<bool> {
        let conn = &mut self.db.get()?;
        user.insert(conn)
    }

    fn record_conversation_message(
        &self,
        phone: String,
        message: String,
        at: DateTime<Utc>,
    ) -> anyhow::Result<ConversationState> {
        let conn = &mut self.db.get()?;
        ConversationState::record_message(conn, phone, message, at)
    }
}

pub(crate) fn setup_db(url: String) -> anyhow::Result<Arc<dyn DBConnection + Send + Sync>> {
    let manager = ConnectionManager::<PgConnection>::new(url);
    let pool = Pool::builder()
        .max_size(10)
        .test_on_check_out(true)
        .build(manager)?;
    Ok(Arc::new(PostgresConnection { db: pool }))
}
