use crate::models::schema::notifications;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

pub const DEFAULT_NOTIFICATION_KIND: &str = "info";

#[derive(QueryableByName, Queryable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: i32,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn get_by_user(conn: &mut PgConnection, user: String) -> anyhow::Result<Vec<Notification>> {
        Ok(notifications::table
            .filter(notifications::user_id.eq(user))
            .order((notifications::created_at.desc(), notifications::id.desc()))
            .load::<Notification>(conn)?)
    }

    pub fn mark_read(
        conn: &mut PgConnection,
        notification_id: i32,
    ) -> anyhow::Result<Option<Notification>> {
        Ok(
            diesel::update(notifications::table.filter(notifications::id.eq(notification_id)))
                .set(notifications::read.eq(true))
                .get_result::<Notification>(conn)
                .optional()?,
        )
    }

    pub fn delete(conn: &mut PgConnection, notification_id: i32) -> anyhow::Result<bool> {
        let deleted =
            diesel::delete(notifications::table.filter(notifications::id.eq(notification_id)))
                .execute(conn)?;

        Ok(deleted > 0)
    }
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: String,
}

impl NewNotification {
    pub fn insert(&self, conn: &mut PgConnection) -> anyhow::Result<Notification> {
        diesel::insert_into(notifications::table)
            .values(self)
            .get_result::<Notification>(conn)
            .map_err(|e| e.into())
    }
}
