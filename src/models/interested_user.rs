use crate::models::schema::interested_users;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(QueryableByName, Queryable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(table_name = interested_users)]
pub struct InterestedUser {
    pub id: i32,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InterestedUser {
    pub fn count(conn: &mut PgConnection) -> anyhow::Result<i64> {
        Ok(interested_users::table
            .count()
            .get_result::<i64>(conn)?)
    }
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = interested_users)]
pub struct NewInterestedUser {
    pub email: String,
    pub name: Option<String>,
}

impl NewInterestedUser {
    /// Returns false when the email was already registered.
    pub fn insert(&self, conn: &mut PgConnection) -> anyhow::Result<bool> {
        let inserted = diesel::insert_into(interested_users::table)
            .values(self)
            .on_conflict(interested_users::email)
            .do_nothing()
            .execute(conn)?;

        Ok(inserted > 0)
    }
}
