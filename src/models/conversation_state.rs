use crate::models::schema::conversation_state;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use serde::{Deserialize, Serialize};

pub const INITIAL_STEP: &str = "idle";

#[derive(
    QueryableByName, Queryable, Insertable, Serialize, Deserialize, Debug, Clone, PartialEq,
)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(table_name = conversation_state)]
pub struct ConversationState {
    pub phone: String,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    pub step: String,
}

impl ConversationState {
    /// Records the latest inbound message, the step of an existing
    /// conversation is kept.
    pub fn record_message(
        conn: &mut PgConnection,
        phone: String,
        message: String,
        at: DateTime<Utc>,
    ) -> anyhow::Result<ConversationState> {
        let new_state = ConversationState {
            phone,
            last_message: message,
            last_message_at: at,
            step: INITIAL_STEP.to_string(),
        };

        Ok(diesel::insert_into(conversation_state::table)
            .values(&new_state)
            .on_conflict(conversation_state::phone)
            .do_update()
            .set((
                conversation_state::last_message.eq(excluded(conversation_state::last_message)),
                conversation_state::last_message_at
                    .eq(excluded(conversation_state::last_message_at)),
            ))
            .get_result::<ConversationState>(conn)?)
    }
}
