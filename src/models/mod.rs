pub mod conversation_state;
pub mod expense;
pub mod interested_user;
pub mod notification;
pub mod schema;
