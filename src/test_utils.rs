use std::sync::Arc;

use crate::{db::MockDBConnection, whatsapp::MockWhatsAppClient, State};

pub const TEST_VERIFY_TOKEN: &str = "verify-me";

pub fn state_with(db: MockDBConnection, whatsapp: MockWhatsAppClient) -> State {
    State {
        db: Arc::new(db),
        whatsapp: Arc::new(whatsapp),
        verify_token: TEST_VERIFY_TOKEN.to_string(),
        allowed_origins: Arc::new(vec!["https://app.fintrack.example".to_string()]),
    }
}

pub fn state_with_db(db: MockDBConnection) -> State {
    state_with(db, MockWhatsAppClient::new())
}
