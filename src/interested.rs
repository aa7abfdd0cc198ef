use lazy_regex::*;
use log::info;

use crate::{
    error::{optional, required, ApiError},
    models::interested_user::NewInterestedUser,
    routes::InterestRequest,
    State,
};

pub static EMAIL_REGEX: Lazy<Regex> = lazy_regex!(r"^[^\s@]+@[^\s@]+\.[^\s@]+$");

pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 255 {
        return false;
    }

    EMAIL_REGEX.is_match(email)
}

pub async fn count(state: &State) -> anyhow::Result<i64> {
    state.db.count_interested_users()
}

/// Returns false when the email had already registered interest.
pub async fn register(state: &State, req: InterestRequest) -> anyhow::Result<bool> {
    let email = required(req.email, "email")?.to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::invalid("email"));
    }

    let new_user = NewInterestedUser {
        email,
        name: optional(req.name, "name")?,
    };
    let registered = state.db.insert_interested_user(new_user)?;
    if registered {
        info!("new interested user registered");
    }

    Ok(registered)
}
