use crate::{
    error::{optional, required, ApiError},
    models::notification::{NewNotification, Notification, DEFAULT_NOTIFICATION_KIND},
    routes::NotificationRequest,
    State,
};

pub async fn list_notifications(
    state: &State,
    user_id: Option<String>,
) -> anyhow::Result<Vec<Notification>> {
    let user_id = required(user_id, "user_id")?;
    state.db.get_notifications(user_id)
}

pub async fn create_notification(
    state: &State,
    req: NotificationRequest,
) -> anyhow::Result<Notification> {
    let new_notification = NewNotification {
        user_id: required(req.user_id, "user_id")?,
        title: required(req.title, "title")?,
        message: required(req.message, "message")?,
        kind: optional(req.kind, "kind")?
            .unwrap_or_else(|| DEFAULT_NOTIFICATION_KIND.to_string()),
    };

    state.db.insert_new_notification(new_notification)
}

pub async fn mark_read(state: &State, id: i32) -> anyhow::Result<Notification> {
    state
        .db
        .mark_notification_read(id)?
        .ok_or(ApiError::NotFound.into())
}

pub async fn delete_notification(state: &State, id: i32) -> anyhow::Result<()> {
    if !state.db.delete_notification(id)? {
        return Err(ApiError::NotFound.into());
    }

    Ok(())
}
