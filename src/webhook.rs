use chrono::{DateTime, TimeZone, Utc};
use log::{debug, error, info, warn};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};

use crate::{routes::WebhookVerifyParams, State};

const SUBSCRIBE_MODE: &str = "subscribe";

/// Meta webhook ownership check, returns the challenge to echo back.
pub fn verify(params: &WebhookVerifyParams, verify_token: &str) -> Option<String> {
    let mode_ok = params.mode.as_deref() == Some(SUBSCRIBE_MODE);
    let token_ok = params.verify_token.as_deref() == Some(verify_token);
    if !(mode_ok && token_ok) {
        return None;
    }

    Some(params.challenge.clone().unwrap_or_default())
}

/// Keeps the elements that parse, so one malformed change or message does
/// not drop the rest of the delivery.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Array(items) => items,
        other => {
            warn!("expected a list in webhook payload, got: {other}");
            return Ok(Vec::new());
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("skipping malformed webhook item: {e}");
                None
            }
        })
        .collect())
}

#[derive(Deserialize, Debug)]
pub struct WebhookEvent {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Deserialize, Debug)]
pub struct WebhookEntry {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub changes: Vec<WebhookChange>,
}

#[derive(Deserialize, Debug)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Deserialize, Debug, Default)]
pub struct ChangeValue {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub messages: Vec<IncomingMessage>,
}

#[derive(Deserialize, Debug)]
pub struct IncomingMessage {
    pub from: String,
    pub id: String,
    /// Unix seconds, sent as a string.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextContent>,
}

#[derive(Deserialize, Debug)]
pub struct TextContent {
    pub body: String,
}

impl IncomingMessage {
    fn sent_at(&self) -> DateTime<Utc> {
        self.timestamp
            .as_deref()
            .and_then(|t| t.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now)
    }
}

impl WebhookEvent {
    /// (sender, text, sent at) of every text message in the delivery.
    pub fn text_messages(&self) -> Vec<(String, String, DateTime<Utc>)> {
        self.entry
            .iter()
            .flat_map(|e| e.changes.iter())
            .filter(|c| c.field.as_deref().map_or(true, |f| f == "messages"))
            .flat_map(|c| c.value.messages.iter())
            .filter_map(|m| match (&m.text, m.kind.as_str()) {
                (Some(text), "text") => Some((m.from.clone(), text.body.clone(), m.sent_at())),
                _ => {
                    debug!("skipping {} message {}", m.kind, m.id);
                    None
                }
            })
            .collect()
    }
}

/// Logs a delivery and records the latest text message per sender.
/// Never fails, Meta retries any delivery that is not acknowledged.
pub async fn receive(state: &State, body: serde_json::Value) -> usize {
    info!("webhook event received: {body}");

    let event: WebhookEvent = match serde_json::from_value(body) {
        Ok(event) => event,
        Err(e) => {
            warn!("unrecognized webhook payload: {e}");
            return 0;
        }
    };

    debug!("webhook object: {:?}", event.object);
    let mut recorded = 0;
    for (phone, text, at) in event.text_messages() {
        match state.db.record_conversation_message(phone, text, at) {
            Ok(conversation) => {
                debug!(
                    "conversation with {} is at step {}",
                    conversation.phone, conversation.step
                );
                recorded += 1;
            }
            Err(e) => error!("Error recording conversation message: {e:?}"),
        }
    }

    recorded
}
