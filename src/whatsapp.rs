use anyhow::anyhow;
use async_trait::async_trait;
use lazy_regex::*;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

#[cfg(test)]
use mockall::automock;

use crate::State;

pub const DEFAULT_API_URL: &str = "https://graph.facebook.com/v18.0";

pub static PHONE_REGEX: Lazy<Regex> = lazy_regex!(r"^\+?[0-9]{8,15}$");

#[cfg_attr(test, automock)]
#[async_trait]
pub(crate) trait WhatsAppClient {
    /// Sends a text message, returns the message id assigned by the Cloud API.
    async fn send_text(&self, to: String, body: String) -> anyhow::Result<String>;
}

#[derive(Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Deserialize)]
struct SentMessageId {
    id: String,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessageId>,
}

pub(crate) struct CloudApiClient {
    http: reqwest::Client,
    messages_url: Url,
    token: String,
}

impl CloudApiClient {
    pub fn new(api_url: &str, phone_number_id: &str, token: String) -> anyhow::Result<Self> {
        let base = api_url.trim_end_matches('/');
        let messages_url = Url::parse(&format!("{base}/{phone_number_id}/messages"))?;

        Ok(Self {
            http: reqwest::Client::new(),
            messages_url,
            token,
        })
    }
}

#[async_trait]
impl WhatsAppClient for CloudApiClient {
    async fn send_text(&self, to: String, body: String) -> anyhow::Result<String> {
        let payload = OutgoingMessage {
            messaging_product: "whatsapp",
            to: &to,
            kind: "text",
            text: TextBody { body: &body },
        };

        let res = self
            .http
            .post(self.messages_url.clone())
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow!("WhatsApp API returned {status}: {text}"));
        }

        let sent: SendResponse = res.json().await?;
        let id = sent
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or(anyhow!("WhatsApp API response had no message id"))?;
        debug!("sent whatsapp message {id} to {to}");

        Ok(id)
    }
}

pub(crate) fn setup_whatsapp(
    api_url: &str,
    phone_number_id: &str,
    token: String,
) -> anyhow::Result<Arc<dyn WhatsAppClient + Send + Sync>> {
    Ok(Arc::new(CloudApiClient::new(api_url, phone_number_id, token)?))
}

/// Strips the leading `+` the Cloud API does not expect.
pub fn normalize_phone(phone: &str) -> Option<String> {
    let phone = phone.trim();
    if !PHONE_REGEX.is_match(phone) {
        return None;
    }

    Some(phone.trim_start_matches('+').to_string())
}

pub async fn send_message(state: &State, to: String, message: String) -> anyhow::Result<String> {
    state.whatsapp.send_text(to, message).await
}

#[cfg(all(test, not(feature = "integration-tests")))]
mod tests {
    use super::*;

    #[test]
    fn phone_numbers() {
        assert_eq!(normalize_phone("+5511987654321"), Some("5511987654321".into()));
        assert_eq!(normalize_phone(" 5511987654321 "), Some("5511987654321".into()));

        assert_eq!(normalize_phone("1234567"), None);
        assert_eq!(normalize_phone("55 11 98765 4321"), None);
        assert_eq!(normalize_phone("++5511987654321"), None);
        assert_eq!(normalize_phone("phone"), None);
        assert_eq!(normalize_phone(""), None);
    }

    #[tokio::test]
    async fn sends_text_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/123456/messages")
            .match_header("authorization", "Bearer secret")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "messaging_product": "whatsapp",
                "to": "5511987654321",
                "type": "text",
                "text": { "body": "hello" }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"messaging_product":"whatsapp","contacts":[{"input":"5511987654321","wa_id":"5511987654321"}],"messages":[{"id":"wamid.ABC"}]}"#)
            .create_async()
            .await;

        let client = CloudApiClient::new(&server.url(), "123456", "secret".to_string()).unwrap();
        let id = client
            .send_text("5511987654321".to_string(), "hello".to_string())
            .await
            .unwrap();

        assert_eq!(id, "wamid.ABC");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/123456/messages")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Invalid OAuth access token."}}"#)
            .create_async()
            .await;

        let client = CloudApiClient::new(&server.url(), "123456", "bad".to_string()).unwrap();
        let err = client
            .send_text("5511987654321".to_string(), "hello".to_string())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("Invalid OAuth access token"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_message_id() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/123456/messages")
            .with_status(200)
            .with_body(r#"{"messages":[]}"#)
            .create_async()
            .await;

        let client = CloudApiClient::new(&server.url(), "123456", "secret".to_string()).unwrap();
        let res = client
            .send_text("5511987654321".to_string(), "hello".to_string())
            .await;

        assert!(res.is_err());
    }
}
