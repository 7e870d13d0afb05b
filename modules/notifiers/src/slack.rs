//! Posts alerts to a Slack channel through `chat.postMessage`.

use crate::{binding_facts, headline, Notifier};
use anyhow::{bail, Result};
use async_trait::async_trait;
use certmon_core::ratelimiter::RateLimiter;
use certmon_core::{Alert, AlertLevel, NotifyError, TlsBinding};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

pub const NAME: &str = "slack";

const API_URL: &str = "https://slack.com/api/chat.postMessage";
const USERNAME: &str = "Certificate Expiry Monitor";
// Slack allows roughly one message per second per channel.
const SEND_PER_SECOND: u32 = 1;

#[derive(Debug, Serialize)]
pub(crate) struct PostMessage<'a> {
    channel: &'a str,
    username: &'static str,
    attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize)]
struct Attachment {
    color: &'static str,
    pretext: String,
    fields: Vec<Field>,
}

#[derive(Debug, Serialize)]
struct Field {
    title: &'static str,
    value: String,
    short: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackNotifier {
    client: reqwest::Client,
    token: String,
    channel: String,
    api_url: String,
    limiter: RateLimiter,
}

impl SlackNotifier {
    /// The destination channel is fixed at construction. Needs a tokio runtime.
    pub fn new(token: &str, channel: &str, timeout: Duration) -> Result<Self> {
        if token.is_empty() {
            bail!("slack token is missing");
        }
        if channel.is_empty() {
            bail!("slack channel is missing");
        }
        Ok(SlackNotifier {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            token: token.to_string(),
            channel: channel.to_string(),
            api_url: API_URL.to_string(),
            limiter: RateLimiter::new(SEND_PER_SECOND),
        })
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

pub(crate) fn post_message<'a>(channel: &'a str, alert: &Alert, binding: &TlsBinding, now: OffsetDateTime) -> PostMessage<'a> {
    let color = match alert.level {
        AlertLevel::Critical => "danger",
        AlertLevel::Warning => "warning",
    };
    let fields = binding_facts(alert, binding, "\n")
        .into_iter()
        .map(|(title, value)| Field { title, value, short: false })
        .collect();
    PostMessage {
        channel,
        username: USERNAME,
        attachments: vec![Attachment { color, pretext: headline(alert, now), fields }],
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &'static str { NAME }

    async fn alert(&self, alert: &Alert, binding: &TlsBinding) -> Result<(), NotifyError> {
        let msg = post_message(&self.channel, alert, binding, OffsetDateTime::now_utc());
        self.limiter.acquire().await;
        let resp: ApiResponse = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.token)
            .json(&msg)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| NotifyError::transport(NAME, e))?
            .json()
            .await
            .map_err(|e| NotifyError::transport(NAME, e))?;
        if !resp.ok {
            return Err(NotifyError::Rejected { notifier: NAME, message: resp.error.unwrap_or_else(|| "unknown error".into()) });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    #[test]
    fn payload_shape() {
        let msg = post_message("#alerts", &alert(AlertLevel::Critical, -4), &binding(), now());
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["channel"], "#alerts");
        assert_eq!(v["username"], USERNAME);
        let att = &v["attachments"][0];
        assert_eq!(att["color"], "danger");
        assert_eq!(att["pretext"], "[CRITICAL] TLS certificate already expired at 4 days ago");
        let titles: Vec<_> = att["fields"].as_array().unwrap().iter().map(|f| f["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["Cluster", "Namespace", "Ingress", "TLS secret name", "Expiration", "Hosts"]);
        assert_eq!(att["fields"][5]["value"], "shop.example.com:443\napi.example.com:8443");
    }

    #[tokio::test]
    async fn rejects_missing_credentials() {
        assert!(SlackNotifier::new("", "#c", Duration::from_secs(1)).is_err());
        assert!(SlackNotifier::new("xoxb", "", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn posts_with_bearer_token() {
        let (url, served) = one_shot_http(200, r#"{"ok":true}"#).await;
        let n = SlackNotifier::new("xoxb-123", "#alerts", Duration::from_secs(5)).unwrap().with_api_url(url);
        n.alert(&alert(AlertLevel::Warning, 7), &binding()).await.unwrap();
        let req = served.await.unwrap();
        assert!(req.starts_with("POST / HTTP/1.1"));
        assert!(req.to_lowercase().contains("authorization: bearer xoxb-123"));
        assert!(req.contains("\"channel\":\"#alerts\""));
    }

    #[tokio::test]
    async fn api_level_error_is_reported() {
        let (url, _served) = one_shot_http(200, r#"{"ok":false,"error":"channel_not_found"}"#).await;
        let n = SlackNotifier::new("xoxb", "#gone", Duration::from_secs(5)).unwrap().with_api_url(url);
        let err = n.alert(&alert(AlertLevel::Warning, 7), &binding()).await.unwrap_err();
        assert!(err.to_string().contains("channel_not_found"));
    }
}
