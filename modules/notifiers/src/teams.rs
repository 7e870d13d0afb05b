//! Posts alerts to a Microsoft Teams incoming webhook as a MessageCard.

use crate::{binding_facts, headline, Notifier};
use anyhow::{bail, Result};
use async_trait::async_trait;
use certmon_core::{Alert, AlertLevel, NotifyError, TlsBinding};
use serde::Serialize;
use std::time::Duration;
use time::OffsetDateTime;

pub const NAME: &str = "teams";

const CARD_CONTEXT: &str = "https://schema.org/extensions";
const CARD_TYPE: &str = "MessageCard";
const DANGER_COLOR: &str = "FF0000";
const WARNING_COLOR: &str = "FFA500";

#[derive(Debug, Serialize)]
pub struct MessageCard {
    #[serde(rename = "@context")]
    pub context: &'static str,
    #[serde(rename = "@type")]
    pub card_type: &'static str,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Summary")]
    pub summary: String,
    #[serde(rename = "themeColor")]
    pub theme_color: &'static str,
    pub sections: Vec<Section>,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Section {
    pub facts: Vec<Fact>,
}

#[derive(Debug, Serialize)]
pub struct Fact {
    pub name: &'static str,
    pub value: String,
}

impl MessageCard {
    pub fn new(alert: &Alert, binding: &TlsBinding, now: OffsetDateTime) -> Self {
        let theme_color = match alert.level {
            AlertLevel::Critical => DANGER_COLOR,
            AlertLevel::Warning => WARNING_COLOR,
        };
        let text = headline(alert, now);
        let facts = binding_facts(alert, binding, ", ")
            .into_iter()
            .map(|(name, value)| Fact { name, value })
            .collect();
        MessageCard {
            context: CARD_CONTEXT,
            card_type: CARD_TYPE,
            title: text.clone(),
            summary: text,
            theme_color,
            sections: vec![Section { facts }],
            version: "1.0",
        }
    }
}

pub struct TeamsNotifier {
    client: reqwest::Client,
    webhook: String,
}

impl TeamsNotifier {
    pub fn new(webhook: &str, timeout: Duration) -> Result<Self> {
        if webhook.is_empty() {
            bail!("teams webhook endpoint is missing");
        }
        Ok(TeamsNotifier {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            webhook: webhook.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for TeamsNotifier {
    fn name(&self) -> &'static str { NAME }

    async fn alert(&self, alert: &Alert, binding: &TlsBinding) -> Result<(), NotifyError> {
        let card = MessageCard::new(alert, binding, OffsetDateTime::now_utc());
        let resp = self
            .client
            .post(&self.webhook)
            .json(&card)
            .send()
            .await
            .map_err(|e| NotifyError::transport(NAME, e))?;
        if !resp.status().is_success() {
            return Err(NotifyError::Rejected { notifier: NAME, message: format!("webhook answered {}", resp.status()) });
        }
        Ok(())
    }
}
