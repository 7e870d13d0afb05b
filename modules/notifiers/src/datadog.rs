//! Reports days-to-expiry as a DogStatsD gauge.

use crate::Notifier;
use anyhow::{bail, Result};
use async_trait::async_trait;
use certmon_core::{Alert, NotifyError, SubjectFields, TlsBinding};
use time::OffsetDateTime;
use tokio::net::UdpSocket;

pub const NAME: &str = "datadog";

pub const DEFAULT_GAUGE_KEY: &str = "certificate.expiry.days";

pub struct DogStatsdNotifier {
    address: String,
    gauge_key: String,
    tags: Vec<String>,
}

impl DogStatsdNotifier {
    /// `address` is the agent's `host:port`; `tags` are appended to every gauge.
    pub fn new(address: &str, gauge_key: &str, tags: Vec<String>) -> Result<Self> {
        if address.is_empty() {
            bail!("datadog statsd address is missing");
        }
        let gauge_key = if gauge_key.is_empty() { DEFAULT_GAUGE_KEY } else { gauge_key };
        Ok(DogStatsdNotifier {
            address: address.to_string(),
            gauge_key: gauge_key.to_string(),
            tags: tags.into_iter().filter(|t| !t.is_empty()).collect(),
        })
    }

    pub(crate) fn datagram(&self, alert: &Alert, now: OffsetDateTime) -> String {
        // Floor, so anything already expired reports a negative count.
        let days = (alert.expiration - now).whole_seconds().div_euclid(86_400);
        let mut tags = vec![format!("certificate:{}", subject_tag(&alert.subject))];
        tags.extend(self.tags.iter().cloned());
        format!("{}:{}|g|#{}", self.gauge_key, days, tags.join(","))
    }
}

fn pretty(values: &[String]) -> String {
    values.join(" ").to_lowercase().replace(' ', "_")
}

fn subject_tag(s: &SubjectFields) -> String {
    format!(
        "/c:{}/st:{}/l:{}/o:{}/ou:{}/cn:{}",
        pretty(&s.country),
        pretty(&s.province),
        pretty(&s.locality),
        pretty(&s.organization),
        pretty(&s.organizational_unit),
        s.common_name.to_lowercase()
    )
}

#[async_trait]
impl Notifier for DogStatsdNotifier {
    fn name(&self) -> &'static str { NAME }

    async fn alert(&self, alert: &Alert, _binding: &TlsBinding) -> Result<(), NotifyError> {
        let line = self.datagram(alert, OffsetDateTime::now_utc());
        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(|e| NotifyError::transport(NAME, e))?;
        socket
            .send_to(line.as_bytes(), self.address.as_str())
            .await
            .map_err(|e| NotifyError::transport(NAME, e))?;
        Ok(())
    }
}
