//! Writes alerts to the application log at ERROR level.

use crate::{format_expiration, Notifier};
use async_trait::async_trait;
use certmon_core::{Alert, NotifyError, TlsBinding};
use serde::Serialize;
use tracing::error;

pub const NAME: &str = "log";
/// Tracing target alert events are emitted under.
pub const TARGET: &str = "alert";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertRecord {
    pub level: &'static str,
    pub cluster_name: String,
    pub namespace: String,
    pub ingress: String,
    pub secret_name: String,
    pub expiration: String,
    pub hosts: String,
}

impl AlertRecord {
    pub fn new(alert: &Alert, binding: &TlsBinding) -> Self {
        AlertRecord {
            level: alert.level.as_str(),
            cluster_name: binding.cluster_name.clone(),
            namespace: binding.namespace.clone(),
            ingress: binding.name.clone(),
            secret_name: binding.secret_name.clone(),
            expiration: format_expiration(alert.expiration),
            hosts: binding.hosts().join(","),
        }
    }
}

#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str { NAME }

    async fn alert(&self, alert: &Alert, binding: &TlsBinding) -> Result<(), NotifyError> {
        let r = AlertRecord::new(alert, binding);
        error!(
            target: TARGET,
            level = r.level,
            cluster = %r.cluster_name,
            namespace = %r.namespace,
            ingress = %r.ingress,
            secret = %r.secret_name,
            expiration = %r.expiration,
            hosts = %r.hosts,
            "ALERT"
        );
        Ok(())
    }
}
