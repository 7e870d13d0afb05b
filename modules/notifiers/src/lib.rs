//! Alert backends and the dispatcher fanning a classified alert out to them.

pub mod datadog;
pub mod log;
pub mod slack;
pub mod teams;

use async_trait::async_trait;
use certmon_core::{Alert, AlertLevel, NotifyError, TlsBinding};
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tracing::{info, warn};

pub use datadog::DogStatsdNotifier;
pub use log::LogNotifier;
pub use slack::SlackNotifier;
pub use teams::TeamsNotifier;

/// A backend that can deliver an expiry alert.
///
/// Implementations must cope with bindings that declare no endpoints.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn alert(&self, alert: &Alert, binding: &TlsBinding) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub failed: usize,
}

/// Invokes every registered notifier in registration order. A failing
/// notifier is logged and never stops the ones after it.
#[derive(Default)]
pub struct Dispatcher {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new(notifiers: Vec<Box<dyn Notifier>>) -> Self {
        Dispatcher { notifiers }
    }

    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        info!(notifier = notifier.name(), "registered notifier");
        self.notifiers.push(notifier);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    pub async fn dispatch(&self, alert: &Alert, binding: &TlsBinding) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for notifier in &self.notifiers {
            match notifier.alert(alert, binding).await {
                Ok(()) => summary.delivered += 1,
                Err(e) => {
                    warn!(notifier = notifier.name(), binding = %binding.qualified_name(), error = %e, "failed to send alert");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

/// One-line summary shared by the chat backends.
pub(crate) fn headline(alert: &Alert, now: OffsetDateTime) -> String {
    match alert.level {
        AlertLevel::Critical => format!(
            "[CRITICAL] TLS certificate already expired at {} days ago",
            (now - alert.expiration).whole_days()
        ),
        AlertLevel::Warning => format!(
            "[WARNING] TLS certificate will expire within {} days",
            (alert.expiration - now).whole_days()
        ),
    }
}

pub(crate) fn format_expiration(expiration: OffsetDateTime) -> String {
    expiration.format(&Rfc2822).unwrap_or_else(|_| expiration.to_string())
}

/// Titled facts shown by every human-facing backend, in display order.
pub(crate) fn binding_facts(alert: &Alert, binding: &TlsBinding, host_sep: &str) -> Vec<(&'static str, String)> {
    vec![
        ("Cluster", binding.cluster_name.clone()),
        ("Namespace", binding.namespace.clone()),
        ("Ingress", binding.name.clone()),
        ("TLS secret name", binding.secret_name.clone()),
        ("Expiration", format_expiration(alert.expiration)),
        ("Hosts", binding.hosts().join(host_sep)),
    ]
}
