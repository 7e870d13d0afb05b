//! One monitoring cycle (discover, probe, classify, alert, reconcile) and the
//! interval loop around it.

use cert_probe::{binding_snapshot, classify, CertificateFetcher};
use certmon_core::{Alert, CycleError};
use discovery::{EndpointSet, EndpointSource};
use notifiers::Dispatcher;
use std::time::Duration;
use synthetics::{ReconcileReport, Reconciler};
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

type CycleHook = Box<dyn Fn(u64) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub bindings: usize,
    pub endpoints: usize,
    pub unreachable: usize,
    pub alerts: usize,
    pub notify_failures: usize,
    pub synthetics: Option<ReconcileReport>,
}

pub struct Controller {
    source: Box<dyn EndpointSource>,
    fetcher: Box<dyn CertificateFetcher>,
    dispatcher: Dispatcher,
    reconciler: Option<Reconciler>,
    interval: Duration,
    threshold: Duration,
    on_cycle: CycleHook,
}

impl Controller {
    pub fn new(
        source: Box<dyn EndpointSource>,
        fetcher: Box<dyn CertificateFetcher>,
        dispatcher: Dispatcher,
        interval: Duration,
        threshold: Duration,
    ) -> Self {
        Controller {
            source,
            fetcher,
            dispatcher,
            reconciler: None,
            interval,
            threshold,
            on_cycle: Box::new(|_| {}),
        }
    }

    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Called with the 1-based cycle number before each cycle starts.
    pub fn with_cycle_hook(mut self, hook: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_cycle = Box::new(hook);
        self
    }

    /// Run cycles until `stop` turns true or its sender is dropped. A stop is
    /// only observed between cycles. Returns the number of cycles run.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) -> u64 {
        info!(interval = ?self.interval, threshold = ?self.threshold, "starting controller");
        let mut cycles = 0;
        loop {
            cycles += 1;
            (self.on_cycle)(cycles);
            match self.run_once(OffsetDateTime::now_utc()).await {
                Ok(report) => info!(
                    cycle = cycles,
                    bindings = report.bindings,
                    endpoints = report.endpoints,
                    alerts = report.alerts,
                    notify_failures = report.notify_failures,
                    synthetics = ?report.synthetics,
                    "cycle finished"
                ),
                Err(e) => error!(cycle = cycles, error = %e, "cycle failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        info!(cycles, "terminating controller");
        cycles
    }

    pub async fn run_once(&self, now: OffsetDateTime) -> Result<CycleReport, CycleError> {
        let bindings = self.source.list_bindings().await?;
        let endpoints = EndpointSet::from_bindings(&bindings);
        let mut report = CycleReport { bindings: bindings.len(), endpoints: endpoints.len(), ..Default::default() };
        debug!(bindings = report.bindings, endpoints = report.endpoints, "listed tls bindings");

        for binding in &bindings {
            let Some((endpoint, snapshot)) = binding_snapshot(self.fetcher.as_ref(), &binding.endpoints).await else {
                warn!(binding = %binding.qualified_name(), secret = %binding.secret_name, "no endpoint presented a certificate");
                report.unreachable += 1;
                continue;
            };
            let Some(level) = classify(snapshot.not_after, now, self.threshold) else {
                debug!(binding = %binding.qualified_name(), host = %endpoint, "certificate is not close to expiry");
                continue;
            };
            info!(binding = %binding.qualified_name(), host = %endpoint, level = %level, "certificate needs attention");
            let summary = self.dispatcher.dispatch(&Alert::new(snapshot, level), binding).await;
            report.alerts += 1;
            report.notify_failures += summary.failed;
        }

        if let Some(reconciler) = &self.reconciler {
            match reconciler.reconcile(&endpoints).await {
                Ok(r) => report.synthetics = Some(r),
                Err(e) if e.escapes_cycle() => return Err(e.into()),
                Err(e) => error!(error = %e, "synthetic check reconciliation failed"),
            }
        }
        Ok(report)
    }
}
