use crate::{CheckRequest, ManagedCheck, SyntheticBackend, SyntheticEndpoint};
use certmon_core::{Endpoint, SyntheticsError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Endpoints that should carry a managed check, keyed by [`SyntheticEndpoint::name`].
pub type DesiredSet = BTreeMap<String, SyntheticEndpoint>;

#[derive(Debug, Clone, Default)]
pub struct ReconcileSettings {
    /// Marks checks as owned by this monitor. Only tagged checks are ever deleted.
    pub ownership_tag: String,
    pub extra_tags: Vec<String>,
    pub alert_message: String,
    /// Seconds between synthetic runs.
    pub check_interval: u32,
    pub locations: Vec<String>,
    /// Mirrored even when discovery does not report them.
    pub additional_endpoints: Vec<SyntheticEndpoint>,
}

pub fn desired_set<'a>(
    discovered: impl IntoIterator<Item = &'a Endpoint>,
    additional: &[SyntheticEndpoint],
) -> DesiredSet {
    discovered
        .into_iter()
        .map(SyntheticEndpoint::from)
        .chain(additional.iter().cloned())
        .map(|e| (e.name(), e))
        .collect()
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Plan {
    pub create: Vec<SyntheticEndpoint>,
    /// Names already covered by a managed check.
    pub keep: Vec<String>,
    /// Names taken by a check we do not own; left alone and never duplicated.
    pub foreign: Vec<String>,
    pub delete: Vec<ManagedCheck>,
}

/// Diff the desired set against every check the service reports.
pub fn plan(desired: &DesiredSet, checks: &[ManagedCheck], tag: &str) -> Plan {
    let mut owned = BTreeSet::new();
    let mut foreign = BTreeSet::new();
    for c in checks {
        if c.has_tag(tag) {
            owned.insert(c.name.as_str());
        } else {
            foreign.insert(c.name.as_str());
        }
    }

    let mut out = Plan::default();
    for (name, endpoint) in desired {
        if owned.contains(name.as_str()) {
            out.keep.push(name.clone());
        } else if foreign.contains(name.as_str()) {
            out.foreign.push(name.clone());
        } else {
            out.create.push(endpoint.clone());
        }
    }
    out.delete = checks
        .iter()
        .filter(|c| c.has_tag(tag) && !desired.contains_key(&c.name))
        .cloned()
        .collect();
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub create_failed: usize,
    pub kept: usize,
    pub foreign: usize,
    pub deleted: usize,
}

pub struct Reconciler {
    backend: Arc<dyn SyntheticBackend>,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(backend: Arc<dyn SyntheticBackend>, settings: ReconcileSettings) -> Self {
        Reconciler { backend, settings }
    }

    pub fn settings(&self) -> &ReconcileSettings { &self.settings }

    fn tags(&self) -> Vec<String> {
        let mut tags = vec![self.settings.ownership_tag.clone()];
        for t in &self.settings.extra_tags {
            if !t.is_empty() && !tags.contains(t) {
                tags.push(t.clone());
            }
        }
        tags
    }

    pub fn request_for(&self, endpoint: &SyntheticEndpoint) -> CheckRequest {
        CheckRequest {
            name: endpoint.name(),
            host: endpoint.hostname.clone(),
            port: endpoint.port,
            tags: self.tags(),
            message: self.settings.alert_message.clone(),
            tick_every: self.settings.check_interval,
            locations: self.settings.locations.clone(),
        }
    }

    /// Bring the managed checks in line with `discovered` plus the configured
    /// additional endpoints. Individual create failures are logged and skipped;
    /// a failed batch delete is returned.
    pub async fn reconcile<'a>(
        &self,
        discovered: impl IntoIterator<Item = &'a Endpoint>,
    ) -> Result<ReconcileReport, SyntheticsError> {
        let tag = self.settings.ownership_tag.as_str();
        if tag.is_empty() {
            return Err(SyntheticsError::MissingOwnershipTag);
        }

        let checks = self
            .backend
            .list_checks()
            .await
            .map_err(|e| SyntheticsError::List(e.into()))?;
        let desired = desired_set(discovered, &self.settings.additional_endpoints);
        let diff = plan(&desired, &checks, tag);

        let mut report = ReconcileReport { kept: diff.keep.len(), foreign: diff.foreign.len(), ..Default::default() };
        for name in &diff.foreign {
            warn!(check = %name, tag, "check exists without ownership tag, not creating a duplicate");
        }

        for endpoint in &diff.create {
            let request = self.request_for(endpoint);
            match self.backend.create_check(&request).await {
                Ok(created) => {
                    info!(check = %created.name, public_id = %created.public_id, "created synthetic check");
                    report.created += 1;
                }
                Err(e) => {
                    let err = SyntheticsError::Create { name: request.name, source: e.into() };
                    warn!(error = %err, "skipping synthetic check");
                    report.create_failed += 1;
                }
            }
        }

        if diff.delete.is_empty() {
            info!("no managed synthetic checks to delete");
            return Ok(report);
        }
        let ids: Vec<String> = diff.delete.iter().map(|c| c.public_id.clone()).collect();
        self.backend
            .delete_checks(&ids)
            .await
            .map_err(|e| SyntheticsError::Delete { count: ids.len(), source: e.into() })?;
        for c in &diff.delete {
            info!(check = %c.name, public_id = %c.public_id, "deleted synthetic check");
        }
        report.deleted = ids.len();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;

    const TAG: &str = "managed-by-cert-expiry-mon";

    fn check(id: &str, name: &str, tags: &[&str]) -> ManagedCheck {
        ManagedCheck { public_id: id.into(), name: name.into(), tags: tags.iter().map(|t| t.to_string()).collect() }
    }

    fn settings() -> ReconcileSettings {
        ReconcileSettings {
            ownership_tag: TAG.into(),
            extra_tags: vec!["team:sre".into()],
            alert_message: "certificate expires soon".into(),
            check_interval: 900,
            locations: vec!["aws:ap-northeast-1".into()],
            additional_endpoints: vec![],
        }
    }

    fn reconciler(backend: &Arc<MemoryBackend>, settings: ReconcileSettings) -> Reconciler {
        Reconciler::new(backend.clone(), settings)
    }

    #[test]
    fn desired_set_merges_additional_endpoints() {
        let discovered = [Endpoint::new("a.com", None), Endpoint::new("a.com", None)];
        let extra = [SyntheticEndpoint::parse("b.com:8443").unwrap(), SyntheticEndpoint::parse("a.com").unwrap()];
        let set = desired_set(&discovered, &extra);
        assert_eq!(set.keys().cloned().collect::<Vec<_>>(), vec!["a.com-443", "b.com-8443"]);
    }

    #[test]
    fn plan_splits_create_keep_delete() {
        let desired = desired_set(&[Endpoint::new("a.com", None), Endpoint::new("b.com", None)], &[]);
        let checks = vec![check("1", "a.com-443", &[TAG]), check("2", "old.com-443", &[TAG])];
        let p = plan(&desired, &checks, TAG);
        assert_eq!(p.create, vec![SyntheticEndpoint::parse("b.com").unwrap()]);
        assert_eq!(p.keep, vec!["a.com-443"]);
        assert_eq!(p.delete, vec![check("2", "old.com-443", &[TAG])]);
    }

    #[test]
    fn untagged_checks_are_never_deleted_or_duplicated() {
        let desired = desired_set(&[Endpoint::new("a.com", None)], &[]);
        let checks = vec![check("1", "a.com-443", &["team:web"]), check("2", "gone.com-443", &[])];
        let p = plan(&desired, &checks, TAG);
        assert!(p.create.is_empty());
        assert_eq!(p.foreign, vec!["a.com-443"]);
        assert!(p.delete.is_empty());
    }

    #[tokio::test]
    async fn creates_missing_and_deletes_stale() {
        let backend = Arc::new(MemoryBackend::new(vec![
            check("keep", "a.com-443", &[TAG]),
            check("stale", "old.com-443", &[TAG]),
        ]));
        let r = reconciler(&backend, settings());
        let discovered = [Endpoint::new("a.com", None), Endpoint::new("b.com", Some(8443))];
        let report = r.reconcile(&discovered).await.unwrap();
        assert_eq!(report, ReconcileReport { created: 1, kept: 1, deleted: 1, ..Default::default() });

        let created = backend.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "b.com-8443");
        assert_eq!((created[0].host.as_str(), created[0].port), ("b.com", 8443));
        assert_eq!(created[0].tags, vec![TAG.to_string(), "team:sre".into()]);
        assert_eq!(created[0].tick_every, 900);
        assert_eq!(backend.delete_batches(), vec![vec!["stale".to_string()]]);
    }

    #[tokio::test]
    async fn empty_ownership_tag_fails_before_listing() {
        let backend = Arc::new(MemoryBackend::new(vec![check("x", "x.com-443", &[])]));
        let r = reconciler(&backend, ReconcileSettings { ownership_tag: String::new(), ..settings() });
        let err = r.reconcile(&[Endpoint::new("a.com", None)]).await.unwrap_err();
        assert!(matches!(err, SyntheticsError::MissingOwnershipTag));
        assert_eq!(backend.list_calls(), 0);
        assert!(backend.created().is_empty());
        assert!(backend.delete_batches().is_empty());
    }

    #[tokio::test]
    async fn create_failure_does_not_stop_the_rest() {
        let backend = Arc::new(MemoryBackend::default());
        backend.fail_create_for("a.com-443");
        let r = reconciler(&backend, settings());
        let discovered = [Endpoint::new("a.com", None), Endpoint::new("b.com", None)];
        let report = r.reconcile(&discovered).await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.create_failed, 1);
        assert_eq!(backend.created().len(), 2);
        assert_eq!(backend.checks().len(), 1);
    }

    #[tokio::test]
    async fn delete_failure_is_returned() {
        let backend = Arc::new(MemoryBackend::new(vec![check("s1", "old.com-443", &[TAG]), check("s2", "older.com-443", &[TAG])]));
        backend.fail_delete(true);
        let r = reconciler(&backend, settings());
        let err = r.reconcile(std::iter::empty()).await.unwrap_err();
        assert!(matches!(err, SyntheticsError::Delete { count: 2, .. }));
        assert!(err.escapes_cycle());
        assert_eq!(backend.delete_batches().len(), 1);
    }

    #[tokio::test]
    async fn only_tagged_twin_is_deleted_when_endpoint_disappears() {
        let backend = Arc::new(MemoryBackend::new(vec![
            check("owned", "a.com-443", &[TAG]),
            check("theirs", "a.com-443", &["team:web"]),
        ]));
        let report = reconciler(&backend, settings()).reconcile(std::iter::empty()).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(backend.delete_batches(), vec![vec!["owned".to_string()]]);
        assert_eq!(backend.checks(), vec![check("theirs", "a.com-443", &["team:web"])]);
        assert!(backend.created().is_empty());
    }

    #[tokio::test]
    async fn list_failure_is_reported_without_changes() {
        let backend = Arc::new(MemoryBackend::default());
        backend.fail_list(true);
        let r = reconciler(&backend, settings());
        let err = r.reconcile(&[Endpoint::new("a.com", None)]).await.unwrap_err();
        assert!(matches!(err, SyntheticsError::List(_)));
        assert!(backend.created().is_empty());
    }

    #[tokio::test]
    async fn nothing_to_delete_makes_no_delete_call() {
        let backend = Arc::new(MemoryBackend::new(vec![check("1", "a.com-443", &[TAG])]));
        let r = reconciler(&backend, settings());
        let report = r.reconcile(&[Endpoint::new("a.com", None)]).await.unwrap();
        assert_eq!(report.kept, 1);
        assert!(backend.delete_batches().is_empty());
    }

    #[tokio::test]
    async fn additional_endpoints_are_kept_alive() {
        let backend = Arc::new(MemoryBackend::new(vec![check("1", "status.example.com-443", &[TAG])]));
        let s = ReconcileSettings {
            additional_endpoints: vec![SyntheticEndpoint::parse("status.example.com").unwrap()],
            ..settings()
        };
        let report = reconciler(&backend, s).reconcile(std::iter::empty()).await.unwrap();
        assert_eq!(report.kept, 1);
        assert_eq!(report.deleted, 0);
    }
}
