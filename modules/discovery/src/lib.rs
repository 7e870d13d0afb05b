//! Endpoint discovery: where TLS bindings come from, and the de-duplicated
//! endpoint set accumulated across them each cycle.

pub mod ingress;

use async_trait::async_trait;
use certmon_core::{Endpoint, SourceError, TlsBinding};
use std::collections::BTreeMap;
use std::sync::Mutex;

pub use crate::ingress::KubeIngressSource;

/// Enumerates routing objects and yields one binding per declared TLS entry.
/// Each call returns a complete snapshot.
#[async_trait]
pub trait EndpointSource: Send + Sync {
    async fn list_bindings(&self) -> Result<Vec<TlsBinding>, SourceError>;
}

/// In-memory source returning a fixed list of bindings, or a failure.
#[derive(Default)]
pub struct StaticSource {
    bindings: Mutex<Vec<TlsBinding>>,
    fail_with: Mutex<Option<String>>,
}

impl StaticSource {
    pub fn new(bindings: Vec<TlsBinding>) -> Self {
        StaticSource { bindings: Mutex::new(bindings), fail_with: Mutex::new(None) }
    }

    /// Make subsequent listings fail with `message`; `None` restores success.
    pub fn set_failure(&self, message: Option<&str>) {
        if let Ok(mut f) = self.fail_with.lock() { *f = message.map(str::to_string); }
    }
}

#[async_trait]
impl EndpointSource for StaticSource {
    async fn list_bindings(&self) -> Result<Vec<TlsBinding>, SourceError> {
        if let Some(msg) = self.fail_with.lock().ok().and_then(|f| f.clone()) {
            return Err(SourceError::new(msg));
        }
        Ok(self.bindings.lock().map(|b| b.clone()).unwrap_or_default())
    }
}

/// Endpoints of one cycle, folded by normalized `hostname:port` key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSet {
    by_key: BTreeMap<String, Endpoint>,
}

impl EndpointSet {
    pub fn from_bindings<'a>(bindings: impl IntoIterator<Item = &'a TlsBinding>) -> Self {
        let mut set = EndpointSet::default();
        for b in bindings {
            for e in &b.endpoints {
                set.insert(e.clone());
            }
        }
        set
    }

    /// Returns false when an endpoint with the same key was already present.
    pub fn insert(&mut self, endpoint: Endpoint) -> bool {
        self.by_key.insert(endpoint.key(), endpoint).is_none()
    }

    pub fn contains(&self, key: &str) -> bool { self.by_key.contains_key(key) }

    pub fn len(&self) -> usize { self.by_key.len() }

    pub fn is_empty(&self) -> bool { self.by_key.is_empty() }
}

impl<'a> IntoIterator for &'a EndpointSet {
    type Item = &'a Endpoint;
    type IntoIter = std::collections::btree_map::Values<'a, String, Endpoint>;

    fn into_iter(self) -> Self::IntoIter { self.by_key.values() }
}
