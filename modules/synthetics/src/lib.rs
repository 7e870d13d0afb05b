//! Mirrors the discovered endpoint set into a synthetic-monitoring service as
//! managed certificate checks, scoped by an ownership tag.

pub mod datadog;
pub mod memory;
pub mod reconcile;

use anyhow::Result;
use async_trait::async_trait;
use certmon_core::{Endpoint, EndpointParseError};
use serde::{Deserialize, Serialize};

pub use datadog::DatadogSynthetics;
pub use memory::MemoryBackend;
pub use reconcile::{desired_set, plan, DesiredSet, Plan, ReconcileReport, ReconcileSettings, Reconciler};

/// Operator and target of the certificate assertion attached to every check.
pub const EXPIRY_OPERATOR: &str = "isInMoreThan";
pub const EXPIRY_TARGET: u32 = 12;

/// An endpoint as mirrored into the synthetic service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyntheticEndpoint {
    pub hostname: String,
    pub port: u16,
}

impl SyntheticEndpoint {
    /// Normalized name, `hostname-port`. Used as desired-set key and check name.
    pub fn name(&self) -> String {
        format!("{}-{}", self.hostname, self.port)
    }

    pub fn parse(input: &str) -> Result<Self, EndpointParseError> {
        Endpoint::parse(input).map(|e| SyntheticEndpoint::from(&e))
    }
}

impl From<&Endpoint> for SyntheticEndpoint {
    fn from(e: &Endpoint) -> Self {
        SyntheticEndpoint { hostname: e.hostname.clone(), port: e.port }
    }
}

/// A check held by the synthetic service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedCheck {
    pub public_id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ManagedCheck {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Everything needed to create one certificate-expiry check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub tags: Vec<String>,
    pub message: String,
    /// Seconds between check runs.
    pub tick_every: u32,
    pub locations: Vec<String>,
}

#[async_trait]
pub trait SyntheticBackend: Send + Sync {
    async fn list_checks(&self) -> Result<Vec<ManagedCheck>>;
    async fn create_check(&self, request: &CheckRequest) -> Result<ManagedCheck>;
    async fn delete_checks(&self, public_ids: &[String]) -> Result<()>;
}
