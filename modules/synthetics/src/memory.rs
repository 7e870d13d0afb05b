//! In-process backend holding checks in a vector, for exercising reconciliation
//! without a live service.

use crate::{CheckRequest, ManagedCheck, SyntheticBackend};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    checks: Vec<ManagedCheck>,
    next_id: u64,
    list_calls: usize,
    created: Vec<CheckRequest>,
    delete_batches: Vec<Vec<String>>,
    fail_list: bool,
    fail_delete: bool,
    fail_create: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new(checks: Vec<ManagedCheck>) -> Self {
        let backend = MemoryBackend::default();
        backend.lock().checks = checks;
        backend
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn checks(&self) -> Vec<ManagedCheck> { self.lock().checks.clone() }

    pub fn list_calls(&self) -> usize { self.lock().list_calls }

    /// Requests seen by `create_check`, including failed ones.
    pub fn created(&self) -> Vec<CheckRequest> { self.lock().created.clone() }

    pub fn delete_batches(&self) -> Vec<Vec<String>> { self.lock().delete_batches.clone() }

    pub fn fail_list(&self, fail: bool) { self.lock().fail_list = fail; }

    pub fn fail_delete(&self, fail: bool) { self.lock().fail_delete = fail; }

    pub fn fail_create_for(&self, name: &str) {
        self.lock().fail_create.insert(name.to_string());
    }
}

#[async_trait]
impl SyntheticBackend for MemoryBackend {
    async fn list_checks(&self) -> Result<Vec<ManagedCheck>> {
        let mut state = self.lock();
        state.list_calls += 1;
        if state.fail_list {
            return Err(anyhow!("listing unavailable"));
        }
        Ok(state.checks.clone())
    }

    async fn create_check(&self, request: &CheckRequest) -> Result<ManagedCheck> {
        let mut state = self.lock();
        state.created.push(request.clone());
        if state.fail_create.contains(&request.name) {
            return Err(anyhow!("quota exceeded"));
        }
        state.next_id += 1;
        let check = ManagedCheck {
            public_id: format!("mem-{}", state.next_id),
            name: request.name.clone(),
            tags: request.tags.clone(),
        };
        state.checks.push(check.clone());
        Ok(check)
    }

    async fn delete_checks(&self, public_ids: &[String]) -> Result<()> {
        let mut state = self.lock();
        state.delete_batches.push(public_ids.to_vec());
        if state.fail_delete {
            return Err(anyhow!("delete rejected"));
        }
        state.checks.retain(|c| !public_ids.contains(&c.public_id));
        Ok(())
    }
}
