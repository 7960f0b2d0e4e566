// SPDX-License-Identifier: MIT

//! Shared index of wait descriptors

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

use super::descriptor::{InboundEvent, WaitDescriptor, WaitStatus};
use crate::ndk::error::EngineError;

#[derive(Debug, Default)]
struct Waits {
    by_id: HashMap<String, WaitDescriptor>,
    /// Event name -> ids of ACTIVE event waits
    by_event: HashMap<String, BTreeSet<String>>,
}

impl Waits {
    fn unlink(&mut self, id: &str) {
        let Some(event) = self.by_id.get(id).and_then(|w| w.event_name()) else {
            return;
        };
        if let Some(ids) = self.by_event.get_mut(event) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_event.remove(event);
            }
        }
    }

    fn settle(&mut self, id: &str, status: WaitStatus) -> Option<WaitDescriptor> {
        self.unlink(id);
        let wait = self.by_id.get_mut(id)?;
        wait.set_status(status);
        Some(wait.clone())
    }
}

/// Index of wait descriptors shared by every run.
///
/// Pauses insert and dispatches claim concurrently. Dispatch scans under
/// the read lock and only takes the write lock when something matched.
#[derive(Debug, Default)]
pub struct WaitIndex {
    waits: RwLock<Waits>,
}

impl WaitIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new ACTIVE descriptor. A settled descriptor with the same
    /// id is replaced; an ACTIVE one is a `DuplicateWait`.
    pub async fn insert(&self, wait: WaitDescriptor) -> Result<(), EngineError> {
        let mut waits = self.waits.write().await;
        if waits.by_id.get(&wait.id).is_some_and(|w| w.is_active()) {
            return Err(EngineError::DuplicateWait(wait.id));
        }
        waits.unlink(&wait.id);
        if let Some(event) = wait.event_name() {
            waits
                .by_event
                .entry(event.to_string())
                .or_default()
                .insert(wait.id.clone());
        }
        log::debug!(
            "Wait {} registered for run {} at {}",
            wait.id,
            wait.run_id,
            wait.node_id
        );
        waits.by_id.insert(wait.id.clone(), wait);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<WaitDescriptor> {
        self.waits.read().await.by_id.get(id).cloned()
    }

    /// Move a descriptor from ACTIVE to COMPLETED, exactly once
    pub async fn claim(&self, id: &str) -> Result<WaitDescriptor, EngineError> {
        let mut waits = self.waits.write().await;
        let status = waits
            .by_id
            .get(id)
            .map(|w| w.status)
            .ok_or_else(|| EngineError::WaitNotFound(id.to_string()))?;
        match status {
            WaitStatus::Active => waits
                .settle(id, WaitStatus::Completed)
                .ok_or_else(|| EngineError::WaitNotFound(id.to_string())),
            WaitStatus::Completed => Err(EngineError::AlreadyResumed {
                wait_id: id.to_string(),
            }),
            WaitStatus::Expired => Err(EngineError::ExpiredWait {
                wait_id: id.to_string(),
            }),
        }
    }

    /// Return a claimed descriptor to ACTIVE after its signal could not be
    /// delivered. Descriptors that are not COMPLETED are left alone.
    pub async fn release(&self, id: &str) -> bool {
        let mut waits = self.waits.write().await;
        let Some(wait) = waits.by_id.get_mut(id) else {
            return false;
        };
        if wait.status != WaitStatus::Completed {
            return false;
        }
        wait.set_status(WaitStatus::Active);
        if let Some(event) = wait.event_name().map(str::to_string) {
            waits
                .by_event
                .entry(event)
                .or_default()
                .insert(id.to_string());
        }
        log::debug!("Wait {} released back to active", id);
        true
    }

    /// Claim every ACTIVE event wait matching `event`.
    ///
    /// Each descriptor is claimed at most once across concurrent dispatches.
    /// When nothing matches the index is left untouched.
    pub async fn claim_matching(&self, event: &InboundEvent) -> Vec<WaitDescriptor> {
        let candidates: Vec<String> = {
            let waits = self.waits.read().await;
            waits
                .by_event
                .get(&event.name)
                .map(|ids| {
                    ids.iter()
                        .filter(|id| waits.by_id.get(*id).is_some_and(|w| w.matches(event)))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut waits = self.waits.write().await;
        let mut claimed = Vec::with_capacity(candidates.len());
        for id in candidates {
            // another dispatch may have claimed it between the two locks
            if !waits.by_id.get(&id).is_some_and(|w| w.matches(event)) {
                continue;
            }
            if let Some(wait) = waits.settle(&id, WaitStatus::Completed) {
                claimed.push(wait);
            }
        }
        claimed
    }

    /// Expire every ACTIVE descriptor of a run; returns how many changed
    pub async fn expire_run(&self, run_id: &str) -> usize {
        let mut waits = self.waits.write().await;
        let ids: Vec<String> = waits
            .by_id
            .values()
            .filter(|w| w.run_id == run_id && w.is_active())
            .map(|w| w.id.clone())
            .collect();
        for id in &ids {
            waits.settle(id, WaitStatus::Expired);
        }
        ids.len()
    }

    /// Expire ACTIVE descriptors created before `cutoff`
    pub async fn expire_before(&self, cutoff: DateTime<Utc>) -> Vec<WaitDescriptor> {
        let mut waits = self.waits.write().await;
        let ids: Vec<String> = waits
            .by_id
            .values()
            .filter(|w| w.is_active() && w.created_at < cutoff)
            .map(|w| w.id.clone())
            .collect();
        ids.iter()
            .filter_map(|id| waits.settle(id, WaitStatus::Expired))
            .collect()
    }

    /// ACTIVE descriptors, oldest first
    pub async fn list_active(&self) -> Vec<WaitDescriptor> {
        let waits = self.waits.read().await;
        let mut active: Vec<WaitDescriptor> =
            waits.by_id.values().filter(|w| w.is_active()).cloned().collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        active
    }
}
