// SPDX-License-Identifier: MIT

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ndk::result::WaitCondition;
use crate::ndk::value::subset_match;

/// Lifecycle of a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitStatus {
    Active,
    Completed,
    Expired,
}

/// A paused node waiting to be resumed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitDescriptor {
    pub id: String,
    pub run_id: String,
    pub node_id: String,
    pub condition: WaitCondition,
    pub status: WaitStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An event arriving from outside the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub name: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Narrows matching to waits registered with the same scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
}

impl WaitDescriptor {
    pub fn new(
        id: impl Into<String>,
        run_id: impl Into<String>,
        node_id: impl Into<String>,
        condition: WaitCondition,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            run_id: run_id.into(),
            node_id: node_id.into(),
            condition,
            status: WaitStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == WaitStatus::Active
    }

    /// Event name for correlated waits
    pub fn event_name(&self) -> Option<&str> {
        match &self.condition {
            WaitCondition::Event { event, .. } => Some(event),
            WaitCondition::Direct { .. } => None,
        }
    }

    /// An ACTIVE event wait whose name, scope and criteria all accept `event`
    pub fn matches(&self, event: &InboundEvent) -> bool {
        if !self.is_active() {
            return false;
        }
        match &self.condition {
            WaitCondition::Event {
                event: name,
                scope_id,
                criteria,
            } => {
                let scope_ok = match &event.scope_id {
                    Some(scope) => scope_id.as_deref() == Some(scope.as_str()),
                    None => true,
                };
                name == &event.name && scope_ok && subset_match(criteria, &event.data)
            }
            WaitCondition::Direct { .. } => false,
        }
    }

    pub(crate) fn set_status(&mut self, status: WaitStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

impl InboundEvent {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data: crate::ndk::value::into_output(data),
            scope_id: None,
        }
    }

    pub fn scoped(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }
}
