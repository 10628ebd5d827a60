//! Cache event log.
//!
//! Observed cache actions are kept in a bounded ring buffer for debugging.
//! The log is not an audit trail: the oldest events are discarded once the
//! capacity is reached.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// One observed cache action.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEvent {
    /// Unique identifier for correlating log lines.
    pub id: Uuid,
    pub kind: EventKind,
    /// Key, or key pattern for clears.
    pub key: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
    #[serde(serialize_with = "time::serde::rfc3339::serialize")]
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    pub fn new(kind: EventKind, key: &str, category: &str, tenant_id: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            key: key.to_string(),
            category: category.to_string(),
            tenant_id: tenant_id.map(str::to_string),
            response_time_ms: None,
            ttl_seconds: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn with_response_time(mut self, response_time_ms: Option<f64>) -> Self {
        self.response_time_ms = response_time_ms;
        self
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Hit,
    Miss,
    Set,
    Delete,
    Clear,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Hit => "hit",
            EventKind::Miss => "miss",
            EventKind::Set => "set",
            EventKind::Delete => "delete",
            EventKind::Clear => "clear",
        }
    }
}

/// Fixed-capacity ring buffer of the most recent events.
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<CacheEvent>,
    capacity: NonZeroUsize,
}

impl EventLog {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.get()),
            capacity,
        }
    }

    /// Append an event, evicting the oldest one when full.
    pub fn push(&mut self, event: CacheEvent) {
        if self.events.len() == self.capacity.get() {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// The most recent `limit` events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<CacheEvent> {
        let skip = self.events.len().saturating_sub(limit);
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
