//! Events recorded against watched resources.
//!
//! Events are the controller's voice towards whoever is looking at a
//! Student: one is recorded on every successful sync. Logs are the
//! controller's voice towards its operators.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Student;
use crate::telemetry::metrics;

/// Reason recorded when a Student is synced.
pub const REASON_SYNCED: &str = "Synced";
/// Message recorded when a Student is synced.
pub const MESSAGE_SYNCED: &str = "Student synced successfully";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Normal => f.write_str("Normal"),
        }
    }
}

/// The object an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub uid: Option<Uuid>,
    pub resource_version: String,
}

impl From<&Student> for ObjectReference {
    fn from(student: &Student) -> Self {
        Self {
            kind: student.kind.clone(),
            namespace: student.metadata.namespace.clone(),
            name: student.metadata.name.clone(),
            uid: student.metadata.uid,
            resource_version: student.metadata.resource_version.clone(),
        }
    }
}

/// A recorded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub involved_object: ObjectReference,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
    /// Component that recorded the event (the controller's name).
    pub source: String,
}

/// Sink for events. Recording never fails and never blocks for long.
pub trait EventRecorder: Send + Sync {
    fn record(&self, object: &Student, event_type: EventType, reason: &str, message: &str);
}

fn build(
    component: &str,
    object: &Student,
    event_type: EventType,
    reason: &str,
    message: &str,
) -> Event {
    metrics::events_recorded().add(1, &[KeyValue::new("reason", reason.to_string())]);
    Event {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        involved_object: ObjectReference::from(object),
        event_type,
        reason: reason.to_string(),
        message: message.to_string(),
        source: component.to_string(),
    }
}

/// Writes events to the structured log.
pub struct TracingRecorder {
    component: String,
}

impl TracingRecorder {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }
}

impl EventRecorder for TracingRecorder {
    fn record(&self, object: &Student, event_type: EventType, reason: &str, message: &str) {
        let event = build(&self.component, object, event_type, reason, message);
        let object = &event.involved_object;
        tracing::info!(
            source = %event.source,
            event_type = %event.event_type,
            kind = %object.kind,
            namespace = %object.namespace,
            name = %object.name,
            reason = %event.reason,
            "{}", event.message
        );
    }
}

/// Keeps every event in memory, oldest first.
pub struct MemoryRecorder {
    component: String,
    events: Mutex<Vec<Event>>,
}

impl MemoryRecorder {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events with the given reason.
    pub fn with_reason(&self, reason: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|event| event.reason == reason)
            .collect()
    }
}

impl EventRecorder for MemoryRecorder {
    fn record(&self, object: &Student, event_type: EventType, reason: &str, message: &str) {
        let event = build(&self.component, object, event_type, reason, message);
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
