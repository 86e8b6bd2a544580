//! Resources that record their lifecycle.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tenancy_mount::{Properties, Resource, ResourceError};

/// What happened to a resource or extension.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Configured(Properties),
    Started,
    Ready,
    Stopped,
    Extended,
    Unextended,
}

#[derive(Debug, Clone)]
pub struct Event {
    /// Resource id the event is about
    pub resource: String,
    pub kind: EventKind,
    pub at: Instant,
}

/// Ordered, shared record of events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, resource: &str, kind: EventKind) {
        self.events.lock().unwrap().push(Event {
            resource: resource.to_string(),
            kind,
            at: Instant::now(),
        });
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Event kinds recorded for `resource`, in order.
    pub fn kinds(&self, resource: &str) -> Vec<EventKind> {
        self.events()
            .into_iter()
            .filter(|e| e.resource == resource)
            .map(|e| e.kind)
            .collect()
    }

    /// First time `resource` recorded an event matching `matches`.
    pub fn first(&self, resource: &str, matches: impl Fn(&EventKind) -> bool) -> Option<Instant> {
        self.events()
            .into_iter()
            .find(|e| e.resource == resource && matches(&e.kind))
            .map(|e| e.at)
    }
}

/// A resource that records every hook call in an [`EventLog`].
pub struct RecordingResource {
    id: String,
    log: EventLog,
    properties: Mutex<Properties>,
    fail_start: bool,
    reject_config: bool,
}

impl RecordingResource {
    pub fn new(id: &str, log: EventLog) -> Self {
        Self {
            id: id.to_string(),
            log,
            properties: Mutex::new(Properties::new()),
            fail_start: false,
            reject_config: false,
        }
    }

    /// `start` returns an error.
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// `update_properties` returns an error.
    pub fn rejecting_config(mut self) -> Self {
        self.reject_config = true;
        self
    }
}

impl Resource for RecordingResource {
    fn id(&self) -> &str {
        &self.id
    }

    fn start(&self) -> Result<(), ResourceError> {
        if self.fail_start {
            return Err(ResourceError::Failed {
                id: self.id.clone(),
                message: "start refused".to_string(),
            });
        }
        self.log.record(&self.id, EventKind::Started);
        Ok(())
    }

    fn on_ready(&self) {
        self.log.record(&self.id, EventKind::Ready);
    }

    fn stop(&self) {
        self.log.record(&self.id, EventKind::Stopped);
    }

    fn properties(&self) -> Properties {
        self.properties.lock().unwrap().clone()
    }

    fn update_properties(&self, properties: &Properties) -> Result<(), ResourceError> {
        if self.reject_config {
            return Err(ResourceError::Invalid {
                id: self.id.clone(),
                message: "configuration refused".to_string(),
            });
        }
        self.log
            .record(&self.id, EventKind::Configured(properties.clone()));
        let mut current = self.properties.lock().unwrap();
        for (key, value) in properties {
            current.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}
