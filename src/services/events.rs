use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Clock;
use crate::config::{EventsOptions, ServerOptions};
use crate::container::{Component, ResolutionError, Resolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Success,
    Failure,
    Information,
    Error,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Success => "success",
            EventCategory::Failure => "failure",
            EventCategory::Information => "information",
            EventCategory::Error => "error",
        }
    }
}

/// Something noteworthy the server did, for auditing.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub category: EventCategory,
    pub name: String,
    pub id: u32,
    pub message: Option<String>,
    pub client_id: Option<String>,
    pub subject_id: Option<String>,
    pub time: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(category: EventCategory, name: &str, id: u32) -> Self {
        Self {
            category,
            name: name.to_string(),
            id,
            message: None,
            client_id: None,
            subject_id: None,
            time: None,
        }
    }

    pub fn token_issued(client_id: &str, subject_id: Option<&str>) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            subject_id: subject_id.map(str::to_string),
            ..Self::new(EventCategory::Success, "Token Issued Success", 2000)
        }
    }

    pub fn token_issued_failure(client_id: Option<&str>, error: &str) -> Self {
        Self {
            client_id: client_id.map(str::to_string),
            message: Some(error.to_string()),
            ..Self::new(EventCategory::Failure, "Token Issued Failure", 2001)
        }
    }

    pub fn token_revoked(client_id: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            ..Self::new(EventCategory::Success, "Token Revoked Success", 2030)
        }
    }

    pub fn user_logout(subject_id: &str) -> Self {
        Self {
            subject_id: Some(subject_id.to_string()),
            ..Self::new(EventCategory::Success, "User Logout Success", 1002)
        }
    }

    pub fn unhandled_exception(message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
            ..Self::new(EventCategory::Error, "Unhandled Exception", 3000)
        }
    }
}

/// Receives events that passed the configured filters.
pub trait EventSink: Send + Sync {
    fn persist(&self, event: &Event);
}

/// Writes events to the log.
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn persist(&self, event: &Event) {
        log::info!(
            "event:{} id={} name={:?} client={} sub={}",
            event.category.as_str(),
            event.id,
            event.name,
            event.client_id.as_deref().unwrap_or("-"),
            event.subject_id.as_deref().unwrap_or("-")
        );
    }
}

impl Component for LogEventSink {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self)
    }
}

crate::provides!(LogEventSink => dyn EventSink);

pub trait EventService: Send + Sync {
    fn raise(&self, event: Event);
    fn can_raise(&self, category: EventCategory) -> bool;
}

pub struct DefaultEventService {
    options: EventsOptions,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl Component for DefaultEventService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        let options = resolver.resolve::<ServerOptions>()?;
        Ok(Self {
            options: options.events.clone(),
            sink: resolver.resolve()?,
            clock: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultEventService => dyn EventService);

impl EventService for DefaultEventService {
    fn raise(&self, mut event: Event) {
        if !self.can_raise(event.category) {
            return;
        }
        event.time = Some(self.clock.now());
        self.sink.persist(&event);
    }

    fn can_raise(&self, category: EventCategory) -> bool {
        match category {
            EventCategory::Success => self.options.raise_success_events,
            EventCategory::Failure => self.options.raise_failure_events,
            EventCategory::Information => self.options.raise_information_events,
            EventCategory::Error => self.options.raise_error_events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::FixedClock;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<Event>>);

    impl EventSink for RecordingSink {
        fn persist(&self, event: &Event) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn only_enabled_categories_reach_the_sink() {
        let sink = Arc::new(RecordingSink::default());
        let now = Utc::now();
        let service = DefaultEventService {
            options: EventsOptions {
                raise_success_events: true,
                raise_failure_events: false,
                ..Default::default()
            },
            sink: sink.clone(),
            clock: Arc::new(FixedClock(now)),
        };

        service.raise(Event::token_issued("web", Some("alice")));
        service.raise(Event::token_issued_failure(Some("web"), "invalid_grant"));

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, 2000);
        assert_eq!(events[0].time, Some(now));
    }

    #[test]
    fn nothing_raised_by_default() {
        let sink = Arc::new(RecordingSink::default());
        let service = DefaultEventService {
            options: EventsOptions::default(),
            sink: sink.clone(),
            clock: Arc::new(FixedClock(Utc::now())),
        };
        service.raise(Event::unhandled_exception("boom"));
        assert!(sink.0.lock().unwrap().is_empty());
    }
}
