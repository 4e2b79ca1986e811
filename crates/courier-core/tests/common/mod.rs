#![allow(dead_code)]

//! Recording fakes for the calendar and chat services.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier_core::model::{AclRule, LiveAclRule};
use courier_core::render::ChatMessage;
use courier_core::services::{
    CalendarEvent, CalendarSummary, EventDraft, MessageHandle, ServiceError,
};
use courier_core::{CalendarService, ChatService};
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateEvent { summary: String },
    UpdateEvent { event_id: String, summary: String },
    ListCalendars,
    CreateCalendar { name: String, timezone: String },
    ListAcl,
    InsertAcl(AclRule),
    UpdateAcl { rule_id: String, rule: AclRule },
    Send { content: String },
    Edit { message_id: String },
    Fetch { message_id: String },
}

/// Call log shared between the fakes so ordering across services is visible.
pub type CallLog = Arc<Mutex<Vec<Call>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<Call> {
    log.lock().unwrap().clone()
}

#[derive(Default)]
pub struct FakeCalendar {
    pub log: CallLog,
    /// Event writes whose summary contains one of these fail with a 500.
    pub failing_summaries: Mutex<HashSet<String>>,
    /// Event ids that answer updates with NotFound.
    pub missing_events: Mutex<HashSet<String>>,
    pub calendars: Mutex<Vec<CalendarSummary>>,
    pub acl: Mutex<Vec<LiveAclRule>>,
    next_id: Mutex<usize>,
}

impl FakeCalendar {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn fail_on(&self, summary: &str) {
        self.failing_summaries
            .lock()
            .unwrap()
            .insert(summary.to_string());
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }

    fn check(&self, event: &EventDraft) -> Result<(), ServiceError> {
        let failing = self.failing_summaries.lock().unwrap();
        if failing.iter().any(|needle| event.summary.contains(needle)) {
            return Err(ServiceError::Status {
                status: 500,
                body: "backend error".into(),
            });
        }
        Ok(())
    }

    fn next(&self, prefix: &str) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("{prefix}{next}")
    }
}

#[async_trait]
impl CalendarService for FakeCalendar {
    async fn create_event(
        &self,
        _calendar_id: &str,
        event: &EventDraft,
    ) -> Result<CalendarEvent, ServiceError> {
        self.record(Call::CreateEvent {
            summary: event.summary.clone(),
        });
        self.check(event)?;
        let id = self.next("evt");
        Ok(CalendarEvent {
            html_link: Some(format!("https://calendar.example/{id}")),
            id,
        })
    }

    async fn update_event(
        &self,
        _calendar_id: &str,
        event_id: &str,
        event: &EventDraft,
    ) -> Result<CalendarEvent, ServiceError> {
        self.record(Call::UpdateEvent {
            event_id: event_id.to_string(),
            summary: event.summary.clone(),
        });
        self.check(event)?;
        if self.missing_events.lock().unwrap().contains(event_id) {
            return Err(ServiceError::not_found("event", event_id));
        }
        Ok(CalendarEvent {
            id: event_id.to_string(),
            html_link: Some(format!("https://calendar.example/{event_id}")),
        })
    }

    async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, ServiceError> {
        self.record(Call::ListCalendars);
        Ok(self.calendars.lock().unwrap().clone())
    }

    async fn create_calendar(&self, name: &str, timezone: &str) -> Result<String, ServiceError> {
        self.record(Call::CreateCalendar {
            name: name.to_string(),
            timezone: timezone.to_string(),
        });
        Ok(self.next("cal"))
    }

    async fn list_acl(&self, _calendar_id: &str) -> Result<Vec<LiveAclRule>, ServiceError> {
        self.record(Call::ListAcl);
        Ok(self.acl.lock().unwrap().clone())
    }

    async fn insert_acl(&self, _calendar_id: &str, rule: &AclRule) -> Result<(), ServiceError> {
        self.record(Call::InsertAcl(rule.clone()));
        Ok(())
    }

    async fn update_acl(
        &self,
        _calendar_id: &str,
        rule_id: &str,
        rule: &AclRule,
    ) -> Result<(), ServiceError> {
        self.record(Call::UpdateAcl {
            rule_id: rule_id.to_string(),
            rule: rule.clone(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeChat {
    pub log: CallLog,
    /// Message ids that no longer exist.
    pub deleted: Mutex<HashSet<String>>,
    pub sent: Mutex<Vec<ChatMessage>>,
    /// Signalled with `true` on the next send, as if shutdown arrived mid-pass.
    pub cancel_on_send: Mutex<Option<watch::Sender<bool>>>,
    next_id: Mutex<usize>,
}

impl FakeChat {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChatService for FakeChat {
    async fn send(&self, message: &ChatMessage) -> Result<String, ServiceError> {
        self.record(Call::Send {
            content: message.content.clone(),
        });
        self.sent.lock().unwrap().push(message.clone());
        if let Some(cancel) = self.cancel_on_send.lock().unwrap().take() {
            cancel.send(true).unwrap();
        }
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        Ok(format!("msg{next}"))
    }

    async fn edit(&self, message_id: &str, _message: &ChatMessage) -> Result<(), ServiceError> {
        self.record(Call::Edit {
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    async fn fetch(&self, message_id: &str) -> Result<MessageHandle, ServiceError> {
        self.record(Call::Fetch {
            message_id: message_id.to_string(),
        });
        if self.deleted.lock().unwrap().contains(message_id) {
            return Err(ServiceError::not_found("message", message_id));
        }
        Ok(MessageHandle {
            id: message_id.to_string(),
            channel_id: "chan".to_string(),
        })
    }
}
