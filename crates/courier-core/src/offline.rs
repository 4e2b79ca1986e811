//! Stand-in collaborators for `--dry-run`: they log what would have been
//! sent and hand back made-up ids.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::model::{AclRule, LiveAclRule};
use crate::render::ChatMessage;
use crate::services::{
    CalendarEvent, CalendarService, CalendarSummary, ChatService, EventDraft, MessageHandle,
    ServiceError,
};

#[derive(Debug, Default)]
pub struct DryRunCalendar {
    next_id: AtomicUsize,
}

impl DryRunCalendar {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CalendarService for DryRunCalendar {
    async fn create_event(
        &self,
        calendar_id: &str,
        event: &EventDraft,
    ) -> Result<CalendarEvent, ServiceError> {
        let id = format!("dry-run-event-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        info!(
            calendar_id,
            event_id = %id,
            summary = %event.summary,
            start = %event.start,
            end = %event.end,
            "[dry-run] would create calendar event"
        );
        Ok(CalendarEvent { id, html_link: None })
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        event: &EventDraft,
    ) -> Result<CalendarEvent, ServiceError> {
        info!(
            calendar_id,
            event_id,
            summary = %event.summary,
            start = %event.start,
            "[dry-run] would update calendar event"
        );
        Ok(CalendarEvent {
            id: event_id.to_string(),
            html_link: None,
        })
    }

    async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, ServiceError> {
        Ok(Vec::new())
    }

    async fn create_calendar(&self, name: &str, timezone: &str) -> Result<String, ServiceError> {
        info!(name, timezone, "[dry-run] would create calendar");
        Ok("dry-run-calendar".to_string())
    }

    async fn list_acl(&self, _calendar_id: &str) -> Result<Vec<LiveAclRule>, ServiceError> {
        Ok(Vec::new())
    }

    async fn insert_acl(&self, calendar_id: &str, rule: &AclRule) -> Result<(), ServiceError> {
        info!(calendar_id, scope = %rule.scope_key(), role = %rule.role, "[dry-run] would insert ACL rule");
        Ok(())
    }

    async fn update_acl(
        &self,
        calendar_id: &str,
        rule_id: &str,
        rule: &AclRule,
    ) -> Result<(), ServiceError> {
        info!(calendar_id, rule_id, role = %rule.role, "[dry-run] would update ACL rule");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DryRunChat {
    next_id: AtomicUsize,
}

impl DryRunChat {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatService for DryRunChat {
    async fn send(&self, message: &ChatMessage) -> Result<String, ServiceError> {
        let id = format!("dry-run-message-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        info!(message_id = %id, images = message.images.len(), "[dry-run] would send:\n{}", message.content);
        Ok(id)
    }

    async fn edit(&self, message_id: &str, message: &ChatMessage) -> Result<(), ServiceError> {
        info!(message_id, "[dry-run] would edit message to:\n{}", message.content);
        Ok(())
    }

    async fn fetch(&self, message_id: &str) -> Result<MessageHandle, ServiceError> {
        Ok(MessageHandle {
            id: message_id.to_string(),
            channel_id: "dry-run".to_string(),
        })
    }
}
