//! Collaborator interfaces the reconciler and the ACL synchronizer drive.
//!
//! Concrete adapters live in [`crate::feed`], [`crate::google`] and
//! [`crate::discord`]; tests substitute recording fakes.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{AclRule, Entry, EventTime, LiveAclRule};
use crate::render::ChatMessage;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },
    #[error("service responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl ServiceError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound { .. })
    }
}

/// Source of feed entries, newest first.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Entry>, ServiceError>;
}

/// Calendar event payload built from an extracted entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub summary: String,
    pub description: String,
    pub start: EventTime,
    pub end: EventTime,
    pub timezone: String,
}

/// A calendar event as acknowledged by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub html_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarSummary {
    pub id: String,
    pub summary: String,
}

#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn create_event(
        &self,
        calendar_id: &str,
        event: &EventDraft,
    ) -> Result<CalendarEvent, ServiceError>;

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        event: &EventDraft,
    ) -> Result<CalendarEvent, ServiceError>;

    /// Every calendar visible to the account, across all pages.
    async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, ServiceError>;

    async fn create_calendar(&self, name: &str, timezone: &str) -> Result<String, ServiceError>;

    /// Every ACL rule of the calendar, across all pages.
    async fn list_acl(&self, calendar_id: &str) -> Result<Vec<LiveAclRule>, ServiceError>;

    async fn insert_acl(&self, calendar_id: &str, rule: &AclRule) -> Result<(), ServiceError>;

    async fn update_acl(
        &self,
        calendar_id: &str,
        rule_id: &str,
        rule: &AclRule,
    ) -> Result<(), ServiceError>;
}

/// A previously sent chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub id: String,
    pub channel_id: String,
}

#[async_trait]
pub trait ChatService: Send + Sync {
    /// Posts a new message and returns its id.
    async fn send(&self, message: &ChatMessage) -> Result<String, ServiceError>;

    async fn edit(&self, message_id: &str, message: &ChatMessage) -> Result<(), ServiceError>;

    async fn fetch(&self, message_id: &str) -> Result<MessageHandle, ServiceError>;
}
