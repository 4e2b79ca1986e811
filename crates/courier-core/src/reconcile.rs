//! One reconciliation pass: decide create / update / skip for each fetched
//! entry and keep the ledger in step with what was actually published.

use std::sync::Arc;

use chrono::TimeDelta;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::CourierError;
use crate::extract::TemporalExtractor;
use crate::model::{Entry, EventTime, ExtractedEntry, SeenRecord};
use crate::render::{CalendarLinks, ChatMessage, render_entry};
use crate::services::{CalendarEvent, CalendarService, ChatService, EventDraft};
use crate::store::Ledger;

/// The calendar events are written to, and how they are shaped.
#[derive(Clone)]
pub struct CalendarBinding {
    pub service: Arc<dyn CalendarService>,
    pub calendar_id: String,
    /// Link to the whole calendar, shown in every chat message.
    pub subscribe_link: Option<String>,
    pub timezone: String,
    pub event_duration: TimeDelta,
}

impl CalendarBinding {
    pub fn draft(&self, extracted: &ExtractedEntry, start: EventTime) -> EventDraft {
        EventDraft {
            summary: extracted.entry.title.trim().to_string(),
            description: format!("Source thread: {}", extracted.entry.link),
            start,
            end: start + self.event_duration,
            timezone: self.timezone.clone(),
        }
    }
}

/// What happened to one artifact while publishing an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactAction {
    Created,
    Updated,
    /// The stored artifact was gone, so a new one replaced it.
    Recreated,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Unchanged,
    Unresolved,
    Published {
        calendar: ArtifactAction,
        chat: ArtifactAction,
    },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    pub entry_id: String,
    pub outcome: EntryOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Entries created or updated during the pass.
    pub processed: usize,
    pub unchanged: usize,
    pub unresolved: usize,
    pub failed: usize,
    /// True when the pass stopped early because cancellation was requested.
    pub cancelled: bool,
    pub outcomes: Vec<EntryReport>,
}

impl PassReport {
    fn record(&mut self, entry_id: &str, outcome: EntryOutcome) {
        match &outcome {
            EntryOutcome::Unchanged => self.unchanged += 1,
            EntryOutcome::Unresolved => self.unresolved += 1,
            EntryOutcome::Published { .. } => self.processed += 1,
            EntryOutcome::Failed(_) => self.failed += 1,
        }
        self.outcomes.push(EntryReport {
            entry_id: entry_id.to_string(),
            outcome,
        });
    }
}

pub struct Reconciler {
    extractor: TemporalExtractor,
    calendar: Option<CalendarBinding>,
    chat: Arc<dyn ChatService>,
}

impl Reconciler {
    /// `calendar` is `None` when calendar publishing is disabled.
    pub fn new(
        extractor: TemporalExtractor,
        calendar: Option<CalendarBinding>,
        chat: Arc<dyn ChatService>,
    ) -> Self {
        Self {
            extractor,
            calendar,
            chat,
        }
    }

    pub fn extractor(&self) -> &TemporalExtractor {
        &self.extractor
    }

    /// Runs one pass over `entries`, which arrive newest first.
    ///
    /// Entries are handled oldest first and strictly one at a time. A failing
    /// entry keeps its previous ledger record and does not stop the pass.
    /// `cancel` is only consulted between entries.
    pub async fn reconcile(
        &self,
        mut entries: Vec<Entry>,
        ledger: &mut Ledger,
        cancel: &watch::Receiver<bool>,
    ) -> PassReport {
        entries.reverse();
        let mut report = PassReport::default();

        for entry in &entries {
            if *cancel.borrow() {
                info!(remaining = entries.len() - report.outcomes.len(), "Pass cancelled");
                report.cancelled = true;
                break;
            }

            let outcome = match self.reconcile_entry(entry, ledger).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(entry_id = %entry.id, error = %err, "Abandoning entry for this pass");
                    EntryOutcome::Failed(err.to_string())
                }
            };
            report.record(&entry.id, outcome);
        }

        info!(
            processed = report.processed,
            unchanged = report.unchanged,
            unresolved = report.unresolved,
            failed = report.failed,
            "Reconciliation pass finished"
        );
        report
    }

    async fn reconcile_entry(
        &self,
        entry: &Entry,
        ledger: &mut Ledger,
    ) -> Result<EntryOutcome, CourierError> {
        let previous = ledger.get(&entry.id).cloned();
        if previous.as_ref().is_some_and(|record| record.matches(entry)) {
            debug!(entry_id = %entry.id, "Entry unchanged");
            return Ok(EntryOutcome::Unchanged);
        }

        let extracted = self.extractor.extract_entry(entry);
        let Some(start) = extracted.parsed_time else {
            info!(entry_id = %entry.id, title = %entry.title, "No event time found; skipping");
            return Ok(EntryOutcome::Unresolved);
        };

        let previous_event = previous.as_ref().and_then(|r| r.calendar_event_id.as_deref());
        let previous_message = previous.as_ref().and_then(|r| r.chat_message_id.as_deref());

        let (calendar_event_id, links, calendar_action) = match &self.calendar {
            Some(binding) => {
                let draft = binding.draft(&extracted, start);
                let (event, action) = upsert_event(binding, previous_event, &draft).await?;
                let links = CalendarLinks {
                    event: event.html_link,
                    calendar: binding.subscribe_link.clone(),
                };
                (Some(event.id), links, action)
            }
            None => (None, CalendarLinks::default(), ArtifactAction::Skipped),
        };

        let message = render_entry(&extracted, &links);
        let (message_id, chat_action) = self.upsert_message(previous_message, &message).await?;

        ledger.set(
            &entry.id,
            SeenRecord {
                title_snapshot: entry.title.clone(),
                content_snapshot: entry.content.clone(),
                calendar_event_id,
                chat_message_id: Some(message_id),
            },
        )?;

        info!(
            entry_id = %entry.id,
            calendar = ?calendar_action,
            chat = ?chat_action,
            start = %start,
            "Published entry"
        );
        Ok(EntryOutcome::Published {
            calendar: calendar_action,
            chat: chat_action,
        })
    }

    async fn upsert_message(
        &self,
        previous: Option<&str>,
        message: &ChatMessage,
    ) -> Result<(String, ArtifactAction), CourierError> {
        let Some(message_id) = previous else {
            let id = self.chat.send(message).await?;
            return Ok((id, ArtifactAction::Created));
        };

        let edited = match self.chat.fetch(message_id).await {
            Ok(handle) => self.chat.edit(&handle.id, message).await.map(|_| handle.id),
            Err(err) => Err(err),
        };
        match edited {
            Ok(id) => Ok((id, ArtifactAction::Updated)),
            Err(err) if err.is_not_found() => {
                warn!(message_id, "Chat message disappeared; sending a new one");
                let id = self.chat.send(message).await?;
                Ok((id, ArtifactAction::Recreated))
            }
            Err(err) => Err(err.into()),
        }
    }
}

async fn upsert_event(
    binding: &CalendarBinding,
    previous: Option<&str>,
    draft: &EventDraft,
) -> Result<(CalendarEvent, ArtifactAction), CourierError> {
    let service = binding.service.as_ref();
    let calendar_id = binding.calendar_id.as_str();

    let Some(event_id) = previous else {
        let event = service.create_event(calendar_id, draft).await?;
        return Ok((event, ArtifactAction::Created));
    };

    match service.update_event(calendar_id, event_id, draft).await {
        Ok(event) => Ok((event, ArtifactAction::Updated)),
        Err(err) if err.is_not_found() => {
            warn!(event_id, "Calendar event disappeared; creating a new one");
            let event = service.create_event(calendar_id, draft).await?;
            Ok((event, ArtifactAction::Recreated))
        }
        Err(err) => Err(err.into()),
    }
}
