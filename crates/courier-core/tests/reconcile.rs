mod common;

use std::sync::Arc;

use chrono::{DateTime, TimeDelta};
use common::{Call, FakeCalendar, FakeChat, call_log, calls};
use courier_core::reconcile::EntryOutcome;
use courier_core::{
    ArtifactAction, CalendarBinding, Entry, ExtractedEntry, MemoryStore, ReadWriter, Reader,
    Reconciler, SeenRecord, TemporalExtractor,
};
use tokio::sync::watch;

fn entry(id: &str, title: &str) -> Entry {
    Entry::new(
        Some(id.to_string()),
        format!("https://example.com/{id}"),
        title,
    )
    .with_content(["See you there"])
}

fn binding(calendar: Arc<FakeCalendar>) -> CalendarBinding {
    CalendarBinding {
        service: calendar,
        calendar_id: "cal".to_string(),
        subscribe_link: Some("https://calendar.example/subscribe".to_string()),
        timezone: "UTC".to_string(),
        event_duration: TimeDelta::minutes(240),
    }
}

struct Harness {
    log: common::CallLog,
    calendar: Arc<FakeCalendar>,
    chat: Arc<FakeChat>,
    reconciler: Reconciler,
}

fn harness() -> Harness {
    let log = call_log();
    let calendar = Arc::new(FakeCalendar::new(log.clone()));
    let chat = Arc::new(FakeChat::new(log.clone()));
    let reconciler = Reconciler::new(
        TemporalExtractor::new(chrono_tz::UTC),
        Some(binding(calendar.clone())),
        chat.clone(),
    );
    Harness {
        log,
        calendar,
        chat,
        reconciler,
    }
}

fn not_cancelled() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

/// Newest first, the way the feed delivers them.
fn three_new_entries() -> Vec<Entry> {
    vec![
        entry("t3_c", "Third 2024-05-03 18:00 UTC"),
        entry("t3_b", "Second 2024-05-02 18:00 UTC"),
        entry("t3_a", "First 2024-05-01 18:00 UTC"),
    ]
}

#[tokio::test]
async fn second_pass_over_unchanged_feed_is_silent() {
    let h = harness();
    let mut ledger = MemoryStore::<SeenRecord>::new();
    let cancel = not_cancelled();

    let first = h
        .reconciler
        .reconcile(three_new_entries(), &mut ledger, &cancel)
        .await;
    assert_eq!(first.processed, 3);
    let calls_after_first = calls(&h.log).len();
    let writes_after_first = ledger.writes();
    assert_eq!(writes_after_first, 3);

    let second = h
        .reconciler
        .reconcile(three_new_entries(), &mut ledger, &cancel)
        .await;
    assert_eq!(second.unchanged, 3);
    assert_eq!(second.processed, 0);
    assert_eq!(calls(&h.log).len(), calls_after_first);
    assert_eq!(ledger.writes(), writes_after_first);
}

#[tokio::test]
async fn events_are_created_oldest_first() {
    let h = harness();
    let mut ledger = MemoryStore::<SeenRecord>::new();

    h.reconciler
        .reconcile(three_new_entries(), &mut ledger, &not_cancelled())
        .await;

    let created: Vec<String> = calls(&h.log)
        .into_iter()
        .filter_map(|call| match call {
            Call::CreateEvent { summary } => Some(summary),
            _ => None,
        })
        .collect();
    assert_eq!(created, vec!["First", "Second", "Third"]);
}

#[tokio::test]
async fn calendar_call_precedes_chat_call() {
    let h = harness();
    let mut ledger = MemoryStore::<SeenRecord>::new();

    h.reconciler
        .reconcile(
            vec![entry("t3_a", "First 2024-05-01 18:00 UTC")],
            &mut ledger,
            &not_cancelled(),
        )
        .await;

    let log = calls(&h.log);
    assert!(matches!(log[0], Call::CreateEvent { .. }));
    assert!(matches!(log[1], Call::Send { .. }));

    let sent = h.chat.sent.lock().unwrap();
    assert!(sent[0].content.contains("https://calendar.example/evt1"));
    assert!(sent[0].content.contains("https://calendar.example/subscribe"));
}

#[tokio::test]
async fn changed_entry_updates_existing_event() {
    let h = harness();
    let mut ledger = MemoryStore::<SeenRecord>::new();
    ledger
        .set(
            "t3_a",
            SeenRecord {
                title_snapshot: "First 2024-05-01 18:00 UTC".to_string(),
                content_snapshot: vec!["Old body".to_string()],
                calendar_event_id: Some("evt1".to_string()),
                chat_message_id: Some("msg9".to_string()),
            },
        )
        .unwrap();

    let report = h
        .reconciler
        .reconcile(
            vec![entry("t3_a", "First 2024-05-01 18:00 UTC")],
            &mut ledger,
            &not_cancelled(),
        )
        .await;

    assert_eq!(
        report.outcomes[0].outcome,
        EntryOutcome::Published {
            calendar: ArtifactAction::Updated,
            chat: ArtifactAction::Updated,
        }
    );
    let log = calls(&h.log);
    assert_eq!(
        log,
        vec![
            Call::UpdateEvent {
                event_id: "evt1".to_string(),
                summary: "First".to_string(),
            },
            Call::Fetch {
                message_id: "msg9".to_string(),
            },
            Call::Edit {
                message_id: "msg9".to_string(),
            },
        ]
    );
    let record = ledger.get("t3_a").unwrap();
    assert_eq!(record.content_snapshot, vec!["See you there".to_string()]);
    assert_eq!(record.calendar_event_id.as_deref(), Some("evt1"));
    assert_eq!(record.chat_message_id.as_deref(), Some("msg9"));
}

#[tokio::test]
async fn failing_entry_keeps_old_record_and_pass_continues() {
    let h = harness();
    h.calendar.fail_on("Second");
    let mut ledger = MemoryStore::<SeenRecord>::new();

    let report = h
        .reconciler
        .reconcile(three_new_entries(), &mut ledger, &not_cancelled())
        .await;

    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 1);
    assert!(matches!(report.outcomes[1].outcome, EntryOutcome::Failed(_)));
    assert!(ledger.contains("t3_a"));
    assert!(!ledger.contains("t3_b"));
    assert!(ledger.contains("t3_c"));

    let sends = calls(&h.log)
        .iter()
        .filter(|call| matches!(call, Call::Send { .. }))
        .count();
    assert_eq!(sends, 2);

    // Retried on the next pass once the calendar recovers.
    h.calendar.failing_summaries.lock().unwrap().clear();
    let retry = h
        .reconciler
        .reconcile(three_new_entries(), &mut ledger, &not_cancelled())
        .await;
    assert_eq!((retry.processed, retry.unchanged), (1, 2));
    assert!(ledger.contains("t3_b"));
}

#[tokio::test]
async fn entries_without_a_time_are_skipped() {
    let h = harness();
    let mut ledger = MemoryStore::<SeenRecord>::new();

    let report = h
        .reconciler
        .reconcile(
            vec![entry("t3_x", "Weekly discussion thread")],
            &mut ledger,
            &not_cancelled(),
        )
        .await;

    assert_eq!(report.unresolved, 1);
    assert!(calls(&h.log).is_empty());
    assert_eq!(ledger.writes(), 0);
}

#[tokio::test]
async fn vanished_artifacts_are_recreated() {
    let h = harness();
    h.calendar
        .missing_events
        .lock()
        .unwrap()
        .insert("evt7".to_string());
    h.chat.deleted.lock().unwrap().insert("msg7".to_string());
    let mut ledger = MemoryStore::<SeenRecord>::new();
    ledger
        .set(
            "t3_a",
            SeenRecord {
                title_snapshot: "Old title".to_string(),
                content_snapshot: Vec::new(),
                calendar_event_id: Some("evt7".to_string()),
                chat_message_id: Some("msg7".to_string()),
            },
        )
        .unwrap();

    let report = h
        .reconciler
        .reconcile(
            vec![entry("t3_a", "First 2024-05-01 18:00 UTC")],
            &mut ledger,
            &not_cancelled(),
        )
        .await;

    assert_eq!(
        report.outcomes[0].outcome,
        EntryOutcome::Published {
            calendar: ArtifactAction::Recreated,
            chat: ArtifactAction::Recreated,
        }
    );
    let record = ledger.get("t3_a").unwrap();
    assert_eq!(record.calendar_event_id.as_deref(), Some("evt1"));
    assert_eq!(record.chat_message_id.as_deref(), Some("msg1"));
}

#[tokio::test]
async fn disabled_calendar_only_posts_chat() {
    let log = call_log();
    let chat = Arc::new(FakeChat::new(log.clone()));
    let reconciler = Reconciler::new(TemporalExtractor::new(chrono_tz::UTC), None, chat);
    let mut ledger = MemoryStore::<SeenRecord>::new();

    let report = reconciler
        .reconcile(
            vec![entry("t3_a", "First 2024-05-01 18:00 UTC")],
            &mut ledger,
            &not_cancelled(),
        )
        .await;

    assert_eq!(
        report.outcomes[0].outcome,
        EntryOutcome::Published {
            calendar: ArtifactAction::Skipped,
            chat: ArtifactAction::Created,
        }
    );
    let log = calls(&log);
    assert!(matches!(log.as_slice(), [Call::Send { .. }]));
    assert_eq!(ledger.get("t3_a").unwrap().calendar_event_id, None);
}

#[tokio::test]
async fn cancelled_pass_stops_between_entries() {
    let h = harness();
    let mut ledger = MemoryStore::<SeenRecord>::new();
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let report = h
        .reconciler
        .reconcile(three_new_entries(), &mut ledger, &rx)
        .await;

    assert!(report.cancelled);
    assert!(report.outcomes.is_empty());
    assert!(calls(&h.log).is_empty());
}

#[tokio::test]
async fn cancelling_mid_pass_keeps_finished_entries() {
    let h = harness();
    let mut ledger = MemoryStore::<SeenRecord>::new();
    let (tx, rx) = watch::channel(false);
    *h.chat.cancel_on_send.lock().unwrap() = Some(tx);

    let report = h
        .reconciler
        .reconcile(three_new_entries(), &mut ledger, &rx)
        .await;

    assert!(report.cancelled);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(
        report.outcomes[0].outcome,
        EntryOutcome::Published {
            calendar: ArtifactAction::Created,
            chat: ArtifactAction::Created,
        }
    );
    assert_eq!(ledger.writes(), 1);
    assert!(ledger.contains("t3_a"));
    assert!(!ledger.contains("t3_b"));
    assert!(!ledger.contains("t3_c"));

    let log = calls(&h.log);
    assert_eq!(log.len(), 2);
    assert_eq!(
        log[0],
        Call::CreateEvent {
            summary: "First".to_string(),
        }
    );
    assert!(matches!(log[1], Call::Send { .. }));
}

#[test]
fn draft_spans_configured_duration() {
    let calendar = Arc::new(FakeCalendar::new(call_log()));
    let binding = binding(calendar);
    let start = DateTime::parse_from_rfc3339("2024-05-01T18:00:00Z").unwrap();
    let extracted = ExtractedEntry {
        entry: entry("t3_a", "  Raid night  "),
        parsed_time: Some(start),
    };

    let draft = binding.draft(&extracted, start);
    assert_eq!(draft.summary, "Raid night");
    assert_eq!(draft.description, "Source thread: https://example.com/t3_a");
    assert_eq!(draft.end - draft.start, TimeDelta::hours(4));
    assert_eq!(draft.timezone, "UTC");
}
