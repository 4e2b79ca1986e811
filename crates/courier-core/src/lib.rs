//! Core library for the courier feed watcher: time extraction, reconciliation
//! of feed entries into calendar events and chat messages, and calendar ACL
//! convergence.

pub mod acl;
pub mod config;
pub mod discord;
pub mod error;
pub mod extract;
pub mod feed;
pub mod google;
pub mod logging;
pub mod model;
pub mod offline;
pub mod provision;
pub mod reconcile;
pub mod render;
pub mod runner;
pub mod services;
pub mod store;

pub use acl::{AclPlan, AclReport, AclSynchronizer, AclUpdate};
pub use config::{AppPaths, ConfigLoadResult, ConfigSource, FileConfig, load_config, save_config};
pub use error::{CourierError, ValidationError};
pub use extract::{Extraction, Location, Occurrence, ParseFailure, Resolution, ScanState, TemporalExtractor};
pub use model::{
    AclRule, Author, Entry, EventTime, ExtractedEntry, LiveAclRule, RawAclRule, Role, ScopeKey,
    SeenRecord,
};
pub use provision::{CalendarSettings, ProvisionedCalendar, provision_calendar, subscribe_link};
pub use reconcile::{ArtifactAction, CalendarBinding, EntryOutcome, PassReport, Reconciler};
pub use runner::{PassRunner, TriggerResult};
pub use services::{CalendarService, ChatService, FeedSource, ServiceError};
pub use store::{JsonStore, Ledger, MemoryStore, ReadWriter, Reader};
