//! Finding or creating the single calendar every event goes to.

use std::sync::Arc;

use tracing::{info, warn};

use crate::acl::{AclReport, AclSynchronizer};
use crate::error::CourierError;
use crate::model::RawAclRule;
use crate::services::CalendarService;
use crate::store::ReadWriter;

/// Key under which the resolved calendar id is cached in the state store.
pub const CALENDAR_ID_KEY: &str = "calendar_id";

const SUBSCRIBE_BASE: &str = "https://calendar.google.com/calendar/u/0/r?cid=";

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarSettings {
    pub name: String,
    pub timezone: String,
    pub admin_email: Option<String>,
    pub extra_acl: Vec<RawAclRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarOrigin {
    Cached,
    Found,
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedCalendar {
    pub calendar_id: String,
    pub origin: CalendarOrigin,
    pub acl: AclReport,
}

/// Link that adds the calendar to a reader's own calendar list.
pub fn subscribe_link(calendar_id: &str) -> String {
    format!("{SUBSCRIBE_BASE}{}", urlencoding::encode(calendar_id))
}

/// Everyone may read; the admin, when configured, may write. Extra rules
/// from configuration come last so they can override either.
pub fn baseline_acl(settings: &CalendarSettings) -> Vec<RawAclRule> {
    let mut rules = vec![RawAclRule::new("default", None, "reader")];
    if let Some(email) = settings.admin_email.as_deref().filter(|email| !email.is_empty()) {
        rules.push(RawAclRule::new("user", Some(email), "writer"));
    }
    rules.extend(settings.extra_acl.iter().cloned());
    rules
}

/// Returns the calendar id to publish to, creating the calendar if needed,
/// and converges its ACL to the configured baseline.
///
/// A cached id is trusted as is. Otherwise calendars are matched by name:
/// more than one match is an [`CourierError::AmbiguousTarget`] that needs an
/// operator, none means the calendar is created. A freshly resolved id is
/// cached.
pub async fn provision_calendar(
    service: Arc<dyn CalendarService>,
    state: &mut (dyn ReadWriter<String> + Send),
    settings: &CalendarSettings,
) -> Result<ProvisionedCalendar, CourierError> {
    let cached = state.get(CALENDAR_ID_KEY).cloned();
    let (calendar_id, origin) = match cached {
        Some(calendar_id) => {
            info!(calendar_id = %calendar_id, "Using cached calendar");
            (calendar_id, CalendarOrigin::Cached)
        }
        None => resolve_calendar(service.as_ref(), state, settings).await?,
    };

    let acl = AclSynchronizer::new(service)
        .sync(&calendar_id, &baseline_acl(settings))
        .await?;

    Ok(ProvisionedCalendar {
        calendar_id,
        origin,
        acl,
    })
}

async fn resolve_calendar(
    service: &dyn CalendarService,
    state: &mut (dyn ReadWriter<String> + Send),
    settings: &CalendarSettings,
) -> Result<(String, CalendarOrigin), CourierError> {
    let calendars = service.list_calendars().await?;
    let matches: Vec<_> = calendars
        .into_iter()
        .filter(|calendar| calendar.summary == settings.name)
        .collect();

    let resolved = match matches.as_slice() {
        [] => {
            info!(name = %settings.name, "Creating calendar");
            let id = service
                .create_calendar(&settings.name, &settings.timezone)
                .await?;
            (id, CalendarOrigin::Created)
        }
        [only] => {
            info!(name = %settings.name, calendar_id = %only.id, "Found existing calendar");
            (only.id.clone(), CalendarOrigin::Found)
        }
        many => {
            warn!(name = %settings.name, count = many.len(), "Several calendars share the configured name");
            return Err(CourierError::AmbiguousTarget {
                kind: "calendar",
                name: settings.name.clone(),
                count: many.len(),
            });
        }
    };

    state.set(CALENDAR_ID_KEY, resolved.0.clone())?;
    Ok(resolved)
}
