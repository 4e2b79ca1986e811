//! Google Calendar over its v3 REST API, authenticated as a service account.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};
use urlencoding::encode as encode_segment;

use crate::error::CourierError;
use crate::model::{AclRule, LiveAclRule};
use crate::services::{CalendarEvent, CalendarService, CalendarSummary, EventDraft, ServiceError};

const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;
/// Tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The parts of a service-account key file we use.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "ServiceAccountKey::default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    fn default_token_uri() -> String {
        "https://oauth2.googleapis.com/token".to_string()
    }

    pub fn from_file(path: &Path) -> Result<Self, CourierError> {
        let raw = fs::read_to_string(path).map_err(|err| {
            CourierError::config(format!(
                "cannot read service account key {}: {err}",
                path.display()
            ))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

enum Credentials {
    ServiceAccount {
        key: ServiceAccountKey,
        signing_key: EncodingKey,
        cached: Mutex<Option<CachedToken>>,
    },
    Static(String),
}

pub struct GoogleCalendar {
    client: Client,
    api_base: String,
    credentials: Credentials,
}

impl GoogleCalendar {
    pub fn with_service_account(
        key: ServiceAccountKey,
        api_base: impl Into<String>,
    ) -> Result<Self, CourierError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|err| CourierError::config(format!("invalid service account key: {err}")))?;
        Ok(Self {
            client: build_client()?,
            api_base: trim_base(api_base.into()),
            credentials: Credentials::ServiceAccount {
                key,
                signing_key,
                cached: Mutex::new(None),
            },
        })
    }

    /// Uses an already issued access token as is.
    pub fn with_access_token(
        token: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, CourierError> {
        Ok(Self {
            client: build_client()?,
            api_base: trim_base(api_base.into()),
            credentials: Credentials::Static(token.into()),
        })
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        let (key, signing_key, cached) = match &self.credentials {
            Credentials::Static(token) => return Ok(token.clone()),
            Credentials::ServiceAccount {
                key,
                signing_key,
                cached,
            } => (key, signing_key, cached),
        };

        let mut cached = cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &key.client_email,
            scope: CALENDAR_SCOPE,
            aud: &key.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, signing_key)
            .map_err(|err| ServiceError::Auth(format!("signing assertion: {err}")))?;

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Auth(format!("token endpoint returned {status}: {body}")));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| ServiceError::Decode(format!("token response: {err}")))?;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(TOKEN_LIFETIME_SECS as u64));
        debug!(expires_in = lifetime.as_secs(), "Obtained calendar access token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        });
        Ok(token.access_token)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &'static str,
        id: &str,
    ) -> Result<T, ServiceError> {
        let token = self.access_token().await?;
        let response = request.bearer_auth(token).send().await?;
        let response = check_status(response, resource, id).await?;
        response
            .json()
            .await
            .map_err(|err| ServiceError::Decode(format!("{resource}: {err}")))
    }

    fn calendar_url(&self, calendar_id: &str) -> String {
        format!("{}/calendars/{}", self.api_base, encode_segment(calendar_id))
    }
}

fn build_client() -> Result<Client, CourierError> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|err| CourierError::Service(err.into()))
}

fn trim_base(base: String) -> String {
    base.trim_end_matches('/').to_string()
}

async fn check_status(
    response: Response,
    resource: &'static str,
    id: &str,
) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        return Err(ServiceError::not_found(resource, id));
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ServiceError::Auth(body));
    }
    Err(ServiceError::Status {
        status: status.as_u16(),
        body,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventResource {
    id: String,
    #[serde(default)]
    html_link: Option<String>,
}

impl From<EventResource> for CalendarEvent {
    fn from(resource: EventResource) -> Self {
        CalendarEvent {
            id: resource.id,
            html_link: resource.html_link,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarListItem {
    id: String,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct CalendarResource {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AclResource {
    id: String,
    role: String,
    scope: AclScope,
}

#[derive(Debug, Deserialize)]
struct AclScope {
    #[serde(rename = "type")]
    scope_type: String,
    #[serde(default)]
    value: Option<String>,
}

fn event_body(event: &EventDraft) -> serde_json::Value {
    json!({
        "summary": event.summary,
        "description": event.description,
        "start": { "dateTime": event.start.to_rfc3339(), "timeZone": event.timezone },
        "end": { "dateTime": event.end.to_rfc3339(), "timeZone": event.timezone },
    })
}

fn acl_body(rule: &AclRule) -> serde_json::Value {
    let mut scope = json!({ "type": rule.scope_type });
    if let Some(value) = &rule.scope_value {
        scope["value"] = json!(value);
    }
    json!({ "role": rule.role.as_str(), "scope": scope })
}

impl GoogleCalendar {
    async fn list_pages<T: DeserializeOwned>(
        &self,
        url: &str,
        resource: &'static str,
        id: &str,
    ) -> Result<Vec<T>, ServiceError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.client.get(url);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: Page<T> = self.send_json(request, resource, id).await?;
            items.extend(page.items);
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(next) => page_token = Some(next),
                None => return Ok(items),
            }
        }
    }
}

#[async_trait]
impl CalendarService for GoogleCalendar {
    async fn create_event(
        &self,
        calendar_id: &str,
        event: &EventDraft,
    ) -> Result<CalendarEvent, ServiceError> {
        let url = format!("{}/events", self.calendar_url(calendar_id));
        let request = self.client.post(url).json(&event_body(event));
        let created: EventResource = self.send_json(request, "calendar", calendar_id).await?;
        info!(event_id = %created.id, "Created calendar event");
        Ok(created.into())
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        event: &EventDraft,
    ) -> Result<CalendarEvent, ServiceError> {
        let url = format!(
            "{}/events/{}",
            self.calendar_url(calendar_id),
            encode_segment(event_id)
        );
        let request = self.client.put(url).json(&event_body(event));
        let updated: EventResource = self.send_json(request, "event", event_id).await?;
        info!(event_id = %updated.id, "Updated calendar event");
        Ok(updated.into())
    }

    async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, ServiceError> {
        let url = format!("{}/users/me/calendarList", self.api_base);
        let items: Vec<CalendarListItem> = self.list_pages(&url, "calendar list", "me").await?;
        Ok(items
            .into_iter()
            .map(|item| CalendarSummary {
                id: item.id,
                summary: item.summary,
            })
            .collect())
    }

    async fn create_calendar(&self, name: &str, timezone: &str) -> Result<String, ServiceError> {
        let url = format!("{}/calendars", self.api_base);
        let request = self
            .client
            .post(url)
            .json(&json!({ "summary": name, "timeZone": timezone }));
        let created: CalendarResource = self.send_json(request, "calendar", name).await?;
        info!(calendar_id = %created.id, "Created calendar");
        Ok(created.id)
    }

    async fn list_acl(&self, calendar_id: &str) -> Result<Vec<LiveAclRule>, ServiceError> {
        let url = format!("{}/acl", self.calendar_url(calendar_id));
        let items: Vec<AclResource> = self.list_pages(&url, "calendar", calendar_id).await?;
        Ok(items
            .into_iter()
            .map(|item| LiveAclRule {
                id: item.id,
                scope_type: item.scope.scope_type,
                scope_value: item.scope.value,
                role: item.role,
            })
            .collect())
    }

    async fn insert_acl(&self, calendar_id: &str, rule: &AclRule) -> Result<(), ServiceError> {
        let url = format!("{}/acl", self.calendar_url(calendar_id));
        let request = self.client.post(url).json(&acl_body(rule));
        let _: serde_json::Value = self.send_json(request, "calendar", calendar_id).await?;
        Ok(())
    }

    async fn update_acl(
        &self,
        calendar_id: &str,
        rule_id: &str,
        rule: &AclRule,
    ) -> Result<(), ServiceError> {
        let url = format!(
            "{}/acl/{}",
            self.calendar_url(calendar_id),
            encode_segment(rule_id)
        );
        let request = self.client.put(url).json(&acl_body(rule));
        let _: serde_json::Value = self.send_json(request, "acl rule", rule_id).await?;
        Ok(())
    }
}
