//! Value types shared by the extractor, the reconciler and the ACL synchronizer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// Absolute event time resolved from post text.
pub type EventTime = DateTime<FixedOffset>;

/// One item of the monitored feed, normalized at the feed boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    pub title: String,
    pub content: Vec<String>,
    pub tags: Vec<String>,
    pub author: Option<Author>,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Author {
    pub name: Option<String>,
    pub link: Option<String>,
}

impl Entry {
    /// Builds an entry, falling back to `link` when the feed gave no usable id.
    pub fn new(id: Option<String>, link: impl Into<String>, title: impl Into<String>) -> Self {
        let link = link.into();
        let id = id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| link.clone());
        Self {
            id,
            title: title.into(),
            content: Vec::new(),
            tags: Vec::new(),
            author: None,
            link,
        }
    }

    pub fn with_content<I, S>(mut self, blocks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content = blocks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag = tag.into();
            if !tag.is_empty() && !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self
    }

    pub fn with_author(mut self, author: Author) -> Self {
        if author.name.is_some() || author.link.is_some() {
            self.author = Some(author);
        }
        self
    }

    /// The first tag, which feeds use for the source category.
    pub fn category(&self) -> Option<&str> {
        self.tags.first().map(String::as_str)
    }
}

/// An entry whose text has been rewritten by the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    pub entry: Entry,
    pub parsed_time: Option<EventTime>,
}

/// Ledger row describing the artifacts already produced for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenRecord {
    #[serde(rename = "title")]
    pub title_snapshot: String,
    #[serde(rename = "contents", default)]
    pub content_snapshot: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_event_id: Option<String>,
    #[serde(
        rename = "discord_message_id",
        alias = "chat_message_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub chat_message_id: Option<String>,
}

impl SeenRecord {
    /// True when the raw feed text is identical to the stored snapshot.
    pub fn matches(&self, entry: &Entry) -> bool {
        self.title_snapshot == entry.title && self.content_snapshot == entry.content
    }
}

/// Calendar access roles a desired rule may grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Writer,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Writer => "writer",
            Role::Owner => "owner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "reader" => Ok(Role::Reader),
            "writer" => Ok(Role::Writer),
            "owner" => Ok(Role::Owner),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }
}

/// Identifies who an ACL rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey {
    pub scope_type: String,
    pub scope_value: Option<String>,
}

impl ScopeKey {
    pub fn new(scope_type: impl Into<String>, scope_value: Option<String>) -> Self {
        Self {
            scope_type: scope_type.into(),
            scope_value,
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope_value {
            Some(value) => write!(f, "{}:{}", self.scope_type, value),
            None => f.write_str(&self.scope_type),
        }
    }
}

/// A validated desired ACL rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclRule {
    pub scope_type: String,
    pub scope_value: Option<String>,
    pub role: Role,
}

impl AclRule {
    pub fn new(scope_type: impl Into<String>, scope_value: Option<&str>, role: Role) -> Self {
        Self {
            scope_type: scope_type.into(),
            scope_value: scope_value.map(str::to_string),
            role,
        }
    }

    pub fn scope_key(&self) -> ScopeKey {
        ScopeKey::new(self.scope_type.clone(), self.scope_value.clone())
    }
}

/// A rule as it currently exists on the calendar. Live roles are kept as
/// strings because the service knows roles we never grant (`freeBusyReader`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveAclRule {
    pub id: String,
    pub scope_type: String,
    pub scope_value: Option<String>,
    pub role: String,
}

impl LiveAclRule {
    pub fn scope_key(&self) -> ScopeKey {
        ScopeKey::new(self.scope_type.clone(), self.scope_value.clone())
    }
}

/// Desired rule exactly as written in configuration, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAclRule {
    #[serde(default)]
    pub scope_type: Option<Value>,
    #[serde(default)]
    pub scope_value: Option<Value>,
    #[serde(default)]
    pub role: Option<Value>,
}

impl RawAclRule {
    pub fn new(scope_type: &str, scope_value: Option<&str>, role: &str) -> Self {
        Self {
            scope_type: Some(Value::String(scope_type.to_string())),
            scope_value: scope_value.map(|value| Value::String(value.to_string())),
            role: Some(Value::String(role.to_string())),
        }
    }
}

impl TryFrom<&RawAclRule> for AclRule {
    type Error = ValidationError;

    fn try_from(raw: &RawAclRule) -> Result<Self, Self::Error> {
        let scope_type = match &raw.scope_type {
            Some(Value::String(value)) if !value.is_empty() => value.clone(),
            _ => return Err(ValidationError::EmptyScopeType),
        };

        let role = match &raw.role {
            Some(Value::String(value)) => value.parse::<Role>()?,
            Some(other) => return Err(ValidationError::UnknownRole(other.to_string())),
            None => return Err(ValidationError::UnknownRole("<missing>".to_string())),
        };

        let scope_value = match &raw.scope_value {
            None | Some(Value::Null) => None,
            Some(Value::String(value)) => Some(value.clone()),
            Some(other) => return Err(ValidationError::NonStringScopeValue(other.to_string())),
        };

        Ok(AclRule {
            scope_type,
            scope_value,
            role,
        })
    }
}
