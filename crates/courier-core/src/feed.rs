//! RSS/Atom [`FeedSource`] over HTTP.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::model::{Author, Entry};
use crate::services::{FeedSource, ServiceError};

const MARKDOWN_DIV: &str = r#"<div class="md">"#;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

pub struct HttpFeed {
    client: Client,
    url: String,
    retry: RetryPolicy,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>, user_agent: &str) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch(&self) -> Result<Vec<Entry>, ServiceError> {
        let response =
            fetch_with_retries(&self.retry, || self.client.get(&self.url).send()).await?;
        let status = response.status();
        info!(url = %self.url, status = %status, "Fetched feed");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        parse_feed(&bytes)
    }
}

async fn fetch_with_retries<F, Fut>(
    retry: &RetryPolicy,
    mut op: F,
) -> Result<reqwest::Response, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let max = retry.max_attempts.max(1);
    let mut attempt = 0usize;

    loop {
        let outcome = op().await;
        let retryable = match &outcome {
            Ok(response) => {
                let status = response.status();
                status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
            }
            Err(err) => err.is_timeout() || err.is_connect() || err.is_request(),
        };
        attempt += 1;

        if !retryable || attempt >= max {
            return outcome.map_err(ServiceError::from);
        }

        warn!(attempt, "Feed request failed; retrying");
        sleep(retry.backoff).await;
    }
}

/// Parses an RSS or Atom document into entries, newest first as published.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<Entry>, ServiceError> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|err| ServiceError::Decode(format!("feed: {err}")))?;

    let entries: Vec<Entry> = feed.entries.into_iter().filter_map(convert_entry).collect();
    debug!(count = entries.len(), "Parsed feed entries");
    Ok(entries)
}

fn convert_entry(raw: feed_rs::model::Entry) -> Option<Entry> {
    let link = raw
        .links
        .first()
        .map(|link| link.href.clone())
        .filter(|href| !href.is_empty())
        .or_else(|| Some(raw.id.clone()).filter(|id| !id.is_empty()));
    let Some(link) = link else {
        warn!("Dropping feed entry without id or link");
        return None;
    };

    let title = raw.title.map(|text| text.content).unwrap_or_default();
    let html = raw
        .content
        .and_then(|content| content.body)
        .or_else(|| raw.summary.map(|summary| summary.content));
    let content: Vec<String> = html.iter().map(|html| html_to_markdown(html)).collect();

    let tags = raw
        .categories
        .into_iter()
        .map(|category| category.label.unwrap_or(category.term));

    let author = raw
        .authors
        .into_iter()
        .next()
        .map(|person| Author {
            name: Some(person.name).filter(|name| !name.is_empty()),
            link: person.uri.filter(|uri| !uri.is_empty()),
        })
        .unwrap_or_default();

    Some(
        Entry::new(Some(raw.id), link, title)
            .with_content(content)
            .with_tags(tags)
            .with_author(author),
    )
}

/// Markdown rendition of a post body. Reddit wraps the self text in
/// `<div class="md">`; when present only that part is kept.
pub fn html_to_markdown(html: &str) -> String {
    let body = html
        .find(MARKDOWN_DIV)
        .map(|start| start + MARKDOWN_DIV.len())
        .and_then(|start| closing_div(html, start).map(|end| &html[start..end]))
        .unwrap_or(html);
    html2md::parse_html(body).trim().to_string()
}

/// Offset of the `</div>` closing a div whose content starts at `start`.
fn closing_div(html: &str, start: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut cursor = start;
    loop {
        let rest = &html[cursor..];
        let close = rest.find("</div>")?;
        let open = rest
            .match_indices("<div")
            .map(|(offset, _)| offset)
            .find(|offset| {
                rest[offset + 4..]
                    .chars()
                    .next()
                    .is_some_and(|next| next == '>' || next.is_ascii_whitespace())
            })
            .filter(|open| *open < close);

        match open {
            Some(open) => {
                depth += 1;
                cursor += open + 4;
            }
            None => {
                depth -= 1;
                if depth == 0 {
                    return Some(cursor + close);
                }
                cursor += close + "</div>".len();
            }
        }
    }
}
