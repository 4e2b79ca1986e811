//! Discord [`ChatService`] over the REST API, posting into a single channel.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::render::ChatMessage;
use crate::services::{ChatService, MessageHandle, ServiceError};

pub struct DiscordChannel {
    client: Client,
    api_base: String,
    token: String,
    channel_id: String,
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    id: String,
    channel_id: String,
}

impl DiscordChannel {
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            channel_id: channel_id.into(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/channels/{}/messages", self.api_base, self.channel_id)
    }

    fn message_url(&self, message_id: &str) -> String {
        format!("{}/{}", self.messages_url(), urlencoding::encode(message_id))
    }

    async fn send_request(
        &self,
        request: RequestBuilder,
        message_id: &str,
    ) -> Result<MessageResource, ServiceError> {
        let response = request
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::not_found("message", message_id));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Auth(body),
                _ => ServiceError::Status {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        response
            .json()
            .await
            .map_err(|err| ServiceError::Decode(format!("message: {err}")))
    }
}

/// Message payload: markdown content plus one image embed per inline image.
pub fn message_body(message: &ChatMessage) -> Value {
    let embeds: Vec<Value> = message
        .images
        .iter()
        .map(|url| json!({ "color": message.accent_color, "image": { "url": url } }))
        .collect();
    json!({
        "content": message.content,
        "embeds": embeds,
        "allowed_mentions": { "parse": [] },
    })
}

#[async_trait]
impl ChatService for DiscordChannel {
    async fn send(&self, message: &ChatMessage) -> Result<String, ServiceError> {
        let request = self.client.post(self.messages_url()).json(&message_body(message));
        let sent = self.send_request(request, "new").await?;
        info!(message_id = %sent.id, channel_id = %sent.channel_id, "Sent chat message");
        Ok(sent.id)
    }

    async fn edit(&self, message_id: &str, message: &ChatMessage) -> Result<(), ServiceError> {
        let request = self
            .client
            .patch(self.message_url(message_id))
            .json(&message_body(message));
        self.send_request(request, message_id).await?;
        info!(message_id, "Edited chat message");
        Ok(())
    }

    async fn fetch(&self, message_id: &str) -> Result<MessageHandle, ServiceError> {
        let request = self.client.get(self.message_url(message_id));
        let found = self.send_request(request, message_id).await?;
        Ok(MessageHandle {
            id: found.id,
            channel_id: found.channel_id,
        })
    }
}
