//! Telegram Bot API client (sendPhoto only)

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::Notifier;
use crate::error::ServiceError;

const SERVICE: &str = "telegram";

#[derive(Debug, Serialize)]
struct SendPhotoRequest<'a> {
    chat_id: i64,
    message_thread_id: i64,
    photo: &'a str,
    caption: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    error_code: Option<u16>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// Sends cards to one chat topic
pub struct TelegramClient {
    client: Client,
    base_url: String,
    token: String,
    chat_id: i64,
    topic_id: i64,
}

impl TelegramClient {
    pub fn new(client: Client, base_url: &str, token: &str, chat_id: i64, topic_id: i64) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id,
            topic_id,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn check(response: Response) -> Result<(), ServiceError> {
        let status = response.status();
        let text = response.text().await.map_err(ServiceError::transport(SERVICE))?;
        interpret(status.as_u16(), &text)
    }
}

fn interpret(status: u16, text: &str) -> Result<(), ServiceError> {
    match serde_json::from_str::<ApiResponse>(text) {
        Ok(body) if body.ok => Ok(()),
        Ok(body) => Err(ServiceError::Http {
            service: SERVICE,
            status: body.error_code.unwrap_or(status),
            reason: None,
            retry_after: body
                .parameters
                .and_then(|p| p.retry_after)
                .map(Duration::from_secs),
            message: body.description.unwrap_or_default(),
        }),
        Err(_) if (200..300).contains(&status) => Ok(()),
        Err(_) => Err(ServiceError::Http {
            service: SERVICE,
            status,
            reason: None,
            retry_after: None,
            message: text.to_string(),
        }),
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send_photo_url(&self, caption: &str, url: &str) -> Result<(), ServiceError> {
        let request = SendPhotoRequest {
            chat_id: self.chat_id,
            message_thread_id: self.topic_id,
            photo: url,
            caption,
            parse_mode: "HTML",
        };
        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .json(&request)
            .send()
            .await
            .map_err(ServiceError::transport(SERVICE))?;
        Self::check(response).await
    }

    async fn send_photo_file(&self, caption: &str, path: &Path) -> Result<(), ServiceError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ServiceError::Io {
            service: SERVICE,
            source,
        })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("trade.jpg")
            .to_string();

        let form = Form::new()
            .text("chat_id", self.chat_id.to_string())
            .text("message_thread_id", self.topic_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "HTML")
            .part("photo", Part::bytes(bytes).file_name(file_name));

        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(ServiceError::transport(SERVICE))?;
        Self::check(response).await
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ServiceError::transport("image"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::http("image", status.as_u16()));
        }
        let bytes = response.bytes().await.map_err(ServiceError::transport("image"))?;
        Ok(bytes.to_vec())
    }
}
