//! Outbound messages on top of the transport.
//!
//! Text goes out as Telegram HTML first. When the API rejects the markup, the
//! same text is sent once more with tags stripped and no parse mode. All text
//! is capped at the provider limit with an explicit truncation marker.

use std::sync::Arc;

use async_trait::async_trait;
use clank_core::text::{strip_html, truncate_with_marker};
use clank_proto::{FileResolver, Keyboard};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::TelegramResult;
use crate::transport::{ApiResult, TransportClient};

/// Telegram's cap on message text, in characters.
pub const MESSAGE_MAX_CHARS: usize = 4096;

/// Descriptions that mean the markup was rejected. The API reports these as
/// a plain 400 with no finer-grained code.
const FORMAT_ERRORS: &[&str] = &["can't parse entities", "can't find end of the entity"];

/// Description of an edit that would not change anything.
const NOT_MODIFIED: &str = "message is not modified";

/// Trait abstracting Telegram bot operations for testability.
///
/// Production code uses [`MessageDelivery`]; tests can provide a mock
/// implementation.
#[async_trait]
pub trait BotApi: Send + Sync {
    /// Send a text message. Returns the new message id.
    async fn send_message(&self, chat_id: i64, text: &str) -> TelegramResult<i64>;

    /// Send a text message with an inline keyboard. Returns the new message id.
    async fn send_buttons(&self, chat_id: i64, text: &str, keyboard: &Keyboard)
    -> TelegramResult<i64>;

    /// Replace a message's text. An edit that changes nothing succeeds.
    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> TelegramResult<()>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> TelegramResult<()>;

    /// Acknowledge an inline button press, optionally with a toast.
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> TelegramResult<()>;
}

/// [`BotApi`] over a [`TransportClient`].
#[derive(Debug, Clone)]
pub struct MessageDelivery {
    transport: Arc<TransportClient>,
    file_origin: String,
    max_chars: usize,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct File {
    #[serde(default)]
    file_path: Option<String>,
}

impl MessageDelivery {
    pub fn new(transport: Arc<TransportClient>, file_origin: impl Into<String>) -> Self {
        Self {
            transport,
            file_origin: file_origin.into().trim_end_matches('/').to_string(),
            max_chars: MESSAGE_MAX_CHARS,
        }
    }

    #[must_use]
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn transport(&self) -> &Arc<TransportClient> {
        &self.transport
    }

    /// Resolves a file handle to a download URL. Any failure yields `None`.
    pub async fn get_file(&self, file_id: &str) -> Option<String> {
        let result = match self
            .transport
            .call("getFile", &json!({ "file_id": file_id }), None)
            .await
        {
            Ok(result) if result.ok => result,
            Ok(result) => {
                warn!(file_id, error = %result.summary(), "getFile rejected");
                return None;
            }
            Err(e) => {
                warn!(file_id, error = %e, "getFile failed");
                return None;
            }
        };

        let path = result.decode::<File>("getFile").ok()?.file_path?;
        Some(format!(
            "{}/file/bot{}/{}",
            self.file_origin,
            self.transport.token(),
            path.trim_start_matches('/')
        ))
    }

    /// Sends `payload` with `text` as HTML, falling back once to plain text
    /// when the markup is rejected.
    async fn send_formatted(&self, method: &str, payload: Value, text: &str) -> TelegramResult<ApiResult> {
        let rich = with_text(payload.clone(), &truncate_with_marker(text, self.max_chars), true);
        let result = self.transport.call(method, &rich, None).await?;
        if result.ok || !is_format_error(&result) {
            return Ok(result);
        }

        debug!(method, error = %result.description(), "HTML rejected, sending plain text");
        let plain = with_text(
            payload,
            &truncate_with_marker(&strip_html(text), self.max_chars),
            false,
        );
        self.transport.call(method, &plain, None).await
    }
}

#[async_trait]
impl BotApi for MessageDelivery {
    async fn send_message(&self, chat_id: i64, text: &str) -> TelegramResult<i64> {
        let result = self
            .send_formatted("sendMessage", json!({ "chat_id": chat_id }), text)
            .await?;
        message_id("sendMessage", result)
    }

    async fn send_buttons(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> TelegramResult<i64> {
        let payload = json!({
            "chat_id": chat_id,
            "reply_markup": inline_keyboard(keyboard),
        });
        let result = self.send_formatted("sendMessage", payload, text).await?;
        message_id("sendMessage", result)
    }

    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> TelegramResult<()> {
        let payload = json!({ "chat_id": chat_id, "message_id": message_id });
        let result = self
            .send_formatted("editMessageText", payload, text)
            .await?;
        if result.ok || is_not_modified(&result) {
            return Ok(());
        }
        Err(result.into_error("editMessageText"))
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> TelegramResult<()> {
        let payload = json!({ "chat_id": chat_id, "message_id": message_id });
        expect_ok("deleteMessage", self.transport.call("deleteMessage", &payload, None).await?)
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> TelegramResult<()> {
        let mut payload = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            payload["text"] = Value::String(truncate_with_marker(text, 200));
        }
        expect_ok(
            "answerCallbackQuery",
            self.transport
                .call("answerCallbackQuery", &payload, None)
                .await?,
        )
    }
}

#[async_trait]
impl FileResolver for MessageDelivery {
    async fn file_url(&self, file_id: &str) -> Option<String> {
        self.get_file(file_id).await
    }
}

fn with_text(mut payload: Value, text: &str, html: bool) -> Value {
    payload["text"] = Value::String(text.to_string());
    if html {
        payload["parse_mode"] = Value::String("HTML".to_string());
    }
    payload
}

fn inline_keyboard(keyboard: &Keyboard) -> Value {
    let rows: Vec<Value> = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| json!({ "text": button.label, "callback_data": button.data }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

fn is_format_error(result: &ApiResult) -> bool {
    let description = result.description().to_ascii_lowercase();
    result.error_code == Some(400) && FORMAT_ERRORS.iter().any(|m| description.contains(m))
}

fn is_not_modified(result: &ApiResult) -> bool {
    result.error_code == Some(400)
        && result
            .description()
            .to_ascii_lowercase()
            .contains(NOT_MODIFIED)
}

fn expect_ok(method: &str, result: ApiResult) -> TelegramResult<()> {
    if result.ok {
        Ok(())
    } else {
        Err(result.into_error(method))
    }
}

fn message_id(method: &str, result: ApiResult) -> TelegramResult<i64> {
    if !result.ok {
        return Err(result.into_error(method));
    }
    let sent: SentMessage = result.decode(method)?;
    Ok(sent.message_id)
}
