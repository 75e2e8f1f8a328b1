//! The slice of the Bot API `Update` object the bot consumes.

use clank_proto::InboundEvent;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub document: Option<Document>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Callback message; may be inaccessible, in which case only ids are present.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallbackMessage {
    pub message_id: i64,
    pub chat: Chat,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<CallbackMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

impl Update {
    /// The chat this update belongs to and the event it carries.
    ///
    /// Returns `None` for update kinds the bot ignores (edits, channel posts,
    /// stickers, ...).
    pub fn into_event(self) -> Option<(i64, InboundEvent)> {
        if let Some(query) = self.callback_query {
            // Private chats share the user's id when the message is gone.
            let chat_id = query.message.as_ref().map_or(query.from.id, |m| m.chat.id);
            return Some((
                chat_id,
                InboundEvent::Button {
                    callback_id: query.id,
                    message_id: query.message.map(|m| m.message_id),
                    data: query.data.unwrap_or_default(),
                },
            ));
        }

        let message = self.message?;
        let chat_id = message.chat.id;
        let message_id = message.message_id;

        if let Some(photo) = message.photo.as_deref().and_then(largest_photo) {
            return Some((
                chat_id,
                InboundEvent::Photo {
                    message_id,
                    file_id: photo.file_id.clone(),
                },
            ));
        }
        if let Some(document) = message.document {
            return Some((
                chat_id,
                InboundEvent::Document {
                    message_id,
                    file_id: document.file_id,
                    mime_type: document.mime_type,
                },
            ));
        }
        message
            .text
            .map(|text| (chat_id, InboundEvent::Text { message_id, text }))
    }
}

fn largest_photo(sizes: &[PhotoSize]) -> Option<&PhotoSize> {
    sizes
        .iter()
        .max_by_key(|p| (u64::from(p.width) * u64::from(p.height), p.file_size.unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Update {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn text_message() {
        let update = parse(json!({
            "update_id": 10,
            "message": {"message_id": 5, "chat": {"id": 77, "type": "private"}, "text": "/start"}
        }));
        assert_eq!(
            update.into_event(),
            Some((
                77,
                InboundEvent::Text {
                    message_id: 5,
                    text: "/start".to_string()
                }
            ))
        );
    }

    #[test]
    fn photo_picks_the_largest_size() {
        let update = parse(json!({
            "update_id": 11,
            "message": {
                "message_id": 6,
                "chat": {"id": 77},
                "caption": "logo",
                "photo": [
                    {"file_id": "small", "width": 90, "height": 90},
                    {"file_id": "large", "width": 1280, "height": 1280},
                    {"file_id": "medium", "width": 320, "height": 320}
                ]
            }
        }));
        assert_eq!(
            update.into_event(),
            Some((
                77,
                InboundEvent::Photo {
                    message_id: 6,
                    file_id: "large".to_string()
                }
            ))
        );
    }

    #[test]
    fn document_keeps_mime_type() {
        let update = parse(json!({
            "update_id": 12,
            "message": {
                "message_id": 7,
                "chat": {"id": 77},
                "document": {"file_id": "doc", "mime_type": "image/png"}
            }
        }));
        assert_eq!(
            update.into_event(),
            Some((
                77,
                InboundEvent::Document {
                    message_id: 7,
                    file_id: "doc".to_string(),
                    mime_type: Some("image/png".to_string())
                }
            ))
        );
    }

    #[test]
    fn callback_uses_the_message_chat() {
        let update = parse(json!({
            "update_id": 13,
            "callback_query": {
                "id": "cb1",
                "from": {"id": 1, "is_bot": false, "first_name": "A"},
                "message": {"message_id": 8, "chat": {"id": -100}, "date": 0},
                "data": "confirm:yes"
            }
        }));
        assert_eq!(
            update.into_event(),
            Some((
                -100,
                InboundEvent::Button {
                    callback_id: "cb1".to_string(),
                    message_id: Some(8),
                    data: "confirm:yes".to_string()
                }
            ))
        );
    }

    #[test]
    fn callback_without_message_falls_back_to_sender() {
        let update = parse(json!({
            "update_id": 14,
            "callback_query": {"id": "cb2", "from": {"id": 55}, "data": "menu:fees"}
        }));
        let (chat_id, event) = update.into_event().unwrap();
        assert_eq!(chat_id, 55);
        assert!(matches!(event, InboundEvent::Button { message_id: None, .. }));
    }

    #[test]
    fn ignored_updates_yield_nothing() {
        let edited = parse(json!({
            "update_id": 15,
            "edited_message": {"message_id": 1, "chat": {"id": 1}, "text": "x"}
        }));
        assert_eq!(edited.into_event(), None);

        let sticker = parse(json!({
            "update_id": 16,
            "message": {"message_id": 2, "chat": {"id": 1}, "sticker": {"file_id": "s"}}
        }));
        assert_eq!(sticker.into_event(), None);
    }
}
