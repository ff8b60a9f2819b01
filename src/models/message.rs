use mongodb::bson::DateTime;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::{id_hex, rfc3339};
use crate::error::{AppError, Result};

pub const MAX_CONTENT_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub timestamp: DateTime,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub message_type: MessageType,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Message {
    /// A fresh unread message stamped with the current time.
    pub fn compose(
        sender_id: &str,
        receiver_id: &str,
        content: &str,
        message_type: MessageType,
    ) -> Result<Self> {
        if receiver_id.trim().is_empty() {
            return Err(AppError::bad_request("Receiver is required"));
        }
        if content.trim().is_empty() {
            return Err(AppError::bad_request("Message content is required"));
        }
        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(AppError::bad_request(format!(
                "Message cannot be more than {} characters",
                MAX_CONTENT_LEN
            )));
        }

        let now = DateTime::now();
        Ok(Message {
            id: None,
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.trim().to_string(),
            content: content.to_string(),
            timestamp: now,
            read: false,
            message_type,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub receiver_id: String,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(rename = "_id")]
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub timestamp: String,
    pub read: bool,
    pub message_type: MessageType,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        MessageView {
            id: id_hex(&message.id),
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content,
            timestamp: rfc3339(&message.timestamp),
            read: message.read,
            message_type: message.message_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_unread_message() {
        let message = Message::compose("a", "b", "hello", MessageType::Text).unwrap();
        assert!(!message.read);
        assert_eq!(message.sender_id, "a");
        assert_eq!(message.receiver_id, "b");
        assert!(message.id.is_none());
    }

    #[test]
    fn rejects_blank_and_oversized_content() {
        assert!(Message::compose("a", "b", "   ", MessageType::Text).is_err());
        let long = "x".repeat(MAX_CONTENT_LEN + 1);
        assert!(Message::compose("a", "b", &long, MessageType::Text).is_err());
        assert!(Message::compose("a", " ", "hi", MessageType::Text).is_err());
    }

    #[test]
    fn view_uses_wire_field_names() {
        let message = Message::compose("a", "b", "hi", MessageType::Image).unwrap();
        let value = serde_json::to_value(MessageView::from(message)).unwrap();
        assert_eq!(value["senderId"], "a");
        assert_eq!(value["messageType"], "image");
        assert_eq!(value["read"], false);
    }
}
