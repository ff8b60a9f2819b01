//! JSON frames exchanged over the WebSocket: `{"event": "<name>", "data": <payload>}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{MessageType, MessageView};

pub type UserId = String;

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    #[default]
    Video,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub receiver_id: UserId,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    pub receiver_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    /// Author of the messages being acknowledged.
    pub sender_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub receiver_id: UserId,
    #[serde(default)]
    pub caller_name: String,
    #[serde(rename = "type", default)]
    pub call_type: CallType,
    #[serde(default)]
    pub signal: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAnswer {
    pub caller_id: UserId,
    #[serde(default)]
    pub signal: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReject {
    pub caller_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallSignal {
    pub to: UserId,
    #[serde(default)]
    pub signal: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallEnd {
    pub to: UserId,
}

/// Client to server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Join,
    SendMessage(SendMessage),
    TypingStart(Typing),
    TypingStop(Typing),
    MarkRead(ReadReceipt),
    CallRequest(CallRequest),
    CallAccepted(CallAnswer),
    CallRejected(CallReject),
    CallSignaling(CallSignal),
    CallEnd(CallEnd),
    Ping,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EventError {
    #[error("Malformed frame")]
    Malformed,

    #[error("Unknown event: {0}")]
    Unknown(String),

    #[error("Invalid payload for {0}")]
    InvalidPayload(String),
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, EventError> {
    serde_json::from_value(data).map_err(|_| EventError::InvalidPayload(event.to_string()))
}

impl ClientEvent {
    pub fn parse(text: &str) -> Result<Self, EventError> {
        let Envelope { event, data } =
            serde_json::from_str(text).map_err(|_| EventError::Malformed)?;

        let parsed = match event.as_str() {
            // The uid comes from the session's token; any payload is ignored.
            "user:join" => ClientEvent::Join,
            "message:send" => ClientEvent::SendMessage(payload(&event, data)?),
            "typing:start" => ClientEvent::TypingStart(payload(&event, data)?),
            "typing:stop" => ClientEvent::TypingStop(payload(&event, data)?),
            "messages:read" => ClientEvent::MarkRead(payload(&event, data)?),
            "call:request" => ClientEvent::CallRequest(payload(&event, data)?),
            "call:accepted" => ClientEvent::CallAccepted(payload(&event, data)?),
            "call:rejected" => ClientEvent::CallRejected(payload(&event, data)?),
            "call:signaling" => ClientEvent::CallSignaling(payload(&event, data)?),
            "call:end" => ClientEvent::CallEnd(payload(&event, data)?),
            "ping" => ClientEvent::Ping,
            _ => return Err(EventError::Unknown(event)),
        };
        Ok(parsed)
    }
}

/// Server to client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    #[serde(rename = "user:online")]
    UserOnline(UserId),
    #[serde(rename = "user:offline")]
    UserOffline(UserId),
    #[serde(rename = "message:receive")]
    MessageReceive(MessageView),
    #[serde(rename = "message:sent")]
    MessageSent(MessageView),
    #[serde(rename = "message:error")]
    MessageError { message: String },
    #[serde(rename = "typing:started")]
    TypingStarted { user_id: UserId },
    #[serde(rename = "typing:stopped")]
    TypingStopped { user_id: UserId },
    #[serde(rename = "messages:read")]
    MessagesRead { user_id: UserId },
    #[serde(rename = "call:incoming")]
    CallIncoming {
        caller_id: UserId,
        caller_name: String,
        #[serde(rename = "type")]
        call_type: CallType,
        signal: Value,
    },
    #[serde(rename = "call:accepted")]
    CallAccepted { receiver_id: UserId, signal: Value },
    #[serde(rename = "call:rejected")]
    CallRejected { receiver_id: UserId },
    #[serde(rename = "call:signaling")]
    CallSignaling { from: UserId, signal: Value },
    #[serde(rename = "call:ended")]
    CallEnded { user_id: UserId },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::UserOnline(_) => "user:online",
            ServerEvent::UserOffline(_) => "user:offline",
            ServerEvent::MessageReceive(_) => "message:receive",
            ServerEvent::MessageSent(_) => "message:sent",
            ServerEvent::MessageError { .. } => "message:error",
            ServerEvent::TypingStarted { .. } => "typing:started",
            ServerEvent::TypingStopped { .. } => "typing:stopped",
            ServerEvent::MessagesRead { .. } => "messages:read",
            ServerEvent::CallIncoming { .. } => "call:incoming",
            ServerEvent::CallAccepted { .. } => "call:accepted",
            ServerEvent::CallRejected { .. } => "call:rejected",
            ServerEvent::CallSignaling { .. } => "call:signaling",
            ServerEvent::CallEnded { .. } => "call:ended",
            ServerEvent::Pong => "pong",
            ServerEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_message_send() {
        let event = ClientEvent::parse(
            r#"{"event":"message:send","data":{"receiverId":"u2","content":"hi"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage(SendMessage {
                receiver_id: "u2".to_string(),
                content: "hi".to_string(),
                message_type: MessageType::Text,
            })
        );
    }

    #[test]
    fn join_ignores_payload() {
        assert_eq!(
            ClientEvent::parse(r#"{"event":"user:join","data":"someone-else"}"#).unwrap(),
            ClientEvent::Join
        );
        assert_eq!(ClientEvent::parse(r#"{"event":"ping"}"#).unwrap(), ClientEvent::Ping);
    }

    #[test]
    fn call_request_keeps_signal_opaque() {
        let event = ClientEvent::parse(
            r#"{"event":"call:request","data":{"receiverId":"u2","callerName":"Ada","type":"audio","signal":{"sdp":"v=0","type":"offer"}}}"#,
        )
        .unwrap();
        let ClientEvent::CallRequest(req) = event else {
            panic!("expected call request");
        };
        assert_eq!(req.call_type, CallType::Audio);
        assert_eq!(req.signal, json!({"sdp": "v=0", "type": "offer"}));
    }

    #[test]
    fn reports_bad_frames() {
        assert_eq!(ClientEvent::parse("not json"), Err(EventError::Malformed));
        assert_eq!(
            ClientEvent::parse(r#"{"event":"room:join"}"#),
            Err(EventError::Unknown("room:join".to_string()))
        );
        assert_eq!(
            ClientEvent::parse(r#"{"event":"call:end","data":{}}"#),
            Err(EventError::InvalidPayload("call:end".to_string()))
        );
    }

    #[test]
    fn server_events_serialize_with_names() {
        let value = serde_json::to_value(ServerEvent::CallIncoming {
            caller_id: "u1".to_string(),
            caller_name: "Ada".to_string(),
            call_type: CallType::Video,
            signal: json!({"type": "offer"}),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({
                "event": "call:incoming",
                "data": {"callerId": "u1", "callerName": "Ada", "type": "video", "signal": {"type": "offer"}}
            })
        );

        assert_eq!(
            serde_json::to_value(ServerEvent::UserOnline("u1".to_string())).unwrap(),
            json!({"event": "user:online", "data": "u1"})
        );
        assert_eq!(serde_json::to_value(ServerEvent::Pong).unwrap(), json!({"event": "pong"}));
        assert_eq!(ServerEvent::Pong.name(), "pong");
    }
}
