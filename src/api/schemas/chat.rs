use crate::domain::message::Message;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ChatParams {
    pub token: Option<String>,
}

/// Frames sent by the client: `{"event": "chatMessage", "data": {...}}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    ChatMessage(SubmittedMessage),
}

#[derive(Debug, Deserialize)]
pub struct SubmittedMessage {
    #[serde(default)]
    pub username: String,
    pub text: String,
}

/// Frames sent by the server.
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent<'a> {
    LoadMessages(&'a [Message]),
    ChatMessage(&'a Message),
}
