/// Client-facing frame schema
///
/// Server frames are tagged with `type` in snake_case; notification frames carry the
/// envelope unchanged under `data`.
use crate::notifications::NotificationEnvelope;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pre-serialized frame, shared by every connection it fans out to
pub type Frame = Arc<str>;

/// Client-side handler a notification frame is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMethod {
    ReceiveMessage,
    AuthRequestResponseReceived,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping {
        #[serde(default)]
        id: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ReceiveMessage {
        data: NotificationEnvelope,
    },

    AuthRequestResponseReceived {
        data: NotificationEnvelope,
    },

    /// Keep-alive broadcast; `ts` is unix milliseconds
    Heartbeat {
        ts: i64,
    },

    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    Error {
        message: String,
        code: String,
    },
}

impl ServerMessage {
    pub fn notification(method: ClientMethod, envelope: NotificationEnvelope) -> Self {
        match method {
            ClientMethod::ReceiveMessage => ServerMessage::ReceiveMessage { data: envelope },
            ClientMethod::AuthRequestResponseReceived => {
                ServerMessage::AuthRequestResponseReceived { data: envelope }
            }
        }
    }

    pub fn heartbeat() -> Self {
        ServerMessage::Heartbeat {
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        Ok(Arc::from(self.to_json()?))
    }
}
