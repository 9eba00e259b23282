use serde::{Deserialize, Serialize};

use super::session::{CodeExecutionResult, Hint, Message, MessageType, Session};

/// Client-to-server frames, discriminated by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinSession {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        content: String,
        message_type: MessageType,
    },
    #[serde(rename_all = "camelCase")]
    SubmitCode {
        code: String,
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_tests: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    RequestHint {
        question_id: String,
        current_level: u32,
    },
    Heartbeat { timestamp: String },
}

/// Server-to-client frames. `ConnectionStateChanged` never arrives on the
/// wire; the transport synthesizes it so observers see connection
/// transitions through the same bus as everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    SessionJoined {
        session: Session,
        success: bool,
    },
    MessageReceived {
        message: Message,
    },
    CodeExecuted {
        result: CodeExecutionResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feedback: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    HintProvided {
        hint: Hint,
        remaining_hints: u32,
    },
    SessionUpdated {
        session: Session,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
    Heartbeat {
        timestamp: String,
    },
    ConnectionStateChanged {
        state: ConnectionState,
    },
}

impl ServerEvent {
    /// The `type` discriminator this event carries on the wire; also the
    /// key it is dispatched under on the event bus.
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::SessionJoined { .. } => "session_joined",
            ServerEvent::MessageReceived { .. } => "message_received",
            ServerEvent::CodeExecuted { .. } => "code_executed",
            ServerEvent::HintProvided { .. } => "hint_provided",
            ServerEvent::SessionUpdated { .. } => "session_updated",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Heartbeat { .. } => "heartbeat",
            ServerEvent::ConnectionStateChanged { .. } => "connection_state_changed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

/// Connection lifecycle snapshot. The transport is the only writer;
/// everyone else observes copies broadcast via `connection_state_changed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected: Option<String>,
    pub reconnect_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_connected: None,
            reconnect_attempts: 0,
            error: None,
        }
    }
}
