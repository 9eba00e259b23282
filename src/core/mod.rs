pub mod config;
pub mod events;
pub mod session;

pub use config::{BackendConfig, Config, TransportConfig};
pub use events::{ClientEvent, ConnectionState, ConnectionStatus, ServerEvent};
pub use session::{
    AgentPhase, AgentState, CodeExecutionResult, Difficulty, Hint, HintType, Message,
    MessageMetadata, MessageSender, MessageType, Question, Session, SessionStatus, TestResult,
};
