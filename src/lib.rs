// PrepWire Library
// Realtime client core for interview practice sessions

pub mod cli;
pub mod client;
pub mod core;
pub mod utils;

// Re-export commonly used types
pub use client::{
    EvaluationClient, EvaluationFlow, EventBus, PauseDispatcher, SessionController,
    SessionTransport,
};
pub use core::{ClientEvent, Config, ConnectionState, Message, ServerEvent, Session};

// Error handling
pub use anyhow::{Error, Result};
