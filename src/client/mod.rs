pub mod bus;
pub mod controller;
pub mod dispatcher;
pub mod flow;
pub mod http;
pub mod transport;

pub use bus::{EventBus, Subscription, WILDCARD};
pub use controller::{LiveBackend, MockBackend, SessionBackend, SessionController};
pub use dispatcher::PauseDispatcher;
pub use flow::{ChatRole, ChatTurn, EvaluationFlow};
pub use http::{
    DesignAspect, EvaluatePayload, EvaluationClient, InterviewEvaluation, VoiceEmotion,
};
pub use transport::SessionTransport;
