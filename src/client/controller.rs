use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use tokio::task::JoinHandle;

use crate::client::bus::{EventBus, Subscription, WILDCARD};
use crate::client::transport::SessionTransport;
use crate::core::{
    AgentPhase, AgentState, ClientEvent, CodeExecutionResult, Config, ConnectionState, Hint,
    HintType, Message, MessageMetadata, MessageSender, MessageType, ServerEvent, Session,
    SessionStatus,
};

/// Where session events come from and where client intents go. The
/// controller is written against this seam so the live networked backend
/// and the scripted offline backend are interchangeable.
pub trait SessionBackend: Send + Sync {
    fn bus(&self) -> Arc<EventBus>;
    fn join(&self, session_id: &str);
    fn send(&self, event: ClientEvent);
    fn shutdown(&self);
}

/// Networked backend: a joined session is a transport connection plus a
/// `join_session` frame.
pub struct LiveBackend {
    transport: SessionTransport,
}

impl LiveBackend {
    pub fn new(transport: SessionTransport) -> Self {
        Self { transport }
    }

    pub fn from_config(config: &Config) -> Self {
        let bus = EventBus::new();
        Self::new(SessionTransport::from_config(config, bus))
    }
}

impl SessionBackend for LiveBackend {
    fn bus(&self) -> Arc<EventBus> {
        self.transport.bus()
    }

    fn join(&self, session_id: &str) {
        self.transport.connect(session_id);
        self.transport.send(ClientEvent::JoinSession {
            session_id: session_id.to_string(),
            user_id: None,
        });
    }

    fn send(&self, event: ClientEvent) {
        self.transport.send(event);
    }

    fn shutdown(&self) {
        self.transport.disconnect();
    }
}

const CANNED_REPLIES: [&str; 5] = [
    "That's an interesting approach! Can you explain your thought process?",
    "Good thinking! Have you considered the edge cases?",
    "Let me help you with that. What's your current understanding of the problem?",
    "Great question! Let's break this down step by step.",
    "I see what you're trying to do. Would you like a hint?",
];

const CANNED_HINT: &str =
    "Try thinking about using a hash map to store the values you've seen.";

/// Self-contained backend for working without a server: replies, code
/// results, and hints are synthesized on canned delays and delivered
/// through the same bus the live transport would use.
pub struct MockBackend {
    bus: Arc<EventBus>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            bus: EventBus::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn emit_after(&self, delay: Duration, make_event: impl FnOnce() -> ServerEvent + Send + 'static) {
        let bus = Arc::clone(&self.bus);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            bus.emit(&make_event());
        });
        let mut tasks = self.tasks.lock().expect("mock task list poisoned");
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBackend for MockBackend {
    fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    fn join(&self, session_id: &str) {
        tracing::info!("Offline mode: simulating join of session {}", session_id);
    }

    fn send(&self, event: ClientEvent) {
        match event {
            ClientEvent::SendMessage { .. } => {
                let delay = Duration::from_millis(rand::thread_rng().gen_range(1000..=2000));
                let reply = *CANNED_REPLIES
                    .choose(&mut rand::thread_rng())
                    .expect("canned replies non-empty");
                self.emit_after(delay, move || ServerEvent::MessageReceived {
                    message: Message::new(MessageType::Text, MessageSender::Agent, reply),
                });
            }
            ClientEvent::SubmitCode { .. } => {
                self.emit_after(Duration::from_millis(1500), || ServerEvent::CodeExecuted {
                    result: CodeExecutionResult {
                        success: true,
                        output: Some("All test cases passed.".to_string()),
                        error: None,
                        execution_time: Some(45),
                        memory_used: Some(1024),
                        test_results: None,
                    },
                    feedback: None,
                });
            }
            ClientEvent::RequestHint { current_level, .. } => {
                self.emit_after(Duration::from_millis(800), move || ServerEvent::HintProvided {
                    hint: Hint {
                        level: current_level + 1,
                        content: CANNED_HINT.to_string(),
                        hint_type: HintType::Approach,
                    },
                    remaining_hints: 3u32.saturating_sub(current_level + 1),
                });
            }
            ClientEvent::JoinSession { session_id, .. } => {
                tracing::info!("Offline mode: ignoring join_session for {}", session_id);
            }
            ClientEvent::Heartbeat { .. } => {}
        }
    }

    fn shutdown(&self) {
        for task in self.tasks.lock().expect("mock task list poisoned").drain(..) {
            task.abort();
        }
    }
}

#[derive(Default)]
struct Observed {
    session: Option<Session>,
    messages: Vec<Message>,
    connection: ConnectionState,
}

/// Single source of truth for the session, the message log, and the
/// connection state as the UI observes them, plus the imperative
/// operations available to it. Mode-agnostic: behavior differences live
/// entirely in the injected [`SessionBackend`].
pub struct SessionController {
    observed: Arc<Mutex<Observed>>,
    backend: Arc<dyn SessionBackend>,
    subscription: Subscription,
}

impl SessionController {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        let observed = Arc::new(Mutex::new(Observed::default()));
        let observed_for_events = Arc::clone(&observed);
        let subscription = backend.bus().on(WILDCARD, move |event| {
            apply_event(&observed_for_events, event);
        });
        Self {
            observed,
            backend,
            subscription,
        }
    }

    /// Live controller wired to the realtime transport.
    pub fn live(config: &Config) -> Self {
        Self::new(Arc::new(LiveBackend::from_config(config)))
    }

    /// Offline controller seeded with the demo session and greeting,
    /// for working without a backend.
    pub fn offline() -> Self {
        let controller = Self::new(Arc::new(MockBackend::new()));
        {
            let mut observed = controller.observed.lock().expect("observed state poisoned");
            observed.session = Some(mock_session());
            observed.messages.push(Message::new(
                MessageType::Text,
                MessageSender::Agent,
                "Hello! I'm your coding interview assistant. I'll be guiding you through a \
                 coding problem today. Are you ready to begin?",
            ));
        }
        controller
    }

    pub fn join_session(&self, session_id: &str) {
        self.backend.join(session_id);
    }

    /// Append the user's message to the log immediately (no server ack)
    /// and hand it to the backend.
    pub fn send_message(&self, content: &str, message_type: MessageType) {
        let message = Message::new(message_type, MessageSender::User, content);
        self.observed
            .lock()
            .expect("observed state poisoned")
            .messages
            .push(message);
        self.backend.send(ClientEvent::SendMessage {
            content: content.to_string(),
            message_type,
        });
    }

    pub fn submit_code(&self, code: &str, language: &str, run_tests: bool) {
        self.backend.send(ClientEvent::SubmitCode {
            code: code.to_string(),
            language: language.to_string(),
            run_tests: Some(run_tests),
        });
    }

    /// Request the next hint for the active question. Without an active
    /// question this is a no-op.
    pub fn request_hint(&self) {
        let request = {
            let observed = self.observed.lock().expect("observed state poisoned");
            observed.session.as_ref().and_then(|session| {
                session
                    .current_question_id
                    .clone()
                    .map(|question_id| (question_id, session.agent_state.hints_given))
            })
        };
        let Some((question_id, current_level)) = request else {
            tracing::warn!("No active question to request a hint for");
            return;
        };
        self.backend.send(ClientEvent::RequestHint {
            question_id,
            current_level,
        });
    }

    pub fn disconnect(&self) {
        self.backend.shutdown();
        self.observed
            .lock()
            .expect("observed state poisoned")
            .connection = ConnectionState::default();
    }

    pub fn session(&self) -> Option<Session> {
        self.observed
            .lock()
            .expect("observed state poisoned")
            .session
            .clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.observed
            .lock()
            .expect("observed state poisoned")
            .messages
            .clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.observed
            .lock()
            .expect("observed state poisoned")
            .connection
            .clone()
    }

    pub fn backend(&self) -> &Arc<dyn SessionBackend> {
        &self.backend
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

fn apply_event(observed: &Mutex<Observed>, event: &ServerEvent) {
    let mut observed = observed.lock().expect("observed state poisoned");
    match event {
        ServerEvent::SessionJoined { session, success } => {
            if *success {
                tracing::info!("Joined session {}", session.id);
                observed.session = Some(session.clone());
            }
        }
        ServerEvent::MessageReceived { message } => {
            observed.messages.push(message.clone());
        }
        ServerEvent::CodeExecuted { result, feedback } => {
            let content = if result.success {
                format!(
                    "Code executed successfully!\n{}",
                    result.output.as_deref().unwrap_or_default()
                )
            } else {
                format!(
                    "Execution failed: {}",
                    result.error.as_deref().unwrap_or("Unknown error")
                )
            };
            let message = Message::new(MessageType::System, MessageSender::System, content)
                .with_metadata(MessageMetadata {
                    execution_result: Some(result.clone()),
                    ..Default::default()
                });
            observed.messages.push(message);

            if let Some(feedback) = feedback.as_deref().filter(|f| !f.is_empty()) {
                observed.messages.push(Message::new(
                    MessageType::Feedback,
                    MessageSender::Agent,
                    feedback,
                ));
            }
        }
        ServerEvent::HintProvided { hint, .. } => {
            let message =
                Message::new(MessageType::Hint, MessageSender::Agent, hint.content.clone())
                    .with_metadata(MessageMetadata {
                        hint_level: Some(hint.level),
                        ..Default::default()
                    });
            observed.messages.push(message);
            if let Some(session) = observed.session.as_mut() {
                if hint.level > session.agent_state.hints_given {
                    session.agent_state.hints_given = hint.level;
                }
            }
        }
        ServerEvent::SessionUpdated { session } => {
            observed.session = Some(session.clone());
        }
        ServerEvent::Error { message, code, .. } => {
            tracing::error!("Session error (code {:?}): {}", code, message);
            observed.messages.push(Message::new(
                MessageType::System,
                MessageSender::System,
                format!("Error: {}", message),
            ));
        }
        ServerEvent::Heartbeat { .. } => {}
        ServerEvent::ConnectionStateChanged { state } => {
            observed.connection = state.clone();
        }
    }
}

fn mock_session() -> Session {
    let now = chrono::Utc::now().to_rfc3339();
    Session {
        id: "mock-session-123".to_string(),
        difficulty: crate::core::Difficulty::Medium,
        status: SessionStatus::Active,
        created_at: now.clone(),
        updated_at: now.clone(),
        current_question_id: None,
        agent_state: AgentState {
            phase: AgentPhase::Greeting,
            context: Default::default(),
            conversation_history: Vec::new(),
            current_question: None,
            hints_given: 0,
            last_activity: now,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_with_question(question_id: &str) -> SessionController {
        let controller = SessionController::offline();
        let mut session = mock_session();
        session.current_question_id = Some(question_id.to_string());
        controller.backend.bus().emit(&ServerEvent::SessionJoined {
            session,
            success: true,
        });
        controller
    }

    #[tokio::test(start_paused = true)]
    async fn offline_hint_flow_appends_hint_and_increments_counter() {
        let controller = offline_with_question("two-sum");
        assert_eq!(controller.session().unwrap().agent_state.hints_given, 0);

        controller.request_hint();
        tokio::time::sleep(Duration::from_millis(850)).await;

        let messages = controller.messages();
        let hint = messages.last().expect("hint message appended");
        assert_eq!(hint.message_type, MessageType::Hint);
        assert_eq!(hint.sender, MessageSender::Agent);
        assert_eq!(hint.metadata.as_ref().unwrap().hint_level, Some(1));
        assert_eq!(controller.session().unwrap().agent_state.hints_given, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hint_without_active_question_is_a_noop() {
        let controller = SessionController::offline();
        let before = controller.messages().len();

        controller.request_hint();
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert_eq!(controller.messages().len(), before);
        assert_eq!(controller.session().unwrap().agent_state.hints_given, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn send_message_appends_optimistically_then_agent_replies() {
        let controller = SessionController::offline();
        let before = controller.messages().len();

        controller.send_message("hello", MessageType::Text);
        let messages = controller.messages();
        assert_eq!(messages.len(), before + 1);
        assert_eq!(messages.last().unwrap().sender, MessageSender::User);
        assert_eq!(messages.last().unwrap().content, "hello");

        tokio::time::sleep(Duration::from_millis(2100)).await;
        let messages = controller.messages();
        assert_eq!(messages.len(), before + 2);
        let reply = messages.last().unwrap();
        assert_eq!(reply.sender, MessageSender::Agent);
        assert!(CANNED_REPLIES.contains(&reply.content.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn submit_code_yields_a_success_system_message() {
        let controller = SessionController::offline();

        controller.submit_code("print('hi')", "python", true);
        tokio::time::sleep(Duration::from_millis(1550)).await;

        let messages = controller.messages();
        let result = messages.last().unwrap();
        assert_eq!(result.message_type, MessageType::System);
        assert!(result.content.contains("All test cases passed."));
        let execution = result
            .metadata
            .as_ref()
            .and_then(|m| m.execution_result.as_ref())
            .expect("execution result metadata");
        assert!(execution.success);
    }

    #[tokio::test(start_paused = true)]
    async fn message_log_is_append_only_across_operations() {
        let controller = offline_with_question("two-sum");

        controller.send_message("first", MessageType::Text);
        let snapshot: Vec<(String, String)> = controller
            .messages()
            .iter()
            .map(|m| (m.id.clone(), m.content.clone()))
            .collect();

        controller.submit_code("x", "python", true);
        controller.request_hint();
        tokio::time::sleep(Duration::from_millis(3000)).await;

        let after = controller.messages();
        assert!(after.len() >= snapshot.len());
        for (message, (id, content)) in after.iter().zip(snapshot.iter()) {
            assert_eq!(&message.id, id);
            assert_eq!(&message.content, content);
        }
    }

    #[tokio::test]
    async fn error_event_becomes_a_system_message() {
        let controller = SessionController::offline();
        let before = controller.messages().len();

        controller.backend.bus().emit(&ServerEvent::Error {
            message: "session expired".into(),
            code: Some("SESSION_EXPIRED".into()),
            details: None,
        });

        let messages = controller.messages();
        assert_eq!(messages.len(), before + 1);
        assert_eq!(messages.last().unwrap().content, "Error: session expired");
        assert_eq!(messages.last().unwrap().sender, MessageSender::System);
    }

    #[tokio::test]
    async fn code_executed_with_feedback_appends_two_messages() {
        let controller = SessionController::offline();
        let before = controller.messages().len();

        controller.backend.bus().emit(&ServerEvent::CodeExecuted {
            result: CodeExecutionResult {
                success: false,
                output: None,
                error: Some("IndexError".into()),
                execution_time: None,
                memory_used: None,
                test_results: None,
            },
            feedback: Some("Watch the loop bounds.".into()),
        });

        let messages = controller.messages();
        assert_eq!(messages.len(), before + 2);
        assert!(messages[before].content.contains("Execution failed: IndexError"));
        assert_eq!(messages[before + 1].message_type, MessageType::Feedback);
        assert_eq!(messages[before + 1].sender, MessageSender::Agent);
    }

    #[tokio::test]
    async fn session_updated_replaces_the_session_wholesale() {
        let controller = offline_with_question("two-sum");

        let mut updated = mock_session();
        updated.agent_state.hints_given = 2;
        updated.agent_state.phase = AgentPhase::Reviewing;
        controller
            .backend
            .bus()
            .emit(&ServerEvent::SessionUpdated { session: updated });

        let session = controller.session().unwrap();
        assert_eq!(session.agent_state.hints_given, 2);
        assert_eq!(session.agent_state.phase, AgentPhase::Reviewing);
        assert_eq!(session.current_question_id, None);
    }

    #[tokio::test]
    async fn connection_state_change_updates_the_snapshot() {
        let controller = SessionController::offline();

        controller.backend.bus().emit(&ServerEvent::ConnectionStateChanged {
            state: ConnectionState {
                status: crate::core::ConnectionStatus::Reconnecting,
                last_connected: None,
                reconnect_attempts: 2,
                error: None,
            },
        });

        let connection = controller.connection_state();
        assert_eq!(connection.status, crate::core::ConnectionStatus::Reconnecting);
        assert_eq!(connection.reconnect_attempts, 2);
    }
}
