use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use rand::seq::SliceRandom;

use crate::client::http::{EvaluatePayload, EvaluationClient, InterviewEvaluation};

const STARTER_PROBLEMS: [&str; 7] = [
    "Explain a binary search tree and how you would implement search.",
    "Explain how you would find the maximum subarray sum in an array (e.g. Kadane's algorithm or brute force).",
    "What is supervised fine-tuning (SFT) in the context of large language models?",
    "Explain linear regression: what it models and how parameters are typically learned.",
    "Explain the difference between a stack and a queue with one use case for each.",
    "What is overfitting in machine learning and how can you try to reduce it?",
    "Explain how a hash map works and what average-time operations it supports.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Agent,
}

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

#[derive(Default)]
struct FlowState {
    transcript: String,
    previous_state: String,
    evaluation: Option<InterviewEvaluation>,
    evaluating: bool,
    turns: Vec<ChatTurn>,
    initial_greeting: Option<String>,
}

/// Conversation state of the technical-interview track: the live
/// transcript, the dialogue log, and the last evaluation. Concurrent
/// evaluations are serialized by a monotonic request generation; only the
/// most recently issued request may update shared state.
pub struct EvaluationFlow {
    client: EvaluationClient,
    state: Mutex<FlowState>,
    generation: AtomicU64,
}

impl EvaluationFlow {
    pub fn new(client: EvaluationClient) -> Self {
        Self {
            client,
            state: Mutex::new(FlowState::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Open the interview: pick a starter problem, record the greeting as
    /// the first agent turn, and seed the rolling dialogue state. Calling
    /// again returns the original greeting.
    pub fn begin(&self) -> String {
        let mut state = self.state.lock().expect("flow state poisoned");
        if let Some(greeting) = &state.initial_greeting {
            tracing::warn!("Interview already started");
            return greeting.clone();
        }

        let problem = *STARTER_PROBLEMS
            .choose(&mut rand::thread_rng())
            .expect("starter problems non-empty");
        let greeting = format!(
            "Hi, welcome to the technical interview. Let's start with something straightforward. {}",
            problem
        );
        state.turns.push(ChatTurn {
            role: ChatRole::Agent,
            text: greeting.clone(),
        });
        state.previous_state = greeting.clone();
        state.initial_greeting = Some(greeting.clone());
        greeting
    }

    /// Append one finalized speech fragment, space-joined.
    pub fn append_transcript(&self, chunk: &str) {
        let mut state = self.state.lock().expect("flow state poisoned");
        state.transcript = format!("{} {}", state.transcript, chunk).trim().to_string();
    }

    pub fn transcript(&self) -> String {
        self.state.lock().expect("flow state poisoned").transcript.clone()
    }

    pub fn is_evaluating(&self) -> bool {
        self.state.lock().expect("flow state poisoned").evaluating
    }

    pub fn turns(&self) -> Vec<ChatTurn> {
        self.state.lock().expect("flow state poisoned").turns.clone()
    }

    pub fn evaluation(&self) -> Option<InterviewEvaluation> {
        self.state.lock().expect("flow state poisoned").evaluation.clone()
    }

    /// Submit one round for evaluation. On success (for the latest
    /// request only) the user and agent turns are appended, the dialogue
    /// state rolls forward, and the live transcript is reset. A response
    /// that has been superseded by a newer request is dropped and
    /// `Ok(None)` returned. Errors carry the backend's body text.
    pub async fn submit(
        &self,
        transcript: &str,
        diagram_base64: &str,
    ) -> Result<Option<InterviewEvaluation>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let text = {
            let trimmed = transcript.trim();
            if trimmed.is_empty() {
                "(no transcript)".to_string()
            } else {
                trimmed.to_string()
            }
        };
        let previous_state = {
            let mut state = self.state.lock().expect("flow state poisoned");
            state.evaluating = true;
            state.previous_state.clone()
        };

        let result = self
            .client
            .evaluate(&EvaluatePayload {
                transcript: text.clone(),
                diagram_base64: diagram_base64.to_string(),
                previous_state,
            })
            .await;

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::info!("Dropping superseded evaluation response");
            return Ok(None);
        }

        let mut state = self.state.lock().expect("flow state poisoned");
        state.evaluating = false;
        let evaluation = result?;

        let agent_text = evaluation
            .follow_up_question
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| {
                let feedback = evaluation.verbal_feedback.trim();
                (!feedback.is_empty()).then(|| feedback.to_string())
            });

        state.turns.push(ChatTurn {
            role: ChatRole::User,
            text,
        });
        if let Some(agent_text) = &agent_text {
            state.turns.push(ChatTurn {
                role: ChatRole::Agent,
                text: agent_text.clone(),
            });
        }
        state.previous_state = agent_text.unwrap_or_default();
        state.transcript.clear();
        state.evaluation = Some(evaluation.clone());

        Ok(Some(evaluation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> EvaluationFlow {
        EvaluationFlow::new(EvaluationClient::new("http://localhost:1".to_string()))
    }

    #[test]
    fn transcript_accumulates_space_joined() {
        let flow = flow();
        flow.append_transcript("we use");
        flow.append_transcript("a load balancer");
        assert_eq!(flow.transcript(), "we use a load balancer");

        flow.append_transcript("   ");
        assert_eq!(flow.transcript(), "we use a load balancer");
    }

    #[test]
    fn begin_seeds_greeting_once() {
        let flow = flow();
        let greeting = flow.begin();
        assert!(greeting.starts_with("Hi, welcome to the technical interview."));
        assert!(STARTER_PROBLEMS.iter().any(|p| greeting.ends_with(p)));

        let turns = flow.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, ChatRole::Agent);

        // Second call repeats the original greeting without a new turn.
        assert_eq!(flow.begin(), greeting);
        assert_eq!(flow.turns().len(), 1);
    }
}
