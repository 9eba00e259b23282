use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::client::{
    ChatRole, EvaluatePayload, EvaluationClient, EvaluationFlow, PauseDispatcher,
    SessionController, WILDCARD,
};
use crate::core::{ConnectionStatus, MessageType, ServerEvent};
use crate::utils::decode_pcm16;
use crate::{Config, Result};

pub async fn join_session(config: Config, session_id: String) -> Result<()> {
    tracing::info!("Joining session {}", session_id);
    let controller = SessionController::live(&config);
    run_chat_loop(controller, Some(session_id)).await
}

pub async fn practice() -> Result<()> {
    tracing::info!("Starting offline practice session");
    let controller = SessionController::offline();
    for message in controller.messages() {
        println!("[agent] {}", message.content);
    }
    run_chat_loop(controller, None).await
}

async fn run_chat_loop(controller: SessionController, session_id: Option<String>) -> Result<()> {
    let printer = controller.backend().bus().on(WILDCARD, |event| match event {
        ServerEvent::MessageReceived { message } => {
            println!("[agent] {}", message.content);
        }
        ServerEvent::CodeExecuted { result, feedback } => {
            if result.success {
                println!("[run] {}", result.output.as_deref().unwrap_or("ok"));
            } else {
                println!("[run] failed: {}", result.error.as_deref().unwrap_or("unknown"));
            }
            if let Some(feedback) = feedback {
                println!("[agent] {}", feedback);
            }
        }
        ServerEvent::HintProvided { hint, remaining_hints } => {
            println!("[hint {}] {} ({} left)", hint.level, hint.content, remaining_hints);
        }
        ServerEvent::Error { message, .. } => {
            println!("[error] {}", message);
        }
        ServerEvent::ConnectionStateChanged { state } => match state.status {
            ConnectionStatus::Connected => println!("[connected]"),
            ConnectionStatus::Reconnecting => {
                println!("[reconnecting, attempt {}]", state.reconnect_attempts)
            }
            ConnectionStatus::Error => {
                println!("[connection error: {}]", state.error.as_deref().unwrap_or("unknown"))
            }
            _ => {}
        },
        _ => {}
    });

    if let Some(session_id) = &session_id {
        controller.join_session(session_id);
    }

    println!("Type a message, or /hint, /code <language> <path>, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if line == "/hint" {
            controller.request_hint();
            continue;
        }
        if let Some(rest) = line.strip_prefix("/code ") {
            let mut parts = rest.splitn(2, ' ');
            let (language, path) = (parts.next().unwrap_or_default(), parts.next());
            let Some(path) = path else {
                println!("usage: /code <language> <path>");
                continue;
            };
            match tokio::fs::read_to_string(path).await {
                Ok(code) => controller.submit_code(&code, language, true),
                Err(e) => println!("could not read {}: {}", path, e),
            }
            continue;
        }
        controller.send_message(line, MessageType::Text);
    }

    printer.unsubscribe();
    controller.disconnect();
    Ok(())
}

pub async fn technical_interview(config: Config) -> Result<()> {
    let flow = Arc::new(EvaluationFlow::new(EvaluationClient::from_config(&config)));
    println!("[interviewer] {}", flow.begin());
    println!("Answer by typing; a 1.5s pause submits, /done submits now, /quit leaves");

    // The pause callback is synchronous; hand the transcript to the async
    // evaluation through a channel.
    let (eval_tx, mut eval_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let flow_for_reads = Arc::clone(&flow);
    let dispatcher = PauseDispatcher::new(
        move |transcript| {
            let _ = eval_tx.send(transcript);
        },
        move || flow_for_reads.transcript(),
    );

    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            maybe_line = line_rx.recv() => {
                let Some(line) = maybe_line else { break };
                let line = line.trim();
                if line == "/quit" {
                    break;
                }
                if line == "/done" {
                    dispatcher.trigger();
                    continue;
                }
                if line.is_empty() {
                    continue;
                }
                flow.append_transcript(line);
                dispatcher.on_transcript_update();
            }
            Some(transcript) = eval_rx.recv() => {
                match flow.submit(&transcript, "").await {
                    Ok(Some(evaluation)) => {
                        println!(
                            "[scores diagram {:.2} verbal {:.2} overall {:.2}]",
                            evaluation.diagram_score,
                            evaluation.verbal_score,
                            evaluation.overall_score
                        );
                        if let Some(turn) = flow.turns().last() {
                            if turn.role == ChatRole::Agent {
                                println!("[interviewer] {}", turn.text);
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("[error] {}", e),
                }
            }
        }
    }

    dispatcher.cancel();
    Ok(())
}

pub async fn evaluate_transcript(
    config: Config,
    transcript: String,
    previous_state: String,
    audio_out: Option<PathBuf>,
) -> Result<()> {
    let client = EvaluationClient::from_config(&config);
    let evaluation = client
        .evaluate(&EvaluatePayload {
            transcript,
            diagram_base64: String::new(),
            previous_state,
        })
        .await?;

    println!(
        "scores: diagram {:.2}  verbal {:.2}  overall {:.2}",
        evaluation.diagram_score, evaluation.verbal_score, evaluation.overall_score
    );
    for aspect in &evaluation.design_aspects {
        println!("  {} {:.2}: {}", aspect.component, aspect.score, aspect.feedback);
        for issue in &aspect.issues {
            println!("    - {}", issue);
        }
    }
    println!("feedback: {}", evaluation.verbal_feedback);
    if let Some(question) = &evaluation.follow_up_question {
        println!("follow-up: {}", question);
    }

    if let Some(path) = audio_out {
        let text = evaluation
            .follow_up_question
            .clone()
            .unwrap_or_else(|| evaluation.verbal_feedback.clone());
        let pcm = client.tts_stream(&text, evaluation.minimax_emotion).await?;
        let samples = decode_pcm16(&pcm);
        tokio::fs::write(&path, &pcm).await?;
        println!("wrote {} samples to {}", samples.len(), path.display());
    }

    Ok(())
}
