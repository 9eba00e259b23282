use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "prepwire")]
#[command(about = "Interview practice from the terminal", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Join a live interview session
    Join {
        /// Session ID to join
        session_id: String,
    },
    /// Practice offline against the scripted interviewer
    Practice,
    /// Run a technical interview: answers are evaluated after a pause
    Technical,
    /// Submit a transcript for a one-shot evaluation
    Evaluate {
        /// Spoken-answer transcript to evaluate
        #[arg(long)]
        transcript: String,
        /// Previous agent utterance, for dialogue context
        #[arg(long, default_value = "")]
        previous_state: String,
        /// Fetch spoken feedback and write the raw PCM to this file
        #[arg(long)]
        audio_out: Option<PathBuf>,
    },
}
