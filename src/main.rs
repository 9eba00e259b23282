use clap::Parser;
use tracing_subscriber::EnvFilter;

use prepwire::cli::{handlers, Cli, Commands};
use prepwire::{Config, Result};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("prepwire=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Join { session_id } => handlers::join_session(config, session_id).await,
        Commands::Practice => handlers::practice().await,
        Commands::Technical => handlers::technical_interview(config).await,
        Commands::Evaluate {
            transcript,
            previous_state,
            audio_out,
        } => handlers::evaluate_transcript(config, transcript, previous_state, audio_out).await,
    }
}
