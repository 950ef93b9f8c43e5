//! Interactive terminal conversation with the tutor.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use async_openai::types::ChatCompletionRequestMessage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};
use tutor_core::{
    TutorEvent,
    roster::{CAPABILITIES_TITLE, WELCOME_MESSAGE},
    study_plan::{SavedStudyPlan, StudyPlanService},
    tools::{ToolHost, serve_in_process},
    tutor::{TurnOutcome, Tutor, assistant_message, user_message},
};

/// File the terminal session writes its study plan to.
pub const CLI_STUDY_PLAN_FILE: &str = "study_plan.json";

/// Saved-plan notices buffered between the tool service and the terminal.
pub const PLAN_CHANNEL_CAPACITY: usize = 8;

const EXIT_COMMANDS: [&str; 3] = ["exit", "quit", "sair"];

/// Returns true when `line` asks to end the session.
pub fn is_exit_command(line: &str) -> bool {
    let line = line.trim();
    EXIT_COMMANDS.iter().any(|c| line.eq_ignore_ascii_case(c))
}

/// Formats a progress notice for a consulted specialist.
pub fn consulted_notice(agent: &str) -> String {
    format!("[consulting {}]", agent)
}

/// Runs the read-eval-print loop until EOF or an exit command.
pub async fn run(tutor: &Tutor, plan_dir: PathBuf) -> Result<()> {
    let (plan_tx, mut plan_rx) = mpsc::channel(PLAN_CHANNEL_CAPACITY);
    let service = StudyPlanService::new(plan_dir, CLI_STUDY_PLAN_FILE, Some(plan_tx));
    let (tool_client, tool_handle) = serve_in_process(service).await?;

    println!("{}:", CAPABILITIES_TITLE);
    for capability in tutor.roster().capabilities() {
        println!("  - {}", capability.description);
    }
    println!();
    println!("Tutor: {}", WELCOME_MESSAGE);

    let mut history: Vec<ChatCompletionRequestMessage> = vec![assistant_message(WELCOME_MESSAGE)?];
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("EOF received, exiting");
                break;
            }
            Err(e) => {
                error!("Failed to read from stdin: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit_command(line) {
            break;
        }

        history.push(user_message(line)?);
        print!("Tutor: ");
        let (turn, saved) = run_turn(tutor, &history, &tool_client, &mut plan_rx).await;
        println!();

        for SavedStudyPlan { path, .. } in saved {
            println!("[study plan saved to {}]", path.display());
        }

        match turn {
            Ok(outcome) => history.push(assistant_message(&outcome.reply)?),
            Err(e) => {
                error!(error = ?e, "Tutor turn failed");
                eprintln!("Sorry, something went wrong: {}", e);
            }
        }
    }

    tool_handle.abort();
    println!("Goodbye! Good luck with your studies.");
    Ok(())
}

/// Runs one tutor turn, printing its progress and collecting the plans it saves.
///
/// Saved-plan notices are taken off `plan_rx` while the turn runs, so any
/// number of saves fits in one turn.
pub async fn run_turn(
    tutor: &Tutor,
    history: &[ChatCompletionRequestMessage],
    tool_host: &dyn ToolHost,
    plan_rx: &mut mpsc::Receiver<SavedStudyPlan>,
) -> (Result<TurnOutcome>, Vec<SavedStudyPlan>) {
    let (events_tx, events_rx) = mpsc::channel(32);
    tokio::join!(
        tutor.respond(history, tool_host, events_tx),
        print_progress(events_rx, plan_rx),
    )
}

async fn print_progress(
    mut events: mpsc::Receiver<TutorEvent>,
    plans: &mut mpsc::Receiver<SavedStudyPlan>,
) -> Vec<SavedStudyPlan> {
    let mut stdout = std::io::stdout();
    let mut saved = Vec::new();
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(TutorEvent::AgentConsulted { agent }) => {
                        let _ = write!(stdout, "{} ", consulted_notice(&agent));
                    }
                    Some(TutorEvent::ResponseChunk(chunk)) => {
                        let _ = write!(stdout, "{}", chunk);
                    }
                    None => break,
                }
                let _ = stdout.flush();
            }
            Some(plan) = plans.recv() => saved.push(plan),
        }
    }
    while let Ok(plan) = plans.try_recv() {
        saved.push(plan);
    }
    saved
}
