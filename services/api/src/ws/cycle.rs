//! Runs one tutor turn for a WebSocket session and streams its progress.

use crate::{
    models::{self, MessageRole},
    state::AppState,
    ws::{protocol::ServerMessage, session::send_msg},
};
use anyhow::{Context, Result};
use async_openai::types::ChatCompletionRequestMessage;
use axum::extract::ws::Message;
use futures_util::Sink;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info, instrument, warn};
use tutor_core::{
    TutorEvent,
    study_plan::SavedStudyPlan,
    tools::ToolHost,
    tutor::{assistant_message, user_message},
};
use uuid::Uuid;

/// Converts stored messages into chat history for the model.
pub(crate) fn to_chat_history(
    history: &[models::Message],
) -> Result<Vec<ChatCompletionRequestMessage>> {
    history
        .iter()
        .map(|msg| match msg.role {
            MessageRole::User => user_message(&msg.content),
            MessageRole::Ai => assistant_message(&msg.content),
        })
        .collect()
}

/// Maps a tutor progress event onto the client protocol.
pub(crate) fn event_message(event: TutorEvent) -> ServerMessage {
    match event {
        TutorEvent::AgentConsulted { agent } => ServerMessage::AgentConsulted { agent },
        TutorEvent::ResponseChunk(chunk) => ServerMessage::ResponseChunk { chunk },
    }
}

/// Handles a single student message.
///
/// The message is stored, the tutor runs over the whole conversation, and
/// progress is pushed to the client as it happens:
/// `response_start`, any `agent_consulted` / `response_chunk` /
/// `study_plan_saved`, then `response_end`. A failed turn, including a
/// storage failure, is reported as an `error` message; only a broken socket
/// is returned as `Err`.
#[instrument(skip_all, fields(%session_id))]
pub async fn handle_tutor_turn<S>(
    state: &Arc<AppState>,
    session_id: Uuid,
    history: &mut Vec<models::Message>,
    tool_host: &dyn ToolHost,
    plan_rx: &mut mpsc::Receiver<SavedStudyPlan>,
    user_text: &str,
    socket_tx: &Arc<Mutex<S>>,
) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    send_msg(&mut *socket_tx.lock().await, ServerMessage::ResponseStart).await?;

    let (events_tx, events_rx) = mpsc::channel(32);
    let (turn, forwarded) = tokio::join!(
        answer(state, session_id, history, tool_host, user_text, events_tx),
        forward_progress(state, session_id, events_rx, plan_rx, socket_tx),
    );
    forwarded?;

    let mut sink = socket_tx.lock().await;
    send_msg(&mut *sink, ServerMessage::ResponseEnd).await?;
    if let Err(e) = turn {
        error!(error = ?e, "Tutor turn failed");
        send_msg(
            &mut *sink,
            ServerMessage::Error {
                message: format!("The tutor could not answer: {}", e),
            },
        )
        .await?;
    }
    Ok(())
}

/// Stores the student's message, runs the tutor and stores its reply.
async fn answer(
    state: &Arc<AppState>,
    session_id: Uuid,
    history: &mut Vec<models::Message>,
    tool_host: &dyn ToolHost,
    user_text: &str,
    events_tx: mpsc::Sender<TutorEvent>,
) -> Result<()> {
    let new_user_msg = state
        .db
        .add_message(session_id, MessageRole::User, user_text)
        .await
        .context("Failed to store the student's message")?;
    history.push(new_user_msg);
    let chat_history = to_chat_history(history)?;

    let outcome = state
        .tutor
        .respond(&chat_history, tool_host, events_tx)
        .await?;
    info!(consulted = ?outcome.consulted, "Turn finished");
    if !outcome.reply.is_empty() {
        let new_ai_msg = state
            .db
            .add_message(session_id, MessageRole::Ai, &outcome.reply)
            .await
            .context("Failed to store the tutor's reply")?;
        history.push(new_ai_msg);
    }
    Ok(())
}

/// Pushes tutor events and saved plans to the client until the turn ends.
///
/// Both channels are drained to the end even after the socket fails, so the
/// tutor never waits on a full channel. The first socket error is returned.
async fn forward_progress<S>(
    state: &Arc<AppState>,
    session_id: Uuid,
    mut events_rx: mpsc::Receiver<TutorEvent>,
    plan_rx: &mut mpsc::Receiver<SavedStudyPlan>,
    socket_tx: &Arc<Mutex<S>>,
) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let mut socket_error = None;
    loop {
        let msg = tokio::select! {
            event = events_rx.recv() => match event {
                Some(event) => event_message(event),
                None => break,
            },
            Some(saved) = plan_rx.recv() => record_plan(state, session_id, saved).await,
        };
        deliver(socket_tx, msg, &mut socket_error).await;
    }
    // Plans announced right before the turn ended are still buffered.
    while let Ok(saved) = plan_rx.try_recv() {
        let msg = record_plan(state, session_id, saved).await;
        deliver(socket_tx, msg, &mut socket_error).await;
    }
    socket_error.map_or(Ok(()), Err)
}

async fn deliver<S>(
    socket_tx: &Arc<Mutex<S>>,
    msg: ServerMessage,
    socket_error: &mut Option<anyhow::Error>,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    if socket_error.is_some() {
        return;
    }
    if let Err(e) = send_msg(&mut *socket_tx.lock().await, msg).await {
        warn!(error = ?e, "Failed to push progress to the client");
        *socket_error = Some(e);
    }
}

/// Records a saved plan for the session and builds its client notice.
async fn record_plan(
    state: &Arc<AppState>,
    session_id: Uuid,
    saved: SavedStudyPlan,
) -> ServerMessage {
    let path = saved.path.display().to_string();
    if let Err(e) = state
        .db
        .save_study_plan(session_id, &path, &saved.plan)
        .await
    {
        warn!(error = ?e, %path, "Failed to record study plan in the database");
    }
    ServerMessage::StudyPlanSaved {
        path,
        plan: saved.plan,
    }
}
