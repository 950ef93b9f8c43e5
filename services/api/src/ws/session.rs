//! Manages the primary WebSocket connection lifecycle for a tutoring session.

use super::{
    cycle::handle_tutor_turn,
    protocol::{ClientMessage, ServerMessage},
};
use crate::{models, state::AppState};
use anyhow::{Context, Result, anyhow};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    Sink, SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{Instrument, error, info, instrument, warn};
use tutor_core::{
    roster::WELCOME_MESSAGE,
    study_plan::StudyPlanService,
    tools::serve_in_process,
};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// The session a connection is bound to after a successful `init`.
struct InitializedSession {
    session: models::Session,
    history: Vec<models::Message>,
    study_plan: Option<serde_json::Value>,
}

/// File name of the study plan owned by `session_id`.
pub(crate) fn study_plan_file_name(session_id: Uuid) -> String {
    format!("study_plan_{}.json", session_id)
}

/// Main handler for an individual WebSocket connection.
///
/// Performs the `init` handshake, then spawns the session loop.
#[instrument(name = "ws_session", skip_all, fields(connection_id, session_id, user_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id: u32 = rand::random();
    tracing::Span::current().record("connection_id", connection_id);
    info!("New WebSocket connection. Awaiting initialization...");

    let (socket_tx, mut socket_rx) = socket.split();
    let socket_tx_arc = Arc::new(Mutex::new(socket_tx));

    // The first message from the client must be an `init` message.
    let initialized = match socket_rx.next().await {
        Some(Ok(Message::Text(text))) => initialize_session(&text, &state).await,
        Some(Ok(_)) => Err(anyhow!("First message was not a text `init` message.")),
        Some(Err(e)) => Err(anyhow!(e).context("Failed to read the `init` message")),
        None => {
            info!("Client disconnected before sending init message.");
            return;
        }
    };
    let InitializedSession {
        session,
        history,
        study_plan,
    } = match initialized {
        Ok(initialized) => initialized,
        Err(e) => {
            error!("Session initialization failed: {:?}", e);
            let _ = send_msg(
                &mut *socket_tx_arc.lock().await,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };
    let session_id = session.id;

    if send_msg(
        &mut *socket_tx_arc.lock().await,
        ServerMessage::Initialized {
            session_id,
            agent: state.tutor.roster().main().name.clone(),
            history: history.clone(),
            study_plan,
        },
    )
    .await
    .is_err()
    {
        error!("Failed to send Initialized message to client.");
        return;
    }

    // Spawn the main session loop in a separate, instrumented task.
    let topic = session.topic.unwrap_or_default();
    let session_span = tracing::info_span!("tutor_runtime", %session_id, %topic);
    tokio::spawn(
        async move {
            if let Err(e) =
                run_tutor_session(state, socket_tx_arc, socket_rx, session_id, history).await
            {
                error!(error = ?e, "Tutor session terminated with error.");
            }
            info!("Tutor session finished.");
        }
        .instrument(session_span),
    );
}

/// Parses the `init` message, then resumes the requested session or creates a new one.
async fn initialize_session(init_text: &str, state: &Arc<AppState>) -> Result<InitializedSession> {
    let init_msg: ClientMessage =
        serde_json::from_str(init_text).context("Invalid `init` message")?;
    let ClientMessage::Init {
        user_id,
        session_id,
        topic,
    } = init_msg
    else {
        return Err(anyhow!("First message must be `init`"));
    };

    tracing::Span::current().record("user_id", user_id.as_str());
    let session = match session_id {
        Some(session_id) => {
            info!(%session_id, "Resuming existing session");
            state
                .db
                .get_session(session_id, &user_id)
                .await?
                .with_context(|| format!("Session with id '{}' not found", session_id))?
        }
        None => {
            let session = state
                .db
                .create_session(&user_id, topic.as_deref(), WELCOME_MESSAGE)
                .await?;
            info!(session_id = %session.id, "Created new session");
            session
        }
    };
    tracing::Span::current().record("session_id", session.id.to_string());

    let history = state.db.get_session_messages(session.id).await?;
    let study_plan = state
        .db
        .get_latest_study_plan(session.id)
        .await?
        .map(|record| record.plan);
    Ok(InitializedSession {
        session,
        history,
        study_plan,
    })
}

/// The main event loop for an active WebSocket session.
///
/// Owns the session's study-plan tool service and runs a tutor turn for every
/// `user_message` the client sends.
async fn run_tutor_session(
    state: Arc<AppState>,
    socket_tx: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    mut socket_rx: SplitStream<WebSocket>,
    session_id: Uuid,
    mut history: Vec<models::Message>,
) -> Result<()> {
    let (plan_tx, mut plan_rx) = mpsc::channel(8);
    let study_plan_service = StudyPlanService::new(
        &state.config.study_plan_dir,
        study_plan_file_name(session_id),
        Some(plan_tx),
    );
    let (mcp_client, tool_handle) = serve_in_process(study_plan_service).await?;

    while let Some(msg_result) = socket_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::UserMessage { text }) => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    handle_tutor_turn(
                        &state,
                        session_id,
                        &mut history,
                        &mcp_client,
                        &mut plan_rx,
                        &text,
                        &socket_tx,
                    )
                    .await?;
                }
                Ok(ClientMessage::Init { .. }) => {
                    warn!("Ignoring repeated `init` message.");
                }
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed client message.");
                    send_msg(
                        &mut *socket_tx.lock().await,
                        ServerMessage::Error {
                            message: format!("Invalid message: {}", e),
                        },
                    )
                    .await?;
                }
            },
            Ok(Message::Binary(_)) => warn!("Ignoring binary message; only text is supported."),
            Ok(Message::Close(_)) => {
                info!("Client sent close frame. Shutting down session.");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                error!("Error receiving from client WebSocket: {:?}", e);
                break;
            }
        }
    }

    tool_handle.abort();
    info!("WebSocket connection closed and tutor session terminated.");
    Ok(())
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg<S>(socket_tx: &mut S, msg: ServerMessage) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_study_plan_file_name_is_per_session() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            study_plan_file_name(id),
            "study_plan_550e8400-e29b-41d4-a716-446655440000.json"
        );
        assert_ne!(study_plan_file_name(Uuid::new_v4()), study_plan_file_name(id));
    }
}
