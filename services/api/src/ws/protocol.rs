//! Defines the WebSocket message protocol between the browser client and the API server.

use crate::models;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Starts or resumes a session. This must be the first message.
    #[serde(rename = "init")]
    Init {
        /// The student the session belongs to.
        user_id: String,
        /// The session to resume; a new one is created when absent.
        #[serde(default)]
        session_id: Option<Uuid>,
        /// Optional focus for a newly created session.
        #[serde(default)]
        topic: Option<String>,
    },
    /// A text message from the student to the tutor.
    #[serde(rename = "user_message")]
    UserMessage { text: String },
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms session initialization and provides the stored conversation.
    Initialized {
        session_id: Uuid,
        /// Name of the agent the student is talking to.
        agent: String,
        history: Vec<models::Message>,
        /// The latest saved study plan, if any.
        study_plan: Option<serde_json::Value>,
    },
    /// Reports an error to the client. The connection stays open after turn errors.
    Error { message: String },
    /// Signals the beginning of the tutor's reply.
    ResponseStart,
    /// The main tutor consulted a specialist while preparing the reply.
    AgentConsulted { agent: String },
    /// A chunk of the reply text.
    ResponseChunk { chunk: String },
    /// Signals the end of the tutor's reply.
    ResponseEnd,
    /// A study plan was saved during the turn.
    StudyPlanSaved {
        path: String,
        plan: serde_json::Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_init_message_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "init", "user_id": "student_1"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Init {
                user_id: "student_1".to_string(),
                session_id: None,
                topic: None,
            }
        );

        let id = Uuid::new_v4();
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "init",
            "user_id": "student_1",
            "session_id": id,
            "topic": "Chemistry"
        }))
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Init {
                user_id: "student_1".to_string(),
                session_id: Some(id),
                topic: Some("Chemistry".to_string()),
            }
        );
    }

    #[test]
    fn test_user_message_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "user_message", "text": "I feel tired"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::UserMessage {
                text: "I feel tired".to_string()
            }
        );

        let unknown: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type": "set_voice_enabled", "enabled": true}"#);
        assert!(unknown.is_err());
        let missing_user: Result<ClientMessage, _> = serde_json::from_str(r#"{"type": "init"}"#);
        assert!(missing_user.is_err());
    }

    #[test]
    fn test_server_message_tags() {
        let tag =
            |msg: ServerMessage| -> Value { serde_json::to_value(msg).unwrap()["type"].clone() };
        assert_eq!(tag(ServerMessage::ResponseStart), "response_start");
        assert_eq!(tag(ServerMessage::ResponseEnd), "response_end");
        assert_eq!(
            tag(ServerMessage::AgentConsulted {
                agent: "Burnout_Agent".to_string()
            }),
            "agent_consulted"
        );
        assert_eq!(
            tag(ServerMessage::StudyPlanSaved {
                path: "p.json".to_string(),
                plan: json!({})
            }),
            "study_plan_saved"
        );
    }

    #[test]
    fn test_server_message_payloads() {
        let chunk = serde_json::to_value(ServerMessage::ResponseChunk {
            chunk: "Hello".to_string(),
        })
        .unwrap();
        assert_eq!(chunk, json!({"type": "response_chunk", "chunk": "Hello"}));

        let id = Uuid::new_v4();
        let initialized = serde_json::to_value(ServerMessage::Initialized {
            session_id: id,
            agent: "Main_Tutor_Agent".to_string(),
            history: vec![],
            study_plan: None,
        })
        .unwrap();
        assert_eq!(initialized["type"], "initialized");
        assert_eq!(initialized["session_id"], json!(id));
        assert_eq!(initialized["agent"], "Main_Tutor_Agent");
        assert_eq!(initialized["study_plan"], Value::Null);

        let error = serde_json::to_value(ServerMessage::Error {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(error, json!({"type": "error", "message": "boom"}));
    }
}
