//! API and Database Models
//!
//! This module defines the core data structures used for both database mapping
//! with `sqlx` and for generating OpenAPI documentation with `utoipa`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use tutor_core::roster::Capability;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(sqlx::Type, Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq)]
#[sqlx(type_name = "session_status", rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

#[derive(sqlx::Type, Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq)]
#[sqlx(type_name = "message_role", rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Ai,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Ai => write!(f, "ai"),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct Session {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub user_id: String,
    /// Optional subject the student wants to focus on.
    pub topic: Option<String>,
    #[schema(value_type = String, example = "active")]
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct Message {
    pub id: i64,
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    #[schema(value_type = String, example = "user")]
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A study plan saved by the planning agent during a session.
#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct StudyPlanRecord {
    pub id: i64,
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    pub file_path: String,
    #[schema(value_type = Object)]
    pub plan: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct CreateSessionPayload {
    #[schema(example = "Preparing for the calculus exam")]
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateSessionStatusPayload {
    #[schema(example = "ended")]
    pub status: SessionStatus,
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct CapabilityEntry {
    #[schema(example = "Motivation_Agent")]
    pub agent: String,
    pub description: String,
}

impl From<Capability> for CapabilityEntry {
    fn from(capability: Capability) -> Self {
        Self {
            agent: capability.agent,
            description: capability.description,
        }
    }
}

/// What the tutor can help with, as shown to students.
#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct CapabilitiesResponse {
    pub title: String,
    pub capabilities: Vec<CapabilityEntry>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn session(topic: Option<&str>) -> Session {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4(),
            user_id: "student_42".to_string(),
            topic: topic.map(str::to_string),
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_session_status_serialization() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Active).unwrap(),
            "\"Active\""
        );
        assert_eq!(
            serde_json::to_string(&SessionStatus::Ended).unwrap(),
            "\"Ended\""
        );
        let ended: SessionStatus = serde_json::from_str("\"Ended\"").unwrap();
        assert_eq!(ended, SessionStatus::Ended);
    }

    #[test]
    fn test_message_role_display() {
        assert_eq!(format!("{}", MessageRole::User), "user");
        assert_eq!(format!("{}", MessageRole::Ai), "ai");
    }

    #[test]
    fn test_session_with_and_without_topic() {
        let with_topic = session(Some("Organic Chemistry"));
        let json = serde_json::to_string(&with_topic).unwrap();
        assert!(json.contains("Organic Chemistry"));
        assert!(json.contains("student_42"));

        let without_topic = session(None);
        let value = serde_json::to_value(&without_topic).unwrap();
        assert_eq!(value["topic"], serde_json::Value::Null);

        let deserialized: Session = serde_json::from_value(value).unwrap();
        assert_eq!(deserialized.topic, None);
        assert_eq!(deserialized.id, without_topic.id);
    }

    #[test]
    fn test_message_serialization() {
        let message = Message {
            id: 7,
            session_id: Uuid::new_v4(),
            role: MessageRole::User,
            content: "I can't get motivated to study".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap(),
        };

        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("motivated"));
        assert!(json.contains("User"));

        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.created_at, message.created_at);
        assert_eq!(deserialized.role, MessageRole::User);
    }

    #[test]
    fn test_study_plan_record_keeps_plan_json() {
        let record = StudyPlanRecord {
            id: 1,
            session_id: Uuid::new_v4(),
            file_path: "study_plans/study_plan_x.json".to_string(),
            plan: json!({ "week1": { "day1": { "topic": "Algebra" } } }),
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["plan"]["week1"]["day1"]["topic"], "Algebra");
    }

    #[test]
    fn test_create_session_payload_topic_is_optional() {
        let payload: CreateSessionPayload = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(payload.topic, None);

        let payload: CreateSessionPayload =
            serde_json::from_str(r#"{"topic": "Physics"}"#).unwrap();
        assert_eq!(payload.topic.as_deref(), Some("Physics"));
    }

    #[test]
    fn test_update_session_status_payload_deserialization() {
        let payload: UpdateSessionStatusPayload =
            serde_json::from_str(r#"{"status": "Ended"}"#).unwrap();
        assert_eq!(payload.status, SessionStatus::Ended);

        let invalid: Result<UpdateSessionStatusPayload, _> =
            serde_json::from_str(r#"{"status": "Paused"}"#);
        assert!(invalid.is_err());
    }

    #[test]
    fn test_capability_entry_from_core() {
        let entry = CapabilityEntry::from(Capability {
            agent: "Burnout_Agent".to_string(),
            description: "Spotting and handling burnout".to_string(),
        });
        assert_eq!(entry.agent, "Burnout_Agent");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("Spotting and handling burnout"));
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Session not found".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"message":"Session not found"}"#);
    }
}
