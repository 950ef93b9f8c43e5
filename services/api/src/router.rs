//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        CapabilitiesResponse, CapabilityEntry, CreateSessionPayload, ErrorResponse, Message,
        MessageRole, Session, SessionStatus, StudyPlanRecord, UpdateSessionStatusPayload,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, patch},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_session,
        handlers::list_sessions,
        handlers::get_session,
        handlers::update_session_status,
        handlers::get_session_messages,
        handlers::get_study_plan,
        handlers::get_capabilities,
    ),
    components(
        schemas(
            Session, Message, StudyPlanRecord, CreateSessionPayload, UpdateSessionStatusPayload,
            CapabilitiesResponse, CapabilityEntry, ErrorResponse, SessionStatus, MessageRole
        )
    ),
    tags(
        (name = "Study Tutor API", description = "Sessions, history and study plans for the multi-agent study tutor")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route(
            "/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route("/sessions/{id}", get(handlers::get_session))
        .route(
            "/sessions/{id}/status",
            patch(handlers::update_session_status),
        )
        .route("/sessions/{id}/messages", get(handlers::get_session_messages))
        .route("/sessions/{id}/study-plan", get(handlers::get_study_plan))
        .route("/capabilities", get(handlers::get_capabilities))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/sessions",
            "/sessions/{id}",
            "/sessions/{id}/status",
            "/sessions/{id}/messages",
            "/sessions/{id}/study-plan",
            "/capabilities",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing path {}", path);
        }
        let schemas = &doc.components.as_ref().unwrap().schemas;
        assert!(schemas.contains_key("StudyPlanRecord"));
        assert!(schemas.contains_key("CapabilitiesResponse"));
    }
}
