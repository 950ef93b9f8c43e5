pub mod llm_client;
pub mod provider;
pub mod roster;
pub mod study_plan;
pub mod tools;
pub mod tutor;

/// Progress notifications emitted while the tutor works on a student turn.
///
/// The runtime (WebSocket session, terminal loop) decides how to surface them;
/// the orchestration only produces them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TutorEvent {
    /// The main tutor handed the request to a specialist agent.
    AgentConsulted { agent: String },
    /// A piece of the main tutor's reply text.
    ResponseChunk(String),
}
