//! Function tools offered to agents, served over an in-process MCP channel.

use anyhow::{Context, Result};
use async_openai::types::{ChatCompletionTool, ChatCompletionToolArgs, FunctionObjectArgs};
use async_trait::async_trait;
use rmcp::{
    ServerHandler, ServiceExt,
    model::{CallToolRequestParam, JsonObject, RawContent},
    service::{RoleClient, RunningService},
};
use tokio::task::JoinHandle;
use tracing::warn;

/// MCP client connected to a tool service.
pub type ToolClient = RunningService<RoleClient, ()>;

/// Result of a single function tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("arguments are not valid JSON: {0}")]
    InvalidJson(String),
    #[error("arguments must be a JSON object")]
    NotAnObject,
}

/// Something that can list and execute function tools on an agent's behalf.
#[async_trait]
pub trait ToolHost: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ChatCompletionTool>>;

    async fn call_tool(&self, name: &str, arguments: JsonObject) -> Result<ToolOutput>;
}

#[async_trait]
impl ToolHost for ToolClient {
    async fn list_tools(&self) -> Result<Vec<ChatCompletionTool>> {
        self.list_all_tools()
            .await?
            .into_iter()
            .map(|t| {
                Ok(ChatCompletionToolArgs::default()
                    .function(
                        FunctionObjectArgs::default()
                            .name(t.name)
                            .description(t.description.unwrap_or_default())
                            .parameters(serde_json::to_value(&*t.input_schema)?)
                            .build()?,
                    )
                    .build()?)
            })
            .collect()
    }

    async fn call_tool(&self, name: &str, arguments: JsonObject) -> Result<ToolOutput> {
        let result = self
            .peer()
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments: Some(arguments),
            })
            .await?;

        let annotated_content = result
            .content
            .context("Tool call returned no content")?
            .pop()
            .context("Content list was empty")?;
        let text = match annotated_content.raw {
            RawContent::Text(text_content) => text_content.text,
            _ => {
                warn!(tool = %name, "Tool returned non-text content");
                "{\"error\": \"Unexpected content type from tool\"}".to_string()
            }
        };
        Ok(ToolOutput {
            text,
            is_error: result.is_error.unwrap_or(false),
        })
    }
}

/// Parses a tool call's argument string into a JSON object.
pub fn parse_arguments(raw: &str) -> Result<JsonObject, ArgumentError> {
    let raw = if raw.trim().is_empty() { "{}" } else { raw };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(ArgumentError::NotAnObject),
        Err(e) => Err(ArgumentError::InvalidJson(e.to_string())),
    }
}

/// Serves `service` on an in-memory duplex pipe and returns a connected client.
///
/// The returned handle owns the server task; abort it when the conversation ends.
pub async fn serve_in_process<S>(service: S) -> Result<(ToolClient, JoinHandle<()>)>
where
    S: ServerHandler,
{
    let (server_transport, client_transport) = tokio::io::duplex(4096);
    let server_handle = tokio::spawn(async move {
        if let Ok(service) = service.serve(server_transport).await {
            let _ = service.waiting().await;
        }
    });
    let client = ().serve(client_transport).await?;
    Ok((client, server_handle))
}
