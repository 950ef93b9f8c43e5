//! Tutor Turn Orchestration
//!
//! Drives one student turn through the agent roster. The main tutor sees the
//! conversation and one delegate tool per specialist; calling a delegate runs
//! that specialist over the same conversation and hands its answer back as
//! the tool result. Specialists in turn may call the function tools they are
//! allowed to use (e.g. saving a study plan).

use crate::{
    TutorEvent,
    llm_client::{LLMAction, LLMClient, LLMStreamEvent, ToolCall},
    roster::{AgentProfile, Roster},
    study_plan::{SAVE_STUDY_PLAN_TOOL, wrap_plan_arguments},
    tools::{ToolHost, parse_arguments},
};
use anyhow::Result;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool,
};
use futures::{StreamExt, future::BoxFuture};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 4;

/// What a completed turn produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The main tutor's reply to the student.
    pub reply: String,
    /// Specialists consulted during the turn, in call order.
    pub consulted: Vec<String>,
}

/// Builds a user message for the conversation history.
pub fn user_message(text: &str) -> Result<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestUserMessageArgs::default()
        .content(text)
        .build()?
        .into())
}

/// Builds an assistant message for the conversation history.
pub fn assistant_message(text: &str) -> Result<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestAssistantMessageArgs::default()
        .content(text)
        .build()?
        .into())
}

/// Per-turn state shared by the main agent and the specialists it consults.
struct TurnContext<'a> {
    tool_host: &'a dyn ToolHost,
    function_tools: Vec<ChatCompletionTool>,
    events: mpsc::Sender<TutorEvent>,
    consulted: Vec<String>,
}

impl TurnContext<'_> {
    async fn emit(&self, event: TutorEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Tutor event receiver dropped.");
        }
    }

    /// The subset of function tools `agent` may call.
    fn tools_for(&self, agent: &AgentProfile) -> Vec<ChatCompletionTool> {
        self.function_tools
            .iter()
            .filter(|t| agent.may_call(&t.function.name))
            .cloned()
            .collect()
    }
}

/// Runs student turns against a roster of agents.
pub struct Tutor {
    llm: Arc<dyn LLMClient>,
    roster: Arc<Roster>,
    max_tool_rounds: usize,
}

impl Tutor {
    /// Creates a tutor. `max_tool_rounds` is clamped to at least one.
    pub fn new(llm: Arc<dyn LLMClient>, roster: Arc<Roster>, max_tool_rounds: usize) -> Self {
        Self {
            llm,
            roster,
            max_tool_rounds: max_tool_rounds.max(1),
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Handles one student turn.
    ///
    /// `history` is the conversation so far, ending with the student's new
    /// message. Progress is reported on `events`; the sender is dropped when
    /// the turn ends, which closes the channel for the receiver.
    pub async fn respond(
        &self,
        history: &[ChatCompletionRequestMessage],
        tool_host: &dyn ToolHost,
        events: mpsc::Sender<TutorEvent>,
    ) -> Result<TurnOutcome> {
        let mut ctx = TurnContext {
            tool_host,
            function_tools: tool_host.list_tools().await?,
            events,
            consulted: Vec::new(),
        };
        let main = self.roster.main();
        let delegates = self.roster.delegate_tools()?;

        let reply = self
            .run_agent(main, history.to_vec(), delegates, true, &mut ctx)
            .await?;

        info!(consulted = ?ctx.consulted, reply_len = reply.len(), "Tutor turn complete");
        Ok(TurnOutcome {
            reply,
            consulted: ctx.consulted,
        })
    }

    /// Runs one agent until it answers with text or runs out of tool rounds.
    ///
    /// Only the main agent (`is_main`) may consult specialists, and only its
    /// answer is streamed to the student.
    fn run_agent<'a>(
        &'a self,
        agent: &'a AgentProfile,
        mut messages: Vec<ChatCompletionRequestMessage>,
        tools: Vec<ChatCompletionTool>,
        is_main: bool,
        ctx: &'a mut TurnContext<'_>,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            for round in 0..self.max_tool_rounds {
                let action = self
                    .llm
                    .decide_action(agent.instructions.clone(), messages.clone(), tools.clone())
                    .await?;

                let tool_calls = match action {
                    LLMAction::TextResponse(text) => {
                        if is_main {
                            ctx.emit(TutorEvent::ResponseChunk(text.clone())).await;
                        }
                        return Ok(text);
                    }
                    LLMAction::ToolCall(tool_calls) => tool_calls,
                };
                info!(
                    agent = %agent.name,
                    round,
                    calls = tool_calls.len(),
                    "Agent requested tools"
                );

                let mut results = Vec::with_capacity(tool_calls.len());
                for call in &tool_calls {
                    let result = self.dispatch(agent, call, &messages, is_main, ctx).await?;
                    results.push(result);
                }

                messages.push(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .tool_calls(tool_calls.clone())
                        .build()?
                        .into(),
                );
                for (call, result) in tool_calls.iter().zip(results) {
                    messages.push(
                        ChatCompletionRequestToolMessageArgs::default()
                            .tool_call_id(call.id.clone())
                            .content(result)
                            .build()?
                            .into(),
                    );
                }
            }

            warn!(
                agent = %agent.name,
                rounds = self.max_tool_rounds,
                "Tool rounds exhausted; requesting final answer"
            );
            let mut stream = self
                .llm
                .stream_after_tools(agent.instructions.clone(), messages)
                .await?;
            let mut full_response = String::new();
            while let Some(event) = stream.next().await {
                let LLMStreamEvent::TextChunk(chunk) = event?;
                if is_main {
                    ctx.emit(TutorEvent::ResponseChunk(chunk.clone())).await;
                }
                full_response.push_str(&chunk);
            }
            Ok(full_response)
        })
    }

    /// Executes one tool call and returns the text to hand back to the model.
    ///
    /// Problems the model can fix (bad arguments, unknown tools, tool errors)
    /// are reported back to it as text; only LLM failures abort the turn.
    async fn dispatch(
        &self,
        agent: &AgentProfile,
        call: &ToolCall,
        messages: &[ChatCompletionRequestMessage],
        is_main: bool,
        ctx: &mut TurnContext<'_>,
    ) -> Result<String> {
        let name = call.function.name.as_str();

        if is_main {
            if let Some(specialist) = self.roster.find(name) {
                return self
                    .consult(specialist, &call.function.arguments, messages, ctx)
                    .await;
            }
        } else if agent.may_call(name) {
            return Ok(self
                .call_function(name, &call.function.arguments, ctx)
                .await);
        }

        warn!(agent = %agent.name, tool = %name, "Model called an unknown function");
        Ok(format!("Error: Function '{}' not found.", name))
    }

    /// Hands the conversation to a specialist and returns its answer.
    async fn consult(
        &self,
        specialist: &AgentProfile,
        raw_arguments: &str,
        messages: &[ChatCompletionRequestMessage],
        ctx: &mut TurnContext<'_>,
    ) -> Result<String> {
        // A bare string is still a usable request.
        let request = match parse_arguments(raw_arguments) {
            Ok(args) => args
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_default(),
            Err(_) => raw_arguments.trim().to_string(),
        };

        info!(agent = %specialist.name, "Consulting specialist");
        ctx.emit(TutorEvent::AgentConsulted {
            agent: specialist.name.clone(),
        })
        .await;
        ctx.consulted.push(specialist.name.clone());

        let mut specialist_messages = messages.to_vec();
        if !request.is_empty() {
            specialist_messages.push(user_message(&request)?);
        }
        let tools = ctx.tools_for(specialist);
        self.run_agent(specialist, specialist_messages, tools, false, ctx)
            .await
    }

    /// Calls a function tool on the host, folding failures into the result text.
    async fn call_function(
        &self,
        name: &str,
        raw_arguments: &str,
        ctx: &TurnContext<'_>,
    ) -> String {
        debug!(tool = %name, arguments = %raw_arguments, "Function tool call");
        let arguments = match parse_arguments(raw_arguments) {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!(tool = %name, error = %e, "Invalid tool arguments");
                return format!("Error: invalid (non-JSON) arguments for {}.", name);
            }
        };
        let arguments = if name == SAVE_STUDY_PLAN_TOOL {
            wrap_plan_arguments(arguments)
        } else {
            arguments
        };

        match ctx.tool_host.call_tool(name, arguments).await {
            Ok(output) if output.is_error => format!("Error: {}", output.text),
            Ok(output) => output.text,
            Err(e) => {
                warn!(tool = %name, error = ?e, "Tool execution failed");
                format!("Error executing function {}: {}", name, e)
            }
        }
    }
}
