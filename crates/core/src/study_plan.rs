//! Study Plan Tool Service
//!
//! Exposes the study-plan file to the model through the Model Context
//! Protocol (MCP). The planning agent generates a plan as a JSON object and
//! calls `save_study_plan_to_json`; other agents can read it back with
//! `load_study_plan`.
//!
//! Plans are kept as the JSON object the model produced (key order
//! preserved). `StudyPlan::blocks` offers a lenient typed view for logging
//! and summaries; it never rejects a plan the model chose to write.

use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub const SAVE_STUDY_PLAN_TOOL: &str = "save_study_plan_to_json";
pub const LOAD_STUDY_PLAN_TOOL: &str = "load_study_plan";
pub const DEFAULT_STUDY_PLAN_DIR: &str = "study_plans";
pub const NO_PLAN_SAVED: &str = "No study plan has been saved yet.";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("The study plan is empty; it must contain at least one week")]
    Empty,
}

/// One block of days inside a week (e.g. `"days1and2"`).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct StudyBlock {
    #[serde(alias = "topico")]
    pub topic: String,
    #[serde(default, alias = "subtopicos")]
    pub subtopics: Vec<String>,
    #[serde(default, alias = "meta")]
    pub goal: String,
}

/// A block together with the week and day keys it was found under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledBlock {
    pub week: String,
    pub days: String,
    pub block: StudyBlock,
}

/// A study plan as produced by the model: weeks → day blocks → topics.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyPlan {
    raw: Map<String, Value>,
}

impl StudyPlan {
    /// Accepts any non-empty JSON object.
    pub fn from_map(raw: Map<String, Value>) -> Result<Self, PlanError> {
        if raw.is_empty() {
            return Err(PlanError::Empty);
        }
        Ok(Self { raw })
    }

    /// Number of top-level entries that look like weeks (JSON objects).
    pub fn week_count(&self) -> usize {
        self.raw.values().filter(|v| v.is_object()).count()
    }

    /// Every day block that parses as a `StudyBlock`, in plan order.
    pub fn blocks(&self) -> Vec<ScheduledBlock> {
        self.raw
            .iter()
            .filter_map(|(week, days)| days.as_object().map(|days| (week, days)))
            .flat_map(|(week, days)| {
                days.iter().filter_map(move |(day, block)| {
                    serde_json::from_value::<StudyBlock>(block.clone())
                        .ok()
                        .map(|block| ScheduledBlock {
                            week: week.clone(),
                            days: day.clone(),
                            block,
                        })
                })
            })
            .collect()
    }

    /// Pretty-printed JSON; non-ASCII text is written as-is.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.raw)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.raw)
    }
}

/// Models sometimes pass the plan itself instead of `{"study_plan": plan}`.
/// Wraps the arguments when the wrapper key is missing.
pub fn wrap_plan_arguments(arguments: Map<String, Value>) -> Map<String, Value> {
    if arguments.contains_key("study_plan") {
        return arguments;
    }
    let mut wrapped = Map::new();
    wrapped.insert("study_plan".to_string(), Value::Object(arguments));
    wrapped
}

/// Notification published after a plan has been written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedStudyPlan {
    pub path: PathBuf,
    pub plan: Value,
}

// --- Data Structures for Tools ---

/// Arguments for the `save_study_plan_to_json` tool.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct SaveStudyPlanArgs {
    /// The structured study plan object.
    #[schemars(
        description = "The JSON object with the structured study plan. Keys are weeks ('week1', 'week2', ...); inside each week, keys are day blocks ('days1and2', 'day3', ...); each block has 'topic' (string), 'subtopics' (array of strings) and 'goal' (string)."
    )]
    pub study_plan: Map<String, Value>,
}

// --- Service and Handler Implementation ---

/// MCP tool service that owns one conversation's study-plan file.
pub struct StudyPlanService {
    output_dir: PathBuf,
    file_name: String,
    /// Optional channel for announcing saved plans to the runtime.
    pub plan_tx: Option<mpsc::Sender<SavedStudyPlan>>,
    tool_router: ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for StudyPlanService {
    /// Returns server information and capabilities, advertising tool support.
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tool_router]
impl StudyPlanService {
    /// Creates a service writing to `<output_dir>/<file_name>`.
    pub fn new(
        output_dir: impl Into<PathBuf>,
        file_name: impl Into<String>,
        plan_tx: Option<mpsc::Sender<SavedStudyPlan>>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_name: file_name.into(),
            plan_tx,
            tool_router: Self::tool_router(),
        }
    }

    /// Full path of the plan file this service manages.
    pub fn plan_path(&self) -> PathBuf {
        self.output_dir.join(&self.file_name)
    }

    /// Writes the structured study plan to the conversation's JSON file.
    #[tool(
        description = "Save the generated structured study plan to a local JSON file. Call it ONLY AFTER gathering the student's availability and goals and generating the plan."
    )]
    pub async fn save_study_plan_to_json(
        &self,
        args: Parameters<SaveStudyPlanArgs>,
    ) -> Result<String, String> {
        let plan = StudyPlan::from_map(args.0.study_plan).map_err(|e| e.to_string())?;
        let path = self.plan_path();
        info!(
            path = %path.display(),
            weeks = plan.week_count(),
            blocks = plan.blocks().len(),
            "Executing tool 'save_study_plan_to_json'"
        );

        let write = async {
            tokio::fs::create_dir_all(&self.output_dir).await?;
            let json = plan.to_pretty_json()?;
            tokio::fs::write(&path, json).await?;
            anyhow::Ok(())
        };
        if let Err(e) = write.await {
            error!(path = %path.display(), error = %e, "Failed to save study plan");
            return Err(format!("Error saving the file: {}", e));
        }
        info!(path = %path.display(), "Study plan saved");

        if let Some(tx) = &self.plan_tx {
            let saved = SavedStudyPlan {
                path: path.clone(),
                plan: plan.into_value(),
            };
            if tx.send(saved).await.is_err() {
                warn!("Failed to announce saved study plan: receiver dropped.");
            }
        }

        Ok(format!("Study plan saved successfully to {}", path.display()))
    }

    /// Returns the saved plan for this conversation, if any.
    #[tool(description = "Read the student's saved study plan as JSON, if one has been saved.")]
    pub async fn load_study_plan(&self) -> Result<String, String> {
        let path = self.plan_path();
        info!(path = %path.display(), "Executing tool 'load_study_plan'");
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(NO_PLAN_SAVED.to_string()),
            Err(e) => Err(format!("Error reading the file: {}", e)),
        }
    }
}
