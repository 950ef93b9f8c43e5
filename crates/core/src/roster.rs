//! Tutor Agent Roster
//!
//! Defines the main tutor agent and the specialist agents it can consult.
//! Specialists are exposed to the main agent as function tools named after
//! the agent, so the model itself decides when a hand-off is appropriate.
//! Each agent's instructions come from a Markdown prompt; built-in prompts
//! are compiled in and can be overridden from a prompts directory.

use anyhow::Context;
use async_openai::{
    error::OpenAIError,
    types::{ChatCompletionTool, ChatCompletionToolArgs, FunctionObjectArgs},
};
use fuzzy_matcher::{FuzzyMatcher, skim::SkimMatcherV2};
use serde::Serialize;
use serde_json::json;
use std::{collections::HashMap, fs, path::Path};

use crate::study_plan::{LOAD_STUDY_PLAN_TOOL, SAVE_STUDY_PLAN_TOOL};

pub const MAIN_AGENT_NAME: &str = "Main_Tutor_Agent";
pub const MAIN_PROMPT_KEY: &str = "main_tutor";
pub const SPECIALISTS_PLACEHOLDER: &str = "{specialists}";
pub const CAPABILITIES_TITLE: &str = "AI Agent tutor can do for you";
pub const WELCOME_MESSAGE: &str = "Hello! What would you like to study today?";

/// Fuzzy matches below this score are treated as no match.
const MIN_FUZZY_SCORE: i64 = 40;
const MIN_FUZZY_PATTERN_LEN: usize = 4;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RosterError {
    #[error("Prompt '{0}' is empty")]
    EmptyPrompt(String),
    #[error("Prompt '{key}' must contain the {placeholder} placeholder")]
    MissingPlaceholder {
        key: String,
        placeholder: &'static str,
    },
}

struct SpecialistSpec {
    name: &'static str,
    prompt_key: &'static str,
    capability: &'static str,
    handoff_hint: &'static str,
    tools: &'static [&'static str],
    default_prompt: &'static str,
}

const DEFAULT_MAIN_PROMPT: &str = include_str!("../../../prompts/main_tutor.md");

const SPECIALISTS: &[SpecialistSpec] = &[
    SpecialistSpec {
        name: "Motivation_Agent",
        prompt_key: "motivation",
        capability: "Check if the student is unmotivated",
        handoff_hint: "If you notice the student is unmotivated",
        tools: &[],
        default_prompt: include_str!("../../../prompts/motivation.md"),
    },
    SpecialistSpec {
        name: "Planning_Agent",
        prompt_key: "planning",
        capability: "Create personalized and structured study plan",
        handoff_hint: "If you notice the student needs help planning their studies",
        tools: &[SAVE_STUDY_PLAN_TOOL, LOAD_STUDY_PLAN_TOOL],
        default_prompt: include_str!("../../../prompts/planning.md"),
    },
    SpecialistSpec {
        name: "Bullying_Support_Agent",
        prompt_key: "bullying",
        capability: "Check if the student is a victim of bullying",
        handoff_hint: "If you suspect the student is a victim of bullying",
        tools: &[],
        default_prompt: include_str!("../../../prompts/bullying.md"),
    },
    SpecialistSpec {
        name: "Self_Harm_Prevention_Agent",
        prompt_key: "self_harm_prevention",
        capability: "Check if the student is having suicidal thoughts",
        handoff_hint: "If you notice the student is having suicidal thoughts, feelings, or behaviors",
        tools: &[],
        default_prompt: include_str!("../../../prompts/self_harm_prevention.md"),
    },
    SpecialistSpec {
        name: "Burnout_Support_Agent",
        prompt_key: "burnout",
        capability: "Check if the student is experiencing burnout",
        handoff_hint: "If you notice the student is experiencing physical or mental exhaustion (burnout)",
        tools: &[],
        default_prompt: include_str!("../../../prompts/burnout.md"),
    },
    SpecialistSpec {
        name: "Quiz_Simulation_Agent",
        prompt_key: "quiz_simulation",
        capability: "Create simulations/quizzes for students",
        handoff_hint: "If the student wants to take a practice exam or quiz on specific topics",
        tools: &[LOAD_STUDY_PLAN_TOOL],
        default_prompt: include_str!("../../../prompts/quiz_simulation.md"),
    },
    SpecialistSpec {
        name: "Conflict_Resolution_Agent",
        prompt_key: "conflict_resolution",
        capability: "Check if the student has a conflict with teachers or family",
        handoff_hint: "If the student indicates they have a conflict with teachers or family",
        tools: &[],
        default_prompt: include_str!("../../../prompts/conflict_resolution.md"),
    },
    SpecialistSpec {
        name: "Progress_Monitoring_Agent",
        prompt_key: "progress_monitoring",
        capability: "Check student progress",
        handoff_hint: "If the student wants to check their progress",
        tools: &[LOAD_STUDY_PLAN_TOOL],
        default_prompt: include_str!("../../../prompts/progress_monitoring.md"),
    },
    SpecialistSpec {
        name: "Evaluation_Content_Agent",
        prompt_key: "text_evaluation",
        capability: "Evaluate student text",
        handoff_hint: "If the student wants a text they wrote to be evaluated",
        tools: &[],
        default_prompt: include_str!("../../../prompts/text_evaluation.md"),
    },
];

/// A fully resolved agent: name, instructions and the function tools it may call.
#[derive(Debug, Clone, Serialize)]
pub struct AgentProfile {
    pub name: String,
    pub instructions: String,
    pub capability: String,
    pub handoff_hint: String,
    pub tools: Vec<String>,
}

impl AgentProfile {
    /// Whether this agent is allowed to call the function tool `tool`.
    pub fn may_call(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }
}

/// One entry of the student-facing capability list.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Capability {
    pub agent: String,
    pub description: String,
}

/// The main tutor together with its specialists.
#[derive(Debug, Clone)]
pub struct Roster {
    main: AgentProfile,
    specialists: Vec<AgentProfile>,
}

impl Roster {
    /// Builds the roster, taking each agent's prompt from `prompts` when
    /// present and falling back to the built-in prompt otherwise.
    pub fn from_prompts(prompts: &HashMap<String, String>) -> Result<Self, RosterError> {
        let prompt_for = |key: &str, default: &str| -> Result<String, RosterError> {
            let prompt = prompts.get(key).map(String::as_str).unwrap_or(default).trim();
            if prompt.is_empty() {
                return Err(RosterError::EmptyPrompt(key.to_string()));
            }
            Ok(prompt.to_string())
        };

        let specialists = SPECIALISTS
            .iter()
            .map(|spec| {
                Ok(AgentProfile {
                    name: spec.name.to_string(),
                    instructions: prompt_for(spec.prompt_key, spec.default_prompt)?,
                    capability: spec.capability.to_string(),
                    handoff_hint: spec.handoff_hint.to_string(),
                    tools: spec.tools.iter().map(|t| t.to_string()).collect(),
                })
            })
            .collect::<Result<Vec<_>, RosterError>>()?;

        let template = prompt_for(MAIN_PROMPT_KEY, DEFAULT_MAIN_PROMPT)?;
        if !template.contains(SPECIALISTS_PLACEHOLDER) {
            return Err(RosterError::MissingPlaceholder {
                key: MAIN_PROMPT_KEY.to_string(),
                placeholder: SPECIALISTS_PLACEHOLDER,
            });
        }
        let handoffs = specialists
            .iter()
            .map(|s| format!("- {}, consult '{}'.", s.handoff_hint, s.name))
            .collect::<Vec<_>>()
            .join("\n");

        let main = AgentProfile {
            name: MAIN_AGENT_NAME.to_string(),
            instructions: template.replace(SPECIALISTS_PLACEHOLDER, &handoffs),
            capability: String::new(),
            handoff_hint: String::new(),
            tools: Vec::new(),
        };

        Ok(Self { main, specialists })
    }

    /// Builds the roster from a prompts directory, or from the built-in
    /// prompts alone when `prompts_path` is `None`.
    pub fn load(prompts_path: Option<&Path>) -> anyhow::Result<Self> {
        let prompts = match prompts_path {
            Some(path) => load_prompts(path)
                .with_context(|| format!("Failed to read prompts from {}", path.display()))?,
            None => HashMap::new(),
        };
        Ok(Self::from_prompts(&prompts)?)
    }

    pub fn main(&self) -> &AgentProfile {
        &self.main
    }

    pub fn specialists(&self) -> &[AgentProfile] {
        &self.specialists
    }

    /// Resolves a specialist from the name the model used in a tool call.
    ///
    /// Tries an exact match, then a case-insensitive one, then a fuzzy match
    /// that must be both strong enough and unambiguous.
    pub fn find(&self, name: &str) -> Option<&AgentProfile> {
        if let Some(agent) = self.specialists.iter().find(|a| a.name == name) {
            return Some(agent);
        }
        if let Some(agent) = self
            .specialists
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
        {
            return Some(agent);
        }

        let pattern = name.trim().to_lowercase().replace([' ', '-'], "_");
        if pattern.len() < MIN_FUZZY_PATTERN_LEN {
            return None;
        }
        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, &AgentProfile)> = self
            .specialists
            .iter()
            .filter_map(|a| matcher.fuzzy_match(&a.name, &pattern).map(|s| (s, a)))
            .filter(|(score, _)| *score >= MIN_FUZZY_SCORE)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        match scored.as_slice() {
            [(_, best)] => Some(*best),
            [(top, best), (runner_up, _), ..] if top > runner_up => Some(*best),
            _ => None,
        }
    }

    /// One function tool per specialist, for the main agent.
    pub fn delegate_tools(&self) -> Result<Vec<ChatCompletionTool>, OpenAIError> {
        self.specialists
            .iter()
            .map(|agent| {
                ChatCompletionToolArgs::default()
                    .function(
                        FunctionObjectArgs::default()
                            .name(agent.name.clone())
                            .description(format!(
                                "Consult the {} specialist. Use it for: {}.",
                                agent.name,
                                agent.capability.to_lowercase()
                            ))
                            .parameters(json!({
                                "type": "object",
                                "properties": {
                                    "message": {
                                        "type": "string",
                                        "description": "What the student needs from this specialist, with the relevant context."
                                    }
                                },
                                "required": ["message"]
                            }))
                            .build()?,
                    )
                    .build()
            })
            .collect()
    }

    /// The student-facing list of what the tutor can do.
    pub fn capabilities(&self) -> Vec<Capability> {
        self.specialists
            .iter()
            .map(|a| Capability {
                agent: a.name.clone(),
                description: a.capability.clone(),
            })
            .collect()
    }
}

/// Reads every `*.md` file in `prompts_path` into a map keyed by file stem.
pub fn load_prompts(prompts_path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in fs::read_dir(prompts_path)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> Roster {
        Roster::from_prompts(&HashMap::new()).unwrap()
    }

    #[test]
    fn test_builtin_roster_has_all_specialists_in_order() {
        let roster = builtin();
        let names: Vec<&str> = roster.specialists().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Motivation_Agent",
                "Planning_Agent",
                "Bullying_Support_Agent",
                "Self_Harm_Prevention_Agent",
                "Burnout_Support_Agent",
                "Quiz_Simulation_Agent",
                "Conflict_Resolution_Agent",
                "Progress_Monitoring_Agent",
                "Evaluation_Content_Agent",
            ]
        );
        assert_eq!(roster.main().name, MAIN_AGENT_NAME);
    }

    #[test]
    fn test_main_prompt_lists_every_specialist() {
        let roster = builtin();
        let instructions = &roster.main().instructions;
        assert!(!instructions.contains(SPECIALISTS_PLACEHOLDER));
        for agent in roster.specialists() {
            assert!(
                instructions.contains(&format!("consult '{}'", agent.name)),
                "main prompt does not mention {}",
                agent.name
            );
        }
    }

    #[test]
    fn test_prompt_override_replaces_builtin() {
        let mut prompts = HashMap::new();
        prompts.insert("burnout".to_string(), "Take a nap.".to_string());
        let roster = Roster::from_prompts(&prompts).unwrap();
        let burnout = roster.find("Burnout_Support_Agent").unwrap();
        assert_eq!(burnout.instructions, "Take a nap.");
    }

    #[test]
    fn test_main_prompt_without_placeholder_is_rejected() {
        let mut prompts = HashMap::new();
        prompts.insert(MAIN_PROMPT_KEY.to_string(), "You are a tutor.".to_string());
        let err = Roster::from_prompts(&prompts).unwrap_err();
        assert_eq!(
            err,
            RosterError::MissingPlaceholder {
                key: MAIN_PROMPT_KEY.to_string(),
                placeholder: SPECIALISTS_PLACEHOLDER,
            }
        );
    }

    #[test]
    fn test_empty_prompt_is_rejected() {
        let mut prompts = HashMap::new();
        prompts.insert("planning".to_string(), "  \n".to_string());
        assert_eq!(
            Roster::from_prompts(&prompts).unwrap_err(),
            RosterError::EmptyPrompt("planning".to_string())
        );
    }

    #[test]
    fn test_find_exact_and_case_insensitive() {
        let roster = builtin();
        assert_eq!(roster.find("Planning_Agent").unwrap().name, "Planning_Agent");
        assert_eq!(roster.find("planning_agent").unwrap().name, "Planning_Agent");
    }

    #[test]
    fn test_find_fuzzy() {
        let roster = builtin();
        assert_eq!(roster.find("motivation").unwrap().name, "Motivation_Agent");
        assert_eq!(
            roster.find("quiz simulation").unwrap().name,
            "Quiz_Simulation_Agent"
        );
    }

    #[test]
    fn test_find_rejects_unknown_and_short_names() {
        let roster = builtin();
        assert!(roster.find("save_study_plan_to_json").is_none());
        assert!(roster.find("ag").is_none());
        assert!(roster.find(MAIN_AGENT_NAME).is_none());
    }

    #[test]
    fn test_tool_permissions() {
        let roster = builtin();
        let planning = roster.find("Planning_Agent").unwrap();
        assert!(planning.may_call(SAVE_STUDY_PLAN_TOOL));
        assert!(planning.may_call(LOAD_STUDY_PLAN_TOOL));
        let quiz = roster.find("Quiz_Simulation_Agent").unwrap();
        assert!(!quiz.may_call(SAVE_STUDY_PLAN_TOOL));
        assert!(quiz.may_call(LOAD_STUDY_PLAN_TOOL));
        assert!(roster.find("Motivation_Agent").unwrap().tools.is_empty());
    }

    #[test]
    fn test_delegate_tools_match_specialists() {
        let roster = builtin();
        let tools = roster.delegate_tools().unwrap();
        assert_eq!(tools.len(), roster.specialists().len());
        assert_eq!(tools[1].function.name, "Planning_Agent");
        let params = tools[1].function.parameters.as_ref().unwrap();
        assert_eq!(params["required"][0], "message");
    }

    #[test]
    fn test_capabilities() {
        let capabilities = builtin().capabilities();
        assert_eq!(capabilities.len(), 9);
        assert!(capabilities.contains(&Capability {
            agent: "Evaluation_Content_Agent".to_string(),
            description: "Evaluate student text".to_string(),
        }));
    }

    #[test]
    fn test_load_prompts_reads_markdown_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("motivation.md"), "Cheer them on.").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let prompts = load_prompts(dir.path()).unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts["motivation"], "Cheer them on.");

        let roster = Roster::load(Some(dir.path())).unwrap();
        assert_eq!(
            roster.find("Motivation_Agent").unwrap().instructions,
            "Cheer them on."
        );
    }
}
