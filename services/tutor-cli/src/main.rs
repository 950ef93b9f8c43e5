//! Study Tutor CLI
//!
//! Chat with the multi-agent study tutor from a terminal.

mod chat;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, builder::TypedValueParser};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use tutor_core::{
    provider::{DEFAULT_CHAT_MODEL, Provider, ProviderSettings, build_llm_client},
    roster::Roster,
    study_plan::DEFAULT_STUDY_PLAN_DIR,
    tutor::{DEFAULT_MAX_TOOL_ROUNDS, Tutor},
};

#[derive(Parser, Debug)]
#[command(name = "tutor")]
#[command(author, version, about = "Multi-agent study tutor in your terminal")]
struct Cli {
    /// Chat provider: github, openai or azure
    #[arg(long, env = "LLM_PROVIDER", default_value_t = Provider::GitHubModels)]
    provider: Provider,

    /// Model id (deployment name for azure)
    #[arg(long, env = "CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    model: String,

    /// Directory with prompt overrides (`<key>.md`)
    #[arg(long, env = "PROMPTS_PATH")]
    prompts: Option<PathBuf>,

    /// Where the study plan file is written
    #[arg(long, env = "STUDY_PLAN_DIR", default_value = DEFAULT_STUDY_PLAN_DIR)]
    plan_dir: PathBuf,

    /// Tool-calling rounds per agent before the answer is forced
    #[arg(
        long,
        env = "MAX_TOOL_ROUNDS",
        default_value_t = DEFAULT_MAX_TOOL_ROUNDS,
        value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize)
    )]
    max_tool_rounds: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let settings = ProviderSettings::from_env(cli.provider, cli.model.clone())?;
    let roster = Arc::new(
        Roster::load(cli.prompts.as_deref()).context("Failed to build the agent roster")?,
    );
    let tutor = Tutor::new(build_llm_client(&settings), roster, cli.max_tool_rounds);
    info!(provider = %settings.provider, model = %settings.model, "Tutor ready");

    chat::run(&tutor, cli.plan_dir).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_explicit_arguments() {
        let cli = Cli::try_parse_from([
            "tutor",
            "--provider",
            "azure",
            "--model",
            "tutor-deployment",
            "--prompts",
            "/tmp/prompts",
            "--plan-dir",
            "/tmp/plans",
            "--max-tool-rounds",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.provider, Provider::Azure);
        assert_eq!(cli.model, "tutor-deployment");
        assert_eq!(cli.prompts, Some(PathBuf::from("/tmp/prompts")));
        assert_eq!(cli.plan_dir, PathBuf::from("/tmp/plans"));
        assert_eq!(cli.max_tool_rounds, 2);
    }

    #[test]
    fn test_cli_rejects_bad_values() {
        assert!(Cli::try_parse_from(["tutor", "--provider", "gemini"]).is_err());
        assert!(Cli::try_parse_from(["tutor", "--max-tool-rounds", "0"]).is_err());
    }
}
