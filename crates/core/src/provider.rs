//! Chat Provider Selection
//!
//! Maps a provider name and the process environment onto a ready-to-use
//! `LLMClient`. Every supported backend speaks the OpenAI chat-completions
//! protocol, so the difference is only endpoint, credentials and config type.

use crate::llm_client::{LLMClient, OpenAICompatibleClient};
use async_openai::config::{AzureConfig, OpenAIConfig};
use std::{fmt, str::FromStr, sync::Arc};

pub const GITHUB_MODELS_API_BASE: &str = "https://models.inference.ai.azure.com";
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Unknown provider '{0}', expected one of: github, openai, azure")]
    Unknown(String),
}

/// The supported chat-completion backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Provider {
    #[default]
    GitHubModels,
    OpenAI,
    Azure,
}

impl Provider {
    /// The environment variable holding this provider's credential.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::GitHubModels => "GITHUB_TOKEN",
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Azure => "AZURE_OPENAI_API_KEY",
        }
    }
}

impl FromStr for Provider {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "github" | "github-models" | "github_models" => Ok(Provider::GitHubModels),
            "openai" => Ok(Provider::OpenAI),
            "azure" | "azure-openai" => Ok(Provider::Azure),
            other => Err(ProviderError::Unknown(other.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::GitHubModels => write!(f, "github"),
            Provider::OpenAI => write!(f, "openai"),
            Provider::Azure => write!(f, "azure"),
        }
    }
}

/// Everything needed to build a client for one provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderSettings {
    pub provider: Provider,
    pub api_key: String,
    /// Model id; for Azure this is the deployment name.
    pub model: String,
    pub api_base: String,
    pub api_version: Option<String>,
}

impl ProviderSettings {
    /// Reads credentials and endpoints for `provider` from the environment.
    pub fn from_env(provider: Provider, model: String) -> Result<Self, ProviderError> {
        let api_key = std::env::var(provider.api_key_var())
            .map_err(|_| ProviderError::MissingVar(provider.api_key_var().to_string()))?;

        let (api_base, api_version) = match provider {
            Provider::GitHubModels => (GITHUB_MODELS_API_BASE.to_string(), None),
            Provider::OpenAI => (OPENAI_API_BASE.to_string(), None),
            Provider::Azure => {
                let endpoint = std::env::var("AZURE_OPENAI_ENDPOINT")
                    .map_err(|_| ProviderError::MissingVar("AZURE_OPENAI_ENDPOINT".to_string()))?;
                let version = std::env::var("AZURE_OPENAI_API_VERSION")
                    .unwrap_or_else(|_| DEFAULT_AZURE_API_VERSION.to_string());
                (endpoint, Some(version))
            }
        };

        Ok(Self {
            provider,
            api_key,
            model,
            api_base,
            api_version,
        })
    }
}

/// Builds the `LLMClient` described by `settings`.
pub fn build_llm_client(settings: &ProviderSettings) -> Arc<dyn LLMClient> {
    match settings.provider {
        Provider::GitHubModels | Provider::OpenAI => {
            let config = OpenAIConfig::new()
                .with_api_key(&settings.api_key)
                .with_api_base(&settings.api_base);
            Arc::new(OpenAICompatibleClient::new(config, settings.model.clone()))
        }
        Provider::Azure => {
            let config = AzureConfig::new()
                .with_api_base(&settings.api_base)
                .with_api_key(&settings.api_key)
                .with_deployment_id(&settings.model)
                .with_api_version(
                    settings
                        .api_version
                        .as_deref()
                        .unwrap_or(DEFAULT_AZURE_API_VERSION),
                );
            Arc::new(OpenAICompatibleClient::new(config, settings.model.clone()))
        }
    }
}
