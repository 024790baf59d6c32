//! Configuration Module
//!
//! Resolves which LLM provider to talk to and with what credentials.
//! Precedence: explicit flags, then environment, then defaults.

use crate::error::{LodestarError, Result};
use crate::llm::{GeminiGateway, LlmGateway, OpenAiGateway};
use std::str::FromStr;
use std::sync::Arc;

pub const PROVIDER_ENV: &str = "LODESTAR_PROVIDER";
pub const MODEL_ENV: &str = "LODESTAR_MODEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    OpenAi,
    Gemini,
}

impl FromStr for Provider {
    type Err = LodestarError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "openai" | "open-ai" | "gpt" => Ok(Provider::OpenAi),
            "gemini" | "google" => Ok(Provider::Gemini),
            other => Err(LodestarError::Config(format!(
                "unknown LLM provider '{}' (expected 'openai' or 'gemini')",
                other
            ))),
        }
    }
}

impl Provider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4",
            Provider::Gemini => "gemini-1.5-pro",
        }
    }

    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: String,
}

impl LlmConfig {
    pub fn resolve(
        provider: Option<&str>,
        model: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<Self> {
        let provider = match provider {
            Some(p) => p.parse()?,
            None => match std::env::var(PROVIDER_ENV) {
                Ok(v) => v.parse()?,
                Err(_) => Provider::default(),
            },
        };
        let model = model
            .map(str::to_string)
            .or_else(|| std::env::var(MODEL_ENV).ok())
            .unwrap_or_else(|| provider.default_model().to_string());
        let api_key = api_key
            .map(str::to_string)
            .or_else(|| std::env::var(provider.api_key_var()).ok())
            .ok_or_else(|| {
                LodestarError::Config(format!(
                    "no API key found: set {} or pass --api-key",
                    provider.api_key_var()
                ))
            })?;
        Ok(Self {
            provider,
            model,
            api_key,
        })
    }

    pub fn build_gateway(&self) -> Arc<dyn LlmGateway> {
        match self.provider {
            Provider::OpenAi => Arc::new(OpenAiGateway::new(
                self.api_key.clone(),
                self.model.clone(),
            )),
            Provider::Gemini => Arc::new(GeminiGateway::new(
                self.api_key.clone(),
                self.model.clone(),
            )),
        }
    }
}
