//! Configuration helpers for OpenAI-compatible local servers.
//!
//! This module provides convenience utilities for configuring connections to
//! local LLM server providers (LM Studio, Ollama, llama.cpp, vLLM) that speak
//! the OpenAI-compatible API. It is independent of [`crate::provider::Provider`]
//! (the backend trait): these are just base-URL/model presets consumed when
//! constructing a [`crate::provider::openai::OpenAiBackend`].
//!
//! ## Environment Variables
//!
//! - `OPEN_AGENT_BASE_URL`: Override base URL for any profile.
//! - `OPEN_AGENT_MODEL`: Override model name (when `prefer_env` is true).
//!
//! Per SPEC_FULL §6, these are opt-in overrides never consulted by the hosted
//! Anthropic/Gemini backends, which always take credentials explicitly at
//! construction.

use std::env;
use std::str::FromStr;

/// A well-known OpenAI-compatible local server profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiServerProfile {
    /// LM Studio - GUI-based local model server (default port 1234).
    LMStudio,
    /// Ollama - CLI-focused local model server (default port 11434).
    Ollama,
    /// llama.cpp - C++ inference engine with server mode (default port 8080).
    LlamaCpp,
    /// vLLM - high-performance inference server (default port 8000).
    VLLM,
}

impl OpenAiServerProfile {
    pub fn default_url(&self) -> &'static str {
        match self {
            OpenAiServerProfile::LMStudio => "http://localhost:1234/v1",
            OpenAiServerProfile::Ollama => "http://localhost:11434/v1",
            OpenAiServerProfile::LlamaCpp => "http://localhost:8080/v1",
            OpenAiServerProfile::VLLM => "http://localhost:8000/v1",
        }
    }
}

impl FromStr for OpenAiServerProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lmstudio" | "lm-studio" | "lm_studio" => Ok(OpenAiServerProfile::LMStudio),
            "ollama" => Ok(OpenAiServerProfile::Ollama),
            "llamacpp" | "llama-cpp" | "llama_cpp" | "llama.cpp" => Ok(OpenAiServerProfile::LlamaCpp),
            "vllm" => Ok(OpenAiServerProfile::VLLM),
            _ => Err(format!("Unknown profile: {}", s)),
        }
    }
}

/// Well-known base URL presets for hosted providers (credentials are still
/// supplied separately; these are endpoint defaults only).
pub mod hosted {
    pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
    pub const ANTHROPIC_VERSION: &str = "2023-06-01";
    pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
    pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
    /// Deepseek and Mistral speak OpenAI's wire format; these are base-URL
    /// presets for `OpenAiBackend`, not separate backends.
    pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
    pub const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";
    /// Ollama's native `/api/chat` endpoint (NDJSON framing), distinct from
    /// [`OpenAiServerProfile::Ollama`]'s `/v1` OpenAI-compatibility shim.
    pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";
}

/// Get the base URL for API requests with environment-variable support.
///
/// Priority: `OPEN_AGENT_BASE_URL` env var > `profile`'s default > `fallback` >
/// LM Studio's default.
pub fn get_base_url(profile: Option<OpenAiServerProfile>, fallback: Option<&str>) -> String {
    if let Ok(url) = env::var("OPEN_AGENT_BASE_URL") {
        return url;
    }

    if let Some(p) = profile {
        return p.default_url().to_string();
    }

    fallback
        .unwrap_or(OpenAiServerProfile::LMStudio.default_url())
        .to_string()
}

/// Get the model name with optional environment-variable override.
pub fn get_model(fallback: Option<&str>, prefer_env: bool) -> Option<String> {
    if prefer_env {
        if let Ok(model) = env::var("OPEN_AGENT_MODEL") {
            return Some(model);
        }
    }

    fallback.map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_default_urls() {
        assert_eq!(OpenAiServerProfile::LMStudio.default_url(), "http://localhost:1234/v1");
        assert_eq!(OpenAiServerProfile::Ollama.default_url(), "http://localhost:11434/v1");
        assert_eq!(OpenAiServerProfile::LlamaCpp.default_url(), "http://localhost:8080/v1");
        assert_eq!(OpenAiServerProfile::VLLM.default_url(), "http://localhost:8000/v1");
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!("lmstudio".parse::<OpenAiServerProfile>(), Ok(OpenAiServerProfile::LMStudio));
        assert_eq!("LM-Studio".parse::<OpenAiServerProfile>(), Ok(OpenAiServerProfile::LMStudio));
        assert_eq!("ollama".parse::<OpenAiServerProfile>(), Ok(OpenAiServerProfile::Ollama));
        assert_eq!("llama.cpp".parse::<OpenAiServerProfile>(), Ok(OpenAiServerProfile::LlamaCpp));
        assert_eq!("vllm".parse::<OpenAiServerProfile>(), Ok(OpenAiServerProfile::VLLM));
        assert!("unknown".parse::<OpenAiServerProfile>().is_err());
    }

    #[test]
    fn test_get_base_url_with_profile() {
        unsafe {
            env::remove_var("OPEN_AGENT_BASE_URL");
        }
        let url = get_base_url(Some(OpenAiServerProfile::Ollama), None);
        assert_eq!(url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_get_base_url_with_fallback() {
        unsafe {
            env::remove_var("OPEN_AGENT_BASE_URL");
        }
        let url = get_base_url(None, Some("http://custom:8080/v1"));
        assert_eq!(url, "http://custom:8080/v1");
    }
}
