//! Built-in backend presets.
//!
//! A preset names an upstream service, its base URL, the wire format it
//! speaks, and the environment variable its API key is read from. Configs
//! reference a preset by name and override pieces as needed.

/// The wire format an upstream speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// OpenAI Chat Completions: requests and responses are translated.
    OpenAi,
    /// Anthropic Messages: bodies are forwarded untouched.
    Anthropic,
}

impl WireFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(WireFormat::OpenAi),
            "anthropic" => Some(WireFormat::Anthropic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendPreset {
    pub name: &'static str,
    pub base_url: &'static str,
    pub format: WireFormat,
    pub api_key_env: &'static str,
}

const PRESETS: &[BackendPreset] = &[
    BackendPreset {
        name: "grok",
        base_url: "https://api.x.ai/v1",
        format: WireFormat::OpenAi,
        api_key_env: "XAI_API_KEY",
    },
    BackendPreset {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        format: WireFormat::OpenAi,
        api_key_env: "OPENAI_API_KEY",
    },
    BackendPreset {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        format: WireFormat::OpenAi,
        api_key_env: "OPENROUTER_API_KEY",
    },
    BackendPreset {
        name: "deepseek",
        base_url: "https://api.deepseek.com/v1",
        format: WireFormat::OpenAi,
        api_key_env: "DEEPSEEK_API_KEY",
    },
    BackendPreset {
        name: "anthropic",
        base_url: "https://api.anthropic.com",
        format: WireFormat::Anthropic,
        api_key_env: "ANTHROPIC_API_KEY",
    },
];

impl BackendPreset {
    #[must_use]
    pub fn from_name(name: &str) -> Option<&'static BackendPreset> {
        let name = name.to_lowercase();
        PRESETS.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn all() -> &'static [BackendPreset] {
        PRESETS
    }
}
