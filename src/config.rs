use crate::backends::{BackendPreset, WireFormat};
use crate::error::{ProxyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    pub backend: BackendConfig,
    /// Requested model id -> backend model id. Unmapped models pass through.
    #[serde(default)]
    pub models: HashMap<String, String>,
    #[serde(default)]
    pub params: ParamsConfig,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub prompt: PromptSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamsConfig {
    /// Top-level keys removed from the outbound request JSON. Some backends
    /// reject fields they don't implement (xAI rejects `tool_choice`).
    #[serde(default)]
    pub drop: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
    /// Per-request disk capture of request/response/metadata JSON.
    #[serde(default = "default_audit")]
    pub audit: bool,
    #[serde(default = "default_audit_dir")]
    pub audit_dir: PathBuf,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            audit: default_audit(),
            audit_dir: default_audit_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptSettings {
    /// Custom system-prompt template; rewriting is off when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

fn default_port() -> u16 {
    8000
}

fn default_log_file() -> PathBuf {
    PathBuf::from("unified-proxy.log")
}

fn default_audit() -> bool {
    true
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from("logs/requests")
}

impl ProxyConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        let candidates = config_search_paths();
        for candidate in &candidates {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        Err(ProxyError::config(format!(
            "No config file found. Searched: {}",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    fn preset(&self) -> Option<&'static BackendPreset> {
        BackendPreset::from_name(&self.backend.name)
    }

    /// The effective base URL (config override or backend preset default).
    pub fn effective_base_url(&self) -> Result<String> {
        if let Some(ref url) = self.backend.base_url {
            return Ok(url.clone());
        }

        let preset = self.preset().ok_or_else(|| {
            ProxyError::config(format!(
                "Unknown backend '{}' and no base_url configured. Known backends: {}",
                self.backend.name,
                BackendPreset::all()
                    .iter()
                    .map(|p| p.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;

        Ok(preset.base_url.to_string())
    }

    /// Resolve the API key from the configured environment variable.
    pub fn resolve_api_key(&self) -> Result<String> {
        let env_name = self
            .backend
            .api_key_env
            .clone()
            .or_else(|| self.preset().map(|p| p.api_key_env.to_string()))
            .unwrap_or_else(|| "API_KEY".to_string());

        std::env::var(&env_name).map_err(|_| {
            ProxyError::config(format!(
                "Environment variable '{env_name}' not set. Set it with your backend API key."
            ))
        })
    }

    /// The wire format the backend speaks: translated Chat Completions or
    /// Anthropic passthrough.
    pub fn wire_format(&self) -> WireFormat {
        if let Some(ref fmt) = self.backend.format {
            if let Some(parsed) = WireFormat::parse(fmt) {
                return parsed;
            }
        }

        self.preset()
            .map(|p| p.format)
            .unwrap_or(WireFormat::OpenAi)
    }

    /// The backend model id a requested model maps to.
    pub fn target_model(&self, requested: &str) -> String {
        self.models
            .get(requested)
            .cloned()
            .unwrap_or_else(|| requested.to_string())
    }
}

fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from("unified-proxy.toml"));

    // XDG / platform config dir
    if cfg!(target_os = "macos") {
        if let Some(home) = home_dir() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join("unified-proxy")
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("unified-proxy").join("config.toml"));
        }
        if let Some(home) = home_dir() {
            paths.push(home.join(".config").join("unified-proxy").join("config.toml"));
        }
    }

    // Home directory fallback
    if let Some(home) = home_dir() {
        paths.push(home.join(".unified-proxy.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
