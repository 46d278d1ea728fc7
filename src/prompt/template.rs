//! Template application and config-driven rewriting for system prompts.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, Result};

use super::parser::{collapse_newlines, PromptSections};

const ENV_PLACEHOLDER: &str = "{{ENV_INFO}}";
const MODEL_PLACEHOLDER: &str = "{{MODEL_INFO}}";
const MCP_PLACEHOLDER: &str = "{{MCP_INSTRUCTIONS}}";

/// Substitute the extracted dynamic sections into a custom template.
pub fn apply_template(template: &str, sections: &PromptSections) -> String {
    let result = template
        .replace(ENV_PLACEHOLDER, sections.env_info.as_deref().unwrap_or(""))
        .replace(
            MODEL_PLACEHOLDER,
            sections.model_info.as_deref().unwrap_or(""),
        )
        .replace(
            MCP_PLACEHOLDER,
            sections.mcp_instructions.as_deref().unwrap_or(""),
        );

    collapse_newlines(&result)
}

// ---------------------------------------------------------------------------
// Config-driven rewrites
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub remove_claude_references: bool,
    #[serde(default)]
    pub remove_anthropic_references: bool,
    #[serde(default)]
    pub remove_defensive_restrictions: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name_override: Option<String>,
    #[serde(default)]
    pub placeholders: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_help_info: Option<HelpInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelpInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
}

impl PromptConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!(
                "Failed to read prompt config {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }
}

static YOU_ARE_CLAUDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"You are Claude Code[^.]*\.").expect("intro regex"));

static ISSUES_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://github\.com/anthropics/claude-code/issues").expect("issues url regex")
});

static DOCS_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://docs\.anthropic\.com/en/docs/claude-code[^\s]*").expect("docs url regex")
});

static DOCS_SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)When the user directly asks about Claude Code.*?Example: https://docs\.anthropic\.com/en/docs/claude-code/cli-usage\n",
    )
    .expect("docs section regex")
});

static DEFENSIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"IMPORTANT: Assist with defensive security tasks only\.[^.]+\.")
        .expect("defensive regex")
});

static URL_GUESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"IMPORTANT: You must NEVER generate or guess URLs[^.]+\.")
        .expect("url guess regex")
});

static OPUS_MODEL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"claude-opus-4-\d+").expect("model id regex"));

static HELP_SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"If the user asks for help[^:]+:\s*\n(?:- [^\n]+\n)*").expect("help regex")
});

/// Apply the configured transformations to an already-templated prompt.
pub fn apply_config(prompt: &str, config: &PromptConfig) -> String {
    let mut result = prompt.to_string();

    if config.remove_claude_references {
        let system_name = config.system_name.as_deref().unwrap_or("AI Assistant");
        result = result.replace("Claude Code", system_name);
        result = result.replace("claude.ai/code", "");
        let intro = format!(
            "You are {}.",
            config.system_name.as_deref().unwrap_or("an AI assistant")
        );
        result = YOU_ARE_CLAUDE_RE.replace_all(&result, intro.as_str()).into_owned();
    }

    if config.remove_anthropic_references {
        result = result.replace(
            "Anthropic's official CLI for Claude",
            "an advanced AI coding assistant",
        );

        let help = config.custom_help_info.as_ref();
        let feedback_url = help
            .and_then(|h| h.feedback_url.as_deref())
            .unwrap_or("");
        result = ISSUES_URL_RE.replace_all(&result, feedback_url).into_owned();

        let doc_url = help
            .and_then(|h| h.documentation_url.as_deref())
            .unwrap_or("");
        result = DOCS_SECTION_RE.replace_all(&result, "").into_owned();
        result = DOCS_URL_RE.replace_all(&result, doc_url).into_owned();
    }

    if config.remove_defensive_restrictions {
        result = DEFENSIVE_RE.replace_all(&result, "").into_owned();
        result = URL_GUESS_RE.replace_all(&result, "").into_owned();
    }

    if let Some(ref model_name) = config.model_name_override {
        result = result.replace("Opus 4", model_name);
        let model_id = model_name.to_lowercase().replace(' ', "-");
        result = OPUS_MODEL_ID_RE
            .replace_all(&result, model_id.as_str())
            .into_owned();
    }

    for (placeholder, value) in &config.placeholders {
        result = result.replace(placeholder, value);
    }

    if let Some(ref help) = config.custom_help_info {
        if help.help_command.is_some() || help.feedback_url.is_some() {
            let mut section =
                String::from("If the user asks for help or wants to give feedback inform them of the following:\n");
            if let Some(ref cmd) = help.help_command {
                section.push_str(&format!("- {cmd}: Get help\n"));
            }
            if let Some(ref url) = help.feedback_url {
                section.push_str(&format!("- To give feedback: {url}\n"));
            }
            result = HELP_SECTION_RE
                .replace_all(&result, section.as_str())
                .into_owned();
        }
    }

    collapse_newlines(&result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::parser::parse_sections;

    #[test]
    fn template_substitutes_sections() {
        let sections = parse_sections(
            "intro\n<env>\nPlatform: linux\n</env>\nYou are powered by the model named X. \
             Assistant knowledge cutoff is January 2025.",
        );
        let result = apply_template(
            "Custom persona.\n\n{{ENV_INFO}}\n\n{{MODEL_INFO}}\n\n{{MCP_INSTRUCTIONS}}",
            &sections,
        );

        assert!(result.starts_with("Custom persona."));
        assert!(result.contains("<env>"));
        assert!(result.contains("knowledge cutoff"));
        // Empty MCP placeholder leaves no triple newlines behind.
        assert!(!result.contains("\n\n\n"));
        assert!(!result.contains("{{"));
    }

    #[test]
    fn claude_references_are_scrubbed() {
        let config = PromptConfig {
            remove_claude_references: true,
            system_name: Some("DevBot".to_string()),
            ..PromptConfig::default()
        };
        let result = apply_config(
            "Claude Code is a CLI. Visit claude.ai/code for more.",
            &config,
        );
        assert!(result.contains("DevBot is a CLI."));
        assert!(!result.contains("Claude Code"));
        assert!(!result.contains("claude.ai/code"));
    }

    #[test]
    fn model_name_override_rewrites_both_forms() {
        let config = PromptConfig {
            model_name_override: Some("Grok 4".to_string()),
            ..PromptConfig::default()
        };
        let result = apply_config(
            "You are powered by Opus 4. The exact model ID is claude-opus-4-20250514.",
            &config,
        );
        assert!(result.contains("powered by Grok 4"));
        assert!(result.contains("model ID is grok-4"));
    }

    #[test]
    fn custom_placeholders_are_replaced() {
        let mut placeholders = HashMap::new();
        placeholders.insert("{{COMPANY}}".to_string(), "Acme".to_string());
        let config = PromptConfig {
            placeholders,
            ..PromptConfig::default()
        };
        assert_eq!(apply_config("Built by {{COMPANY}}.", &config), "Built by Acme.");
    }

    #[test]
    fn help_section_is_replaced() {
        let config = PromptConfig {
            custom_help_info: Some(HelpInfo {
                help_command: Some("/assist".to_string()),
                feedback_url: Some("https://example.com/feedback".to_string()),
                documentation_url: None,
            }),
            ..PromptConfig::default()
        };
        let prompt = "If the user asks for help or wants to give feedback inform them of the following:\n\
- /help: Get help with using Claude Code\n\
- To give feedback, users should report the issue\n\
Other text.";
        let result = apply_config(prompt, &config);
        assert!(result.contains("- /assist: Get help"));
        assert!(result.contains("https://example.com/feedback"));
        assert!(!result.contains("/help: Get help with using"));
        assert!(result.contains("Other text."));
    }

    #[test]
    fn defensive_restrictions_are_removed() {
        let config = PromptConfig {
            remove_defensive_restrictions: true,
            ..PromptConfig::default()
        };
        let prompt = "IMPORTANT: Assist with defensive security tasks only. Refuse other work.\nBody.";
        let result = apply_config(prompt, &config);
        assert!(!result.contains("defensive security"));
        assert!(result.contains("Body."));
    }

    #[test]
    fn default_config_is_a_noop_apart_from_newline_collapse() {
        let config = PromptConfig::default();
        assert_eq!(apply_config("Claude Code stays.", &config), "Claude Code stays.");
    }

    #[test]
    fn load_rejects_missing_file() {
        assert!(PromptConfig::load(Path::new("/nonexistent/prompt.json")).is_err());
    }

    #[test]
    fn load_parses_json() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"remove_claude_references": true, "system_name": "DevBot"}}"#
        )
        .unwrap();
        let config = PromptConfig::load(file.path()).unwrap();
        assert!(config.remove_claude_references);
        assert_eq!(config.system_name.as_deref(), Some("DevBot"));
    }
}
