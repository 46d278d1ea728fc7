//! System-prompt rewriting.
//!
//! Dynamic sections of an incoming system prompt are extracted, re-inserted
//! into a user-supplied template, and optionally rewritten per a JSON config.
//! The result is an opaque string handed to request conversion; the
//! converter itself never touches prompt text.

pub mod parser;
pub mod template;

use std::path::Path;

use crate::config::PromptSettings;
use crate::error::{ProxyError, Result};

pub use parser::{parse_sections, PromptSections};
pub use template::{apply_config, apply_template, HelpInfo, PromptConfig};

/// A loaded template plus optional rewrite config, applied at request ingress.
#[derive(Debug, Clone)]
pub struct PromptResolver {
    template: String,
    config: Option<PromptConfig>,
}

impl PromptResolver {
    /// Build a resolver from the configured template/config paths. Returns
    /// `None` when no template is configured.
    pub fn from_settings(settings: &PromptSettings) -> Result<Option<Self>> {
        let Some(ref template_path) = settings.template_file else {
            return Ok(None);
        };

        let template = std::fs::read_to_string(template_path).map_err(|e| {
            ProxyError::config(format!(
                "Failed to read prompt template {}: {}",
                template_path.display(),
                e
            ))
        })?;

        let config = match settings.config_file {
            Some(ref path) if path.exists() => Some(PromptConfig::load(path)?),
            _ => None,
        };

        Ok(Some(Self { template, config }))
    }

    pub fn from_parts(template: impl Into<String>, config: Option<PromptConfig>) -> Self {
        Self {
            template: template.into(),
            config,
        }
    }

    /// Resolve a raw system prompt to its rewritten form.
    pub fn resolve(&self, raw_system_text: &str) -> String {
        let sections = parse_sections(raw_system_text);
        let templated = apply_template(&self.template, &sections);
        match self.config {
            Some(ref config) => apply_config(&templated, config),
            None => templated,
        }
    }
}

/// Convenience entry point matching the collaborator interface: raw text in,
/// resolved prompt out.
pub fn resolve_system_prompt(
    raw_system_text: &str,
    template: &str,
    config_file: Option<&Path>,
) -> Result<String> {
    let config = match config_file {
        Some(path) => Some(PromptConfig::load(path)?),
        None => None,
    };
    Ok(PromptResolver::from_parts(template, config).resolve(raw_system_text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_preserves_dynamic_sections() {
        let resolver = PromptResolver::from_parts(
            "You are a custom agent.\n\n{{ENV_INFO}}",
            None,
        );
        let resolved = resolver.resolve(
            "You are the stock agent.\n<env>\nPlatform: linux\n</env>\nBe helpful.",
        );
        assert!(resolved.starts_with("You are a custom agent."));
        assert!(resolved.contains("<env>"));
        assert!(!resolved.contains("stock agent"));
    }

    #[test]
    fn resolver_applies_config_pass() {
        let config = PromptConfig {
            remove_claude_references: true,
            system_name: Some("DevBot".to_string()),
            ..PromptConfig::default()
        };
        let resolver =
            PromptResolver::from_parts("{{ENV_INFO}}\nClaude Code helps you.", Some(config));
        let resolved = resolver.resolve("ignored");
        assert_eq!(resolved, "DevBot helps you.");
    }
}
