//! Section extraction for incoming system prompts.
//!
//! Client system prompts interleave static instructions with dynamic
//! sections (environment info, model info, MCP server instructions). The
//! parser pulls those sections out so a custom template can re-insert them
//! around replacement text.

use std::sync::LazyLock;

use regex::Regex;

static ENV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<env>.*?</env>").expect("env regex"));

static MODEL_INFO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)You are powered by the model named.*?Assistant knowledge cutoff is [^\n]+")
        .expect("model info regex")
});

static EXCESS_NEWLINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("newline regex"));

const MCP_HEADER: &str = "# MCP Server Instructions";

/// Dynamic sections extracted from a system prompt. `main_content` is the
/// prompt with the extracted sections removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptSections {
    pub env_info: Option<String>,
    pub model_info: Option<String>,
    pub mcp_instructions: Option<String>,
    pub main_content: String,
}

/// Split a raw system prompt into its dynamic sections and residual content.
pub fn parse_sections(system_text: &str) -> PromptSections {
    let env_info = ENV_RE
        .find(system_text)
        .map(|m| m.as_str().to_string());

    let model_info = MODEL_INFO_RE
        .find(system_text)
        .map(|m| m.as_str().to_string());

    let mcp_instructions = extract_mcp_section(system_text);

    let mut main_content = system_text.to_string();
    for section in [&env_info, &model_info, &mcp_instructions]
        .into_iter()
        .flatten()
    {
        main_content = main_content.replace(section, "");
    }

    PromptSections {
        env_info,
        model_info,
        mcp_instructions,
        main_content: collapse_newlines(&main_content),
    }
}

/// The MCP section runs from its heading to the next `#` heading, an
/// `IMPORTANT:` line, or the end of the prompt.
fn extract_mcp_section(text: &str) -> Option<String> {
    let start = text.find(MCP_HEADER)?;
    let body = &text[start..];

    let end = ["\n#", "\nIMPORTANT:"]
        .iter()
        .filter_map(|marker| body[MCP_HEADER.len()..].find(marker))
        .min()
        .map(|offset| MCP_HEADER.len() + offset)
        .unwrap_or(body.len());

    Some(body[..end].to_string())
}

/// Collapse runs of three or more newlines to a blank line and trim.
pub fn collapse_newlines(text: &str) -> String {
    EXCESS_NEWLINES_RE
        .replace_all(text, "\n\n")
        .trim()
        .to_string()
}
