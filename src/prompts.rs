use crate::config::Config;
use crate::session::SessionKind;

const BASE_PROMPT: &str = include_str!("prompts/system.md");

/// Text sent alongside the first screenshot of a conversation.
pub const SCREENSHOT_CUE: &str = "This is a screenshot.";

/// Text sent alongside every appended screenshot.
pub const CONTINUATION_CUE: &str = "This is the next part of the screenshot. Combine it with all previous screenshots and your earlier analysis, and continue answering the whole problem completely without leaving anything out.";

const MULTI_SCREENSHOT_NOTE: &str = "Note: if there are several screenshots, analyse them together as one problem and do not skip any part.";

/// Heavy separator before the first appended answer and before follow-ups.
pub const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Light spacer between consecutive appended answers.
pub const APPEND_SPACER: &str = "\n\n";

pub fn system_prompt(config: &Config, kind: &SessionKind) -> String {
    if !config.custom_prompt.trim().is_empty() {
        return config.custom_prompt.clone();
    }

    let mut prompt = format!(
        "{}\nAnswer using the programming language: {}.",
        BASE_PROMPT.trim(),
        config.code_language
    );
    if matches!(kind, SessionKind::Append) {
        prompt.push_str("\n\n");
        prompt.push_str(MULTI_SCREENSHOT_NOTE);
    }
    prompt
}
