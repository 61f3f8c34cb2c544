use crate::error::ResearchError;
use crate::llm::generate::Generator;
use crate::models::ChatMessage;

pub const MAX_TITLE_CHARS: usize = 80;

/// Ask the model for a short conversation title.
///
/// Errors are returned as-is; the caller picks the fallback.
pub async fn generate_title(
    generator: &dyn Generator,
    messages: &[ChatMessage],
) -> Result<String, ResearchError> {
    if messages.is_empty() {
        return Err(ResearchError::InvalidInput(
            "cannot title an empty conversation".to_string(),
        ));
    }

    let transcript: String = messages
        .iter()
        .map(|m| format!("{}: {}\n", m.role, m.content))
        .collect();
    let prompt = format!(
        "Write a short title (at most 6 words) for the following conversation. \
         Respond with ONLY the title, no quotes and no explanation.\n\n{transcript}"
    );

    let raw = generator.generate(&prompt).await?;
    let title = clean_title(&raw);
    if title.is_empty() {
        return Err(ResearchError::Generation(
            "model returned an empty title".to_string(),
        ));
    }
    Ok(title)
}

/// Prompt-derived title used when no model title is available.
pub fn fallback_title(prompt: &str) -> String {
    truncate_chars(prompt.trim(), MAX_TITLE_CHARS)
}

fn clean_title(raw: &str) -> String {
    let first_line = raw.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let stripped = first_line
        .trim_start_matches("Title:")
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '*')
        .trim();
    truncate_chars(stripped, MAX_TITLE_CHARS)
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
