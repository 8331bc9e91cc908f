//! LLM client (spec §4.C) — single `generate` operation with response
//! cleaning, retry/backoff, and per-model/status/operation observability.
//!
//! Grounded on the corpus's `LiteLlmClient`/`LlmProvider` shape (OpenAI-
//! compatible chat-completions request over `reqwest`) generalized to the
//! retry and metrics contract this spec requires.

mod client;

pub use client::LlmClient;

use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Cleaned content: fences stripped, first top-level JSON object only.
    pub content: String,
    pub model: String,
    pub response_id: String,
    pub duration_ms: u64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub reasoning_tokens: Option<u32>,
    pub reasoning_content: Option<String>,
    pub raw_content: String,
}

/// The JSON shape every sentence-generation prompt is contracted to
/// return (spec §4.B "output contract").
#[derive(Debug, Clone, Deserialize)]
pub struct SentenceCompletion {
    pub sentence: String,
    pub translation: String,
    pub explanation: String,
}

#[derive(Debug, thiserror::Error)]
#[error("content generation failed ({operation}): {message}")]
pub struct ContentGenerationError {
    pub operation: String,
    pub message: String,
}

#[async_trait]
pub trait LlmGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        operation_tag: &str,
    ) -> Result<LlmResponse, ContentGenerationError>;
}

/// Strips markdown code fences and surrounding whitespace, then returns
/// the first top-level `{...}` object found in the text (spec §4.C
/// cleaning rule).
pub fn clean_completion(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    let without_fence = strip_code_fence(trimmed);
    extract_first_json_object(without_fence).ok_or_else(|| "no JSON object found in completion".to_string())
}

fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start_matches('\n');
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim();
        }
        return rest.trim();
    }
    text
}

fn extract_first_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        let ch = byte as char;
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

pub fn parse_sentence_completion(cleaned: &str, operation: &str) -> Result<SentenceCompletion, ContentGenerationError> {
    serde_json::from_str(cleaned).map_err(|e| ContentGenerationError {
        operation: operation.to_string(),
        message: format!("malformed completion JSON: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fence_and_extracts_object() {
        let raw = "```json\n{\"sentence\": \"Il mange.\", \"translation\": \"He eats.\", \"explanation\": \"\"}\n```";
        let cleaned = clean_completion(raw).unwrap();
        let parsed = parse_sentence_completion(&cleaned, "test").unwrap();
        assert_eq!(parsed.sentence, "Il mange.");
    }

    #[test]
    fn takes_first_object_when_model_rambles_afterward() {
        let raw = "{\"sentence\": \"a\", \"translation\": \"b\", \"explanation\": \"\"} — let me know if you need more!";
        let cleaned = clean_completion(raw).unwrap();
        assert!(cleaned.ends_with('}'));
    }

    #[test]
    fn rejects_text_with_no_json_object() {
        assert!(clean_completion("sorry, I can't help with that").is_err());
    }
}
