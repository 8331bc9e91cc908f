//! Shared fixtures for the crate-level integration tests. Not a test
//! module itself — `mod common;` pulls it into each test binary.

use async_trait::async_trait;
use uuid::Uuid;

use quizforge::domain::{Auxiliary, Verb};
use quizforge::llm::{ContentGenerationError, LlmGenerator, LlmResponse};

pub fn sample_verb(infinitive: &str) -> Verb {
    let now = chrono::Utc::now();
    Verb {
        id: Uuid::new_v4(),
        infinitive: infinitive.to_string(),
        auxiliary: Auxiliary::Avoir,
        reflexive: false,
        language_code: "fra".into(),
        translation: "to speak".into(),
        past_participle: "parlé".into(),
        present_participle: "parlant".into(),
        classification: None,
        irregular: false,
        can_have_direct_object: true,
        can_have_indirect_object: true,
        is_test: false,
        created_at: now,
        updated_at: now,
        last_used_at: None,
    }
}

/// Stands in for a real model: echoes a well-formed completion for every
/// prompt so packaging never fails on content, only on what the test
/// itself injects (e.g. duplicate delivery).
pub struct FakeLlm;

#[async_trait]
impl LlmGenerator for FakeLlm {
    async fn generate(
        &self,
        _prompt: &str,
        model: &str,
        operation_tag: &str,
    ) -> Result<LlmResponse, ContentGenerationError> {
        let is_correct = operation_tag == "correct_sentence";
        let explanation = if is_correct { "" } else { "wrong conjugation for the subject" };
        let content = format!(
            "{{\"sentence\": \"Il parle.\", \"translation\": \"He speaks.\", \"explanation\": \"{explanation}\"}}"
        );
        Ok(LlmResponse {
            content: content.clone(),
            model: model.to_string(),
            response_id: Uuid::new_v4().to_string(),
            duration_ms: 5,
            prompt_tokens: 10,
            completion_tokens: 10,
            total_tokens: 20,
            reasoning_tokens: None,
            reasoning_content: None,
            raw_content: content,
        })
    }
}
