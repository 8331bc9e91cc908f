//! Problem entity and its embedded generation trace (spec §3, §9).
//!
//! `Statement` is modeled as a tagged variant per problem type at the API/
//! domain edge (spec §9's "Dynamic JSON payloads" design note); storage keeps
//! the statement list as opaque JSON and the gateway validates shape on
//! write (spec §4.I).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::{EntityId, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    Grammar,
    Functional,
    Vocabulary,
}

/// A single answer option. Shape is constrained per problem type (spec
/// §4.I): grammar needs `content` + `is_correct` + (`translation` |
/// `explanation`); vocabulary needs `word` + `definition`; functional needs
/// `sentence` + `option`. Extra keys are accepted and passed through
/// untouched (spec §9 Open Question #2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Statement {
    Grammar {
        content: String,
        is_correct: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        translation: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
        #[serde(flatten)]
        extra: HashMap<String, serde_json::Value>,
    },
    Vocabulary {
        word: String,
        definition: String,
        #[serde(flatten)]
        extra: HashMap<String, serde_json::Value>,
    },
    Functional {
        sentence: String,
        option: String,
        #[serde(flatten)]
        extra: HashMap<String, serde_json::Value>,
    },
}

impl Statement {
    /// Validates the minimum per-type key contract from spec §4.I.
    pub fn validate(&self, problem_type: ProblemType) -> Result<(), String> {
        match (problem_type, self) {
            (ProblemType::Grammar, Statement::Grammar { content, is_correct, translation, explanation, .. }) => {
                if content.trim().is_empty() {
                    return Err("grammar statement content must not be empty".into());
                }
                if *is_correct {
                    if translation.as_deref().unwrap_or("").trim().is_empty() {
                        return Err("correct grammar statement requires translation".into());
                    }
                } else if explanation.as_deref().unwrap_or("").trim().is_empty() {
                    return Err("incorrect grammar statement requires explanation".into());
                }
                Ok(())
            }
            (ProblemType::Vocabulary, Statement::Vocabulary { word, definition, .. }) => {
                if word.trim().is_empty() || definition.trim().is_empty() {
                    return Err("vocabulary statement requires word and definition".into());
                }
                Ok(())
            }
            (ProblemType::Functional, Statement::Functional { sentence, option, .. }) => {
                if sentence.trim().is_empty() || option.trim().is_empty() {
                    return Err("functional statement requires sentence and option".into());
                }
                Ok(())
            }
            _ => Err("statement shape does not match problem_type".into()),
        }
    }
}

/// Per-sentence record of one LLM invocation used to assemble a problem
/// (spec §3, §4.C).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceTrace {
    pub prompt: String,
    pub model: String,
    pub response_id: String,
    pub reasoning_content: Option<String>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub reasoning_tokens: Option<u32>,
    pub total_tokens: u32,
    pub duration_ms: u64,
    pub error_type: Option<String>,
    pub raw_content: String,
}

/// Aggregated trace embedded in every Problem (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationTrace {
    pub sentences: Vec<SentenceTrace>,
    pub total_prompt_tokens: u32,
    pub total_completion_tokens: u32,
    pub total_reasoning_tokens: u32,
    pub total_tokens: u32,
    pub total_duration_ms: u64,
}

impl GenerationTrace {
    pub fn from_sentences(sentences: Vec<SentenceTrace>) -> Self {
        let mut trace = GenerationTrace {
            total_prompt_tokens: sentences.iter().map(|s| s.prompt_tokens).sum(),
            total_completion_tokens: sentences.iter().map(|s| s.completion_tokens).sum(),
            total_reasoning_tokens: sentences.iter().filter_map(|s| s.reasoning_tokens).sum(),
            total_tokens: sentences.iter().map(|s| s.total_tokens).sum(),
            total_duration_ms: sentences.iter().map(|s| s.duration_ms).sum(),
            sentences,
        };
        if trace.total_tokens == 0 {
            trace.total_tokens = trace.total_prompt_tokens + trace.total_completion_tokens;
        }
        trace
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: EntityId,
    pub problem_type: ProblemType,
    pub title: String,
    pub instructions: String,
    pub statements: Vec<Statement>,
    pub correct_answer_index: usize,
    pub topic_tags: HashSet<String>,
    pub source_statement_ids: Vec<EntityId>,
    pub metadata: ProblemMetadata,
    pub target_language_code: String,
    pub created_at: Instant,
    pub updated_at: Instant,
    pub last_served_at: Option<Instant>,
    pub generation_trace: GenerationTrace,
    pub generation_request_id: Option<EntityId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProblemMetadata {
    pub grammatical_focus: Vec<String>,
    pub tenses_used: Vec<String>,
    pub verb_infinitives: Vec<String>,
    pub includes_cod: bool,
    pub includes_coi: bool,
    pub includes_negation: bool,
    pub prompt_version: String,
}

impl Problem {
    /// Invariant 1 of spec §8: `correct_answer_index ∈ [0, len(statements))`.
    pub fn validate(&self) -> Result<(), String> {
        if self.statements.is_empty() {
            return Err("a problem must carry at least one statement".into());
        }
        if self.correct_answer_index >= self.statements.len() {
            return Err("correct_answer_index out of range".into());
        }
        for statement in &self.statements {
            statement.validate(self.problem_type)?;
        }
        Ok(())
    }
}
