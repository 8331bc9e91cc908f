//! Sentence entity (spec §3) — a single correct or incorrect statement
//! generated for a Verb under a particular grammatical configuration.

use serde::{Deserialize, Serialize};

use super::verb::Tense;
use super::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectCategory {
    None,
    Masc,
    Fem,
    Plural,
}

impl ObjectCategory {
    pub fn is_present(&self) -> bool {
        !matches!(self, ObjectCategory::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Negation {
    None,
    Pas,
    Jamais,
    Rien,
    Personne,
    Plus,
    Aucun,
    Aucune,
    Encore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentence {
    pub id: EntityId,
    pub verb_id: EntityId,
    pub content: String,
    pub translation: String,
    pub pronoun: String,
    pub tense: Tense,
    pub direct_object: ObjectCategory,
    pub indirect_object: ObjectCategory,
    pub reflexive_pronoun: ObjectCategory,
    pub negation: Negation,
    pub is_correct: bool,
    pub explanation: Option<String>,
    pub source: String,
}

impl Sentence {
    /// `explanation` must be present iff the sentence is incorrect (spec §3).
    pub fn validate(&self) -> Result<(), String> {
        if self.content.trim().is_empty() {
            return Err("content must not be empty".into());
        }
        match (self.is_correct, &self.explanation) {
            (true, Some(e)) if !e.trim().is_empty() => {
                Err("explanation must be empty for a correct sentence".into())
            }
            (false, None) => Err("explanation is required for an incorrect sentence".into()),
            (false, Some(e)) if e.trim().is_empty() => {
                Err("explanation is required for an incorrect sentence".into())
            }
            _ => Ok(()),
        }
    }
}
