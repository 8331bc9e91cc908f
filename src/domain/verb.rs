//! Verb and Conjugation entities (spec §3).

use serde::{Deserialize, Serialize};

use super::{EntityId, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Auxiliary {
    Avoir,
    Etre,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerbClassification {
    First,
    Second,
    Third,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verb {
    pub id: EntityId,
    pub infinitive: String,
    pub auxiliary: Auxiliary,
    pub reflexive: bool,
    /// 3-lowercase-letter target-language code, e.g. "fra".
    pub language_code: String,
    pub translation: String,
    pub past_participle: String,
    pub present_participle: String,
    pub classification: Option<VerbClassification>,
    pub irregular: bool,
    pub can_have_direct_object: bool,
    pub can_have_indirect_object: bool,
    pub is_test: bool,
    pub created_at: Instant,
    pub updated_at: Instant,
    pub last_used_at: Option<Instant>,
}

impl Verb {
    /// The 5-tuple spec §3 declares unique across the verb table.
    pub fn uniqueness_key(&self) -> (String, Auxiliary, bool, String, String) {
        (
            self.infinitive.clone(),
            self.auxiliary,
            self.reflexive,
            self.language_code.clone(),
            self.translation.clone(),
        )
    }

    /// Validates the non-empty-string invariants from spec §3. Called by the
    /// storage gateway before every create/update.
    pub fn validate(&self) -> Result<(), String> {
        if self.infinitive.trim().is_empty() {
            return Err("infinitive must not be empty".into());
        }
        if self.language_code.len() != 3 || !self.language_code.chars().all(|c| c.is_ascii_lowercase()) {
            return Err("language_code must be 3 lowercase letters".into());
        }
        if self.translation.trim().is_empty() {
            return Err("translation must not be empty".into());
        }
        if self.past_participle.trim().is_empty() {
            return Err("past_participle must not be empty".into());
        }
        if self.present_participle.trim().is_empty() {
            return Err("present_participle must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tense {
    Present,
    Imparfait,
    PasseCompose,
    PlusQueParfait,
    FuturSimple,
    Subjonctif,
    Conditionnel,
    Imperatif,
}

impl Tense {
    /// Compound tenses are formed with an auxiliary + past participle;
    /// this gates WRONG_AUXILIARY / PAST_PARTICIPLE_AGREEMENT in the prompt
    /// builder (spec §4.B).
    pub fn is_compound(&self) -> bool {
        matches!(self, Tense::PasseCompose | Tense::PlusQueParfait)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conjugation {
    pub infinitive: String,
    pub auxiliary: Auxiliary,
    pub reflexive: bool,
    pub tense: Tense,
    pub first_singular: Option<String>,
    pub second_singular: Option<String>,
    pub third_singular: Option<String>,
    pub first_plural: Option<String>,
    pub second_plural: Option<String>,
    pub third_plural: Option<String>,
}

impl Conjugation {
    pub fn uniqueness_key(&self) -> (String, Auxiliary, bool, Tense) {
        (self.infinitive.clone(), self.auxiliary, self.reflexive, self.tense)
    }

    /// Looks up the stored form for a given subject pronoun, used as a
    /// reference hint in prompt rendering. Returns `None` for pronouns the
    /// six-form table doesn't distinguish (it has no entry for "on").
    pub fn form_for_pronoun(&self, pronoun: &str) -> Option<&str> {
        match pronoun {
            "je" | "j'" => self.first_singular.as_deref(),
            "tu" => self.second_singular.as_deref(),
            "il" | "elle" => self.third_singular.as_deref(),
            "nous" => self.first_plural.as_deref(),
            "vous" => self.second_plural.as_deref(),
            "ils" | "elles" => self.third_plural.as_deref(),
            _ => None,
        }
    }
}
