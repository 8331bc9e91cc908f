//! Prompt builder (spec §4.B) — selects the three error types for a
//! problem's incorrect sentences and renders the per-sentence prompts the
//! LLM client sends.

mod templates;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::{Negation, ObjectCategory, Tense, Verb};

pub const PROMPT_VERSION: &str = "2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    CodPronounError,
    CoiPronounError,
    WrongConjugation,
    WrongAuxiliary,
    PastParticipleAgreement,
}

impl ErrorType {
    pub fn tag(&self) -> &'static str {
        match self {
            ErrorType::CodPronounError => "COD_PRONOUN_ERROR",
            ErrorType::CoiPronounError => "COI_PRONOUN_ERROR",
            ErrorType::WrongConjugation => "WRONG_CONJUGATION",
            ErrorType::WrongAuxiliary => "WRONG_AUXILIARY",
            ErrorType::PastParticipleAgreement => "PAST_PARTICIPLE_AGREEMENT",
        }
    }
}

/// The grammatical parameters a sentence is generated under (spec §4.B
/// "required parameters: pronoun, tense, negation, objects").
#[derive(Debug, Clone)]
pub struct SentenceParams {
    pub pronoun: String,
    pub tense: Tense,
    pub negation: Negation,
    pub direct_object: ObjectCategory,
    pub indirect_object: ObjectCategory,
    pub reflexive_pronoun: ObjectCategory,
}

/// Which error types are eligible given a sentence's grammatical shape
/// (spec §4.B error-type catalog's "Available when" column).
fn available_error_types(verb: &Verb, params: &SentenceParams) -> Vec<ErrorType> {
    let mut available = vec![ErrorType::WrongConjugation];
    if params.direct_object.is_present() {
        available.push(ErrorType::CodPronounError);
    }
    if params.indirect_object.is_present() {
        available.push(ErrorType::CoiPronounError);
    }
    if params.tense.is_compound() {
        available.push(ErrorType::WrongAuxiliary);
        if verb.auxiliary == crate::domain::Auxiliary::Etre {
            available.push(ErrorType::PastParticipleAgreement);
        }
    }
    available
}

/// Picks the three error types for the incorrect sentences (spec §4.B
/// selection algorithm). COD/COI are mandatory whenever their object is
/// present; the remaining slots are filled by uniform sampling without
/// replacement, padding with repeated `WrongConjugation` if the pool runs
/// dry.
pub fn select_error_types(verb: &Verb, params: &SentenceParams) -> [ErrorType; 3] {
    let available = available_error_types(verb, params);
    let mut mandatory = Vec::new();
    if params.direct_object.is_present() {
        mandatory.push(ErrorType::CodPronounError);
    }
    if params.indirect_object.is_present() {
        mandatory.push(ErrorType::CoiPronounError);
    }
    mandatory.truncate(3);

    let mut pool: Vec<ErrorType> = available
        .into_iter()
        .filter(|e| !mandatory.contains(e))
        .collect();
    pool.shuffle(&mut rand::thread_rng());

    let mut chosen = mandatory;
    let mut pool_iter = pool.into_iter();
    while chosen.len() < 3 {
        match pool_iter.next() {
            Some(error_type) => chosen.push(error_type),
            None => chosen.push(ErrorType::WrongConjugation),
        }
    }
    [chosen[0], chosen[1], chosen[2]]
}

/// One prompt plus the metadata the packager needs to attribute it to a
/// trace entry (spec §3 `SentenceTrace`).
pub struct RenderedPrompt {
    pub prompt: String,
    pub error_type: Option<ErrorType>,
}

pub fn render_correct_prompt(verb: &Verb, params: &SentenceParams, reference_form: Option<&str>) -> RenderedPrompt {
    RenderedPrompt {
        prompt: templates::render(verb, params, None, reference_form),
        error_type: None,
    }
}

pub fn render_incorrect_prompt(
    verb: &Verb,
    params: &SentenceParams,
    error_type: ErrorType,
    reference_form: Option<&str>,
) -> RenderedPrompt {
    RenderedPrompt {
        prompt: templates::render(verb, params, Some(error_type), reference_form),
        error_type: Some(error_type),
    }
}

/// `true` with probability `1/n` — used by the packager to place the
/// correct sentence in a uniformly random slot (spec §4.D).
pub fn random_slot(n: usize) -> usize {
    rand::thread_rng().gen_range(0..n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Auxiliary;

    fn verb(auxiliary: Auxiliary) -> Verb {
        let now = chrono::Utc::now();
        Verb {
            id: uuid::Uuid::new_v4(),
            infinitive: "manger".into(),
            auxiliary,
            reflexive: false,
            language_code: "fra".into(),
            translation: "to eat".into(),
            past_participle: "mangé".into(),
            present_participle: "mangeant".into(),
            classification: None,
            irregular: false,
            can_have_direct_object: true,
            can_have_indirect_object: false,
            is_test: false,
            created_at: now,
            updated_at: now,
            last_used_at: None,
        }
    }

    fn params(direct: ObjectCategory, tense: Tense) -> SentenceParams {
        SentenceParams {
            pronoun: "il".into(),
            tense,
            negation: Negation::None,
            direct_object: direct,
            indirect_object: ObjectCategory::None,
            reflexive_pronoun: ObjectCategory::None,
        }
    }

    #[test]
    fn cod_is_mandatory_when_direct_object_present() {
        let v = verb(Auxiliary::Avoir);
        for _ in 0..50 {
            let p = params(ObjectCategory::Masc, Tense::Present);
            let chosen = select_error_types(&v, &p);
            assert!(chosen.contains(&ErrorType::CodPronounError));
        }
    }

    #[test]
    fn pads_with_wrong_conjugation_when_pool_exhausted() {
        let v = verb(Auxiliary::Avoir);
        let p = params(ObjectCategory::None, Tense::Present);
        let chosen = select_error_types(&v, &p);
        assert_eq!(chosen.iter().filter(|e| **e == ErrorType::WrongConjugation).count() >= 1, true);
    }
}
