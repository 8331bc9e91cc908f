//! Prompt text rendering (spec §4.B) — a common header describing the
//! verb and required grammatical parameters, followed by one of six
//! instruction blocks (correct, or one per error type).

use super::{ErrorType, SentenceParams, PROMPT_VERSION};
use crate::domain::{Negation, ObjectCategory, Tense, Verb};

fn tense_label(tense: Tense) -> &'static str {
    match tense {
        Tense::Present => "présent",
        Tense::Imparfait => "imparfait",
        Tense::PasseCompose => "passé composé",
        Tense::PlusQueParfait => "plus-que-parfait",
        Tense::FuturSimple => "futur simple",
        Tense::Subjonctif => "subjonctif",
        Tense::Conditionnel => "conditionnel",
        Tense::Imperatif => "impératif",
    }
}

fn negation_label(negation: Negation) -> &'static str {
    match negation {
        Negation::None => "none",
        Negation::Pas => "ne...pas",
        Negation::Jamais => "ne...jamais",
        Negation::Rien => "ne...rien",
        Negation::Personne => "ne...personne",
        Negation::Plus => "ne...plus",
        Negation::Aucun => "ne...aucun",
        Negation::Aucune => "ne...aucune",
        Negation::Encore => "ne...pas encore",
    }
}

fn object_label(category: ObjectCategory) -> &'static str {
    match category {
        ObjectCategory::None => "none",
        ObjectCategory::Masc => "masculine",
        ObjectCategory::Fem => "feminine",
        ObjectCategory::Plural => "plural",
    }
}

fn header(verb: &Verb, params: &SentenceParams, reference_form: Option<&str>) -> String {
    let reference_line = match reference_form {
        Some(form) => format!(
            "\nKnown correct conjugated form for this pronoun and tense (reference only, do not \
             quote verbatim unless it fits): \"{form}\"."
        ),
        None => String::new(),
    };
    format!(
        "Verb: {infinitive} (auxiliary: {auxiliary:?}, reflexive: {reflexive}, \
         translation: \"{translation}\").\n\
         Required parameters — pronoun: {pronoun}, tense: {tense}, negation: {negation}, \
         direct object: {direct}, indirect object: {indirect}, reflexive pronoun: {reflexive_pronoun}.\
         {reference_line}\n\
         Respond with a single JSON object: {{\"sentence\": string, \"translation\": string, \
         \"explanation\": string}}.",
        infinitive = verb.infinitive,
        auxiliary = verb.auxiliary,
        reflexive = verb.reflexive,
        translation = verb.translation,
        pronoun = params.pronoun,
        tense = tense_label(params.tense),
        negation = negation_label(params.negation),
        direct = object_label(params.direct_object),
        indirect = object_label(params.indirect_object),
        reflexive_pronoun = object_label(params.reflexive_pronoun),
    )
}

fn instruction_block(error_type: Option<ErrorType>) -> &'static str {
    match error_type {
        None => {
            "Produce a grammatically correct French sentence matching every parameter above. \
             \"explanation\" must be an empty string."
        }
        Some(ErrorType::CodPronounError) => {
            "Produce a sentence that is correct EXCEPT for the direct-object pronoun: use the \
             wrong gender or number for it. Leave every other rule (conjugation, auxiliary, \
             agreement, negation) correct. \"explanation\" must describe the direct-object \
             pronoun error, non-empty."
        }
        Some(ErrorType::CoiPronounError) => {
            "Produce a sentence that is correct EXCEPT for the indirect-object pronoun: use the \
             wrong form for it. Leave every other rule correct. \"explanation\" must describe \
             the indirect-object pronoun error, non-empty."
        }
        Some(ErrorType::WrongConjugation) => {
            "Produce a sentence that is correct EXCEPT for the verb conjugation: conjugate it \
             for the wrong person/number. Leave every other rule correct. \"explanation\" must \
             describe the conjugation error, non-empty."
        }
        Some(ErrorType::WrongAuxiliary) => {
            "Produce a sentence that is correct EXCEPT for the auxiliary verb: use the wrong one \
             (avoir instead of être, or vice versa). Leave every other rule correct. \
             \"explanation\" must describe the auxiliary error, non-empty."
        }
        Some(ErrorType::PastParticipleAgreement) => {
            "Produce a sentence that is correct EXCEPT for past-participle agreement: fail to \
             agree the participle with its subject or preceding direct object as required. Leave \
             every other rule correct. \"explanation\" must describe the agreement error, \
             non-empty."
        }
    }
}

pub fn render(verb: &Verb, params: &SentenceParams, error_type: Option<ErrorType>, reference_form: Option<&str>) -> String {
    format!(
        "{header}\n\n{instructions}\n\n(prompt_version {version})",
        header = header(verb, params, reference_form),
        instructions = instruction_block(error_type),
        version = PROMPT_VERSION,
    )
}
