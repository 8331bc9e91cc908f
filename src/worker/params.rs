//! Sentence-parameter selection (spec §4.E point 4) — random choices
//! constrained by what the selected verb actually supports.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::{Negation, ObjectCategory, Tense, Verb};
use crate::prompt::SentenceParams;

const PRONOUNS: &[&str] = &["je", "tu", "il", "elle", "nous", "vous", "ils", "elles"];
const TENSES: &[Tense] = &[
    Tense::Present,
    Tense::Imparfait,
    Tense::PasseCompose,
    Tense::PlusQueParfait,
    Tense::FuturSimple,
    Tense::Subjonctif,
    Tense::Conditionnel,
    Tense::Imperatif,
];
const OBJECT_CATEGORIES: &[ObjectCategory] =
    &[ObjectCategory::Masc, ObjectCategory::Fem, ObjectCategory::Plural];
const NEGATIONS: &[Negation] = &[
    Negation::None,
    Negation::Pas,
    Negation::Jamais,
    Negation::Rien,
    Negation::Personne,
    Negation::Plus,
    Negation::Aucun,
    Negation::Aucune,
    Negation::Encore,
];

/// Picks pronoun/tense/objects/negation for a verb, never assigning a
/// direct- or indirect-object category the verb cannot take.
pub fn choose_sentence_params(verb: &Verb) -> SentenceParams {
    let mut rng = rand::thread_rng();

    let direct_object = if verb.can_have_direct_object && rng.gen_bool(0.5) {
        *OBJECT_CATEGORIES.choose(&mut rng).expect("non-empty")
    } else {
        ObjectCategory::None
    };
    let indirect_object = if verb.can_have_indirect_object && rng.gen_bool(0.5) {
        *OBJECT_CATEGORIES.choose(&mut rng).expect("non-empty")
    } else {
        ObjectCategory::None
    };
    let reflexive_pronoun = if verb.reflexive {
        *OBJECT_CATEGORIES.choose(&mut rng).expect("non-empty")
    } else {
        ObjectCategory::None
    };

    SentenceParams {
        pronoun: (*PRONOUNS.choose(&mut rng).expect("non-empty")).to_string(),
        tense: *TENSES.choose(&mut rng).expect("non-empty"),
        negation: *NEGATIONS.choose(&mut rng).expect("non-empty"),
        direct_object,
        indirect_object,
        reflexive_pronoun,
    }
}
