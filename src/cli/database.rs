//! `quizforge database init|clean` (spec §6, §B).

use uuid::Uuid;

use crate::domain::{Auxiliary, Verb, VerbClassification};
use crate::storage::StorageGateway;

fn seed_verb(
    infinitive: &str,
    auxiliary: Auxiliary,
    translation: &str,
    past_participle: &str,
    present_participle: &str,
    classification: Option<VerbClassification>,
    irregular: bool,
) -> Verb {
    let now = chrono::Utc::now();
    Verb {
        id: Uuid::new_v4(),
        infinitive: infinitive.to_string(),
        auxiliary,
        reflexive: false,
        language_code: "fra".to_string(),
        translation: translation.to_string(),
        past_participle: past_participle.to_string(),
        present_participle: present_participle.to_string(),
        classification,
        irregular,
        can_have_direct_object: true,
        can_have_indirect_object: true,
        is_test: false,
        created_at: now,
        updated_at: now,
        last_used_at: None,
    }
}

fn seed_set() -> Vec<Verb> {
    vec![
        seed_verb("parler", Auxiliary::Avoir, "to speak", "parlé", "parlant", Some(VerbClassification::First), false),
        seed_verb("finir", Auxiliary::Avoir, "to finish", "fini", "finissant", Some(VerbClassification::Second), false),
        seed_verb("vendre", Auxiliary::Avoir, "to sell", "vendu", "vendant", Some(VerbClassification::Third), false),
        seed_verb("être", Auxiliary::Avoir, "to be", "été", "étant", None, true),
        seed_verb("avoir", Auxiliary::Avoir, "to have", "eu", "ayant", None, true),
        seed_verb("aller", Auxiliary::Etre, "to go", "allé", "allant", None, true),
        seed_verb("faire", Auxiliary::Avoir, "to do/make", "fait", "faisant", None, true),
    ]
}

/// Idempotent: skips any verb whose uniqueness key already exists.
pub async fn init(storage: &dyn StorageGateway) -> anyhow::Result<()> {
    let mut created = 0u32;
    let mut skipped = 0u32;
    for verb in seed_set() {
        match storage.find_verb_by_infinitive(&verb.infinitive).await? {
            Some(_) => skipped += 1,
            None => {
                storage.create_verb(verb).await?;
                created += 1;
            }
        }
    }
    println!("database init: {created} verb(s) created, {skipped} already present");
    Ok(())
}

pub async fn clean(storage: &dyn StorageGateway) -> anyhow::Result<()> {
    let removed = storage.delete_test_verbs().await?;
    println!("database clean: removed {removed} test-tagged verb(s)");
    Ok(())
}
