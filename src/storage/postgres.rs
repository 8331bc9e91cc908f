//! Postgres-backed [`StorageGateway`] (spec §4.I), grounded on the
//! `PgStorage` connection-pool and row-mapping idiom from the corpus's
//! Postgres storage crate.

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    ApiKey, Auxiliary, Conjugation, EntityType, GenerationRequest, Permission, Problem,
    ProblemType, RequestStatus, Sentence, Statement, Tense, Verb, VerbClassification,
};

use super::{
    GenerationRequestFilter, ProblemFilter, RequestCounts, StorageError, StorageGateway,
};

pub struct PostgresStorage {
    pool: Pool<Postgres>,
}

impl PostgresStorage {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .test_before_acquire(true)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn map_unique_violation(entity: &'static str, err: sqlx::Error, detail: impl Into<String>) -> StorageError {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StorageError::AlreadyExists { entity, detail: detail.into() };
            }
        }
        StorageError::Backend(err.to_string())
    }
}

fn auxiliary_str(a: Auxiliary) -> &'static str {
    match a {
        Auxiliary::Avoir => "avoir",
        Auxiliary::Etre => "etre",
    }
}

fn parse_auxiliary(s: &str) -> Result<Auxiliary, StorageError> {
    match s {
        "avoir" => Ok(Auxiliary::Avoir),
        "etre" => Ok(Auxiliary::Etre),
        other => Err(StorageError::Backend(format!("unknown auxiliary {other}"))),
    }
}

fn classification_str(c: Option<VerbClassification>) -> Option<&'static str> {
    c.map(|c| match c {
        VerbClassification::First => "first",
        VerbClassification::Second => "second",
        VerbClassification::Third => "third",
    })
}

fn parse_classification(s: Option<&str>) -> Option<VerbClassification> {
    match s {
        Some("first") => Some(VerbClassification::First),
        Some("second") => Some(VerbClassification::Second),
        Some("third") => Some(VerbClassification::Third),
        _ => None,
    }
}

fn tense_str(t: Tense) -> &'static str {
    match t {
        Tense::Present => "present",
        Tense::Imparfait => "imparfait",
        Tense::PasseCompose => "passe_compose",
        Tense::PlusQueParfait => "plus_que_parfait",
        Tense::FuturSimple => "futur_simple",
        Tense::Subjonctif => "subjonctif",
        Tense::Conditionnel => "conditionnel",
        Tense::Imperatif => "imperatif",
    }
}

fn parse_tense(s: &str) -> Result<Tense, StorageError> {
    Ok(match s {
        "present" => Tense::Present,
        "imparfait" => Tense::Imparfait,
        "passe_compose" => Tense::PasseCompose,
        "plus_que_parfait" => Tense::PlusQueParfait,
        "futur_simple" => Tense::FuturSimple,
        "subjonctif" => Tense::Subjonctif,
        "conditionnel" => Tense::Conditionnel,
        "imperatif" => Tense::Imperatif,
        other => return Err(StorageError::Backend(format!("unknown tense {other}"))),
    })
}

fn problem_type_str(t: ProblemType) -> &'static str {
    match t {
        ProblemType::Grammar => "grammar",
        ProblemType::Functional => "functional",
        ProblemType::Vocabulary => "vocabulary",
    }
}

fn parse_problem_type(s: &str) -> Result<ProblemType, StorageError> {
    Ok(match s {
        "grammar" => ProblemType::Grammar,
        "functional" => ProblemType::Functional,
        "vocabulary" => ProblemType::Vocabulary,
        other => return Err(StorageError::Backend(format!("unknown problem_type {other}"))),
    })
}

fn request_status_str(s: RequestStatus) -> &'static str {
    match s {
        RequestStatus::Pending => "pending",
        RequestStatus::Processing => "processing",
        RequestStatus::Completed => "completed",
        RequestStatus::Partial => "partial",
        RequestStatus::Failed => "failed",
        RequestStatus::Expired => "expired",
    }
}

fn parse_request_status(s: &str) -> Result<RequestStatus, StorageError> {
    Ok(match s {
        "pending" => RequestStatus::Pending,
        "processing" => RequestStatus::Processing,
        "completed" => RequestStatus::Completed,
        "partial" => RequestStatus::Partial,
        "failed" => RequestStatus::Failed,
        "expired" => RequestStatus::Expired,
        other => return Err(StorageError::Backend(format!("unknown status {other}"))),
    })
}

const VERB_COLUMNS: &str = "id, infinitive, auxiliary, reflexive, language_code, translation, \
    past_participle, present_participle, classification, irregular, can_have_direct_object, \
    can_have_indirect_object, is_test, created_at, updated_at, last_used_at";

fn row_to_verb(row: &PgRow) -> Result<Verb, StorageError> {
    Ok(Verb {
        id: row.try_get("id").map_err(|e| StorageError::Backend(e.to_string()))?,
        infinitive: row.try_get("infinitive").map_err(|e| StorageError::Backend(e.to_string()))?,
        auxiliary: parse_auxiliary(row.try_get::<String, _>("auxiliary").map_err(|e| StorageError::Backend(e.to_string()))?.as_str())?,
        reflexive: row.try_get("reflexive").map_err(|e| StorageError::Backend(e.to_string()))?,
        language_code: row.try_get("language_code").map_err(|e| StorageError::Backend(e.to_string()))?,
        translation: row.try_get("translation").map_err(|e| StorageError::Backend(e.to_string()))?,
        past_participle: row.try_get("past_participle").map_err(|e| StorageError::Backend(e.to_string()))?,
        present_participle: row.try_get("present_participle").map_err(|e| StorageError::Backend(e.to_string()))?,
        classification: parse_classification(row.try_get::<Option<String>, _>("classification").map_err(|e| StorageError::Backend(e.to_string()))?.as_deref()),
        irregular: row.try_get("irregular").map_err(|e| StorageError::Backend(e.to_string()))?,
        can_have_direct_object: row.try_get("can_have_direct_object").map_err(|e| StorageError::Backend(e.to_string()))?,
        can_have_indirect_object: row.try_get("can_have_indirect_object").map_err(|e| StorageError::Backend(e.to_string()))?,
        is_test: row.try_get("is_test").map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row.try_get("created_at").map_err(|e| StorageError::Backend(e.to_string()))?,
        updated_at: row.try_get("updated_at").map_err(|e| StorageError::Backend(e.to_string()))?,
        last_used_at: row.try_get("last_used_at").map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn row_to_conjugation(row: &PgRow) -> Result<Conjugation, StorageError> {
    Ok(Conjugation {
        infinitive: row.try_get("infinitive").map_err(|e| StorageError::Backend(e.to_string()))?,
        auxiliary: parse_auxiliary(row.try_get::<String, _>("auxiliary").map_err(|e| StorageError::Backend(e.to_string()))?.as_str())?,
        reflexive: row.try_get("reflexive").map_err(|e| StorageError::Backend(e.to_string()))?,
        tense: parse_tense(row.try_get::<String, _>("tense").map_err(|e| StorageError::Backend(e.to_string()))?.as_str())?,
        first_singular: row.try_get("first_singular").map_err(|e| StorageError::Backend(e.to_string()))?,
        second_singular: row.try_get("second_singular").map_err(|e| StorageError::Backend(e.to_string()))?,
        third_singular: row.try_get("third_singular").map_err(|e| StorageError::Backend(e.to_string()))?,
        first_plural: row.try_get("first_plural").map_err(|e| StorageError::Backend(e.to_string()))?,
        second_plural: row.try_get("second_plural").map_err(|e| StorageError::Backend(e.to_string()))?,
        third_plural: row.try_get("third_plural").map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn row_to_sentence(row: &PgRow) -> Result<Sentence, StorageError> {
    let tense_raw: String = row.try_get("tense").map_err(|e| StorageError::Backend(e.to_string()))?;
    let direct_object: String = row.try_get("direct_object").map_err(|e| StorageError::Backend(e.to_string()))?;
    let indirect_object: String = row.try_get("indirect_object").map_err(|e| StorageError::Backend(e.to_string()))?;
    let reflexive_pronoun: String = row.try_get("reflexive_pronoun").map_err(|e| StorageError::Backend(e.to_string()))?;
    let negation: String = row.try_get("negation").map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(Sentence {
        id: row.try_get("id").map_err(|e| StorageError::Backend(e.to_string()))?,
        verb_id: row.try_get("verb_id").map_err(|e| StorageError::Backend(e.to_string()))?,
        content: row.try_get("content").map_err(|e| StorageError::Backend(e.to_string()))?,
        translation: row.try_get("translation").map_err(|e| StorageError::Backend(e.to_string()))?,
        pronoun: row.try_get("pronoun").map_err(|e| StorageError::Backend(e.to_string()))?,
        tense: parse_tense(&tense_raw)?,
        direct_object: serde_json::from_value(serde_json::Value::String(direct_object))
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        indirect_object: serde_json::from_value(serde_json::Value::String(indirect_object))
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        reflexive_pronoun: serde_json::from_value(serde_json::Value::String(reflexive_pronoun))
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        negation: serde_json::from_value(serde_json::Value::String(negation))
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        is_correct: row.try_get("is_correct").map_err(|e| StorageError::Backend(e.to_string()))?,
        explanation: row.try_get("explanation").map_err(|e| StorageError::Backend(e.to_string()))?,
        source: row.try_get("source").map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn row_to_problem(row: &PgRow) -> Result<Problem, StorageError> {
    let problem_type_raw: String = row.try_get("problem_type").map_err(|e| StorageError::Backend(e.to_string()))?;
    let statements_json: serde_json::Value = row.try_get("statements").map_err(|e| StorageError::Backend(e.to_string()))?;
    let statements: Vec<Statement> =
        serde_json::from_value(statements_json).map_err(|e| StorageError::Backend(e.to_string()))?;
    let topic_tags_json: serde_json::Value = row.try_get("topic_tags").map_err(|e| StorageError::Backend(e.to_string()))?;
    let topic_tags = serde_json::from_value(topic_tags_json).map_err(|e| StorageError::Backend(e.to_string()))?;
    let metadata_json: serde_json::Value = row.try_get("metadata").map_err(|e| StorageError::Backend(e.to_string()))?;
    let metadata = serde_json::from_value(metadata_json).map_err(|e| StorageError::Backend(e.to_string()))?;
    let trace_json: serde_json::Value = row.try_get("generation_trace").map_err(|e| StorageError::Backend(e.to_string()))?;
    let generation_trace = serde_json::from_value(trace_json).map_err(|e| StorageError::Backend(e.to_string()))?;
    let source_ids_json: serde_json::Value = row.try_get("source_statement_ids").map_err(|e| StorageError::Backend(e.to_string()))?;
    let source_statement_ids = serde_json::from_value(source_ids_json).map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(Problem {
        id: row.try_get("id").map_err(|e| StorageError::Backend(e.to_string()))?,
        problem_type: parse_problem_type(&problem_type_raw)?,
        title: row.try_get("title").map_err(|e| StorageError::Backend(e.to_string()))?,
        instructions: row.try_get("instructions").map_err(|e| StorageError::Backend(e.to_string()))?,
        statements,
        correct_answer_index: row.try_get::<i32, _>("correct_answer_index").map_err(|e| StorageError::Backend(e.to_string()))? as usize,
        topic_tags,
        source_statement_ids,
        metadata,
        target_language_code: row.try_get("target_language_code").map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row.try_get("created_at").map_err(|e| StorageError::Backend(e.to_string()))?,
        updated_at: row.try_get("updated_at").map_err(|e| StorageError::Backend(e.to_string()))?,
        last_served_at: row.try_get("last_served_at").map_err(|e| StorageError::Backend(e.to_string()))?,
        generation_trace,
        generation_request_id: row.try_get("generation_request_id").map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn row_to_generation_request(row: &PgRow) -> Result<GenerationRequest, StorageError> {
    let status_raw: String = row.try_get("status").map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(GenerationRequest {
        id: row.try_get("id").map_err(|e| StorageError::Backend(e.to_string()))?,
        entity_type: EntityType::Problem,
        status: parse_request_status(&status_raw)?,
        requested_count: row.try_get::<i32, _>("requested_count").map_err(|e| StorageError::Backend(e.to_string()))? as u32,
        generated_count: row.try_get::<i32, _>("generated_count").map_err(|e| StorageError::Backend(e.to_string()))? as u32,
        failed_count: row.try_get::<i32, _>("failed_count").map_err(|e| StorageError::Backend(e.to_string()))? as u32,
        requested_at: row.try_get("requested_at").map_err(|e| StorageError::Backend(e.to_string()))?,
        started_at: row.try_get("started_at").map_err(|e| StorageError::Backend(e.to_string()))?,
        completed_at: row.try_get("completed_at").map_err(|e| StorageError::Backend(e.to_string()))?,
        constraints: row.try_get("constraints").map_err(|e| StorageError::Backend(e.to_string()))?,
        metadata: row.try_get("metadata").map_err(|e| StorageError::Backend(e.to_string()))?,
        error_message: row.try_get("error_message").map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn row_to_api_key(row: &PgRow) -> Result<ApiKey, StorageError> {
    let permissions_json: serde_json::Value = row.try_get("permissions").map_err(|e| StorageError::Backend(e.to_string()))?;
    let permissions: std::collections::HashSet<Permission> =
        serde_json::from_value(permissions_json).map_err(|e| StorageError::Backend(e.to_string()))?;
    let ip_json: serde_json::Value = row.try_get("allowed_ip_patterns").map_err(|e| StorageError::Backend(e.to_string()))?;
    let allowed_ip_patterns = serde_json::from_value(ip_json).map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(ApiKey {
        id: row.try_get("id").map_err(|e| StorageError::Backend(e.to_string()))?,
        secret_hash: row.try_get("secret_hash").map_err(|e| StorageError::Backend(e.to_string()))?,
        salt: row.try_get("salt").map_err(|e| StorageError::Backend(e.to_string()))?,
        prefix: row.try_get("prefix").map_err(|e| StorageError::Backend(e.to_string()))?,
        name: row.try_get("name").map_err(|e| StorageError::Backend(e.to_string()))?,
        active: row.try_get("active").map_err(|e| StorageError::Backend(e.to_string()))?,
        permissions,
        allowed_ip_patterns,
        rate_limit_per_minute: row.try_get::<i32, _>("rate_limit_per_minute").map_err(|e| StorageError::Backend(e.to_string()))? as u32,
        usage_count: row.try_get::<i64, _>("usage_count").map_err(|e| StorageError::Backend(e.to_string()))? as u64,
        last_used_at: row.try_get("last_used_at").map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

#[async_trait]
impl StorageGateway for PostgresStorage {
    async fn health_check(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn create_verb(&self, verb: Verb) -> Result<Verb, StorageError> {
        verb.validate().map_err(|d| StorageError::validation("verb", d))?;
        let query = format!(
            "INSERT INTO verbs ({VERB_COLUMNS}) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16) RETURNING {VERB_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(verb.id)
            .bind(&verb.infinitive)
            .bind(auxiliary_str(verb.auxiliary))
            .bind(verb.reflexive)
            .bind(&verb.language_code)
            .bind(&verb.translation)
            .bind(&verb.past_participle)
            .bind(&verb.present_participle)
            .bind(classification_str(verb.classification))
            .bind(verb.irregular)
            .bind(verb.can_have_direct_object)
            .bind(verb.can_have_indirect_object)
            .bind(verb.is_test)
            .bind(verb.created_at)
            .bind(verb.updated_at)
            .bind(verb.last_used_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::map_unique_violation("verb", e, &verb.infinitive))?;
        row_to_verb(&row)
    }

    async fn get_verb(&self, id: Uuid) -> Result<Verb, StorageError> {
        let query = format!("SELECT {VERB_COLUMNS} FROM verbs WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::not_found("verb", id))?;
        row_to_verb(&row)
    }

    async fn find_verb_by_infinitive(&self, infinitive: &str) -> Result<Option<Verb>, StorageError> {
        let query = format!("SELECT {VERB_COLUMNS} FROM verbs WHERE infinitive = $1 LIMIT 1");
        let row = sqlx::query(&query)
            .bind(infinitive)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.as_ref().map(row_to_verb).transpose()
    }

    async fn random_verb(&self, include_test: bool) -> Result<Verb, StorageError> {
        let query = if include_test {
            format!("SELECT {VERB_COLUMNS} FROM verbs ORDER BY random() LIMIT 1")
        } else {
            format!("SELECT {VERB_COLUMNS} FROM verbs WHERE is_test = false ORDER BY random() LIMIT 1")
        };
        let row = sqlx::query(&query)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::not_found("verb", "<random>"))?;
        row_to_verb(&row)
    }

    async fn update_verb(&self, verb: Verb) -> Result<Verb, StorageError> {
        verb.validate().map_err(|d| StorageError::validation("verb", d))?;
        let row = sqlx::query(
            "UPDATE verbs SET translation = $2, past_participle = $3, present_participle = $4, \
             classification = $5, irregular = $6, can_have_direct_object = $7, \
             can_have_indirect_object = $8, is_test = $9, updated_at = $10, last_used_at = $11 \
             WHERE id = $1 RETURNING *",
        )
        .bind(verb.id)
        .bind(&verb.translation)
        .bind(&verb.past_participle)
        .bind(&verb.present_participle)
        .bind(classification_str(verb.classification))
        .bind(verb.irregular)
        .bind(verb.can_have_direct_object)
        .bind(verb.can_have_indirect_object)
        .bind(verb.is_test)
        .bind(verb.updated_at)
        .bind(verb.last_used_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| StorageError::not_found("verb", verb.id))?;
        row_to_verb(&row)
    }

    async fn delete_verb(&self, id: Uuid) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM verbs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("verb", id));
        }
        Ok(())
    }

    async fn touch_verb_last_used(&self, id: Uuid) -> Result<(), StorageError> {
        sqlx::query("UPDATE verbs SET last_used_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete_test_verbs(&self) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM verbs WHERE is_test = true")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn list_verbs(&self) -> Result<Vec<Verb>, StorageError> {
        let rows = sqlx::query("SELECT * FROM verbs")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.iter().map(row_to_verb).collect()
    }

    async fn create_conjugation(&self, conjugation: Conjugation) -> Result<Conjugation, StorageError> {
        let row = sqlx::query(
            "INSERT INTO conjugations (infinitive, auxiliary, reflexive, tense, first_singular, \
             second_singular, third_singular, first_plural, second_plural, third_plural) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10) RETURNING *",
        )
        .bind(&conjugation.infinitive)
        .bind(auxiliary_str(conjugation.auxiliary))
        .bind(conjugation.reflexive)
        .bind(tense_str(conjugation.tense))
        .bind(&conjugation.first_singular)
        .bind(&conjugation.second_singular)
        .bind(&conjugation.third_singular)
        .bind(&conjugation.first_plural)
        .bind(&conjugation.second_plural)
        .bind(&conjugation.third_plural)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::map_unique_violation("conjugation", e, &conjugation.infinitive))?;
        row_to_conjugation(&row)
    }

    async fn find_conjugation(
        &self,
        infinitive: &str,
        auxiliary: Auxiliary,
        reflexive: bool,
        tense: Tense,
    ) -> Result<Option<Conjugation>, StorageError> {
        let row = sqlx::query(
            "SELECT * FROM conjugations WHERE infinitive = $1 AND auxiliary = $2 AND reflexive = $3 AND tense = $4",
        )
        .bind(infinitive)
        .bind(auxiliary_str(auxiliary))
        .bind(reflexive)
        .bind(tense_str(tense))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.as_ref().map(row_to_conjugation).transpose()
    }

    async fn list_conjugations_for_verb(&self, infinitive: &str) -> Result<Vec<Conjugation>, StorageError> {
        let rows = sqlx::query("SELECT * FROM conjugations WHERE infinitive = $1")
            .bind(infinitive)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.iter().map(row_to_conjugation).collect()
    }

    async fn list_conjugations(&self) -> Result<Vec<Conjugation>, StorageError> {
        let rows = sqlx::query("SELECT * FROM conjugations")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.iter().map(row_to_conjugation).collect()
    }

    async fn create_sentence(&self, sentence: Sentence) -> Result<Sentence, StorageError> {
        sentence.validate().map_err(|d| StorageError::validation("sentence", d))?;
        let direct_object = serde_json::to_value(&sentence.direct_object).map_err(|e| StorageError::Backend(e.to_string()))?;
        let indirect_object = serde_json::to_value(&sentence.indirect_object).map_err(|e| StorageError::Backend(e.to_string()))?;
        let reflexive_pronoun = serde_json::to_value(&sentence.reflexive_pronoun).map_err(|e| StorageError::Backend(e.to_string()))?;
        let negation = serde_json::to_value(&sentence.negation).map_err(|e| StorageError::Backend(e.to_string()))?;
        let row = sqlx::query(
            "INSERT INTO sentences (id, verb_id, content, translation, pronoun, tense, \
             direct_object, indirect_object, reflexive_pronoun, negation, is_correct, \
             explanation, source) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13) RETURNING *",
        )
        .bind(sentence.id)
        .bind(sentence.verb_id)
        .bind(&sentence.content)
        .bind(&sentence.translation)
        .bind(&sentence.pronoun)
        .bind(tense_str(sentence.tense))
        .bind(direct_object.as_str())
        .bind(indirect_object.as_str())
        .bind(reflexive_pronoun.as_str())
        .bind(negation.as_str())
        .bind(sentence.is_correct)
        .bind(&sentence.explanation)
        .bind(&sentence.source)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row_to_sentence(&row)
    }

    async fn get_sentence(&self, id: Uuid) -> Result<Sentence, StorageError> {
        let row = sqlx::query("SELECT * FROM sentences WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::not_found("sentence", id))?;
        row_to_sentence(&row)
    }

    async fn create_problem(&self, problem: Problem) -> Result<Problem, StorageError> {
        problem.validate().map_err(|d| StorageError::validation("problem", d))?;
        let statements = serde_json::to_value(&problem.statements).map_err(|e| StorageError::Backend(e.to_string()))?;
        let topic_tags = serde_json::to_value(&problem.topic_tags).map_err(|e| StorageError::Backend(e.to_string()))?;
        let metadata = serde_json::to_value(&problem.metadata).map_err(|e| StorageError::Backend(e.to_string()))?;
        let generation_trace = serde_json::to_value(&problem.generation_trace).map_err(|e| StorageError::Backend(e.to_string()))?;
        let source_ids = serde_json::to_value(&problem.source_statement_ids).map_err(|e| StorageError::Backend(e.to_string()))?;
        let row = sqlx::query(
            "INSERT INTO problems (id, problem_type, title, instructions, statements, \
             correct_answer_index, topic_tags, source_statement_ids, metadata, \
             target_language_code, created_at, updated_at, last_served_at, generation_trace, \
             generation_request_id) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15) RETURNING *",
        )
        .bind(problem.id)
        .bind(problem_type_str(problem.problem_type))
        .bind(&problem.title)
        .bind(&problem.instructions)
        .bind(statements)
        .bind(problem.correct_answer_index as i32)
        .bind(topic_tags)
        .bind(source_ids)
        .bind(metadata)
        .bind(&problem.target_language_code)
        .bind(problem.created_at)
        .bind(problem.updated_at)
        .bind(problem.last_served_at)
        .bind(generation_trace)
        .bind(problem.generation_request_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row_to_problem(&row)
    }

    async fn get_problem(&self, id: Uuid) -> Result<Problem, StorageError> {
        let row = sqlx::query("SELECT * FROM problems WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::not_found("problem", id))?;
        row_to_problem(&row)
    }

    async fn list_problems_for_request(&self, generation_request_id: Uuid) -> Result<Vec<Problem>, StorageError> {
        let rows = sqlx::query("SELECT * FROM problems WHERE generation_request_id = $1 ORDER BY created_at")
            .bind(generation_request_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.iter().map(row_to_problem).collect()
    }

    /// Implements the spec §4.H scoring formula directly in SQL so the
    /// whole selection runs as a single round trip.
    async fn select_random_problem(
        &self,
        filter: &ProblemFilter,
        virtual_staleness_seconds: i64,
    ) -> Result<Option<Problem>, StorageError> {
        let mut sql = String::from(
            "SELECT *, GREATEST( \
                EXTRACT(EPOCH FROM (now() - COALESCE(last_served_at, now() - make_interval(secs => $1)))), \
                $1::double precision \
             ) * (0.5 + random()) AS score \
             FROM problems WHERE true",
        );
        enum Bind {
            Text(String),
            TextArray(Vec<String>),
        }
        let mut binds: Vec<Bind> = Vec::new();
        let mut idx = 2;

        if let Some(pt) = filter.problem_type {
            sql.push_str(&format!(" AND problem_type = ${idx}"));
            binds.push(Bind::Text(problem_type_str(pt).to_string()));
            idx += 1;
        }
        if let Some(lang) = &filter.target_language_code {
            sql.push_str(&format!(" AND target_language_code = ${idx}"));
            binds.push(Bind::Text(lang.clone()));
            idx += 1;
        }
        if let Some(tags) = &filter.topic_tags {
            sql.push_str(&format!(" AND topic_tags ?| ${idx}"));
            binds.push(Bind::TextArray(tags.clone()));
            idx += 1;
        }
        if let Some(focus) = &filter.grammatical_focus {
            sql.push_str(&format!(" AND metadata -> 'grammatical_focus' ?| ${idx}"));
            binds.push(Bind::TextArray(focus.clone()));
            idx += 1;
        }
        if let Some(tenses) = &filter.tenses_used {
            sql.push_str(&format!(" AND metadata -> 'tenses_used' ?| ${idx}"));
            binds.push(Bind::TextArray(tenses.clone()));
        }
        sql.push_str(" ORDER BY score DESC LIMIT 1");

        let mut query = sqlx::query(&sql).bind(virtual_staleness_seconds as f64);
        for bind in binds {
            query = match bind {
                Bind::Text(s) => query.bind(s),
                Bind::TextArray(v) => query.bind(v),
            };
        }
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.as_ref().map(row_to_problem).transpose()
    }

    async fn stamp_last_served(&self, id: Uuid) -> Result<(), StorageError> {
        sqlx::query("UPDATE problems SET last_served_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn purge_problems_older_than(
        &self,
        older_than: chrono::DateTime<chrono::Utc>,
        topic_tag: Option<&str>,
    ) -> Result<u64, StorageError> {
        let result = if let Some(tag) = topic_tag {
            sqlx::query("DELETE FROM problems WHERE created_at < $1 AND topic_tags ? $2")
                .bind(older_than)
                .bind(tag)
                .execute(&self.pool)
                .await
        } else {
            sqlx::query("DELETE FROM problems WHERE created_at < $1")
                .bind(older_than)
                .execute(&self.pool)
                .await
        }
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn count_problems(&self, filter: &ProblemFilter) -> Result<u64, StorageError> {
        let mut sql = String::from("SELECT count(*) AS n FROM problems WHERE true");
        if let Some(pt) = filter.problem_type {
            sql.push_str(&format!(" AND problem_type = '{}'", problem_type_str(pt)));
        }
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(row.try_get::<i64, _>("n").map_err(|e| StorageError::Backend(e.to_string()))? as u64)
    }

    async fn create_generation_request(&self, request: GenerationRequest) -> Result<GenerationRequest, StorageError> {
        let row = sqlx::query(
            "INSERT INTO generation_requests (id, entity_type, status, requested_count, \
             generated_count, failed_count, requested_at, started_at, completed_at, \
             constraints, metadata, error_message) VALUES ($1,'problem',$2,$3,$4,$5,$6,$7,$8,$9,$10,$11) RETURNING *",
        )
        .bind(request.id)
        .bind(request_status_str(request.status))
        .bind(request.requested_count as i32)
        .bind(request.generated_count as i32)
        .bind(request.failed_count as i32)
        .bind(request.requested_at)
        .bind(request.started_at)
        .bind(request.completed_at)
        .bind(&request.constraints)
        .bind(&request.metadata)
        .bind(&request.error_message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row_to_generation_request(&row)
    }

    async fn get_generation_request(&self, id: Uuid) -> Result<GenerationRequest, StorageError> {
        let row = sqlx::query("SELECT * FROM generation_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::not_found("generation_request", id))?;
        row_to_generation_request(&row)
    }

    async fn list_generation_requests(&self, filter: &GenerationRequestFilter) -> Result<Vec<GenerationRequest>, StorageError> {
        let mut sql = String::from("SELECT * FROM generation_requests WHERE true");
        if let Some(status) = filter.status {
            sql.push_str(&format!(" AND status = '{}'", request_status_str(status)));
        }
        sql.push_str(" ORDER BY requested_at DESC LIMIT 200");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.iter().map(row_to_generation_request).collect()
    }

    async fn mark_processing(&self, id: Uuid) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE generation_requests SET status = 'processing', started_at = COALESCE(started_at, now()) \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn increment_generated(&self, id: Uuid) -> Result<RequestCounts, StorageError> {
        let row = sqlx::query(
            "UPDATE generation_requests SET generated_count = generated_count + 1 \
             WHERE id = $1 RETURNING generated_count, failed_count",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| StorageError::not_found("generation_request", id))?;
        Ok(RequestCounts {
            generated_count: row.try_get::<i32, _>("generated_count").map_err(|e| StorageError::Backend(e.to_string()))? as u32,
            failed_count: row.try_get::<i32, _>("failed_count").map_err(|e| StorageError::Backend(e.to_string()))? as u32,
        })
    }

    async fn increment_failed(&self, id: Uuid) -> Result<RequestCounts, StorageError> {
        let row = sqlx::query(
            "UPDATE generation_requests SET failed_count = failed_count + 1 \
             WHERE id = $1 RETURNING generated_count, failed_count",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| StorageError::not_found("generation_request", id))?;
        Ok(RequestCounts {
            generated_count: row.try_get::<i32, _>("generated_count").map_err(|e| StorageError::Backend(e.to_string()))? as u32,
            failed_count: row.try_get::<i32, _>("failed_count").map_err(|e| StorageError::Backend(e.to_string()))? as u32,
        })
    }

    async fn finalize_generation_request(
        &self,
        id: Uuid,
        status: RequestStatus,
        error_message: Option<String>,
    ) -> Result<GenerationRequest, StorageError> {
        let row = sqlx::query(
            "UPDATE generation_requests SET status = $2, completed_at = now(), error_message = $3 \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(request_status_str(status))
        .bind(error_message)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| StorageError::not_found("generation_request", id))?;
        row_to_generation_request(&row)
    }

    async fn expire_stale_requests(&self, older_than: chrono::DateTime<chrono::Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "UPDATE generation_requests SET status = 'expired', completed_at = now() \
             WHERE status IN ('pending', 'processing') AND requested_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn delete_generation_request(&self, id: Uuid) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM generation_requests WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn create_api_key(&self, key: ApiKey) -> Result<ApiKey, StorageError> {
        let permissions = serde_json::to_value(&key.permissions).map_err(|e| StorageError::Backend(e.to_string()))?;
        let ips = serde_json::to_value(&key.allowed_ip_patterns).map_err(|e| StorageError::Backend(e.to_string()))?;
        let row = sqlx::query(
            "INSERT INTO api_keys (id, secret_hash, salt, prefix, name, active, permissions, \
             allowed_ip_patterns, rate_limit_per_minute, usage_count, last_used_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11) RETURNING *",
        )
        .bind(key.id)
        .bind(&key.secret_hash)
        .bind(&key.salt)
        .bind(&key.prefix)
        .bind(&key.name)
        .bind(key.active)
        .bind(permissions)
        .bind(ips)
        .bind(key.rate_limit_per_minute as i32)
        .bind(key.usage_count as i64)
        .bind(key.last_used_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::map_unique_violation("api_key", e, &key.prefix))?;
        row_to_api_key(&row)
    }

    async fn get_api_key(&self, id: Uuid) -> Result<ApiKey, StorageError> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::not_found("api_key", id))?;
        row_to_api_key(&row)
    }

    async fn find_api_key_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, StorageError> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE prefix = $1")
            .bind(prefix)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.as_ref().map(row_to_api_key).transpose()
    }

    async fn record_api_key_usage(&self, id: Uuid) -> Result<(), StorageError> {
        sqlx::query("UPDATE api_keys SET usage_count = usage_count + 1, last_used_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, StorageError> {
        let rows = sqlx::query("SELECT * FROM api_keys")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.iter().map(row_to_api_key).collect()
    }
}
