//! Problem packager (spec §4.D) — drives four concurrent sentence
//! generations (1 correct + 3 incorrect) and assembles a `Problem`.

use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    GenerationTrace, Problem, ProblemMetadata, ProblemType, SentenceTrace, Statement, Verb,
};
use crate::llm::{parse_sentence_completion, ContentGenerationError, LlmGenerator};
use crate::prompt::{self, ErrorType, SentenceParams};

/// Everything the caller (a worker) decided before invoking the
/// packager: which verb, which grammatical shape, and which model to
/// generate with.
pub struct PackagingRequest {
    pub verb: Verb,
    pub params: SentenceParams,
    pub model: String,
    pub target_language_code: String,
    pub topic_tags: HashSet<String>,
    pub generation_request_id: Option<Uuid>,
    /// A known-correct conjugated form for `params.pronoun`/`params.tense`,
    /// surfaced from the conjugation cache (spec §4.A) and passed to the
    /// model as a reference hint. `None` when nothing is on file yet.
    pub reference_form: Option<String>,
}

pub struct ProblemPackager {
    llm: Arc<dyn LlmGenerator>,
}

impl ProblemPackager {
    pub fn new(llm: Arc<dyn LlmGenerator>) -> Self {
        Self { llm }
    }

    /// Fails the whole problem if any of the four generations fails
    /// (spec §4.D: "a single failure among the four fails the whole
    /// problem").
    pub async fn package(&self, request: PackagingRequest) -> Result<Problem, ContentGenerationError> {
        let error_types = prompt::select_error_types(&request.verb, &request.params);

        let reference_form = request.reference_form.as_deref();
        let correct_prompt = prompt::render_correct_prompt(&request.verb, &request.params, reference_form);
        let incorrect_prompts: Vec<_> = error_types
            .iter()
            .map(|et| prompt::render_incorrect_prompt(&request.verb, &request.params, *et, reference_form))
            .collect();

        let correct_fut = self.generate_sentence(&correct_prompt.prompt, &request.model, "correct_sentence", None);
        let incorrect_futs = incorrect_prompts
            .iter()
            .map(|rendered| {
                self.generate_sentence(
                    &rendered.prompt,
                    &request.model,
                    rendered.error_type.expect("incorrect prompt always carries an error type").tag(),
                    rendered.error_type,
                )
            })
            .collect::<Vec<_>>();

        let (correct_result, incorrect_results) = futures::join!(correct_fut, futures::future::join_all(incorrect_futs));

        let correct_outcome = correct_result?;
        let mut incorrect_outcomes = Vec::with_capacity(3);
        for outcome in incorrect_results {
            incorrect_outcomes.push(outcome?);
        }

        let correct_index = prompt::random_slot(4);
        let mut statements = Vec::with_capacity(4);
        let mut traces = Vec::with_capacity(4);
        let mut incorrect_iter = incorrect_outcomes.into_iter();
        let mut correct_slot = Some(correct_outcome);

        for slot in 0..4 {
            if slot == correct_index {
                let (statement, trace) = correct_slot.take().expect("correct outcome consumed exactly once");
                statements.push(statement);
                traces.push(trace);
            } else {
                let (statement, trace) = incorrect_iter.next().expect("exactly three incorrect outcomes");
                statements.push(statement);
                traces.push(trace);
            }
        }

        let generation_trace = GenerationTrace::from_sentences(traces);
        let now = chrono::Utc::now();

        let mut tenses_used = HashSet::new();
        tenses_used.insert(format!("{:?}", request.params.tense));

        let metadata = ProblemMetadata {
            grammatical_focus: error_types.iter().map(|e| e.tag().to_string()).collect(),
            tenses_used: tenses_used.into_iter().collect(),
            verb_infinitives: vec![request.verb.infinitive.clone()],
            includes_cod: request.params.direct_object.is_present(),
            includes_coi: request.params.indirect_object.is_present(),
            includes_negation: request.params.negation != crate::domain::Negation::None,
            prompt_version: prompt::PROMPT_VERSION.to_string(),
        };

        let problem = Problem {
            id: Uuid::new_v4(),
            problem_type: ProblemType::Grammar,
            title: format!("{} — {:?}", request.verb.infinitive, request.params.tense),
            instructions: "Select the grammatically correct sentence.".to_string(),
            statements,
            correct_answer_index: correct_index,
            topic_tags: request.topic_tags,
            source_statement_ids: Vec::new(),
            metadata,
            target_language_code: request.target_language_code,
            created_at: now,
            updated_at: now,
            last_served_at: None,
            generation_trace,
            generation_request_id: request.generation_request_id,
        };

        problem
            .validate()
            .map_err(|message| ContentGenerationError { operation: "package_problem".to_string(), message })?;

        Ok(problem)
    }

    async fn generate_sentence(
        &self,
        prompt: &str,
        model: &str,
        operation_tag: &str,
        error_type: Option<ErrorType>,
    ) -> Result<(Statement, SentenceTrace), ContentGenerationError> {
        let response = self.llm.generate(prompt, model, operation_tag).await?;
        let completion = parse_sentence_completion(&response.content, operation_tag)?;

        let is_correct = error_type.is_none();
        if is_correct && !completion.explanation.trim().is_empty() {
            return Err(ContentGenerationError {
                operation: operation_tag.to_string(),
                message: "correct sentence must not carry an explanation".to_string(),
            });
        }
        if !is_correct && completion.explanation.trim().is_empty() {
            return Err(ContentGenerationError {
                operation: operation_tag.to_string(),
                message: "incorrect sentence requires a non-empty explanation".to_string(),
            });
        }

        let statement = Statement::Grammar {
            content: completion.sentence,
            is_correct,
            translation: is_correct.then_some(completion.translation),
            explanation: (!is_correct).then_some(completion.explanation),
            extra: Default::default(),
        };

        let trace = SentenceTrace {
            prompt: prompt.to_string(),
            model: response.model,
            response_id: response.response_id,
            reasoning_content: response.reasoning_content,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
            reasoning_tokens: response.reasoning_tokens,
            total_tokens: response.total_tokens,
            duration_ms: response.duration_ms,
            error_type: error_type.map(|e| e.tag().to_string()),
            raw_content: response.raw_content,
        };

        Ok((statement, trace))
    }
}
