use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::datetime::{json_kind, to_canonical};
use super::fallback::fallback_record;
use super::prompt::{build_analysis_prompt, ANALYSIS_SYSTEM_PROMPT};
use super::repair::parse_repaired;
use super::sanitize::sanitize_for_llm;
use super::types::{AnalysisOutcome, LlmClient};
use super::AnalysisError;

/// Minimum dialogue length for analysis (characters).
const MIN_INPUT_LENGTH: usize = 10;

/// Extra attempts after a retryable transport failure.
const MAX_LLM_RETRIES: usize = 2;

/// Runs one dialogue through the pipeline:
/// sanitize → prompt → LLM → repair → parse (or fallback) → stamp
pub struct ConversationAnalyzer {
    llm: Box<dyn LlmClient + Send + Sync>,
    model_name: String,
}

impl ConversationAnalyzer {
    pub fn new(llm: Box<dyn LlmClient + Send + Sync>, model_name: &str) -> Self {
        Self {
            llm,
            model_name: model_name.to_string(),
        }
    }

    /// Analyze a dialogue. Malformed model output never fails the call; only
    /// input validation and transport errors do.
    pub fn analyze(
        &self,
        text: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let _span = tracing::info_span!("analyze_conversation", input_chars = text.len()).entered();

        if text.trim().chars().count() < MIN_INPUT_LENGTH {
            return Err(AnalysisError::InputTooShort);
        }
        let sanitized = sanitize_for_llm(text);
        if sanitized.chars().count() < MIN_INPUT_LENGTH {
            return Err(AnalysisError::InputTooShort);
        }

        let prompt = build_analysis_prompt(&sanitized);
        let completion = self.call_llm_with_retry(&prompt)?;
        let outcome = analyze_completion(&completion, processed_at);

        tracing::info!(recovered = outcome.recovered, "Conversation analyzed");
        Ok(outcome)
    }

    fn call_llm_with_retry(&self, prompt: &str) -> Result<String, AnalysisError> {
        for attempt in 0..=MAX_LLM_RETRIES {
            match self
                .llm
                .generate(&self.model_name, prompt, ANALYSIS_SYSTEM_PROMPT)
            {
                Ok(completion) => return Ok(completion),
                // No content is unusable output, not a transport failure.
                Err(AnalysisError::EmptyCompletion) => {
                    tracing::warn!("LLM returned no content");
                    return Ok(String::new());
                }
                Err(e) if is_retryable_error(&e) && attempt < MAX_LLM_RETRIES => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "LLM call failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(AnalysisError::TaskFailed("All retry attempts exhausted".into()))
    }
}

/// Check if an error is retryable at the LLM call level.
fn is_retryable_error(e: &AnalysisError) -> bool {
    matches!(
        e,
        AnalysisError::LlmConnection(_) | AnalysisError::HttpClient(_) | AnalysisError::LlmError { .. }
    )
}

/// Repair, parse and stamp one raw completion. Total: output beyond repair
/// (or that is not a JSON object) yields the fallback record.
pub fn analyze_completion(raw: &str, processed_at: DateTime<Utc>) -> AnalysisOutcome {
    let (mut record, recovered) = match parse_repaired(raw) {
        Ok(value @ Value::Object(_)) => (value, false),
        Ok(other) => {
            tracing::error!(
                kind = json_kind(&other),
                "Model output is not a JSON object, using fallback record"
            );
            (fallback_record(&processed_at), true)
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                input_len = raw.len(),
                "Model output could not be repaired, using fallback record"
            );
            (fallback_record(&processed_at), true)
        }
    };

    stamp_processing_time(&mut record, &processed_at);

    AnalysisOutcome {
        record,
        recovered,
        processed_at,
    }
}

/// Overwrite `Encounter.period.start` and each `Observation[*].effective_datetime`
/// with the processing time. Condition onset and medication periods stay as
/// the model asserted them.
pub fn stamp_processing_time(record: &mut Value, processed_at: &DateTime<Utc>) {
    let stamp = Value::String(to_canonical(processed_at));

    if let Some(Value::Object(encounter)) = record.get_mut("Encounter") {
        let period = encounter
            .entry("period")
            .or_insert_with(|| Value::Object(Map::new()));
        if !period.is_object() {
            *period = Value::Object(Map::new());
        }
        if let Value::Object(period) = period {
            period.insert("start".into(), stamp.clone());
        }
    }

    if let Some(Value::Array(observations)) = record.get_mut("Observation") {
        for obs in observations.iter_mut().filter_map(Value::as_object_mut) {
            obs.insert("effective_datetime".into(), stamp.clone());
        }
    }
}
