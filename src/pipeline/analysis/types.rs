use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::AnalysisError;
use crate::models::{CodeableText, EffectivePeriod, HumanName, Period};

/// Result of one analysis call: the five-key record plus provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub record: Value,
    /// True when the model output was beyond repair and the fallback
    /// record was substituted.
    pub recovered: bool,
    pub processed_at: DateTime<Utc>,
}

/// Patient attributes the model asserted. Never carries an identifier.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatientFields {
    pub name: Option<HumanName>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterFields {
    pub status: String,
    pub class: String,
    #[serde(rename = "type")]
    pub encounter_type: String,
    pub period: Option<Period>,
    pub reason_text: Option<String>,
}

impl Default for EncounterFields {
    fn default() -> Self {
        Self {
            status: "finished".into(),
            class: "AMB".into(),
            encounter_type: "visit".into(),
            period: None,
            reason_text: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionFields {
    pub encounter_id: Uuid,
    pub clinical_status: String,
    pub verification_status: String,
    pub code: CodeableText,
    pub onset_datetime: Option<DateTime<Utc>>,
    pub abatement_datetime: Option<DateTime<Utc>>,
    pub severity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationFields {
    pub encounter_id: Uuid,
    pub status: String,
    pub code: CodeableText,
    pub value_string: String,
    pub effective_datetime: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationStatementFields {
    pub encounter_id: Uuid,
    pub status: String,
    pub medication: CodeableText,
    pub dosage: CodeableText,
    pub effective_period: Option<EffectivePeriod>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationFields {
    pub encounter_id: Uuid,
    pub raw_text: String,
    pub summary: Option<String>,
    pub participants: BTreeMap<String, String>,
    pub language: String,
}

/// Why a section (or one entry of it) was left out of the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ExpectedObject,
    ExpectedList,
    EntryNotObject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSection {
    pub section: String,
    /// Position inside a list section, when a single entry was skipped.
    pub index: Option<usize>,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubResources {
    pub conditions: Vec<ConditionFields>,
    pub observations: Vec<ObservationFields>,
    pub medication_statements: Vec<MedicationStatementFields>,
    pub skipped: Vec<SkippedSection>,
}

/// Abstraction over LLM backends (Azure OpenAI in production, mock in tests).
pub trait LlmClient {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, AnalysisError>;
}
