use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::datatypes::{CodeableText, EffectivePeriod};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: Uuid,
    pub encounter_id: Uuid,
    pub clinical_status: String,
    pub verification_status: String,
    pub code: CodeableText,
    pub onset_datetime: Option<DateTime<Utc>>,
    pub abatement_datetime: Option<DateTime<Utc>>,
    pub severity: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: Uuid,
    pub encounter_id: Uuid,
    pub status: String,
    pub code: CodeableText,
    pub value_string: String,
    pub effective_datetime: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationStatement {
    pub id: Uuid,
    pub encounter_id: Uuid,
    pub status: String,
    pub medication: CodeableText,
    pub dosage: CodeableText,
    pub effective_period: Option<EffectivePeriod>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
