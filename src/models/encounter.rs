use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::datatypes::Period;

/// One clinical visit; aggregation root for the clinical rows and the
/// conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub status: String,
    pub class: String,
    #[serde(rename = "type")]
    pub encounter_type: String,
    pub period: Option<Period>,
    pub reason_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
