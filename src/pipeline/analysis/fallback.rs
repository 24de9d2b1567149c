use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::datetime::to_canonical;

/// Record substituted when the model output cannot be repaired.
///
/// Always maps cleanly: one Condition, one Observation, no medications,
/// and `Encounter.period.start` equal to `processed_at`.
pub fn fallback_record(processed_at: &DateTime<Utc>) -> Value {
    let now = to_canonical(processed_at);
    json!({
        "Patient": {
            "name": { "text": "unknown" },
            "birth_date": null,
            "gender": null
        },
        "Encounter": {
            "status": "finished",
            "class": "AMB",
            "type": "visit",
            "period": { "start": now },
            "reason_text": "consultation"
        },
        "Condition": {
            "clinical_status": "active",
            "verification_status": "provisional",
            "code": { "text": "needs consultation" },
            "onset_datetime": now,
            "severity": "moderate"
        },
        "Observation": [{
            "status": "final",
            "code": { "text": "initial consultation" },
            "value_string": "details to be determined",
            "effective_datetime": now
        }],
        "MedicationStatement": []
    })
}
