//! EMR service: persists one analyzed conversation as patient, encounter,
//! conversation and clinical rows, and reads them back per patient.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::enums::Gender;
use crate::models::*;
use crate::pipeline::analysis::datetime::parse_date;
use crate::pipeline::analysis::{
    map_conversation, map_encounter, map_patient, map_sub_resources, ConditionFields,
    ConversationFields, EncounterFields, MedicationStatementFields, ObservationFields,
};

#[derive(Error, Debug)]
pub enum EmrError {
    #[error("Invalid save request: {0}")]
    InvalidRequest(String),

    #[error("Patient not found: {0}")]
    PatientNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for EmrError {
    fn from(e: rusqlite::Error) -> Self {
        EmrError::Database(e.into())
    }
}

/// Save payload: patient identity from the caller plus the analysis record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmrSaveRequest {
    pub patient_identifier: String,
    #[serde(default)]
    pub patient_name: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub patient_birth_date: Option<String>,
    #[serde(default)]
    pub patient_gender: Option<String>,
    pub conversation_text: String,
    pub llm_analysis_result: Value,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmrSaveResponse {
    pub patient_id: Uuid,
    pub encounter_id: Uuid,
}

/// One encounter with everything recorded under it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmrRecord {
    pub encounter: Encounter,
    pub conditions: Vec<Condition>,
    pub observations: Vec<Observation>,
    pub medications: Vec<MedicationStatement>,
    pub conversation: Option<Conversation>,
}

/// Resolved patient attributes: request values first, model values for gaps.
struct PatientIdentity {
    identifier: String,
    name: HumanName,
    birth_date: chrono::NaiveDate,
    gender: Gender,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn resolve_identity(request: &EmrSaveRequest) -> Result<PatientIdentity, EmrError> {
    let identifier = non_blank(Some(request.patient_identifier.as_str()))
        .ok_or_else(|| EmrError::InvalidRequest("patient_identifier is required".into()))?
        .to_string();

    let asserted = map_patient(&request.llm_analysis_result).unwrap_or_default();

    let name = match non_blank(request.patient_name.as_deref()) {
        Some(name) => HumanName::from_text(name),
        None => asserted
            .name
            .ok_or_else(|| EmrError::InvalidRequest("patient_name is required".into()))?,
    };

    let birth_date = match non_blank(request.patient_birth_date.as_deref()) {
        Some(raw) => parse_date(raw).ok_or_else(|| {
            EmrError::InvalidRequest(format!("patient_birth_date must be YYYY-MM-DD, got {raw:?}"))
        })?,
        None => asserted
            .birth_date
            .ok_or_else(|| EmrError::InvalidRequest("patient_birth_date is required".into()))?,
    };

    let gender = match non_blank(request.patient_gender.as_deref()) {
        Some(raw) => Gender::parse_loose(raw)
            .ok_or_else(|| EmrError::InvalidRequest(format!("unsupported patient_gender {raw:?}")))?,
        None => asserted
            .gender
            .as_deref()
            .and_then(Gender::parse_loose)
            .unwrap_or(Gender::Unknown),
    };

    Ok(PatientIdentity {
        identifier,
        name,
        birth_date,
        gender,
    })
}

fn encounter_record(patient_id: Uuid, fields: EncounterFields, now: DateTime<Utc>) -> Encounter {
    Encounter {
        id: Uuid::new_v4(),
        patient_id,
        status: fields.status,
        class: fields.class,
        encounter_type: fields.encounter_type,
        period: fields.period,
        reason_text: fields.reason_text,
        created_at: now,
        updated_at: now,
    }
}

fn condition_record(fields: ConditionFields, now: DateTime<Utc>) -> Condition {
    Condition {
        id: Uuid::new_v4(),
        encounter_id: fields.encounter_id,
        clinical_status: fields.clinical_status,
        verification_status: fields.verification_status,
        code: fields.code,
        onset_datetime: fields.onset_datetime,
        abatement_datetime: fields.abatement_datetime,
        severity: fields.severity,
        created_at: now,
        updated_at: now,
    }
}

fn observation_record(fields: ObservationFields, now: DateTime<Utc>) -> Observation {
    Observation {
        id: Uuid::new_v4(),
        encounter_id: fields.encounter_id,
        status: fields.status,
        code: fields.code,
        value_string: fields.value_string,
        effective_datetime: fields.effective_datetime,
        created_at: now,
        updated_at: now,
    }
}

fn medication_record(fields: MedicationStatementFields, now: DateTime<Utc>) -> MedicationStatement {
    MedicationStatement {
        id: Uuid::new_v4(),
        encounter_id: fields.encounter_id,
        status: fields.status,
        medication: fields.medication,
        dosage: fields.dosage,
        effective_period: fields.effective_period,
        created_at: now,
        updated_at: now,
    }
}

fn conversation_record(fields: ConversationFields, now: DateTime<Utc>) -> Conversation {
    Conversation {
        id: Uuid::new_v4(),
        encounter_id: fields.encounter_id,
        raw_text: fields.raw_text,
        summary: fields.summary,
        participants: fields.participants,
        language: fields.language,
        created_at: now,
        updated_at: now,
    }
}

/// Persist one analyzed conversation in a single transaction.
///
/// The patient is upserted by the request's identifier; the model output is
/// never the identity source. A record without an `Encounter` section gets a
/// default encounter.
pub fn save_emr(
    conn: &mut Connection,
    request: &EmrSaveRequest,
    default_language: &str,
    now: DateTime<Utc>,
) -> Result<EmrSaveResponse, EmrError> {
    if request.conversation_text.trim().is_empty() {
        return Err(EmrError::InvalidRequest("conversation_text is required".into()));
    }
    let identity = resolve_identity(request)?;
    let record = &request.llm_analysis_result;
    let language = non_blank(request.language.as_deref()).unwrap_or(default_language);

    let tx = conn.transaction()?;

    let patient = db::upsert_patient(
        &tx,
        &Patient {
            id: Uuid::new_v4(),
            identifier: identity.identifier,
            name: identity.name,
            gender: identity.gender,
            birth_date: identity.birth_date,
            created_at: now,
            updated_at: now,
        },
    )?;

    let encounter_fields = map_encounter(record).unwrap_or_default();
    let summary = encounter_fields.reason_text.clone();
    let encounter = encounter_record(patient.id, encounter_fields, now);
    db::insert_encounter(&tx, &encounter)?;

    let conversation = map_conversation(
        encounter.id,
        &request.conversation_text,
        patient.name.display().as_deref(),
        language,
        summary,
    );
    db::insert_conversation(&tx, &conversation_record(conversation, now))?;

    let subs = map_sub_resources(record, encounter.id);
    let counts = (
        subs.conditions.len(),
        subs.observations.len(),
        subs.medication_statements.len(),
    );
    for fields in subs.conditions {
        db::insert_condition(&tx, &condition_record(fields, now))?;
    }
    for fields in subs.observations {
        db::insert_observation(&tx, &observation_record(fields, now))?;
    }
    for fields in subs.medication_statements {
        db::insert_medication_statement(&tx, &medication_record(fields, now))?;
    }

    tx.commit()?;

    tracing::info!(
        patient_id = %patient.id,
        encounter_id = %encounter.id,
        conditions = counts.0,
        observations = counts.1,
        medications = counts.2,
        skipped = subs.skipped.len(),
        "EMR record saved"
    );

    Ok(EmrSaveResponse {
        patient_id: patient.id,
        encounter_id: encounter.id,
    })
}

/// All patients, most recently created first.
pub fn list_patients(conn: &Connection) -> Result<Vec<Patient>, EmrError> {
    Ok(db::list_patients(conn)?)
}

/// Every encounter of a patient, newest first, with its clinical rows.
/// A patient without encounters is reported as not found.
pub fn patient_records(conn: &Connection, patient_id: &Uuid) -> Result<Vec<EmrRecord>, EmrError> {
    let encounters = db::list_encounters_by_patient(conn, patient_id)?;
    if encounters.is_empty() {
        return Err(EmrError::PatientNotFound(patient_id.to_string()));
    }

    let mut records = Vec::with_capacity(encounters.len());
    for encounter in encounters {
        records.push(EmrRecord {
            conditions: db::list_conditions_by_encounter(conn, &encounter.id)?,
            observations: db::list_observations_by_encounter(conn, &encounter.id)?,
            medications: db::list_medication_statements_by_encounter(conn, &encounter.id)?,
            conversation: db::get_conversation_by_encounter(conn, &encounter.id)?,
            encounter,
        });
    }
    Ok(records)
}

/// Delete a patient and, by cascade, everything recorded for them.
pub fn delete_patient(conn: &Connection, patient_id: &Uuid) -> Result<(), EmrError> {
    match db::delete_patient(conn, patient_id) {
        Ok(()) => {
            tracing::info!(patient_id = %patient_id, "Patient deleted");
            Ok(())
        }
        Err(DatabaseError::NotFound { id, .. }) => Err(EmrError::PatientNotFound(id)),
        Err(e) => Err(e.into()),
    }
}
