//! EMR persistence endpoints.
//!
//! - `POST /emr/save` store an analyzed conversation
//! - `GET /emr/patients` all patients
//! - `GET /emr/records/:patient_id` encounters with clinical rows
//! - `DELETE /emr/patients/:patient_id` remove a patient and their records

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::emr::{self, EmrRecord, EmrSaveRequest};
use crate::models::Patient;

#[derive(Serialize)]
pub struct SaveResponse {
    pub patient_id: Uuid,
    pub encounter_id: Uuid,
    pub message: &'static str,
}

fn parse_patient_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid patient ID: {e}")))
}

/// `POST /emr/save`
pub async fn save(
    State(ctx): State<ApiContext>,
    payload: Result<Json<EmrSaveRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SaveResponse>), ApiError> {
    let Json(request) = payload?;
    let mut conn = ctx.open_db()?;

    let saved = emr::save_emr(
        &mut conn,
        &request,
        &ctx.config.default_language,
        chrono::Utc::now(),
    )?;

    Ok((
        StatusCode::CREATED,
        Json(SaveResponse {
            patient_id: saved.patient_id,
            encounter_id: saved.encounter_id,
            message: "EMR record saved",
        }),
    ))
}

/// `GET /emr/patients`
pub async fn patients(State(ctx): State<ApiContext>) -> Result<Json<Vec<Patient>>, ApiError> {
    let conn = ctx.open_db()?;
    Ok(Json(emr::list_patients(&conn)?))
}

/// `GET /emr/records/:patient_id`
pub async fn records(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
) -> Result<Json<Vec<EmrRecord>>, ApiError> {
    let patient_id = parse_patient_id(&patient_id)?;
    let conn = ctx.open_db()?;
    Ok(Json(emr::patient_records(&conn, &patient_id)?))
}

/// `DELETE /emr/patients/:patient_id`
pub async fn delete_patient(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let patient_id = parse_patient_id(&patient_id)?;
    let conn = ctx.open_db()?;
    emr::delete_patient(&conn, &patient_id)?;
    Ok(StatusCode::NO_CONTENT)
}
