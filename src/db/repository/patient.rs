use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{date_from_sql, json_from_sql, json_to_sql, ts_from_sql, ts_to_sql, uuid_from_sql};
use crate::db::DatabaseError;
use crate::models::enums::Gender;
use crate::models::*;

const PATIENT_COLUMNS: &str = "id, identifier, name, gender, birth_date, created_at, updated_at";

/// Insert a patient, or update the one holding the same identifier.
/// On update the stored `id` and `created_at` are kept; every other field is
/// overwritten. Returns the stored row.
pub fn upsert_patient(conn: &Connection, patient: &Patient) -> Result<Patient, DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, identifier, name, gender, birth_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(identifier) DO UPDATE SET
            name = excluded.name,
            gender = excluded.gender,
            birth_date = excluded.birth_date,
            updated_at = excluded.updated_at",
        params![
            patient.id.to_string(),
            patient.identifier,
            json_to_sql(&patient.name)?,
            patient.gender.as_str(),
            patient.birth_date.format("%Y-%m-%d").to_string(),
            ts_to_sql(&patient.created_at),
            ts_to_sql(&patient.updated_at),
        ],
    )?;

    get_patient_by_identifier(conn, &patient.identifier)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "Patient".into(),
        id: patient.identifier.clone(),
    })
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    query_one_patient(
        conn,
        &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
        &id.to_string(),
    )
}

pub fn get_patient_by_identifier(
    conn: &Connection,
    identifier: &str,
) -> Result<Option<Patient>, DatabaseError> {
    query_one_patient(
        conn,
        &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE identifier = ?1"),
        identifier,
    )
}

/// All patients, most recently created first.
pub fn list_patients(conn: &Connection) -> Result<Vec<Patient>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patients ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt.query_map([], read_patient_row)?;

    let mut patients = Vec::new();
    for row in rows {
        patients.push(patient_from_row(row?)?);
    }
    Ok(patients)
}

/// Delete a patient; encounters and everything under them cascade.
pub fn delete_patient(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let deleted = conn.execute("DELETE FROM patients WHERE id = ?1", params![id.to_string()])?;
    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Patient".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

fn query_one_patient(conn: &Connection, sql: &str, key: &str) -> Result<Option<Patient>, DatabaseError> {
    let result = conn.query_row(sql, params![key], read_patient_row);
    match result {
        Ok(row) => Ok(Some(patient_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

struct PatientRow {
    id: String,
    identifier: String,
    name: String,
    gender: String,
    birth_date: String,
    created_at: String,
    updated_at: String,
}

fn read_patient_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        id: row.get(0)?,
        identifier: row.get(1)?,
        name: row.get(2)?,
        gender: row.get(3)?,
        birth_date: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn patient_from_row(row: PatientRow) -> Result<Patient, DatabaseError> {
    Ok(Patient {
        id: uuid_from_sql(&row.id)?,
        identifier: row.identifier,
        name: json_from_sql(&row.name)?,
        gender: Gender::from_str(&row.gender)?,
        birth_date: date_from_sql(&row.birth_date)?,
        created_at: ts_from_sql(&row.created_at)?,
        updated_at: ts_from_sql(&row.updated_at)?,
    })
}
