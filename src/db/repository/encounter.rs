use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{json_from_sql, json_to_sql, ts_from_sql, ts_to_sql, uuid_from_sql};
use crate::db::DatabaseError;
use crate::models::*;

const ENCOUNTER_COLUMNS: &str =
    "id, patient_id, status, class, encounter_type, period, reason_text, created_at, updated_at";

pub fn insert_encounter(conn: &Connection, encounter: &Encounter) -> Result<(), DatabaseError> {
    let period = encounter.period.as_ref().map(json_to_sql).transpose()?;
    conn.execute(
        "INSERT INTO encounters (id, patient_id, status, class, encounter_type, period, reason_text, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            encounter.id.to_string(),
            encounter.patient_id.to_string(),
            encounter.status,
            encounter.class,
            encounter.encounter_type,
            period,
            encounter.reason_text,
            ts_to_sql(&encounter.created_at),
            ts_to_sql(&encounter.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_encounter(conn: &Connection, id: &Uuid) -> Result<Option<Encounter>, DatabaseError> {
    let result = conn.query_row(
        &format!("SELECT {ENCOUNTER_COLUMNS} FROM encounters WHERE id = ?1"),
        params![id.to_string()],
        read_encounter_row,
    );

    match result {
        Ok(row) => Ok(Some(encounter_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Encounters of one patient, most recent first.
pub fn list_encounters_by_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Encounter>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENCOUNTER_COLUMNS} FROM encounters
         WHERE patient_id = ?1 ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], read_encounter_row)?;

    let mut encounters = Vec::new();
    for row in rows {
        encounters.push(encounter_from_row(row?)?);
    }
    Ok(encounters)
}

struct EncounterRow {
    id: String,
    patient_id: String,
    status: String,
    class: String,
    encounter_type: String,
    period: Option<String>,
    reason_text: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_encounter_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EncounterRow> {
    Ok(EncounterRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        status: row.get(2)?,
        class: row.get(3)?,
        encounter_type: row.get(4)?,
        period: row.get(5)?,
        reason_text: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn encounter_from_row(row: EncounterRow) -> Result<Encounter, DatabaseError> {
    Ok(Encounter {
        id: uuid_from_sql(&row.id)?,
        patient_id: uuid_from_sql(&row.patient_id)?,
        status: row.status,
        class: row.class,
        encounter_type: row.encounter_type,
        period: row.period.as_deref().map(json_from_sql).transpose()?,
        reason_text: row.reason_text,
        created_at: ts_from_sql(&row.created_at)?,
        updated_at: ts_from_sql(&row.updated_at)?,
    })
}
