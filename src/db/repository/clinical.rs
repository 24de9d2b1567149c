use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{json_from_sql, json_to_sql, opt_ts_from_sql, ts_from_sql, ts_to_sql, uuid_from_sql};
use crate::db::DatabaseError;
use crate::models::*;

// ── Conditions ──────────────────────────────────────────────────────────────

pub fn insert_condition(conn: &Connection, condition: &Condition) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO conditions (id, encounter_id, clinical_status, verification_status, code,
                                 onset_datetime, abatement_datetime, severity, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            condition.id.to_string(),
            condition.encounter_id.to_string(),
            condition.clinical_status,
            condition.verification_status,
            json_to_sql(&condition.code)?,
            condition.onset_datetime.as_ref().map(ts_to_sql),
            condition.abatement_datetime.as_ref().map(ts_to_sql),
            condition.severity,
            ts_to_sql(&condition.created_at),
            ts_to_sql(&condition.updated_at),
        ],
    )?;
    Ok(())
}

pub fn list_conditions_by_encounter(
    conn: &Connection,
    encounter_id: &Uuid,
) -> Result<Vec<Condition>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, encounter_id, clinical_status, verification_status, code,
                onset_datetime, abatement_datetime, severity, created_at, updated_at
         FROM conditions WHERE encounter_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )?;

    let rows = stmt.query_map(params![encounter_id.to_string()], |row| {
        Ok(ConditionRow {
            id: row.get(0)?,
            encounter_id: row.get(1)?,
            clinical_status: row.get(2)?,
            verification_status: row.get(3)?,
            code: row.get(4)?,
            onset_datetime: row.get(5)?,
            abatement_datetime: row.get(6)?,
            severity: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    })?;

    let mut conditions = Vec::new();
    for row in rows {
        conditions.push(condition_from_row(row?)?);
    }
    Ok(conditions)
}

struct ConditionRow {
    id: String,
    encounter_id: String,
    clinical_status: String,
    verification_status: String,
    code: String,
    onset_datetime: Option<String>,
    abatement_datetime: Option<String>,
    severity: String,
    created_at: String,
    updated_at: String,
}

fn condition_from_row(row: ConditionRow) -> Result<Condition, DatabaseError> {
    Ok(Condition {
        id: uuid_from_sql(&row.id)?,
        encounter_id: uuid_from_sql(&row.encounter_id)?,
        clinical_status: row.clinical_status,
        verification_status: row.verification_status,
        code: json_from_sql(&row.code)?,
        onset_datetime: opt_ts_from_sql(row.onset_datetime)?,
        abatement_datetime: opt_ts_from_sql(row.abatement_datetime)?,
        severity: row.severity,
        created_at: ts_from_sql(&row.created_at)?,
        updated_at: ts_from_sql(&row.updated_at)?,
    })
}

// ── Observations ────────────────────────────────────────────────────────────

pub fn insert_observation(conn: &Connection, observation: &Observation) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO observations (id, encounter_id, status, code, value_string,
                                   effective_datetime, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            observation.id.to_string(),
            observation.encounter_id.to_string(),
            observation.status,
            json_to_sql(&observation.code)?,
            observation.value_string,
            observation.effective_datetime.as_ref().map(ts_to_sql),
            ts_to_sql(&observation.created_at),
            ts_to_sql(&observation.updated_at),
        ],
    )?;
    Ok(())
}

pub fn list_observations_by_encounter(
    conn: &Connection,
    encounter_id: &Uuid,
) -> Result<Vec<Observation>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, encounter_id, status, code, value_string, effective_datetime, created_at, updated_at
         FROM observations WHERE encounter_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )?;

    let rows = stmt.query_map(params![encounter_id.to_string()], |row| {
        Ok(ObservationRow {
            id: row.get(0)?,
            encounter_id: row.get(1)?,
            status: row.get(2)?,
            code: row.get(3)?,
            value_string: row.get(4)?,
            effective_datetime: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    })?;

    let mut observations = Vec::new();
    for row in rows {
        observations.push(observation_from_row(row?)?);
    }
    Ok(observations)
}

struct ObservationRow {
    id: String,
    encounter_id: String,
    status: String,
    code: String,
    value_string: String,
    effective_datetime: Option<String>,
    created_at: String,
    updated_at: String,
}

fn observation_from_row(row: ObservationRow) -> Result<Observation, DatabaseError> {
    Ok(Observation {
        id: uuid_from_sql(&row.id)?,
        encounter_id: uuid_from_sql(&row.encounter_id)?,
        status: row.status,
        code: json_from_sql(&row.code)?,
        value_string: row.value_string,
        effective_datetime: opt_ts_from_sql(row.effective_datetime)?,
        created_at: ts_from_sql(&row.created_at)?,
        updated_at: ts_from_sql(&row.updated_at)?,
    })
}

// ── Medication statements ───────────────────────────────────────────────────

pub fn insert_medication_statement(
    conn: &Connection,
    statement: &MedicationStatement,
) -> Result<(), DatabaseError> {
    let effective_period = statement.effective_period.as_ref().map(json_to_sql).transpose()?;
    conn.execute(
        "INSERT INTO medication_statements (id, encounter_id, status, medication, dosage,
                                            effective_period, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            statement.id.to_string(),
            statement.encounter_id.to_string(),
            statement.status,
            json_to_sql(&statement.medication)?,
            json_to_sql(&statement.dosage)?,
            effective_period,
            ts_to_sql(&statement.created_at),
            ts_to_sql(&statement.updated_at),
        ],
    )?;
    Ok(())
}

pub fn list_medication_statements_by_encounter(
    conn: &Connection,
    encounter_id: &Uuid,
) -> Result<Vec<MedicationStatement>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, encounter_id, status, medication, dosage, effective_period, created_at, updated_at
         FROM medication_statements WHERE encounter_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )?;

    let rows = stmt.query_map(params![encounter_id.to_string()], |row| {
        Ok(MedicationStatementRow {
            id: row.get(0)?,
            encounter_id: row.get(1)?,
            status: row.get(2)?,
            medication: row.get(3)?,
            dosage: row.get(4)?,
            effective_period: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    })?;

    let mut statements = Vec::new();
    for row in rows {
        statements.push(medication_statement_from_row(row?)?);
    }
    Ok(statements)
}

struct MedicationStatementRow {
    id: String,
    encounter_id: String,
    status: String,
    medication: String,
    dosage: String,
    effective_period: Option<String>,
    created_at: String,
    updated_at: String,
}

fn medication_statement_from_row(row: MedicationStatementRow) -> Result<MedicationStatement, DatabaseError> {
    Ok(MedicationStatement {
        id: uuid_from_sql(&row.id)?,
        encounter_id: uuid_from_sql(&row.encounter_id)?,
        status: row.status,
        medication: json_from_sql(&row.medication)?,
        dosage: json_from_sql(&row.dosage)?,
        effective_period: row.effective_period.as_deref().map(json_from_sql).transpose()?,
        created_at: ts_from_sql(&row.created_at)?,
        updated_at: ts_from_sql(&row.updated_at)?,
    })
}
