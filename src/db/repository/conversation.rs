use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{json_from_sql, json_to_sql, ts_from_sql, ts_to_sql, uuid_from_sql};
use crate::db::DatabaseError;
use crate::models::*;

/// Fails with a constraint error when the encounter already has a conversation.
pub fn insert_conversation(conn: &Connection, conv: &Conversation) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO conversations (id, encounter_id, raw_text, summary, participants, language, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            conv.id.to_string(),
            conv.encounter_id.to_string(),
            conv.raw_text,
            conv.summary,
            json_to_sql(&conv.participants)?,
            conv.language,
            ts_to_sql(&conv.created_at),
            ts_to_sql(&conv.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_conversation_by_encounter(
    conn: &Connection,
    encounter_id: &Uuid,
) -> Result<Option<Conversation>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, encounter_id, raw_text, summary, participants, language, created_at, updated_at
         FROM conversations WHERE encounter_id = ?1",
        params![encounter_id.to_string()],
        |row| {
            Ok(ConversationRow {
                id: row.get(0)?,
                encounter_id: row.get(1)?,
                raw_text: row.get(2)?,
                summary: row.get(3)?,
                participants: row.get(4)?,
                language: row.get(5)?,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
            })
        },
    );

    match result {
        Ok(row) => Ok(Some(conversation_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

struct ConversationRow {
    id: String,
    encounter_id: String,
    raw_text: String,
    summary: Option<String>,
    participants: String,
    language: String,
    created_at: String,
    updated_at: String,
}

fn conversation_from_row(row: ConversationRow) -> Result<Conversation, DatabaseError> {
    Ok(Conversation {
        id: uuid_from_sql(&row.id)?,
        encounter_id: uuid_from_sql(&row.encounter_id)?,
        raw_text: row.raw_text,
        summary: row.summary,
        participants: json_from_sql(&row.participants)?,
        language: row.language,
        created_at: ts_from_sql(&row.created_at)?,
        updated_at: ts_from_sql(&row.updated_at)?,
    })
}
