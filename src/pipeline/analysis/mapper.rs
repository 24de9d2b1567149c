//! Projects the repaired, loosely-typed model record into the field sets the
//! persistence layer stores.
//!
//! Every operation is a pure function of its input. Missing or `null` keys
//! take defaults; a section of the wrong shape is skipped and reported in
//! `SubResources::skipped`, never raised.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use uuid::Uuid;

use super::datetime::{coerce_date, coerce_datetime, json_kind, to_canonical};
use super::types::{
    ConditionFields, ConversationFields, EncounterFields, MedicationStatementFields,
    ObservationFields, PatientFields, SkipReason, SkippedSection, SubResources,
};
use crate::models::{CodeableText, EffectivePeriod, HumanName, Period};

type Object = Map<String, Value>;

/// Shape of one top-level section of the model record.
#[derive(Debug, Clone, Copy)]
pub enum Section<'a> {
    Missing,
    Object(&'a Object),
    List(&'a [Value]),
    Other(&'a Value),
}

impl<'a> Section<'a> {
    pub fn classify(record: &'a Value, key: &str) -> Self {
        match record.get(key) {
            None | Some(Value::Null) => Section::Missing,
            Some(Value::Object(map)) => Section::Object(map),
            Some(Value::Array(items)) => Section::List(items),
            Some(other) => Section::Other(other),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Section::Missing => "missing",
            Section::Object(_) => "object",
            Section::List(_) => "array",
            Section::Other(v) => json_kind(v),
        }
    }
}

fn skip(section: &str, index: Option<usize>, reason: SkipReason, found: &str) -> SkippedSection {
    tracing::warn!(section, ?index, ?reason, found, "Skipping section of unexpected shape");
    SkippedSection {
        section: section.to_string(),
        index,
        reason,
    }
}

/// Text of a concept-like value: a bare string, `{text}`, `{display}`,
/// `{coding: [{display}]}` or `{code}`, or the first such entry of a list.
/// Blank text counts as absent.
fn concept_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(obj) => concept_text(obj.get("text"))
            .or_else(|| concept_text(obj.get("display")))
            .or_else(|| concept_text(obj.get("coding")))
            .or_else(|| concept_text(obj.get("code"))),
        Value::Array(items) => items.iter().find_map(|item| concept_text(Some(item))),
        Value::Null => None,
    }
}

fn text_or(obj: &Object, key: &str, default: &str) -> String {
    concept_text(obj.get(key)).unwrap_or_else(|| default.to_string())
}

/// Free-text value taken as given; only absent or null becomes empty.
/// Non-string values keep their JSON text.
fn free_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Encounter class is usually a coding, where the code is the useful part.
fn class_code(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Object(obj) => concept_text(obj.get("code")).or_else(|| concept_text(value)),
        _ => concept_text(value),
    }
}

fn human_name(value: Option<&Value>) -> Option<HumanName> {
    let name = match value? {
        Value::String(s) if !s.trim().is_empty() => HumanName::from_text(s.trim()),
        Value::Object(obj) => HumanName {
            text: concept_text(obj.get("text")),
            family: concept_text(obj.get("family")),
            given: match obj.get("given") {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|g| concept_text(Some(g)))
                    .collect(),
                other => concept_text(other).into_iter().collect(),
            },
        },
        _ => return None,
    };
    name.display().map(|_| name)
}

/// Patient attributes from the `Patient` section, `None` when the section is
/// absent, empty or not an object.
pub fn map_patient(record: &Value) -> Option<PatientFields> {
    let patient = match Section::classify(record, "Patient") {
        Section::Object(obj) if !obj.is_empty() => obj,
        Section::Object(_) | Section::Missing => return None,
        other => {
            skip("Patient", None, SkipReason::ExpectedObject, other.kind());
            return None;
        }
    };

    Some(PatientFields {
        name: human_name(patient.get("name")),
        birth_date: coerce_date("Patient.birth_date", patient.get("birth_date")),
        gender: concept_text(patient.get("gender")),
    })
}

/// Encounter attributes with defaults applied. `None` when the section is
/// absent, empty or not an object; the caller then uses
/// `EncounterFields::default()`.
pub fn map_encounter(record: &Value) -> Option<EncounterFields> {
    let encounter = match Section::classify(record, "Encounter") {
        Section::Object(obj) if !obj.is_empty() => obj,
        Section::Object(_) | Section::Missing => return None,
        other => {
            skip("Encounter", None, SkipReason::ExpectedObject, other.kind());
            return None;
        }
    };

    let defaults = EncounterFields::default();
    let period = match encounter.get("period") {
        Some(Value::Object(p)) => {
            let start = coerce_datetime("Encounter.period.start", p.get("start"));
            let end = coerce_datetime("Encounter.period.end", p.get("end"));
            (start.is_some() || end.is_some()).then(|| Period {
                start: start.as_ref().map(to_canonical),
                end: end.as_ref().map(to_canonical),
            })
        }
        _ => None,
    };

    Some(EncounterFields {
        status: concept_text(encounter.get("status")).unwrap_or(defaults.status),
        class: class_code(encounter.get("class")).unwrap_or(defaults.class),
        encounter_type: concept_text(encounter.get("type")).unwrap_or(defaults.encounter_type),
        period,
        reason_text: concept_text(encounter.get("reason_text")),
    })
}

fn map_condition(obj: &Object, encounter_id: Uuid) -> ConditionFields {
    ConditionFields {
        encounter_id,
        clinical_status: text_or(obj, "clinical_status", "active"),
        verification_status: text_or(obj, "verification_status", "provisional"),
        code: CodeableText::new(text_or(obj, "code", "unspecified")),
        onset_datetime: coerce_datetime("Condition.onset_datetime", obj.get("onset_datetime")),
        abatement_datetime: coerce_datetime(
            "Condition.abatement_datetime",
            obj.get("abatement_datetime"),
        ),
        severity: text_or(obj, "severity", "moderate"),
    }
}

fn map_observation(obj: &Object, encounter_id: Uuid) -> ObservationFields {
    ObservationFields {
        encounter_id,
        status: text_or(obj, "status", "final"),
        code: CodeableText::new(text_or(obj, "code", "observation")),
        value_string: free_text(obj.get("value_string")),
        effective_datetime: coerce_datetime(
            "Observation.effective_datetime",
            obj.get("effective_datetime"),
        ),
    }
}

fn map_medication(obj: &Object, encounter_id: Uuid) -> MedicationStatementFields {
    let effective_period = match obj.get("effective_period") {
        Some(Value::Object(p)) => Some(EffectivePeriod {
            start: coerce_datetime("MedicationStatement.effective_period.start", p.get("start")),
            end: coerce_datetime("MedicationStatement.effective_period.end", p.get("end")),
        }),
        _ => None,
    };

    MedicationStatementFields {
        encounter_id,
        status: text_or(obj, "status", "active"),
        medication: CodeableText::new(text_or(obj, "medication", "unknown medication")),
        dosage: CodeableText::new(text_or(obj, "dosage", "unspecified")),
        effective_period,
    }
}

/// Map each object entry of a list section; anything else is recorded as skipped.
fn map_list<T>(
    record: &Value,
    section: &str,
    skipped: &mut Vec<SkippedSection>,
    map_entry: impl Fn(&Object) -> T,
) -> Vec<T> {
    match Section::classify(record, section) {
        Section::Missing => Vec::new(),
        Section::List(items) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item {
                Value::Object(obj) => Some(map_entry(obj)),
                other => {
                    skipped.push(skip(section, Some(i), SkipReason::EntryNotObject, json_kind(other)));
                    None
                }
            })
            .collect(),
        other => {
            skipped.push(skip(section, None, SkipReason::ExpectedList, other.kind()));
            Vec::new()
        }
    }
}

/// Conditions, observations and medication statements for `encounter_id`.
///
/// At most one condition, built only from an object-shaped `Condition`;
/// observations and medications only from list-shaped sections.
pub fn map_sub_resources(record: &Value, encounter_id: Uuid) -> SubResources {
    let mut skipped = Vec::new();

    let conditions = match Section::classify(record, "Condition") {
        Section::Missing => Vec::new(),
        Section::Object(obj) => vec![map_condition(obj, encounter_id)],
        other => {
            skipped.push(skip("Condition", None, SkipReason::ExpectedObject, other.kind()));
            Vec::new()
        }
    };

    let observations = map_list(record, "Observation", &mut skipped, |obj| {
        map_observation(obj, encounter_id)
    });
    let medication_statements = map_list(record, "MedicationStatement", &mut skipped, |obj| {
        map_medication(obj, encounter_id)
    });

    SubResources {
        conditions,
        observations,
        medication_statements,
        skipped,
    }
}

/// The single conversation stored with an encounter.
pub fn map_conversation(
    encounter_id: Uuid,
    raw_text: &str,
    patient_name: Option<&str>,
    language: &str,
    summary: Option<String>,
) -> ConversationFields {
    let mut participants = BTreeMap::new();
    if let Some(name) = patient_name.filter(|n| !n.trim().is_empty()) {
        participants.insert("patient".to_string(), name.trim().to_string());
    }

    ConversationFields {
        encounter_id,
        raw_text: raw_text.to_string(),
        summary: summary.filter(|s| !s.trim().is_empty()),
        participants,
        language: language.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::fallback::fallback_record;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn observation_defaults_applied() {
        let record = json!({"Observation": [{"code": {"text": "sleep issue"}}]});
        let subs = map_sub_resources(&record, Uuid::new_v4());
        assert_eq!(subs.observations.len(), 1);
        let obs = &subs.observations[0];
        assert_eq!(obs.code.text, "sleep issue");
        assert_eq!(obs.status, "final");
        assert_eq!(obs.value_string, "");
        assert!(obs.effective_datetime.is_none());
    }

    #[test]
    fn no_condition_key_means_no_conditions() {
        let record = json!({"Observation": []});
        let subs = map_sub_resources(&record, Uuid::new_v4());
        assert!(subs.conditions.is_empty());
        assert!(subs.skipped.is_empty());
    }

    #[test]
    fn empty_condition_object_gets_defaults() {
        let subs = map_sub_resources(&json!({"Condition": {}}), Uuid::new_v4());
        assert_eq!(subs.conditions.len(), 1);
        let c = &subs.conditions[0];
        assert_eq!(c.clinical_status, "active");
        assert_eq!(c.verification_status, "provisional");
        assert_eq!(c.severity, "moderate");
        assert_eq!(c.code.text, "unspecified");
    }

    #[test]
    fn observation_value_string_kept_verbatim() {
        let record = json!({"Observation": [
            {"value_string": "  four hours, waking at 3am  "},
            {"value_string": 7},
            {"value_string": {"text": "low"}},
            {"value_string": null}
        ]});
        let values: Vec<_> = map_sub_resources(&record, Uuid::new_v4())
            .observations
            .into_iter()
            .map(|o| o.value_string)
            .collect();
        assert_eq!(
            values,
            vec!["  four hours, waking at 3am  ", "7", r#"{"text":"low"}"#, ""]
        );
    }

    #[test]
    fn condition_list_skipped_siblings_kept() {
        let record = json!({
            "Condition": [{"code": {"text": "depression"}}],
            "Observation": [{"code": {"text": "anxiety"}}],
            "MedicationStatement": [{"medication": {"text": "sertraline 50mg"}}]
        });
        let subs = map_sub_resources(&record, Uuid::new_v4());
        assert!(subs.conditions.is_empty());
        assert_eq!(subs.observations.len(), 1);
        assert_eq!(subs.medication_statements.len(), 1);
        assert_eq!(
            subs.skipped,
            vec![SkippedSection {
                section: "Condition".into(),
                index: None,
                reason: SkipReason::ExpectedObject,
            }]
        );
    }

    #[test]
    fn observation_object_instead_of_list_skipped() {
        let subs = map_sub_resources(&json!({"Observation": {"status": "final"}}), Uuid::new_v4());
        assert!(subs.observations.is_empty());
        assert_eq!(subs.skipped[0].reason, SkipReason::ExpectedList);
    }

    #[test]
    fn non_object_list_entries_skipped_by_index() {
        let record = json!({"MedicationStatement": ["aspirin", {"dosage": {"text": "daily"}}, 3]});
        let subs = map_sub_resources(&record, Uuid::new_v4());
        assert_eq!(subs.medication_statements.len(), 1);
        let indices: Vec<_> = subs.skipped.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![Some(0), Some(2)]);
        assert!(subs.skipped.iter().all(|s| s.reason == SkipReason::EntryNotObject));
    }

    #[test]
    fn medication_defaults_and_period_coercion() {
        let record = json!({"MedicationStatement": [{
            "effective_period": {"start": "2024-01-10", "end": "whenever"}
        }]});
        let subs = map_sub_resources(&record, Uuid::new_v4());
        let med = &subs.medication_statements[0];
        assert_eq!(med.status, "active");
        assert_eq!(med.medication.text, "unknown medication");
        assert_eq!(med.dosage.text, "unspecified");
        let period = med.effective_period.as_ref().unwrap();
        assert_eq!(period.start, Some(Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap()));
        assert!(period.end.is_none());
    }

    #[test]
    fn blank_concept_text_uses_placeholder() {
        let record = json!({"MedicationStatement": [{
            "medication": {"text": "  "},
            "dosage": null
        }]});
        let med = &map_sub_resources(&record, Uuid::new_v4()).medication_statements[0];
        assert_eq!(med.medication.text, "unknown medication");
        assert_eq!(med.dosage.text, "unspecified");
    }

    #[test]
    fn bare_string_concepts_accepted() {
        let record = json!({"Condition": {"code": "insomnia", "severity": "mild"}});
        let c = &map_sub_resources(&record, Uuid::new_v4()).conditions[0];
        assert_eq!(c.code.text, "insomnia");
        assert_eq!(c.severity, "mild");
    }

    #[test]
    fn concept_display_used_when_text_missing() {
        let record = json!({"Observation": [{"code": {"coding": [{"code": "x1", "display": "appetite"}]}}]});
        let obs = &map_sub_resources(&record, Uuid::new_v4()).observations[0];
        assert_eq!(obs.code.text, "appetite");
    }

    #[test]
    fn sub_resources_carry_encounter_id() {
        let id = Uuid::new_v4();
        let record = json!({"Condition": {}, "Observation": [{}], "MedicationStatement": [{}]});
        let subs = map_sub_resources(&record, id);
        assert_eq!(subs.conditions[0].encounter_id, id);
        assert_eq!(subs.observations[0].encounter_id, id);
        assert_eq!(subs.medication_statements[0].encounter_id, id);
    }

    #[test]
    fn condition_dates_coerced() {
        let record = json!({"Condition": {
            "onset_datetime": "2024-02-01T10:00:00Z",
            "abatement_datetime": "not yet"
        }});
        let c = &map_sub_resources(&record, Uuid::new_v4()).conditions[0];
        assert!(c.onset_datetime.is_some());
        assert!(c.abatement_datetime.is_none());
    }

    #[test]
    fn encounter_defaults() {
        let enc = map_encounter(&json!({"Encounter": {"reason_text": "low mood"}})).unwrap();
        assert_eq!(enc.status, "finished");
        assert_eq!(enc.class, "AMB");
        assert_eq!(enc.encounter_type, "visit");
        assert_eq!(enc.reason_text.as_deref(), Some("low mood"));
        assert!(enc.period.is_none());
    }

    #[test]
    fn encounter_missing_or_empty_is_none() {
        assert!(map_encounter(&json!({})).is_none());
        assert!(map_encounter(&json!({"Encounter": {}})).is_none());
        assert!(map_encounter(&json!({"Encounter": "visit"})).is_none());
    }

    #[test]
    fn encounter_period_canonicalized() {
        let record = json!({"Encounter": {"period": {
            "start": "2024-03-15T18:00:00+09:00",
            "end": "garbage"
        }}});
        let period = map_encounter(&record).unwrap().period.unwrap();
        assert_eq!(period.start.as_deref(), Some("2024-03-15T09:00:00Z"));
        assert!(period.end.is_none());
    }

    #[test]
    fn encounter_class_coding_uses_code() {
        let record = json!({"Encounter": {"class": {"code": "IMP", "display": "inpatient"}}});
        assert_eq!(map_encounter(&record).unwrap().class, "IMP");
    }

    #[test]
    fn encounter_type_list_takes_first_concept() {
        let record = json!({"Encounter": {"type": [{"text": "follow-up"}]}});
        assert_eq!(map_encounter(&record).unwrap().encounter_type, "follow-up");
    }

    #[test]
    fn patient_absent_is_none() {
        assert!(map_patient(&json!({"Encounter": {}})).is_none());
        assert!(map_patient(&json!({"Patient": {}})).is_none());
    }

    #[test]
    fn patient_fields_mapped() {
        let record = json!({"Patient": {
            "name": {"text": "Jane Roe"},
            "birth_date": "1985-07-02",
            "gender": "female"
        }});
        let p = map_patient(&record).unwrap();
        assert_eq!(p.name.unwrap().text.as_deref(), Some("Jane Roe"));
        assert_eq!(p.birth_date.unwrap().to_string(), "1985-07-02");
        assert_eq!(p.gender.as_deref(), Some("female"));
    }

    #[test]
    fn patient_bare_name_and_bad_date() {
        let p = map_patient(&json!({"Patient": {"name": "Kim", "birth_date": "July 1985"}})).unwrap();
        assert_eq!(p.name.unwrap().display().as_deref(), Some("Kim"));
        assert!(p.birth_date.is_none());
        assert!(p.gender.is_none());
    }

    #[test]
    fn conversation_participants() {
        let id = Uuid::new_v4();
        let conv = map_conversation(id, "Dr: hi\nPt: hello", Some("Jane"), "en", None);
        assert_eq!(conv.encounter_id, id);
        assert_eq!(conv.participants.get("patient").map(String::as_str), Some("Jane"));
        assert_eq!(conv.language, "en");
        assert!(conv.summary.is_none());

        let anonymous = map_conversation(id, "text", None, "ko", Some(" ".into()));
        assert!(anonymous.participants.is_empty());
        assert!(anonymous.summary.is_none());
    }

    #[test]
    fn fallback_record_maps_cleanly() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let record = fallback_record(&at);
        let id = Uuid::new_v4();

        let patient = map_patient(&record).unwrap();
        assert_eq!(patient.name.unwrap().text.as_deref(), Some("unknown"));

        let enc = map_encounter(&record).unwrap();
        assert_eq!(enc.period.unwrap().start.as_deref(), Some("2024-06-01T12:00:00Z"));

        let subs = map_sub_resources(&record, id);
        assert_eq!(subs.conditions.len(), 1);
        assert_eq!(subs.conditions[0].code.text, "needs consultation");
        assert_eq!(subs.observations.len(), 1);
        assert_eq!(subs.observations[0].code.text, "initial consultation");
        assert_eq!(subs.observations[0].effective_datetime, Some(at));
        assert!(subs.medication_statements.is_empty());
        assert!(subs.skipped.is_empty());
    }

    #[test]
    fn non_object_record_maps_to_nothing() {
        let record = json!([1, 2, 3]);
        assert!(map_patient(&record).is_none());
        assert!(map_encounter(&record).is_none());
        assert_eq!(map_sub_resources(&record, Uuid::new_v4()), SubResources::default());
    }
}
