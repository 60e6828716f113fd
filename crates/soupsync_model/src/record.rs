//! The local record envelope.
//!
//! Every record stored in a soup carries four bookkeeping fields next to
//! its business fields: `__local__` says the record has unsynced edits,
//! and `__locally_created__` / `__locally_updated__` / `__locally_deleted__`
//! describe the pending action. The engine clears all four only after the
//! server operation for that record has succeeded.
//!
//! Records are keyed by a server-assigned id (`Id`). A record created
//! offline carries a `local_<uuid>` placeholder until the create
//! round-trip returns the real id.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

/// Field marking a record as having unsynced local edits.
pub const LOCAL: &str = "__local__";
/// Field marking a record as created offline.
pub const LOCALLY_CREATED: &str = "__locally_created__";
/// Field marking a record as updated offline.
pub const LOCALLY_UPDATED: &str = "__locally_updated__";
/// Field marking a record as deleted offline.
pub const LOCALLY_DELETED: &str = "__locally_deleted__";

/// Primary identifier field, assigned by the server.
pub const ID: &str = "Id";
/// Record metadata object carrying the server object type.
pub const ATTRIBUTES: &str = "attributes";
/// Object-type field inside [`ATTRIBUTES`].
pub const ATTRIBUTES_TYPE: &str = "type";
/// Server last-modified field used for the high-water mark.
pub const LAST_MODIFIED_DATE: &str = "LastModifiedDate";
/// Soup entry id field, assigned by the local store.
pub const SOUP_ENTRY_ID: &str = "_soupEntryId";

/// Prefix of client-generated placeholder ids.
pub const LOCAL_ID_PREFIX: &str = "local_";

fn flag(record: &Value, name: &str) -> bool {
    record.get(name).and_then(Value::as_bool).unwrap_or(false)
}

/// Returns true if the record has unsynced local edits.
pub fn is_dirty(record: &Value) -> bool {
    flag(record, LOCAL)
}

/// Returns true if the record was created offline.
pub fn is_locally_created(record: &Value) -> bool {
    flag(record, LOCALLY_CREATED)
}

/// Returns true if the record was updated offline.
pub fn is_locally_updated(record: &Value) -> bool {
    flag(record, LOCALLY_UPDATED)
}

/// Returns true if the record was deleted offline.
pub fn is_locally_deleted(record: &Value) -> bool {
    flag(record, LOCALLY_DELETED)
}

/// Stamps all four bookkeeping flags false.
///
/// A freshly-synced record is, by definition, not locally dirty; the same
/// stamping clears the flags after a successful push.
pub fn stamp_clean(record: &mut Value) {
    if let Some(map) = record.as_object_mut() {
        map.insert(LOCAL.into(), json!(false));
        map.insert(LOCALLY_CREATED.into(), json!(false));
        map.insert(LOCALLY_UPDATED.into(), json!(false));
        map.insert(LOCALLY_DELETED.into(), json!(false));
    }
}

fn mark(record: &mut Value, which: &str) {
    stamp_clean(record);
    if let Some(map) = record.as_object_mut() {
        map.insert(LOCAL.into(), json!(true));
        map.insert(which.into(), json!(true));
    }
}

/// Marks a record as created offline (assigns a placeholder id if the
/// record has none).
pub fn mark_created(record: &mut Value) {
    mark(record, LOCALLY_CREATED);
    if server_id(record).is_none() {
        if let Some(map) = record.as_object_mut() {
            map.insert(ID.into(), json!(generate_local_id()));
        }
    }
}

/// Marks a record as updated offline.
pub fn mark_updated(record: &mut Value) {
    mark(record, LOCALLY_UPDATED);
}

/// Marks a record as deleted offline.
pub fn mark_deleted(record: &mut Value) {
    mark(record, LOCALLY_DELETED);
}

/// Generates a placeholder id for a record created offline.
pub fn generate_local_id() -> String {
    format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4())
}

/// Returns true if the id is a client-generated placeholder.
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Returns the record's server id, if present.
pub fn server_id(record: &Value) -> Option<&str> {
    record.get(ID).and_then(Value::as_str)
}

/// Returns the record's server object type from `attributes.type`.
pub fn object_type(record: &Value) -> Option<&str> {
    record
        .get(ATTRIBUTES)
        .and_then(|attrs| attrs.get(ATTRIBUTES_TYPE))
        .and_then(Value::as_str)
}

/// Returns the record's soup entry id, if the store assigned one.
pub fn soup_entry_id(record: &Value) -> Option<i64> {
    record.get(SOUP_ENTRY_ID).and_then(Value::as_i64)
}

/// Parses a server timestamp into epoch milliseconds.
///
/// Accepts both the `+0000`-suffixed form servers emit and RFC 3339.
pub fn parse_server_timestamp(value: &str) -> Option<i64> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.3f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.timestamp_millis())
        .ok()
}

/// Formats epoch milliseconds as a timestamp literal usable in a query.
pub fn format_server_timestamp(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => Utc
            .timestamp_millis_opt(0)
            .single()
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default(),
    }
}

/// Returns the maximum last-modified timestamp across the records, or
/// `existing` when no record carries a parsable one.
pub fn max_time_stamp(records: &[Value], existing: i64) -> i64 {
    records
        .iter()
        .filter_map(|r| r.get(LAST_MODIFIED_DATE))
        .filter_map(Value::as_str)
        .filter_map(parse_server_timestamp)
        .fold(existing, i64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_clean_sets_all_flags_false() {
        let mut record = json!({"Id": "001", "Name": "Acme"});
        stamp_clean(&mut record);

        assert!(!is_dirty(&record));
        assert!(!is_locally_created(&record));
        assert!(!is_locally_updated(&record));
        assert!(!is_locally_deleted(&record));
    }

    #[test]
    fn mark_created_assigns_placeholder_id() {
        let mut record = json!({"Name": "Acme"});
        mark_created(&mut record);

        assert!(is_dirty(&record));
        assert!(is_locally_created(&record));
        let id = server_id(&record).unwrap().to_string();
        assert!(is_local_id(&id));
    }

    #[test]
    fn mark_created_keeps_existing_id() {
        let mut record = json!({"Id": "001", "Name": "Acme"});
        mark_created(&mut record);
        assert_eq!(server_id(&record), Some("001"));
    }

    #[test]
    fn marks_are_mutually_exclusive() {
        let mut record = json!({"Id": "001"});
        mark_updated(&mut record);
        mark_deleted(&mut record);

        assert!(is_dirty(&record));
        assert!(!is_locally_updated(&record));
        assert!(is_locally_deleted(&record));
    }

    #[test]
    fn object_type_reads_attributes() {
        let record = json!({"attributes": {"type": "Account"}, "Id": "001"});
        assert_eq!(object_type(&record), Some("Account"));
        assert_eq!(object_type(&json!({"Id": "001"})), None);
    }

    #[test]
    fn parses_server_timestamp_formats() {
        let plus = parse_server_timestamp("2024-03-01T10:00:00.000+0000").unwrap();
        let zulu = parse_server_timestamp("2024-03-01T10:00:00.000Z").unwrap();
        assert_eq!(plus, zulu);
        assert!(parse_server_timestamp("not a date").is_none());
    }

    #[test]
    fn timestamp_roundtrip() {
        let millis = parse_server_timestamp("2024-03-01T10:00:00.250Z").unwrap();
        assert_eq!(format_server_timestamp(millis), "2024-03-01T10:00:00.250Z");
    }

    #[test]
    fn max_time_stamp_ignores_unparsable() {
        let records = vec![
            json!({"Id": "1", "LastModifiedDate": "2024-03-01T10:00:00.000Z"}),
            json!({"Id": "2", "LastModifiedDate": "garbage"}),
            json!({"Id": "3", "LastModifiedDate": "2024-03-02T10:00:00.000Z"}),
            json!({"Id": "4"}),
        ];

        let expected = parse_server_timestamp("2024-03-02T10:00:00.000Z").unwrap();
        assert_eq!(max_time_stamp(&records, -1), expected);
        assert_eq!(max_time_stamp(&[], 42), 42);
    }
}
