//! Turns Eventbrite API objects into warehouse rows.
//!
//! Each function keeps every key of the API object (the warehouse drops
//! the ones that are not columns) and adds the flattened fields the reporting
//! tables are keyed on.

use crate::domain::model::Record;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

fn timestamp_value(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn nested<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(key))
}

/// Eventbrite sends coordinates and money as strings.
fn as_float(value: Option<&Value>) -> Value {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn utc_field(source: &Value, key: &str) -> Value {
    let raw = nested(source, &[key, "utc"]).and_then(Value::as_str);
    match raw.map(DateTime::parse_from_rfc3339) {
        Some(Ok(ts)) => timestamp_value(ts.with_timezone(&Utc)),
        Some(Err(e)) => {
            tracing::debug!("Unparsable {}.utc {:?}: {}", key, raw, e);
            Value::Null
        }
        None => Value::Null,
    }
}

fn text_field(source: &Value, key: &str) -> Value {
    nested(source, &[key, "text"]).cloned().unwrap_or(Value::Null)
}

fn gross_cost(source: &Value) -> Value {
    let cost = as_float(nested(source, &["costs", "gross", "major_value"]));
    if cost.is_null() {
        tracing::debug!("No costs.gross.major_value on {:?}", source.get("id"));
    }
    cost
}

fn base_record(source: &Value) -> Record {
    match source {
        Value::Object(map) => Record::new(map.clone()),
        _ => Record::default(),
    }
}

pub fn event_record(event: &Value, loaded_at: DateTime<Utc>) -> Record {
    let mut record = base_record(event);
    record.insert("start_datetime", utc_field(event, "start"));
    record.insert("end_datetime", utc_field(event, "end"));
    record.insert("description", text_field(event, "description"));
    record.insert("name", text_field(event, "name"));
    record.insert("load_datetime", timestamp_value(loaded_at));
    record
}

pub fn attendee_record(attendee: &Value, loaded_at: DateTime<Utc>) -> Record {
    let mut record = base_record(attendee);
    if let Some(profile) = attendee.get("profile") {
        for key in ["name", "first_name", "last_name", "email"] {
            if let Some(value) = profile.get(key) {
                record.insert(key, value.clone());
            }
        }
    }
    record.insert("cost", gross_cost(attendee));
    record.insert("load_datetime", timestamp_value(loaded_at));
    record
}

pub fn order_record(order: &Value, loaded_at: DateTime<Utc>) -> Record {
    let mut record = base_record(order);
    record.insert("cost", gross_cost(order));
    record.insert("load_datetime", timestamp_value(loaded_at));
    record
}

pub fn venue_record(venue: &Value) -> Record {
    let mut record = base_record(venue);
    if let Some(Value::Object(address)) = venue.get("address") {
        for (key, value) in address {
            record.insert(key.clone(), value.clone());
        }
    }
    record.insert("latitude", as_float(venue.get("latitude")));
    record.insert("longitude", as_float(venue.get("longitude")));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn loaded_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_event_record_flattens_text_and_times() {
        let event = json!({
            "id": "1001",
            "name": {"text": "Spring Meetup", "html": "<p>Spring Meetup</p>"},
            "description": {"text": "Talks and pizza"},
            "start": {"utc": "2024-05-12T18:00:00Z", "timezone": "America/New_York"},
            "end": {"utc": "2024-05-12T21:00:00Z"},
            "venue_id": "77"
        });

        let record = event_record(&event, loaded_at());

        assert_eq!(record.get("name"), Some(&json!("Spring Meetup")));
        assert_eq!(record.get("description"), Some(&json!("Talks and pizza")));
        assert_eq!(
            record.get("start_datetime"),
            Some(&json!("2024-05-12T18:00:00.000000Z"))
        );
        assert_eq!(
            record.get("end_datetime"),
            Some(&json!("2024-05-12T21:00:00.000000Z"))
        );
        assert_eq!(
            record.get("load_datetime"),
            Some(&json!("2024-05-01T08:00:00.000000Z"))
        );
        assert_eq!(record.get("venue_id"), Some(&json!("77")));
    }

    #[test]
    fn test_event_record_tolerates_missing_fields() {
        let record = event_record(&json!({"id": "1", "start": {"utc": "garbage"}}), loaded_at());

        assert_eq!(record.get("start_datetime"), Some(&Value::Null));
        assert_eq!(record.get("end_datetime"), Some(&Value::Null));
        assert_eq!(record.get("name"), Some(&Value::Null));
    }

    #[test]
    fn test_attendee_record_lifts_profile_and_cost() {
        let attendee = json!({
            "id": "a1",
            "event_id": "1001",
            "order_id": "o9",
            "profile": {"name": "Ada Lovelace", "first_name": "Ada", "email": "ada@example.com"},
            "costs": {"gross": {"major_value": "25.50", "currency": "USD"}}
        });

        let record = attendee_record(&attendee, loaded_at());

        assert_eq!(record.get("name"), Some(&json!("Ada Lovelace")));
        assert_eq!(record.get("first_name"), Some(&json!("Ada")));
        assert_eq!(record.get("email"), Some(&json!("ada@example.com")));
        assert!(record.get("last_name").is_none());
        assert_eq!(record.get("cost"), Some(&json!(25.5)));
        assert_eq!(record.get("event_id"), Some(&json!("1001")));
    }

    #[test]
    fn test_attendee_without_costs_gets_null_cost() {
        let record = attendee_record(&json!({"id": "a2", "profile": {}}), loaded_at());
        assert_eq!(record.get("cost"), Some(&Value::Null));
    }

    #[test]
    fn test_order_record_cost() {
        let order = json!({"id": "o9", "costs": {"gross": {"major_value": "0.00"}}});
        let record = order_record(&order, loaded_at());
        assert_eq!(record.get("cost"), Some(&json!(0.0)));
        assert!(record.get("load_datetime").is_some());
    }

    #[test]
    fn test_venue_record_lifts_address() {
        let venue = json!({
            "id": "77",
            "name": "Community Hall",
            "latitude": "40.7128",
            "longitude": "-74.0060",
            "address": {"city": "New York", "postal_code": "10001", "region": "NY"}
        });

        let record = venue_record(&venue);

        assert_eq!(record.get("city"), Some(&json!("New York")));
        assert_eq!(record.get("postal_code"), Some(&json!("10001")));
        assert_eq!(record.get("latitude"), Some(&json!(40.7128)));
        assert_eq!(record.get("longitude"), Some(&json!(-74.006)));
    }
}
