use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::event::{Event, OrderEvent, SessionEvent, SessionEventType, Topic};

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unexpected value for {field}: {value}")]
    BadEnum { field: &'static str, value: String },
}

/// Decode a self-describing JSON text envelope into a typed [`Event`].
///
/// Timestamps are accepted either with a trailing `Z` or an explicit
/// numeric UTC offset; both forms normalize to a `DateTime<Utc>`. Unknown
/// extra fields are ignored.
pub fn decode(payload: &[u8], topic: Topic) -> Result<Event, ParseError> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| ParseError::MalformedPayload(e.to_string()))?;
    match topic {
        Topic::Orders => decode_order(&value).map(Event::Order),
        Topic::Sessions => decode_session(&value).map(Event::Session),
    }
}

fn decode_order(value: &Value) -> Result<OrderEvent, ParseError> {
    let event_id = required_str(value, "event_id")?;
    let order_id = required_str(value, "order_id")?;
    let customer_id = optional_str(value, "customer_id");
    let amount = value
        .get("amount")
        .ok_or(ParseError::MissingField("amount"))?
        .as_f64()
        .ok_or_else(|| ParseError::MalformedPayload("amount is not numeric".into()))?;
    let currency = optional_str(value, "currency").unwrap_or_else(|| "USD".to_string());
    let channel = optional_str(value, "channel");
    let event_time = required_timestamp(value, "event_time")?;
    let received_at = required_timestamp(value, "received_at")?;
    Ok(OrderEvent {
        event_id,
        order_id,
        customer_id,
        amount,
        currency,
        channel,
        event_time,
        received_at,
    })
}

fn decode_session(value: &Value) -> Result<SessionEvent, ParseError> {
    let event_id = required_str(value, "event_id")?;
    let session_id = required_str(value, "session_id")?;
    let event_type_raw = required_str(value, "event_type")?;
    let event_type = match event_type_raw.as_str() {
        "view" => SessionEventType::View,
        "checkout" => SessionEventType::Checkout,
        "purchase" => SessionEventType::Purchase,
        other => {
            return Err(ParseError::BadEnum {
                field: "event_type",
                value: other.to_string(),
            })
        }
    };
    let user_id = optional_str(value, "user_id");
    let channel = optional_str(value, "channel");
    let event_time = required_timestamp(value, "event_time")?;
    let received_at = required_timestamp(value, "received_at")?;
    Ok(SessionEvent {
        event_id,
        session_id,
        event_type,
        user_id,
        channel,
        event_time,
        received_at,
    })
}

fn required_str(value: &Value, field: &'static str) -> Result<String, ParseError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ParseError::MissingField(field))
}

fn optional_str(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

fn required_timestamp(value: &Value, field: &'static str) -> Result<DateTime<Utc>, ParseError> {
    let raw = value
        .get(field)
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingField(field))?;
    parse_timestamp(raw)
        .map_err(|_| ParseError::MalformedPayload(format!("{field} is not a valid timestamp: {raw}")))
}

/// Accepts a trailing `Z`, an explicit numeric offset, or a naive
/// timestamp with no offset at all — matching the original's `_parse_dt`,
/// a naive instant is assumed to already be UTC rather than rejected.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))?;
    Ok(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_order_with_z_suffix() {
        let payload = json!({
            "event_id": "e1",
            "order_id": "o1",
            "amount": 100.0,
            "event_time": "2026-02-03T10:15:30Z",
            "received_at": "2026-02-03T10:15:31Z",
        })
        .to_string();
        let event = decode(payload.as_bytes(), Topic::Orders).unwrap();
        match event {
            Event::Order(o) => {
                assert_eq!(o.event_id, "e1");
                assert_eq!(o.currency, "USD");
                assert_eq!(o.amount, 100.0);
            }
            _ => panic!("expected order"),
        }
    }

    #[test]
    fn decodes_order_with_naive_timestamp_as_utc() {
        let payload = json!({
            "event_id": "e1",
            "order_id": "o1",
            "amount": 100.0,
            "event_time": "2026-02-03T10:15:30",
            "received_at": "2026-02-03T10:15:31",
        })
        .to_string();
        let event = decode(payload.as_bytes(), Topic::Orders).unwrap();
        assert_eq!(
            event.event_time(),
            DateTime::parse_from_rfc3339("2026-02-03T10:15:30Z")
                .unwrap()
                .with_timezone(&Utc)
        );
    }

    #[test]
    fn decodes_order_with_explicit_offset() {
        let payload = json!({
            "event_id": "e1",
            "order_id": "o1",
            "amount": 100.0,
            "event_time": "2026-02-03T05:15:30-05:00",
            "received_at": "2026-02-03T05:15:31-05:00",
        })
        .to_string();
        let event = decode(payload.as_bytes(), Topic::Orders).unwrap();
        assert_eq!(
            event.event_time(),
            DateTime::parse_from_rfc3339("2026-02-03T10:15:30Z")
                .unwrap()
                .with_timezone(&Utc)
        );
    }

    #[test]
    fn missing_required_field_fails() {
        let payload = json!({"event_id": "e1", "amount": 100.0}).to_string();
        let err = decode(payload.as_bytes(), Topic::Orders).unwrap_err();
        assert_eq!(err, ParseError::MissingField("order_id"));
    }

    #[test]
    fn malformed_json_fails() {
        let err = decode(b"not json", Topic::Orders).unwrap_err();
        assert!(matches!(err, ParseError::MalformedPayload(_)));
    }

    #[test]
    fn unknown_session_event_type_fails() {
        let payload = json!({
            "event_id": "e1",
            "session_id": "s1",
            "event_type": "refund",
            "event_time": "2026-02-03T10:15:30Z",
            "received_at": "2026-02-03T10:15:31Z",
        })
        .to_string();
        let err = decode(payload.as_bytes(), Topic::Sessions).unwrap_err();
        assert_eq!(
            err,
            ParseError::BadEnum {
                field: "event_type",
                value: "refund".to_string()
            }
        );
    }

    #[test]
    fn decodes_session_view() {
        let payload = json!({
            "event_id": "e2",
            "session_id": "s1",
            "event_type": "view",
            "event_time": "2026-02-03T10:16:05Z",
            "received_at": "2026-02-03T10:16:06Z",
        })
        .to_string();
        let event = decode(payload.as_bytes(), Topic::Sessions).unwrap();
        match event {
            Event::Session(s) => assert_eq!(s.event_type, SessionEventType::View),
            _ => panic!("expected session"),
        }
    }
}
