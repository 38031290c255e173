use super::codec::{decode, encode};
use super::{Envelope, Payload};
use crate::utils::RelayError;
use serde_json::json;

#[test]
fn test_envelope_new_stamps_id_and_time() {
    let a = Envelope::new("client-a", "chat", "hi".into());
    let b = Envelope::new("client-a", "chat", "hi".into());
    assert_ne!(a.id, b.id);
    assert!(a.sent_at > 0);
    assert_eq!(a.client_id, "client-a");
    assert_eq!(a.topic, "chat");
}

#[test]
fn test_numeric_text_stays_text() {
    let envelope = Envelope::new("c", "t", Payload::Text("42".to_string()));
    let decoded = decode(&encode(&envelope).unwrap()).unwrap();
    assert_eq!(decoded.payload, Payload::Text("42".to_string()));
    assert_eq!(decoded.payload.as_number(), None);
}

#[test]
fn test_json_payload_keeps_structure() {
    let value = json!({"temp": 25, "tags": ["a", "b"]});
    let envelope = Envelope::new("c", "sensors", value.clone().into());
    let decoded = decode(&encode(&envelope).unwrap()).unwrap();
    assert_eq!(decoded, envelope);
    assert_eq!(decoded.payload.as_json(), Some(&value));
}

#[test]
fn test_wire_format_carries_tag() {
    let envelope = Envelope::new("c", "t", Payload::Number(1.5));
    let value: serde_json::Value = serde_json::from_slice(&encode(&envelope).unwrap()).unwrap();
    assert_eq!(value["payload"]["kind"], "number");
    assert_eq!(value["payload"]["value"], 1.5);
}

#[test]
fn test_non_finite_number_is_invalid_payload() {
    let envelope = Envelope::new("c", "t", Payload::Number(f64::NAN));
    assert!(matches!(
        encode(&envelope),
        Err(RelayError::InvalidPayload { .. })
    ));
}

#[test]
fn test_decode_garbage_is_invalid_payload() {
    assert!(matches!(
        decode(b"not an envelope"),
        Err(RelayError::InvalidPayload { .. })
    ));
}
