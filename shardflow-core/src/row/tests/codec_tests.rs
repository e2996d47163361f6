use super::*;
use crate::error::Error;
use crate::row::{Row, Value};

fn nested_row() -> Row {
    Row::new("orders/2024")
        .with_field("none", Value::Null)
        .with_field("flag", true)
        .with_field("count", 42i64)
        .with_field("ratio", 0.125f64)
        .with_field("blob", vec![0u8, 1, 254, 255])
        .with_field("name", "streaming")
        .with_field(
            "tags",
            Value::List(vec![
                Value::String("a".to_string()),
                Value::Int(-1),
                Value::List(vec![Value::Bool(false)]),
            ]),
        )
        .with_field(
            "nested",
            Value::Map(
                [("inner".to_string(), Value::Int(9))]
                    .into_iter()
                    .collect(),
            ),
        )
}

#[test]
fn test_roundtrip_identity() {
    let row = nested_row();
    let decoded = Row::decode(&row.encode()).unwrap();
    assert_eq!(decoded, row);
}

#[test]
fn test_roundtrip_empty_row() {
    let row = Row::new("");
    let decoded = Row::decode(&row.encode()).unwrap();
    assert_eq!(decoded, row);
}

#[test]
fn test_roundtrip_negative_and_extreme_ints() {
    for v in [i64::MIN, -1, 0, 1, i64::MAX] {
        let row = Row::key_value("n", v);
        assert_eq!(Row::decode(&row.encode()).unwrap(), row);
    }
}

#[test]
fn test_decode_truncated_fails() {
    let encoded = nested_row().encode();
    let err = Row::decode(&encoded[..encoded.len() - 3]).unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}

#[test]
fn test_decode_trailing_bytes_fails() {
    let mut encoded = Row::key_value("k", 1i64).encode();
    encoded.push(0x00);
    let err = Row::decode(&encoded).unwrap_err();
    match err {
        Error::Decode(message) => assert!(message.contains("trailing")),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[test]
fn test_decode_unknown_tag_fails() {
    // Valid key prefix, then a bogus value tag instead of the values map.
    let mut encoded = Vec::new();
    encoded.extend_from_slice(&1u32.to_be_bytes());
    encoded.push(b'k');
    encoded.push(0x7f);
    let err = Row::decode(&encoded).unwrap_err();
    match err {
        Error::Decode(message) => assert!(message.contains("unknown value tag")),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[test]
fn test_decode_non_map_values_fails() {
    // Key followed by a bare int where the values map belongs.
    let mut encoded = Vec::new();
    encoded.extend_from_slice(&0u32.to_be_bytes());
    encoded.push(0x02);
    encoded.extend_from_slice(&5i64.to_be_bytes());
    let err = Row::decode(&encoded).unwrap_err();
    match err {
        Error::Decode(message) => assert!(message.contains("must be a map")),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[test]
fn test_decode_invalid_bool_fails() {
    let mut encoded = Vec::new();
    encoded.extend_from_slice(&0u32.to_be_bytes());
    // Map with one entry whose bool payload is out of range.
    encoded.push(0x07);
    encoded.extend_from_slice(&1u32.to_be_bytes());
    encoded.extend_from_slice(&1u32.to_be_bytes());
    encoded.push(b'f');
    encoded.push(0x01);
    encoded.push(0x02);
    let err = Row::decode(&encoded).unwrap_err();
    match err {
        Error::Decode(message) => assert!(message.contains("invalid bool")),
        other => panic!("expected decode error, got {other:?}"),
    }
}
