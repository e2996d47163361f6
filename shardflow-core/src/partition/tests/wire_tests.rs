use super::*;
use crate::partition::{PartitionContext, AFFINITY_MASTER, AFFINITY_TYPE_KEY};
use crate::row::Row;

struct FixedContext(&'static str);

impl PartitionContext for FixedContext {
    fn partition_id(&self) -> &str {
        self.0
    }
}

#[test]
fn test_hash_key_roundtrip_routes_identically() {
    let original = HashKeyPartitioner::new();
    let decoded = decode(&encode(&original)).unwrap();
    let ctx = FixedContext("0");

    for key in ["a", "b", "longer-key", ""] {
        let row = Row::key_value(key, 1i64);
        assert_eq!(
            decoded.determine_partition(&ctx, &row, 6).unwrap(),
            original.determine_partition(&ctx, &row, 6).unwrap()
        );
    }
}

#[test]
fn test_finite_key_roundtrip_keeps_key_set() {
    let original = FiniteKeyPartitioner::new(["x", "y"]);
    let decoded = decode(&encode(&original)).unwrap();

    assert_eq!(decoded.plan_next(9), original.plan_next(9));
    let ctx = FixedContext("0");
    assert!(decoded
        .determine_partition(&ctx, &Row::key_value("z", 1i64), 2)
        .unwrap_err()
        .is_no_output());
}

#[test]
fn test_shuffled_roundtrip_carries_seed() {
    let original = ShuffledPartitioner::with_seed(99);
    let decoded = decode(&encode(&original)).unwrap();
    let ctx = FixedContext("0");

    let original_draws: Vec<String> = (0..16)
        .map(|_| {
            original
                .determine_partition(&ctx, &Row::value(1i64), 4)
                .unwrap()
        })
        .collect();
    let decoded_draws: Vec<String> = (0..16)
        .map(|_| {
            decoded
                .determine_partition(&ctx, &Row::value(1i64), 4)
                .unwrap()
        })
        .collect();
    assert_eq!(original_draws, decoded_draws);
}

#[test]
fn test_preserve_roundtrip() {
    let decoded = decode(&encode(&PreservePartitioner::new())).unwrap();
    assert!(decoded.is_preserved());
}

#[test]
fn test_master_affinity_roundtrip_nests_inner_envelope() {
    let original = MasterAffinityPartitioner::wrap(Box::new(FiniteKeyPartitioner::new(["k"])));
    let decoded = decode(&encode(&original)).unwrap();

    let plan = decoded.plan_next(1);
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].id, "k");
    assert_eq!(
        plan[0].assignment_affinity.get(AFFINITY_TYPE_KEY),
        Some(&AFFINITY_MASTER.to_string())
    );
}

#[test]
fn test_unknown_tag_is_a_typed_error() {
    let err = decode(br#"{"tag": "zigzag", "body": null}"#).unwrap_err();
    assert_eq!(err, Error::UnknownPartitioner("zigzag".to_string()));
}

#[test]
fn test_malformed_envelope_is_a_decode_error() {
    assert!(matches!(decode(b"not json"), Err(Error::Decode(_))));
    assert!(matches!(
        decode(br#"{"missing": "tag"}"#),
        Err(Error::Decode(_))
    ));
}

#[test]
fn test_malformed_body_is_a_decode_error() {
    let err = decode(br#"{"tag": "finite_key", "body": {"keys": 5}}"#).unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}

#[test]
fn test_custom_registration() {
    let mut registry = Registry::new();
    registry.register("preserve", |_, _| Ok(Box::new(PreservePartitioner::new())));

    assert!(registry.decode(&encode(&PreservePartitioner::new())).is_ok());
    // The custom registry knows nothing else.
    assert_eq!(
        registry.decode(&encode(&HashKeyPartitioner::new())).unwrap_err(),
        Error::UnknownPartitioner("hash_key".to_string())
    );
}
