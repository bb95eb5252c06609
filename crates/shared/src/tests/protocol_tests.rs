use serde_json::json;

use crate::protocol::{
    parse_count, unwrap_record_list, BacklogResponse, ReconciliationResponse, RecordListShape,
};

#[test]
fn parses_counts_defensively() {
    assert_eq!(parse_count(&json!(5)), 5);
    assert_eq!(parse_count(&json!("2")), 2);
    assert_eq!(parse_count(&json!(" 7 ")), 7);
    assert_eq!(parse_count(&json!(3.9)), 3);
    assert_eq!(parse_count(&json!("4.5")), 4);
    assert_eq!(parse_count(&json!(-3)), 0);
    assert_eq!(parse_count(&json!("-1")), 0);
    assert_eq!(parse_count(&json!("many")), 0);
    assert_eq!(parse_count(&json!(null)), 0);
    assert_eq!(parse_count(&json!([1])), 0);
}

#[test]
fn backlog_response_tolerates_missing_fields() {
    let parsed: BacklogResponse =
        serde_json::from_value(json!({"success_count": 5})).expect("parse");
    assert_eq!(parsed.failed_records, json!(null));
    assert_eq!(parse_count(&parsed.success_count), 5);
    assert_eq!(parse_count(&parsed.failure_count), 0);
}

#[test]
fn unwraps_bare_and_wrapped_record_lists() {
    let (items, shape) = unwrap_record_list(json!([{"a": 1}]));
    assert_eq!(items.len(), 1);
    assert_eq!(shape, RecordListShape::Bare);

    let (items, shape) = unwrap_record_list(json!({"data": [{"a": 1}, {"a": 2}]}));
    assert_eq!(items.len(), 2);
    assert_eq!(shape, RecordListShape::Wrapped("data"));

    let (items, shape) = unwrap_record_list(json!({"count": 1, "records": [{"a": 1}]}));
    assert_eq!(items.len(), 1);
    assert_eq!(shape, RecordListShape::Wrapped("records"));
}

#[test]
fn wrapper_keys_are_tried_in_order() {
    let (items, shape) = unwrap_record_list(json!({"items": [1], "data": [1, 2]}));
    assert_eq!(items.len(), 2);
    assert_eq!(shape, RecordListShape::Wrapped("data"));
}

#[test]
fn unknown_shapes_yield_empty_list() {
    let (items, shape) = unwrap_record_list(json!({"payload": [{"a": 1}], "data": "nope"}));
    assert!(items.is_empty());
    assert!(!shape.is_recognized());
    assert_eq!(
        shape,
        RecordListShape::Unrecognized("object with keys [payload, data]".to_string())
    );

    let (items, shape) = unwrap_record_list(json!("text"));
    assert!(items.is_empty());
    assert_eq!(shape, RecordListShape::Unrecognized("string".to_string()));

    let (items, shape) = unwrap_record_list(json!(null));
    assert!(items.is_empty());
    assert!(shape.is_recognized());
}

#[test]
fn reconciliation_response_tolerates_null_and_bad_rows() {
    let empty: ReconciliationResponse =
        serde_json::from_value(json!({"results": null})).expect("null results");
    assert!(empty.results.is_empty());

    let mixed: ReconciliationResponse = serde_json::from_value(json!({
        "results": [
            "garbage",
            {"updates": [
                {"field": "status", "value": "53", "oldValue": "51", "status": "updated"}
            ]},
            {"idocNumber": "0000100", "updates": []}
        ]
    }))
    .expect("mixed results");
    assert_eq!(mixed.results.len(), 2);
    assert_eq!(mixed.results[0].record_key, "");
    assert_eq!(mixed.results[0].updated_fields().count(), 1);
    assert_eq!(mixed.results[1].record_key, "0000100");
}
