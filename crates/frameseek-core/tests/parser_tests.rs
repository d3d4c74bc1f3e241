use frameseek_core::{parse_response, parse_text, ModelResponse};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn object_strategy() -> impl Strategy<Value = Map<String, Value>> {
    proptest::collection::btree_map(
        "[a-zA-Z_]{1,10}",
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[a-zA-Z0-9 .,]{0,20}".prop_map(Value::from),
            Just(Value::Null),
        ],
        0..8,
    )
    .prop_map(|entries| entries.into_iter().collect())
}

proptest! {
    #[test]
    fn prop_parse_is_idempotent_on_structured_input(object in object_strategy()) {
        let once = parse_response(&ModelResponse::Structured(Value::Object(object.clone()))).unwrap();
        let twice = parse_response(&ModelResponse::Structured(Value::Object(once.clone()))).unwrap();
        prop_assert_eq!(&once, &object);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_fenced_object_in_prose_is_recovered(
        object in object_strategy(),
        before in "[a-zA-Z .,:]{0,40}",
        after in "[a-zA-Z .,]{0,40}",
    ) {
        let json = Value::Object(object.clone()).to_string();
        let text = format!("{before}\n```json\n{json}\n```\n{after}");
        prop_assert_eq!(parse_text(&text).unwrap(), object);
    }

    #[test]
    fn prop_brace_free_text_is_malformed(text in "[a-zA-Z0-9 .,:!?]{0,80}") {
        let err = parse_text(&text).unwrap_err();
        prop_assert_eq!(err.text, text);
    }
}

#[test]
fn test_not_json_at_all() {
    let err = parse_response(&ModelResponse::from("not json at all")).unwrap_err();
    assert_eq!(err.text, "not json at all");
}

#[test]
fn test_structured_non_object_is_malformed() {
    assert!(parse_response(&ModelResponse::Structured(Value::from(42))).is_err());
}
