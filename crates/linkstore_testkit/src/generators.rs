//! Property-based test generators using proptest.

use linkstore_core::{CachePolicy, OnResourceMissing, Record, RecordId, Value};
use proptest::prelude::*;

/// Strategy for generating valid record ids.
pub fn record_id_strategy() -> impl Strategy<Value = RecordId> {
    prop::string::string_regex("[a-zA-Z0-9_-]{1,32}")
        .expect("Invalid regex")
        .prop_map(RecordId::new)
}

/// Strategy for generating resource payloads, empty ones included.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

/// Strategy for generating payloads that need an upload.
pub fn non_empty_payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..2048)
}

/// Strategy for generating inline property values.
pub fn inline_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-zA-Z0-9 ]{0,24}".prop_map(Value::Text),
    ]
}

/// Strategy for generating cache policies.
pub fn cache_policy_strategy() -> impl Strategy<Value = CachePolicy> {
    prop_oneof![
        Just(CachePolicy::Online),
        Just(CachePolicy::Offline),
        Just(CachePolicy::CacheFirst),
        Just(CachePolicy::NetworkFirst),
    ]
}

/// Strategy for generating missing-resource handling.
pub fn on_missing_strategy() -> impl Strategy<Value = OnResourceMissing> {
    prop_oneof![
        Just(OnResourceMissing::Fail),
        Just(OnResourceMissing::LeaveReference),
        Just(OnResourceMissing::Null),
    ]
}

/// Strategy for generating records that fit [`crate::avatar_schema`].
///
/// `avatar` is always present; `coverPhoto` sometimes.
pub fn user_record_strategy() -> impl Strategy<Value = Record> {
    (
        record_id_strategy(),
        inline_value_strategy(),
        payload_strategy(),
        prop::option::of(payload_strategy()),
    )
        .prop_map(|(id, name, avatar, cover)| {
            let mut record = Record::with_id(id).with("name", name).with("avatar", avatar);
            if let Some(cover) = cover {
                record.set("coverPhoto", cover);
            }
            record
        })
}
