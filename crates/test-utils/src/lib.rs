//! Mosaic test utilities.
//!
//! Fixture builders for the play/poem/author dataset used across the
//! aggregate tests, plus JSON assertion helpers.

use serde_json::{Map, Value as JsonValue, json};

/// Create a test record of the given kind.
pub fn test_record(kind: &str) -> TestRecord {
    TestRecord {
        kind: kind.to_string(),
        fields: Map::new(),
    }
}

/// Create a play record.
pub fn test_play(title: &str, genre: &str, year: i64) -> TestRecord {
    test_record("Play")
        .with_field("title", json!(title))
        .with_field("genre", json!(genre))
        .with_field("year", json!(year))
}

/// Create a poem record.
pub fn test_poem(title: &str, style: &str) -> TestRecord {
    test_record("Poem")
        .with_field("title", json!(title))
        .with_field("style", json!(style))
}

/// A record builder for creating test fixtures.
#[derive(Debug, Clone)]
pub struct TestRecord {
    pub kind: String,
    pub fields: Map<String, JsonValue>,
}

impl TestRecord {
    /// Add a single field.
    pub fn with_field(mut self, name: &str, value: JsonValue) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Set a nested author.
    pub fn with_author(self, name: &str) -> Self {
        self.with_field("author", json!({ "name": name }))
    }

    /// The record as a JSON object.
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(self.fields.clone())
    }

    /// The record as a bare map.
    pub fn into_map(self) -> Map<String, JsonValue> {
        self.fields
    }
}

/// The four plays, in insertion order. Authors are "Play Shakespeare 1..4".
pub fn plays() -> Vec<TestRecord> {
    vec![
        test_play("Romeo And Juliet", "Tragedy", 1597).with_author("Play Shakespeare 1"),
        test_play("A Midsummer Night's Dream", "Comedy", 1600).with_author("Play Shakespeare 2"),
        test_play("Julius Caesar", "Tragedy", 1623).with_author("Play Shakespeare 3"),
        test_play("As You Like It", "Comedy", 1623).with_author("Play Shakespeare 4"),
    ]
}

/// The three poems, in insertion order. Only the sonnets have authors.
pub fn poems() -> Vec<TestRecord> {
    vec![
        test_poem("Shall I compare thee to a summer's day?", "Sonnet")
            .with_author("Poem Shakespeare 1"),
        test_poem("As a decrepit father takes delight", "Sonnet")
            .with_author("Poem Shakespeare 2"),
        test_poem("A Lover's Complaint", "Narrative"),
    ]
}

/// Authors with their plays nested as a list.
pub fn authors() -> Vec<TestRecord> {
    vec![
        test_record("Author")
            .with_field("name", json!("William Shakespeare"))
            .with_field(
                "plays",
                JsonValue::Array(plays().iter().map(TestRecord::to_json).collect()),
            ),
    ]
}

/// Dataset document in the store's file format.
pub fn shakespeare_dataset() -> JsonValue {
    let table = |name: &str, rows: Vec<TestRecord>| {
        json!({
            "name": name,
            "rows": rows.iter().map(TestRecord::to_json).collect::<Vec<_>>(),
        })
    };
    json!({
        "tables": [
            table("Play", plays()),
            table("Poem", poems()),
            table("Author", authors()),
        ]
    })
}

/// Assertion helpers for JSON content.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON object's keys appear in exactly this order.
    pub fn key_order(value: &Value, expected: &[&str]) {
        let keys: Vec<&str> = value
            .as_object()
            .map(|o| o.keys().map(String::as_str).collect())
            .unwrap_or_default();
        assert_eq!(keys, expected, "key order mismatch in {value}");
    }

    /// Titles of a list of records, in order.
    pub fn titles(value: &Value) -> Vec<String> {
        value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("title").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }
}
