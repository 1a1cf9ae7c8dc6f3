//! Key-case conversion between the server's snake_case and the client's camelCase.

use convert_case::{Case, Casing};
use serde_json::Value;

use crate::json::JsonObject;

pub fn to_lower_camel_case(key: &str) -> String {
    key.to_case(Case::Camel)
}

pub fn to_snake_case(key: &str) -> String {
    key.to_case(Case::Snake)
}

/// Recursively rename every object key in `value`. Arrays are walked, scalars
/// pass through unchanged.
pub fn transform_keys(value: Value, rename: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(object) => Value::Object(transform_object_keys(object, rename)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| transform_keys(item, rename))
                .collect(),
        ),
        other => other,
    }
}

pub fn transform_object_keys(object: JsonObject, rename: &dyn Fn(&str) -> String) -> JsonObject {
    object
        .into_iter()
        .map(|(key, value)| (rename(&key), transform_keys(value, rename)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_case_helpers() {
        assert_eq!(to_lower_camel_case("subject_class"), "subjectClass");
        assert_eq!(to_lower_camel_case("students_count"), "studentsCount");
        assert_eq!(to_snake_case("teacherCode"), "teacher_code");
    }

    #[test]
    fn test_transform_nested() {
        let input = json!({
            "page_number": 1,
            "results": [{"teacher_code": "ABC", "subject_class": {"class_code": "7A"}}],
        });
        let out = transform_keys(input, &to_lower_camel_case);
        assert_eq!(
            out,
            json!({
                "pageNumber": 1,
                "results": [{"teacherCode": "ABC", "subjectClass": {"classCode": "7A"}}],
            })
        );
    }

    #[test]
    fn test_values_are_not_renamed() {
        let out = transform_keys(json!({"kind": "snake_value"}), &to_lower_camel_case);
        assert_eq!(out, json!({"kind": "snake_value"}));
    }
}
