//! Model base types
//!
//! Every remote entity has a string `type` and an opaque string `id`. Models
//! are referenced either by id alone or as a fully materialized value; see
//! [`Ref`].

mod reference;

pub use reference::{ref_decoder, Ref};

use std::collections::HashMap;

use crate::json::{self, Properties};

/// A remote entity identified by an opaque string id.
pub trait Model: Clone + Send + Sync + 'static {
    /// Value of the `type` discriminant on the wire
    const TYPE: &'static str;

    fn id(&self) -> &str;
}

/// Models keyed by id
pub type ModelMap<T> = HashMap<String, T>;

/// Key a collection of models by their id. Later duplicates win.
pub fn index_by_id<T: Model>(models: impl IntoIterator<Item = T>) -> ModelMap<T> {
    models
        .into_iter()
        .map(|model| (model.id().to_string(), model))
        .collect()
}

/// The `{type, id}` properties shared by every model.
pub fn model_properties(model_type: &str) -> Properties {
    Properties::new()
        .constant("type", model_type)
        .decode("id", json::string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    struct School {
        id: String,
    }

    impl Model for School {
        const TYPE: &'static str = "school";

        fn id(&self) -> &str {
            &self.id
        }
    }

    #[test]
    fn test_index_by_id() {
        let map = index_by_id(vec![
            School { id: "a".into() },
            School { id: "b".into() },
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["b"].id, "b");
    }

    #[test]
    fn test_model_properties() {
        let decoded = json::object(model_properties("school"))
            .decode(&json!({"id": "s1", "name": "Templestowe"}))
            .unwrap();
        assert_eq!(decoded["type"], json!("school"));
        assert_eq!(decoded["id"], json!("s1"));
        assert!(!decoded.contains_key("name"));
    }
}
