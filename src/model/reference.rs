//! Model references
//!
//! The backend sometimes inlines a related object and sometimes sends only its
//! foreign key, depending on the endpoint. `Ref` records which one was
//! received when the payload is decoded, rather than guessing from shape at
//! each use.

use std::collections::HashMap;

use serde::Serialize;

use crate::json::{self, Decoder};

use super::Model;

/// Either a bare identifier or a fully materialized model.
///
/// Serializes as whichever form it holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Ref<T> {
    Id(String),
    Model(T),
}

impl<T: Model> Ref<T> {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Model(model) => model.id(),
        }
    }

    /// True when the full model is available without fetching.
    pub fn is_model(&self) -> bool {
        matches!(self, Self::Model(_))
    }

    pub fn as_model(&self) -> Option<&T> {
        match self {
            Self::Model(model) => Some(model),
            Self::Id(_) => None,
        }
    }

    pub fn into_model(self) -> Option<T> {
        match self {
            Self::Model(model) => Some(model),
            Self::Id(_) => None,
        }
    }

    /// Drop any materialized data, keeping only the id.
    pub fn to_id(&self) -> Ref<T> {
        Self::Id(self.id().to_string())
    }
}

impl<T> From<&str> for Ref<T> {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl<T> From<String> for Ref<T> {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

/// Decode a reference that may be a bare id string or an inlined object.
pub fn ref_decoder<T: Model>(model: Decoder<T>) -> Decoder<Ref<T>> {
    let mut variants: HashMap<String, Decoder<Ref<T>>> = HashMap::new();
    variants.insert("string".to_string(), json::string().map(Ref::Id));
    variants.insert("object".to_string(), model.map(Ref::Model));
    json::union(json::json_type_of, variants)
}
