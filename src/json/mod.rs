//! Structured JSON decoding
//!
//! Composable decoders that turn untyped `serde_json::Value` trees into typed
//! values, failing with an error that carries the path from the document root
//! to the offending value.
//!
//! ```ignore
//! use assessment_client::json::{self, Decoder};
//!
//! let decoder: Decoder<(String, f64)> = json::object_with(|obj| {
//!     Ok((obj.field("name", &json::string())?, obj.field("score", &json::number())?))
//! });
//! let (name, score) = decoder.decode(&serde_json::json!({"name": "x", "score": "3.5"}))?;
//! ```

mod context;
mod decoders;

pub use context::{DecodeContext, PathSegment};
pub use decoders::{
    array, boolean, date, enumeration, field_selector, integer, json_type_of, literal, nullable,
    number, object, object_with, record, string, tuple2, tuple3, union, value, ObjectReader,
    Properties, Property,
};

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// A JSON object with string keys
pub type JsonObject = serde_json::Map<String, Value>;

/// A JSON value failed to match the shape a decoder expected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at '{path}'")]
pub struct DecodeError {
    path: String,
    message: String,
}

impl DecodeError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Pointer from the document root to the value that failed
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Returns true for a JSON object (not an array, not null).
pub fn is_json_object(value: &Value) -> bool {
    value.is_object()
}

pub fn is_json_array(value: &Value) -> bool {
    value.is_array()
}

type DecodeFn<T> = dyn Fn(&Value, &mut DecodeContext) -> Result<T, DecodeError> + Send + Sync;

/// A validating parse function from untyped JSON to `T`.
///
/// Cloning a decoder is cheap; the underlying function is shared.
pub struct Decoder<T> {
    decode: Arc<DecodeFn<T>>,
}

impl<T> Clone for Decoder<T> {
    fn clone(&self) -> Self {
        Self {
            decode: Arc::clone(&self.decode),
        }
    }
}

impl<T> fmt::Debug for Decoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("output", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: 'static> Decoder<T> {
    pub fn new<F>(decode: F) -> Self
    where
        F: Fn(&Value, &mut DecodeContext) -> Result<T, DecodeError> + Send + Sync + 'static,
    {
        Self {
            decode: Arc::new(decode),
        }
    }

    /// Decode a document from its root.
    pub fn decode(&self, value: &Value) -> Result<T, DecodeError> {
        let mut ctx = DecodeContext::new();
        self.decode_in(value, &mut ctx)
    }

    /// Decode a response body.
    pub fn decode_object(&self, object: JsonObject) -> Result<T, DecodeError> {
        self.decode(&Value::Object(object))
    }

    /// Decode a value nested somewhere inside a larger document.
    pub fn decode_in(&self, value: &Value, ctx: &mut DecodeContext) -> Result<T, DecodeError> {
        (self.decode)(value, ctx)
    }

    /// Transform the decoded value.
    pub fn map<U, F>(self, f: F) -> Decoder<U>
    where
        U: 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Decoder::new(move |value, ctx| self.decode_in(value, ctx).map(&f))
    }

    /// Validate or transform the decoded value, failing at the current path.
    pub fn and_then<U, F>(self, f: F) -> Decoder<U>
    where
        U: 'static,
        F: Fn(T) -> Result<U, String> + Send + Sync + 'static,
    {
        Decoder::new(move |value, ctx| {
            let decoded = self.decode_in(value, ctx)?;
            f(decoded).map_err(|message| ctx.error(message))
        })
    }
}
