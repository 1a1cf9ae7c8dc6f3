//! Primitive and structural decoders

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use super::{DecodeContext, DecodeError, Decoder, JsonObject};

static NULL: Value = Value::Null;

// =============================================================================
// Primitives
// =============================================================================

/// Raw JSON, unchanged
pub fn value() -> Decoder<Value> {
    Decoder::new(|value, _ctx| Ok(value.clone()))
}

pub fn string() -> Decoder<String> {
    Decoder::new(|value, ctx| match value {
        Value::String(s) => Ok(s.clone()),
        _ => Err(ctx.error("Expected a string")),
    })
}

/// A finite number.
///
/// Numeric strings are also accepted, since some endpoints still echo
/// form-encoded values back as strings.
pub fn number() -> Decoder<f64> {
    Decoder::new(|value, ctx| {
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(n) if n.is_finite() => Ok(n),
            _ => Err(ctx.error("Expected a number")),
        }
    })
}

/// A number with no fractional part
pub fn integer() -> Decoder<i64> {
    number().and_then(|n| {
        if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
            Ok(n as i64)
        } else {
            Err(format!("Expected an integer, got {}", n))
        }
    })
}

pub fn boolean() -> Decoder<bool> {
    Decoder::new(|value, ctx| match value {
        Value::Bool(b) => Ok(*b),
        _ => Err(ctx.error("Expected a boolean")),
    })
}

/// An ISO-8601 date or date-time.
///
/// Accepts RFC 3339 timestamps, date-times without an offset (taken as UTC)
/// and plain `YYYY-MM-DD` dates (midnight UTC).
pub fn date() -> Decoder<DateTime<Utc>> {
    Decoder::new(|value, ctx| {
        let Value::String(raw) = value else {
            return Err(ctx.error("Expected an ISO-8601 date string"));
        };
        parse_iso_date(raw).ok_or_else(|| ctx.error(format!("Invalid ISO-8601 date '{}'", raw)))
    })
}

fn parse_iso_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Succeeds only when the raw value equals `expected`.
pub fn literal(expected: impl Into<Value>) -> Decoder<Value> {
    let expected = expected.into();
    Decoder::new(move |value, ctx| {
        if *value == expected {
            Ok(value.clone())
        } else {
            Err(ctx.error(format!("Expected {}", expected)))
        }
    })
}

/// A string restricted to a fixed set of values.
pub fn enumeration(name: &str, values: &[&str]) -> Decoder<String> {
    let name = name.to_string();
    let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    string().and_then(move |s| {
        if values.contains(&s) {
            Ok(s)
        } else {
            Err(format!(
                "Expected a {} value (one of '{}')",
                name,
                values.join("', '")
            ))
        }
    })
}

// =============================================================================
// Wrappers
// =============================================================================

/// `null` decodes to `None`; anything else goes to `inner`.
pub fn nullable<T: 'static>(inner: Decoder<T>) -> Decoder<Option<T>> {
    Decoder::new(move |value, ctx| match value {
        Value::Null => Ok(None),
        _ => inner.decode_in(value, ctx).map(Some),
    })
}

pub fn array<T: 'static>(item: Decoder<T>) -> Decoder<Vec<T>> {
    Decoder::new(move |value, ctx| {
        let Value::Array(items) = value else {
            return Err(ctx.error("Expected an array"));
        };
        items
            .iter()
            .enumerate()
            .map(|(index, raw)| ctx.with_segment(index, |ctx| item.decode_in(raw, ctx)))
            .collect()
    })
}

fn tuple_items<'v>(
    value: &'v Value,
    arity: usize,
    ctx: &DecodeContext,
) -> Result<&'v [Value], DecodeError> {
    let Value::Array(items) = value else {
        return Err(ctx.error("Expected a json array"));
    };
    if items.len() < arity {
        return Err(ctx.error(format!("Expected a json array of length {}", arity)));
    }
    Ok(items)
}

/// A pair. Elements past the second are ignored.
pub fn tuple2<A: 'static, B: 'static>(a: Decoder<A>, b: Decoder<B>) -> Decoder<(A, B)> {
    Decoder::new(move |value, ctx| {
        let items = tuple_items(value, 2, ctx)?;
        let first = ctx.with_segment(0usize, |ctx| a.decode_in(&items[0], ctx))?;
        let second = ctx.with_segment(1usize, |ctx| b.decode_in(&items[1], ctx))?;
        Ok((first, second))
    })
}

/// A triple. Elements past the third are ignored.
pub fn tuple3<A: 'static, B: 'static, C: 'static>(
    a: Decoder<A>,
    b: Decoder<B>,
    c: Decoder<C>,
) -> Decoder<(A, B, C)> {
    Decoder::new(move |value, ctx| {
        let items = tuple_items(value, 3, ctx)?;
        let first = ctx.with_segment(0usize, |ctx| a.decode_in(&items[0], ctx))?;
        let second = ctx.with_segment(1usize, |ctx| b.decode_in(&items[1], ctx))?;
        let third = ctx.with_segment(2usize, |ctx| c.decode_in(&items[2], ctx))?;
        Ok((first, second, third))
    })
}

/// Every value of a plain object, decoded with `item`. Keys are kept.
pub fn record<T: 'static>(item: Decoder<T>) -> Decoder<BTreeMap<String, T>> {
    Decoder::new(move |value, ctx| {
        let Value::Object(map) = value else {
            return Err(ctx.error("Expected a json object"));
        };
        map.iter()
            .map(|(key, raw)| {
                ctx.with_segment(key.as_str(), |ctx| item.decode_in(raw, ctx))
                    .map(|decoded| (key.clone(), decoded))
            })
            .collect()
    })
}

// =============================================================================
// Objects
// =============================================================================

/// How a declared object property is produced.
#[derive(Debug, Clone)]
pub enum Property {
    /// Decode the raw property value
    Decode(Decoder<Value>),
    /// Assign a fixed value, ignoring the raw property
    Const(Value),
}

/// Declared properties of an object, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    entries: Vec<(String, Property)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a property decoded from the raw object.
    pub fn decode<T>(mut self, key: impl Into<String>, decoder: Decoder<T>) -> Self
    where
        T: Into<Value> + 'static,
    {
        self.insert(key.into(), Property::Decode(decoder.map(|v: T| -> Value { v.into() })));
        self
    }

    /// Declare a property fixed at `value`.
    pub fn constant(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key.into(), Property::Const(value.into()));
        self
    }

    /// Append the properties of `other`, replacing any already declared.
    pub fn extend(mut self, other: Properties) -> Self {
        for (key, property) in other.entries {
            self.insert(key, property);
        }
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    fn insert(&mut self, key: String, property: Property) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = property,
            None => self.entries.push((key, property)),
        }
    }
}

/// Decode a plain object against a declared property list.
///
/// Missing keys decode as `null`; keys not declared are ignored.
pub fn object(properties: Properties) -> Decoder<JsonObject> {
    Decoder::new(move |value, ctx| {
        let Value::Object(raw) = value else {
            return Err(ctx.error("Expected an object"));
        };
        let mut result = JsonObject::new();
        for (key, property) in &properties.entries {
            let decoded = match property {
                Property::Const(constant) => constant.clone(),
                Property::Decode(decoder) => {
                    let raw_value = raw.get(key).unwrap_or(&NULL);
                    ctx.with_segment(key.as_str(), |ctx| decoder.decode_in(raw_value, ctx))?
                }
            };
            result.insert(key.clone(), decoded);
        }
        Ok(result)
    })
}

/// Read access to one object while building a typed value from it.
pub struct ObjectReader<'a> {
    raw: &'a JsonObject,
    ctx: &'a mut DecodeContext,
}

impl<'a> ObjectReader<'a> {
    /// Decode property `key`. A missing key is decoded as `null`.
    pub fn field<T: 'static>(&mut self, key: &str, decoder: &Decoder<T>) -> Result<T, DecodeError> {
        let raw = self.raw;
        let raw_value = raw.get(key).unwrap_or(&NULL);
        self.ctx
            .with_segment(key, |ctx| decoder.decode_in(raw_value, ctx))
    }

    /// Decode property `key` if present and not null.
    pub fn optional<T: 'static>(
        &mut self,
        key: &str,
        decoder: &Decoder<T>,
    ) -> Result<Option<T>, DecodeError> {
        let raw = self.raw;
        match raw.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(raw_value) => self
                .ctx
                .with_segment(key, |ctx| decoder.decode_in(raw_value, ctx))
                .map(Some),
        }
    }

    /// Require property `key`, when present, to equal `expected`.
    pub fn constant(&mut self, key: &str, expected: &str) -> Result<String, DecodeError> {
        match self.raw.get(key) {
            None => Ok(expected.to_string()),
            Some(Value::String(s)) if s == expected => Ok(s.clone()),
            Some(_) => Err(self
                .ctx
                .with_segment(key, |ctx| ctx.error(format!("Expected '{}'", expected)))),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.raw.contains_key(key)
    }

    pub fn raw(&self) -> &JsonObject {
        self.raw
    }

    /// Error located at this object
    pub fn error(&self, message: impl Into<String>) -> DecodeError {
        self.ctx.error(message)
    }
}

/// Decode a plain object into a typed value.
pub fn object_with<T, F>(build: F) -> Decoder<T>
where
    T: 'static,
    F: Fn(&mut ObjectReader<'_>) -> Result<T, DecodeError> + Send + Sync + 'static,
{
    Decoder::new(move |value, ctx| {
        let Value::Object(raw) = value else {
            return Err(ctx.error("Expected an object"));
        };
        let mut reader = ObjectReader { raw, ctx };
        build(&mut reader)
    })
}

// =============================================================================
// Unions
// =============================================================================

/// The JSON type name of a value (`"string"`, `"object"`, ...).
pub fn json_type_of(value: &Value) -> Option<String> {
    let name = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    Some(name.to_string())
}

/// Select on the string value of an object field.
pub fn field_selector(key: &'static str) -> impl Fn(&Value) -> Option<String> + Send + Sync {
    move |value| value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Pick a variant decoder by a discriminant computed from the raw value.
pub fn union<T, S>(select: S, variants: HashMap<String, Decoder<T>>) -> Decoder<T>
where
    T: 'static,
    S: Fn(&Value) -> Option<String> + Send + Sync + 'static,
{
    Decoder::new(move |value, ctx| {
        let variant = select(value).and_then(|key| variants.get(&key));
        match variant {
            Some(decoder) => decoder.decode_in(value, ctx),
            None => Err(ctx.error("Could not select a decoder for union")),
        }
    })
}
