//! Conversion between plain items and the database's type-tagged wire form.
//!
//! Tag selection for a plain value, first match wins:
//!
//! | plain            | tag    |
//! |------------------|--------|
//! | null             | `NULL` |
//! | boolean          | `BOOL` |
//! | number           | `N` (decimal string) |
//! | string           | `S`    |
//! | bytes            | `B`    |
//! | list             | `L`    |
//! | set of strings   | `SS`   |
//! | set of numbers   | `NS`   |
//! | set of bytes     | `BS`   |
//! | map              | `M`    |
//!
//! `decode(encode(item)) == item` for every representable item.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;

use base64::Engine;

use crate::models::item::{AttributeValue, Item, Number, Value, WireItem};

/// Encode a plain item into its wire form. Total over [`Item`].
pub fn encode(item: &Item) -> WireItem {
    item.iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

/// Encode a plain value that is expected to be a map.
///
/// Anything other than [`Value::Map`] is rejected with [`CodecError::NotAMap`].
pub fn encode_map(value: &Value) -> Result<WireItem, CodecError> {
    match value {
        Value::Map(map) => Ok(encode(map)),
        _ => Err(CodecError::NotAMap),
    }
}

pub fn encode_value(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Binary(bytes) => AttributeValue::B(bytes.clone()),
        Value::List(items) => AttributeValue::L(items.iter().map(encode_value).collect()),
        Value::StringSet(set) => AttributeValue::Ss(set.iter().cloned().collect()),
        Value::NumberSet(set) => AttributeValue::Ns(set.iter().map(Number::to_string).collect()),
        Value::BinarySet(set) => AttributeValue::Bs(set.iter().cloned().collect()),
        Value::Map(map) => AttributeValue::M(
            map.iter()
                .map(|(key, value)| (key.clone(), encode_value(value)))
                .collect(),
        ),
    }
}

/// Decode a wire item back into a plain item.
pub fn decode(item: &WireItem) -> Result<Item, CodecError> {
    item.iter()
        .map(|(key, value)| Ok((key.clone(), decode_value(value)?)))
        .collect()
}

pub fn decode_value(value: &AttributeValue) -> Result<Value, CodecError> {
    Ok(match value {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => Value::Number(n.parse()?),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::B(bytes) => Value::Binary(bytes.clone()),
        AttributeValue::L(items) => {
            Value::List(items.iter().map(decode_value).collect::<Result<_, _>>()?)
        }
        AttributeValue::Ss(set) => Value::StringSet(set.iter().cloned().collect()),
        AttributeValue::Ns(set) => Value::NumberSet(
            set.iter()
                .map(|raw| raw.parse::<Number>())
                .collect::<Result<BTreeSet<_>, _>>()?,
        ),
        AttributeValue::Bs(set) => Value::BinarySet(set.iter().cloned().collect()),
        AttributeValue::M(map) => Value::Map(
            map.iter()
                .map(|(key, value)| Ok((key.clone(), decode_value(value)?)))
                .collect::<Result<BTreeMap<_, _>, CodecError>>()?,
        ),
    })
}

/// Whether a JSON document is a well-formed wire item.
///
/// Every value at every depth must be a single-key object whose key is a
/// known tag and whose payload has that tag's shape. A non-object document
/// is never wire-encoded.
pub fn is_wire_encoded(item: &serde_json::Value) -> bool {
    match item.as_object() {
        Some(fields) => fields.values().all(is_tagged_value),
        None => false,
    }
}

fn is_tagged_value(value: &serde_json::Value) -> bool {
    let Some(tagged) = value.as_object() else {
        return false;
    };
    if tagged.len() != 1 {
        return false;
    }
    let Some((tag, payload)) = tagged.iter().next() else {
        return false;
    };

    match tag.as_str() {
        "S" => payload.is_string(),
        "N" => is_number_text(payload),
        "B" => is_base64_text(payload),
        "BOOL" => payload.is_boolean(),
        "NULL" => payload.as_bool() == Some(true),
        "L" => payload
            .as_array()
            .is_some_and(|items| items.iter().all(is_tagged_value)),
        "M" => payload
            .as_object()
            .is_some_and(|fields| fields.values().all(is_tagged_value)),
        "SS" => payload
            .as_array()
            .is_some_and(|items| items.iter().all(serde_json::Value::is_string)),
        "NS" => payload
            .as_array()
            .is_some_and(|items| items.iter().all(is_number_text)),
        "BS" => payload
            .as_array()
            .is_some_and(|items| items.iter().all(is_base64_text)),
        _ => false,
    }
}

fn is_number_text(value: &serde_json::Value) -> bool {
    value.as_str().is_some_and(|s| s.parse::<Number>().is_ok())
}

fn is_base64_text(value: &serde_json::Value) -> bool {
    value.as_str().is_some_and(|s| {
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .is_ok()
    })
}

/// Convert a plain JSON document into an item. Only objects are items.
pub fn item_from_json(json: serde_json::Value) -> Result<Item, CodecError> {
    match json {
        serde_json::Value::Object(fields) => fields
            .into_iter()
            .map(|(key, value)| Ok((key, value_from_json(value)?)))
            .collect(),
        _ => Err(CodecError::NotAMap),
    }
}

/// Convert a plain JSON value. JSON numbers are read from their text, so
/// integers beyond `i64` stay exact.
pub fn value_from_json(json: serde_json::Value) -> Result<Value, CodecError> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.to_string().parse()?),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::List(
            items
                .into_iter()
                .map(value_from_json)
                .collect::<Result<_, _>>()?,
        ),
        serde_json::Value::Object(fields) => Value::Map(
            fields
                .into_iter()
                .map(|(key, value)| Ok((key, value_from_json(value)?)))
                .collect::<Result<_, CodecError>>()?,
        ),
    })
}

/// Render an item as plain JSON. Bytes become base64 strings, sets become arrays.
pub fn item_to_json(item: &Item) -> serde_json::Value {
    serde_json::Value::Object(
        item.iter()
            .map(|(key, value)| (key.clone(), value_to_json(value)))
            .collect(),
    )
}

pub fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    let bytes_to_json =
        |bytes: &[u8]| Json::String(base64::engine::general_purpose::STANDARD.encode(bytes));
    // Decimals a JSON number would round are rendered as their text.
    let number_to_json = |n: &Number| match n {
        Number::Int(i) => Json::from(*i),
        Number::Decimal(d) => {
            let text = d.to_string();
            match serde_json::from_str::<serde_json::Number>(&text) {
                Ok(number) if number.to_string().parse::<Number>().is_ok_and(|back| back == *n) => {
                    Json::Number(number)
                }
                _ => Json::String(text),
            }
        }
    };

    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => number_to_json(n),
        Value::String(s) => Json::String(s.clone()),
        Value::Binary(bytes) => bytes_to_json(bytes),
        Value::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::StringSet(set) => Json::Array(set.iter().cloned().map(Json::String).collect()),
        Value::NumberSet(set) => Json::Array(set.iter().map(number_to_json).collect()),
        Value::BinarySet(set) => Json::Array(set.iter().map(|b| bytes_to_json(b)).collect()),
        Value::Map(map) => Json::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), value_to_json(value)))
                .collect(),
        ),
    }
}

/// An item or key as a caller hands it over: plain or already encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemInput {
    Plain(Item),
    Wire(WireItem),
}

impl ItemInput {
    pub fn is_wire(&self) -> bool {
        matches!(self, ItemInput::Wire(_))
    }

    /// The wire form, encoding a plain item if needed.
    pub fn into_wire(self) -> WireItem {
        match self {
            ItemInput::Plain(item) => encode(&item),
            ItemInput::Wire(item) => item,
        }
    }
}

impl From<Item> for ItemInput {
    fn from(item: Item) -> Self {
        ItemInput::Plain(item)
    }
}

impl From<WireItem> for ItemInput {
    fn from(item: WireItem) -> Self {
        ItemInput::Wire(item)
    }
}

impl TryFrom<serde_json::Value> for ItemInput {
    type Error = CodecError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        if !json.is_object() {
            return Err(CodecError::NotAMap);
        }
        if is_wire_encoded(&json) {
            Ok(ItemInput::Wire(serde_json::from_value(json)?))
        } else {
            Ok(ItemInput::Plain(item_from_json(json)?))
        }
    }
}

impl TryFrom<&serde_json::Value> for ItemInput {
    type Error = CodecError;

    fn try_from(json: &serde_json::Value) -> Result<Self, Self::Error> {
        ItemInput::try_from(json.clone())
    }
}

impl TryFrom<&str> for ItemInput {
    type Error = CodecError;

    /// Strings are never items.
    fn try_from(_: &str) -> Result<Self, Self::Error> {
        Err(CodecError::NotAMap)
    }
}

/// Error type for item encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Invalid item: expected a mapping of attribute names to values")]
    NotAMap,

    #[error("Unrecognized attribute type tag: {0}")]
    UnknownTag(String),

    #[error("Invalid number: {0:?}")]
    InvalidNumber(String),

    #[error("Set elements must all be strings, all numbers, or all binary")]
    MixedSet,

    #[error("Malformed wire item: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<Infallible> for CodecError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// Set of strings, as a convenience for building items in code.
pub fn string_set<I, S>(items: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Value::StringSet(items.into_iter().map(Into::into).collect::<BTreeSet<_>>())
}
