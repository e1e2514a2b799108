use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::services::codec::CodecError;

/// A plain item: string keys to native values.
pub type Item = BTreeMap<String, Value>;

/// A wire-encoded item: string keys to type-tagged values.
pub type WireItem = HashMap<String, AttributeValue>;

/// A numeric value, either integral or an exact decimal.
///
/// Equality and ordering are numeric: `Int(3) == Decimal(3.0)`. Decimals
/// keep every digit of the text they were parsed from.
#[derive(Debug, Clone)]
pub enum Number {
    Int(i64),
    Decimal(BigDecimal),
}

impl Number {
    pub fn to_decimal(&self) -> BigDecimal {
        match self {
            Number::Int(i) => BigDecimal::from(*i),
            Number::Decimal(d) => d.clone(),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.cmp(b),
            (a, b) => a.to_decimal().cmp(&b.to_decimal()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Decimal(d) => write!(f, "{d}"),
        }
    }
}

impl FromStr for Number {
    type Err = CodecError;

    /// Integer when the text fits an `i64`, exact decimal otherwise.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Number::Int(i));
        }
        BigDecimal::from_str(s)
            .map(Number::Decimal)
            .map_err(|_| CodecError::InvalidNumber(s.to_string()))
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Int(value)
    }
}

impl From<BigDecimal> for Number {
    fn from(value: BigDecimal) -> Self {
        Number::Decimal(value)
    }
}

impl TryFrom<f64> for Number {
    type Error = CodecError;

    /// Uses the shortest text that reads back as `value`. NaN and the
    /// infinities have no stored form and are rejected.
    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(CodecError::InvalidNumber(value.to_string()));
        }
        value.to_string().parse()
    }
}

/// A native value that can be stored in an item.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Binary(Vec<u8>),
    List(Vec<Value>),
    StringSet(BTreeSet<String>),
    NumberSet(BTreeSet<Number>),
    BinarySet(BTreeSet<Vec<u8>>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build a set from homogeneous elements.
    ///
    /// All elements must be strings, all numbers, or all binary; anything
    /// else is rejected rather than guessed.
    pub fn set_of(elements: impl IntoIterator<Item = Value>) -> Result<Value, CodecError> {
        let elements: Vec<Value> = elements.into_iter().collect();
        match elements.first() {
            None | Some(Value::String(_)) => {
                let mut set = BTreeSet::new();
                for element in elements {
                    match element {
                        Value::String(s) => {
                            set.insert(s);
                        }
                        _ => return Err(CodecError::MixedSet),
                    }
                }
                Ok(Value::StringSet(set))
            }
            Some(Value::Number(_)) => {
                let mut set = BTreeSet::new();
                for element in elements {
                    match element {
                        Value::Number(n) => {
                            set.insert(n);
                        }
                        _ => return Err(CodecError::MixedSet),
                    }
                }
                Ok(Value::NumberSet(set))
            }
            Some(Value::Binary(_)) => {
                let mut set = BTreeSet::new();
                for element in elements {
                    match element {
                        Value::Binary(b) => {
                            set.insert(b);
                        }
                        _ => return Err(CodecError::MixedSet),
                    }
                }
                Ok(Value::BinarySet(set))
            }
            Some(_) => Err(CodecError::MixedSet),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(Number::Int(value))
    }
}

impl From<Number> for Value {
    fn from(value: Number) -> Self {
        Value::Number(value)
    }
}

impl From<BigDecimal> for Value {
    fn from(value: BigDecimal) -> Self {
        Value::Number(Number::Decimal(value))
    }
}

impl TryFrom<f64> for Value {
    type Error = CodecError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Number::try_from(value).map(Value::Number)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Binary(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// A type-tagged value as the database exchanges it.
///
/// Serializes to the backend's JSON form, e.g. `{"S": "text"}` or
/// `{"M": {"k": {"N": "1"}}}`. Binary payloads are base64 in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    #[serde(rename = "S")]
    S(String),
    #[serde(rename = "N")]
    N(String),
    #[serde(rename = "B")]
    B(#[serde(with = "base64_bytes")] Vec<u8>),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    #[serde(rename = "L")]
    L(Vec<AttributeValue>),
    #[serde(rename = "M")]
    M(HashMap<String, AttributeValue>),
    #[serde(rename = "SS")]
    Ss(Vec<String>),
    #[serde(rename = "NS")]
    Ns(Vec<String>),
    #[serde(rename = "BS")]
    Bs(#[serde(with = "base64_bytes_list")] Vec<Vec<u8>>),
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

mod base64_bytes_list {
    use base64::Engine;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for bytes in items {
            seq.serialize_element(&base64::engine::general_purpose::STANDARD.encode(bytes))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .into_iter()
            .map(|encoded| {
                base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
