//! params.rs
//! Indicator parameters and their fingerprints.

use super::error::IndicatorError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    /// Declared without a default; any typed value may override it.
    Unset,
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Text(_) => "text",
            ParamValue::Date(_) => "date",
            ParamValue::Unset => "unset",
        }
    }

    /// Whether `other` may replace a declared default of this type.
    pub(crate) fn accepts(&self, other: &ParamValue) -> bool {
        matches!(
            (self, other),
            (ParamValue::Unset, _)
                | (ParamValue::Int(_), ParamValue::Int(_))
                | (ParamValue::Float(_), ParamValue::Float(_) | ParamValue::Int(_))
                | (ParamValue::Text(_), ParamValue::Text(_))
                | (ParamValue::Date(_), ParamValue::Date(_))
        )
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self { ParamValue::Int(v) }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self { ParamValue::Int(v as i64) }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self { ParamValue::Float(v) }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self { ParamValue::Text(v.to_string()) }
}

impl From<NaiveDate> for ParamValue {
    fn from(v: NaiveDate) -> Self { ParamValue::Date(v) }
}

/// An ordered parameter map. Ordering makes the serialized form canonical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> { self.0.get(name) }
    pub fn contains(&self, name: &str) -> bool { self.0.contains_key(name) }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> { self.0.iter() }

    pub fn int(&self, name: &str) -> Result<i64, IndicatorError> {
        match self.require(name)? {
            ParamValue::Int(v) => Ok(*v),
            other => Err(type_error(name, "int", other)),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64, IndicatorError> {
        match self.require(name)? {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            other => Err(type_error(name, "float", other)),
        }
    }

    pub fn text(&self, name: &str) -> Result<&str, IndicatorError> {
        match self.require(name)? {
            ParamValue::Text(v) => Ok(v),
            other => Err(type_error(name, "text", other)),
        }
    }

    /// `Ok(None)` when the parameter is declared but unset.
    pub fn optional_date(&self, name: &str) -> Result<Option<NaiveDate>, IndicatorError> {
        match self.get(name) {
            None | Some(ParamValue::Unset) => Ok(None),
            Some(ParamValue::Date(d)) => Ok(Some(*d)),
            Some(other) => Err(type_error(name, "date", other)),
        }
    }

    fn require(&self, name: &str) -> Result<&ParamValue, IndicatorError> {
        match self.0.get(name) {
            None | Some(ParamValue::Unset) => Err(IndicatorError::MissingParameter(name.to_string())),
            Some(v) => Ok(v),
        }
    }

    /// A short stable hash of the canonical JSON form.
    pub fn fingerprint(&self) -> String {
        // Serializing a BTreeMap of plain values cannot fail.
        let canonical = serde_json::to_vec(&self.0).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        hex::encode(&digest[..8])
    }
}

fn type_error(name: &str, expected: &'static str, actual: &ParamValue) -> IndicatorError {
    IndicatorError::ParameterType {
        name: name.to_string(),
        expected,
        actual: actual.type_name(),
    }
}
