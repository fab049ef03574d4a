//! Source column values and the coercions applied to them.
//!
//! Every value read from the operational store is first captured in its most
//! general representation ([`SourceValue`]) and only then converted to the
//! type the analytic column expects. All representation ambiguity (numbers
//! surfaced as text, identifiers surfaced as raw bytes, averages surfaced as
//! either fixed-point or floating-point) is handled here and nowhere else.

use log::warn;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{EtlError, EtlResult};

#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoercionError {
    #[error("{found} value cannot be read as {expected}")]
    Incompatible {
        expected: &'static str,
        found: &'static str,
    },
    #[error("{value:?} cannot be parsed as {expected}")]
    Unparseable {
        expected: &'static str,
        value: String,
    },
    #[error("{value} is out of range for {expected}")]
    OutOfRange {
        expected: &'static str,
        value: String,
    },
    #[error("value is null")]
    Null,
}

impl SourceValue {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceValue::Null => "null",
            SourceValue::Bool(_) => "boolean",
            SourceValue::Int(_) => "integer",
            SourceValue::Float(_) => "floating-point",
            SourceValue::Decimal(_) => "fixed-point",
            SourceValue::Text(_) => "text",
            SourceValue::Bytes(_) => "binary",
            SourceValue::Uuid(_) => "uuid",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SourceValue::Null)
    }

    fn incompatible(&self, expected: &'static str) -> CoercionError {
        CoercionError::Incompatible {
            expected,
            found: self.kind(),
        }
    }

    /// Read as a 16-byte identifier.
    pub fn to_uuid(&self) -> Result<Option<Uuid>, CoercionError> {
        match self {
            SourceValue::Null => Ok(None),
            SourceValue::Uuid(id) => Ok(Some(*id)),
            SourceValue::Bytes(raw) => Uuid::from_slice(raw).map(Some).map_err(|_| {
                CoercionError::Unparseable {
                    expected: "identifier",
                    value: format!("{} raw bytes", raw.len()),
                }
            }),
            SourceValue::Text(text) => Uuid::parse_str(text.trim()).map(Some).map_err(|_| {
                CoercionError::Unparseable {
                    expected: "identifier",
                    value: text.clone(),
                }
            }),
            other => Err(other.incompatible("identifier")),
        }
    }

    /// Read as a whole number. Fractional numerics are rejected rather than truncated.
    pub fn to_i64(&self) -> Result<Option<i64>, CoercionError> {
        match self {
            SourceValue::Null => Ok(None),
            SourceValue::Int(v) => Ok(Some(*v)),
            SourceValue::Bool(v) => Ok(Some(i64::from(*v))),
            SourceValue::Decimal(d) => {
                if d.fract().is_zero() {
                    d.to_i64().map(Some).ok_or_else(|| CoercionError::OutOfRange {
                        expected: "integer",
                        value: d.to_string(),
                    })
                } else {
                    Err(CoercionError::Unparseable {
                        expected: "integer",
                        value: d.to_string(),
                    })
                }
            }
            SourceValue::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    Ok(Some(*f as i64))
                } else {
                    Err(CoercionError::Unparseable {
                        expected: "integer",
                        value: f.to_string(),
                    })
                }
            }
            SourceValue::Text(text) => {
                let trimmed = text.trim();
                if let Ok(v) = trimmed.parse::<i64>() {
                    return Ok(Some(v));
                }
                // "12.0" from a driver that renders numerics with a scale
                Decimal::from_str(trimmed)
                    .map_err(|_| CoercionError::Unparseable {
                        expected: "integer",
                        value: text.clone(),
                    })
                    .and_then(|d| SourceValue::Decimal(d).to_i64())
            }
            other => Err(other.incompatible("integer")),
        }
    }

    pub fn to_i32(&self) -> Result<Option<i32>, CoercionError> {
        match self.to_i64()? {
            None => Ok(None),
            Some(v) => i32::try_from(v)
                .map(Some)
                .map_err(|_| CoercionError::OutOfRange {
                    expected: "32-bit integer",
                    value: v.to_string(),
                }),
        }
    }

    /// Render any non-null value as text.
    pub fn to_text(&self) -> Option<String> {
        match self {
            SourceValue::Null => None,
            SourceValue::Bool(v) => Some(v.to_string()),
            SourceValue::Int(v) => Some(v.to_string()),
            SourceValue::Float(v) => Some(v.to_string()),
            SourceValue::Decimal(v) => Some(v.normalize().to_string()),
            SourceValue::Text(v) => Some(v.clone()),
            SourceValue::Bytes(raw) => match Uuid::from_slice(raw) {
                Ok(id) => Some(id.to_string()),
                Err(_) => Some(String::from_utf8_lossy(raw).into_owned()),
            },
            SourceValue::Uuid(id) => Some(id.to_string()),
        }
    }

    /// Re-encode a boolean-ish value into the `{0, 1}` domain.
    pub fn to_flag(&self) -> Result<Option<i16>, CoercionError> {
        match self {
            SourceValue::Null => Ok(None),
            SourceValue::Bool(v) => Ok(Some(i16::from(*v))),
            SourceValue::Int(v) => Ok(Some(i16::from(*v != 0))),
            SourceValue::Decimal(d) => Ok(Some(i16::from(!d.is_zero()))),
            SourceValue::Float(f) => Ok(Some(i16::from(*f != 0.0))),
            SourceValue::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "t" | "y" | "yes" => Ok(Some(1)),
                "0" | "false" | "f" | "n" | "no" => Ok(Some(0)),
                _ => Err(CoercionError::Unparseable {
                    expected: "flag",
                    value: text.clone(),
                }),
            },
            other => Err(other.incompatible("flag")),
        }
    }

    /// Strict fixed-point read: floating-point values are a type mismatch here.
    pub fn to_decimal(&self) -> Result<Option<Decimal>, CoercionError> {
        match self {
            SourceValue::Null => Ok(None),
            SourceValue::Decimal(d) => Ok(Some(*d)),
            SourceValue::Int(v) => Ok(Some(Decimal::from(*v))),
            SourceValue::Text(text) => Decimal::from_str(text.trim()).map(Some).map_err(|_| {
                CoercionError::Unparseable {
                    expected: "fixed-point number",
                    value: text.clone(),
                }
            }),
            other => Err(other.incompatible("fixed-point number")),
        }
    }

    pub fn to_f64(&self) -> Result<Option<f64>, CoercionError> {
        match self {
            SourceValue::Null => Ok(None),
            SourceValue::Float(f) => Ok(Some(*f)),
            SourceValue::Decimal(d) => d.to_f64().map(Some).ok_or_else(|| {
                CoercionError::OutOfRange {
                    expected: "floating-point number",
                    value: d.to_string(),
                }
            }),
            SourceValue::Int(v) => Ok(Some(*v as f64)),
            SourceValue::Text(text) => text.trim().parse::<f64>().map(Some).map_err(|_| {
                CoercionError::Unparseable {
                    expected: "floating-point number",
                    value: text.clone(),
                }
            }),
            other => Err(other.incompatible("floating-point number")),
        }
    }
}

/// Round an aggregate average to a whole grade.
///
/// Attempts a fixed-point read first and falls back to floating-point only on
/// a type mismatch. Midpoints round to the even neighbour in both paths.
pub fn round_average(value: &SourceValue) -> Result<Option<i32>, CoercionError> {
    match value.to_decimal() {
        Ok(None) => Ok(None),
        Ok(Some(d)) => d
            .round()
            .to_i32()
            .map(Some)
            .ok_or_else(|| CoercionError::OutOfRange {
                expected: "grade",
                value: d.to_string(),
            }),
        Err(CoercionError::Incompatible { .. }) => match value.to_f64()? {
            None => Ok(None),
            Some(f) => {
                let rounded = f.round_ties_even();
                if rounded.is_finite() && rounded >= i32::MIN as f64 && rounded <= i32::MAX as f64 {
                    Ok(Some(rounded as i32))
                } else {
                    Err(CoercionError::OutOfRange {
                        expected: "grade",
                        value: f.to_string(),
                    })
                }
            }
        },
        Err(other) => Err(other),
    }
}

/// One row returned by an extraction query, columns in query order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceRow {
    values: Vec<SourceValue>,
}

static NULL: SourceValue = SourceValue::Null;

impl SourceRow {
    pub fn new(values: Vec<SourceValue>) -> Self {
        Self { values }
    }

    /// Column value by position; a missing column reads as null.
    pub fn get(&self, index: usize) -> &SourceValue {
        self.values.get(index).unwrap_or(&NULL)
    }

    /// A key column. Keys cannot be substituted, so failure is an error.
    pub fn id(&self, index: usize, column: &'static str) -> EtlResult<uuid::Uuid> {
        match self.get(index).to_uuid() {
            Ok(Some(id)) => Ok(id),
            Ok(None) => Err(EtlError::Coercion {
                column,
                source: CoercionError::Null,
            }),
            Err(source) => Err(EtlError::Coercion { column, source }),
        }
    }

    pub fn opt_id(&self, index: usize, column: &'static str) -> Option<Uuid> {
        recover(column, self.get(index).to_uuid())
    }

    pub fn opt_i32(&self, index: usize, column: &'static str) -> Option<i32> {
        recover(column, self.get(index).to_i32())
    }

    pub fn opt_text(&self, index: usize) -> Option<String> {
        self.get(index).to_text()
    }

    pub fn flag(&self, index: usize, column: &'static str) -> Option<i16> {
        recover(column, self.get(index).to_flag())
    }

    pub fn average(&self, index: usize, column: &'static str) -> Option<i32> {
        recover(column, round_average(self.get(index)))
    }
}

/// Substitute "no value" for a column that could not be coerced.
fn recover<T>(column: &str, result: Result<Option<T>, CoercionError>) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(err) => {
            warn!("Column {} could not be coerced, storing null: {}", column, err);
            None
        }
    }
}
