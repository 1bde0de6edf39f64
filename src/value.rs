//! Numeric values exchanged between scripts and the engine
//!
//! Per-node results are normalised to [`ScalarValue`] before they enter the
//! result collection, so reducers only ever see numbers and comparisons are
//! numeric across integer and float results.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// A single numeric result
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Int(i64),
    Float(f64),
}

impl ScalarValue {
    /// Build a float value, rejecting NaN and infinities. `-0.0` becomes `0.0`.
    pub fn float(value: f64) -> Result<Self, TypeMismatch> {
        if value.is_finite() {
            Ok(Self::Float(if value == 0.0 { 0.0 } else { value }))
        } else {
            Err(TypeMismatch::new(format!("non-finite float {value}")))
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    /// Integer view; floats truncate toward zero and saturate at the i64 range
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Int(v) => v,
            Self::Float(v) => v as i64,
        }
    }

    pub fn is_int(self) -> bool {
        matches!(self, Self::Int(_))
    }

    /// Compare by exact numeric value, across integer and float variants
    pub fn numeric_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
            (Self::Int(a), Self::Float(b)) => cmp_int_float(*a, *b),
            (Self::Float(a), Self::Int(b)) => cmp_int_float(*b, *a).reverse(),
        }
    }
}

/// 2^63, the first float above `i64::MAX`
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Exact comparison of an integer with a float, without rounding the integer
fn cmp_int_float(int: i64, float: f64) -> Ordering {
    if float.is_nan() {
        return if float.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if float >= I64_BOUND {
        return Ordering::Less;
    }
    if float < -I64_BOUND {
        return Ordering::Greater;
    }

    let whole = float.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => {
            let fraction = float - whole;
            if fraction > 0.0 {
                Ordering::Less
            } else if fraction < 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        unequal => unequal,
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        self.numeric_cmp(other) == Ordering::Equal
    }
}

impl Eq for ScalarValue {}

impl PartialOrd for ScalarValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScalarValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric_cmp(other)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

/// A script return value could not be normalised to a [`ScalarValue`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected a single finite numeric value, found {found}")]
pub struct TypeMismatch {
    pub found: String,
}

impl TypeMismatch {
    pub fn new(found: impl Into<String>) -> Self {
        Self {
            found: found.into(),
        }
    }
}

/// Raw value returned by a script function, before normalisation
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// The function returned nothing
    Unit,
    /// Anything that is not a single number (multiple results, references, vectors)
    Other(String),
}

impl TryFrom<ScriptValue> for ScalarValue {
    type Error = TypeMismatch;

    fn try_from(value: ScriptValue) -> Result<Self, Self::Error> {
        match value {
            ScriptValue::I32(v) => Ok(Self::from(v)),
            ScriptValue::I64(v) => Ok(Self::Int(v)),
            ScriptValue::F32(v) => Self::float(f64::from(v)),
            ScriptValue::F64(v) => Self::float(v),
            ScriptValue::Unit => Err(TypeMismatch::new("no value")),
            ScriptValue::Other(found) => Err(TypeMismatch::new(found)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_not_lexicographic_ordering() {
        let mut values = vec![
            ScalarValue::Int(3),
            ScalarValue::Int(12),
            ScalarValue::Int(7),
        ];
        values.sort();
        assert_eq!(values.last(), Some(&ScalarValue::Int(12)));
        // "7" > "12" as text; never as numbers
        assert!(ScalarValue::Int(12) > ScalarValue::Int(7));
    }

    #[test]
    fn test_mixed_int_and_float_compare_numerically() {
        assert!(ScalarValue::Int(12) > ScalarValue::Float(7.5));
        assert!(ScalarValue::Float(12.5) > ScalarValue::Int(12));
        assert_eq!(ScalarValue::Int(3), ScalarValue::Float(3.0));
    }

    #[test]
    fn test_mixed_comparison_is_exact_beyond_f64_precision() {
        let two_53 = 1_i64 << 53;
        let float = ScalarValue::Float(two_53 as f64);

        assert_eq!(ScalarValue::Int(two_53), float);
        assert!(ScalarValue::Int(two_53 + 1) > float);
        assert!(float < ScalarValue::Int(two_53 + 1));
        assert!(ScalarValue::Int(i64::MAX) < ScalarValue::Float(I64_BOUND));
        assert_eq!(ScalarValue::Int(i64::MIN), ScalarValue::Float(-I64_BOUND));
        assert!(ScalarValue::Int(-3) > ScalarValue::Float(-3.5));
        assert!(ScalarValue::Int(-3) < ScalarValue::Float(-2.5));

        let mut values = vec![
            ScalarValue::Int(two_53 + 1),
            float,
            ScalarValue::Int(two_53),
            ScalarValue::Float(two_53 as f64 + 2.0),
        ];
        values.sort();
        assert_eq!(values[2], ScalarValue::Int(two_53 + 1));
        assert_eq!(values[3], ScalarValue::Float(two_53 as f64 + 2.0));
    }

    #[test]
    fn test_negative_zero_equals_zero() {
        assert_eq!(ScalarValue::Float(-0.0), ScalarValue::Int(0));
        assert_eq!(ScalarValue::Float(-0.0), ScalarValue::Float(0.0));
        match ScalarValue::float(-0.0).unwrap() {
            ScalarValue::Float(v) => assert!(v.is_sign_positive()),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_normalisation() {
        assert_eq!(
            ScalarValue::try_from(ScriptValue::I32(-1)),
            Ok(ScalarValue::Int(-1))
        );
        assert_eq!(
            ScalarValue::try_from(ScriptValue::F32(1.5)),
            Ok(ScalarValue::Float(1.5))
        );
        assert!(ScalarValue::try_from(ScriptValue::F64(f64::NAN)).is_err());
        assert!(ScalarValue::try_from(ScriptValue::Unit).is_err());
        assert_eq!(
            ScalarValue::try_from(ScriptValue::Other("2 values".into()))
                .unwrap_err()
                .found,
            "2 values"
        );
    }

    #[test]
    fn test_serializes_as_plain_number() {
        assert_eq!(serde_json::to_string(&ScalarValue::Int(9)).unwrap(), "9");
        assert_eq!(
            serde_json::to_string(&ScalarValue::Float(2.5)).unwrap(),
            "2.5"
        );
    }
}
