use std::fmt;
use serde::{Deserialize, Serialize};

/// Kind of a metric value. The discriminants are the `vtype` codes used by `RawValue`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Int64 = 1,
    Uint64 = 2,
    Double = 3,
    Bool = 4,
}

impl ValueKind {
    /// `None` for 0 (`TYPE_INVALID`) and any unknown code.
    pub fn from_raw(code: i32) -> Option<Self> {
        match code {
            1 => Some(ValueKind::Int64),
            2 => Some(ValueKind::Uint64),
            3 => Some(ValueKind::Double),
            4 => Some(ValueKind::Bool),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Int64 => "int64",
            ValueKind::Uint64 => "uint64",
            ValueKind::Double => "double",
            ValueKind::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// A single reported value. Exactly one variant is ever populated, so the
/// discriminant can't disagree with the payload once decoded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Int64(i64),
    Uint64(u64),
    Double(#[serde(with = "lossless_f64")] f64),
    Bool(bool),
}

impl MetricValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            MetricValue::Int64(_) => ValueKind::Int64,
            MetricValue::Uint64(_) => ValueKind::Uint64,
            MetricValue::Double(_) => ValueKind::Double,
            MetricValue::Bool(_) => ValueKind::Bool,
        }
    }
}

/// Bitwise equality: two doubles are equal when their IEEE-754 bits are, so a NaN
/// payload compares equal to itself and `0.0 != -0.0`.
impl PartialEq for MetricValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MetricValue::Int64(a), MetricValue::Int64(b)) => a == b,
            (MetricValue::Uint64(a), MetricValue::Uint64(b)) => a == b,
            (MetricValue::Double(a), MetricValue::Double(b)) => a.to_bits() == b.to_bits(),
            (MetricValue::Bool(a), MetricValue::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for MetricValue {}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int64(v) => write!(f, "{}", v),
            MetricValue::Uint64(v) => write!(f, "{}", v),
            MetricValue::Double(v) => write!(f, "{}", v),
            MetricValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int64(v)
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        MetricValue::Uint64(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Double(v)
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}

/// Doubles as JSON: finite values are plain numbers, `inf`/`-inf` are strings and
/// a NaN is `nan:` followed by its bit pattern in hex, so every value reads back
/// with the same bits.
mod lossless_f64 {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    const NAN_PREFIX: &str = "nan:0x";

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_str(&to_text(*value))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        deserializer.deserialize_any(DoubleVisitor)
    }

    pub(super) fn to_text(value: f64) -> String {
        if value.is_nan() {
            format!("{}{:016x}", NAN_PREFIX, value.to_bits())
        } else if value == f64::INFINITY {
            "inf".to_string()
        } else if value == f64::NEG_INFINITY {
            "-inf".to_string()
        } else {
            value.to_string()
        }
    }

    pub(super) fn from_text(text: &str) -> Option<f64> {
        match text {
            "inf" => Some(f64::INFINITY),
            "-inf" => Some(f64::NEG_INFINITY),
            _ => match text.strip_prefix(NAN_PREFIX) {
                Some(hex) => u64::from_str_radix(hex, 16).ok().map(f64::from_bits).filter(|v| v.is_nan()),
                None => text.parse().ok(),
            },
        }
    }

    struct DoubleVisitor;

    impl<'de> Visitor<'de> for DoubleVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a number, \"inf\", \"-inf\" or \"nan:0x<bits>\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            from_text(v).ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }
}
