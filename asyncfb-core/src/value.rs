//! Sql value types and conversions
//!
//! [`SqlValue`] is the variant cell type moved between the engine and the
//! client implementations: every fetched column and every bound parameter
//! is one of these.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Column type tags, with the numeric codes used on the wire.
///
/// The codes are part of the public contract and must not change
/// between releases.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum SqlType {
    Blob = 1,
    Date = 2,
    Time = 3,
    Timestamp = 4,
    String = 5,
    SmallInt = 6,
    Int = 7,
    LargeInt = 8,
    Float = 9,
    Double = 10,
}

/// A dynamically typed, nullable sql value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Text(String),
}

use SqlValue::*;

impl Default for SqlValue {
    fn default() -> Self {
        Null
    }
}

impl SqlValue {
    pub fn null() -> Self {
        Null
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Null)
    }

    pub fn set_null(&mut self) {
        *self = Null;
    }

    /// Replace the value. The tag is picked from the input type, see
    /// the `From` implementations below.
    pub fn set<T: Into<SqlValue>>(&mut self, value: T) {
        *self = value.into();
    }

    /// The column type tag of the current value, `None` when null
    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            Null => None,
            SmallInt(_) => Some(SqlType::SmallInt),
            Int(_) => Some(SqlType::Int),
            BigInt(_) => Some(SqlType::LargeInt),
            Float(_) => Some(SqlType::Float),
            Double(_) => Some(SqlType::Double),
            Bytes(_) => Some(SqlType::Blob),
            Date(_) => Some(SqlType::Date),
            Time(_) => Some(SqlType::Time),
            Timestamp(_) => Some(SqlType::Timestamp),
            Text(_) => Some(SqlType::String),
        }
    }

    /// Lossy conversion to `i64`. Floating values truncate, textual
    /// values are parsed and fall back to zero.
    pub fn as_i64(&self) -> i64 {
        match self {
            SmallInt(i) => *i as i64,
            Int(i) => *i as i64,
            BigInt(i) => *i,
            Float(f) => *f as i64,
            Double(f) => *f as i64,
            Null => 0,
            other => {
                let text = other.as_string();
                text.parse::<i64>()
                    .unwrap_or_else(|_| text.parse::<f64>().map(|f| f as i64).unwrap_or(0))
            }
        }
    }

    pub fn as_i32(&self) -> i32 {
        self.as_i64() as i32
    }

    pub fn as_i16(&self) -> i16 {
        self.as_i64() as i16
    }

    /// Lossy conversion to `f64`, falling back to zero for values
    /// without a numeric reading.
    pub fn as_f64(&self) -> f64 {
        match self {
            SmallInt(i) => *i as f64,
            Int(i) => *i as f64,
            BigInt(i) => *i as f64,
            Float(f) => *f as f64,
            Double(f) => *f,
            Null => 0.0,
            other => other.as_string().parse().unwrap_or(0.0),
        }
    }

    pub fn as_f32(&self) -> f32 {
        match self {
            Float(f) => *f,
            other => other.as_f64() as f32,
        }
    }

    /// The raw byte reading of the value. Binary payloads are returned
    /// as stored, everything else through its canonical textual form.
    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            Bytes(b) => b.clone(),
            Text(t) => t.clone().into_bytes(),
            Null => vec![],
            other => other.as_string().into_bytes(),
        }
    }

    /// Canonical textual rendering. Always succeeds: temporal kinds are
    /// ISO-8601, numerics plain decimal, binary payloads the utf-8 text
    /// when valid and lower case hex otherwise.
    pub fn as_string(&self) -> String {
        match self {
            Null => String::new(),
            SmallInt(i) => i.to_string(),
            Int(i) => i.to_string(),
            BigInt(i) => i.to_string(),
            Float(f) => f.to_string(),
            Double(f) => f.to_string(),
            Text(t) => t.clone(),
            Bytes(b) => match std::str::from_utf8(b) {
                Ok(text) => text.to_string(),
                Err(_) => hex::encode(b),
            },
            Date(d) => d.format("%Y-%m-%d").to_string(),
            Time(t) => t.format("%H:%M:%S%.3f").to_string(),
            Timestamp(ts) => ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
        }
    }

    /// The date reading of the value, when it has one
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Date(d) => Some(*d),
            Timestamp(ts) => Some(ts.date()),
            Text(t) => NaiveDate::parse_from_str(t.trim(), "%Y-%m-%d").ok(),
            _ => None,
        }
    }

    /// The time-of-day reading of the value, when it has one
    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Time(t) => Some(*t),
            Timestamp(ts) => Some(ts.time()),
            Text(t) => {
                let t = t.trim();
                NaiveTime::parse_from_str(t, "%H:%M:%S%.f")
                    .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S"))
                    .ok()
            }
            _ => None,
        }
    }

    /// The timestamp reading of the value, when it has one. A bare date
    /// reads as midnight of that day.
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Timestamp(ts) => Some(*ts),
            Date(d) => d.and_hms_opt(0, 0, 0),
            Text(t) => {
                let t = t.trim();
                NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(t, "%Y-%m-%d %H:%M:%S%.f"))
                    .ok()
            }
            _ => None,
        }
    }
}

/// Integers pick the narrowest tag that holds the value
impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        if let Ok(small) = i16::try_from(i) {
            SmallInt(small)
        } else if let Ok(int) = i32::try_from(i) {
            Int(int)
        } else {
            BigInt(i)
        }
    }
}

/// Implements the integer setters, all routed through the `i64`
/// narrowing rules
macro_rules! impl_from_int {
    ( $( $t: ty ),+ ) => {
        $(
            impl From<$t> for SqlValue {
                fn from(i: $t) -> Self {
                    (i as i64).into()
                }
            }
        )+
    };
}

impl_from_int!(i8, u8, i16, u16, i32, u32);

/// Generic floating input always lands on `Double`
impl From<f64> for SqlValue {
    fn from(f: f64) -> Self {
        Double(f)
    }
}

/// The explicit float-typed setter. This is the only way to obtain a
/// `Float` value; the generic rules never pick it.
impl From<f32> for SqlValue {
    fn from(f: f32) -> Self {
        Float(f)
    }
}

impl From<String> for SqlValue {
    fn from(t: String) -> Self {
        Text(t)
    }
}

impl From<&str> for SqlValue {
    fn from(t: &str) -> Self {
        Text(t.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(b: Vec<u8>) -> Self {
        Bytes(b)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(b: &[u8]) -> Self {
        Bytes(b.to_vec())
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(d: NaiveDate) -> Self {
        Date(d)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(t: NaiveTime) -> Self {
        // Sub-millisecond precision is not representable on the wire
        Time(t.with_nanosecond(t.nanosecond() / 1_000_000 * 1_000_000).unwrap_or(t))
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(ts: NaiveDateTime) -> Self {
        Timestamp(
            ts.with_nanosecond(ts.nanosecond() / 1_000_000 * 1_000_000)
                .unwrap_or(ts),
        )
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Null,
        }
    }
}
