//! Host-side representation of a SQL column value and its conversion to and
//! from the wire format in [`crate::wire`].

use chrono::{DateTime, Utc};

use crate::error::{FabricError, Result};
use crate::wire;

/// A single SQL column value, independent of any particular origin's type
/// system. Mirrors the tagged union carried on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Varchar(String),
    Integer(i64),
    Decimal(f32),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Null,
}

impl Value {
    pub fn to_wire(&self) -> wire::Value {
        let typed_value = match self {
            Value::Varchar(s) => wire::TypedValue::Varchar(s.clone()),
            Value::Integer(i) => wire::TypedValue::Integer(*i),
            Value::Decimal(d) => wire::TypedValue::Decimal(*d),
            Value::Boolean(b) => wire::TypedValue::Boolean(*b),
            Value::Timestamp(t) => wire::TypedValue::Timestamp(prost_types::Timestamp {
                seconds: t.timestamp(),
                nanos: t.timestamp_subsec_nanos() as i32,
            }),
            Value::Null => wire::TypedValue::Null(wire::NullValue {}),
        };
        wire::Value {
            typed_value: Some(typed_value),
        }
    }

    pub fn from_wire(v: &wire::Value) -> Result<Value> {
        match &v.typed_value {
            Some(wire::TypedValue::Varchar(s)) => Ok(Value::Varchar(s.clone())),
            Some(wire::TypedValue::Integer(i)) => Ok(Value::Integer(*i)),
            Some(wire::TypedValue::Decimal(d)) => Ok(Value::Decimal(*d)),
            Some(wire::TypedValue::Boolean(b)) => Ok(Value::Boolean(*b)),
            Some(wire::TypedValue::Timestamp(ts)) => {
                DateTime::from_timestamp(ts.seconds, ts.nanos as u32)
                    .map(Value::Timestamp)
                    .ok_or_else(|| FabricError::Unmarshal(format!("out of range timestamp: {ts:?}")))
            }
            Some(wire::TypedValue::Null(_)) | None => Ok(Value::Null),
        }
    }
}

/// Converts a `mysql_async` column value into the host-side [`Value`].
/// Shared between the querier/client's origin fallback queries and the
/// publisher's initial snapshot scan so both map MySQL types identically.
pub fn from_mysql(v: Option<&mysql_async::Value>) -> Value {
    match v {
        None | Some(mysql_async::Value::NULL) => Value::Null,
        Some(mysql_async::Value::Bytes(b)) => Value::Varchar(String::from_utf8_lossy(b).to_string()),
        Some(mysql_async::Value::Int(i)) => Value::Integer(*i),
        Some(mysql_async::Value::UInt(u)) => Value::Integer(*u as i64),
        Some(mysql_async::Value::Float(f)) => Value::Decimal(*f),
        Some(mysql_async::Value::Double(d)) => Value::Decimal(*d as f32),
        Some(mysql_async::Value::Date(y, mo, d, h, mi, s, _)) => {
            let naive = chrono::NaiveDate::from_ymd_opt(*y as i32, *mo as u32, *d as u32)
                .and_then(|date| date.and_hms_opt(*h as u32, *mi as u32, *s as u32));
            match naive {
                Some(dt) => {
                    Value::Timestamp(chrono::DateTime::from_naive_utc_and_offset(dt, chrono::Utc))
                }
                None => Value::Null,
            }
        }
        Some(mysql_async::Value::Time(..)) => Value::Null,
    }
}

pub fn marshal_values(values: &[Value]) -> Vec<wire::Value> {
    values.iter().map(Value::to_wire).collect()
}

pub fn unmarshal_values(values: &[wire::Value]) -> Result<Vec<Value>> {
    values.iter().map(Value::from_wire).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        let values = vec![
            Value::Varchar("hello".to_string()),
            Value::Integer(-42),
            Value::Decimal(3.5),
            Value::Boolean(true),
            Value::Timestamp(DateTime::from_timestamp(1_700_000_000, 0).unwrap()),
            Value::Null,
        ];
        for v in values {
            let wire = v.to_wire();
            assert_eq!(Value::from_wire(&wire).unwrap(), v);
        }
    }

    #[test]
    fn marshal_values_preserves_order() {
        let values = vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)];
        let wire = marshal_values(&values);
        let back = unmarshal_values(&wire).unwrap();
        assert_eq!(back, values);
    }
}
