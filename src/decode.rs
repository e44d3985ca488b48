//! Wire value decoding.
//!
//! `decode` turns one JSON cell into a native [`Value`] according to its
//! [`DataType`]. Compound types recurse; scalars the engine already sends as
//! plain JSON (integers, booleans, varchar, ...) pass through unchanged.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::types::DataType;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

static TIME_WITH_OFFSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2}:\d{2}:\d{2}(?:\.\d+)?)\s*([+-]\d{2}:\d{2})$").unwrap()
});

/// A timestamp carrying either a numeric offset or a named zone.
#[derive(Debug, Clone, PartialEq)]
pub enum ZonedDateTime {
    Fixed(DateTime<FixedOffset>),
    /// Wall-clock time in a named zone; the offset is resolved only on demand
    /// so DST rules of the zone are kept.
    Named { local: NaiveDateTime, zone: Tz },
}

impl ZonedDateTime {
    pub fn naive_local(&self) -> NaiveDateTime {
        match self {
            ZonedDateTime::Fixed(dt) => dt.naive_local(),
            ZonedDateTime::Named { local, .. } => *local,
        }
    }

    /// Resolve to a fixed-offset instant. Ambiguous local times pick the earlier
    /// instant; local times skipped by a DST gap have no instant.
    pub fn to_fixed(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            ZonedDateTime::Fixed(dt) => Some(*dt),
            ZonedDateTime::Named { local, zone } => zone.from_local_datetime(local).earliest().map(|dt| dt.fixed_offset()),
        }
    }

    fn render(&self) -> String {
        match self {
            ZonedDateTime::Fixed(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f %:z").to_string(),
            ZonedDateTime::Named { local, zone } => format!("{} {}", local.format("%Y-%m-%d %H:%M:%S%.f"), zone.name()),
        }
    }
}

/// Native form of a decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    /// Scalar passed through as received.
    Json(Json),
    Double(f64),
    Decimal(BigDecimal),
    Date(NaiveDate),
    Time(NaiveTime),
    TimeTz(NaiveTime, FixedOffset),
    Timestamp(NaiveDateTime),
    TimestampTz(ZonedDateTime),
    Array(Vec<Value>),
    /// Positional; field names live in the type and may repeat.
    Row(Vec<Value>),
    /// Entries in received order.
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }

    /// Render back to JSON for persistence. Decimals and temporals become their
    /// canonical strings; non-finite doubles become the wire sentinels.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Json(v) => v.clone(),
            Value::Double(d) if d.is_nan() => Json::String("NaN".into()),
            Value::Double(d) if d.is_infinite() => Json::String(if *d > 0.0 { "Infinity" } else { "-Infinity" }.into()),
            Value::Double(d) => serde_json::Number::from_f64(*d).map(Json::Number).unwrap_or(Json::Null),
            Value::Decimal(d) => Json::String(d.to_string()),
            Value::Date(d) => Json::String(d.format(DATE_FORMAT).to_string()),
            Value::Time(t) => Json::String(t.format(TIME_FORMAT).to_string()),
            Value::TimeTz(t, off) => Json::String(format!("{}{}", t.format(TIME_FORMAT), off)),
            Value::Timestamp(ts) => Json::String(ts.format(TIMESTAMP_FORMATS[0]).to_string()),
            Value::TimestampTz(z) => Json::String(z.render()),
            Value::Array(items) | Value::Row(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(entries) => {
                let mut obj = serde_json::Map::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = match k.to_json() {
                        Json::String(s) => s,
                        other => other.to_string(),
                    };
                    obj.insert(key, v.to_json());
                }
                Json::Object(obj)
            }
        }
    }
}

pub fn decode(value: &Json, data_type: &DataType) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match data_type {
        DataType::Array(elem) => {
            let items = value.as_array().ok_or_else(|| Error::decode(value, data_type, "expected a JSON array"))?;
            items.iter().map(|v| decode(v, elem)).collect::<Result<_>>().map(Value::Array)
        }
        DataType::Row(fields) => {
            let items = value.as_array().ok_or_else(|| Error::decode(value, data_type, "expected a JSON array"))?;
            if items.len() != fields.len() {
                return Err(Error::decode(value, data_type, format!("expected {} fields, got {}", fields.len(), items.len())));
            }
            items.iter().zip(fields).map(|(v, f)| decode(v, &f.data_type)).collect::<Result<_>>().map(Value::Row)
        }
        DataType::Map(key_type, value_type) => {
            let obj = value.as_object().ok_or_else(|| Error::decode(value, data_type, "expected a JSON object"))?;
            let mut entries = Vec::with_capacity(obj.len());
            for (k, v) in obj {
                entries.push((decode(&Json::String(k.clone()), key_type)?, decode(v, value_type)?));
            }
            Ok(Value::Map(entries))
        }
        DataType::Decimal { .. } => {
            let text = match value {
                Json::String(s) => s.clone(),
                Json::Number(n) => n.to_string(),
                _ => return Err(Error::decode(value, data_type, "expected a decimal string")),
            };
            BigDecimal::from_str(text.trim()).map(Value::Decimal).map_err(|e| Error::decode(value, data_type, e))
        }
        DataType::Double | DataType::Real => decode_double(value, data_type).map(Value::Double),
        DataType::Date => {
            let s = expect_str(value, data_type)?;
            NaiveDate::parse_from_str(s, DATE_FORMAT).map(Value::Date).map_err(|e| Error::decode(value, data_type, e))
        }
        DataType::Time => {
            let s = expect_str(value, data_type)?;
            NaiveTime::parse_from_str(s, TIME_FORMAT).map(Value::Time).map_err(|e| Error::decode(value, data_type, e))
        }
        DataType::TimeWithTimeZone => {
            let s = expect_str(value, data_type)?;
            let caps = TIME_WITH_OFFSET.captures(s).ok_or_else(|| Error::decode(value, data_type, "expected HH:MM:SS[.f]±HH:MM"))?;
            let time = NaiveTime::parse_from_str(&caps[1], TIME_FORMAT).map_err(|e| Error::decode(value, data_type, e))?;
            let offset = parse_offset(&caps[2]).ok_or_else(|| Error::decode(value, data_type, "offset out of range"))?;
            Ok(Value::TimeTz(time, offset))
        }
        DataType::Timestamp => {
            let s = expect_str(value, data_type)?;
            parse_naive_timestamp(s).map(Value::Timestamp).map_err(|e| Error::decode(value, data_type, e))
        }
        DataType::TimestampWithTimeZone => {
            let s = expect_str(value, data_type)?;
            decode_zoned(s).map(Value::TimestampTz).map_err(|reason| Error::decode(value, data_type, reason))
        }
        DataType::Scalar(_) => Ok(Value::Json(value.clone())),
    }
}

/// Decode a whole row position-wise against the column types.
pub fn decode_row(row: &[Json], types: &[DataType]) -> Result<Vec<Value>> {
    if row.len() != types.len() {
        return Err(Error::protocol(format!("row has {} values but {} columns were declared", row.len(), types.len())));
    }
    row.iter().zip(types).map(|(v, t)| decode(v, t)).collect()
}

fn expect_str<'a>(value: &'a Json, data_type: &DataType) -> Result<&'a str> {
    value.as_str().ok_or_else(|| Error::decode(value, data_type, "expected a string"))
}

fn decode_double(value: &Json, data_type: &DataType) -> Result<f64> {
    match value {
        Json::Number(n) => n.as_f64().ok_or_else(|| Error::decode(value, data_type, "number out of range")),
        Json::String(s) => match s.as_str() {
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            "NaN" => Ok(f64::NAN),
            other => match other.parse::<f64>() {
                // Only the exact sentinels above may produce non-finite values.
                Ok(d) if d.is_finite() => Ok(d),
                Ok(_) => Err(Error::decode(value, data_type, "non-finite literal is not a wire sentinel")),
                Err(e) => Err(Error::decode(value, data_type, e)),
            },
        },
        _ => Err(Error::decode(value, data_type, "expected a number")),
    }
}

fn parse_naive_timestamp(s: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMATS[0]).or_else(|_| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMATS[1]))
}

fn decode_zoned(s: &str) -> std::result::Result<ZonedDateTime, String> {
    let (naive_part, zone_part) = s.trim().rsplit_once(' ').ok_or("expected '<timestamp> <zone>'")?;
    if zone_part.starts_with('+') || zone_part.starts_with('-') {
        let naive = parse_naive_timestamp(naive_part.trim()).map_err(|e| e.to_string())?;
        let offset = parse_offset(zone_part).ok_or_else(|| format!("invalid offset '{zone_part}'"))?;
        let dt = offset.from_local_datetime(&naive).single().ok_or("offset does not map local time")?;
        return Ok(ZonedDateTime::Fixed(dt));
    }
    let local = parse_naive_timestamp(naive_part.trim()).map_err(|e| e.to_string())?;
    let zone = Tz::from_str(zone_part).map_err(|e| format!("unknown time zone '{zone_part}': {e}"))?;
    Ok(ZonedDateTime::Named { local, zone })
}

// `±HH:MM`
fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let (h, m) = rest.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let hours: i32 = h.parse().ok()?;
    let minutes: i32 = m.parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
