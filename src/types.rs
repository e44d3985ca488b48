//! Column type descriptors.
//!
//! The engine describes every column twice: a display string (`type`) and a
//! recursive `typeSignature` object. Both are folded into [`DataType`], the
//! tagged form consumed by [`crate::decode::decode`].

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Wire form of a type signature: `{rawType, arguments}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSignature {
    pub raw_type: String,
    #[serde(default)]
    pub arguments: Vec<TypeArgument>,
}

/// One argument of a type signature. Presto and Trino spell the kinds differently
/// (`TYPE_SIGNATURE` vs `TYPE`, `NAMED_TYPE_SIGNATURE` vs `NAMED_TYPE`, `LONG_LITERAL` vs `LONG`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawTypeArgument")]
pub enum TypeArgument {
    Type(TypeSignature),
    Named { name: Option<String>, signature: TypeSignature },
    Long(i64),
}

#[derive(Deserialize)]
struct RawTypeArgument {
    kind: String,
    value: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamedTypeValue {
    #[serde(default)]
    field_name: Option<FieldName>,
    type_signature: TypeSignature,
}

#[derive(Deserialize)]
struct FieldName {
    name: String,
}

impl TryFrom<RawTypeArgument> for TypeArgument {
    type Error = String;

    fn try_from(raw: RawTypeArgument) -> std::result::Result<Self, Self::Error> {
        match raw.kind.as_str() {
            "TYPE" | "TYPE_SIGNATURE" => serde_json::from_value(raw.value)
                .map(TypeArgument::Type)
                .map_err(|e| format!("bad type argument: {e}")),
            "NAMED_TYPE" | "NAMED_TYPE_SIGNATURE" => {
                let v: NamedTypeValue = serde_json::from_value(raw.value).map_err(|e| format!("bad named type argument: {e}"))?;
                Ok(TypeArgument::Named { name: v.field_name.map(|f| f.name), signature: v.type_signature })
            }
            "LONG" | "LONG_LITERAL" => raw.value.as_i64()
                .map(TypeArgument::Long)
                .ok_or_else(|| format!("bad long literal argument: {}", raw.value)),
            other => Err(format!("unsupported type argument kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowField {
    pub name: Option<String>,
    pub data_type: DataType,
}

/// Decoder-facing type descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    /// Any scalar the decoder passes through untouched (`bigint`, `varchar`, `boolean`, ...).
    Scalar(String),
    Double,
    Real,
    Decimal { precision: u32, scale: u32 },
    Date,
    Time,
    TimeWithTimeZone,
    Timestamp,
    TimestampWithTimeZone,
    Array(Box<DataType>),
    Map(Box<DataType>, Box<DataType>),
    Row(Vec<RowField>),
}

impl DataType {
    pub fn from_signature(sig: &TypeSignature) -> Result<Self> {
        let raw = sig.raw_type.to_ascii_lowercase();
        let types: Vec<RowField> = sig.arguments.iter().filter_map(|a| match a {
            TypeArgument::Type(t) => Some(DataType::from_signature(t).map(|dt| RowField { name: None, data_type: dt })),
            TypeArgument::Named { name, signature } => Some(DataType::from_signature(signature).map(|dt| RowField { name: name.clone(), data_type: dt })),
            TypeArgument::Long(_) => None,
        }).collect::<Result<_>>()?;
        let longs: Vec<i64> = sig.arguments.iter().filter_map(|a| match a { TypeArgument::Long(n) => Some(*n), _ => None }).collect();
        Self::assemble(&raw, types, &longs)
    }

    /// Shared by both the signature path and the display-string parser.
    fn assemble(raw: &str, mut types: Vec<RowField>, longs: &[i64]) -> Result<Self> {
        Ok(match raw {
            "array" => {
                expect_arity(raw, &types, 1)?;
                DataType::Array(Box::new(types.remove(0).data_type))
            }
            "map" => {
                expect_arity(raw, &types, 2)?;
                let value = types.remove(1).data_type;
                let key = types.remove(0).data_type;
                DataType::Map(Box::new(key), Box::new(value))
            }
            "row" => DataType::Row(types),
            "decimal" => {
                let precision = longs.first().copied().unwrap_or(38);
                let scale = longs.get(1).copied().unwrap_or(0);
                if precision < 0 || scale < 0 {
                    return Err(Error::protocol(format!("invalid decimal arguments ({precision},{scale})")));
                }
                DataType::Decimal { precision: precision as u32, scale: scale as u32 }
            }
            "double" => DataType::Double,
            "real" => DataType::Real,
            "date" => DataType::Date,
            "time" => DataType::Time,
            "time with time zone" => DataType::TimeWithTimeZone,
            "timestamp" => DataType::Timestamp,
            "timestamp with time zone" => DataType::TimestampWithTimeZone,
            other => DataType::Scalar(other.to_string()),
        })
    }

    /// Parse the engine's display form (`row(x integer, y array(varchar))`)
    /// or the angle-bracket spelling (`map<varchar,integer>`).
    pub fn parse(text: &str) -> Result<Self> {
        let mut p = TypeParser { chars: text.chars().collect(), pos: 0 };
        let (_, expr) = p.expr(false)?;
        p.skip_ws();
        if p.pos != p.chars.len() {
            return Err(Error::protocol(format!("trailing input in type '{text}' at offset {}", p.pos)));
        }
        expr.into_data_type()
    }
}

fn expect_arity(raw: &str, types: &[RowField], n: usize) -> Result<()> {
    if types.len() != n {
        return Err(Error::protocol(format!("type '{raw}' expects {n} type argument(s), got {}", types.len())));
    }
    Ok(())
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> { DataType::parse(s) }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Scalar(name) => write!(f, "{name}"),
            DataType::Double => write!(f, "double"),
            DataType::Real => write!(f, "real"),
            DataType::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            DataType::Date => write!(f, "date"),
            DataType::Time => write!(f, "time"),
            DataType::TimeWithTimeZone => write!(f, "time with time zone"),
            DataType::Timestamp => write!(f, "timestamp"),
            DataType::TimestampWithTimeZone => write!(f, "timestamp with time zone"),
            DataType::Array(t) => write!(f, "array({t})"),
            DataType::Map(k, v) => write!(f, "map({k}, {v})"),
            DataType::Row(fields) => {
                write!(f, "row(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    match &field.name {
                        Some(n) => write!(f, "{} {}", n, field.data_type)?,
                        None => write!(f, "{}", field.data_type)?,
                    }
                }
                write!(f, ")")
            }
        }
    }
}

// Multi-word type names that must not be split into `<field> <type>` inside a row.
const COMPOUND_NAMES: &[&str] = &[
    "time with time zone",
    "timestamp with time zone",
    "interval day to second",
    "interval year to month",
    "double precision",
];

struct TypeExpr {
    name: String,
    args: Vec<ExprArg>,
}

enum ExprArg {
    Literal(i64),
    Type(Option<String>, TypeExpr),
}

impl TypeExpr {
    fn into_data_type(self) -> Result<DataType> {
        let mut types = Vec::new();
        let mut longs = Vec::new();
        for arg in self.args {
            match arg {
                ExprArg::Literal(n) => longs.push(n),
                ExprArg::Type(name, expr) => types.push(RowField { name, data_type: expr.into_data_type()? }),
            }
        }
        DataType::assemble(&self.name.to_ascii_lowercase(), types, &longs)
    }
}

struct TypeParser {
    chars: Vec<char>,
    pos: usize,
}

impl TypeParser {
    fn peek(&self) -> Option<char> { self.chars.get(self.pos).copied() }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) { self.pos += 1; }
    }

    fn err(&self, what: &str) -> Error {
        let text: String = self.chars.iter().collect();
        Error::protocol(format!("{what} in type '{text}' at offset {}", self.pos))
    }

    // Reads space separated words up to a bracket, comma or end of input.
    fn words(&mut self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None | Some('(') | Some(')') | Some('<') | Some('>') | Some(',') => return Ok(out),
                Some('"') => {
                    self.pos += 1;
                    let mut w = String::new();
                    loop {
                        match self.peek() {
                            None => return Err(self.err("unterminated quoted identifier")),
                            Some('"') if self.chars.get(self.pos + 1) == Some(&'"') => { w.push('"'); self.pos += 2; }
                            Some('"') => { self.pos += 1; break; }
                            Some(c) => { w.push(c); self.pos += 1; }
                        }
                    }
                    out.push(w);
                }
                Some(_) => {
                    let start = self.pos;
                    while matches!(self.peek(), Some(c) if !c.is_whitespace() && !"()<>,\"".contains(c)) { self.pos += 1; }
                    out.push(self.chars[start..self.pos].iter().collect());
                }
            }
        }
    }

    fn expr(&mut self, allow_field: bool) -> Result<(Option<String>, TypeExpr)> {
        let mut words = self.words()?;
        if words.is_empty() {
            return Err(self.err("expected type name"));
        }
        let head = words.last().map(|w| w.to_ascii_lowercase()).unwrap_or_default();
        let mut args = Vec::new();
        if let Some(open @ ('(' | '<')) = self.peek() {
            let close = if open == '(' { ')' } else { '>' };
            self.pos += 1;
            loop {
                self.skip_ws();
                match self.peek() {
                    Some(c) if c.is_ascii_digit() => {
                        let start = self.pos;
                        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) { self.pos += 1; }
                        let digits: String = self.chars[start..self.pos].iter().collect();
                        let n = digits.parse::<i64>().map_err(|_| self.err("literal out of range"))?;
                        args.push(ExprArg::Literal(n));
                    }
                    _ => {
                        let (field, inner) = self.expr(head == "row")?;
                        args.push(ExprArg::Type(field, inner));
                    }
                }
                self.skip_ws();
                match self.peek() {
                    Some(',') => { self.pos += 1; }
                    Some(c) if c == close => { self.pos += 1; break; }
                    _ => return Err(self.err("expected ',' or closing bracket")),
                }
            }
            words.extend(self.words()?);
        }

        let mut field = None;
        if allow_field && words.len() >= 2 {
            let full = words.join(" ").to_ascii_lowercase();
            if !COMPOUND_NAMES.contains(&full.as_str()) {
                field = Some(words.remove(0));
            }
        }
        Ok((field, TypeExpr { name: words.join(" "), args }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: Option<&str>, data_type: DataType) -> RowField {
        RowField { name: name.map(str::to_string), data_type }
    }

    #[test]
    fn parses_angle_and_paren_notation() {
        assert_eq!(DataType::parse("array<integer>").unwrap(), DataType::Array(Box::new(DataType::Scalar("integer".into()))));
        assert_eq!(DataType::parse("array(integer)").unwrap(), DataType::parse("array<integer>").unwrap());
        assert_eq!(
            DataType::parse("map<varchar,integer>").unwrap(),
            DataType::Map(Box::new(DataType::Scalar("varchar".into())), Box::new(DataType::Scalar("integer".into())))
        );
        assert_eq!(DataType::parse("decimal(4,2)").unwrap(), DataType::Decimal { precision: 4, scale: 2 });
        assert_eq!(DataType::parse("varchar(10)").unwrap(), DataType::Scalar("varchar".into()));
    }

    #[test]
    fn parses_rows_with_and_without_names() {
        assert_eq!(
            DataType::parse("row(integer,varchar)").unwrap(),
            DataType::Row(vec![field(None, DataType::Scalar("integer".into())), field(None, DataType::Scalar("varchar".into()))])
        );
        assert_eq!(
            DataType::parse("row(x integer, ts timestamp(3) with time zone, \"my col\" array(double))").unwrap(),
            DataType::Row(vec![
                field(Some("x"), DataType::Scalar("integer".into())),
                field(Some("ts"), DataType::TimestampWithTimeZone),
                field(Some("my col"), DataType::Array(Box::new(DataType::Double))),
            ])
        );
        assert_eq!(
            DataType::parse("row(time with time zone)").unwrap(),
            DataType::Row(vec![field(None, DataType::TimeWithTimeZone)])
        );
    }

    #[test]
    fn parses_temporal_suffixes() {
        assert_eq!(DataType::parse("timestamp(6)").unwrap(), DataType::Timestamp);
        assert_eq!(DataType::parse("timestamp(3) with time zone").unwrap(), DataType::TimestampWithTimeZone);
        assert_eq!(DataType::parse("time with time zone").unwrap(), DataType::TimeWithTimeZone);
    }

    #[test]
    fn rejects_malformed_types() {
        assert!(DataType::parse("array(integer").is_err());
        assert!(DataType::parse("map(varchar)").is_err());
        assert!(DataType::parse("").is_err());
        assert!(DataType::parse("array(integer) junk)").is_err());
    }

    #[test]
    fn display_round_trips_through_parser() {
        let t = DataType::parse("row(a map(varchar, array(decimal(10,3))), b date)").unwrap();
        assert_eq!(t.to_string(), "row(a map(varchar, array(decimal(10,3))), b date)");
        assert_eq!(DataType::parse(&t.to_string()).unwrap(), t);
    }

    #[test]
    fn trino_signature_to_data_type() {
        let sig: TypeSignature = serde_json::from_value(json!({
            "rawType": "row",
            "arguments": [
                {"kind": "NAMED_TYPE", "value": {"fieldName": {"name": "id"}, "typeSignature": {"rawType": "bigint", "arguments": []}}},
                {"kind": "NAMED_TYPE", "value": {"typeSignature": {"rawType": "decimal", "arguments": [
                    {"kind": "LONG", "value": 4}, {"kind": "LONG", "value": 2}
                ]}}}
            ]
        })).unwrap();
        assert_eq!(
            DataType::from_signature(&sig).unwrap(),
            DataType::Row(vec![field(Some("id"), DataType::Scalar("bigint".into())), field(None, DataType::Decimal { precision: 4, scale: 2 })])
        );
    }

    #[test]
    fn presto_signature_to_data_type() {
        let sig: TypeSignature = serde_json::from_value(json!({
            "rawType": "map",
            "typeArguments": [],
            "literalArguments": [],
            "arguments": [
                {"kind": "TYPE_SIGNATURE", "value": {"rawType": "varchar", "arguments": [{"kind": "LONG_LITERAL", "value": 2147483647}]}},
                {"kind": "TYPE_SIGNATURE", "value": {"rawType": "array", "arguments": [
                    {"kind": "TYPE_SIGNATURE", "value": {"rawType": "timestamp with time zone", "arguments": []}}
                ]}}
            ]
        })).unwrap();
        assert_eq!(
            DataType::from_signature(&sig).unwrap(),
            DataType::Map(Box::new(DataType::Scalar("varchar".into())), Box::new(DataType::Array(Box::new(DataType::TimestampWithTimeZone))))
        );
    }

    #[test]
    fn unknown_argument_kind_fails_deserialization() {
        let res: std::result::Result<TypeSignature, _> = serde_json::from_value(json!({
            "rawType": "array", "arguments": [{"kind": "VARIABLE", "value": "x"}]
        }));
        assert!(res.is_err());
    }
}
