//! Statement response envelope.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{QueryFailure, Result};
use crate::types::{DataType, TypeSignature};

pub type Row = Vec<Value>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub type_signature: Option<TypeSignature>,
}

impl Column {
    /// Prefer the structured signature; fall back to parsing the display type.
    pub fn data_type(&self) -> Result<DataType> {
        match &self.type_signature {
            Some(sig) => DataType::from_signature(sig),
            None => DataType::parse(&self.type_name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningCode {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    #[serde(default)]
    pub warning_code: WarningCode,
    #[serde(default)]
    pub message: String,
}

/// Raw body of a statement response as the coordinator sends it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatementResponse {
    pub id: String,
    #[serde(default)]
    pub info_uri: Option<String>,
    #[serde(default)]
    pub next_uri: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<Column>>,
    #[serde(default)]
    pub data: Option<Vec<Row>>,
    #[serde(default)]
    pub stats: Map<String, Value>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
    #[serde(default)]
    pub error: Option<QueryFailure>,
}

/// Decoded envelope of one successful exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    pub id: String,
    pub stats: Map<String, Value>,
    pub warnings: Vec<Warning>,
    pub info_uri: Option<String>,
    /// Absent once the query is complete.
    pub next_uri: Option<String>,
    pub rows: Vec<Row>,
    pub columns: Option<Vec<Column>>,
}

impl From<StatementResponse> for Status {
    fn from(r: StatementResponse) -> Self {
        Status {
            id: r.id,
            stats: r.stats,
            warnings: r.warnings,
            info_uri: r.info_uri,
            next_uri: r.next_uri,
            rows: r.data.unwrap_or_default(),
            columns: r.columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_envelope() {
        let body = json!({
            "id": "20240115_000001_abcde",
            "infoUri": "http://coord/ui/query.html?20240115_000001_abcde",
            "nextUri": "http://coord/v1/statement/20240115_000001_abcde/1",
            "columns": [{"name": "n", "type": "decimal(4,2)", "typeSignature": {"rawType": "decimal", "arguments": [
                {"kind": "LONG", "value": 4}, {"kind": "LONG", "value": 2}
            ]}}],
            "data": [["12.50"], [null]],
            "stats": {"state": "RUNNING", "processedRows": 2},
            "warnings": [{"warningCode": {"code": 1, "name": "DEPRECATED"}, "message": "old syntax"}]
        });
        let resp: StatementResponse = serde_json::from_value(body).unwrap();
        assert!(resp.error.is_none());
        let status = Status::from(resp);
        assert_eq!(status.rows.len(), 2);
        assert_eq!(status.warnings[0].warning_code.name, "DEPRECATED");
        let cols = status.columns.unwrap();
        assert_eq!(cols[0].data_type().unwrap(), DataType::Decimal { precision: 4, scale: 2 });
        assert_eq!(status.stats["state"], json!("RUNNING"));
    }

    #[test]
    fn minimal_envelope_has_empty_rows() {
        let resp: StatementResponse = serde_json::from_value(json!({"id": "q", "stats": {}})).unwrap();
        let status = Status::from(resp);
        assert!(status.rows.is_empty());
        assert!(status.next_uri.is_none());
        assert!(status.columns.is_none());
    }

    #[test]
    fn column_without_signature_parses_display_type() {
        let col: Column = serde_json::from_value(json!({"name": "m", "type": "map(varchar, array(bigint))"})).unwrap();
        assert_eq!(col.data_type().unwrap().to_string(), "map(varchar, array(bigint))");
    }

    #[test]
    fn error_payload_is_captured() {
        let resp: StatementResponse = serde_json::from_value(json!({
            "id": "q", "stats": {},
            "error": {"message": "line 1:8: Column 'x' cannot be resolved", "errorCode": 47, "errorName": "COLUMN_NOT_FOUND",
                      "errorType": "USER_ERROR", "errorLocation": {"lineNumber": 1, "columnNumber": 8}}
        })).unwrap();
        let failure = resp.error.unwrap();
        assert_eq!(failure.error_type, "USER_ERROR");
        assert_eq!(failure.error_code, 47);
        assert_eq!(failure.error_location.unwrap().column_number, 8);
    }
}
