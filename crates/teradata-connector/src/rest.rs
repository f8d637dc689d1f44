//! Teradata Query Service driver.
//!
//! Each [`Connection`] is a Query Service session: opened with
//! `POST {endpoint}/sessions`, used by `POST {endpoint}/queries` and closed
//! with `DELETE {endpoint}/sessions/{id}`. Catalog metadata comes from the
//! `DBC` dictionary views and is reported with JDBC type codes.

use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch, RecordBatchOptions, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, SchemaRef};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::client::{ColumnRow, Connection, Driver, RowStream, TableRow, TableType};
use crate::config::{ConnectionConfig, DEFAULT_DATABASE_OPTION, UPPER_CASE_IDENTIFIERS_OPTION};
use crate::error::ClientError;
use crate::types::jdbc;

/// Opens Query Service sessions over HTTP.
#[derive(Debug, Clone, Default)]
pub struct QueryServiceDriver {
    http: reqwest::Client,
}

impl QueryServiceDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured HTTP client (proxies, TLS roots, timeouts).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequest<'a> {
    auto_commit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_database: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    format: &'static str,
    include_columns: bool,
    session: i64,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<ResultSet>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSet {
    #[serde(default)]
    result_set: bool,
    #[serde(default)]
    columns: Vec<ResultColumn>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    row_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ResultColumn {
    name: String,
}

#[async_trait]
impl Driver for QueryServiceDriver {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>, ClientError> {
        let upper_case = config
            .dialect_flag(UPPER_CASE_IDENTIFIERS_OPTION, true)
            .map_err(|e| ClientError::Driver(e.to_string()))?;
        let request = SessionRequest {
            auto_commit: true,
            default_database: config.dialect_option(DEFAULT_DATABASE_OPTION),
        };

        let response = self
            .http
            .post(format!("{}/sessions", config.endpoint_url()))
            .basic_auth(config.user(), Some(config.password()))
            .json(&request)
            .send()
            .await?;
        let session: SessionResponse = check_status(response).await?.json().await?;

        debug!(
            "Opened Query Service session {} on {}",
            session.session_id,
            config.endpoint_url()
        );

        Ok(Box::new(RestConnection {
            http: self.http.clone(),
            endpoint_url: config.endpoint_url().to_string(),
            user: config.user().to_string(),
            password: config.password().to_string(),
            session_id: session.session_id,
            upper_case,
        }))
    }
}

/// One open Query Service session.
pub struct RestConnection {
    http: reqwest::Client,
    endpoint_url: String,
    user: String,
    password: String,
    session_id: i64,
    upper_case: bool,
}

impl RestConnection {
    async fn run(&self, sql: &str) -> Result<ResultSet, ClientError> {
        debug!("[session {}] {}", self.session_id, sql);
        let request = QueryRequest {
            query: sql,
            format: "array",
            include_columns: true,
            session: self.session_id,
        };
        let response = self
            .http
            .post(format!("{}/queries", self.endpoint_url))
            .basic_auth(&self.user, Some(&self.password))
            .json(&request)
            .send()
            .await?;
        let response: QueryResponse = check_status(response).await?.json().await?;
        Ok(response.results.into_iter().next().unwrap_or_default())
    }

    /// Run a dictionary query and parse each row with `parse`.
    fn catalog_rows<T: Send + 'static>(
        &self,
        sql: String,
        parse: fn(&[Value]) -> Result<T, ClientError>,
    ) -> RowStream<'_, T> {
        futures::stream::once(async move { self.run(&sql).await })
            .map_ok(move |result| {
                futures::stream::iter(result.data.into_iter().map(move |row| parse(&row)))
            })
            .try_flatten()
            .boxed()
    }
}

#[async_trait]
impl Connection for RestConnection {
    async fn stores_upper_case_identifiers(&mut self) -> Result<bool, ClientError> {
        Ok(self.upper_case)
    }

    fn schemas(&mut self) -> RowStream<'_, String> {
        self.catalog_rows(
            "SELECT DatabaseName FROM DBC.DatabasesV ORDER BY DatabaseName".to_string(),
            parse_schema_row,
        )
    }

    fn tables<'a>(
        &'a mut self,
        schema: Option<&'a str>,
        table: Option<&'a str>,
        types: &'a [TableType],
    ) -> RowStream<'a, TableRow> {
        match tables_query(schema, table, types) {
            Some(sql) => self.catalog_rows(sql, parse_table_row),
            None => futures::stream::empty().boxed(),
        }
    }

    fn columns<'a>(&'a mut self, schema: &'a str, table: &'a str) -> RowStream<'a, ColumnRow> {
        self.catalog_rows(columns_query(schema, table), parse_column_row)
    }

    async fn query(&mut self, sql: &str, schema: SchemaRef) -> Result<Vec<RecordBatch>, ClientError> {
        let result = self.run(sql).await?;
        Ok(vec![result_to_batch(&result, schema)?])
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, ClientError> {
        let result = self.run(sql).await?;
        Ok(result.count.or(result.row_count).unwrap_or(0))
    }

    async fn close(self: Box<Self>) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(format!("{}/sessions/{}", self.endpoint_url, self.session_id))
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await?;
        check_status(response).await?;
        debug!("Closed Query Service session {}", self.session_id);
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await?;
    Err(ClientError::Status { status, message })
}

fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn tables_query(schema: Option<&str>, table: Option<&str>, types: &[TableType]) -> Option<String> {
    let kinds = types
        .iter()
        .flat_map(|t| -> &'static [&'static str] {
            match t {
                TableType::Table => &["T", "O"],
                TableType::View => &["V"],
                TableType::Synonym => &[],
            }
        })
        .map(|kind| sql_literal(kind))
        .collect::<Vec<_>>();
    if kinds.is_empty() {
        return None;
    }

    let mut sql = format!(
        "SELECT DatabaseName, TableName, TableKind FROM DBC.TablesV WHERE TableKind IN ({})",
        kinds.join(", ")
    );
    if let Some(schema) = schema {
        sql.push_str(&format!(" AND DatabaseName = {}", sql_literal(schema)));
    }
    if let Some(table) = table {
        sql.push_str(&format!(" AND TableName = {}", sql_literal(table)));
    }
    sql.push_str(" ORDER BY DatabaseName, TableName");
    Some(sql)
}

fn columns_query(schema: &str, table: &str) -> String {
    format!(
        "SELECT ColumnName, ColumnType, ColumnLength, DecimalTotalDigits, \
         DecimalFractionalDigits, CharType FROM DBC.ColumnsV \
         WHERE DatabaseName = {} AND TableName = {} ORDER BY ColumnId",
        sql_literal(schema),
        sql_literal(table)
    )
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn value_as_i32(value: Option<&Value>) -> Option<i32> {
    match value? {
        Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn required_string(row: &[Value], index: usize, what: &str) -> Result<String, ClientError> {
    row.get(index)
        .and_then(value_as_string)
        .map(|s| s.trim_end().to_string())
        .ok_or_else(|| ClientError::Protocol(format!("missing {} in catalog row", what)))
}

fn parse_schema_row(row: &[Value]) -> Result<String, ClientError> {
    required_string(row, 0, "DatabaseName")
}

fn parse_table_row(row: &[Value]) -> Result<TableRow, ClientError> {
    let schema = required_string(row, 0, "DatabaseName")?;
    let name = required_string(row, 1, "TableName")?;
    let table_type = match required_string(row, 2, "TableKind")?.trim() {
        "V" => TableType::View,
        _ => TableType::Table,
    };
    Ok(TableRow {
        catalog: None,
        schema: Some(schema),
        name,
        table_type,
    })
}

fn parse_column_row(row: &[Value]) -> Result<ColumnRow, ClientError> {
    let name = required_string(row, 0, "ColumnName")?;
    // Views report no column type in DBC.ColumnsV.
    let type_code = row
        .get(1)
        .and_then(value_as_string)
        .map(|code| dbc_type_to_jdbc(code.trim()))
        .unwrap_or(jdbc::OTHER);
    let length = value_as_i32(row.get(2)).unwrap_or(0);
    let total_digits = value_as_i32(row.get(3));
    let fractional_digits = value_as_i32(row.get(4));
    let unicode = value_as_i32(row.get(5)) == Some(2);

    let (column_size, decimal_digits) = match type_code {
        jdbc::DECIMAL | jdbc::NUMERIC => (total_digits.unwrap_or(0), fractional_digits),
        jdbc::CHAR | jdbc::VARCHAR | jdbc::CLOB if unicode => (length / 2, None),
        _ => (length, None),
    };

    Ok(ColumnRow {
        name,
        data_type: type_code,
        column_size,
        decimal_digits,
    })
}

/// Translate a `DBC.ColumnsV.ColumnType` code into a JDBC type code.
fn dbc_type_to_jdbc(code: &str) -> i32 {
    match code {
        "CF" => jdbc::CHAR,
        "CV" => jdbc::VARCHAR,
        "CO" => jdbc::CLOB,
        "I1" => jdbc::TINYINT,
        "I2" => jdbc::SMALLINT,
        "I" => jdbc::INTEGER,
        "I8" => jdbc::BIGINT,
        "F" => jdbc::FLOAT,
        "D" => jdbc::DECIMAL,
        "N" => jdbc::NUMERIC,
        "DA" => jdbc::DATE,
        "AT" => jdbc::TIME,
        "TS" => jdbc::TIMESTAMP,
        "TZ" => jdbc::TIME_WITH_TIMEZONE,
        "SZ" => jdbc::TIMESTAMP_WITH_TIMEZONE,
        "BF" => jdbc::BINARY,
        "BV" => jdbc::VARBINARY,
        "BO" => jdbc::BLOB,
        "A1" | "AN" => jdbc::ARRAY,
        "UT" => jdbc::STRUCT,
        _ => jdbc::OTHER,
    }
}

/// Convert a JSON result set into one batch laid out as `schema`.
///
/// Values are collected as strings per column and cast to the target type.
fn result_to_batch(result: &ResultSet, schema: SchemaRef) -> Result<RecordBatch, ClientError> {
    let num_rows = result.data.len();
    if schema.fields().is_empty() {
        let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
        return Ok(RecordBatch::try_new_with_options(schema, vec![], &options)?);
    }

    if result.result_set && !result.columns.is_empty() && result.columns.len() != schema.fields().len() {
        return Err(ClientError::Protocol(format!(
            "expected {} columns, got {} ({})",
            schema.fields().len(),
            result.columns.len(),
            result
                .columns
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    let arrays = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let strings: ArrayRef = Arc::new(
                result
                    .data
                    .iter()
                    .map(|row| row.get(i).and_then(value_as_string))
                    .collect::<StringArray>(),
            );
            match field.data_type() {
                DataType::Utf8 => Ok(strings),
                target => cast(&strings, target),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RecordBatch::try_new(schema, arrays)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Date32Array, Decimal128Array, Float64Array, Int32Array};
    use crate::types::{map_type, DeclaredSize, EngineType};
    use arrow::datatypes::{Field, Schema};
    use serde_json::json;

    #[test]
    fn test_dbc_type_codes() {
        assert_eq!(dbc_type_to_jdbc("CV"), jdbc::VARCHAR);
        assert_eq!(dbc_type_to_jdbc("I1"), jdbc::TINYINT);
        assert_eq!(dbc_type_to_jdbc("D"), jdbc::DECIMAL);
        assert_eq!(dbc_type_to_jdbc("TS"), jdbc::TIMESTAMP);
        assert_eq!(dbc_type_to_jdbc("PD"), jdbc::OTHER);
        assert_eq!(dbc_type_to_jdbc("JN"), jdbc::OTHER);
    }

    #[test]
    fn test_parse_column_row_halves_unicode_length() {
        let row = parse_column_row(&[
            json!("CUSTOMER_NAME                 "),
            json!("CV"),
            json!(100),
            Value::Null,
            Value::Null,
            json!(2),
        ])
        .unwrap();
        assert_eq!(row.name, "CUSTOMER_NAME");
        assert_eq!(row.data_type, jdbc::VARCHAR);
        assert_eq!(row.column_size, 50);
        assert_eq!(row.decimal_digits, None);
    }

    #[test]
    fn test_parse_column_row_decimal_uses_digits() {
        let row = parse_column_row(&[
            json!("AMOUNT"),
            json!("D "),
            json!(8),
            json!("12"),
            json!(2),
            json!(0),
        ])
        .unwrap();
        assert_eq!(row.data_type, jdbc::DECIMAL);
        assert_eq!(row.column_size, 12);
        assert_eq!(row.decimal_digits, Some(2));
    }

    #[test]
    fn test_parse_column_row_unbounded_number_reads_as_double() {
        let row = parse_column_row(&[
            json!("PRICE"),
            json!("N "),
            json!(18),
            json!(-128),
            json!(-128),
            json!(0),
        ])
        .unwrap();
        let declared = DeclaredSize {
            size: row.column_size,
            decimal_digits: row.decimal_digits,
        };
        let engine_type = map_type(row.data_type, declared).unwrap();
        assert_eq!(engine_type, EngineType::Double);

        let result: ResultSet = serde_json::from_value(json!({
            "resultSet": true,
            "columns": [{"name": "PRICE"}],
            "data": [["12.75"], ["0.001"]]
        }))
        .unwrap();
        let schema = Arc::new(Schema::new(vec![Field::new(
            "price",
            engine_type.arrow_type(),
            true,
        )]));
        let batch = result_to_batch(&result, schema).unwrap();
        let prices = batch.column(0).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(prices.value(0), 12.75);
        assert_eq!(prices.value(1), 0.001);
    }

    #[test]
    fn test_parse_column_row_view_column_without_type() {
        let row = parse_column_row(&[json!("X"), Value::Null, Value::Null]).unwrap();
        assert_eq!(row.data_type, jdbc::OTHER);
        assert!(parse_column_row(&[Value::Null]).is_err());
    }

    #[test]
    fn test_parse_table_row_kinds() {
        let view = parse_table_row(&[json!("SALES"), json!("ORDERS_V"), json!("V")]).unwrap();
        assert_eq!(view.table_type, TableType::View);
        assert_eq!(view.schema.as_deref(), Some("SALES"));

        let table = parse_table_row(&[json!("SALES"), json!("ORDERS"), json!("O")]).unwrap();
        assert_eq!(table.table_type, TableType::Table);
        assert_eq!(table.catalog, None);
    }

    #[test]
    fn test_tables_query_filters_and_escapes() {
        let sql = tables_query(
            Some("SALES"),
            Some("O'BRIEN"),
            &[TableType::View, TableType::Table, TableType::Synonym],
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT DatabaseName, TableName, TableKind FROM DBC.TablesV \
             WHERE TableKind IN ('V', 'T', 'O') AND DatabaseName = 'SALES' \
             AND TableName = 'O''BRIEN' ORDER BY DatabaseName, TableName"
        );

        assert!(tables_query(None, None, &[TableType::Synonym]).is_none());
    }

    #[test]
    fn test_result_to_batch_casts_columns() {
        let result: ResultSet = serde_json::from_value(json!({
            "resultSet": true,
            "columns": [{"name": "ID", "type": "INTEGER"}, {"name": "AMOUNT", "type": "DECIMAL"},
                        {"name": "ORDERED", "type": "DATE"}, {"name": "NOTE", "type": "VARCHAR"}],
            "data": [[1, "12.50", "2024-01-15", "first"], [2, null, "2024-02-01", null]],
            "rowCount": 2
        }))
        .unwrap();
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, true),
            Field::new("amount", DataType::Decimal128(10, 2), true),
            Field::new("ordered", DataType::Date32, true),
            Field::new("note", DataType::Utf8, true),
        ]));

        let batch = result_to_batch(&result, schema).unwrap();
        assert_eq!(batch.num_rows(), 2);

        let ids = batch.column(0).as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!((ids.value(0), ids.value(1)), (1, 2));
        let amounts = batch.column(1).as_any().downcast_ref::<Decimal128Array>().unwrap();
        assert_eq!(amounts.value(0), 1250);
        assert!(amounts.is_null(1));
        let dates = batch.column(2).as_any().downcast_ref::<Date32Array>().unwrap();
        assert!(!dates.is_null(1));
        assert!(batch.column(3).is_null(1));
    }

    #[test]
    fn test_result_to_batch_rejects_width_mismatch() {
        let result: ResultSet = serde_json::from_value(json!({
            "resultSet": true,
            "columns": [{"name": "A"}, {"name": "B"}],
            "data": [[1, 2]]
        }))
        .unwrap();
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int32, true)]));
        assert!(matches!(
            result_to_batch(&result, schema),
            Err(ClientError::Protocol(_))
        ));
    }

    #[test]
    fn test_result_to_batch_without_columns_keeps_row_count() {
        let result: ResultSet = serde_json::from_value(json!({
            "resultSet": true,
            "columns": [{"name": "NULL"}],
            "data": [[null], [null], [null]]
        }))
        .unwrap();
        let batch = result_to_batch(&result, Arc::new(Schema::empty())).unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 0);
    }

    #[test]
    fn test_query_response_parsing() {
        let response: QueryResponse = serde_json::from_str(
            r#"{"queryDuration": 12, "results": [{"resultSet": false, "count": 4}]}"#,
        )
        .unwrap();
        let first = response.results.into_iter().next().unwrap();
        assert!(!first.result_set);
        assert_eq!(first.count, Some(4));

        let session: SessionResponse =
            serde_json::from_str(r#"{"sessionId": 1042, "system": "prod"}"#).unwrap();
        assert_eq!(session.session_id, 1042);
    }

    #[test]
    fn test_session_request_omits_missing_database() {
        let body = serde_json::to_value(SessionRequest {
            auto_commit: true,
            default_database: None,
        })
        .unwrap();
        assert_eq!(body, json!({"autoCommit": true}));
    }
}
