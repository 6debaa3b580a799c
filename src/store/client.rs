//! HTTP client for the analytical store.
//!
//! Control-plane calls (liveness, schemas, tables) go to the controller;
//! SQL queries go to the broker. Every method is one network call with one
//! typed outcome. Nothing here retries or keeps state between calls.

use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::StoreSettings;
use crate::store::model::{SchemaDescriptor, TableDescriptor};

/// Control-plane endpoints tried in order by [`StoreClient::check_liveness`].
pub const LIVENESS_PATHS: [&str; 4] = ["/health", "/", "/tables", "/schemas"];

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// HTTP request failed or the response body could not be decoded.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// The resource being created already exists.
    #[error("Resource already exists: {0}")]
    Conflict(String),

    /// No liveness endpoint answered with a success status.
    #[error("No liveness endpoint of {url} answered: {reason}")]
    Unreachable {
        /// Controller base URL.
        url: String,
        /// Outcome of the last endpoint tried.
        reason: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct TableListResponse {
    #[serde(default)]
    tables: Vec<String>,
}

/// Response of `POST /query/sql`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    /// Result rows, absent when the query failed.
    #[serde(rename = "resultTable", default)]
    pub result_table: Option<ResultTable>,
    /// Exceptions reported by the broker. `null` reads as none.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub exceptions: Vec<JsonValue>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<JsonValue>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Tabular query result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultTable {
    /// Column metadata.
    #[serde(rename = "dataSchema", default)]
    pub data_schema: Option<DataSchema>,
    /// Row values.
    #[serde(default)]
    pub rows: Vec<Vec<JsonValue>>,
}

/// Column metadata of a [`ResultTable`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataSchema {
    /// Column names in row order.
    #[serde(rename = "columnNames", default)]
    pub column_names: Vec<String>,
}

/// Classified outcome of a `COUNT(*)` query.
#[derive(Debug, Clone, PartialEq)]
pub enum CountOutcome {
    /// The query succeeded and returned this count.
    Rows(i64),
    /// The broker reported exceptions.
    Exceptions(Vec<JsonValue>),
    /// The response carried no well-formed first row.
    Malformed,
}

impl CountOutcome {
    /// Classifies a query response.
    ///
    /// Non-empty exceptions win over any rows that may also be present.
    pub fn from_response(response: &QueryResponse) -> Self {
        if !response.exceptions.is_empty() {
            return Self::Exceptions(response.exceptions.clone());
        }

        let first = response
            .result_table
            .as_ref()
            .and_then(|table| table.rows.first())
            .and_then(|row| row.first());

        match first {
            Some(value) => match value.as_i64().or_else(|| value.as_f64().map(|f| f as i64)) {
                Some(count) => Self::Rows(count),
                None => Self::Malformed,
            },
            None => Self::Malformed,
        }
    }

    /// Returns true for a successful count.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Rows(_))
    }
}

/// HTTP client for the store's controller and broker.
#[derive(Debug, Clone)]
pub struct StoreClient {
    client: Client,
    controller_url: String,
    broker_url: String,
}

impl StoreClient {
    /// Creates a client from resolved store settings.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Http` if the HTTP client cannot be created.
    pub fn new(settings: &StoreSettings) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(settings.request_timeout).build()?;

        Ok(Self {
            client,
            controller_url: settings.controller_url.as_str().trim_end_matches('/').to_string(),
            broker_url: settings.broker_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Controller base URL without trailing slash.
    pub fn controller_url(&self) -> &str {
        &self.controller_url
    }

    fn controller(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.controller_url, path);
        self.client
            .request(method, &url)
            .header("Content-Type", "application/json")
    }

    async fn api_error(response: reqwest::Response) -> StoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        StoreError::Api {
            status: status.as_u16(),
            message: body,
        }
    }

    /// Probes the controller's liveness endpoints in order.
    ///
    /// # Returns
    ///
    /// The first path that answered with a 2xx status.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unreachable` if no endpoint succeeded.
    pub async fn check_liveness(&self) -> Result<&'static str, StoreError> {
        let mut reason = String::from("no endpoint tried");

        for path in LIVENESS_PATHS {
            match self.controller(Method::GET, path).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(url = %self.controller_url, endpoint = path, "Store is reachable");
                    return Ok(path);
                }
                Ok(response) => {
                    debug!(endpoint = path, status = response.status().as_u16(), "Liveness endpoint rejected");
                    reason = format!("{} answered {}", path, response.status());
                }
                Err(e) => {
                    debug!(endpoint = path, error = %e, "Liveness endpoint failed");
                    reason = format!("{}: {}", path, e);
                }
            }
        }

        Err(StoreError::Unreachable {
            url: self.controller_url.clone(),
            reason,
        })
    }

    /// Lists schema names.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Api` on a non-success status.
    pub async fn list_schemas(&self) -> Result<Vec<String>, StoreError> {
        let response = self.controller(Method::GET, "/schemas").send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    /// Creates a schema.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` when the store reports the schema
    /// already exists and `StoreError::Api` for any other failure.
    pub async fn create_schema(&self, schema: &SchemaDescriptor) -> Result<(), StoreError> {
        let response = self
            .controller(Method::POST, "/schemas")
            .json(schema)
            .send()
            .await?;

        self.creation_outcome(response, schema.name(), "schema").await
    }

    /// Lists table names.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Api` on a non-success status.
    pub async fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let response = self.controller(Method::GET, "/tables").send().await?;

        if response.status().is_success() {
            let result: TableListResponse = response.json().await?;
            Ok(result.tables)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    /// Creates a table.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` when the store reports the table
    /// already exists and `StoreError::Api` for any other failure.
    pub async fn create_table(&self, table: &TableDescriptor) -> Result<(), StoreError> {
        let response = self
            .controller(Method::POST, "/tables")
            .json(table)
            .send()
            .await?;

        self.creation_outcome(response, table.name(), "table").await
    }

    async fn creation_outcome(
        &self,
        response: reqwest::Response,
        name: &str,
        kind: &str,
    ) -> Result<(), StoreError> {
        let status = response.status();
        if status.is_success() {
            info!(name = %name, kind, "Created store resource");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT || body.to_lowercase().contains("already exists") {
            return Err(StoreError::Conflict(name.to_string()));
        }

        error!(name = %name, kind, status = status.as_u16(), body = %body, "Store rejected creation");
        Err(StoreError::Api {
            status: status.as_u16(),
            message: body,
        })
    }

    /// Deletes a table. A table that does not exist counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Api` on any other non-success status.
    pub async fn delete_table(&self, name: &str) -> Result<(), StoreError> {
        let response = self
            .controller(Method::DELETE, &format!("/tables/{}", name))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                info!(table = %name, "Deleted table");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                warn!(table = %name, "Table to delete was not found");
                Ok(())
            }
            _ => Err(Self::api_error(response).await),
        }
    }

    /// Runs a SQL query on the broker.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Api` on a non-success status and
    /// `StoreError::Http` when the body is not a query response.
    pub async fn query_sql(&self, sql: &str) -> Result<QueryResponse, StoreError> {
        let url = format!("{}/query/sql", self.broker_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "sql": sql }))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    /// Runs `SELECT COUNT(*)` against `table` and classifies the result.
    ///
    /// # Errors
    ///
    /// Propagates transport failures and non-success statuses from
    /// [`StoreClient::query_sql`].
    pub async fn count_rows(&self, table: &str) -> Result<CountOutcome, StoreError> {
        let response = self
            .query_sql(&format!("SELECT COUNT(*) FROM {}", table))
            .await?;
        Ok(CountOutcome::from_response(&response))
    }

    /// Fetches one row of `table` as a column-name to value map.
    ///
    /// Returns `None` when the result has no rows or reported exceptions.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`StoreClient::query_sql`].
    pub async fn sample_row(&self, table: &str) -> Result<Option<JsonValue>, StoreError> {
        let response = self
            .query_sql(&format!("SELECT * FROM {} LIMIT 1", table))
            .await?;
        Ok(sample_from_response(&response))
    }
}

fn sample_from_response(response: &QueryResponse) -> Option<JsonValue> {
    if !response.exceptions.is_empty() {
        return None;
    }
    let table = response.result_table.as_ref()?;
    let row = table.rows.first()?;

    let columns = table
        .data_schema
        .as_ref()
        .map(|schema| schema.column_names.clone())
        .unwrap_or_default();

    let mut object = Map::new();
    for (index, value) in row.iter().enumerate() {
        let name = columns
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("col{}", index));
        object.insert(name, value.clone());
    }
    Some(JsonValue::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: JsonValue) -> QueryResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_count_outcome_rows() {
        let response = parse(json!({"resultTable": {"rows": [[0]]}, "exceptions": []}));
        assert_eq!(CountOutcome::from_response(&response), CountOutcome::Rows(0));

        let response = parse(json!({"resultTable": {"rows": [[42]]}}));
        assert_eq!(CountOutcome::from_response(&response), CountOutcome::Rows(42));
    }

    #[test]
    fn test_count_outcome_null_exceptions_are_none() {
        let response = parse(json!({"resultTable": {"rows": [[5]]}, "exceptions": null}));
        assert!(response.exceptions.is_empty());
        assert_eq!(CountOutcome::from_response(&response), CountOutcome::Rows(5));
    }

    #[test]
    fn test_count_outcome_exceptions_win() {
        let response = parse(json!({
            "resultTable": {"rows": [[3]]},
            "exceptions": [{"errorCode": 190, "message": "TableDoesNotExistError"}]
        }));
        assert!(matches!(
            CountOutcome::from_response(&response),
            CountOutcome::Exceptions(ref e) if e.len() == 1
        ));
    }

    #[test]
    fn test_count_outcome_malformed() {
        assert_eq!(
            CountOutcome::from_response(&parse(json!({}))),
            CountOutcome::Malformed
        );
        assert_eq!(
            CountOutcome::from_response(&parse(json!({"resultTable": {"rows": []}}))),
            CountOutcome::Malformed
        );
        assert_eq!(
            CountOutcome::from_response(&parse(json!({"resultTable": {"rows": [["many"]]}}))),
            CountOutcome::Malformed
        );
        assert!(!CountOutcome::Malformed.is_healthy());
    }

    #[test]
    fn test_sample_from_response_maps_columns() {
        let response = parse(json!({
            "resultTable": {
                "dataSchema": {"columnNames": ["id_venda", "valor_total"]},
                "rows": [["v1", 150.0]]
            },
            "exceptions": []
        }));

        let row = sample_from_response(&response).unwrap();
        assert_eq!(row["id_venda"], "v1");
        assert_eq!(row["valor_total"], 150.0);
    }

    #[test]
    fn test_sample_from_response_empty() {
        let response = parse(json!({"resultTable": {"rows": []}, "exceptions": []}));
        assert!(sample_from_response(&response).is_none());
    }
}
