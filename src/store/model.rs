//! Declarative descriptors for the store's schema and table.
//!
//! Descriptors are validated when they are built, never at the network
//! boundary, and are immutable afterwards. Their `Serialize` impls produce
//! the exact JSON bodies the controller expects on `POST /schemas` and
//! `POST /tables`.
//!
//! # Example
//!
//! ```rust
//! use sales_pipeline::store::model::{MetricType, SchemaDescriptor, DimensionType, TimeDataType};
//!
//! let schema = SchemaDescriptor::builder("sales")
//!     .dimension("id_venda", DimensionType::String)
//!     .metric("valor_total", MetricType::Double)
//!     .date_time("timestamp", TimeDataType::Long, "1:MILLISECONDS:EPOCH", "1:MILLISECONDS")
//!     .build()
//!     .unwrap();
//! assert_eq!(schema.name(), "sales");
//! ```

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::ser::Serializer;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::config::{KafkaSettings, OffsetReset, StoreSettings};

/// Decoder the store uses to read JSON records from Kafka.
pub const KAFKA_JSON_DECODER: &str =
    "org.apache.pinot.plugin.stream.kafka.KafkaJSONMessageDecoder";

/// Consumer factory the store uses to read from Kafka 2.x brokers.
pub const KAFKA_CONSUMER_FACTORY: &str =
    "org.apache.pinot.plugin.stream.kafka20.KafkaConsumerFactory";

/// Errors raised while constructing descriptors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModelError {
    /// Names must be non-empty.
    #[error("descriptor name cannot be empty")]
    EmptyName,

    /// Field names must be unique across all field groups.
    #[error("duplicate field name: {0}")]
    DuplicateField(String),

    /// A schema needs at least one time field for a realtime table.
    #[error("schema {0} declares no date-time field")]
    NoTimeField(String),

    /// Schema and table must share the dataset identifier.
    #[error("table name {table} does not match schema name {schema}")]
    NameMismatch {
        /// Schema name.
        schema: String,
        /// Table name.
        table: String,
    },

    /// The time column must be one of the schema's date-time fields.
    #[error("time column {0} is not a date-time field of the schema")]
    UnknownTimeColumn(String),

    /// Replication must be at least one.
    #[error("replication factor must be at least 1")]
    InvalidReplication,
}

/// Primitive types allowed for dimension fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DimensionType {
    /// UTF-8 string.
    String,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Long,
    /// Boolean.
    Boolean,
}

/// Numeric types allowed for metric fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricType {
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
}

/// Storage types allowed for date-time fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeDataType {
    /// Epoch-based numeric value.
    Long,
    /// Formatted string.
    String,
}

/// A dimension column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionField {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "dataType")]
    pub data_type: DimensionType,
}

/// A metric column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricField {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "dataType")]
    pub data_type: MetricType,
}

/// A date-time column with its encoding and granularity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateTimeField {
    /// Column name.
    pub name: String,
    /// Storage type.
    #[serde(rename = "dataType")]
    pub data_type: TimeDataType,
    /// Encoding, e.g. `1:MILLISECONDS:EPOCH`.
    pub format: String,
    /// Granularity, e.g. `1:MILLISECONDS`.
    pub granularity: String,
}

impl DateTimeField {
    /// Time unit named in the encoding (`MILLISECONDS` in `1:MILLISECONDS:EPOCH`).
    pub fn time_unit(&self) -> &str {
        self.format.split(':').nth(1).unwrap_or("MILLISECONDS")
    }
}

/// Field layout of one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaDescriptor {
    #[serde(rename = "schemaName")]
    name: String,
    #[serde(rename = "dimensionFieldSpecs")]
    dimensions: Vec<DimensionField>,
    #[serde(rename = "metricFieldSpecs")]
    metrics: Vec<MetricField>,
    #[serde(rename = "dateTimeFieldSpecs")]
    date_times: Vec<DateTimeField>,
}

impl SchemaDescriptor {
    /// Starts building a schema named `name`.
    pub fn builder(name: &str) -> SchemaBuilder {
        SchemaBuilder {
            name: name.to_string(),
            dimensions: Vec::new(),
            metrics: Vec::new(),
            date_times: Vec::new(),
        }
    }

    /// Dataset identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dimension columns in declaration order.
    pub fn dimensions(&self) -> &[DimensionField] {
        &self.dimensions
    }

    /// Metric columns in declaration order.
    pub fn metrics(&self) -> &[MetricField] {
        &self.metrics
    }

    /// Date-time columns in declaration order.
    pub fn date_times(&self) -> &[DateTimeField] {
        &self.date_times
    }

    /// Looks up a date-time column by name.
    pub fn date_time(&self, name: &str) -> Option<&DateTimeField> {
        self.date_times.iter().find(|field| field.name == name)
    }
}

/// Builder for [`SchemaDescriptor`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    dimensions: Vec<DimensionField>,
    metrics: Vec<MetricField>,
    date_times: Vec<DateTimeField>,
}

impl SchemaBuilder {
    /// Appends a dimension column.
    pub fn dimension(mut self, name: &str, data_type: DimensionType) -> Self {
        self.dimensions.push(DimensionField {
            name: name.to_string(),
            data_type,
        });
        self
    }

    /// Appends a metric column.
    pub fn metric(mut self, name: &str, data_type: MetricType) -> Self {
        self.metrics.push(MetricField {
            name: name.to_string(),
            data_type,
        });
        self
    }

    /// Appends a date-time column.
    pub fn date_time(
        mut self,
        name: &str,
        data_type: TimeDataType,
        format: &str,
        granularity: &str,
    ) -> Self {
        self.date_times.push(DateTimeField {
            name: name.to_string(),
            data_type,
            format: format.to_string(),
            granularity: granularity.to_string(),
        });
        self
    }

    /// Validates and freezes the schema.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] for an empty name, duplicate field names or a
    /// schema without date-time fields.
    pub fn build(self) -> Result<SchemaDescriptor, ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::EmptyName);
        }
        if self.date_times.is_empty() {
            return Err(ModelError::NoTimeField(self.name));
        }

        let mut seen = HashSet::new();
        let names = self
            .dimensions
            .iter()
            .map(|f| &f.name)
            .chain(self.metrics.iter().map(|f| &f.name))
            .chain(self.date_times.iter().map(|f| &f.name));
        for name in names {
            if !seen.insert(name.as_str()) {
                return Err(ModelError::DuplicateField(name.clone()));
            }
        }

        Ok(SchemaDescriptor {
            name: self.name,
            dimensions: self.dimensions,
            metrics: self.metrics,
            date_times: self.date_times,
        })
    }
}

/// Physical table flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Streaming ingestion table.
    Realtime,
}

impl TableKind {
    /// Returns the store's name for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Realtime => "REALTIME",
        }
    }
}

/// Streaming ingestion settings the store uses to pull from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSource {
    /// Topic to ingest.
    pub topic: String,
    /// Broker list as reachable from the store.
    pub broker_list: String,
    /// Decoder class.
    pub decoder_class: String,
    /// Consumer factory class.
    pub consumer_factory_class: String,
    /// Segment flush threshold by age.
    pub flush_threshold_time: Duration,
    /// Segment flush threshold by row count.
    pub flush_threshold_rows: u64,
    /// Where the store starts reading a fresh topic.
    pub offset_reset: OffsetReset,
}

impl StreamSource {
    /// Kafka JSON source with the default flush thresholds (1 h, 500 000 rows).
    pub fn kafka_json(topic: &str, broker_list: &str, offset_reset: OffsetReset) -> Self {
        Self {
            topic: topic.to_string(),
            broker_list: broker_list.to_string(),
            decoder_class: KAFKA_JSON_DECODER.to_string(),
            consumer_factory_class: KAFKA_CONSUMER_FACTORY.to_string(),
            flush_threshold_time: Duration::from_secs(3600),
            flush_threshold_rows: 500_000,
            offset_reset,
        }
    }

    fn stream_configs(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("streamType", "kafka".to_string()),
            ("stream.kafka.consumer.type", "lowlevel".to_string()),
            ("stream.kafka.topic.name", self.topic.clone()),
            ("stream.kafka.decoder.class.name", self.decoder_class.clone()),
            (
                "stream.kafka.consumer.factory.class.name",
                self.consumer_factory_class.clone(),
            ),
            ("stream.kafka.broker.list", self.broker_list.clone()),
            (
                "realtime.segment.flush.threshold.time",
                self.flush_threshold_time.as_millis().to_string(),
            ),
            (
                "realtime.segment.flush.threshold.size",
                self.flush_threshold_rows.to_string(),
            ),
            (
                "stream.kafka.consumer.prop.auto.offset.reset",
                self.offset_reset.as_store_policy().to_string(),
            ),
        ])
    }
}

/// Physical storage and ingestion configuration of one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    name: String,
    kind: TableKind,
    time_column: String,
    time_unit: String,
    replication: u32,
    stream: StreamSource,
}

impl TableDescriptor {
    /// Builds a realtime table for `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownTimeColumn`] when `time_column` is not a
    /// date-time field of the schema, and [`ModelError::InvalidReplication`]
    /// for a zero replication factor.
    pub fn realtime(
        schema: &SchemaDescriptor,
        time_column: &str,
        replication: u32,
        stream: StreamSource,
    ) -> Result<Self, ModelError> {
        Self::new(schema.name(), schema, time_column, replication, stream)
    }

    /// Builds a realtime table named `name` for `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NameMismatch`] when `name` differs from the
    /// schema name, plus the errors of [`TableDescriptor::realtime`].
    pub fn new(
        name: &str,
        schema: &SchemaDescriptor,
        time_column: &str,
        replication: u32,
        stream: StreamSource,
    ) -> Result<Self, ModelError> {
        if name != schema.name() {
            return Err(ModelError::NameMismatch {
                schema: schema.name().to_string(),
                table: name.to_string(),
            });
        }
        let time_field = schema
            .date_time(time_column)
            .ok_or_else(|| ModelError::UnknownTimeColumn(time_column.to_string()))?;
        if replication == 0 {
            return Err(ModelError::InvalidReplication);
        }

        Ok(Self {
            name: name.to_string(),
            kind: TableKind::Realtime,
            time_column: time_column.to_string(),
            time_unit: time_field.time_unit().to_string(),
            replication,
            stream,
        })
    }

    /// Logical table name (equal to the schema name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name under which the store lists the materialized table.
    pub fn physical_name(&self) -> String {
        format!("{}_{}", self.name, self.kind.as_str())
    }

    /// Table kind.
    pub fn kind(&self) -> TableKind {
        self.kind
    }

    /// Time column.
    pub fn time_column(&self) -> &str {
        &self.time_column
    }

    /// Replication factor.
    pub fn replication(&self) -> u32 {
        self.replication
    }

    /// Stream source configuration.
    pub fn stream(&self) -> &StreamSource {
        &self.stream
    }
}

impl Serialize for TableDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        json!({
            "tableName": self.name,
            "tableType": self.kind.as_str(),
            "segmentsConfig": {
                "timeColumnName": self.time_column,
                "timeType": self.time_unit,
                "replication": self.replication.to_string(),
                "schemaName": self.name,
            },
            "tenants": {},
            "tableIndexConfig": {
                "loadMode": "MMAP",
                "streamConfigs": self.stream.stream_configs(),
            },
            "metadata": {
                "customConfigs": {}
            }
        })
        .serialize(serializer)
    }
}

/// Builds the schema for the sales dataset named `name`.
///
/// # Errors
///
/// Returns [`ModelError::EmptyName`] for an empty name.
pub fn sales_schema(name: &str) -> Result<SchemaDescriptor, ModelError> {
    let mut builder = SchemaDescriptor::builder(name);
    for dimension in [
        "id_venda",
        "id_cliente",
        "nome_cliente",
        "email_cliente",
        "produto",
        "categoria",
        "forma_pagamento",
        "loja",
        "cidade",
        "estado",
    ] {
        builder = builder.dimension(dimension, DimensionType::String);
    }

    builder
        .metric("preco", MetricType::Double)
        .metric("quantidade", MetricType::Int)
        .metric("valor_total", MetricType::Double)
        .date_time(
            "timestamp",
            TimeDataType::Long,
            "1:MILLISECONDS:EPOCH",
            "1:MILLISECONDS",
        )
        .date_time(
            "data_hora",
            TimeDataType::String,
            "1:DAYS:SIMPLE_DATE_FORMAT:yyyy-MM-dd'T'HH:mm:ss",
            "1:DAYS",
        )
        .build()
}

/// Builds the schema and realtime table for the sales dataset from the
/// resolved configuration.
///
/// # Errors
///
/// Propagates descriptor validation failures.
pub fn sales_dataset(
    store: &StoreSettings,
    kafka: &KafkaSettings,
) -> Result<(SchemaDescriptor, TableDescriptor), ModelError> {
    let schema = sales_schema(&store.table)?;
    let stream = StreamSource::kafka_json(
        &kafka.topic,
        &store.stream_brokers,
        kafka.auto_offset_reset,
    );
    let table = TableDescriptor::realtime(&schema, "timestamp", 1, stream)?;
    Ok((schema, table))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> StreamSource {
        StreamSource::kafka_json("sales-realtime", "kafka:9092", OffsetReset::Earliest)
    }

    #[test]
    fn test_sales_schema_serialization() {
        let schema = sales_schema("sales").unwrap();
        let value = serde_json::to_value(&schema).unwrap();

        assert_eq!(value["schemaName"], "sales");
        assert_eq!(value["dimensionFieldSpecs"].as_array().unwrap().len(), 10);
        assert_eq!(value["dimensionFieldSpecs"][0]["name"], "id_venda");
        assert_eq!(value["dimensionFieldSpecs"][0]["dataType"], "STRING");
        assert_eq!(value["metricFieldSpecs"][1]["dataType"], "INT");
        assert_eq!(value["metricFieldSpecs"][2]["name"], "valor_total");
        assert_eq!(value["dateTimeFieldSpecs"][0]["format"], "1:MILLISECONDS:EPOCH");
        assert_eq!(value["dateTimeFieldSpecs"][1]["granularity"], "1:DAYS");
    }

    #[test]
    fn test_table_serialization() {
        let schema = sales_schema("sales").unwrap();
        let table = TableDescriptor::realtime(&schema, "timestamp", 1, stream()).unwrap();
        let value = serde_json::to_value(&table).unwrap();

        assert_eq!(value["tableName"], "sales");
        assert_eq!(value["tableType"], "REALTIME");
        assert_eq!(value["segmentsConfig"]["timeColumnName"], "timestamp");
        assert_eq!(value["segmentsConfig"]["timeType"], "MILLISECONDS");
        assert_eq!(value["segmentsConfig"]["replication"], "1");
        assert_eq!(value["segmentsConfig"]["schemaName"], "sales");

        let configs = &value["tableIndexConfig"]["streamConfigs"];
        assert_eq!(configs["stream.kafka.topic.name"], "sales-realtime");
        assert_eq!(configs["stream.kafka.broker.list"], "kafka:9092");
        assert_eq!(configs["realtime.segment.flush.threshold.time"], "3600000");
        assert_eq!(configs["realtime.segment.flush.threshold.size"], "500000");
        assert_eq!(
            configs["stream.kafka.consumer.prop.auto.offset.reset"],
            "smallest"
        );
        assert_eq!(configs["stream.kafka.decoder.class.name"], KAFKA_JSON_DECODER);
    }

    #[test]
    fn test_physical_name() {
        let schema = sales_schema("sales").unwrap();
        let table = TableDescriptor::realtime(&schema, "timestamp", 1, stream()).unwrap();
        assert_eq!(table.physical_name(), "sales_REALTIME");
    }

    #[test]
    fn test_table_name_must_match_schema() {
        let schema = sales_schema("sales").unwrap();
        let result = TableDescriptor::new("orders", &schema, "timestamp", 1, stream());
        assert_eq!(
            result,
            Err(ModelError::NameMismatch {
                schema: "sales".to_string(),
                table: "orders".to_string(),
            })
        );
    }

    #[test]
    fn test_time_column_must_exist() {
        let schema = sales_schema("sales").unwrap();
        let result = TableDescriptor::realtime(&schema, "valor_total", 1, stream());
        assert_eq!(
            result,
            Err(ModelError::UnknownTimeColumn("valor_total".to_string()))
        );
    }

    #[test]
    fn test_zero_replication_rejected() {
        let schema = sales_schema("sales").unwrap();
        let result = TableDescriptor::realtime(&schema, "timestamp", 0, stream());
        assert_eq!(result, Err(ModelError::InvalidReplication));
    }

    #[test]
    fn test_duplicate_fields_rejected() {
        let result = SchemaDescriptor::builder("sales")
            .dimension("loja", DimensionType::String)
            .metric("loja", MetricType::Int)
            .date_time("ts", TimeDataType::Long, "1:MILLISECONDS:EPOCH", "1:MILLISECONDS")
            .build();
        assert_eq!(result, Err(ModelError::DuplicateField("loja".to_string())));
    }

    #[test]
    fn test_schema_requires_time_field_and_name() {
        let no_time = SchemaDescriptor::builder("sales")
            .dimension("loja", DimensionType::String)
            .build();
        assert_eq!(no_time, Err(ModelError::NoTimeField("sales".to_string())));

        assert_eq!(sales_schema(" "), Err(ModelError::EmptyName));
    }
}
