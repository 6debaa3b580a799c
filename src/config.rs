//! Configuration resolution for the sales pipeline
//!
//! Configuration is entirely environment driven. A single resolution step
//! detects whether the process runs inside a container, picks the matching
//! address preset, applies every environment override on top and produces one
//! immutable [`Config`] that is injected into the components.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

/// Path inspected for container cgroup markers
pub const CGROUP_PATH: &str = "/proc/1/cgroup";

/// Marker file created by the Docker runtime at the container root
pub const DOCKERENV_PATH: &str = "/.dockerenv";

/// Errors that can occur while resolving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A variable was present but its value could not be used.
    #[error("Invalid value for {key}: {value}")]
    InvalidValue {
        /// Environment variable name.
        key: String,
        /// Offending value.
        value: String,
    },

    /// A URL variable could not be parsed.
    #[error("Invalid URL for {key}: {source}")]
    InvalidUrl {
        /// Environment variable name.
        key: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },

    /// The resolved configuration is inconsistent.
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Where the process is running, which decides the address preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnvironment {
    /// Inside a container on the compose network.
    Container,
    /// Directly on the host, talking to port-mapped services.
    Host,
}

impl RuntimeEnvironment {
    /// Detects the runtime environment from the standard marker locations.
    pub fn detect() -> Self {
        Self::detect_from(Path::new(CGROUP_PATH), Path::new(DOCKERENV_PATH))
    }

    /// Detects the runtime environment from explicit marker locations.
    ///
    /// The process is considered containerized when the cgroup file mentions
    /// `docker` or the marker file exists. Unreadable files count as absent.
    ///
    /// # Examples
    ///
    /// ```
    /// use sales_pipeline::config::RuntimeEnvironment;
    /// use std::path::Path;
    ///
    /// let env = RuntimeEnvironment::detect_from(
    ///     Path::new("/nonexistent/cgroup"),
    ///     Path::new("/nonexistent/.dockerenv"),
    /// );
    /// assert_eq!(env, RuntimeEnvironment::Host);
    /// ```
    pub fn detect_from(cgroup_path: &Path, marker_path: &Path) -> Self {
        let in_cgroup = std::fs::read_to_string(cgroup_path)
            .map(|contents| contents.contains("docker"))
            .unwrap_or(false);

        if in_cgroup || marker_path.exists() {
            Self::Container
        } else {
            Self::Host
        }
    }

    /// Returns the default addresses for this environment.
    pub fn preset(&self) -> AddressPreset {
        match self {
            Self::Container => AddressPreset {
                kafka_bootstrap: "kafka:9092".to_string(),
                kafka_for_store: "kafka:9092".to_string(),
                controller_url: "http://pinot-controller:9000".to_string(),
                broker_url: "http://pinot-broker:8099".to_string(),
            },
            Self::Host => AddressPreset {
                kafka_bootstrap: "localhost:29092".to_string(),
                // The store itself always runs on the compose network.
                kafka_for_store: "kafka:9092".to_string(),
                controller_url: "http://localhost:9000".to_string(),
                broker_url: "http://localhost:8099".to_string(),
            },
        }
    }

    /// Returns a human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Host => "host",
        }
    }
}

/// Default addresses selected by [`RuntimeEnvironment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPreset {
    /// Broker list used by this process.
    pub kafka_bootstrap: String,
    /// Broker list the store uses to reach the broker.
    pub kafka_for_store: String,
    /// Store controller (control plane) base URL.
    pub controller_url: String,
    /// Store broker (query plane) base URL.
    pub broker_url: String,
}

/// Which binary is resolving configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    /// Provisioning consumer feeding the analytical store.
    Ingest,
    /// Plain logging consumer.
    Logger,
    /// Synthetic sales generator.
    Generator,
}

impl ServiceRole {
    /// Default consumer group for this role.
    pub fn default_group_id(&self) -> &'static str {
        match self {
            Self::Ingest => "sales-pinot-consumer",
            Self::Logger => "sales-logger",
            Self::Generator => "sales-generator",
        }
    }

    /// Kafka client identifier for this role.
    pub fn client_id(&self) -> &'static str {
        match self {
            Self::Ingest => "sales-consumer",
            Self::Logger => "sales-logger",
            Self::Generator => "sales-generator",
        }
    }
}

/// Where a new consumer group starts reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OffsetReset {
    /// Start from the beginning of each partition.
    #[default]
    Earliest,
    /// Start from the end of each partition.
    Latest,
}

impl OffsetReset {
    /// Returns the Kafka configuration string for this policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earliest => "earliest",
            Self::Latest => "latest",
        }
    }

    /// Returns the equivalent policy name understood by the store's
    /// stream consumer.
    pub fn as_store_policy(&self) -> &'static str {
        match self {
            Self::Earliest => "smallest",
            Self::Latest => "largest",
        }
    }
}

impl FromStr for OffsetReset {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "earliest" | "smallest" => Ok(Self::Earliest),
            "latest" | "largest" => Ok(Self::Latest),
            _ => Err(ConfigError::InvalidValue {
                key: "KAFKA_AUTO_OFFSET_RESET".to_string(),
                value: value.to_string(),
            }),
        }
    }
}

/// Kafka client settings.
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    /// Broker addresses used by this process (comma-separated).
    pub bootstrap_servers: String,
    /// Topic carrying sales records.
    pub topic: String,
    /// Consumer group identifier.
    pub group_id: String,
    /// Client identifier reported to the broker.
    pub client_id: String,
    /// Offset reset policy for new groups.
    pub auto_offset_reset: OffsetReset,
    /// Period of the client's automatic offset commit.
    pub auto_commit_interval: Duration,
    /// Group session timeout.
    pub session_timeout: Duration,
    /// Maximum time between polls before the member is evicted.
    pub max_poll_interval: Duration,
    /// Bound on metadata requests at startup.
    pub metadata_timeout: Duration,
}

/// Analytical store settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Controller (control plane) base URL.
    pub controller_url: Url,
    /// Broker (query plane) base URL.
    pub broker_url: Url,
    /// Dataset identifier used for both schema and table.
    pub table: String,
    /// Broker list handed to the store in the table's stream configuration.
    pub stream_brokers: String,
    /// Timeout applied to every REST call.
    pub request_timeout: Duration,
    /// Wait after creating a table before it is queried.
    pub table_settle: Duration,
    /// Wait after deleting a table during repair.
    pub repair_settle: Duration,
}

/// Consumption loop tunables.
#[derive(Debug, Clone)]
pub struct ConsumptionSettings {
    /// Upper bound on a single poll.
    pub poll_timeout: Duration,
    /// Cadence of the steady-state health probe.
    pub health_interval: Duration,
    /// A progress line is logged every this many successes.
    pub progress_every: u64,
}

impl Default for ConsumptionSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            health_interval: Duration::from_secs(30),
            progress_every: 10,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json_format: bool,
    /// Optional file receiving a copy of every log line.
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file_path: None,
        }
    }
}

/// Fully resolved, immutable process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Detected runtime environment.
    pub environment: RuntimeEnvironment,
    /// Kafka client settings.
    pub kafka: KafkaSettings,
    /// Analytical store settings.
    pub store: StoreSettings,
    /// Consumption loop tunables.
    pub consumption: ConsumptionSettings,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolves configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a variable holds an unusable value.
    pub fn from_env(role: ServiceRole) -> Result<Self, ConfigError> {
        Self::resolve(role, RuntimeEnvironment::detect(), |key| {
            std::env::var(key).ok()
        })
    }

    /// Resolves configuration for `role` in `environment`, reading variables
    /// through `lookup`.
    ///
    /// # Examples
    ///
    /// ```
    /// use sales_pipeline::config::{Config, RuntimeEnvironment, ServiceRole};
    ///
    /// let config = Config::resolve(ServiceRole::Ingest, RuntimeEnvironment::Host, |_| None)
    ///     .unwrap();
    /// assert_eq!(config.kafka.bootstrap_servers, "localhost:29092");
    /// assert_eq!(config.store.table, "sales");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a variable holds an unusable value.
    pub fn resolve<F>(
        role: ServiceRole,
        environment: RuntimeEnvironment,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let preset = environment.preset();
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let auto_offset_reset = match lookup("KAFKA_AUTO_OFFSET_RESET") {
            Some(value) => value.parse()?,
            None => OffsetReset::default(),
        };

        let kafka = KafkaSettings {
            bootstrap_servers: var("KAFKA_BOOTSTRAP_SERVERS", &preset.kafka_bootstrap),
            topic: var("KAFKA_TOPIC", "sales-realtime"),
            group_id: var("KAFKA_GROUP_ID", role.default_group_id()),
            client_id: role.client_id().to_string(),
            auto_offset_reset,
            auto_commit_interval: Duration::from_secs(5),
            session_timeout: Duration::from_secs(30),
            max_poll_interval: Duration::from_secs(300),
            metadata_timeout: Duration::from_secs(10),
        };

        let store = StoreSettings {
            controller_url: parse_url(
                "PINOT_CONTROLLER_URL",
                &var("PINOT_CONTROLLER_URL", &preset.controller_url),
            )?,
            broker_url: parse_url(
                "PINOT_BROKER_URL",
                &var("PINOT_BROKER_URL", &preset.broker_url),
            )?,
            table: var("PINOT_TABLE", "sales"),
            stream_brokers: var("KAFKA_CONNECT_URL", &preset.kafka_for_store),
            request_timeout: Duration::from_secs(parse_number(
                &lookup,
                "PIPELINE_HTTP_TIMEOUT_SECS",
                10,
            )?),
            table_settle: Duration::from_secs(5),
            repair_settle: Duration::from_secs(3),
        };

        let consumption = ConsumptionSettings {
            poll_timeout: Duration::from_millis(parse_number(
                &lookup,
                "PIPELINE_POLL_TIMEOUT_MS",
                1000,
            )?),
            health_interval: Duration::from_secs(parse_number(
                &lookup,
                "PIPELINE_HEALTH_INTERVAL_SECS",
                30,
            )?),
            progress_every: parse_number(&lookup, "PIPELINE_PROGRESS_EVERY", 10)?,
        };

        let logging = LoggingConfig {
            level: var("PIPELINE_LOG_LEVEL", "info"),
            json_format: parse_bool(&lookup, "PIPELINE_LOG_JSON", false)?,
            file_path: lookup("PIPELINE_LOG_FILE").map(PathBuf::from),
        };

        let config = Self {
            environment,
            kafka,
            store,
            consumption,
            logging,
        };
        config.validate()?;

        debug!(
            environment = environment.as_str(),
            brokers = %config.kafka.bootstrap_servers,
            controller = %config.store.controller_url,
            "Configuration resolved"
        );

        Ok(config)
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kafka.bootstrap_servers.trim().is_empty() {
            return Err(ConfigError::Validation(
                "bootstrap servers cannot be empty".to_string(),
            ));
        }
        if self.kafka.topic.trim().is_empty() {
            return Err(ConfigError::Validation("topic cannot be empty".to_string()));
        }
        if self.store.table.trim().is_empty() {
            return Err(ConfigError::Validation(
                "table name cannot be empty".to_string(),
            ));
        }
        if self.store.request_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "HTTP timeout must be greater than 0".to_string(),
            ));
        }
        if self.consumption.poll_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "poll timeout must be greater than 0".to_string(),
            ));
        }
        if self.consumption.progress_every == 0 {
            return Err(ConfigError::Validation(
                "progress interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        key: key.to_string(),
        source,
    })
}

fn parse_number<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => match value.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        },
        None => Ok(default),
    }
}
