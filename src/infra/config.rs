//! Configuration loading from an optional JSON file with environment overlay
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/appsettings.json
//!
//! A missing file is not an error (defaults apply). Environment variables
//! override file values; nested keys use `__` as the section separator,
//! e.g. `Mqtt__Host` or `Routes__Output`. Keys are matched case-insensitively.

use ::config::{Environment, File, FileFormat, Map, Source, Value, ValueKind};
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/appsettings.json";
pub const DEFAULT_SENSOR_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct MqttSection {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(rename = "clientid", default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Prefix for `<prefix>/inputs/<name>` and `<prefix>/outputs/<name>`
    #[serde(rename = "topicprefix", default = "default_topic_prefix")]
    pub topic_prefix: String,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "edge-temp-relay".to_string()
}

fn default_topic_prefix() -> String {
    "edge/temp-relay".to_string()
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            topic_prefix: default_topic_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct RoutesSection {
    #[serde(default = "default_input")]
    pub input: String,
    #[serde(default = "default_output")]
    pub output: String,
}

fn default_input() -> String {
    "input1".to_string()
}

fn default_output() -> String {
    "output1".to_string()
}

impl Default for RoutesSection {
    fn default() -> Self {
        Self { input: default_input(), output: default_output() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct BrokerSection {
    /// Run an embedded broker (local development without an edge hub)
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "bindaddress", default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
}

fn default_broker_bind_address() -> String {
    "127.0.0.1".to_string()
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self { enabled: false, bind_address: default_broker_bind_address(), port: default_mqtt_port() }
    }
}

fn default_delay_ms() -> u64 {
    5000
}

fn default_sensor_path() -> String {
    DEFAULT_SENSOR_PATH.to_string()
}

fn default_metrics_interval_secs() -> u64 {
    60
}

/// Shape of `appsettings.json` after key folding (all keys lowercase)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct JsonConfig {
    /// Milliseconds between sampler iterations
    #[serde(default = "default_delay_ms")]
    pub delay: u64,
    #[serde(rename = "sensorpath", default = "default_sensor_path")]
    pub sensor_path: String,
    /// Metrics summary log interval (0 to disable)
    #[serde(rename = "metricsintervalsecs", default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub routes: RoutesSection,
    #[serde(default)]
    pub broker: BrokerSection,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    delay_ms: u64,
    sensor_path: String,
    metrics_interval_secs: u64,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_client_id: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    topic_prefix: String,
    input_name: String,
    output_name: String,
    broker_enabled: bool,
    broker_bind_address: String,
    broker_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_json(
            JsonConfig {
                delay: default_delay_ms(),
                sensor_path: default_sensor_path(),
                metrics_interval_secs: default_metrics_interval_secs(),
                mqtt: MqttSection::default(),
                routes: RoutesSection::default(),
                broker: BrokerSection::default(),
            },
            "default".to_string(),
        )
    }
}

impl Config {
    fn from_json(json: JsonConfig, config_file: String) -> Self {
        Self {
            delay_ms: json.delay,
            sensor_path: json.sensor_path,
            metrics_interval_secs: json.metrics_interval_secs,
            mqtt_host: json.mqtt.host,
            mqtt_port: json.mqtt.port,
            mqtt_client_id: json.mqtt.client_id,
            mqtt_username: json.mqtt.username,
            mqtt_password: json.mqtt.password,
            topic_prefix: json.mqtt.topic_prefix,
            input_name: json.routes.input,
            output_name: json.routes.output,
            broker_enabled: json.broker.enabled,
            broker_bind_address: json.broker.bind_address,
            broker_port: json.broker.port,
            config_file,
        }
    }

    /// Determine config file path from the CLI value or the environment
    pub fn resolve_config_path<F>(cli_path: Option<&str>, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = cli_path {
            return path.to_string();
        }
        lookup("CONFIG_FILE").unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load configuration from a JSON file (no environment overlay)
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json: JsonConfig = ::config::Config::builder()
            .add_source(FoldedKeys(File::from(path).format(FileFormat::Json)))
            .build()
            .and_then(|built| built.try_deserialize())
            .with_context(|| format!("Failed to load config file {}", path.display()))?;

        Ok(Self::from_json(json, path.display().to_string()))
    }

    /// Load the optional file, then overlay `env` (the process environment when `None`)
    pub fn load_with<P: AsRef<Path>>(path: P, env: Option<HashMap<String, String>>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json: JsonConfig = ::config::Config::builder()
            .add_source(FoldedKeys(File::from(path).format(FileFormat::Json).required(false)))
            .add_source(Environment::default().separator("__").try_parsing(true).source(env))
            .build()
            .and_then(|built| built.try_deserialize())
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        let config_file = if path.exists() { path.display().to_string() } else { "default".to_string() };
        Ok(Self::from_json(json, config_file))
    }

    /// Load the optional file and overlay the process environment
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::load_with(path, None)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn sensor_path(&self) -> &str {
        &self.sensor_path
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_client_id(&self) -> &str {
        &self.mqtt_client_id
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn broker_enabled(&self) -> bool {
        self.broker_enabled
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

/// Lowercases every key of the wrapped source so file keys line up with
/// the environment layer, which `config` always lowercases.
#[derive(Debug, Clone)]
struct FoldedKeys<S>(S);

impl<S> Source for FoldedKeys<S>
where
    S: Source + Clone + Send + Sync + 'static,
{
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ::config::ConfigError> {
        Ok(fold_table(self.0.collect()?))
    }
}

fn fold_table(table: Map<String, Value>) -> Map<String, Value> {
    table.into_iter().map(|(key, value)| (key.to_lowercase(), fold_value(value))).collect()
}

fn fold_value(mut value: Value) -> Value {
    value.kind = match value.kind {
        ValueKind::Table(table) => ValueKind::Table(fold_table(table)),
        ValueKind::Array(items) => ValueKind::Array(items.into_iter().map(fold_value).collect()),
        other => other,
    };
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    fn lookup_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = env_of(pairs).unwrap_or_default();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.delay_ms(), 5000);
        assert_eq!(config.delay(), Duration::from_millis(5000));
        assert_eq!(config.sensor_path(), "/sys/class/thermal/thermal_zone0/temp");
        assert_eq!(config.mqtt_host(), "localhost");
        assert_eq!(config.mqtt_port(), 1883);
        assert_eq!(config.input_name(), "input1");
        assert_eq!(config.output_name(), "output1");
        assert!(!config.broker_enabled());
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_resolve_config_path_default() {
        assert_eq!(Config::resolve_config_path(None, lookup_of(&[])), "config/appsettings.json");
    }

    #[test]
    fn test_resolve_config_path_from_env() {
        let lookup = lookup_of(&[("CONFIG_FILE", "/etc/relay.json")]);
        assert_eq!(Config::resolve_config_path(None, lookup), "/etc/relay.json");
    }

    #[test]
    fn test_resolve_config_path_cli_wins() {
        let lookup = lookup_of(&[("CONFIG_FILE", "/etc/relay.json")]);
        assert_eq!(Config::resolve_config_path(Some("local.json"), lookup), "local.json");
    }

    #[test]
    fn test_env_overlay() {
        let config = Config::load_with(
            "/nonexistent/appsettings.json",
            env_of(&[
                ("Delay", "250"),
                ("Mqtt__Host", "edgehub"),
                ("Mqtt__Port", "8883"),
                ("Routes__Output", "telemetry"),
                ("Broker__Enabled", "True"),
            ]),
        )
        .unwrap();

        assert_eq!(config.delay_ms(), 250);
        assert_eq!(config.mqtt_host(), "edgehub");
        assert_eq!(config.mqtt_port(), 8883);
        assert_eq!(config.output_name(), "telemetry");
        assert_eq!(config.input_name(), "input1");
        assert!(config.broker_enabled());
    }

    #[test]
    fn test_env_overlay_invalid_number() {
        let err = Config::load_with("/nonexistent/appsettings.json", env_of(&[("Delay", "soon")]))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("delay"));
    }

    #[test]
    fn test_env_overlay_invalid_bool() {
        let result = Config::load_with("/nonexistent/appsettings.json", env_of(&[("Broker__Enabled", "maybe")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_env_password_stays_text() {
        let config =
            Config::load_with("/nonexistent/appsettings.json", env_of(&[("Mqtt__Password", "1234")])).unwrap();
        assert_eq!(config.mqtt_password(), Some("1234"));
    }

    #[test]
    fn test_unrelated_env_is_ignored() {
        let config = Config::load_with(
            "/nonexistent/appsettings.json",
            env_of(&[("PATH", "/usr/bin"), ("RUST_LOG", "debug"), ("__CF_USER", "0x1F5")]),
        )
        .unwrap();
        assert_eq!(config.delay_ms(), 5000);
    }

    #[test]
    fn test_fold_keys_nested() {
        let mut mqtt = Map::new();
        mqtt.insert("TopicPrefix".to_string(), Value::new(None, "site"));
        let mut root = Map::new();
        root.insert("Mqtt".to_string(), Value::new(None, ValueKind::Table(mqtt)));

        let folded = fold_table(root);
        let ValueKind::Table(mqtt) = &folded["mqtt"].kind else {
            panic!("mqtt section lost");
        };
        assert!(mqtt.contains_key("topicprefix"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load_with("/nonexistent/appsettings.json", env_of(&[("Delay", "100")])).unwrap();
        assert_eq!(config.delay_ms(), 100);
        assert_eq!(config.config_file(), "default");
    }
}
