//! Runtime configuration and its text loaders.

use serde::{Deserialize, Serialize};

use super::logging::LogLevel;
use crate::error::{EngineError, EngineResult};
use crate::graph::is_port_name;

/// Settings for a [`Runtime`](super::Runtime).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Fixed domain id; a fresh `cuuid(8)` when absent.
    #[serde(default)]
    pub domain_id: Option<String>,
    #[serde(default)]
    pub log_level: LogLevel,
    /// Port fed by `Node::invoke`.
    #[serde(default = "default_input_port")]
    pub default_input_port: String,
    /// Register a [`TracingSink`](super::TracingSink) on build.
    #[serde(default = "default_tracing_sink")]
    pub tracing_sink: bool,
}

fn default_input_port() -> String {
    "$I".to_string()
}

fn default_tracing_sink() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            domain_id: None,
            log_level: LogLevel::Info,
            default_input_port: default_input_port(),
            tracing_sink: default_tracing_sink(),
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !is_port_name(&self.default_input_port) {
            return Err(EngineError::ConfigError(format!(
                "default_input_port must start with '$': {:?}",
                self.default_input_port
            )));
        }
        if matches!(self.default_input_port.as_str(), "$E" | "$IE") {
            return Err(EngineError::ConfigError(format!(
                "default_input_port cannot be the reserved port {}",
                self.default_input_port
            )));
        }
        if let Some(id) = &self.domain_id {
            if id.is_empty() {
                return Err(EngineError::ConfigError("domain_id cannot be empty".into()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str, format: ConfigFormat) -> EngineResult<RuntimeConfig> {
    let config: RuntimeConfig = match format {
        ConfigFormat::Yaml => serde_saphyr::from_str(content)
            .map_err(|e| EngineError::ConfigError(e.to_string()))?,
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| EngineError::ConfigError(e.to_string()))?
        }
        ConfigFormat::Toml => {
            let table: toml::Value =
                toml::from_str(content).map_err(|e| EngineError::ConfigError(e.to_string()))?;
            serde_json::from_value(toml_to_json(table))
                .map_err(|e| EngineError::ConfigError(e.to_string()))?
        }
    };
    config.validate()?;
    Ok(config)
}

fn toml_to_json(val: toml::Value) -> serde_json::Value {
    match val {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.default_input_port, "$I");
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.tracing_sink);
        assert!(config.domain_id.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
domain_id: edge-7
log_level: debug
"#;
        let config = parse_config(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.domain_id.as_deref(), Some("edge-7"));
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.default_input_port, "$I");
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{"default_input_port": "$in", "tracing_sink": false}"#;
        let config = parse_config(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.default_input_port, "$in");
        assert!(!config.tracing_sink);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
log_level = "warn"
default_input_port = "$data"
"#;
        let config = parse_config(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.default_input_port, "$data");
    }

    #[test]
    fn test_invalid_input_port_rejected() {
        let err = parse_config(r#"{"default_input_port": "input"}"#, ConfigFormat::Json)
            .unwrap_err();
        assert!(matches!(err, EngineError::ConfigError(_)));

        let err =
            parse_config(r#"{"default_input_port": "$E"}"#, ConfigFormat::Json).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_malformed_document() {
        assert!(parse_config("{not json", ConfigFormat::Json).is_err());
        assert!(parse_config(r#"{"log_level": "loud"}"#, ConfigFormat::Json).is_err());
    }
}
