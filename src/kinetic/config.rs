// SPDX-License-Identifier: MIT

//! Environment driven configuration

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::kinetic::workflow::orchestrator::DEFAULT_MAX_NODE_EXECUTIONS;
use crate::ndk::error::EngineError;

pub const FLOWS_DIR_VAR: &str = "KINETIC_FLOWS_DIR";
pub const PORT_VAR: &str = "KINETIC_PORT";
pub const HTTP_TIMEOUT_VAR: &str = "KINETIC_HTTP_TIMEOUT_SECS";
pub const MAX_NODE_EXECUTIONS_VAR: &str = "KINETIC_MAX_NODE_EXECUTIONS";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Directory of YAML/JSON flow files
    pub flows_dir: PathBuf,
    pub port: u16,
    /// Timeout applied by the HTTP node
    pub http_timeout: Duration,
    /// Per-run bound on node executions, guards goto loops
    pub max_node_executions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            flows_dir: PathBuf::from("flows"),
            port: 8080,
            http_timeout: Duration::from_secs(30),
            max_node_executions: DEFAULT_MAX_NODE_EXECUTIONS,
        }
    }
}

impl EngineConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for
    /// unset keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let flows_dir = lookup(FLOWS_DIR_VAR)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.flows_dir);
        let port = parse_var(&lookup, PORT_VAR)?.unwrap_or(defaults.port);
        let http_timeout = parse_var(&lookup, HTTP_TIMEOUT_VAR)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);
        let max_node_executions: usize =
            parse_var(&lookup, MAX_NODE_EXECUTIONS_VAR)?.unwrap_or(defaults.max_node_executions);
        if max_node_executions == 0 {
            return Err(EngineError::config(format!(
                "{} must be greater than zero",
                MAX_NODE_EXECUTIONS_VAR
            )));
        }

        Ok(Self {
            flows_dir,
            port,
            http_timeout,
            max_node_executions,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, EngineError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| EngineError::config(format!("invalid value for {}: '{}'", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<EngineConfig, EngineError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.port, 8080);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.max_node_executions, 1000);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            (FLOWS_DIR_VAR, "/srv/flows"),
            (PORT_VAR, " 9090 "),
            (HTTP_TIMEOUT_VAR, "5"),
            (MAX_NODE_EXECUTIONS_VAR, "50"),
        ])
        .unwrap();
        assert_eq!(config.flows_dir, PathBuf::from("/srv/flows"));
        assert_eq!(config.port, 9090);
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert_eq!(config.max_node_executions, 50);
    }

    #[test]
    fn test_invalid_values() {
        let err = config_from(&[(PORT_VAR, "eighty")]).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(err.to_string().contains("KINETIC_PORT"));

        assert!(config_from(&[(MAX_NODE_EXECUTIONS_VAR, "0")]).is_err());
        assert!(config_from(&[(PORT_VAR, "70000")]).is_err());
    }
}
