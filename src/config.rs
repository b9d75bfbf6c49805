//! Connection-string resolution and parsing.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::SqlBatchError;

/// Default command timeout applied when a connection string does not carry one.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Prefix for connection strings looked up by [`EnvSource`].
pub const ENV_PREFIX: &str = "SQL_BATCH_CONNECTION_";

/// Name tried when the caller asks for the empty name.
pub const DEFAULT_CONNECTION_NAME: &str = "Default";

/// Anything that can map a logical database name to a connection string.
pub trait ConnectionStringSource: Send + Sync {
    fn connection_string(&self, name: &str) -> Option<String>;

    /// Retry count configured for `name`, if the source carries one.
    fn retries(&self, _name: &str) -> Option<u32> {
        None
    }
}

impl ConnectionStringSource for HashMap<String, String> {
    fn connection_string(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Settings loaded from JSON:
///
/// ```json
/// { "connection_strings": { "Default": "Data Source=app.db" }, "retries": { "Default": 2 } }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default)]
    pub connection_strings: HashMap<String, String>,
    #[serde(default)]
    pub retries: HashMap<String, u32>,
}

impl ConnectionSettings {
    /// # Errors
    /// Returns `SqlBatchError::ConfigError` if the JSON does not match the settings shape.
    pub fn from_json_str(json: &str) -> Result<Self, SqlBatchError> {
        serde_json::from_str(json)
            .map_err(|e| SqlBatchError::ConfigError(format!("invalid connection settings: {e}")))
    }

    /// # Errors
    /// Returns `SqlBatchError::ConfigError` if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SqlBatchError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SqlBatchError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }
}

impl ConnectionStringSource for ConnectionSettings {
    fn connection_string(&self, name: &str) -> Option<String> {
        self.connection_strings.get(name).cloned()
    }

    fn retries(&self, name: &str) -> Option<u32> {
        self.retries.get(name).copied()
    }
}

/// Reads `SQL_BATCH_CONNECTION_<NAME>` from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConnectionStringSource for EnvSource {
    fn connection_string(&self, name: &str) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        std::env::var(format!("{ENV_PREFIX}{}", name.to_uppercase())).ok()
    }
}

/// Resolve `name` against `source`.
///
/// Order: the name itself, then `"Default"` for an empty name, then the name as a literal
/// connection string.
///
/// # Errors
/// Returns `SqlBatchError::ConfigError` when nothing resolves and the name is empty.
pub fn resolve_connection_string(
    source: &dyn ConnectionStringSource,
    name: &str,
) -> Result<String, SqlBatchError> {
    if let Some(found) = source.connection_string(name) {
        return Ok(found);
    }
    if name.is_empty() {
        return source.connection_string(DEFAULT_CONNECTION_NAME).ok_or_else(|| {
            SqlBatchError::ConfigError(
                "no connection name given and no \"Default\" connection configured".into(),
            )
        });
    }
    Ok(name.to_string())
}

/// Values recognised in a `key=value;` connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStringInfo {
    pub command_timeout_secs: u64,
    pub database_name: Option<String>,
    pub retries: u32,
    pub data_source: Option<String>,
}

impl Default for ConnectionStringInfo {
    fn default() -> Self {
        Self {
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            database_name: None,
            retries: 0,
            data_source: None,
        }
    }
}

/// Split a connection string into lower-cased keys and trimmed values.
///
/// Pairs without `=` are ignored; a later duplicate key overrides an earlier one.
#[must_use]
pub fn connection_string_pairs(connection_string: &str) -> HashMap<String, String> {
    connection_string
        .split(';')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim().to_lowercase();
            if key.is_empty() {
                return None;
            }
            Some((key, value.trim().trim_matches(['"', '\'']).to_string()))
        })
        .collect()
}

/// Best-effort parse; unrecognised or malformed values fall back to defaults.
#[must_use]
pub fn parse_connection_string(connection_string: &str) -> ConnectionStringInfo {
    let pairs = connection_string_pairs(connection_string);
    let lookup = |keys: &[&str]| keys.iter().find_map(|k| pairs.get(*k)).filter(|v| !v.is_empty());

    let command_timeout_secs = lookup(&["command timeout", "commandtimeout"])
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS);
    let retries = lookup(&["retries", "connectretrycount"])
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);
    let data_source = lookup(&["data source", "datasource"]).cloned();
    let database_name = lookup(&["database", "initial catalog"]).cloned().or_else(|| {
        data_source.as_deref().and_then(|ds| {
            Path::new(ds)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .filter(|stem| !stem.is_empty() && ds != ":memory:")
        })
    });

    ConnectionStringInfo {
        command_timeout_secs,
        database_name,
        retries,
        data_source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ado_keys_case_insensitively() {
        let info = parse_connection_string(
            "Server=tcp:db,1433; Initial Catalog=Sales; command timeout = 45; ConnectRetryCount=3",
        );
        assert_eq!(info.command_timeout_secs, 45);
        assert_eq!(info.database_name.as_deref(), Some("Sales"));
        assert_eq!(info.retries, 3);
    }

    #[test]
    fn unparsable_timeout_falls_back() {
        let info = parse_connection_string("Data Source=app.db;Command Timeout=soon");
        assert_eq!(info.command_timeout_secs, DEFAULT_COMMAND_TIMEOUT_SECS);
        assert_eq!(info.database_name.as_deref(), Some("app"));
    }

    #[test]
    fn memory_database_has_no_name() {
        let info = parse_connection_string("Data Source=:memory:");
        assert_eq!(info.database_name, None);
        assert_eq!(info.retries, 0);
    }

    #[test]
    fn resolution_order() {
        let mut map = HashMap::new();
        map.insert("Default".to_string(), "Data Source=default.db".to_string());
        map.insert("reports".to_string(), "Data Source=reports.db".to_string());

        assert_eq!(resolve_connection_string(&map, "reports").unwrap(), "Data Source=reports.db");
        assert_eq!(resolve_connection_string(&map, "").unwrap(), "Data Source=default.db");
        assert_eq!(
            resolve_connection_string(&map, "Data Source=literal.db").unwrap(),
            "Data Source=literal.db"
        );
        let empty: HashMap<String, String> = HashMap::new();
        assert!(matches!(
            resolve_connection_string(&empty, ""),
            Err(SqlBatchError::ConfigError(_))
        ));
    }

    #[test]
    fn settings_from_json() {
        let settings = ConnectionSettings::from_json_str(
            r#"{ "connection_strings": { "main": "Data Source=main.db" }, "retries": { "main": 2 } }"#,
        )
        .unwrap();
        assert_eq!(settings.connection_string("main").as_deref(), Some("Data Source=main.db"));
        assert_eq!(settings.retries("main"), Some(2));
        assert!(ConnectionSettings::from_json_str("[1, 2]").is_err());
    }
}
